use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::GuildId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::Queue;

/// Guild id to queue mapping shared by every handler.
///
/// Each guild has its own slot lock. Holding a [`GuildSlot`] serializes every
/// read and write of that guild's queue, while other guilds proceed freely.
/// Slots are never removed from the map: deleting a queue only empties its
/// slot, so two tasks can never end up holding different locks for one guild.
#[derive(Default)]
pub struct QueueStore {
    slots: Mutex<HashMap<GuildId, Arc<Mutex<Option<Queue>>>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the guild's queue.
    pub async fn lock(&self, guild_id: GuildId) -> GuildSlot {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(guild_id).or_default().clone()
        };

        GuildSlot {
            guild_id,
            queue: slot.lock_owned().await,
        }
    }

    /// Copy of the guild's queue as it is right now.
    /// Guilds that never had a queue are not added to the map.
    pub async fn get(&self, guild_id: GuildId) -> Option<Queue> {
        let slot = self.slots.lock().await.get(&guild_id).cloned()?;
        let queue = slot.lock().await;

        queue.clone()
    }
}

pub struct GuildSlot {
    guild_id: GuildId,
    queue: OwnedMutexGuard<Option<Queue>>,
}

impl GuildSlot {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn get(&self) -> Option<&Queue> {
        self.queue.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Queue> {
        self.queue.as_mut()
    }

    pub fn set(&mut self, queue: Queue) -> &mut Queue {
        self.queue.insert(queue)
    }

    pub fn delete(&mut self) -> Option<Queue> {
        self.queue.take()
    }
}
