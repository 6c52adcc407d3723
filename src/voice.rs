use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::{RwLock, TypeMap};
use serenity::Result as SerenityResult;
use songbird::{Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent, ytdl};
use tracing::info;

use crate::controller::VoiceBackend;
use crate::error::PlaybackError;
use crate::models::{Song, TrackToken};
use crate::JukeboxKey;

/// [`VoiceBackend`] on top of songbird and the serenity HTTP client.
pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
    http: Arc<Http>,
    data: Arc<RwLock<TypeMap>>,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>, http: Arc<Http>, data: Arc<RwLock<TypeMap>>) -> Self {
        Self { songbird, http, data }
    }
}

#[async_trait]
impl VoiceBackend for SongbirdVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        let (handler_lock, result) = self.songbird.join(guild_id, channel_id).await;

        if let Err(why) = result {
            if let Err(e) = self.songbird.remove(guild_id).await {
                info!("Cleaning up failed join: {e:?}");
            }

            return Err(PlaybackError::VoiceJoin(why.to_string()));
        }

        let mut handler = handler_lock.lock().await;

        if handler.is_deaf() {
            info!("Already deafen!")
        } else if let Err(e) = handler.deafen(true).await {
            info!("Deafen failed due to {e:?}")
        }

        Ok(())
    }

    async fn play(&self, guild_id: GuildId, song: &Song, volume: f32, token: TrackToken) -> Result<(), PlaybackError> {
        let handler_lock = self
            .songbird
            .get(guild_id)
            .ok_or_else(|| PlaybackError::OutputStream("Not in a voice channel to play in".to_string()))?;

        let source = ytdl(&song.url)
            .await
            .map_err(|why| PlaybackError::OutputStream(why.to_string()))?;

        let mut handler = handler_lock.lock().await;

        handler.stop(); // Just in case something was playing before
        let track_handle = handler.play_source(source);

        track_handle
            .set_volume(volume)
            .map_err(|why| PlaybackError::OutputStream(why.to_string()))?;

        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id,
                    token,
                    data: self.data.clone(),
                },
            )
            .map_err(|why| PlaybackError::OutputStream(why.to_string()))?;

        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some(handler_lock) = self.songbird.get(guild_id) {
            handler_lock.lock().await.stop();
        }
    }

    async fn leave(&self, guild_id: GuildId) {
        if self.songbird.get(guild_id).is_some() {
            if let Err(e) = self.songbird.remove(guild_id).await {
                info!("Leaving voice channel failed: {e:?}");
            }
        }
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        let handler_lock = match self.songbird.get(guild_id) {
            Some(handler) => handler,
            None => return false,
        };

        let handler = handler_lock.lock().await;
        handler.current_connection().is_some()
    }

    async fn say(&self, channel_id: ChannelId, text: &str) {
        check_msg(channel_id.say(&self.http, text).await);
    }
}

/// Checks that a message successfully sent; if not, then logs why.
pub fn check_msg(result: SerenityResult<Message>) {
    if let Err(why) = result {
        info!("Error sending message: {why:?}");
    }
}

struct TrackEndNotifier {
    guild_id: GuildId,
    token: TrackToken,
    data: Arc<RwLock<TypeMap>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        info!("End notifier triggered for {:?}", self.token);

        let jukebox = self.data.read().await.get::<JukeboxKey>().cloned();

        match jukebox {
            Some(jukebox) => jukebox.track_finished(self.guild_id, self.token).await,
            None => info!("Jukebox missing from client data"),
        }

        None
    }
}
