use std::sync::Arc;

use dotenvy::dotenv;
use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    framework::StandardFramework,
    model::{gateway::Ready, prelude::VoiceState},
    prelude::{GatewayIntents, TypeMapKey},
};
use songbird::{SerenityInit, Songbird};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::{unknown_command, GENERAL_GROUP};
use crate::config::Config;
use crate::controller::PlaybackController;
use crate::messages::Messages;
use crate::resolver::YoutubeResolver;
use crate::voice::SongbirdVoice;

mod commands;
mod config;
mod controller;
mod error;
mod messages;
mod models;
mod resolver;
mod store;
mod voice;

pub type Jukebox = PlaybackController<YoutubeResolver, SongbirdVoice>;

pub struct JukeboxKey;

impl TypeMapKey for JukeboxKey {
    type Value = Arc<Jukebox>;
}

pub struct ConfigKey;

impl TypeMapKey for ConfigKey {
    type Value = Config;
}

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }

    async fn voice_state_update(&self, ctx: Context, _: Option<VoiceState>, new: VoiceState) {
        if new.channel_id.is_some() || new.user_id != ctx.cache.current_user_id() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("Bot left the voice channel of guild {}", guild_id.0);

            let jukebox = ctx.data.read().await.get::<JukeboxKey>().cloned();

            if let Some(jukebox) = jukebox {
                jukebox.voice_disconnected(guild_id).await;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(why) => {
            error!("Invalid configuration: {why}");
            return;
        }
    };

    let framework = StandardFramework::new()
        .configure(|c| c.prefix(config.prefix.as_str()))
        .unrecognised_command(unknown_command)
        .group(&GENERAL_GROUP);

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();

    let mut client = Client::builder(&config.token, intents)
        .event_handler(Handler)
        .framework(framework)
        .register_songbird_with(songbird.clone())
        .await
        .expect("Err creating client");

    {
        let voice = SongbirdVoice::new(songbird, client.cache_and_http.http.clone(), client.data.clone());
        let resolver = YoutubeResolver::new(reqwest::Client::new(), config.youtube_api_key.clone());
        let jukebox = Jukebox::new(resolver, voice, Messages::new(config.language), config.default_volume);

        let mut data = client.data.write().await;
        data.insert::<JukeboxKey>(Arc::new(jukebox));
        data.insert::<ConfigKey>(config);
    }

    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        let _ = client.start().await.map_err(|why| info!("Client ended: {why:?}"));
    });

    tokio::signal::ctrl_c().await.expect("Control-C interruption failed!");

    info!("Received Ctrl-C, shutting down.");
    shard_manager.lock().await.shutdown_all().await;
}
