use std::sync::Arc;

use serenity::client::Context;
use serenity::framework::standard::macros::{command, group, hook};
use serenity::framework::standard::{Args, CommandError, CommandResult};
use serenity::model::channel::Message;
use serenity::model::channel::ReactionType::Unicode;
use serenity::model::guild::Guild;
use serenity::model::id::ChannelId;
use serenity::model::permissions::Permissions;
use serenity::Result as SerenityResult;
use tracing::{info, info_span};
use tracing_futures::Instrument;

use crate::controller::Enqueued;
use crate::error::{Action, PlaybackError};
use crate::models::{ControlRequest, PlayRequest};
use crate::voice::check_msg;
use crate::{ConfigKey, Jukebox, JukeboxKey};

const LOADING_EMOJI: &str = "⏳";
const SUCCESS_EMOJI: &str = "👍";
const FAILURE_EMOJI: &str = "💀";

#[group]
#[commands(play, skip, stop, queue, help)]
pub struct General;

#[command]
#[only_in(guilds)]
async fn play(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let jukebox = get_jukebox(ctx).await?;
    let guild = get_guild(ctx, msg)?;
    let voice_channel = issuer_voice_channel(&guild, msg);

    let request = PlayRequest {
        guild_id: guild.id,
        text_channel: msg.channel_id,
        voice_channel,
        can_connect_and_speak: voice_channel.map_or(false, |channel| can_connect_and_speak(ctx, channel)),
        query: args.rest().to_string(),
    };

    info!("User input is {}", request.query);

    let loading_emoji = Unicode(LOADING_EMOJI.to_string());
    check_reaction(msg.react(&ctx.http, loading_emoji.clone()).await);

    let result = jukebox
        .enqueue(request)
        .instrument(info_span!("play", guild = guild.id.0))
        .await;

    let bot_id = ctx.cache.current_user_id();
    check_reaction(
        msg.channel_id
            .delete_reaction(&ctx.http, msg.id, Some(bot_id), loading_emoji)
            .await,
    );

    if let Ok(outcome) = &result {
        info!("Enqueued: {outcome:?}");
    }

    let answer_emoji = outcome_emoji(&result);

    report(ctx, msg, &jukebox, result).await;
    check_reaction(msg.react(&ctx.http, Unicode(answer_emoji.to_string())).await);

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn skip(ctx: &Context, msg: &Message) -> CommandResult {
    let jukebox = get_jukebox(ctx).await?;
    let request = control_request(ctx, msg)?;

    let result = jukebox
        .skip(request)
        .instrument(info_span!("skip", guild = request.guild_id.0))
        .await;

    report(ctx, msg, &jukebox, result).await;

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn stop(ctx: &Context, msg: &Message) -> CommandResult {
    let jukebox = get_jukebox(ctx).await?;
    let request = control_request(ctx, msg)?;

    let result = jukebox
        .stop(request)
        .instrument(info_span!("stop", guild = request.guild_id.0))
        .await;

    report(ctx, msg, &jukebox, result).await;

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn queue(ctx: &Context, msg: &Message) -> CommandResult {
    let jukebox = get_jukebox(ctx).await?;
    let guild_id = get_guild(ctx, msg)?.id;

    let songs = jukebox.songs(guild_id).await;
    info!("There are {} songs in guild {}", songs.len(), guild_id.0);

    let listing = jukebox.messages().queue_listing(songs.iter());
    check_msg(msg.channel_id.say(&ctx.http, listing).await);

    Ok(())
}

#[command]
async fn help(ctx: &Context, msg: &Message) -> CommandResult {
    let jukebox = get_jukebox(ctx).await?;

    let prefix = {
        let data = ctx.data.read().await;
        data.get::<ConfigKey>().map(|config| config.prefix.clone()).unwrap_or_default()
    };

    check_msg(msg.channel_id.say(&ctx.http, jukebox.messages().help(&prefix)).await);

    Ok(())
}

#[hook]
pub async fn unknown_command(ctx: &Context, msg: &Message, unknown_command_name: &str) {
    info!("Unknown command {unknown_command_name}");

    if let Ok(jukebox) = get_jukebox(ctx).await {
        check_msg(msg.channel_id.say(&ctx.http, jukebox.messages().invalid_command()).await);
    }
}

/// Reactions are decoration: missing Add Reactions or Read Message History
/// must not keep a song from playing. Returns whether the call succeeded.
fn check_reaction<T>(result: SerenityResult<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(why) => {
            info!("Error updating reaction: {why:?}");
            false
        }
    }
}

fn outcome_emoji(result: &Result<Enqueued, PlaybackError>) -> &'static str {
    match result {
        Ok(Enqueued::Started) | Ok(Enqueued::Queued { .. }) => SUCCESS_EMOJI,
        Ok(Enqueued::Unplayable) | Err(_) => FAILURE_EMOJI,
    }
}

/// Replies with the curated message for a failed command.
async fn report<T>(ctx: &Context, msg: &Message, jukebox: &Jukebox, result: Result<T, PlaybackError>) {
    if let Err(why) = result {
        info!("Command failed: {why}");
        check_msg(msg.channel_id.say(&ctx.http, jukebox.messages().for_error(&why)).await);
    }
}

async fn get_jukebox(ctx: &Context) -> Result<Arc<Jukebox>, CommandError> {
    let data = ctx.data.read().await;

    data.get::<JukeboxKey>()
        .cloned()
        .ok_or_else(|| CommandError::from("Jukebox not initialised"))
}

fn get_guild(ctx: &Context, msg: &Message) -> CommandResult<Guild> {
    msg.guild(&ctx.cache).ok_or(CommandError::from("Guild not found"))
}

fn issuer_voice_channel(guild: &Guild, msg: &Message) -> Option<ChannelId> {
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn control_request(ctx: &Context, msg: &Message) -> CommandResult<ControlRequest> {
    let guild = get_guild(ctx, msg)?;

    Ok(ControlRequest {
        guild_id: guild.id,
        issuer_in_voice: issuer_voice_channel(&guild, msg).is_some(),
    })
}

fn can_connect_and_speak(ctx: &Context, channel_id: ChannelId) -> bool {
    let channel = match ctx.cache.guild_channel(channel_id) {
        Some(channel) => channel,
        None => {
            info!("Voice channel {} not cached", channel_id.0);
            return false;
        }
    };

    match channel.permissions_for_user(&ctx.cache, ctx.cache.current_user_id()) {
        Ok(permissions) => permissions.contains(Permissions::CONNECT | Permissions::SPEAK),
        Err(why) => {
            info!("Could not compute permissions: {why:?}");
            false
        }
    }
}
