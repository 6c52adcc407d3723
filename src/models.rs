use std::collections::VecDeque;
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId};

#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
}

impl Song {
    /// `m:ss`, or `h:mm:ss` for anything an hour or longer.
    pub fn duration_text(&self) -> Option<String> {
        let seconds = self.duration?.as_secs();
        let (hours, minutes, seconds) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);

        if hours > 0 {
            Some(format!("{hours}:{minutes:0>2}:{seconds:0>2}"))
        } else {
            Some(format!("{minutes}:{seconds:0>2}"))
        }
    }
}

/// Identifies one started track, so completion events from a track that was
/// already replaced can be told apart from the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackToken(pub u64);

/// An established voice session for a guild.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub channel: ChannelId,
    pub track: Option<TrackToken>,
}

impl Connection {
    pub fn new(channel: ChannelId) -> Self {
        Self { channel, track: None }
    }
}

#[derive(Clone, Debug)]
pub struct Queue {
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
    pub connection: Option<Connection>,
    pub songs: VecDeque<Song>,
    pub volume: f32,
    pub playing: bool,
}

impl Queue {
    pub fn new(text_channel: ChannelId, voice_channel: ChannelId, volume: f32, first: Song) -> Self {
        Self {
            text_channel,
            voice_channel,
            connection: None,
            songs: VecDeque::from([first]),
            volume,
            playing: true,
        }
    }

    /// Gain handed to the audio output.
    pub fn output_volume(&self) -> f32 {
        self.volume / 5.0
    }

    pub fn current_track(&self) -> Option<TrackToken> {
        self.connection.as_ref().and_then(|connection| connection.track)
    }
}

/// A `play` command after it has been lifted out of the chat message.
#[derive(Clone, Debug)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    /// Voice channel the issuer currently occupies.
    pub voice_channel: Option<ChannelId>,
    /// Whether the bot may connect and speak in `voice_channel`.
    pub can_connect_and_speak: bool,
    pub query: String,
}

/// `skip` and `stop` only need to know where the issuer is.
#[derive(Clone, Copy, Debug)]
pub struct ControlRequest {
    pub guild_id: GuildId,
    pub issuer_in_voice: bool,
}
