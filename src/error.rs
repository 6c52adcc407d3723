use std::fmt;

/// The command a precondition failure belongs to, so the reply can name it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Play,
    Skip,
    Stop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Play => "play",
            Action::Skip => "skip",
            Action::Stop => "stop",
        };

        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("issuer is not in a voice channel ({0})")]
    NotInVoiceChannel(Action),

    #[error("missing connect or speak permission on the voice channel")]
    InsufficientPermissions,

    #[error("no active queue ({0})")]
    NoActiveQueue(Action),

    #[error("empty play query")]
    MissingQuery,

    #[error("search failed for {query:?}: {reason}")]
    SearchResolution { query: String, reason: String },

    #[error("metadata lookup failed for {url}: {reason}")]
    MetadataResolution { url: String, reason: String },

    #[error("could not join voice channel: {0}")]
    VoiceJoin(String),

    #[error("could not start output stream: {0}")]
    OutputStream(String),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Expected {0} in the environment")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
