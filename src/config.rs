use std::env;

use crate::error::ConfigError;
use crate::messages::Language;

const DEFAULT_PREFIX: &str = "!";
const DEFAULT_VOLUME: f32 = 6.0;
const MAX_VOLUME: f32 = 10.0;

/// Process-wide settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub token: String,
    pub prefix: String,
    pub youtube_api_key: Option<String>,
    pub language: Language,
    pub default_volume: f32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let token = read("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let prefix = read("COMMAND_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let youtube_api_key = read("YOUTUBE_API_KEY");

        let language = match read("BOT_LANGUAGE") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "BOT_LANGUAGE", value })?,
            None => Language::Portuguese,
        };

        let default_volume = match read("DEFAULT_VOLUME") {
            Some(value) => match value.parse::<f32>() {
                Ok(volume) if (0.0..=MAX_VOLUME).contains(&volume) => volume,
                _ => return Err(ConfigError::Invalid { key: "DEFAULT_VOLUME", value }),
            },
            None => DEFAULT_VOLUME,
        };

        Ok(Self {
            token,
            prefix,
            youtube_api_key,
            language,
            default_volume,
        })
    }
}
