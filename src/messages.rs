use std::cmp::min;
use std::str::FromStr;

use crate::error::{Action, PlaybackError};
use crate::models::Song;

/// Longest queue listing sent in a single message.
const MAX_LISTED_SONGS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    Portuguese,
    English,
}

impl FromStr for Language {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pt" | "pt-br" | "portuguese" => Ok(Language::Portuguese),
            "en" | "en-us" | "english" => Ok(Language::English),
            _ => Err(()),
        }
    }
}

/// Every string the bot sends to a text channel.
#[derive(Clone, Debug)]
pub struct Messages {
    language: Language,
}

impl Messages {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    fn pick(&self, pt: &'static str, en: &'static str) -> &'static str {
        match self.language {
            Language::Portuguese => pt,
            Language::English => en,
        }
    }

    pub fn now_playing(&self, song: &Song) -> String {
        match self.language {
            Language::Portuguese => format!("Tocando agora: **{}**", song.title),
            Language::English => format!("Now playing: **{}**", song.title),
        }
    }

    pub fn added_to_queue(&self, song: &Song) -> String {
        match self.language {
            Language::Portuguese => format!("{} foi adicionada à fila!", song.title),
            Language::English => format!("{} was added to the queue!", song.title),
        }
    }

    pub fn unplayable(&self, song: &Song) -> String {
        match self.language {
            Language::Portuguese => format!("Não consegui tocar **{}**, pulando.", song.title),
            Language::English => format!("Could not play **{}**, skipping.", song.title),
        }
    }

    pub fn invalid_command(&self) -> &'static str {
        self.pick("Comando inválido!", "Invalid command!")
    }

    pub fn queue_listing<'a>(&self, songs: impl ExactSizeIterator<Item = &'a Song>) -> String {
        if songs.len() == 0 {
            return self.pick("A fila está vazia!", "The queue is empty!").to_string();
        }

        let total = songs.len();
        let mut lines = Vec::with_capacity(min(total, MAX_LISTED_SONGS));

        for (index, song) in songs.take(MAX_LISTED_SONGS).enumerate() {
            let position = index + 1;
            match song.duration_text() {
                Some(duration) => lines.push(format!("{position} - {} ({duration})", song.title)),
                None => lines.push(format!("{position} - {}", song.title)),
            }
        }

        let header = self.pick("**Fila**", "**Queue**");
        let mut listing = format!("{header}:\n```{}```", lines.join("\n"));

        if total > MAX_LISTED_SONGS {
            let hidden = total - MAX_LISTED_SONGS;
            match self.language {
                Language::Portuguese => listing.push_str(&format!("... e mais {hidden}")),
                Language::English => listing.push_str(&format!("... and {hidden} more")),
            }
        }

        listing
    }

    pub fn help(&self, prefix: &str) -> String {
        match self.language {
            Language::Portuguese => format!(
                "**Comandos:**\n\
                 **{prefix}play [URL|Título]** - Toca (ou adiciona à fila) um vídeo pelo link ou pelo título.\n\
                 **{prefix}skip** - Pula a música atual.\n\
                 **{prefix}stop** - Para a música atual e limpa a fila.\n\
                 **{prefix}queue** - Mostra a fila."
            ),
            Language::English => format!(
                "**Commands:**\n\
                 **{prefix}play [URL|Title]** - Plays (or adds to the queue) a video given a URL or a title.\n\
                 **{prefix}skip** - Skips the current song.\n\
                 **{prefix}stop** - Stops the current song and clears the queue.\n\
                 **{prefix}queue** - Shows the queue."
            ),
        }
    }

    /// Curated reply for a failed command. Raw collaborator errors never reach
    /// the channel.
    pub fn for_error(&self, error: &PlaybackError) -> String {
        let text = match error {
            PlaybackError::NotInVoiceChannel(Action::Skip) => self.pick(
                "Você precisa estar em um canal de voz para pular a música!",
                "You must be in a voice channel to skip the song!",
            ),
            PlaybackError::NotInVoiceChannel(Action::Stop) => self.pick(
                "Você precisa estar em um canal de voz para parar a fila!",
                "You must be in a voice channel to stop the queue!",
            ),
            PlaybackError::NotInVoiceChannel(Action::Play) => self.pick(
                "Você precisa estar conectado em um canal de voz!",
                "You must be connected to a voice channel!",
            ),
            PlaybackError::InsufficientPermissions => self.pick(
                "Não tenho permissão para entrar no seu canal de voz!",
                "I don't have permission to join your voice channel!",
            ),
            PlaybackError::NoActiveQueue(Action::Stop) => self.pick(
                "Não há nada tocando para parar!",
                "There is nothing playing to stop!",
            ),
            PlaybackError::NoActiveQueue(_) => {
                self.pick("Não existem músicas para pular!", "There are no songs to skip!")
            }
            PlaybackError::MissingQuery => self.pick(
                "Diga o nome ou o link do vídeo que devo tocar!",
                "Tell me the name or the link of the video to play!",
            ),
            PlaybackError::SearchResolution { query, .. } => {
                return match self.language {
                    Language::Portuguese => format!("Não encontrei nada para `{query}`!"),
                    Language::English => format!("I couldn't find anything for `{query}`!"),
                };
            }
            PlaybackError::MetadataResolution { .. } => self.pick(
                "Não consegui carregar as informações desse vídeo!",
                "I couldn't load that video's information!",
            ),
            PlaybackError::VoiceJoin(_) => self.pick(
                "Não consegui entrar no seu canal de voz!",
                "I couldn't join your voice channel!",
            ),
            PlaybackError::OutputStream(_) => self.pick(
                "Não consegui tocar essa música!",
                "I couldn't play that song!",
            ),
        };

        text.to_string()
    }
}
