use std::time::Duration;

use serde::Deserialize;
use serenity::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::PlaybackError;
use crate::models::Song;

const UNKNOWN_TRACK_TITLE: &str = "UNKNOWN TRACK";
const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

/// Turns what the user typed into something playable.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Free text to a canonical video URL.
    async fn search(&self, query: &str) -> Result<String, PlaybackError>;

    /// Video URL to title, canonical URL and duration.
    async fn metadata(&self, url: &str) -> Result<Song, PlaybackError>;
}

pub fn looks_like_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Searches through the YouTube Data API when a key is configured, through
/// `yt-dlp` otherwise. Metadata always comes from `yt-dlp`.
pub struct YoutubeResolver {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl YoutubeResolver {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    async fn search_api(&self, api_key: &str, query: &str) -> Result<String, String> {
        let response: ApiSearchResponse = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", query),
                ("key", api_key),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|why| why.to_string())?
            .json()
            .await
            .map_err(|why| why.to_string())?;

        response.first_video_url().ok_or_else(|| "no results".to_string())
    }

    async fn search_ytdlp(&self, query: &str) -> Result<String, String> {
        let output = run_ytdlp(&["-j", "--flat-playlist", &format!("ytsearch1:{query}")]).await?;

        parse_flat_search(&output).ok_or_else(|| "no results".to_string())
    }
}

#[async_trait]
impl Resolver for YoutubeResolver {
    async fn search(&self, query: &str) -> Result<String, PlaybackError> {
        let result = match &self.api_key {
            Some(api_key) => self.search_api(api_key, query).await,
            None => self.search_ytdlp(query).await,
        };

        match result {
            Ok(url) => {
                info!("Search for {query:?} resolved to {url}");
                Ok(url)
            }
            Err(reason) => Err(PlaybackError::SearchResolution {
                query: query.to_string(),
                reason,
            }),
        }
    }

    async fn metadata(&self, url: &str) -> Result<Song, PlaybackError> {
        let failed = |reason: String| PlaybackError::MetadataResolution {
            url: url.to_string(),
            reason,
        };

        let output = run_ytdlp(&["-j", "--no-playlist", url]).await.map_err(failed)?;

        parse_video_info(&output).map_err(failed)
    }
}

async fn run_ytdlp(args: &[&str]) -> Result<String, String> {
    debug!("Running yt-dlp {args:?}");

    let output = Command::new("yt-dlp")
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|why| format!("yt-dlp command failed to start: {why}"))?;

    let result = String::from_utf8(output.stdout).map_err(|_| "Error reading stdout".to_string())?;

    if output.status.success() && !result.trim().is_empty() {
        Ok(result)
    } else {
        let error = String::from_utf8_lossy(&output.stderr);
        Err(format!("yt-dlp exited with {}: {}", output.status, error.trim()))
    }
}

#[derive(Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    items: Vec<ApiSearchItem>,
}

#[derive(Deserialize)]
struct ApiSearchItem {
    id: ApiVideoId,
}

#[derive(Deserialize)]
struct ApiVideoId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl ApiSearchResponse {
    fn first_video_url(&self) -> Option<String> {
        self.items
            .iter()
            .find_map(|item| item.id.video_id.as_deref())
            .map(watch_url)
    }
}

/// One line of `yt-dlp -j` output. Flat search entries carry only `id` and
/// `url`; full video entries carry the rest.
#[derive(Deserialize)]
struct YtdlpEntry {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
}

fn parse_flat_search(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<YtdlpEntry>(line).ok())
        .find_map(|entry| match (entry.id, entry.url) {
            (Some(id), _) => Some(watch_url(&id)),
            (None, Some(url)) if looks_like_url(&url) => Some(url),
            _ => None,
        })
}

fn parse_video_info(output: &str) -> Result<Song, String> {
    let line = output.lines().find(|line| !line.trim().is_empty()).ok_or("empty yt-dlp output")?;
    let entry: YtdlpEntry = serde_json::from_str(line).map_err(|why| why.to_string())?;

    let url = entry
        .webpage_url
        .or(entry.id.as_deref().map(watch_url))
        .ok_or("video has no URL")?;

    let duration = entry
        .duration
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());

    Ok(Song {
        title: entry.title.unwrap_or(UNKNOWN_TRACK_TITLE.to_string()),
        url,
        duration,
    })
}
