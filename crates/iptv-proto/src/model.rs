use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;

/// A channel as published in `channels.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alt_names: Vec<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub subdivision: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Category ids; the first one is the display category.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_nsfw: bool,
    #[serde(default)]
    pub launched: Option<String>,
    #[serde(default)]
    pub closed: Option<String>,
    #[serde(default)]
    pub replaced_by: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// A playable endpoint from `streams.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Stream {
    /// Owning channel id; `None` when the stream is not mapped to a channel.
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub feed: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Feed {
    pub channel: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub broadcast_area: Vec<String>,
    #[serde(default)]
    pub timezones: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Country {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub flag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Language {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub countries: Vec<String>,
}

/// A channel joined with its streams and feeds. Values produced by the
/// catalog join always carry at least one stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelWithStream {
    #[serde(flatten)]
    pub channel: Channel,
    pub streams: Vec<Stream>,
    pub feeds: Vec<Feed>,
}

impl ChannelWithStream {
    pub fn id(&self) -> &str {
        &self.channel.id
    }

    pub fn name(&self) -> &str {
        &self.channel.name
    }

    /// Streams in fallback order, as playback candidates.
    pub fn candidates(&self) -> Vec<StreamCandidate> {
        self.streams.iter().map(StreamCandidate::from).collect()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.feeds
            .iter()
            .flat_map(|f| f.languages.iter().map(String::as_str))
    }
}

/// One URL the playback controller may try for a channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamCandidate {
    pub url: String,
    pub quality: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl StreamCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Short label for status output: the quality when known, else the URL.
    pub fn label(&self) -> &str {
        self.quality.as_deref().unwrap_or(&self.url)
    }
}

impl From<&Stream> for StreamCandidate {
    fn from(s: &Stream) -> Self {
        Self {
            url: s.url.clone(),
            quality: s.quality.clone(),
            referrer: s.referrer.clone(),
            user_agent: s.user_agent.clone(),
        }
    }
}

/// Playback controller state.
///
/// Transitions:
///   Idle -> Loading -> Playing
///   Loading | Playing -> Recovering(err) -> Loading
///   Loading | Playing -> Failed(err)
///   any -> Idle (stop) | Loading (channel change, manual retry)
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    /// Waiting out the backoff before retrying the current candidate.
    Recovering(PlaybackError),
    /// Nothing left to try; only a manual retry or a new channel leaves this.
    Failed(PlaybackError),
}

impl PlaybackState {
    pub fn is_failed(&self) -> bool {
        matches!(self, PlaybackState::Failed(_))
    }
}

/// What the front-end renders. Published by the controller after every
/// transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub channel_id: Option<String>,
    pub candidate_index: usize,
    pub candidate_count: usize,
    /// 1-based attempt number for the current candidate.
    pub attempt: u32,
    /// Rendition label from the transport, falling back to the candidate's
    /// catalog quality.
    pub quality: Option<String>,
    pub is_live: bool,
    /// Seconds of media buffered beyond the playback position.
    pub buffer_ahead_secs: f64,
}

impl PlayerSnapshot {
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Loading | PlaybackState::Recovering(_)
        )
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.state {
            PlaybackState::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }
}
