//! Remote catalog fetcher.
//!
//! Every resource is a flat JSON array under the configured base URL.  Bodies
//! are decoded straight into the typed model; a body that does not match is a
//! fetch failure, the same as a transport error or a non-2xx status.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use futures_util::Stream as FuturesStream;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::loader::{self, LoadProgress};
use crate::model::{Category, Channel, ChannelWithStream, Country, Feed, Language, Region, Stream};

/// The three collections the channel join needs.
#[derive(Debug, Clone, Default)]
pub struct CatalogSources {
    pub channels: Vec<Channel>,
    pub streams: Vec<Stream>,
    pub feeds: Vec<Feed>,
}

#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(CatalogError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch<T: DeserializeOwned>(&self, resource: &'static str) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url, resource);
        debug!("catalog: GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| CatalogError::Request { resource, source })?;

        let status = response.status();
        if !status.is_success() {
            warn!("catalog: {} returned HTTP {}", resource, status);
            return Err(CatalogError::Status { resource, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| CatalogError::Request { resource, source })?;

        let items: Vec<T> = serde_json::from_slice(&body)
            .map_err(|source| CatalogError::Decode { resource, source })?;
        debug!("catalog: {} -> {} entries", resource, items.len());
        Ok(items)
    }

    pub async fn fetch_channels(&self) -> Result<Vec<Channel>> {
        self.fetch("channels.json").await
    }

    pub async fn fetch_streams(&self) -> Result<Vec<Stream>> {
        self.fetch("streams.json").await
    }

    pub async fn fetch_feeds(&self) -> Result<Vec<Feed>> {
        self.fetch("feeds.json").await
    }

    pub async fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.fetch("categories.json").await
    }

    pub async fn fetch_countries(&self) -> Result<Vec<Country>> {
        self.fetch("countries.json").await
    }

    pub async fn fetch_languages(&self) -> Result<Vec<Language>> {
        self.fetch("languages.json").await
    }

    pub async fn fetch_regions(&self) -> Result<Vec<Region>> {
        self.fetch("regions.json").await
    }

    /// Fetch channels, streams and feeds concurrently. Fails as a whole if
    /// any one of them fails.
    pub async fn fetch_sources(&self) -> Result<CatalogSources> {
        let (channels, streams, feeds) = tokio::try_join!(
            self.fetch_channels(),
            self.fetch_streams(),
            self.fetch_feeds()
        )?;
        info!(
            "catalog: fetched {} channels, {} streams, {} feeds",
            channels.len(),
            streams.len(),
            feeds.len()
        );
        Ok(CatalogSources {
            channels,
            streams,
            feeds,
        })
    }

    /// One-shot join of the whole catalog.
    pub async fn fetch_channels_with_streams(&self) -> Result<Vec<ChannelWithStream>> {
        let sources = self.fetch_sources().await?;
        Ok(join_catalog(&sources))
    }

    /// Fetch the sources, then hand back a lazy stream that joins them batch
    /// by batch. A fetch failure is returned before any batch is produced.
    pub async fn load_progressively(
        &self,
        batch_size: NonZeroUsize,
    ) -> Result<impl FuturesStream<Item = LoadProgress>> {
        let sources = self.fetch_sources().await?;
        Ok(loader::progressive_join(sources, batch_size))
    }
}

/// Streams and feeds grouped by owning channel id, in catalog order.
pub(crate) struct JoinIndex {
    streams: HashMap<String, Vec<Stream>>,
    feeds: HashMap<String, Vec<Feed>>,
}

impl JoinIndex {
    pub(crate) fn build(streams: &[Stream], feeds: &[Feed]) -> Self {
        let mut by_channel: HashMap<String, Vec<Stream>> = HashMap::new();
        for stream in streams {
            if let Some(channel) = &stream.channel {
                by_channel
                    .entry(channel.clone())
                    .or_default()
                    .push(stream.clone());
            }
        }

        let mut feeds_by_channel: HashMap<String, Vec<Feed>> = HashMap::new();
        for feed in feeds {
            feeds_by_channel
                .entry(feed.channel.clone())
                .or_default()
                .push(feed.clone());
        }

        Self {
            streams: by_channel,
            feeds: feeds_by_channel,
        }
    }

    /// Join one channel; `None` when it has no stream.
    pub(crate) fn join(&self, channel: &Channel) -> Option<ChannelWithStream> {
        let streams = self.streams.get(&channel.id)?;
        if streams.is_empty() {
            return None;
        }
        Some(ChannelWithStream {
            channel: channel.clone(),
            streams: streams.clone(),
            feeds: self.feeds.get(&channel.id).cloned().unwrap_or_default(),
        })
    }
}

/// Join every channel to its streams and feeds, dropping channels without a
/// stream. Output keeps channel order.
pub fn join_catalog(sources: &CatalogSources) -> Vec<ChannelWithStream> {
    let index = JoinIndex::build(&sources.streams, &sources.feeds);
    sources
        .channels
        .iter()
        .filter_map(|c| index.join(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            ..Channel::default()
        }
    }

    fn stream(channel: Option<&str>, url: &str) -> Stream {
        Stream {
            channel: channel.map(str::to_string),
            url: url.to_string(),
            ..Stream::default()
        }
    }

    #[test]
    fn test_join_drops_channels_without_streams() {
        let sources = CatalogSources {
            channels: vec![channel("A"), channel("B"), channel("C")],
            streams: vec![
                stream(Some("C"), "http://c/1"),
                stream(Some("A"), "http://a/1"),
                stream(None, "http://orphan"),
                stream(Some("A"), "http://a/2"),
            ],
            feeds: vec![Feed {
                channel: "A".into(),
                id: "SD".into(),
                languages: vec!["eng".into()],
                ..Feed::default()
            }],
        };

        let joined = join_catalog(&sources);
        let ids: Vec<&str> = joined.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["A", "C"]);

        // Stream order within a channel is catalog order
        let urls: Vec<&str> = joined[0].streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a/1", "http://a/2"]);
        assert_eq!(joined[0].feeds.len(), 1);
        assert!(joined[1].feeds.is_empty());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = CatalogConfig {
            base_url: "http://localhost:1/api/".into(),
            ..CatalogConfig::default()
        };
        let client = CatalogClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1/api");
    }
}
