//! Channel filtering and ranking over the joined catalog.

use serde::{Deserialize, Serialize};

use crate::model::{ChannelWithStream, Stream};

/// Preferred renditions, best first.
const QUALITY_ORDER: [&str; 5] = ["1080p", "720p", "480p", "360p", "240p"];

/// User-facing filter fields. `None` and empty strings both mean
/// "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub search: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

/// A single channel predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring over name, alt names, categories, network.
    /// Holds the lowercased needle.
    Search(String),
    Category(String),
    Country(String),
    Language(String),
}

impl Predicate {
    pub fn matches(&self, channel: &ChannelWithStream) -> bool {
        let c = &channel.channel;
        match self {
            Predicate::Search(needle) => {
                c.name.to_lowercase().contains(needle)
                    || c.alt_names.iter().any(|n| n.to_lowercase().contains(needle))
                    || c.categories.iter().any(|n| n.to_lowercase().contains(needle))
                    || c.network
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(needle))
            }
            Predicate::Category(id) => c.categories.iter().any(|x| x == id),
            Predicate::Country(code) => c.country == *code,
            Predicate::Language(code) => channel.languages().any(|l| l == code),
        }
    }
}

fn active(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    /// Active fields as predicates, in evaluation order.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut out = Vec::new();
        if let Some(s) = active(&self.search) {
            out.push(Predicate::Search(s.to_lowercase()));
        }
        if let Some(s) = active(&self.country) {
            out.push(Predicate::Country(s.to_string()));
        }
        if let Some(s) = active(&self.category) {
            out.push(Predicate::Category(s.to_string()));
        }
        if let Some(s) = active(&self.language) {
            out.push(Predicate::Language(s.to_string()));
        }
        out
    }

    /// A filter requiring both option sets.
    pub fn and(&self, other: &FilterOptions) -> Filter {
        Filter::from(self).and(other)
    }
}

/// A conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl From<&FilterOptions> for Filter {
    fn from(options: &FilterOptions) -> Self {
        Self {
            predicates: options.predicates(),
        }
    }
}

impl Filter {
    /// Both filters must match.
    pub fn and(mut self, other: impl Into<Filter>) -> Self {
        self.predicates.extend(other.into().predicates);
        self
    }

    pub fn matches(&self, channel: &ChannelWithStream) -> bool {
        self.predicates.iter().all(|p| p.matches(channel))
    }

    /// Matching channels in input order.
    pub fn apply(&self, channels: &[ChannelWithStream]) -> Vec<ChannelWithStream> {
        channels
            .iter()
            .filter(|c| !c.streams.is_empty() && self.matches(c))
            .cloned()
            .collect()
    }
}

pub fn filter_channels(
    channels: &[ChannelWithStream],
    options: &FilterOptions,
) -> Vec<ChannelWithStream> {
    Filter::from(options).apply(channels)
}

pub fn channels_by_category(
    channels: &[ChannelWithStream],
    category: &str,
) -> Vec<ChannelWithStream> {
    Filter {
        predicates: vec![Predicate::Category(category.to_string())],
    }
    .apply(channels)
}

pub fn channels_by_country(channels: &[ChannelWithStream], country: &str) -> Vec<ChannelWithStream> {
    Filter {
        predicates: vec![Predicate::Country(country.to_string())],
    }
    .apply(channels)
}

/// Channels with the most streams plus feeds first; ties keep catalog order.
pub fn popular_channels(channels: &[ChannelWithStream], limit: usize) -> Vec<ChannelWithStream> {
    let mut ranked: Vec<&ChannelWithStream> = channels.iter().collect();
    ranked.sort_by_key(|c| std::cmp::Reverse(c.streams.len() + c.feeds.len()));
    ranked.into_iter().take(limit).cloned().collect()
}

/// Highest known rendition, or the first stream when none is labelled.
pub fn best_quality_stream(streams: &[Stream]) -> Option<&Stream> {
    QUALITY_ORDER
        .iter()
        .find_map(|q| streams.iter().find(|s| s.quality.as_deref() == Some(*q)))
        .or_else(|| streams.first())
}
