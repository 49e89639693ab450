//! Progressive catalog join.
//!
//! The channel list is joined in contiguous batches so a consumer can show
//! partial results while the rest is still being processed.  The stream
//! yields to the runtime between batches; it never spawns or runs in parallel.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::catalog::{CatalogSources, JoinIndex};
use crate::model::ChannelWithStream;

/// Channels joined so far. Every batch is stored once and shared by all
/// later progress items, so cloning costs one refcount per batch.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    batches: Vec<Arc<[ChannelWithStream]>>,
    len: usize,
}

impl Loaded {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Channels in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelWithStream> {
        self.batches.iter().flat_map(|batch| batch.iter())
    }

    pub fn to_vec(&self) -> Vec<ChannelWithStream> {
        self.iter().cloned().collect()
    }

    fn push_batch(&mut self, batch: Vec<ChannelWithStream>) {
        if batch.is_empty() {
            return;
        }
        self.len += batch.len();
        self.batches.push(batch.into());
    }
}

impl PartialEq for Loaded {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl PartialEq<Vec<ChannelWithStream>> for Loaded {
    fn eq(&self, other: &Vec<ChannelWithStream>) -> bool {
        self.len == other.len() && self.iter().eq(other.iter())
    }
}

/// One step of a progressive load.
#[derive(Debug, Clone)]
pub struct LoadProgress {
    /// Everything joined so far, in channel order.
    pub channels: Loaded,
    /// Source channels consumed so far (joined or dropped).
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
}

impl LoadProgress {
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// `round(min(100, processed / total * 100))`, held at 99 until every
/// channel has been processed so that 100 only ever marks the last batch.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 || processed >= total {
        return 100;
    }
    let pct = (processed as f64 / total as f64 * 100.0).min(100.0).round() as u8;
    pct.min(99)
}

struct LoadState {
    sources: CatalogSources,
    index: Option<JoinIndex>,
    batch_size: usize,
    cursor: usize,
    accumulated: Loaded,
    finished: bool,
}

/// Lazily join `sources` in batches of `batch_size` channels.
///
/// Yields one [`LoadProgress`] per batch; the last item has `percent == 100`
/// and holds the same channels as [`crate::catalog::join_catalog`].  An empty
/// channel list yields a single, empty, complete item.
pub fn progressive_join(
    sources: CatalogSources,
    batch_size: NonZeroUsize,
) -> impl Stream<Item = LoadProgress> {
    let state = LoadState {
        sources,
        index: None,
        batch_size: batch_size.get(),
        cursor: 0,
        accumulated: Loaded::default(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        if st.cursor > 0 {
            tokio::task::yield_now().await;
        }

        let total = st.sources.channels.len();
        let start = st.cursor;
        let end = (start + st.batch_size).min(total);

        let index = st
            .index
            .get_or_insert_with(|| JoinIndex::build(&st.sources.streams, &st.sources.feeds));
        let joined: Vec<_> = st.sources.channels[start..end]
            .iter()
            .filter_map(|channel| index.join(channel))
            .collect();
        st.accumulated.push_batch(joined);

        st.cursor = end;
        st.finished = end >= total;

        let progress = LoadProgress {
            channels: st.accumulated.clone(),
            processed: end,
            total,
            percent: progress_percent(end, total),
        };
        debug!(
            "loader: batch {}..{} of {} -> {} usable ({}%)",
            start,
            end,
            total,
            progress.channels.len(),
            progress.percent
        );
        Some((progress, st))
    })
}
