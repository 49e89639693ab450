//! Playback controller: stream fallback with a per-candidate retry budget.
//!
//! The controller is a single-owner event loop in the same shape as a daemon
//! core: every input (user commands, transport events, backoff timers) is a
//! [`PlayerEvent`] on one mpsc channel, and the controller is the only code
//! that touches the [`StreamTransport`].  State is published on a `watch`
//! channel after every transition.
//!
//! ```text
//!   Select ──> attach(candidate 0) ──> Started ──> Playing
//!                    │
//!                  Fault ──(attempts left)──> Recovering ──backoff──> reattach | reload | recover_media
//!                    │
//!                    └──(budget spent / Other)──> next candidate ──(none left)──> Failed
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::model::{PlaybackState, PlayerSnapshot, StreamCandidate};

/// Identifies one attach of one candidate. Events tagged with an older
/// session are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Closed classification of transport failures.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFault {
    /// The player itself failed to open or died.
    Element(String),
    /// Fatal network error inside the streaming layer.
    Network(String),
    /// Fatal demux/decode error inside the streaming layer.
    Media(String),
    /// Anything else the streaming layer gave up on.
    Other(String),
}

/// How a recoverable fault is retried once the backoff has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Reattach,
    Reload,
    RecoverMedia,
}

impl TransportFault {
    pub fn recovery(&self) -> Option<Recovery> {
        match self {
            TransportFault::Element(_) => Some(Recovery::Reattach),
            TransportFault::Network(_) => Some(Recovery::Reload),
            TransportFault::Media(_) => Some(Recovery::RecoverMedia),
            TransportFault::Other(_) => None,
        }
    }
}

impl From<TransportFault> for PlaybackError {
    fn from(fault: TransportFault) -> Self {
        match fault {
            TransportFault::Element(m) => PlaybackError::Transport(m),
            TransportFault::Network(m) => PlaybackError::FatalNetwork(m),
            TransportFault::Media(m) => PlaybackError::FatalMedia(m),
            TransportFault::Other(m) => PlaybackError::FatalOther(m),
        }
    }
}

/// Things a transport reports about the session it is running.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Media is flowing. `live` is false for finite (timeshift/VOD) media.
    Started { live: bool },
    /// Playback stalled waiting for data.
    Buffering,
    QualityChanged(String),
    /// Seconds buffered ahead of the playback position.
    BufferAhead(f64),
    Fault(TransportFault),
}

/// The streaming layer the controller drives.
///
/// At most one session exists at a time: the controller always calls
/// `detach` before the next `attach`.  Transports report progress by sending
/// [`PlayerEvent::Transport`] with the session id they were attached with.
#[async_trait]
pub trait StreamTransport: Send {
    /// Create a fresh player instance and start loading `candidate`.
    async fn attach(
        &mut self,
        session: SessionId,
        candidate: &StreamCandidate,
    ) -> Result<(), TransportFault>;

    /// Restart loading the current source on the existing instance.
    async fn reload(&mut self) -> Result<(), TransportFault>;

    /// Reset the decode pipeline of the existing instance.
    async fn recover_media(&mut self) -> Result<(), TransportFault>;

    /// Detach media and destroy the instance. Must be safe to call when
    /// nothing is attached.
    async fn detach(&mut self);
}

/// All inputs into the controller loop.
#[derive(Debug)]
pub enum PlayerEvent {
    /// Play a channel from its first candidate.
    Select {
        channel_id: String,
        candidates: Vec<StreamCandidate>,
    },
    /// User-invoked retry of one candidate; skips the backoff.
    Retry { index: usize },
    Stop,
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    /// Backoff elapsed for the retry scheduled in `epoch`.
    RetryDue { epoch: u64 },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per candidate, first one included.
    pub attempts_per_candidate: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_candidate: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&PlaybackConfig> for RetryPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            attempts_per_candidate: config.attempts_per_candidate.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

enum Step {
    Retry(Recovery),
    Advance,
}

pub struct PlaybackController<T: StreamTransport> {
    transport: T,
    policy: RetryPolicy,
    /// Our own inbox, used by backoff timers.
    events_tx: mpsc::Sender<PlayerEvent>,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    snapshot: PlayerSnapshot,
    channel_id: Option<String>,
    candidates: Vec<StreamCandidate>,
    index: usize,
    /// Failed attempts on the current candidate since it last started.
    retries: u32,
    /// Bumped whenever the candidate changes; stale backoff timers compare
    /// against it.
    epoch: u64,
    session: Option<SessionId>,
    next_session: u64,
    pending: Option<Recovery>,
}

impl<T: StreamTransport> PlaybackController<T> {
    pub fn new(transport: T, policy: RetryPolicy, events_tx: mpsc::Sender<PlayerEvent>) -> Self {
        let (snapshot_tx, _) = watch::channel(PlayerSnapshot::default());
        Self {
            transport,
            policy,
            events_tx,
            snapshot_tx,
            snapshot: PlayerSnapshot::default(),
            channel_id: None,
            candidates: Vec::new(),
            index: 0,
            retries: 0,
            epoch: 0,
            session: None,
            next_session: 1,
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> &PlayerSnapshot {
        &self.snapshot
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Session of the currently attached candidate, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Run until `Shutdown`, then detach.
    pub async fn run(mut self, mut events: mpsc::Receiver<PlayerEvent>) {
        info!("playback: controller started");
        while let Some(event) = events.recv().await {
            if !self.handle(event).await {
                info!("playback: shutdown requested");
                break;
            }
        }
        self.teardown().await;
    }

    /// Apply one event. Returns false on `Shutdown`.
    pub async fn handle(&mut self, event: PlayerEvent) -> bool {
        match event {
            PlayerEvent::Select {
                channel_id,
                candidates,
            } => self.select(channel_id, candidates).await,
            PlayerEvent::Retry { index } => self.manual_retry(index).await,
            PlayerEvent::Stop => self.stop().await,
            PlayerEvent::Transport { session, event } => {
                self.on_transport(session, event).await
            }
            PlayerEvent::RetryDue { epoch } => self.on_retry_due(epoch).await,
            PlayerEvent::Shutdown => return false,
        }
        true
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn select(&mut self, channel_id: String, candidates: Vec<StreamCandidate>) {
        info!(
            "playback: select {} ({} candidates)",
            channel_id,
            candidates.len()
        );
        self.teardown().await;
        self.epoch += 1;
        self.pending = None;
        self.channel_id = Some(channel_id);
        self.candidates = candidates;
        self.index = 0;
        self.retries = 0;
        self.snapshot.is_live = false;
        self.snapshot.quality = None;
        self.snapshot.buffer_ahead_secs = 0.0;

        if self.candidates.is_empty() {
            warn!("playback: channel has no stream candidates");
            self.set_state(PlaybackState::Failed(PlaybackError::NoStreamsAvailable));
            return;
        }
        self.start_candidate(0).await;
    }

    async fn manual_retry(&mut self, index: usize) {
        if self.channel_id.is_none() {
            debug!("playback: retry with no channel selected");
            return;
        }
        if self.candidates.is_empty() {
            self.set_state(PlaybackState::Failed(PlaybackError::NoStreamsAvailable));
            return;
        }
        let index = if index < self.candidates.len() { index } else { 0 };
        info!("playback: manual retry of candidate {}", index);
        self.start_candidate(index).await;
    }

    async fn stop(&mut self) {
        info!("playback: stop");
        self.teardown().await;
        self.epoch += 1;
        self.pending = None;
        self.channel_id = None;
        self.candidates.clear();
        self.index = 0;
        self.retries = 0;
        self.snapshot = PlayerSnapshot::default();
        self.publish();
    }

    // ── transport input ───────────────────────────────────────────────────────

    async fn on_transport(&mut self, session: SessionId, event: TransportEvent) {
        if self.session != Some(session) {
            debug!("playback: dropping {:?} from stale session {:?}", event, session);
            return;
        }
        match event {
            TransportEvent::Started { live } => {
                if self.retries > 0 {
                    info!("playback: recovered after {} retries", self.retries);
                }
                self.retries = 0;
                self.snapshot.is_live = live;
                self.set_state(PlaybackState::Playing);
            }
            TransportEvent::Buffering => {
                if self.snapshot.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Loading);
                }
            }
            TransportEvent::QualityChanged(quality) => {
                self.snapshot.quality = Some(quality);
                self.publish();
            }
            TransportEvent::BufferAhead(secs) => {
                self.snapshot.buffer_ahead_secs = secs.max(0.0);
                self.publish();
            }
            TransportEvent::Fault(fault) => {
                if self.pending.is_some() {
                    debug!("playback: retry already scheduled, ignoring {:?}", fault);
                    return;
                }
                warn!(
                    "playback: candidate {} failed: {:?}",
                    self.index, fault
                );
                self.on_fault(fault).await;
            }
        }
    }

    async fn on_retry_due(&mut self, epoch: u64) {
        if epoch != self.epoch {
            debug!("playback: stale retry timer (epoch {} != {})", epoch, self.epoch);
            return;
        }
        let Some(recovery) = self.pending.take() else {
            return;
        };
        self.retries += 1;
        info!(
            "playback: retrying candidate {} via {:?} (attempt {}/{})",
            self.index,
            recovery,
            self.retries + 1,
            self.policy.attempts_per_candidate
        );

        let result = match recovery {
            Recovery::Reattach => {
                self.teardown().await;
                self.open_session().await
            }
            Recovery::Reload => {
                self.set_state(PlaybackState::Loading);
                self.transport.reload().await
            }
            Recovery::RecoverMedia => {
                self.set_state(PlaybackState::Loading);
                self.transport.recover_media().await
            }
        };
        if let Err(fault) = result {
            warn!("playback: recovery failed: {:?}", fault);
            self.on_fault(fault).await;
        }
    }

    // ── policy ────────────────────────────────────────────────────────────────

    fn plan(&self, fault: &TransportFault) -> Step {
        match fault.recovery() {
            Some(recovery) if self.retries + 1 < self.policy.attempts_per_candidate => {
                Step::Retry(recovery)
            }
            _ => Step::Advance,
        }
    }

    async fn on_fault(&mut self, mut fault: TransportFault) {
        loop {
            match self.plan(&fault) {
                Step::Retry(recovery) => {
                    self.schedule_retry(recovery, fault);
                    return;
                }
                Step::Advance => {
                    let next = self.index + 1;
                    if next >= self.candidates.len() {
                        self.exhaust().await;
                        return;
                    }
                    info!(
                        "playback: trying candidate {}/{}",
                        next + 1,
                        self.candidates.len()
                    );
                    self.teardown().await;
                    self.begin_candidate(next);
                    match self.open_session().await {
                        Ok(()) => return,
                        Err(f) => fault = f,
                    }
                }
            }
        }
    }

    fn schedule_retry(&mut self, recovery: Recovery, fault: TransportFault) {
        self.pending = Some(recovery);
        self.set_state(PlaybackState::Recovering(fault.into()));

        let tx = self.events_tx.clone();
        let epoch = self.epoch;
        let delay = self.policy.backoff;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::RetryDue { epoch }).await;
        });
    }

    async fn exhaust(&mut self) {
        error!(
            "playback: all {} candidates failed for {}",
            self.candidates.len(),
            self.channel_id.as_deref().unwrap_or("?")
        );
        self.teardown().await;
        self.set_state(PlaybackState::Failed(PlaybackError::AllCandidatesExhausted));
    }

    // ── session lifecycle ─────────────────────────────────────────────────────

    async fn start_candidate(&mut self, index: usize) {
        self.teardown().await;
        self.begin_candidate(index);
        if let Err(fault) = self.open_session().await {
            warn!("playback: attach failed: {:?}", fault);
            self.on_fault(fault).await;
        }
    }

    fn begin_candidate(&mut self, index: usize) {
        self.epoch += 1;
        self.pending = None;
        self.index = index;
        self.retries = 0;
    }

    async fn open_session(&mut self) -> Result<(), TransportFault> {
        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.session = Some(session);

        let candidate = self.candidates[self.index].clone();
        self.snapshot.quality = candidate.quality.clone();
        self.snapshot.buffer_ahead_secs = 0.0;
        self.set_state(PlaybackState::Loading);

        debug!(
            "playback: attach {:?} candidate {} {}",
            session, self.index, candidate.url
        );
        self.transport.attach(session, &candidate).await
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("playback: detach {:?}", session);
            self.transport.detach().await;
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.snapshot.state != state {
            debug!("playback: {:?} -> {:?}", self.snapshot.state, state);
        }
        self.snapshot.state = state;
        self.publish();
    }

    fn publish(&mut self) {
        self.snapshot.channel_id = self.channel_id.clone();
        self.snapshot.candidate_index = self.index;
        self.snapshot.candidate_count = self.candidates.len();
        self.snapshot.attempt = if self.channel_id.is_some() {
            self.retries + 1
        } else {
            0
        };
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}
