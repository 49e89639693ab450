#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use iptv_proto::model::{PlaybackState, PlayerSnapshot, StreamCandidate};
use iptv_proto::playback::{
    PlaybackController, PlayerEvent, RetryPolicy, SessionId, StreamTransport, TransportEvent,
    TransportFault,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Attach(String),
    Reload(String),
    RecoverMedia(String),
    Detach,
}

/// Scripted outcome for one URL.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Starts playing, reporting the given rendition.
    Play { live: bool, quality: Option<String> },
    /// Reports this fault after every attach / reload / recovery.
    Fail(TransportFault),
    /// `attach` itself returns the fault.
    RefuseAttach(TransportFault),
    /// Fails `failures` times, then plays.
    FailThenPlay { failures: u32, fault: TransportFault },
}

impl Behavior {
    pub fn play() -> Self {
        Behavior::Play {
            live: true,
            quality: None,
        }
    }

    pub fn element() -> Self {
        Behavior::Fail(TransportFault::Element("video element error".into()))
    }
}

#[derive(Default)]
pub struct MockLog {
    pub calls: Vec<(Call, Instant)>,
    /// Attaches made while a previous instance was still attached.
    pub overlapping_attaches: usize,
    outcomes: HashMap<String, u32>,
}

#[derive(Clone, Default)]
pub struct MockHandle {
    script: Arc<Mutex<HashMap<String, Behavior>>>,
    log: Arc<Mutex<MockLog>>,
}

impl MockHandle {
    pub fn script(&self, url: &str, behavior: Behavior) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Calls other than `Detach`, in order.
    pub fn work_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Detach)
            .collect()
    }

    pub fn call_times(&self) -> Vec<(Call, Instant)> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn overlapping_attaches(&self) -> usize {
        self.log.lock().unwrap().overlapping_attaches
    }
}

pub struct MockTransport {
    events: mpsc::Sender<PlayerEvent>,
    handle: MockHandle,
    current: Option<(SessionId, String)>,
}

impl MockTransport {
    pub fn new(events: mpsc::Sender<PlayerEvent>, handle: MockHandle) -> Self {
        Self {
            events,
            handle,
            current: None,
        }
    }

    fn record(&self, call: Call) {
        self.handle
            .log
            .lock()
            .unwrap()
            .calls
            .push((call, Instant::now()));
    }

    /// Decide what the current source does on this attempt.
    fn outcome(&self, url: &str) -> Result<Vec<TransportEvent>, TransportFault> {
        let behavior = self
            .handle
            .script
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(Behavior::element);

        let mut log = self.handle.log.lock().unwrap();
        let seen = log.outcomes.entry(url.to_string()).or_insert(0);
        *seen += 1;

        let started = |live: bool, quality: Option<String>| {
            let mut events = vec![TransportEvent::Started { live }];
            if let Some(q) = quality {
                events.push(TransportEvent::QualityChanged(q));
            }
            events.push(TransportEvent::BufferAhead(4.5));
            events
        };

        match behavior {
            Behavior::Play { live, quality } => Ok(started(live, quality)),
            Behavior::Fail(fault) => Ok(vec![TransportEvent::Fault(fault)]),
            Behavior::RefuseAttach(fault) => Err(fault),
            Behavior::FailThenPlay { failures, fault } => {
                if *seen <= failures {
                    Ok(vec![TransportEvent::Fault(fault)])
                } else {
                    Ok(started(true, None))
                }
            }
        }
    }

    async fn emit(&self, result: Result<Vec<TransportEvent>, TransportFault>) -> Result<(), TransportFault> {
        let Some((session, _)) = &self.current else {
            return Ok(());
        };
        match result {
            Ok(events) => {
                for event in events {
                    let _ = self
                        .events
                        .send(PlayerEvent::Transport {
                            session: *session,
                            event,
                        })
                        .await;
                }
                Ok(())
            }
            Err(fault) => Err(fault),
        }
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn attach(
        &mut self,
        session: SessionId,
        candidate: &StreamCandidate,
    ) -> Result<(), TransportFault> {
        if self.current.is_some() {
            self.handle.log.lock().unwrap().overlapping_attaches += 1;
        }
        self.record(Call::Attach(candidate.url.clone()));
        self.current = Some((session, candidate.url.clone()));
        let outcome = self.outcome(&candidate.url);
        self.emit(outcome).await
    }

    async fn reload(&mut self) -> Result<(), TransportFault> {
        let url = self.current.as_ref().map(|(_, u)| u.clone()).unwrap_or_default();
        self.record(Call::Reload(url.clone()));
        let outcome = self.outcome(&url).or_else(|f| Ok(vec![TransportEvent::Fault(f)]));
        self.emit(outcome).await
    }

    async fn recover_media(&mut self) -> Result<(), TransportFault> {
        let url = self.current.as_ref().map(|(_, u)| u.clone()).unwrap_or_default();
        self.record(Call::RecoverMedia(url.clone()));
        let outcome = self.outcome(&url).or_else(|f| Ok(vec![TransportEvent::Fault(f)]));
        self.emit(outcome).await
    }

    async fn detach(&mut self) {
        self.record(Call::Detach);
        self.current = None;
    }
}

pub struct Harness {
    pub events: mpsc::Sender<PlayerEvent>,
    pub snapshots: watch::Receiver<PlayerSnapshot>,
    pub mock: MockHandle,
}

/// Spawn a controller over a mock transport on the current runtime.
pub fn spawn_controller(policy: RetryPolicy) -> Harness {
    let (tx, rx) = mpsc::channel(64);
    let mock = MockHandle::default();
    let transport = MockTransport::new(tx.clone(), mock.clone());
    let controller = PlaybackController::new(transport, policy, tx.clone());
    let snapshots = controller.subscribe();
    tokio::spawn(controller.run(rx));
    Harness {
        events: tx,
        snapshots,
        mock,
    }
}

/// Controller and inbox for tests that drive `handle` by hand.
pub fn manual_controller(
    policy: RetryPolicy,
) -> (
    PlaybackController<MockTransport>,
    mpsc::Receiver<PlayerEvent>,
    MockHandle,
) {
    let (tx, rx) = mpsc::channel(64);
    let mock = MockHandle::default();
    let transport = MockTransport::new(tx.clone(), mock.clone());
    (PlaybackController::new(transport, policy, tx), rx, mock)
}

/// Feed every queued event back into the controller.
pub async fn pump(
    controller: &mut PlaybackController<MockTransport>,
    rx: &mut mpsc::Receiver<PlayerEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        controller.handle(event).await;
    }
}

pub fn candidates(urls: &[&str]) -> Vec<StreamCandidate> {
    urls.iter().map(|u| StreamCandidate::new(*u)).collect()
}

pub async fn wait_until(
    snapshots: &mut watch::Receiver<PlayerSnapshot>,
    pred: impl FnMut(&PlayerSnapshot) -> bool,
) -> PlayerSnapshot {
    tokio::time::timeout(Duration::from_secs(600), snapshots.wait_for(pred))
        .await
        .expect("timed out waiting for player state")
        .expect("controller dropped")
        .clone()
}

pub fn settled(s: &PlayerSnapshot) -> bool {
    matches!(s.state, PlaybackState::Playing | PlaybackState::Failed(_))
}
