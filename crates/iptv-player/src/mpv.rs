/// mpv as the streaming transport, driven over JSON IPC.
///
/// One mpv process per session:
///
/// ```text
///   MpvTransport::attach(session, candidate)
///         │
///         ├── spawn mpv --idle --input-ipc-server=<socket>
///         ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///         ├── reader_task   ← JSON lines from socket
///         │                      ├── response (has request_id) → matched oneshot::Sender
///         │                      └── event / property-change   → forwarder
///         └── forwarder     ← EventTranslator → PlayerEvent::Transport { session, .. }
/// ```
///
/// `detach` aborts the forwarder before killing the process, so the end of
/// the IPC connection is only reported as a fault when mpv died on its own.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iptv_proto::model::StreamCandidate;
use iptv_proto::platform;
use iptv_proto::playback::{
    PlayerEvent, SessionId, StreamTransport, TransportEvent, TransportFault,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_PAUSED_FOR_CACHE: u64 = 1;
pub const OBS_CACHE_DURATION: u64 = 2;
pub const OBS_VIDEO_HEIGHT: u64 = 3;
/// `duration` is null for live streams.
pub const OBS_DURATION: u64 = 4;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "playback-restart".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key)?.as_str()
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Register the properties the translator reads. Must be called after
    /// every fresh connection.
    pub async fn observe_properties(&self) {
        let props = [
            (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
            (OBS_CACHE_DURATION, "demuxer-cache-duration"),
            (OBS_VIDEO_HEIGHT, "height"),
            (OBS_DURATION, "duration"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }

    /// Load `candidate`, replacing whatever is playing. The transport hints
    /// are set first so they apply to this load only; absent hints clear the
    /// previous candidate's values.
    pub async fn load(&self, candidate: &StreamCandidate) -> anyhow::Result<()> {
        let referrer = candidate.referrer.as_deref().unwrap_or("");
        let user_agent = candidate.user_agent.as_deref().unwrap_or("");
        self.send(json!(["set_property", "referrer", referrer]))
            .await?;
        self.send(json!(["set_property", "user-agent", user_agent]))
            .await?;
        self.send(json!(["loadfile", candidate.url, "replace"]))
            .await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    /// Fall back to software decoding for the next load.
    pub async fn disable_hwdec(&self) -> anyhow::Result<()> {
        self.send(json!(["set_property", "hwdec", "no"])).await?;
        Ok(())
    }
}

// ── connection ────────────────────────────────────────────────────────────────

fn spawn_mpv(volume: f32) -> anyhow::Result<tokio::process::Child> {
    let mpv_binary =
        platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

    let vol_arg = format!(
        "--volume={}",
        (volume * 100.0).clamp(0.0, 100.0).round() as i64
    );

    let child = tokio::process::Command::new(mpv_binary)
        .arg("--idle=yes")
        .arg("--force-window=immediate")
        .arg("--keep-open=no")
        .arg("--cache=yes")
        .arg(platform::mpv_socket_arg())
        .arg("--quiet")
        .arg(vol_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    Ok(child)
}

#[cfg(unix)]
async fn connect(event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
    let socket_path = std::path::PathBuf::from(platform::mpv_socket_name());

    // Wait for socket to appear
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if socket_path.exists() {
            break;
        }
    }
    if !socket_path.exists() {
        anyhow::bail!("mpv IPC socket did not appear");
    }

    let stream = UnixStream::connect(&socket_path).await?;
    info!("mpv: connected to IPC socket");
    let (read_half, write_half) = stream.into_split();
    Ok(start_io_tasks(read_half, write_half, event_tx))
}

#[cfg(windows)]
async fn connect(event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
    let pipe_path = format!(r"\\.\pipe\{}", platform::mpv_socket_name());
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            info!("mpv: connected to named pipe");
            let (read_half, write_half) = tokio::io::split(client);
            return Ok(start_io_tasks(read_half, write_half, event_tx));
        }
    }
    anyhow::bail!("mpv named pipe did not appear")
}

#[cfg(unix)]
async fn remove_stale_socket() {
    let _ = tokio::fs::remove_file(platform::mpv_socket_name()).await;
}

#[cfg(windows)]
async fn remove_stale_socket() {}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(read_half, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader / writer tasks ─────────────────────────────────────────────────────

/// One line received over IPC.
#[derive(Debug)]
enum IpcLine {
    /// Answer to a command we sent, matched by `request_id`.
    Reply {
        req_id: u64,
        result: anyhow::Result<Value>,
    },
    Event(MpvEvent),
}

fn parse_ipc_line(line: &str) -> Option<IpcLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("mpv reader: skipping non-json line {:?}: {}", line, e);
            return None;
        }
    };
    let Some(req_id) = raw.get("request_id").and_then(Value::as_u64) else {
        return Some(IpcLine::Event(MpvEvent { raw }));
    };
    let result = match raw.get("error").and_then(Value::as_str) {
        Some("success") => Ok(raw),
        status => Err(anyhow::anyhow!(
            "mpv error: {}",
            status.unwrap_or("unknown error")
        )),
    };
    Some(IpcLine::Reply { req_id, result })
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, reply) in pending.lock().await.drain() {
        let _ = reply.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(read_half: R, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(read_half).lines();
    let reason = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break "mpv IPC connection closed".to_string(),
            Err(e) => {
                warn!("mpv reader: {}", e);
                break format!("mpv IPC read error: {}", e);
            }
        };
        match parse_ipc_line(&line) {
            Some(IpcLine::Reply { req_id, result }) => match pending.lock().await.remove(&req_id) {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => debug!("mpv reader: reply for unknown req={}", req_id),
            },
            Some(IpcLine::Event(event)) => {
                if event_tx.send(event).await.is_err() {
                    break "mpv event receiver dropped".to_string();
                }
            }
            None => {}
        }
    };
    debug!("mpv reader: stopping, {}", reason);
    fail_pending(&pending, &reason).await;
}

/// Registers each reply slot before its line hits the socket, so the reader
/// can always match the response.
async fn writer_task<W>(mut writer: W, mut requests: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(PendingRequest {
        req_id,
        payload,
        reply,
    }) = requests.recv().await
    {
        pending.lock().await.insert(req_id, reply);
        debug!("mpv writer: req={} {}", req_id, payload.trim_end());

        let written = match writer.write_all(payload.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("mpv writer: {}", e);
            if let Some(reply) = pending.lock().await.remove(&req_id) {
                let _ = reply.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: stopped");
}

// ── event translation ─────────────────────────────────────────────────────────

/// Classify an mpv `end-file` into a transport fault. `None` means the file
/// ended because we asked it to (`stop` on replace, `redirect`) or a finite
/// file ran to its end.
pub fn classify_end_file(reason: &str, file_error: Option<&str>, live: bool) -> Option<TransportFault> {
    match reason {
        "eof" if live => Some(TransportFault::Network("live stream ended".into())),
        "eof" | "stop" | "redirect" => None,
        "error" => Some(classify_file_error(file_error.unwrap_or("unknown error"))),
        "quit" => Some(TransportFault::Element("mpv quit".into())),
        other => Some(TransportFault::Other(format!("end-file reason {}", other))),
    }
}

fn classify_file_error(message: &str) -> TransportFault {
    let lower = message.to_lowercase();
    if ["unrecognized file format", "no audio or video", "decod", "demux"]
        .iter()
        .any(|k| lower.contains(k))
    {
        TransportFault::Media(message.to_string())
    } else if lower.contains("output initialization") {
        TransportFault::Element(message.to_string())
    } else if ["loading failed", "network", "http", "tcp", "timeout", "connection"]
        .iter()
        .any(|k| lower.contains(k))
    {
        TransportFault::Network(message.to_string())
    } else {
        TransportFault::Other(message.to_string())
    }
}

/// Turns raw mpv events of one session into [`TransportEvent`]s.
#[derive(Debug, Default)]
pub struct EventTranslator {
    started: bool,
    buffering: bool,
    duration: Option<f64>,
}

impl EventTranslator {
    fn live(&self) -> bool {
        self.duration.is_none()
    }

    pub fn translate(&mut self, evt: &MpvEvent) -> Option<TransportEvent> {
        if let Some((obs_id, data)) = evt.as_property_change() {
            return match obs_id {
                OBS_PAUSED_FOR_CACHE => {
                    let paused = data.as_bool().unwrap_or(false);
                    if !self.started || paused == self.buffering {
                        return None;
                    }
                    self.buffering = paused;
                    if paused {
                        Some(TransportEvent::Buffering)
                    } else {
                        Some(TransportEvent::Started { live: self.live() })
                    }
                }
                OBS_CACHE_DURATION => data.as_f64().map(TransportEvent::BufferAhead),
                OBS_VIDEO_HEIGHT => data
                    .as_u64()
                    .filter(|h| *h > 0)
                    .map(|h| TransportEvent::QualityChanged(format!("{}p", h))),
                OBS_DURATION => {
                    self.duration = data.as_f64().filter(|d| *d > 0.0);
                    None
                }
                _ => None,
            };
        }

        match evt.event_name() {
            Some("start-file") => {
                *self = Self::default();
                None
            }
            Some("playback-restart") if !self.started => {
                self.started = true;
                Some(TransportEvent::Started { live: self.live() })
            }
            Some("end-file") => {
                let reason = evt.str_field("reason").unwrap_or("unknown");
                info!("mpv: end-file reason={}", reason);
                let fault = classify_end_file(reason, evt.str_field("file_error"), self.live())?;
                self.started = false;
                Some(TransportEvent::Fault(fault))
            }
            _ => None,
        }
    }
}

async fn forward_events(
    session: SessionId,
    mut mpv_rx: mpsc::Receiver<MpvEvent>,
    events: mpsc::Sender<PlayerEvent>,
) {
    let mut translator = EventTranslator::default();
    while let Some(evt) = mpv_rx.recv().await {
        let Some(event) = translator.translate(&evt) else {
            continue;
        };
        if events
            .send(PlayerEvent::Transport { session, event })
            .await
            .is_err()
        {
            return;
        }
    }
    // IPC closed without detach: the process went away.
    warn!("mpv: connection lost for {:?}", session);
    let _ = events
        .send(PlayerEvent::Transport {
            session,
            event: TransportEvent::Fault(TransportFault::Element("mpv exited".into())),
        })
        .await;
}

// ── transport ─────────────────────────────────────────────────────────────────

/// Owns the mpv process and its IPC tasks for the current session.
pub struct MpvTransport {
    events: mpsc::Sender<PlayerEvent>,
    volume: f32,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
    forwarder: Option<JoinHandle<()>>,
    current: Option<StreamCandidate>,
}

impl MpvTransport {
    pub fn new(events: mpsc::Sender<PlayerEvent>, volume: f32) -> Self {
        Self {
            events,
            volume,
            process: None,
            handle: None,
            forwarder: None,
            current: None,
        }
    }

    async fn open(&mut self, session: SessionId, candidate: &StreamCandidate) -> anyhow::Result<()> {
        remove_stale_socket().await;
        info!("mpv: spawning process for {:?}", session);
        self.process = Some(spawn_mpv(self.volume)?);

        let (mpv_tx, mpv_rx) = mpsc::channel::<MpvEvent>(256);
        let handle = connect(mpv_tx).await?;
        handle.observe_properties().await;
        if let Err(e) = handle.set_volume(self.volume).await {
            warn!("mpv: failed to set volume: {}", e);
        }
        self.forwarder = Some(tokio::spawn(forward_events(
            session,
            mpv_rx,
            self.events.clone(),
        )));

        handle.load(candidate).await?;
        self.handle = Some(handle);
        Ok(())
    }

    fn session_parts(&self) -> Result<(MpvHandle, StreamCandidate), TransportFault> {
        match (&self.handle, &self.current) {
            (Some(h), Some(c)) => Ok((h.clone(), c.clone())),
            _ => Err(TransportFault::Element("mpv is not attached".into())),
        }
    }
}

fn element_fault(e: anyhow::Error) -> TransportFault {
    TransportFault::Element(e.to_string())
}

#[async_trait]
impl StreamTransport for MpvTransport {
    async fn attach(
        &mut self,
        session: SessionId,
        candidate: &StreamCandidate,
    ) -> Result<(), TransportFault> {
        info!("mpv: attach {:?} {}", session, candidate.url);
        self.current = Some(candidate.clone());
        self.open(session, candidate).await.map_err(element_fault)
    }

    async fn reload(&mut self) -> Result<(), TransportFault> {
        let (handle, candidate) = self.session_parts()?;
        info!("mpv: reload {}", candidate.url);
        handle.load(&candidate).await.map_err(element_fault)
    }

    async fn recover_media(&mut self) -> Result<(), TransportFault> {
        let (handle, candidate) = self.session_parts()?;
        info!("mpv: recovering decoder for {}", candidate.url);
        if let Err(e) = handle.disable_hwdec().await {
            warn!("mpv: failed to disable hwdec: {}", e);
        }
        handle.load(&candidate).await.map_err(element_fault)
    }

    async fn detach(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.handle = None;
        self.current = None;
        if let Some(mut p) = self.process.take() {
            debug!("mpv: killing process");
            let _ = p.kill().await;
        }
        remove_stale_socket().await;
    }
}
