//! Interactive playback of one channel: owns the controller task, turns
//! snapshots into status lines and stdin lines into controller commands.

use iptv_proto::config::Config;
use iptv_proto::model::{ChannelWithStream, PlaybackState, PlayerSnapshot, StreamCandidate};
use iptv_proto::playback::{PlaybackController, PlayerEvent, RetryPolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpv::MpvTransport;

/// A line typed while a channel plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `r` retries the current candidate, `r N` candidate N (1-based).
    Retry(Option<usize>),
    Stop,
    Quit,
    Help,
}

pub fn parse_input(line: &str) -> Option<Input> {
    let mut parts = line.split_whitespace();
    let input = match parts.next()? {
        "r" | "retry" => {
            let index = match parts.next() {
                Some(n) => Some(n.parse::<usize>().ok()?.saturating_sub(1)),
                None => None,
            };
            Input::Retry(index)
        }
        "s" | "stop" => Input::Stop,
        "q" | "quit" => Input::Quit,
        "h" | "help" | "?" => Input::Help,
        _ => return None,
    };
    Some(input)
}

/// Start from candidate `first` and fall back through the rest in order.
pub fn rotate_candidates(mut candidates: Vec<StreamCandidate>, first: usize) -> Vec<StreamCandidate> {
    if first < candidates.len() {
        candidates.rotate_left(first);
    }
    candidates
}

/// Nothing more can happen without user input: playback failed, or was
/// stopped after the channel had been selected.
pub fn awaits_input(snap: &PlayerSnapshot, selected: bool) -> bool {
    match snap.state {
        PlaybackState::Failed(_) => true,
        PlaybackState::Idle => selected,
        _ => false,
    }
}

/// One status line for `snap`.
pub fn render(snap: &PlayerSnapshot, candidates: &[StreamCandidate], attempts: u32) -> String {
    let channel = snap.channel_id.as_deref().unwrap_or("-");
    let source = candidates
        .get(snap.candidate_index)
        .map(|c| c.label().to_string())
        .unwrap_or_default();
    let position = format!(
        "stream {}/{}",
        snap.candidate_index + 1,
        snap.candidate_count
    );

    match &snap.state {
        PlaybackState::Idle => format!("[idle] {}", channel),
        PlaybackState::Loading => format!(
            "[loading] {} {} ({}) attempt {}/{}",
            channel, position, source, snap.attempt, attempts
        ),
        PlaybackState::Playing => {
            let quality = snap.quality.as_deref().unwrap_or("auto");
            let kind = if snap.is_live { "live" } else { "vod" };
            format!(
                "[playing] {} {} {} {} buffer {:.1}s",
                channel, position, quality, kind, snap.buffer_ahead_secs
            )
        }
        PlaybackState::Recovering(err) => format!(
            "[retrying] {} {} after: {}",
            channel, position, err
        ),
        PlaybackState::Failed(err) => format!("[failed] {}: {}", channel, err),
    }
}

/// Play `channel` until the user quits or Ctrl-C.
pub async fn play(config: &Config, channel: &ChannelWithStream, first: usize) -> anyhow::Result<()> {
    let candidates = rotate_candidates(channel.candidates(), first);
    let policy = RetryPolicy::from(&config.playback);

    // Event channel: transport events, backoff timers and our commands
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);
    let transport = MpvTransport::new(event_tx.clone(), config.playback.volume);
    let controller = PlaybackController::new(transport, policy, event_tx.clone());
    let mut snapshots = controller.subscribe();
    let core = tokio::spawn(controller.run(event_rx));

    println!("{} ({})", channel.name(), channel.id());
    event_tx
        .send(PlayerEvent::Select {
            channel_id: channel.id().to_string(),
            candidates: candidates.clone(),
        })
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut selected = false;
    let mut last_line = String::new();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                let line = render(&snap, &candidates, policy.attempts_per_candidate);
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
                selected |= snap.channel_id.is_some();
                if awaits_input(&snap, selected) {
                    if !stdin_open {
                        break;
                    }
                    if snap.state.is_failed() {
                        println!("r [N] to retry, q to quit");
                    }
                }
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    closed => {
                        match closed {
                            Err(e) => warn!("session: stdin read failed: {}", e),
                            _ => debug!("session: stdin closed"),
                        }
                        stdin_open = false;
                        if awaits_input(&snapshots.borrow(), selected) {
                            break;
                        }
                        continue;
                    }
                };
                match parse_input(&line) {
                    Some(Input::Retry(index)) => {
                        let index = index.unwrap_or(snapshots.borrow().candidate_index);
                        event_tx.send(PlayerEvent::Retry { index }).await?;
                    }
                    Some(Input::Stop) => event_tx.send(PlayerEvent::Stop).await?,
                    Some(Input::Quit) => break,
                    Some(Input::Help) | None => {
                        println!("r [N] retry stream N, s stop, q quit");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("session: interrupted");
                break;
            }
        }
    }

    let failed = snapshots.borrow().error_message();
    let _ = event_tx.send(PlayerEvent::Shutdown).await;
    if let Err(e) = core.await {
        warn!("session: controller task failed: {}", e);
    }

    match failed {
        Some(message) => anyhow::bail!("{}: {}", channel.id(), message),
        None => Ok(()),
    }
}
