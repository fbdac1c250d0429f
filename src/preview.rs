//! Rate-limited brightness preview.
//!
//! Dragging a slider produces far more values than a DDC/CI bus can absorb,
//! since each write takes tens of milliseconds and monitors drop commands
//! that arrive too quickly. The throttler sits between the UI and the
//! hardware with one worker thread and, per target:
//!
//! - the first candidate after an idle window is written immediately
//! - later candidates inside the cooldown replace a single pending value
//! - the pending value is flushed as soon as the window reopens
//!
//! `commit` bypasses the throttle: it drops the target's pending value (and a
//! pending `*` value, which covers the target too) and writes synchronously so
//! the caller learns whether the final value landed.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Target name meaning "every live monitor".
pub const ALL_MONITORS: &str = "*";

/// Writes one value to one target. Called only from the worker thread.
pub type PreviewWriter = Box<dyn Fn(&str, u8) -> Result<()> + Send>;

enum PreviewMessage {
    Candidate {
        target: String,
        value: u8,
    },
    Commit {
        target: String,
        value: u8,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct TargetWindow {
    last_write: Option<Instant>,
    pending: Option<u8>,
}

impl TargetWindow {
    fn is_open(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_write
            .is_none_or(|last| now.duration_since(last) >= cooldown)
    }
}

pub struct PreviewThrottler {
    sender: Sender<PreviewMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PreviewThrottler {
    /// Spawn the worker thread.
    pub fn start(cooldown: Duration, writer: PreviewWriter) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("preview-worker".to_string())
            .spawn(move || run_worker(receiver, cooldown, writer))
            .context("Failed to spawn preview worker")?;

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a candidate value. Never blocks on hardware.
    pub fn submit(&self, target: &str, value: u8) {
        let _ = self.sender.send(PreviewMessage::Candidate {
            target: target.to_string(),
            value,
        });
    }

    /// Write `value` now, discarding any pending preview for `target`.
    pub fn commit(&self, target: &str, value: u8) -> Result<()> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(PreviewMessage::Commit {
                target: target.to_string(),
                value,
                reply,
            })
            .map_err(|_| anyhow::anyhow!("Preview worker is not running"))?;

        response
            .recv()
            .map_err(|_| anyhow::anyhow!("Preview worker exited before committing"))?
    }

    /// Flush nothing further and wait for the worker to exit.
    pub fn shutdown(&self) {
        let _ = self.sender.send(PreviewMessage::Shutdown);
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for PreviewThrottler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<PreviewMessage>, cooldown: Duration, writer: PreviewWriter) {
    let mut windows: HashMap<String, TargetWindow> = HashMap::new();

    let write = |target: &str, value: u8| {
        if let Err(e) = writer(target, value) {
            log_warning!("Preview write to {target} failed: {e:#}");
        }
    };

    loop {
        let timeout = next_flush_in(&windows, Instant::now(), cooldown);
        let message = match timeout {
            Some(timeout) => receiver.recv_timeout(timeout),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(PreviewMessage::Candidate { target, value }) => {
                let now = Instant::now();
                let window = windows.entry(target.clone()).or_default();
                if window.is_open(now, cooldown) {
                    window.pending = None;
                    window.last_write = Some(now);
                    write(&target, value);
                } else {
                    window.pending = Some(value);
                }
            }
            Ok(PreviewMessage::Commit {
                target,
                value,
                reply,
            }) => {
                if target == ALL_MONITORS {
                    windows.values_mut().for_each(|w| w.pending = None);
                } else if let Some(all) = windows.get_mut(ALL_MONITORS) {
                    // A later `*` flush would overwrite the committed value
                    all.pending = None;
                }
                let window = windows.entry(target.clone()).or_default();
                window.pending = None;
                window.last_write = Some(Instant::now());
                let _ = reply.send(writer(&target, value));
            }
            Ok(PreviewMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        for (target, window) in windows.iter_mut() {
            if window.is_open(now, cooldown)
                && let Some(value) = window.pending.take()
            {
                window.last_write = Some(now);
                write(target, value);
            }
        }
    }
}

/// Time until the earliest pending value may be flushed.
fn next_flush_in(
    windows: &HashMap<String, TargetWindow>,
    now: Instant,
    cooldown: Duration,
) -> Option<Duration> {
    windows
        .values()
        .filter(|w| w.pending.is_some())
        .filter_map(|w| w.last_write)
        .map(|last| (last + cooldown).saturating_duration_since(now))
        .min()
}
