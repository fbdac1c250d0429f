//! Fullscreen-aware brightness override.
//!
//! While the focused window is fullscreen (a video, a game) the computed
//! brightness is replaced by `fullscreen_brightness`. The override is a
//! two-state machine driven by a poller thread that runs only while the
//! feature is enabled:
//!
//! - `Normal → FullscreenActive`: reported as [`Transition::Entered`]; the
//!   caller applies the override value at once
//! - `FullscreenActive → Normal`: reported as [`Transition::Exited`]; the
//!   caller wakes the main loop, whose next tick restores the curve value
//!
//! Detector errors count as "not fullscreen" so a broken compositor
//! connection can never pin the screen at the override value.

pub mod detect;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::common::constants::MAIN_LOOP_POLL_CHUNK_MS;

pub use detect::{FullscreenDetector, create_detector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullscreenState {
    #[default]
    Normal,
    FullscreenActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Exited,
}

struct Poller {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
pub struct FullscreenOverride {
    state: Mutex<FullscreenState>,
    poller: Mutex<Option<Poller>>,
}

impl FullscreenOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FullscreenState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state() == FullscreenState::FullscreenActive
    }

    /// Feed one detection result, returning the transition it caused.
    pub fn observe(&self, fullscreen: bool) -> Option<Transition> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match (*state, fullscreen) {
            (FullscreenState::Normal, true) => {
                *state = FullscreenState::FullscreenActive;
                Some(Transition::Entered)
            }
            (FullscreenState::FullscreenActive, false) => {
                *state = FullscreenState::Normal;
                Some(Transition::Exited)
            }
            _ => None,
        }
    }

    /// Force the state back to Normal.
    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = FullscreenState::Normal;
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Start polling `detector` every `interval`, calling `on_transition`
    /// from the poller thread. Restarts the poller if one is running.
    pub fn start_poller<F>(
        self: &Arc<Self>,
        mut detector: Box<dyn FullscreenDetector>,
        interval: Duration,
        on_transition: F,
    ) -> Result<()>
    where
        F: Fn(Transition) + Send + 'static,
    {
        self.stop_poller();

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let state = Arc::clone(self);
        let detector_name = detector.name();

        let thread = std::thread::Builder::new()
            .name("fullscreen-poller".to_string())
            .spawn(move || {
                let chunk = Duration::from_millis(MAIN_LOOP_POLL_CHUNK_MS).min(interval);
                while thread_running.load(Ordering::SeqCst) {
                    let fullscreen = match detector.is_fullscreen() {
                        Ok(fullscreen) => fullscreen,
                        Err(e) => {
                            log_debug!("{} detector error: {e:#}", detector.name());
                            false
                        }
                    };

                    if let Some(transition) = state.observe(fullscreen) {
                        on_transition(transition);
                    }

                    let deadline = Instant::now() + interval;
                    while thread_running.load(Ordering::SeqCst) {
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        std::thread::sleep(chunk.min(deadline - now));
                    }
                }
            })
            .context("Failed to spawn fullscreen poller")?;

        log_decorated!(
            "Fullscreen detection active ({detector_name}, every {}ms)",
            interval.as_millis()
        );

        *self.poller.lock().unwrap_or_else(|e| e.into_inner()) = Some(Poller { running, thread });
        Ok(())
    }

    /// Stop the poller and return to Normal.
    pub fn stop_poller(&self) {
        let poller = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(poller) = poller {
            poller.running.store(false, Ordering::SeqCst);
            let _ = poller.thread.join();
        }
        self.reset();
    }
}
