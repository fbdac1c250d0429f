//! Signal handling and the message channel into the main loop.
//!
//! Every asynchronous source (Unix signals, D-Bus sleep events, the config
//! watcher, the fullscreen poller, the IPC controller) talks to the Core
//! through one `mpsc` channel of [`SignalMessage`]s.
//!
//! Unix signals:
//! - SIGINT, SIGTERM, SIGHUP → `Shutdown`
//! - SIGUSR2 → `Reload` (same as an edit of the config file)
//! - SIGUSR1 → `RefreshMonitors` (re-enumerate after plugging a screen)

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2},
    iterator::Signals,
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

/// Unified message type for everything that wakes the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    /// Stop the daemon (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
    /// Re-read the configuration file (SIGUSR2 or a file change)
    Reload,
    /// System going to sleep or resuming
    Sleep { resuming: bool },
    /// Run a tick now (settings changed, wall clock jumped)
    Reapply,
    /// Re-enumerate monitors (SIGUSR1 or a client request)
    RefreshMonitors,
    /// The fullscreen override changed state
    FullscreenChanged { active: bool },
}

/// Signal handling state shared between threads.
pub struct SignalState {
    /// Cleared once a shutdown has been requested
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// Cloned by every producer (D-Bus, watcher, poller, IPC)
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    /// A channel and running flag without any OS signal registration.
    pub fn detached() -> Self {
        let (signal_sender, signal_receiver) = mpsc::channel();
        Self {
            running: Arc::new(AtomicBool::new(true)),
            signal_receiver,
            signal_sender,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a shutdown from inside the process.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.signal_sender.send(SignalMessage::Shutdown);
    }
}

/// Map a received Unix signal to the message it triggers.
pub fn message_for_signal(sig: i32) -> Option<SignalMessage> {
    match sig {
        SIGINT | SIGTERM | SIGHUP => Some(SignalMessage::Shutdown),
        SIGUSR2 => Some(SignalMessage::Reload),
        SIGUSR1 => Some(SignalMessage::RefreshMonitors),
        _ => None,
    }
}

fn describe_signal(sig: i32, debug_enabled: bool) -> &'static str {
    match sig {
        SIGINT if debug_enabled => "Received SIGINT (Ctrl+C), initiating graceful shutdown...",
        SIGINT => "Received interrupt signal, initiating graceful shutdown...",
        SIGTERM => "Received termination request, initiating graceful shutdown...",
        SIGHUP => "Received hangup signal, initiating graceful shutdown...",
        SIGUSR2 => "Received configuration reload signal",
        SIGUSR1 => "Received monitor refresh signal",
        _ => "Received unexpected signal",
    }
}

/// Set up signal handling for the daemon.
///
/// Spawns a background thread that turns Unix signals into
/// [`SignalMessage`]s on the returned channel.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let state = SignalState::detached();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2])
        .context("failed to register signal handlers")?;

    let running = state.running.clone();
    let sender = state.signal_sender.clone();

    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            #[cfg(debug_assertions)]
            eprintln!(
                "DEBUG: Signal handler thread starting for PID: {}",
                std::process::id()
            );

            for sig in signals.forever() {
                let Some(message) = message_for_signal(sig) else {
                    continue;
                };

                log_pipe!();
                log_info!("{}", describe_signal(sig, debug_enabled));

                let shutdown = message == SignalMessage::Shutdown;
                if shutdown {
                    running.store(false, Ordering::SeqCst);
                }

                if sender.send(message).is_err() {
                    // Main loop is gone; nothing left to notify
                    #[cfg(debug_assertions)]
                    eprintln!("DEBUG: Signal channel disconnected, signal thread exiting");
                    running.store(false, Ordering::SeqCst);
                    break;
                }

                // Later termination requests are redundant; the loop is already stopping
                if shutdown {
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(message_for_signal(SIGTERM), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(SIGINT), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(SIGHUP), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(SIGUSR2), Some(SignalMessage::Reload));
        assert_eq!(
            message_for_signal(SIGUSR1),
            Some(SignalMessage::RefreshMonitors)
        );
        assert_eq!(message_for_signal(0), None);
    }

    #[test]
    fn test_request_shutdown() {
        let state = SignalState::detached();
        assert!(state.is_running());
        state.request_shutdown();
        assert!(!state.is_running());
        assert_eq!(
            state.signal_receiver.try_recv().unwrap(),
            SignalMessage::Shutdown
        );
    }
}
