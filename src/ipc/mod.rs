//! IPC (Inter-Process Communication) system for solbright.
//!
//! A Unix socket at `$XDG_RUNTIME_DIR/solbright.sock` carries two kinds of
//! traffic, both as JSON lines:
//!
//! - request/response: any client sends a [`Request`] and reads one
//!   [`Response`] back (the CLI subcommands work this way)
//! - events: after `subscribe`, the server pushes [`IpcEvent`]s as the Core
//!   applies brightness, changes phase, refreshes monitors or reloads settings
//!
//! The server runs on its own thread so requests that wait on slow DDC/CI
//! transactions never delay the Core's ticks.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, mpsc};

pub mod client;
pub mod events;
pub mod protocol;
mod server;

pub use client::IpcClient;
pub use events::IpcEvent;
pub use protocol::{FeatureValue, Reply, Request, Response};
pub use server::socket_path;

/// Something that answers control requests.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: Request) -> Result<Reply>;
}

/// Sends typed events from Core (and the controller) to the IPC server.
///
/// Sending never blocks; events are dropped when no server is running.
#[derive(Clone)]
pub struct IpcNotifier {
    event_sender: mpsc::Sender<IpcEvent>,
}

impl IpcNotifier {
    /// Create a notifier and the receiver the server drains.
    pub fn new() -> (Self, mpsc::Receiver<IpcEvent>) {
        let (event_sender, event_receiver) = mpsc::channel();
        (Self { event_sender }, event_receiver)
    }

    pub fn send(&self, event: IpcEvent) {
        let _ = self.event_sender.send(event);
    }
}

/// IPC server running in a background thread.
pub struct IpcServer {
    socket_path: PathBuf,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl IpcServer {
    /// Bind `socket_path` and start serving.
    ///
    /// The socket is bound before this returns, so a client may connect as
    /// soon as it gets `Ok`.
    pub fn start(
        socket_path: PathBuf,
        handler: Arc<dyn RequestHandler>,
        event_receiver: mpsc::Receiver<IpcEvent>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Result<Self> {
        let socket_server = server::IpcSocketServer::new(socket_path.clone())
            .context("Failed to create IPC socket server")?;

        let thread_handle = std::thread::Builder::new()
            .name("ipc-server".to_string())
            .spawn(move || {
                if let Err(e) = socket_server.run(handler, event_receiver, running, debug_enabled)
                {
                    log_pipe!();
                    log_error!("IPC server stopped: {e:#}");
                }
            })
            .context("Failed to spawn IPC server thread")?;

        if debug_enabled {
            log_debug!("IPC server listening on {}", socket_path.display());
        }

        Ok(Self {
            socket_path,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Wait for the server thread to finish.
    ///
    /// The running flag stops the loop; this only joins it.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("IPC server thread panicked"))?;
        }
        Ok(())
    }
}
