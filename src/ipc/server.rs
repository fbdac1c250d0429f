//! Unix socket server implementation for solbright IPC.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use super::RequestHandler;
use super::events::IpcEvent;
use super::protocol::{Reply, Request, Response};
use crate::common::constants::{IPC_POLL_INTERVAL_MS, SOCKET_FILE_NAME};
use crate::io::lock::runtime_dir;

/// Longest request line accepted before the client is dropped.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub struct IpcSocketServer {
    socket_path: PathBuf,
    listener: UnixListener,
    clients: HashMap<u32, ClientConnection>,
    next_client_id: u32,
}

struct ClientConnection {
    raw_stream: UnixStream,
    writer: BufWriter<UnixStream>,
    /// Bytes received but not yet terminated by a newline
    pending: Vec<u8>,
    subscribed: bool,
    connected_at: Instant,
}

impl ClientConnection {
    fn send_line<T: serde::Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message).context("Failed to serialize IPC message")?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

enum ClientStatus {
    Open,
    Closed,
}

impl IpcSocketServer {
    /// Bind the socket, replacing a leftover socket file.
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("Failed to remove existing socket: {socket_path:?}"))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {socket_path:?}"))?;
        listener
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;

        Ok(Self {
            socket_path,
            listener,
            clients: HashMap::new(),
            next_client_id: 1,
        })
    }

    /// Serve until `running` is cleared.
    pub fn run(
        mut self,
        handler: Arc<dyn RequestHandler>,
        event_receiver: mpsc::Receiver<IpcEvent>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            while let Ok(event) = event_receiver.try_recv() {
                self.broadcast_event(&event, debug_enabled);
            }

            self.accept(debug_enabled)?;
            self.serve_requests(handler.as_ref(), debug_enabled);

            thread::sleep(Duration::from_millis(IPC_POLL_INTERVAL_MS));
        }

        if debug_enabled {
            log_debug!("IPC server shutting down");
        }
        self.cleanup()
    }

    fn broadcast_event(&mut self, event: &IpcEvent, debug_enabled: bool) {
        let mut failed = Vec::new();
        for (client_id, client) in self.clients.iter_mut().filter(|(_, c)| c.subscribed) {
            if client.send_line(event).is_err() {
                failed.push(*client_id);
            }
        }
        for client_id in failed {
            self.remove_client(client_id, debug_enabled);
        }
    }

    fn accept(&mut self, debug_enabled: bool) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    stream
                        .set_nonblocking(true)
                        .context("Failed to set client stream to non-blocking mode")?;
                    let writer_stream = stream
                        .try_clone()
                        .context("Failed to clone stream for writer")?;

                    let client_id = self.next_client_id;
                    self.next_client_id += 1;
                    self.clients.insert(
                        client_id,
                        ClientConnection {
                            raw_stream: stream,
                            writer: BufWriter::new(writer_stream),
                            pending: Vec::new(),
                            subscribed: false,
                            connected_at: Instant::now(),
                        },
                    );
                    if debug_enabled {
                        log_debug!("IPC connections: {}", self.clients.len());
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    if debug_enabled {
                        log_debug!("Error accepting client connection: {e}");
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Read what each client sent and answer complete lines.
    fn serve_requests(&mut self, handler: &dyn RequestHandler, debug_enabled: bool) {
        let mut closed = Vec::new();
        for (client_id, client) in self.clients.iter_mut() {
            if let ClientStatus::Closed = Self::serve_client(client, handler) {
                closed.push(*client_id);
            }
        }
        for client_id in closed {
            self.remove_client(client_id, debug_enabled);
        }
    }

    fn serve_client(client: &mut ClientConnection, handler: &dyn RequestHandler) -> ClientStatus {
        let mut buffer = [0u8; 4096];
        loop {
            match client.raw_stream.read(&mut buffer) {
                Ok(0) => return ClientStatus::Closed,
                Ok(n) => client.pending.extend_from_slice(&buffer[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return ClientStatus::Closed,
            }
        }

        while let Some(newline) = client.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = client.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(line) {
                Ok(Request::Subscribe) => {
                    client.subscribed = true;
                    Response::Ok {
                        reply: Reply::Subscribed,
                    }
                }
                Ok(request) => Response::from_result(handler.handle(request)),
                Err(e) => Response::Error {
                    kind: "invalid_input".to_string(),
                    message: format!("malformed request: {e}"),
                },
            };

            if client.send_line(&response).is_err() {
                return ClientStatus::Closed;
            }
        }

        if client.pending.len() > MAX_REQUEST_BYTES {
            return ClientStatus::Closed;
        }
        ClientStatus::Open
    }

    fn remove_client(&mut self, client_id: u32, debug_enabled: bool) {
        if let Some(client) = self.clients.remove(&client_id)
            && debug_enabled
        {
            let duration = client.connected_at.elapsed();
            if duration.as_secs() < 2 {
                log_debug!(
                    "IPC one-shot client served ({}ms) - connections: {}",
                    duration.as_millis(),
                    self.clients.len()
                );
            } else {
                log_debug!(
                    "IPC client disconnected after {}s - connections: {}",
                    duration.as_secs(),
                    self.clients.len()
                );
            }
        }
    }

    fn cleanup(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket file: {:?}", self.socket_path))?;
        }
        Ok(())
    }
}

/// Socket path for the control socket.
///
/// - Primary: `$XDG_RUNTIME_DIR/solbright.sock`
/// - Fallback: `/run/user/{uid}/solbright.sock`
pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_FILE_NAME)
}
