//! IPC client utilities for talking to the running daemon.
//!
//! Used by the CLI subcommands and the integration tests.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::events::IpcEvent;
use super::protocol::{Reply, Request, Response};
use super::server::socket_path;

/// Requests may wait on several DDC/CI transactions with retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IpcClient {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
    socket_path: PathBuf,
    /// Partial event line left over from a timed-out poll
    pending: Vec<u8>,
}

impl IpcClient {
    /// Connect to the daemon's default socket.
    pub fn connect() -> Result<Self> {
        Self::connect_to(&socket_path())
    }

    pub fn connect_to(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).with_context(|| {
            format!(
                "Failed to connect to solbright IPC socket at {:?}. Is solbright running?",
                socket_path
            )
        })?;

        stream
            .set_read_timeout(Some(REQUEST_TIMEOUT))
            .context("Failed to set read timeout on IPC socket")?;

        let reader_stream = stream
            .try_clone()
            .context("Failed to clone stream for reader")?;

        Ok(Self {
            stream,
            reader: BufReader::new(reader_stream),
            socket_path: socket_path.to_path_buf(),
            pending: Vec::new(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response.
    ///
    /// Error responses come back as `Err`, with the [`ControlError`] kind
    /// preserved where the daemon classified it.
    ///
    /// [`ControlError`]: crate::common::error::ControlError
    pub fn request(&mut self, request: &Request) -> Result<Reply> {
        let json = serde_json::to_string(request).context("Failed to serialize request")?;
        self.stream
            .write_all(format!("{json}\n").as_bytes())
            .context("Failed to send request to IPC socket")?;

        let line = self.read_line("response")?;
        let response: Response = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse response JSON: {line}"))?;
        response.into_result()
    }

    /// Switch the connection to event streaming.
    ///
    /// Removes the read timeout: events may be minutes apart.
    pub fn subscribe(&mut self) -> Result<()> {
        match self.request(&Request::Subscribe)? {
            Reply::Subscribed => {}
            other => anyhow::bail!("Unexpected reply to subscribe: {other:?}"),
        }
        self.stream
            .set_read_timeout(None)
            .context("Failed to clear read timeout on IPC socket")?;
        Ok(())
    }

    /// Block until the next event arrives.
    pub fn next_event(&mut self) -> Result<IpcEvent> {
        let line = self.read_line("event")?;
        serde_json::from_str(&line).with_context(|| format!("Failed to parse event JSON: {line}"))
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` when nothing complete arrived in time; a partly
    /// received line is kept for the next call.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<IpcEvent>> {
        self.stream
            .set_read_timeout(Some(timeout))
            .context("Failed to set read timeout on IPC socket")?;

        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => anyhow::bail!("Connection closed by server"),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                let event = serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse event JSON: {line}"))?;
                Ok(Some(event))
            }
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e).context("Failed to read event from IPC socket"),
        }
    }

    fn read_line(&mut self, what: &str) -> Result<String> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .with_context(|| format!("Failed to read {what} from IPC socket"))?;

        if line.trim().is_empty() {
            anyhow::bail!("Connection closed by server");
        }
        Ok(line.trim().to_string())
    }

    /// Check if a daemon is answering on the default socket.
    pub fn is_running() -> bool {
        let path = socket_path();
        path.exists() && UnixStream::connect(&path).is_ok()
    }
}
