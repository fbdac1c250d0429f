//! Small helpers shared across modules.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::signal;
use nix::unistd::Pid;

/// Display a path with the home directory replaced by `~`.
///
/// Keeps user names out of logs that people paste into bug reports.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }
    path.display().to_string()
}

/// Check whether a process with this PID is alive.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(raw), None).is_ok()
}

/// Run a command and collect its output, killing it once `timeout` elapses.
///
/// The hardware and window-system helpers we shell out to can hang on a
/// misbehaving device; this keeps every call bounded. Both pipes are drained
/// by reader threads while waiting, so a chatty child never blocks on a full
/// pipe.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill_child(&mut child);
                anyhow::bail!("{program} timed out after {}ms", timeout.as_millis());
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                kill_child(&mut child);
                return Err(e).with_context(|| format!("failed to wait for {program}"));
            }
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout).with_context(|| format!("failed to read output of {program}"))?,
        stderr: collect(stderr).with_context(|| format!("failed to read errors of {program}"))?,
    })
}

type PipeReader = Option<JoinHandle<std::io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn collect(reader: PipeReader) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow::anyhow!("pipe reader panicked"))?
            .map_err(Into::into),
        None => Ok(Vec::new()),
    }
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_private_path_outside_home() {
        assert_eq!(private_path(Path::new("/etc/solbright.toml")), "/etc/solbright.toml");
    }

    #[test]
    fn test_run_with_timeout_kills_hung_process() {
        let started = Instant::now();
        let result = run_with_timeout(
            Command::new("sleep").arg("5"),
            Duration::from_millis(100),
        );
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_run_with_timeout_handles_output_larger_than_pipe_buffer() {
        let output = run_with_timeout(
            Command::new("head").args(["-c", "1000000", "/dev/zero"]),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 1_000_000);
    }

    #[test]
    fn test_run_with_timeout_collects_output() {
        let output = run_with_timeout(Command::new("echo").arg("ddc"), Duration::from_secs(2))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ddc");
    }
}
