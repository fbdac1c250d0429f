//! D-Bus and system event monitoring.
//!
//! This module provides detection for:
//! - Sleep/resume events via the systemd-logind `PrepareForSleep` signal (D-Bus)
//! - Wall-clock jumps via timerfd with `TFD_TIMER_CANCEL_ON_SET`
//!
//! Both run in their own threads and report through the main loop's
//! [`SignalMessage`] channel. A resume asks the Core to re-enumerate monitors
//! (they often come back on different buses) and tick; a clock jump asks for
//! an immediate tick since the sun position is computed from the clock.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use zbus::blocking::Connection;

use crate::io::signals::SignalMessage;

const MAX_THREAD_RESTARTS: u8 = 3;
const RESTART_DELAY_MS: u64 = 2000;
const RESUME_GRACE_PERIOD_SECS: i64 = 5;

/// D-Bus proxy trait for the systemd-logind Manager interface.
#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LogindManager {
    /// `start` is true before suspending and false after resuming.
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// Sleep state shared by the two monitors so that the clock jump caused by
/// a suspend is not reported as a time change.
#[derive(Clone, Default)]
struct SleepTracker {
    is_sleeping: Arc<AtomicBool>,
    resume_time: Arc<AtomicI64>,
}

impl SleepTracker {
    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn mark_sleeping(&self) {
        self.is_sleeping.store(true, Ordering::SeqCst);
    }

    fn mark_resumed(&self, at: i64) {
        self.resume_time.store(at, Ordering::SeqCst);
        self.is_sleeping.store(false, Ordering::SeqCst);
    }

    /// Whether a timer event at `now` is explained by sleep.
    fn explains_time_change(&self, now: i64) -> bool {
        if self.is_sleeping.load(Ordering::SeqCst) {
            return true;
        }
        let resume_time = self.resume_time.load(Ordering::SeqCst);
        resume_time != 0 && (now - resume_time) <= RESUME_GRACE_PERIOD_SECS
    }
}

/// Start the sleep/resume and time change monitors.
///
/// Never fails hard: a missing system bus or timerfd support is logged and
/// the daemon keeps running without that detection.
pub fn start_system_event_monitor(signal_sender: Sender<SignalMessage>, debug_enabled: bool) {
    let tracker = SleepTracker::default();

    let sleep_sender = signal_sender.clone();
    let sleep_tracker = tracker.clone();
    let spawned = thread::Builder::new()
        .name("dbus-sleep-monitor".to_string())
        .spawn(move || run_sleep_monitor(sleep_sender, debug_enabled, sleep_tracker));
    if let Err(e) = spawned {
        log_warning!("Failed to start sleep monitor: {e}");
    }

    let spawned = thread::Builder::new()
        .name("time-change-monitor".to_string())
        .spawn(move || {
            if let Err(e) = monitor_time_changes(signal_sender, debug_enabled, tracker) {
                log_pipe!();
                log_warning!("Time change monitor error: {e}");
                log_indented!("System time change detection will not be available");
            }
        });
    if let Err(e) = spawned {
        log_warning!("Failed to start time change monitor: {e}");
    }
}

/// Run the D-Bus monitor, reconnecting a few times if the connection drops.
fn run_sleep_monitor(signal_sender: Sender<SignalMessage>, debug_enabled: bool, tracker: SleepTracker) {
    for attempt in 0..=MAX_THREAD_RESTARTS {
        match monitor_sleep_signals(&signal_sender, debug_enabled, &tracker) {
            Ok(()) => {
                if debug_enabled {
                    log_debug!("Sleep monitor thread exiting normally");
                }
                return;
            }
            Err(e) => {
                log_pipe!();
                log_warning!("Sleep monitor error: {e}");
                if attempt < MAX_THREAD_RESTARTS {
                    log_indented!(
                        "Will restart D-Bus monitor (attempt {}/{})",
                        attempt + 1,
                        MAX_THREAD_RESTARTS
                    );
                    thread::sleep(std::time::Duration::from_millis(RESTART_DELAY_MS));
                }
            }
        }
    }
    log_indented!("Maximum restart attempts reached for sleep monitor");
    log_indented!("Sleep/resume detection will not be available");
}

fn monitor_sleep_signals(
    signal_sender: &Sender<SignalMessage>,
    debug_enabled: bool,
    tracker: &SleepTracker,
) -> Result<()> {
    let connection = Connection::system().context("Failed to connect to system D-Bus")?;
    let logind_proxy =
        LogindManagerProxyBlocking::new(&connection).context("Failed to create logind proxy")?;
    let sleep_signals = logind_proxy
        .receive_prepare_for_sleep()
        .context("Failed to subscribe to PrepareForSleep signals")?;

    if debug_enabled {
        log_debug!("Subscribed to systemd-logind PrepareForSleep signals");
    }

    for signal in sleep_signals {
        let going_to_sleep = match signal.args() {
            Ok(args) => args.start,
            Err(e) => {
                log_pipe!();
                log_warning!("Failed to parse PrepareForSleep signal args: {e}");
                continue;
            }
        };

        if going_to_sleep {
            tracker.mark_sleeping();
            log_pipe!();
            log_info!("System entering sleep/suspend mode");
        } else {
            tracker.mark_resumed(SleepTracker::current_timestamp());
            log_pipe!();
            log_info!("System resuming from sleep/suspend - refreshing monitors");
        }

        if signal_sender
            .send(SignalMessage::Sleep {
                resuming: !going_to_sleep,
            })
            .is_err()
        {
            // Main loop exited
            return Ok(());
        }
    }

    anyhow::bail!("D-Bus connection lost - PrepareForSleep signal stream ended")
}

/// Far-future realtime timer that fires only when the clock is set.
struct TimeChangeDetector {
    timer: TimerFd,
}

impl TimeChangeDetector {
    fn new() -> nix::Result<Self> {
        let timer = TimerFd::new(ClockId::CLOCK_REALTIME, TimerFlags::empty())?;
        let mut detector = TimeChangeDetector { timer };
        detector.arm_timer()?;
        Ok(detector)
    }

    fn arm_timer(&mut self) -> nix::Result<()> {
        let flags =
            TimerSetTimeFlags::TFD_TIMER_ABSTIME | TimerSetTimeFlags::TFD_TIMER_CANCEL_ON_SET;
        // i64::MAX seconds overflows the kernel's conversion
        let far_future = TimeSpec::new(i64::MAX / 1000, 0);
        self.timer.set(Expiration::OneShot(far_future), flags)
    }

    /// Block until the timer fires or is cancelled by a clock change.
    fn wait_for_time_change(&mut self) -> Result<()> {
        match self.timer.wait() {
            Ok(_) | Err(Errno::ECANCELED) => self
                .arm_timer()
                .context("Failed to re-arm time change timer"),
            Err(other) => Err(anyhow::anyhow!("Timer wait error: {other}")),
        }
    }
}

fn monitor_time_changes(
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
    tracker: SleepTracker,
) -> Result<()> {
    let mut detector =
        TimeChangeDetector::new().context("Failed to create time change detector")?;

    if debug_enabled {
        log_debug!("Started timerfd-based time change monitoring");
    }

    loop {
        detector.wait_for_time_change()?;

        if tracker.explains_time_change(SleepTracker::current_timestamp()) {
            continue;
        }

        log_pipe!();
        log_info!("System time changed - reapplying brightness");
        if signal_sender.send(SignalMessage::Reapply).is_err() {
            return Ok(());
        }
    }
}
