//! Core application logic and state management.
//!
//! This module owns the main loop of solbright. It handles:
//!
//! - Scheduled ticks every `update_interval` seconds
//! - Messages from signals, D-Bus, the config watcher, the fullscreen poller
//!   and the IPC controller
//! - Configuration hot-reloading and reactions to setting changes
//! - Starting and stopping the fullscreen poller
//! - Broadcasting events to subscribed IPC clients
//!
//! ## Module Structure
//!
//! - [`control`]: One control decision and its application to the monitors
//! - [`controller`]: The command surface served over the control socket
//! - [`status`]: Serializable state snapshots

pub mod control;
pub mod controller;
pub mod status;

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::brightness::Phase;
use crate::common::constants::MAIN_LOOP_POLL_CHUNK_MS;
use crate::common::utils::private_path;
use crate::config::{self, ConfigChange, ConfigStore};
use crate::ddc::HardwareBus;
use crate::fullscreen::{FullscreenOverride, Transition, create_detector};
use crate::geo::Geocoder;
use crate::io::lock::InstanceLock;
use crate::io::signals::{SignalMessage, SignalState};
use crate::ipc::{IpcEvent, IpcNotifier, IpcServer};
use crate::monitors::{MonitorRegistry, RefreshSummary};
use crate::preview::PreviewThrottler;

use control::{ControlLoop, TickReport, TickSource};
use controller::Controller;

/// Parameters for creating a Core instance.
pub struct CoreParams {
    pub store: Arc<ConfigStore>,
    pub bus: HardwareBus,
    pub signal_state: SignalState,
    pub debug_enabled: bool,
    /// Released when the Core finishes
    pub lock: Option<InstanceLock>,
    /// Where to serve IPC; no server when `None`
    pub socket_path: Option<PathBuf>,
    pub geocoder: Arc<dyn Geocoder>,
}

/// Main loop state.
pub struct Core {
    control: Arc<ControlLoop>,
    preview: Arc<PreviewThrottler>,
    notifier: IpcNotifier,
    ipc_server: Option<IpcServer>,
    config_changes: Receiver<ConfigChange>,
    signal_state: SignalState,
    debug_enabled: bool,
    lock: Option<InstanceLock>,
    last_phase: Option<Phase>,
    /// The system is suspended; ticks are held until resume
    sleeping: bool,
}

impl Core {
    /// Wire up the control loop, the preview worker and the IPC server.
    pub fn new(params: CoreParams) -> Result<Self> {
        let config = params.store.get();
        let config_changes = params.store.subscribe();

        let registry = Arc::new(MonitorRegistry::new(params.bus, params.store.clone()));
        let control = Arc::new(ControlLoop::new(
            params.store,
            registry,
            Arc::new(FullscreenOverride::new()),
        ));

        let writer_control = control.clone();
        let preview = Arc::new(PreviewThrottler::start(
            config.preview_cooldown(),
            Box::new(move |target, value| {
                writer_control.apply_manual(target, value).map(|_| ())
            }),
        )?);

        let (notifier, event_receiver) = IpcNotifier::new();
        let ipc_server = match params.socket_path {
            Some(socket_path) => {
                let controller = Controller::new(
                    control.clone(),
                    preview.clone(),
                    params.geocoder,
                    notifier.clone(),
                    params.signal_state.signal_sender.clone(),
                );
                Some(IpcServer::start(
                    socket_path,
                    Arc::new(controller),
                    event_receiver,
                    params.signal_state.running.clone(),
                    params.debug_enabled,
                )?)
            }
            None => None,
        };

        Ok(Self {
            control,
            preview,
            notifier,
            ipc_server,
            config_changes,
            signal_state: params.signal_state,
            debug_enabled: params.debug_enabled,
            lock: params.lock,
            last_phase: None,
            sleeping: false,
        })
    }

    pub fn control(&self) -> &Arc<ControlLoop> {
        &self.control
    }

    /// Run until shutdown is requested, then release every resource.
    pub fn execute(mut self) -> Result<()> {
        if let Some(server) = &self.ipc_server {
            log_block_start!("Control socket: {}", private_path(server.socket_path()));
        }

        log_block_start!("Scanning for DDC/CI monitors...");
        let summary = self.refresh_monitors();
        if summary.live == 0 {
            log_warning!("No DDC/CI monitors found");
            log_indented!("Check that the i2c-dev module is loaded and ddcutil can see your displays");
        }

        if self.control.store().get().fullscreen_brightness_enabled {
            self.start_fullscreen_poller();
        }

        if self.signal_state.is_running() {
            self.run_tick();
        }

        self.main_loop();

        log_block_start!("Shutting down solbright...");
        self.shutdown();
        log_end!();
        Ok(())
    }

    fn main_loop(&mut self) {
        let chunk = Duration::from_millis(MAIN_LOOP_POLL_CHUNK_MS);

        while self.signal_state.is_running() {
            let deadline = Instant::now() + self.control.store().get().update_interval();
            let mut tick_now = false;

            while self.signal_state.is_running() && !tick_now {
                if self.drain_config_changes() {
                    tick_now = true;
                    break;
                }

                let now = Instant::now();
                if now >= deadline {
                    tick_now = true;
                    break;
                }

                match self
                    .signal_state
                    .signal_receiver
                    .recv_timeout(chunk.min(deadline - now))
                {
                    Ok(message) => tick_now = self.handle_message(message),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        log_warning!("Signal channel closed, shutting down");
                        self.signal_state.request_shutdown();
                    }
                }
            }

            if tick_now && self.signal_state.is_running() && !self.sleeping {
                self.run_tick();
            }
        }
    }

    /// Returns true when the message calls for an immediate tick.
    fn handle_message(&mut self, message: SignalMessage) -> bool {
        #[cfg(debug_assertions)]
        eprintln!("DEBUG: main loop received {message:?}");

        match message {
            SignalMessage::Shutdown => {
                self.signal_state.request_shutdown();
                false
            }
            SignalMessage::Reload => {
                self.reload_config();
                // A changed config shows up in the next drain and ticks there
                false
            }
            SignalMessage::Sleep { resuming: false } => {
                log_block_start!("System entering sleep mode");
                self.sleeping = true;
                false
            }
            SignalMessage::Sleep { resuming: true } => {
                log_block_start!("System resuming from sleep");
                self.sleeping = false;
                // Monitors may have been swapped or powered off meanwhile
                self.refresh_monitors();
                true
            }
            SignalMessage::Reapply => true,
            SignalMessage::RefreshMonitors => {
                log_block_start!("Refreshing monitors...");
                self.refresh_monitors();
                true
            }
            SignalMessage::FullscreenChanged { active } => {
                self.notifier.send(IpcEvent::FullscreenChanged { active });
                if active {
                    log_block_start!("Fullscreen window detected");
                    false
                } else {
                    log_block_start!("Fullscreen ended, restoring brightness");
                    true
                }
            }
        }
    }

    fn run_tick(&mut self) {
        let report = self.control.tick(Utc::now());
        self.log_report(&report);

        if let Some(sample) = &report.sample
            && self.last_phase != Some(sample.phase)
        {
            if self.last_phase.is_some() {
                log_block_start!(
                    "Sun entered {} phase ({:.1}°)",
                    sample.phase,
                    sample.elevation
                );
            }
            self.notifier.send(IpcEvent::phase_changed(
                self.last_phase,
                sample.phase,
                sample.elevation,
            ));
            self.last_phase = Some(sample.phase);
        }

        if report.source != TickSource::Skipped {
            self.notifier.send(IpcEvent::brightness_applied(report));
        }
    }

    fn log_report(&self, report: &TickReport) {
        match (report.source, report.target) {
            (TickSource::Skipped, _) => {
                if self.debug_enabled {
                    log_pipe!();
                    log_debug!(
                        "Tick skipped: {}",
                        report.skipped_reason.as_deref().unwrap_or("no reason")
                    );
                }
            }
            (source, Some(target)) => {
                if self.debug_enabled {
                    log_pipe!();
                    match &report.sample {
                        Some(sample) => log_debug!(
                            "Tick ({source:?}): elevation {:.2}°, target {target}%",
                            sample.elevation
                        ),
                        None => log_debug!("Tick ({source:?}): target {target}%"),
                    }
                    for (monitor, value) in &report.outcome.applied {
                        log_indented!("{monitor}: {value}");
                    }
                }
                for (monitor, reason) in &report.outcome.failures {
                    log_pipe!();
                    log_warning!("Failed to set brightness on {monitor}: {reason}");
                }
            }
            (_, None) => {}
        }
    }

    fn refresh_monitors(&mut self) -> RefreshSummary {
        let summary = self.control.registry().refresh();

        for id in &summary.added {
            log_decorated!("Monitor connected: {id}");
        }
        for id in &summary.lost {
            log_decorated!("Monitor disconnected: {id}");
        }
        for id in &summary.incomplete {
            log_indented!("Capabilities of {id} were only partly readable");
        }
        if self.debug_enabled {
            log_pipe!();
            log_debug!(
                "Monitors: {} live, {} disconnected",
                summary.live,
                summary.stale
            );
        }

        self.notifier
            .send(IpcEvent::monitors_refreshed(summary.clone()));
        summary
    }

    /// Re-read the config file, keeping the current config if it is invalid.
    fn reload_config(&mut self) {
        let store = self.control.store().clone();
        let Some(path) = store.path() else {
            if self.debug_enabled {
                log_pipe!();
                log_debug!("Reload requested but no configuration file is in use");
            }
            return;
        };

        let result = config::load_from_path(path).and_then(|config| store.replace(config));
        match result {
            Ok(true) => {
                log_block_start!("Configuration reloaded");
                store.get().log_config();
            }
            Ok(false) => {
                if self.debug_enabled {
                    log_pipe!();
                    log_debug!("Configuration file unchanged");
                }
            }
            Err(e) => {
                log_pipe!();
                log_warning!("Failed to reload configuration: {e:#}");
                log_indented!("Keeping the previous configuration");
            }
        }
    }

    /// Apply pending config changes. Returns true if there were any.
    fn drain_config_changes(&mut self) -> bool {
        let mut changed = false;
        while let Ok(change) = self.config_changes.try_recv() {
            self.handle_config_change(&change);
            changed = true;
        }
        changed
    }

    fn handle_config_change(&mut self, change: &ConfigChange) {
        if change.changed(|c| c.monitor_offsets.clone()) {
            self.control
                .registry()
                .sync_offsets(&change.current.monitor_offsets);
        }

        let poller_settings_changed = change.changed(|c| c.fullscreen_brightness_enabled)
            || change.changed(|c| c.fullscreen_detector)
            || change.changed(|c| c.fullscreen_poll_interval);
        if poller_settings_changed {
            if change.current.fullscreen_brightness_enabled {
                self.start_fullscreen_poller();
            } else if self.control.fullscreen().is_polling() {
                self.control.fullscreen().stop_poller();
                log_decorated!("Fullscreen detection stopped");
            }
        }

        if change.changed(|c| c.preview_cooldown_ms)
            || change.changed(|c| c.ddc_retries)
            || change.changed(|c| c.ddc_timeout_ms)
        {
            log_indented!("DDC/CI timing changes take effect after a restart");
        }

        self.notifier
            .send(IpcEvent::config_changed(change.current.clone()));
    }

    fn start_fullscreen_poller(&mut self) {
        let config = self.control.store().get();
        let Some(detector) = create_detector(config.fullscreen_detector) else {
            self.control.fullscreen().stop_poller();
            return;
        };

        let control = self.control.clone();
        let notifier = self.notifier.clone();
        let wake = self.signal_state.signal_sender.clone();
        let result = self.control.fullscreen().start_poller(
            detector,
            config.fullscreen_poll_interval(),
            move |transition| match transition {
                Transition::Entered => {
                    if control.fullscreen_override_applies() {
                        let report = control.apply_fullscreen(Utc::now());
                        notifier.send(IpcEvent::brightness_applied(report));
                    }
                    let _ = wake.send(SignalMessage::FullscreenChanged { active: true });
                }
                Transition::Exited => {
                    let _ = wake.send(SignalMessage::FullscreenChanged { active: false });
                }
            },
        );

        if let Err(e) = result {
            log_pipe!();
            log_warning!("Fullscreen detection unavailable: {e:#}");
        }
    }

    fn shutdown(&mut self) {
        self.control.fullscreen().stop_poller();
        self.preview.shutdown();

        // The server loop watches the same running flag
        self.signal_state.request_shutdown();
        if let Some(server) = self.ipc_server.take()
            && let Err(e) = server.shutdown()
        {
            log_warning!("{e:#}");
        }

        if let Some(lock) = self.lock.take() {
            if self.debug_enabled {
                log_pipe!();
                log_debug!("Releasing lock {}", private_path(lock.path()));
            }
            drop(lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ddc::RetryPolicy;
    use crate::geo::CitiesGeocoder;
    use crate::testing::FakeBus;
    use std::sync::mpsc::Sender;
    use std::thread;

    fn core_with(bus: Arc<FakeBus>, config: Config) -> (Core, Arc<ConfigStore>, Sender<SignalMessage>) {
        let store = Arc::new(ConfigStore::in_memory(config));
        let signal_state = SignalState::detached();
        let sender = signal_state.signal_sender.clone();
        let core = Core::new(CoreParams {
            store: store.clone(),
            bus: HardwareBus::new(bus, RetryPolicy::default()),
            signal_state,
            debug_enabled: false,
            lock: None,
            socket_path: None,
            geocoder: Arc::new(CitiesGeocoder::new()),
        })
        .unwrap();
        (core, store, sender)
    }

    #[test]
    fn test_messages_that_tick() {
        let bus = Arc::new(FakeBus::new());
        let (mut core, _store, _sender) = core_with(bus, Config::default());

        assert!(core.handle_message(SignalMessage::Reapply));
        assert!(core.handle_message(SignalMessage::RefreshMonitors));
        assert!(!core.handle_message(SignalMessage::FullscreenChanged { active: true }));
        assert!(core.handle_message(SignalMessage::FullscreenChanged { active: false }));
        assert!(!core.handle_message(SignalMessage::Sleep { resuming: false }));
        assert!(core.sleeping);
        assert!(core.handle_message(SignalMessage::Sleep { resuming: true }));
        assert!(!core.sleeping);

        assert!(!core.handle_message(SignalMessage::Shutdown));
        assert!(!core.signal_state.is_running());
    }

    #[test]
    fn test_config_change_syncs_offsets() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("mon", 3);
        let (mut core, store, _sender) = core_with(bus, Config::default());
        core.refresh_monitors();

        store
            .update(|c| {
                c.monitor_offsets.insert("mon".into(), 15);
            })
            .unwrap();
        assert!(core.drain_config_changes());
        assert_eq!(core.control.registry().snapshot().get("mon").unwrap().offset, 15);
        assert!(!core.drain_config_changes());
    }

    #[test]
    fn test_execute_until_shutdown() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("mon", 3);
        let config = Config {
            latitude: Some(51.5),
            longitude: Some(-0.12),
            ..Config::default()
        };
        let (core, _store, sender) = core_with(bus.clone(), config);

        let handle = thread::spawn(move || core.execute());
        // The initial tick writes before the loop starts waiting
        let deadline = Instant::now() + Duration::from_secs(5);
        while bus.writes_to("mon").is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        sender.send(SignalMessage::Shutdown).unwrap();
        handle.join().unwrap().unwrap();

        assert!(!bus.writes_to("mon").is_empty());
    }
}
