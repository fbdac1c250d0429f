//! In-memory display bus for tests.
//!
//! Available to unit tests and, through the `testing-support` feature, to the
//! integration tests under `tests/`.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ddc::{DisplayBus, MonitorHandle, VcpReading};

/// Capability string reported by fake monitors unless overridden.
pub const DEFAULT_CAPABILITIES: &str = "(prot(monitor)type(lcd)model(FAKE-27)cmds(01 02 03 0C E3 F3)\
vcp(10 12 14(05 06 08 0B) 16 18 1A 60(0F 11 12) 62 AC AE C0 C9 D6(01 04 05) DF)mccs_ver(2.2))";

/// One completed write as seen by the fake bus.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub monitor: String,
    pub code: u8,
    pub value: u16,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Clone)]
struct FakeMonitor {
    handle: MonitorHandle,
    capabilities: String,
    values: HashMap<u8, u16>,
    fail_capabilities: bool,
    /// Remaining writes that fail before writes succeed again; `u32::MAX` is forever
    failing_writes: u32,
}

/// A bus whose monitors, values and failures are scripted by the test.
#[derive(Debug, Default)]
pub struct FakeBus {
    monitors: Mutex<Vec<FakeMonitor>>,
    writes: Mutex<Vec<WriteRecord>>,
    write_delay: Mutex<Duration>,
    fail_detect: Mutex<bool>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_monitor(&self, id: &str, bus: u32) {
        self.add_monitor_with_capabilities(id, bus, DEFAULT_CAPABILITIES);
    }

    pub fn add_monitor_with_capabilities(&self, id: &str, bus: u32, capabilities: &str) {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.retain(|m| m.handle.id != id);
        monitors.push(FakeMonitor {
            handle: MonitorHandle {
                id: id.to_string(),
                label: format!("Fake {id}"),
                bus,
            },
            capabilities: capabilities.to_string(),
            values: HashMap::from([(0x10, 50), (0x12, 50), (0x60, 0x0F), (0xD6, 1)]),
            fail_capabilities: false,
            failing_writes: 0,
        });
    }

    pub fn remove_monitor(&self, id: &str) {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|m| m.handle.id != id);
    }

    pub fn fail_detect(&self, fail: bool) {
        *self.fail_detect.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn fail_capabilities(&self, id: &str, fail: bool) {
        self.with_monitor(id, |m| m.fail_capabilities = fail);
    }

    /// Make the next `count` writes to `id` fail.
    pub fn fail_writes(&self, id: &str, count: u32) {
        self.with_monitor(id, |m| m.failing_writes = count);
    }

    /// Make every write to `id` fail until reset with `fail_writes(id, 0)`.
    pub fn break_monitor(&self, id: &str) {
        self.fail_writes(id, u32::MAX);
    }

    /// Time each write takes, to exercise concurrency.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn value(&self, id: &str, code: u8) -> Option<u16> {
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors
            .iter()
            .find(|m| m.handle.id == id)
            .and_then(|m| m.values.get(&code).copied())
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn writes_to(&self, id: &str) -> Vec<WriteRecord> {
        self.writes()
            .into_iter()
            .filter(|w| w.monitor == id)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn with_monitor(&self, id: &str, edit: impl FnOnce(&mut FakeMonitor)) {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(monitor) = monitors.iter_mut().find(|m| m.handle.id == id) {
            edit(monitor);
        }
    }

    fn find(&self, id: &str) -> Result<FakeMonitor> {
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors
            .iter()
            .find(|m| m.handle.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no monitor answering as {id}"))
    }
}

impl DisplayBus for FakeBus {
    fn detect(&self) -> Result<Vec<MonitorHandle>> {
        if *self.fail_detect.lock().unwrap_or_else(|e| e.into_inner()) {
            anyhow::bail!("fake detect failure");
        }
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(monitors.iter().map(|m| m.handle.clone()).collect())
    }

    fn capabilities(&self, monitor: &MonitorHandle) -> Result<String> {
        let found = self.find(&monitor.id)?;
        if found.fail_capabilities {
            anyhow::bail!("fake capabilities failure");
        }
        Ok(found.capabilities)
    }

    fn read_vcp(&self, monitor: &MonitorHandle, code: u8) -> Result<VcpReading> {
        let found = self.find(&monitor.id)?;
        let current = found
            .values
            .get(&code)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("VCP {code:02X} unsupported"))?;
        let max = if matches!(code, 0x10 | 0x12 | 0x13) { 100 } else { 0xFF };
        Ok(VcpReading { current, max })
    }

    fn write_vcp(&self, monitor: &MonitorHandle, code: u8, value: u16) -> Result<()> {
        let started = Instant::now();
        let delay = *self.write_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        {
            let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
            let found = monitors
                .iter_mut()
                .find(|m| m.handle.id == monitor.id)
                .ok_or_else(|| anyhow::anyhow!("no monitor answering as {}", monitor.id))?;
            if found.failing_writes > 0 {
                if found.failing_writes != u32::MAX {
                    found.failing_writes -= 1;
                }
                anyhow::bail!("fake write failure");
            }
            found.values.insert(code, value);
        }

        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(WriteRecord {
                monitor: monitor.id.clone(),
                code,
                value,
                started,
                finished: Instant::now(),
            });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
