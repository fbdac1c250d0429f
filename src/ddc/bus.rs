//! Retrying, serializing front end over a [`DisplayBus`] transport.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::capabilities::{ParsedCapabilities, parse_capabilities};
use super::features::Feature;
use super::{DisplayBus, MonitorHandle, VcpReading};
use crate::common::constants::*;
use crate::common::error::ControlError;
use crate::config::Config;

/// How often and how patiently a transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DDC_RETRIES,
            initial_backoff: Duration::from_millis(DDC_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DDC_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.ddc_retries.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Hardware access used by the rest of the daemon.
///
/// Cloning is cheap; clones share the transport and the per-monitor locks.
#[derive(Clone)]
pub struct HardwareBus {
    transport: Arc<dyn DisplayBus>,
    policy: RetryPolicy,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl HardwareBus {
    pub fn new(transport: Arc<dyn DisplayBus>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn monitor_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `op` under the monitor's lock, retrying failed attempts.
    ///
    /// The lock is held across retries so no other transaction can slip in
    /// between attempts.
    fn transaction<T>(
        &self,
        monitor: &MonitorHandle,
        what: &str,
        mut op: impl FnMut(&dyn DisplayBus) -> Result<T>,
    ) -> Result<T> {
        let lock = self.monitor_lock(&monitor.id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.policy.backoff(attempt - 1));
            }
            match op(self.transport.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    #[cfg(debug_assertions)]
                    eprintln!(
                        "DEBUG: {what} on {} failed (attempt {}/{attempts}): {e}",
                        monitor.id,
                        attempt + 1
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        Err(ControlError::HardwareUnavailable {
            monitor: monitor.id.clone(),
            reason: format!("{what} failed after {attempts} attempts: {reason}"),
        }
        .into())
    }

    /// List attached monitors. A failing bus yields an empty list.
    pub fn enumerate(&self) -> Vec<MonitorHandle> {
        match self.transport.detect() {
            Ok(monitors) => monitors,
            Err(e) => {
                log_warning!("Display detection via {} failed: {e}", self.transport.name());
                Vec::new()
            }
        }
    }

    /// Read and parse a monitor's capabilities.
    pub fn capabilities(&self, monitor: &MonitorHandle) -> Result<ParsedCapabilities> {
        let text = self.transaction(monitor, "capabilities", |bus| bus.capabilities(monitor))?;
        Ok(parse_capabilities(&text))
    }

    pub fn get_value(&self, monitor: &MonitorHandle, code: u8) -> Result<VcpReading> {
        self.transaction(monitor, &format!("getvcp {code:02X}"), |bus| {
            bus.read_vcp(monitor, code)
        })
    }

    /// Clamp `requested` to the feature's bounds and write it.
    ///
    /// Returns the value actually transmitted.
    pub fn set_value(&self, monitor: &MonitorHandle, feature: &Feature, requested: i64) -> Result<u16> {
        let value = feature.clamp(requested)?;
        self.transaction(monitor, &format!("setvcp {:02X}", feature.code), |bus| {
            bus.write_vcp(monitor, feature.code, value)
        })?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::control_error;
    use crate::ddc::MockDisplayBus;
    use crate::ddc::features::{VCP_BRIGHTNESS, known_feature};
    use mockall::predicate::*;

    fn handle() -> MonitorHandle {
        MonitorHandle {
            id: "DEL:U2720Q:1".to_string(),
            label: "U2720Q".to_string(),
            bus: 4,
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_millis(800));
        assert_eq!(policy.backoff(40), Duration::from_millis(800));
    }

    #[test]
    fn test_set_value_clamps_before_writing() {
        let mut mock = MockDisplayBus::new();
        mock.expect_write_vcp()
            .with(always(), eq(VCP_BRIGHTNESS), eq(100))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let bus = HardwareBus::new(Arc::new(mock), fast_policy(3));
        let feature = known_feature(VCP_BRIGHTNESS).unwrap();
        assert_eq!(bus.set_value(&handle(), &feature, 140).unwrap(), 100);
    }

    #[test]
    fn test_retry_then_success() {
        let mut mock = MockDisplayBus::new();
        let mut calls = 0;
        mock.expect_read_vcp().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                anyhow::bail!("DDC communication failed")
            }
            Ok(VcpReading {
                current: 40,
                max: 100,
            })
        });

        let bus = HardwareBus::new(Arc::new(mock), fast_policy(3));
        let reading = bus.get_value(&handle(), VCP_BRIGHTNESS).unwrap();
        assert_eq!(reading.current, 40);
    }

    #[test]
    fn test_retries_stop_at_budget() {
        let mut mock = MockDisplayBus::new();
        mock.expect_write_vcp()
            .times(3)
            .returning(|_, _, _| anyhow::bail!("no response"));

        let bus = HardwareBus::new(Arc::new(mock), fast_policy(3));
        let feature = known_feature(VCP_BRIGHTNESS).unwrap();
        let err = bus.set_value(&handle(), &feature, 50).unwrap_err();
        match control_error(&err) {
            Some(ControlError::HardwareUnavailable { monitor, .. }) => {
                assert_eq!(monitor, "DEL:U2720Q:1")
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_read_only_write_never_reaches_bus() {
        let mock = MockDisplayBus::new();
        let bus = HardwareBus::new(Arc::new(mock), fast_policy(3));
        let feature = known_feature(0xC9).unwrap();
        let err = bus.set_value(&handle(), &feature, 1).unwrap_err();
        assert_eq!(control_error(&err).unwrap().kind(), "invalid_input");
    }

    #[test]
    fn test_enumerate_failure_is_empty() {
        let mut mock = MockDisplayBus::new();
        mock.expect_detect()
            .returning(|| anyhow::bail!("ddcutil not installed"));
        mock.expect_name().return_const("mock");

        let bus = HardwareBus::new(Arc::new(mock), fast_policy(1));
        assert!(bus.enumerate().is_empty());
    }

    #[test]
    fn test_writes_serialize_per_monitor_only() {
        use crate::testing::FakeBus;

        let fake = Arc::new(FakeBus::new());
        fake.add_monitor("a", 4);
        fake.add_monitor("b", 5);
        fake.set_write_delay(Duration::from_millis(80));
        let bus = HardwareBus::new(fake.clone(), fast_policy(1));
        let monitors = bus.enumerate();
        let brightness = known_feature(VCP_BRIGHTNESS).unwrap();

        std::thread::scope(|scope| {
            for monitor in &monitors {
                for value in [20, 60] {
                    let (bus, brightness) = (&bus, &brightness);
                    scope.spawn(move || bus.set_value(monitor, brightness, value).unwrap());
                }
            }
        });

        for id in ["a", "b"] {
            let mut writes = fake.writes_to(id);
            assert_eq!(writes.len(), 2);
            writes.sort_by_key(|w| w.started);
            assert!(
                writes[1].started >= writes[0].finished,
                "writes to {id} overlapped"
            );
        }

        let a = fake.writes_to("a");
        let b = fake.writes_to("b");
        let overlapped = a
            .iter()
            .any(|x| b.iter().any(|y| x.started < y.finished && y.started < x.finished));
        assert!(overlapped, "writes to different monitors never ran together");
    }
}
