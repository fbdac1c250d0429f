//! DDC/CI hardware access.
//!
//! The control layer talks to monitors through [`HardwareBus`], which wraps a
//! raw [`DisplayBus`] transport with value clamping, bounded retries and
//! per-monitor serialization. Transports only move bytes:
//!
//! - **ddcutil**: [`DdcutilBus`] shells out to the `ddcutil` tool
//! - **Fake**: `testing::FakeBus`, an in-memory bus for tests
//!
//! ## Transactions
//!
//! A transaction is one logical operation on one monitor (detect
//! capabilities, read a value, write a value). At most one transaction per
//! monitor is in flight at any time; different monitors proceed in parallel.
//! Each attempt is bounded by the transport timeout, and a failed attempt is
//! retried with exponential backoff until the attempt budget runs out.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod bus;
pub mod capabilities;
pub mod ddcutil;
pub mod features;

pub use bus::{HardwareBus, RetryPolicy};
pub use capabilities::{ParsedCapabilities, parse_capabilities};
pub use ddcutil::DdcutilBus;
pub use features::{Feature, FeatureKind};

/// A display found on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHandle {
    /// Stable identity: `MFG:Model:Serial`, or `i2c-N` when the monitor
    /// reports nothing better
    pub id: String,
    /// Human-readable name
    pub label: String,
    /// I2C bus number used to address the monitor
    pub bus: u32,
}

/// Current and maximum value of a VCP feature as read from the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcpReading {
    pub current: u16,
    pub max: u16,
}

/// Raw DDC/CI transport.
///
/// Implementations perform a single attempt per call and report failure
/// through `Err`; retrying and locking belong to [`HardwareBus`].
#[cfg_attr(test, mockall::automock)]
pub trait DisplayBus: Send + Sync {
    /// List the monitors currently answering on the bus.
    fn detect(&self) -> Result<Vec<MonitorHandle>>;

    /// Fetch the capability text of a monitor.
    fn capabilities(&self, monitor: &MonitorHandle) -> Result<String>;

    /// Read one VCP feature.
    fn read_vcp(&self, monitor: &MonitorHandle, code: u8) -> Result<VcpReading>;

    /// Write one VCP feature.
    fn write_vcp(&self, monitor: &MonitorHandle, code: u8, value: u16) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "bus"
    }
}
