//! # Solbright Library
//!
//! Internal library for the solbright binary: a daemon that follows the sun
//! with the brightness of DDC/CI monitors.
//!
//! This library exists to enable testing of complex internals and provide clean separation
//! between CLI dispatch (main.rs) and application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: `Solbright` acquires resources and runs the `Core`
//! - **Core Logic**: `core` holds the main loop, the control decision and the
//!   command surface served to clients
//! - **Hardware**: `ddc` talks DDC/CI through `ddcutil`; `monitors` keeps the
//!   registry of connected displays
//! - **Brightness**: `geo` computes the sun position, `brightness` maps it to a
//!   percentage, `fullscreen` overrides it, `preview` throttles manual writes
//! - **Configuration**: `config` for TOML-based settings with hot-reload
//! - **IPC**: `ipc` serves JSON requests and events over a Unix socket
//! - **Infrastructure**: signal handling, D-Bus monitoring, lock file, logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;
#[macro_use]
pub mod common;

#[cfg(any(test, feature = "testing-support"))]
pub mod testing;

pub mod args;
pub mod brightness;
pub mod commands;
pub mod config;
pub mod core;
pub mod ddc;
pub mod fullscreen;
pub mod geo;
pub mod io;
pub mod ipc;
pub mod monitors;
pub mod preview;

mod solbright;

pub use solbright::Solbright;
