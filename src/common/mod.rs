// Shared constants, error kinds and helpers
pub mod constants;
#[macro_use]
pub mod error;
pub mod utils;
