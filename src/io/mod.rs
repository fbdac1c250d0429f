// External I/O operations module
pub mod dbus; // D-Bus sleep/resume and clock change monitoring
pub mod lock; // Single-instance lock file
pub mod service; // systemd user service control
pub mod signals; // Unix signal handling and the main loop channel
