//! Administrative enable/disable switch for the device.
//!
//! The switch is process-wide and shared as `Arc<DeviceControl>`.  It is read
//! once per `open()`; flipping it never affects a stream that is already
//! running.
//!
//! Operators talk to it through a one-line text interface: [`DeviceControl::show`]
//! prints `1` or `0` followed by a newline, and [`DeviceControl::store`]
//! accepts exactly those two integers.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::info;

/// Error type for [`DeviceControl::store`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid value '{0}': expected 0 or 1")]
    InvalidValue(String),
}

#[derive(Debug)]
pub struct DeviceControl {
    enabled: AtomicBool,
}

impl DeviceControl {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("device {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Current value as operator text: `"1\n"` or `"0\n"`.
    pub fn show(&self) -> String {
        format!("{}\n", u8::from(self.is_enabled()))
    }

    /// Parses operator text and applies it.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidValue`] unless `text` is the integer 0 or 1,
    /// optionally surrounded by whitespace.  The flag is left untouched.
    pub fn store(&self, text: &str) -> Result<(), ControlError> {
        match text.trim().parse::<i64>() {
            Ok(0) => self.set_enabled(false),
            Ok(1) => self.set_enabled(true),
            _ => return Err(ControlError::InvalidValue(text.trim().to_string())),
        }
        Ok(())
    }
}

impl Default for DeviceControl {
    fn default() -> Self {
        Self::new(true)
    }
}
