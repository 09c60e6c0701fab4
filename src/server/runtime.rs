//! Runtime settings shared by every session of one listener.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::DEFAULT_FORCED_INTERVAL_MS;

/// Interval control switch and value, read on every ack build.
///
/// Updates from the control side become visible to sessions eventually;
/// there is no ordering between the two fields.
#[derive(Debug)]
pub struct SharedRuntimeConfig {
    interval_control: AtomicBool,
    forced_interval_ms: AtomicU32,
}

impl SharedRuntimeConfig {
    pub fn new(interval_control: bool, forced_interval_ms: u32) -> Self {
        Self {
            interval_control: AtomicBool::new(interval_control),
            forced_interval_ms: AtomicU32::new(forced_interval_ms),
        }
    }

    pub fn interval_control(&self) -> bool {
        self.interval_control.load(Ordering::Relaxed)
    }

    pub fn set_interval_control(&self, enabled: bool) {
        self.interval_control.store(enabled, Ordering::Relaxed);
    }

    pub fn forced_interval_ms(&self) -> u32 {
        self.forced_interval_ms.load(Ordering::Relaxed)
    }

    pub fn set_forced_interval_ms(&self, ms: u32) {
        self.forced_interval_ms.store(ms, Ordering::Relaxed);
    }

    /// Interval to put in the next ack, if interval control is on.
    pub fn forced_interval(&self) -> Option<u32> {
        self.interval_control().then(|| self.forced_interval_ms())
    }

    /// Enable with a value, or disable keeping the last value.
    pub fn set_forced_interval(&self, interval: Option<u32>) {
        if let Some(ms) = interval {
            self.set_forced_interval_ms(ms);
        }
        self.set_interval_control(interval.is_some());
    }
}

impl Default for SharedRuntimeConfig {
    fn default() -> Self {
        Self::new(false, DEFAULT_FORCED_INTERVAL_MS)
    }
}
