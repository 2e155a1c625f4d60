//! Resource monitoring and the ultra-safe mode decision.

use std::sync::Mutex;

use sysinfo::System;
use tracing::{info, warn};

use vedit_models::encoding::{DEFAULT_LOW_MEMORY_THRESHOLD_BYTES, OOM_EXIT_CODE};
use vedit_models::{EncodeMode, RamDecision};

/// Process-wide resource state consulted before every encoder invocation.
///
/// Holds the one piece of mutable state shared across workers: the most
/// recent encoder exit code. All access goes through this type; there is no
/// ambient global.
pub struct ResourceMonitor {
    /// Total system memory at startup, in bytes
    total_memory_bytes: u64,
    /// Low-memory threshold, in bytes
    threshold_bytes: u64,
    /// Most recent encoder exit code observed by any worker
    last_exit_code: Mutex<Option<i32>>,
}

impl ResourceMonitor {
    /// Create a monitor with an explicit memory reading (used by tests).
    pub fn new(total_memory_bytes: u64, threshold_bytes: u64) -> Self {
        Self {
            total_memory_bytes,
            threshold_bytes,
            last_exit_code: Mutex::new(None),
        }
    }

    /// Create a monitor from the running system's total memory.
    pub fn from_system(threshold_bytes: u64) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        let monitor = Self::new(total, threshold_bytes);
        if monitor.is_low_memory_server() {
            warn!(
                total_memory_bytes = total,
                threshold_bytes, "Low-memory server detected, defaulting to ultra-safe encoding"
            );
        } else {
            info!(total_memory_bytes = total, "System memory inspected");
        }
        monitor
    }

    /// Create a monitor using the default 2 GiB threshold.
    pub fn from_system_default() -> Self {
        Self::from_system(DEFAULT_LOW_MEMORY_THRESHOLD_BYTES)
    }

    /// Whether total system memory is at or below the configured threshold.
    pub fn is_low_memory_server(&self) -> bool {
        self.total_memory_bytes <= self.threshold_bytes
    }

    /// Record the final exit code of an encoder run.
    ///
    /// This is the only mutator of the shared exit-code state and is safe
    /// under concurrent workers. A later success (exit 0) overwrites an
    /// earlier OOM observation.
    pub fn record_exit_code(&self, code: i32) {
        let mut last = self.lock_last();
        *last = Some(code);
        if code == OOM_EXIT_CODE {
            warn!(
                exit_code = code,
                "Encoder was OOM-killed; subsequent jobs will run in ultra-safe mode"
            );
        }
    }

    /// The most recently recorded encoder exit code, if any.
    pub fn last_exit_code(&self) -> Option<i32> {
        *self.lock_last()
    }

    /// Whether the next job should run in ultra-safe mode.
    pub fn should_use_ultra_safe_mode(&self) -> bool {
        self.is_low_memory_server() || self.lock_last().map_or(false, |c| c == OOM_EXIT_CODE)
    }

    /// Resolve the mode for the next job, with the reason for any downgrade.
    pub fn resolve_mode(&self, requested: EncodeMode) -> (EncodeMode, RamDecision) {
        if requested == EncodeMode::UltraSafe {
            return (EncodeMode::UltraSafe, RamDecision::None);
        }
        if self.is_low_memory_server() {
            return (EncodeMode::UltraSafe, RamDecision::LowMemoryServer);
        }
        if self.lock_last().map_or(false, |c| c == OOM_EXIT_CODE) {
            return (EncodeMode::UltraSafe, RamDecision::PreviousOomKill);
        }
        (requested, RamDecision::None)
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<i32>> {
        self.last_exit_code
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
