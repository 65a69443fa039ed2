//! Replication Context
//!
//! Shared switches read by the publish path and flipped by the consumer path:
//! - producer suppression while a peer-originated change is being applied
//! - master (emit cluster traffic) and slave (accept cluster traffic) toggles
//! - readiness, set once the node finished starting
//!
//! Suppression is a depth counter so nested or overlapping apply brackets
//! keep the producer silenced until the outermost one closes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

/// Which side of replication a toggle controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleType {
    /// Publishing local changes
    Master,
    /// Applying peer changes
    Slave,
}

impl std::fmt::Display for ToggleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToggleType::Master => write!(f, "master"),
            ToggleType::Slave => write!(f, "slave"),
        }
    }
}

#[derive(Debug)]
pub struct ReplicationContext {
    suppression: AtomicUsize,
    master: AtomicBool,
    slave: AtomicBool,
    ready: AtomicBool,
}

impl Default for ReplicationContext {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl ReplicationContext {
    pub fn new(master: bool, slave: bool) -> Self {
        Self {
            suppression: AtomicUsize::new(0),
            master: AtomicBool::new(master),
            slave: AtomicBool::new(slave),
            ready: AtomicBool::new(false),
        }
    }

    /// Stop publishing local changes. Nests with other `disable` calls.
    pub fn disable(&self) {
        let depth = self.suppression.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Producer disabled (depth {})", depth);
    }

    /// Close one `disable`. Extra calls leave the producer enabled.
    pub fn enable(&self) {
        let _ = self
            .suppression
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
        debug!("Producer enable (depth {})", self.suppression_depth());
    }

    /// Disable the producer until the returned guard is dropped
    pub fn suppress(&self) -> SuppressionGuard<'_> {
        self.disable();
        SuppressionGuard { ctx: self }
    }

    pub fn producer_enabled(&self) -> bool {
        self.suppression_depth() == 0
    }

    pub fn suppression_depth(&self) -> usize {
        self.suppression.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self, toggle: ToggleType) -> bool {
        match toggle {
            ToggleType::Master => self.master.load(Ordering::Acquire),
            ToggleType::Slave => self.slave.load(Ordering::Acquire),
        }
    }

    pub fn set_toggle(&self, toggle: ToggleType, on: bool) {
        match toggle {
            ToggleType::Master => self.master.store(on, Ordering::Release),
            ToggleType::Slave => self.slave.store(on, Ordering::Release),
        }
        debug!("Toggle {} set to {}", toggle, on);
    }

    /// Mark the node as fully started
    pub fn activate(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn deactivate(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether a local change should be published right now
    pub fn should_publish(&self) -> bool {
        self.is_ready() && self.is_enabled(ToggleType::Master) && self.producer_enabled()
    }

    /// Whether a peer change should be applied
    pub fn accepts_incoming(&self) -> bool {
        self.is_enabled(ToggleType::Slave)
    }
}

/// Re-enables the producer when dropped
#[must_use = "the producer is re-enabled as soon as the guard is dropped"]
pub struct SuppressionGuard<'a> {
    ctx: &'a ReplicationContext,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.ctx.enable();
    }
}
