//! Admission control for new connections.

use crate::lifecycle::ConnectionKind;

/// Tracks live connections against the base and overflow limits.
///
/// Mutated only under the pool lock.
#[derive(Debug)]
pub(crate) struct Admission {
    base_size: u32,
    overflow_size: u32,
    created_total: u32,
    overflow_in_use: u32,
}

impl Admission {
    pub(crate) fn new(base_size: u32, overflow_size: u32) -> Self {
        Self {
            base_size,
            overflow_size,
            created_total: 0,
            overflow_in_use: 0,
        }
    }

    /// Reserve a slot for a new connection, or `None` when at capacity.
    pub(crate) fn try_admit(&mut self) -> Option<ConnectionKind> {
        let kind = if self.base_in_use() < self.base_size {
            ConnectionKind::Base
        } else if self.overflow_in_use < self.overflow_size {
            self.overflow_in_use += 1;
            ConnectionKind::Overflow
        } else {
            return None;
        };

        self.created_total += 1;
        Some(kind)
    }

    /// Reserve a base slot only. Used when pre-filling the pool.
    pub(crate) fn try_admit_base(&mut self) -> bool {
        if self.base_in_use() < self.base_size {
            self.created_total += 1;
            true
        } else {
            false
        }
    }

    /// Return the slot of a connection that was closed or never created.
    pub(crate) fn release(&mut self, kind: ConnectionKind) {
        debug_assert!(self.created_total > 0, "admission slot released twice");
        self.created_total = self.created_total.saturating_sub(1);
        if kind == ConnectionKind::Overflow {
            debug_assert!(self.overflow_in_use > 0, "overflow slot released twice");
            self.overflow_in_use = self.overflow_in_use.saturating_sub(1);
        }
    }

    /// Live connections, base and overflow.
    pub(crate) fn created_total(&self) -> u32 {
        self.created_total
    }

    /// Live overflow connections.
    pub(crate) fn overflow_in_use(&self) -> u32 {
        self.overflow_in_use
    }

    fn base_in_use(&self) -> u32 {
        self.created_total - self.overflow_in_use
    }
}
