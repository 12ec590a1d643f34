//! Counters for errors the gateway absorbs instead of propagating

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared absorbed-error counters.
///
/// Transport, protocol and command failures never reach operator sessions;
/// each one bumps a counter here instead so they stay observable.
#[derive(Debug, Default)]
pub struct ErrorCounters {
    transport: AtomicU64,
    protocol: AtomicU64,
    command: AtomicU64,
    checksum_mismatch: AtomicU64,
    resync_bytes: AtomicU64,
}

/// Point-in-time copy of [`ErrorCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSnapshot {
    pub transport: u64,
    pub protocol: u64,
    pub command: u64,
    pub checksum_mismatch: u64,
    pub resync_bytes: u64,
}

impl ErrorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) {
        self.transport.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol(&self) {
        self.protocol.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command(&self) {
        self.command.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checksum_mismatch(&self) {
        self.checksum_mismatch.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resync_bytes(&self, n: u64) {
        if n > 0 {
            self.resync_bytes.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot {
            transport: self.transport.load(Ordering::Relaxed),
            protocol: self.protocol.load(Ordering::Relaxed),
            command: self.command.load(Ordering::Relaxed),
            checksum_mismatch: self.checksum_mismatch.load(Ordering::Relaxed),
            resync_bytes: self.resync_bytes.load(Ordering::Relaxed),
        }
    }
}
