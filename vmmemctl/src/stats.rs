//! Balloon statistics
//!
//! Per-operation attempt and failure counters. Written only by the holder of
//! the backdoor lock; anyone may read a snapshot at any time.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::proto::BalloonCmd;

/// Operations that reach the hypervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalloonOp {
    Start,
    GuestType,
    Target,
    Lock,
    Unlock,
}

impl BalloonOp {
    pub const ALL: [BalloonOp; 5] = [
        BalloonOp::Start,
        BalloonOp::GuestType,
        BalloonOp::Target,
        BalloonOp::Lock,
        BalloonOp::Unlock,
    ];

    /// Command that carries this operation
    pub const fn cmd(self) -> BalloonCmd {
        match self {
            BalloonOp::Start => BalloonCmd::Start,
            BalloonOp::GuestType => BalloonCmd::GuestId,
            BalloonOp::Target => BalloonCmd::Target,
            BalloonOp::Lock => BalloonCmd::Lock,
            BalloonOp::Unlock => BalloonCmd::Unlock,
        }
    }

    pub const fn name(self) -> &'static str {
        self.cmd().name()
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct OpCounters {
    attempts: AtomicU64,
    failures: AtomicU64,
}

/// Counter table owned by one session
#[derive(Debug, Default)]
pub struct BalloonStats {
    ops: [OpCounters; 5],
}

impl BalloonStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one dispatched request.
    pub(crate) fn record(&self, op: BalloonOp, success: bool) {
        let counters = &self.ops[op.index()];
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        if !success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, op: BalloonOp) -> OpStats {
        let counters = &self.ops[op.index()];
        OpStats {
            attempts: counters.attempts.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ops: BalloonOp::ALL.map(|op| self.get(op)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpStats {
    pub attempts: u64,
    pub failures: u64,
}

impl OpStats {
    pub const fn new(attempts: u64, failures: u64) -> Self {
        Self { attempts, failures }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    ops: [OpStats; 5],
}

impl StatsSnapshot {
    pub fn get(&self, op: BalloonOp) -> OpStats {
        self.ops[op.index()]
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in BalloonOp::ALL {
            let stats = self.get(op);
            writeln!(
                f,
                "{:<10} {:>8} ({:>4} failed)",
                op.name(),
                stats.attempts,
                stats.failures
            )?;
        }
        Ok(())
    }
}
