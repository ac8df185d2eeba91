//! Balloon session state
//!
//! Everything the driver remembers about its conversation with the
//! hypervisor. Fields are atomics so monitors can read them without taking
//! the backdoor lock; they are only written while that lock is held, so a
//! reader sees each field fresh but not necessarily consistent with the
//! others.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::proto::{GuestType, ProtocolVersion};
use crate::stats::BalloonStats;

const UNSET: u64 = u64::MAX;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized = 0,
    Negotiating = 1,
    Ready = 2,
}

impl SessionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SessionState::Negotiating,
            2 => SessionState::Ready,
            _ => SessionState::Uninitialized,
        }
    }
}

#[derive(Debug)]
pub struct BalloonSession {
    guest_type: GuestType,
    state: AtomicU8,
    protocol: AtomicU64,
    /// Sticky until the next successful start
    reset_requested: AtomicBool,
    /// Last target the hypervisor reported successfully
    target: AtomicU64,
    stats: BalloonStats,
}

impl BalloonSession {
    pub fn new(guest_type: GuestType) -> Self {
        Self {
            guest_type,
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            protocol: AtomicU64::new(UNSET),
            reset_requested: AtomicBool::new(false),
            target: AtomicU64::new(UNSET),
            stats: BalloonStats::new(),
        }
    }

    pub fn guest_type(&self) -> GuestType {
        self.guest_type
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Negotiated protocol, once `start` has succeeded
    pub fn protocol(&self) -> Option<ProtocolVersion> {
        match self.protocol.load(Ordering::Acquire) {
            UNSET => None,
            raw => Some(ProtocolVersion::from_wire(raw as u32)),
        }
    }

    /// Once true, the policy layer must stop driving this session and start
    /// it again.
    pub fn reset_requested(&self) -> bool {
        self.reset_requested.load(Ordering::Acquire)
    }

    /// Last successfully fetched target, in pages
    pub fn target(&self) -> Option<u32> {
        match self.target.load(Ordering::Acquire) {
            UNSET => None,
            raw => Some(raw as u32),
        }
    }

    pub fn stats(&self) -> &BalloonStats {
        &self.stats
    }

    pub(crate) fn begin_negotiation(&self) {
        self.state
            .store(SessionState::Negotiating as u8, Ordering::Release);
        self.protocol.store(UNSET, Ordering::Release);
        self.target.store(UNSET, Ordering::Release);
    }

    pub(crate) fn finish_negotiation(&self, protocol: Option<ProtocolVersion>) {
        match protocol {
            Some(version) => {
                self.protocol
                    .store(u64::from(version.to_wire()), Ordering::Release);
                self.reset_requested.store(false, Ordering::Release);
                self.state.store(SessionState::Ready as u8, Ordering::Release);
            }
            None => {
                self.state
                    .store(SessionState::Uninitialized as u8, Ordering::Release);
            }
        }
    }

    pub(crate) fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    pub(crate) fn set_target(&self, pages: u32) {
        self.target.store(u64::from(pages), Ordering::Release);
    }
}

impl fmt::Display for BalloonSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "balloon: state={:?}", self.state())?;
        if let Some(protocol) = self.protocol() {
            write!(f, " protocol={}", protocol)?;
        }
        if let Some(target) = self.target() {
            write!(f, " target={} pages", target)?;
        }
        if self.reset_requested() {
            f.write_str(" reset requested")?;
        }
        Ok(())
    }
}
