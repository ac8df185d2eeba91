//! VMware Memory Balloon Backdoor Protocol
//!
//! Guest side of the balloon conversation with the hypervisor: protocol
//! negotiation, target queries, page lock/unlock, reset handling and
//! per-operation statistics. Deciding how far to inflate or deflate is left
//! to the caller.
//!
//! ```ignore
//! let balloon = Balloon::new(unsafe { PortBackdoor::new() }, BalloonConfig::new(GuestType::LINUX));
//! balloon.start()?;
//! balloon.report_guest_type()?;
//! let target = balloon.get_target(ReclaimLimit::UseConfig)?;
//! ```

#![cfg_attr(not(test), no_std)]

pub mod backdoor;
pub mod balloon;
pub mod codec;
pub mod config;
pub mod error;
pub mod negotiate;
pub mod page;
pub mod proto;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

#[cfg(target_arch = "x86_64")]
pub use backdoor::PortBackdoor;
pub use backdoor::{BackdoorReply, BackdoorRequest, HypercallChannel};
pub use balloon::Balloon;
pub use config::BalloonConfig;
pub use error::{BalloonError, Result};
pub use page::{Ppn, ReclaimLimit};
pub use proto::{BalloonCmd, GuestType, ProtocolVersion, Status};
pub use session::{BalloonSession, SessionState};
pub use stats::{BalloonOp, BalloonStats, OpStats, StatsSnapshot};
