//! Balloon errors

use thiserror::Error;

use crate::proto::{BalloonCmd, Status};

pub type Result<T> = core::result::Result<T, BalloonError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BalloonError {
    /// PPN needs more than the 32-bit backdoor operand. Guest memory above
    /// 16TB cannot be ballooned.
    #[error("ppn {0:#x} does not fit the 32-bit backdoor operand")]
    PpnOutOfRange(u64),
    #[error("reclaim limit {0} does not fit the 32-bit backdoor operand")]
    LimitOutOfRange(u64),
    #[error("balloon session has not been started")]
    NotStarted,
    #[error("hypervisor rejected {cmd}: {status}")]
    Rejected { cmd: BalloonCmd, status: Status },
    #[error("hypervisor requested a balloon reset during {cmd}")]
    Reset { cmd: BalloonCmd },
}

impl BalloonError {
    /// Maps a non-success status from `cmd` to an error.
    pub(crate) fn from_status(cmd: BalloonCmd, status: Status) -> Self {
        match status {
            Status::Reset => BalloonError::Reset { cmd },
            status => BalloonError::Rejected { cmd, status },
        }
    }

    /// Status decoded from the hypervisor, if the error came from one.
    pub fn status(&self) -> Option<Status> {
        match self {
            BalloonError::Rejected { status, .. } => Some(*status),
            BalloonError::Reset { .. } => Some(Status::Reset),
            _ => None,
        }
    }

    /// True when the request was refused before reaching the hypervisor.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            BalloonError::PpnOutOfRange(_)
                | BalloonError::LimitOutOfRange(_)
                | BalloonError::NotStarted
        )
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, BalloonError::Reset { .. })
    }
}
