//! Page numbers and reclaim limits as the backdoor sees them

use x86_64::structures::paging::{PageSize, PhysFrame, Size4KiB};
use x86_64::PhysAddr;

use crate::error::{BalloonError, Result};
use crate::proto::BALLOON_MAX_SIZE_USE_CONFIG;

/// Physical page number of a 4KiB guest page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ppn(pub u64);

impl Ppn {
    /// Page size
    pub const PAGE_SIZE: u64 = Size4KiB::SIZE;

    pub fn containing(addr: PhysAddr) -> Self {
        Ppn(addr.as_u64() / Self::PAGE_SIZE)
    }

    pub fn start_address(self) -> Option<PhysAddr> {
        let addr = self.0.checked_mul(Self::PAGE_SIZE)?;
        PhysAddr::try_new(addr).ok()
    }

    pub fn frame(self) -> Option<PhysFrame<Size4KiB>> {
        self.start_address().map(PhysFrame::containing_address)
    }

    /// Backdoor operand. The legacy wire format carries 32 bits, which caps
    /// balloonable memory at 16TB.
    pub fn to_wire(self) -> Result<u32> {
        u32::try_from(self.0).map_err(|_| BalloonError::PpnOutOfRange(self.0))
    }
}

impl From<PhysFrame<Size4KiB>> for Ppn {
    fn from(frame: PhysFrame<Size4KiB>) -> Self {
        Ppn::containing(frame.start_address())
    }
}

impl From<u64> for Ppn {
    fn from(raw: u64) -> Self {
        Ppn(raw)
    }
}

/// Largest balloon the guest thinks it can reach, sent with `TARGET`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimLimit {
    /// Let the hypervisor use its configured maximum
    #[default]
    UseConfig,
    Pages(u64),
}

impl ReclaimLimit {
    pub fn to_wire(self) -> Result<u32> {
        match self {
            ReclaimLimit::UseConfig => Ok(BALLOON_MAX_SIZE_USE_CONFIG),
            ReclaimLimit::Pages(pages) => {
                u32::try_from(pages).map_err(|_| BalloonError::LimitOutOfRange(pages))
            }
        }
    }
}
