//! Balloon Backdoor Channel
//!
//! The hypercall transport: one blocking register exchange per request.

use crate::proto::BalloonCmd;
#[cfg(target_arch = "x86_64")]
use crate::proto::{BALLOON_BDOOR_MAGIC, BALLOON_BDOOR_PORT};

/// Command frame
///
/// Built by the codec, never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackdoorRequest {
    cmd: BalloonCmd,
    operand: u32,
}

impl BackdoorRequest {
    pub(crate) const fn new(cmd: BalloonCmd, operand: u32) -> Self {
        Self { cmd, operand }
    }

    /// Command, placed in `ecx`
    pub fn cmd(&self) -> BalloonCmd {
        self.cmd
    }

    /// Operand, placed in `ebx`
    pub fn operand(&self) -> u32 {
        self.operand
    }
}

/// Response frame, as raw registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackdoorReply {
    /// `eax`: status
    pub status: u32,
    /// `ebx`: target for `TARGET`
    pub bx: u32,
    /// `ecx`: protocol version for `GET_PROTO_V3`
    pub cx: u32,
}

impl BackdoorReply {
    pub const fn new(status: u32, bx: u32, cx: u32) -> Self {
        Self { status, bx, cx }
    }
}

/// Synchronous hypercall transport
///
/// `exchange` cannot fail at this layer. A transport fault is only visible
/// through the status register of the reply. Implementations need not be
/// reentrant; callers serialize access.
pub trait HypercallChannel {
    fn exchange(&mut self, request: &BackdoorRequest) -> BackdoorReply;
}

impl<C: HypercallChannel + ?Sized> HypercallChannel for &mut C {
    fn exchange(&mut self, request: &BackdoorRequest) -> BackdoorReply {
        (**self).exchange(request)
    }
}

/// VMware balloon backdoor over I/O port `0x5670`
#[cfg(target_arch = "x86_64")]
#[derive(Debug)]
pub struct PortBackdoor {
    _private: (),
}

#[cfg(target_arch = "x86_64")]
impl PortBackdoor {
    /// # Safety
    ///
    /// Caller must have detected a VMware hypervisor and run with I/O
    /// privilege. On anything else the port access faults or reads garbage.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86_64")]
impl HypercallChannel for PortBackdoor {
    fn exchange(&mut self, request: &BackdoorRequest) -> BackdoorReply {
        let ax: u32;
        let bx: u64;
        let cx: u32;

        // rbx is reserved by LLVM, so the operand is swapped in and out of it.
        unsafe {
            core::arch::asm!(
                "xchg {operand}, rbx",
                "in eax, dx",
                "xchg {operand}, rbx",
                operand = inout(reg) u64::from(request.operand()) => bx,
                inout("eax") BALLOON_BDOOR_MAGIC => ax,
                inout("ecx") u32::from(request.cmd().code()) => cx,
                inout("edx") u32::from(BALLOON_BDOOR_PORT) => _,
                options(nostack, preserves_flags)
            );
        }

        BackdoorReply::new(ax, bx as u32, cx)
    }
}
