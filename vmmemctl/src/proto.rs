//! Balloon Backdoor Protocol
//!
//! Wire constants shared with the hypervisor. The numeric values are fixed
//! by deployed hypervisors and must never change.

use core::fmt;

/// Magic loaded into `eax` for every balloon backdoor call
pub const BALLOON_BDOOR_MAGIC: u32 = 0x456c_6d6f;

/// Balloon backdoor I/O port
pub const BALLOON_BDOOR_PORT: u16 = 0x5670;

/// `TARGET` operand telling the hypervisor to size the balloon from its own
/// configuration. Older drivers always sent this value.
pub const BALLOON_MAX_SIZE_USE_CONFIG: u32 = 0;

/// Balloon backdoor commands
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalloonCmd {
    Start = 0,
    Target = 1,
    Lock = 2,
    Unlock = 3,
    GuestId = 4,
    GetProtoV3 = 5,
}

impl BalloonCmd {
    /// Command code as placed in the low half of `ecx`
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub const fn name(self) -> &'static str {
        match self {
            BalloonCmd::Start => "start",
            BalloonCmd::Target => "target",
            BalloonCmd::Lock => "lock",
            BalloonCmd::Unlock => "unlock",
            BalloonCmd::GuestId => "guest-id",
            BalloonCmd::GetProtoV3 => "get-proto",
        }
    }
}

impl fmt::Display for BalloonCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded status register
///
/// Values the hypervisor returns that this driver does not know are kept in
/// `Unknown` so callers still see exactly what came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    /// Success, and `GET_PROTO_V3` is available
    SuccessV3,
    Failure,
    CmdInvalid,
    PpnInvalid,
    PpnLocked,
    PpnUnlocked,
    PpnPinned,
    PpnNotNeeded,
    /// Hypervisor dropped the guest's protocol state
    Reset,
    Busy,
    Unknown(u32),
}

impl Status {
    const SUCCESS: u32 = 0;
    const FAILURE: u32 = u32::MAX;
    const ERROR_CMD_INVALID: u32 = 1;
    const ERROR_PPN_INVALID: u32 = 2;
    const ERROR_PPN_LOCKED: u32 = 3;
    const ERROR_PPN_UNLOCKED: u32 = 4;
    const ERROR_PPN_PINNED: u32 = 5;
    const ERROR_PPN_NOTNEEDED: u32 = 6;
    const ERROR_RESET: u32 = 7;
    const ERROR_BUSY: u32 = 8;
    const SUCCESS_V3: u32 = 0x0300_0000;

    pub const fn from_wire(raw: u32) -> Self {
        match raw {
            Self::SUCCESS => Status::Success,
            Self::FAILURE => Status::Failure,
            Self::ERROR_CMD_INVALID => Status::CmdInvalid,
            Self::ERROR_PPN_INVALID => Status::PpnInvalid,
            Self::ERROR_PPN_LOCKED => Status::PpnLocked,
            Self::ERROR_PPN_UNLOCKED => Status::PpnUnlocked,
            Self::ERROR_PPN_PINNED => Status::PpnPinned,
            Self::ERROR_PPN_NOTNEEDED => Status::PpnNotNeeded,
            Self::ERROR_RESET => Status::Reset,
            Self::ERROR_BUSY => Status::Busy,
            Self::SUCCESS_V3 => Status::SuccessV3,
            other => Status::Unknown(other),
        }
    }

    pub const fn to_wire(self) -> u32 {
        match self {
            Status::Success => Self::SUCCESS,
            Status::SuccessV3 => Self::SUCCESS_V3,
            Status::Failure => Self::FAILURE,
            Status::CmdInvalid => Self::ERROR_CMD_INVALID,
            Status::PpnInvalid => Self::ERROR_PPN_INVALID,
            Status::PpnLocked => Self::ERROR_PPN_LOCKED,
            Status::PpnUnlocked => Self::ERROR_PPN_UNLOCKED,
            Status::PpnPinned => Self::ERROR_PPN_PINNED,
            Status::PpnNotNeeded => Self::ERROR_PPN_NOTNEEDED,
            Status::Reset => Self::ERROR_RESET,
            Status::Busy => Self::ERROR_BUSY,
            Status::Unknown(raw) => raw,
        }
    }

    /// Only plain `SUCCESS` counts as success for statistics.
    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => f.write_str("success"),
            Status::SuccessV3 => f.write_str("success (v3 available)"),
            Status::Failure => f.write_str("failure"),
            Status::CmdInvalid => f.write_str("command invalid"),
            Status::PpnInvalid => f.write_str("ppn invalid"),
            Status::PpnLocked => f.write_str("ppn locked"),
            Status::PpnUnlocked => f.write_str("ppn unlocked"),
            Status::PpnPinned => f.write_str("ppn pinned"),
            Status::PpnNotNeeded => f.write_str("ppn not needed"),
            Status::Reset => f.write_str("reset"),
            Status::Busy => f.write_str("busy"),
            Status::Unknown(raw) => write!(f, "unknown status {:#x}", raw),
        }
    }
}

/// Balloon protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Legacy fixed protocol
    V2,
    /// Extensible protocol reached through `GET_PROTO_V3`
    V3,
    /// A revision newer than this driver knows, as reported by `GET_PROTO_V3`
    Other(u32),
}

impl ProtocolVersion {
    /// Best revision this driver speaks; sent with `START`.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V3;

    pub const fn from_wire(raw: u32) -> Self {
        match raw {
            2 => ProtocolVersion::V2,
            3 => ProtocolVersion::V3,
            other => ProtocolVersion::Other(other),
        }
    }

    pub const fn to_wire(self) -> u32 {
        match self {
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
            ProtocolVersion::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.to_wire())
    }
}

/// Guest OS identity reported with `GUEST_ID`
///
/// Passed through verbatim; the hypervisor decides what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GuestType(pub u32);

impl GuestType {
    pub const UNKNOWN: GuestType = GuestType(0);
    pub const LINUX: GuestType = GuestType(1);
    pub const BSD: GuestType = GuestType(2);
    pub const WINDOWS_NT4: GuestType = GuestType(3);
    pub const WINDOWS_NT5: GuestType = GuestType(4);
    pub const SOLARIS: GuestType = GuestType(5);
    pub const MACOS: GuestType = GuestType(6);
    pub const FROBOS: GuestType = GuestType(7);
}
