//! Balloon driver configuration

use crate::proto::{GuestType, ProtocolVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalloonConfig {
    /// Identity reported with `GUEST_ID`
    pub guest_type: GuestType,
    /// Revision offered with `START`
    pub protocol: ProtocolVersion,
}

impl BalloonConfig {
    pub const fn new(guest_type: GuestType) -> Self {
        Self {
            guest_type,
            protocol: ProtocolVersion::LATEST,
        }
    }

    pub const fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }
}

impl Default for BalloonConfig {
    fn default() -> Self {
        Self::new(GuestType::UNKNOWN)
    }
}
