//! Balloon RPC codec
//!
//! Stateless translation between balloon operations and backdoor frames.
//! Inputs that do not fit the wire format are refused here, before any
//! frame exists.

use log::debug;

use crate::backdoor::{BackdoorReply, BackdoorRequest, HypercallChannel};
use crate::error::Result;
use crate::page::{Ppn, ReclaimLimit};
use crate::proto::{BalloonCmd, GuestType, ProtocolVersion, Status};

/// Decoded response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    /// Negotiated version for `GET_PROTO_V3`, target pages for `TARGET`
    pub payload: Option<u32>,
}

pub fn encode_get_proto() -> BackdoorRequest {
    BackdoorRequest::new(BalloonCmd::GetProtoV3, 0)
}

pub fn encode_start(version: ProtocolVersion) -> BackdoorRequest {
    BackdoorRequest::new(BalloonCmd::Start, version.to_wire())
}

pub fn encode_guest_type(guest: GuestType) -> BackdoorRequest {
    BackdoorRequest::new(BalloonCmd::GuestId, guest.0)
}

pub fn encode_get_target(limit: ReclaimLimit) -> Result<BackdoorRequest> {
    Ok(BackdoorRequest::new(BalloonCmd::Target, limit.to_wire()?))
}

pub fn encode_lock(ppn: Ppn) -> Result<BackdoorRequest> {
    Ok(BackdoorRequest::new(BalloonCmd::Lock, ppn.to_wire()?))
}

pub fn encode_unlock(ppn: Ppn) -> Result<BackdoorRequest> {
    Ok(BackdoorRequest::new(BalloonCmd::Unlock, ppn.to_wire()?))
}

/// Decodes the reply to `cmd`. Which register carries the payload depends on
/// the command.
pub fn decode(cmd: BalloonCmd, reply: &BackdoorReply) -> Reply {
    let payload = match cmd {
        BalloonCmd::GetProtoV3 => Some(reply.cx),
        BalloonCmd::Target => Some(reply.bx),
        BalloonCmd::Start | BalloonCmd::GuestId | BalloonCmd::Lock | BalloonCmd::Unlock => None,
    };

    Reply {
        status: Status::from_wire(reply.status),
        payload,
    }
}

/// One blocking round trip: send `request`, decode what comes back.
pub fn call<C: HypercallChannel + ?Sized>(channel: &mut C, request: &BackdoorRequest) -> Reply {
    let raw = channel.exchange(request);
    let reply = decode(request.cmd(), &raw);
    debug!(
        "balloon: {} {:#x} -> {}",
        request.cmd(),
        request.operand(),
        reply.status
    );
    reply
}
