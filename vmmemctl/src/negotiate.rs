//! Protocol negotiation
//!
//! `START` offers our best revision. A hypervisor that can do better answers
//! `SUCCESS_V3` and is asked for its revision with `GET_PROTO_V3`. One that
//! answers that with "command invalid" predates the command and is treated
//! as a v2 host; real hypervisors rely on this inference.

use log::{debug, info};

use crate::backdoor::HypercallChannel;
use crate::codec;
use crate::error::{BalloonError, Result};
use crate::proto::{BalloonCmd, ProtocolVersion, Status};

/// Runs `START` (and `GET_PROTO_V3` when offered) and returns the revision
/// to use.
pub fn negotiate<C: HypercallChannel + ?Sized>(
    channel: &mut C,
    offered: ProtocolVersion,
) -> Result<ProtocolVersion> {
    let reply = codec::call(channel, &codec::encode_start(offered));

    let version = match reply.status {
        Status::Success => ProtocolVersion::V2,
        Status::SuccessV3 => get_proto(channel)?,
        status => return Err(BalloonError::from_status(BalloonCmd::Start, status)),
    };

    info!("balloon: negotiated protocol {}", version);
    Ok(version)
}

fn get_proto<C: HypercallChannel + ?Sized>(channel: &mut C) -> Result<ProtocolVersion> {
    let reply = codec::call(channel, &codec::encode_get_proto());

    match (reply.status, reply.payload) {
        (Status::Success, Some(raw)) => Ok(ProtocolVersion::from_wire(raw)),
        (Status::CmdInvalid, _) => {
            debug!("balloon: get-proto unsupported, assuming v2 host");
            Ok(ProtocolVersion::V2)
        }
        (status, _) => Err(BalloonError::from_status(BalloonCmd::GetProtoV3, status)),
    }
}
