//! VMware Memory Balloon Operations
//!
//! The calls a balloon policy makes to the hypervisor. Each call holds the
//! backdoor lock for the whole round trip, so requests from one driver are
//! never interleaved and run in lock order.

use log::{info, warn};
use spin::Mutex;

use crate::backdoor::{BackdoorRequest, HypercallChannel};
use crate::codec::{self, Reply};
use crate::config::BalloonConfig;
use crate::error::{BalloonError, Result};
use crate::negotiate::negotiate;
use crate::page::{Ppn, ReclaimLimit};
use crate::proto::{ProtocolVersion, Status};
use crate::session::{BalloonSession, SessionState};
use crate::stats::BalloonOp;

/// Balloon driver bound to one hypercall channel
pub struct Balloon<C> {
    channel: Mutex<C>,
    session: BalloonSession,
    config: BalloonConfig,
}

impl<C: HypercallChannel> Balloon<C> {
    /// Create new balloon; `start` must succeed before anything else.
    pub fn new(channel: C, config: BalloonConfig) -> Self {
        Self {
            channel: Mutex::new(channel),
            session: BalloonSession::new(config.guest_type),
            config,
        }
    }

    pub fn session(&self) -> &BalloonSession {
        &self.session
    }

    pub fn config(&self) -> &BalloonConfig {
        &self.config
    }

    /// Gives the channel back so a fresh balloon can be built on it.
    pub fn into_channel(self) -> C {
        self.channel.into_inner()
    }

    /// Start (or restart) the session and negotiate the protocol.
    ///
    /// On success the session is ready and any earlier reset request is
    /// cleared. On failure the session is left uninitialized.
    pub fn start(&self) -> Result<ProtocolVersion> {
        let mut channel = self.channel.lock();

        self.session.begin_negotiation();
        let result = negotiate(&mut *channel, self.config.protocol);
        self.session.stats().record(BalloonOp::Start, result.is_ok());
        self.session.finish_negotiation(result.as_ref().ok().copied());

        match &result {
            Ok(version) => info!(
                "balloon: started, protocol {} guest type {}",
                version, self.config.guest_type.0
            ),
            Err(err) => warn!("balloon: start failed: {}", err),
        }
        result
    }

    /// Report guest OS identity.
    ///
    /// Sends the `guest_type` from the `BalloonConfig` given to
    /// [`Balloon::new`]; to report a different identity, build a new
    /// balloon with another config.
    pub fn report_guest_type(&self) -> Result<()> {
        let request = codec::encode_guest_type(self.session.guest_type());
        self.dispatch(BalloonOp::GuestType, Ok(request), |_| ())
    }

    /// Ask how many pages the hypervisor wants the balloon to hold.
    ///
    /// `limit` is the largest balloon the guest could reach. The recorded
    /// target only changes when the hypervisor answers with success.
    pub fn get_target(&self, limit: ReclaimLimit) -> Result<u32> {
        let request = codec::encode_get_target(limit);
        self.dispatch(BalloonOp::Target, request, |reply| {
            let target = reply.payload.unwrap_or_default();
            self.session.set_target(target);
            target
        })
    }

    /// Hand `ppn` to the hypervisor.
    pub fn lock_page(&self, ppn: Ppn) -> Result<()> {
        self.dispatch(BalloonOp::Lock, codec::encode_lock(ppn), |_| ())
    }

    /// Take `ppn` back from the hypervisor.
    pub fn unlock_page(&self, ppn: Ppn) -> Result<()> {
        self.dispatch(BalloonOp::Unlock, codec::encode_unlock(ppn), |_| ())
    }

    /// Sends one request on a started session and accounts for the reply.
    ///
    /// Requests that failed to encode never reach the channel and are not
    /// counted. Requests are still sent after a reset; stopping is up to the
    /// caller.
    fn dispatch<T>(
        &self,
        op: BalloonOp,
        request: Result<BackdoorRequest>,
        on_success: impl FnOnce(&Reply) -> T,
    ) -> Result<T> {
        let request = request?;
        let mut channel = self.channel.lock();

        if self.session.state() != SessionState::Ready {
            return Err(BalloonError::NotStarted);
        }

        let reply = codec::call(&mut *channel, &request);
        self.session.stats().record(op, reply.status.is_success());

        match reply.status {
            Status::Success => Ok(on_success(&reply)),
            Status::Reset => {
                self.session.request_reset();
                warn!("balloon: hypervisor requested reset during {}", request.cmd());
                Err(BalloonError::Reset { cmd: request.cmd() })
            }
            status => Err(BalloonError::from_status(request.cmd(), status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::proto::{BalloonCmd, GuestType};
    use crate::stats::OpStats;
    use crate::testing::ScriptedBackdoor;

    /// Balloon already through `START`; `hv` must begin with its reply.
    fn started(hv: ScriptedBackdoor) -> Balloon<ScriptedBackdoor> {
        let balloon = Balloon::new(hv, BalloonConfig::new(GuestType::LINUX));
        balloon.start().unwrap();
        balloon
    }

    fn sent(balloon: Balloon<ScriptedBackdoor>) -> Vec<BalloonCmd> {
        balloon.into_channel().sent_cmds()
    }

    #[test]
    fn test_start_v3_host() {
        let hv = ScriptedBackdoor::new()
            .reply(Status::SuccessV3)
            .reply_with(Status::Success, 0, 3);
        let balloon = Balloon::new(hv, BalloonConfig::new(GuestType::LINUX));

        assert_eq!(balloon.start(), Ok(ProtocolVersion::V3));
        let session = balloon.session();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.protocol(), Some(ProtocolVersion::V3));
        assert_eq!(session.stats().get(BalloonOp::Start), OpStats::new(1, 0));
    }

    #[test]
    fn test_start_legacy_host_via_cmd_invalid() {
        let hv = ScriptedBackdoor::new()
            .reply(Status::SuccessV3)
            .reply(Status::CmdInvalid);
        let balloon = Balloon::new(hv, BalloonConfig::default());

        assert_eq!(balloon.start(), Ok(ProtocolVersion::V2));
        assert_eq!(balloon.session().protocol(), Some(ProtocolVersion::V2));
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(1, 0)
        );
    }

    #[test]
    fn test_start_failure_stays_uninitialized() {
        let hv = ScriptedBackdoor::new().reply(Status::Failure);
        let balloon = Balloon::new(hv, BalloonConfig::default());

        assert!(balloon.start().is_err());
        assert_eq!(balloon.session().state(), SessionState::Uninitialized);
        assert_eq!(balloon.session().protocol(), None);
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(1, 1)
        );
    }

    #[test]
    fn test_operations_before_start_send_nothing() {
        let balloon = Balloon::new(ScriptedBackdoor::new(), BalloonConfig::default());

        assert_eq!(balloon.lock_page(Ppn(1)), Err(BalloonError::NotStarted));
        assert_eq!(
            balloon.get_target(ReclaimLimit::UseConfig),
            Err(BalloonError::NotStarted)
        );
        assert_eq!(balloon.report_guest_type(), Err(BalloonError::NotStarted));
        for op in BalloonOp::ALL {
            assert_eq!(balloon.session().stats().get(op), OpStats::new(0, 0));
        }
        assert!(sent(balloon).is_empty());
    }

    #[test]
    fn test_lock_highest_32bit_ppn() {
        let balloon = started(ScriptedBackdoor::started().reply(Status::Success));

        assert_eq!(balloon.lock_page(Ppn(0xFFFF_FFFF)), Ok(()));
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Lock),
            OpStats::new(1, 0)
        );
        let hv = balloon.into_channel();
        assert_eq!(hv.sent.len(), 2);
        assert_eq!(hv.sent[1].cmd(), BalloonCmd::Lock);
        assert_eq!(hv.sent[1].operand(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_wide_ppn_rejected_locally() {
        let balloon = started(ScriptedBackdoor::started());

        assert_eq!(
            balloon.lock_page(Ppn(1 << 33)),
            Err(BalloonError::PpnOutOfRange(1 << 33))
        );
        assert_eq!(
            balloon.unlock_page(Ppn(1 << 32)),
            Err(BalloonError::PpnOutOfRange(1 << 32))
        );
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Lock),
            OpStats::new(0, 0)
        );
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Unlock),
            OpStats::new(0, 0)
        );
        assert_eq!(sent(balloon), vec![BalloonCmd::Start]);
    }

    #[test]
    fn test_wide_limit_rejected_locally() {
        let balloon = started(ScriptedBackdoor::started());

        assert_eq!(
            balloon.get_target(ReclaimLimit::Pages(1 << 40)),
            Err(BalloonError::LimitOutOfRange(1 << 40))
        );
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Target),
            OpStats::new(0, 0)
        );
        assert_eq!(sent(balloon), vec![BalloonCmd::Start]);
    }

    #[test]
    fn test_get_target_records_target() {
        let balloon = started(
            ScriptedBackdoor::started()
                .reply_with(Status::Success, 4096, 0)
                .reply_with(Status::Busy, 1, 0),
        );

        assert_eq!(balloon.get_target(ReclaimLimit::Pages(100_000)), Ok(4096));
        assert_eq!(balloon.session().target(), Some(4096));

        assert_eq!(
            balloon.get_target(ReclaimLimit::UseConfig),
            Err(BalloonError::Rejected {
                cmd: BalloonCmd::Target,
                status: Status::Busy,
            })
        );
        assert_eq!(balloon.session().target(), Some(4096));
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Target),
            OpStats::new(2, 1)
        );

        let hv = balloon.into_channel();
        assert_eq!(hv.sent[1].operand(), 100_000);
        assert_eq!(hv.sent[2].operand(), 0);
    }

    #[test]
    fn test_get_target_reset() {
        let balloon = started(ScriptedBackdoor::started().reply(Status::Reset));

        let err = balloon.get_target(ReclaimLimit::UseConfig).unwrap_err();
        assert_eq!(err, BalloonError::Reset { cmd: BalloonCmd::Target });
        assert_eq!(err.status(), Some(Status::Reset));
        assert!(balloon.session().reset_requested());
        assert_eq!(balloon.session().target(), None);
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Target),
            OpStats::new(1, 1)
        );
    }

    #[test]
    fn test_reset_is_sticky() {
        let balloon = started(
            ScriptedBackdoor::started()
                .reply(Status::Success)
                .reply(Status::Reset)
                .reply(Status::Success)
                .reply(Status::PpnInvalid)
                .reply(Status::Success),
        );

        assert_eq!(balloon.lock_page(Ppn(10)), Ok(()));
        assert!(!balloon.session().reset_requested());
        assert!(balloon.unlock_page(Ppn(10)).unwrap_err().is_reset());

        // Further requests still go out, and the flag stays up.
        assert_eq!(balloon.lock_page(Ppn(11)), Ok(()));
        assert!(balloon.session().reset_requested());
        assert_eq!(
            balloon.lock_page(Ppn(12)),
            Err(BalloonError::Rejected {
                cmd: BalloonCmd::Lock,
                status: Status::PpnInvalid,
            })
        );
        assert_eq!(balloon.report_guest_type(), Ok(()));
        assert!(balloon.session().reset_requested());
    }

    #[test]
    fn test_restart_clears_reset_and_keeps_stats() {
        let balloon = started(
            ScriptedBackdoor::started()
                .reply(Status::Reset)
                .reply(Status::Success),
        );

        assert!(balloon.report_guest_type().unwrap_err().is_reset());
        assert!(balloon.session().reset_requested());

        assert_eq!(balloon.start(), Ok(ProtocolVersion::V2));
        assert!(!balloon.session().reset_requested());
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(2, 0)
        );
        assert_eq!(
            balloon.session().stats().get(BalloonOp::GuestType),
            OpStats::new(1, 1)
        );
    }

    #[test]
    fn test_reset_during_start_fails_without_raising_flag() {
        let hv = ScriptedBackdoor::new().reply(Status::Reset);
        let balloon = Balloon::new(hv, BalloonConfig::default());

        assert_eq!(
            balloon.start(),
            Err(BalloonError::Reset { cmd: BalloonCmd::Start })
        );
        assert!(!balloon.session().reset_requested());
        assert_eq!(balloon.session().state(), SessionState::Uninitialized);
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(1, 1)
        );
        assert_eq!(sent(balloon), vec![BalloonCmd::Start]);
    }

    #[test]
    fn test_reset_during_get_proto_fails_without_raising_flag() {
        let hv = ScriptedBackdoor::new()
            .reply(Status::SuccessV3)
            .reply(Status::Reset);
        let balloon = Balloon::new(hv, BalloonConfig::default());

        assert_eq!(
            balloon.start(),
            Err(BalloonError::Reset { cmd: BalloonCmd::GetProtoV3 })
        );
        assert!(!balloon.session().reset_requested());
        assert_eq!(balloon.session().state(), SessionState::Uninitialized);
        assert_eq!(balloon.session().protocol(), None);
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(1, 1)
        );
    }

    #[test]
    fn test_failed_restart_keeps_reset_raised() {
        let balloon = started(
            ScriptedBackdoor::started()
                .reply(Status::Reset)
                .reply(Status::Failure)
                .reply(Status::SuccessV3)
                .reply_with(Status::Success, 0, 3),
        );

        assert!(balloon.lock_page(Ppn(7)).unwrap_err().is_reset());
        assert!(balloon.session().reset_requested());

        assert_eq!(
            balloon.start(),
            Err(BalloonError::Rejected {
                cmd: BalloonCmd::Start,
                status: Status::Failure,
            })
        );
        assert!(balloon.session().reset_requested());
        assert_eq!(balloon.session().state(), SessionState::Uninitialized);
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(2, 1)
        );

        assert_eq!(balloon.start(), Ok(ProtocolVersion::V3));
        assert!(!balloon.session().reset_requested());
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Start),
            OpStats::new(3, 1)
        );
    }

    #[test]
    fn test_report_guest_type_sends_configured_id() {
        let balloon = started(ScriptedBackdoor::started().reply(Status::Success));

        assert_eq!(balloon.report_guest_type(), Ok(()));
        let hv = balloon.into_channel();
        assert_eq!(hv.sent[1].cmd(), BalloonCmd::GuestId);
        assert_eq!(hv.sent[1].operand(), GuestType::LINUX.0);
    }

    #[test]
    fn test_stats_count_every_dispatched_call() {
        let outcomes = [
            Status::Success,
            Status::PpnLocked,
            Status::Success,
            Status::Busy,
            Status::SuccessV3,
            Status::Unknown(0x99),
        ];
        let mut hv = ScriptedBackdoor::started();
        for status in outcomes {
            hv.push(status, 0, 0);
        }
        let balloon = started(hv);

        for n in 0..outcomes.len() as u64 {
            let _ = balloon.unlock_page(Ppn(n));
        }
        let _ = balloon.unlock_page(Ppn(u64::MAX));

        assert_eq!(
            balloon.session().stats().get(BalloonOp::Unlock),
            OpStats::new(6, 4)
        );
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 50;

        let mut hv = ScriptedBackdoor::started();
        for _ in 0..THREADS * PER_THREAD {
            hv.push(Status::Success, 0, 0);
        }
        let balloon = Arc::new(started(hv));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let balloon = Arc::clone(&balloon);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        balloon.lock_page(Ppn(t * PER_THREAD + i)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let balloon = match Arc::try_unwrap(balloon) {
            Ok(balloon) => balloon,
            Err(_) => panic!("balloon still shared"),
        };
        assert_eq!(
            balloon.session().stats().get(BalloonOp::Lock),
            OpStats::new(THREADS * PER_THREAD, 0)
        );
        let hv = balloon.into_channel();
        let mut ppns: Vec<u32> = hv.sent[1..].iter().map(|req| req.operand()).collect();
        ppns.sort_unstable();
        assert_eq!(ppns, (0..(THREADS * PER_THREAD) as u32).collect::<Vec<_>>());
    }
}
