//! Scripted backdoor for unit tests

use std::collections::VecDeque;

use crate::backdoor::{BackdoorReply, BackdoorRequest, HypercallChannel};
use crate::proto::{BalloonCmd, Status};

/// Answers each exchange with the next queued reply and records every
/// request it was sent.
#[derive(Debug, Default)]
pub struct ScriptedBackdoor {
    replies: VecDeque<BackdoorReply>,
    pub sent: Vec<BackdoorRequest>,
}

impl ScriptedBackdoor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script whose first reply accepts a plain v2 `START`.
    pub fn started() -> Self {
        Self::new().reply(Status::Success)
    }

    pub fn reply(mut self, status: Status) -> Self {
        self.push(status, 0, 0);
        self
    }

    pub fn reply_with(mut self, status: Status, bx: u32, cx: u32) -> Self {
        self.push(status, bx, cx);
        self
    }

    pub fn push(&mut self, status: Status, bx: u32, cx: u32) {
        self.replies
            .push_back(BackdoorReply::new(status.to_wire(), bx, cx));
    }

    pub fn sent_cmds(&self) -> Vec<BalloonCmd> {
        self.sent.iter().map(|req| req.cmd()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl HypercallChannel for ScriptedBackdoor {
    fn exchange(&mut self, request: &BackdoorRequest) -> BackdoorReply {
        self.sent.push(*request);
        match self.replies.pop_front() {
            Some(reply) => reply,
            None => panic!("unscripted backdoor call: {}", request.cmd()),
        }
    }
}
