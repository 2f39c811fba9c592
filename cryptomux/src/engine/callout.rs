// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::debug;

use crate::engine::{Engine, PartitionState};
use crate::error::JobResult;
use crate::job::{CalloutState, JobId};

/// Answer of a pre-callout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutVerdict {
    Proceed,
    /// Ask again on the next attempt. Only honoured for asynchronous jobs.
    Pending,
    Reject,
}

/// Policy hook run around the processing of a job. Both hooks are called
/// without THE LOCK held.
pub trait Callout: Send + Sync {
    fn pre(&self, job: JobId, partition: usize) -> CalloutVerdict;

    /// Sees the processing result and returns the one the caller gets.
    fn post(&self, job: JobId, partition: usize, result: JobResult) -> JobResult {
        let _ = (job, partition);
        result
    }
}

impl PartitionState {
    pub(crate) fn gate(&self, job: JobId) -> CalloutState {
        self.callouts.get(&job).copied().unwrap_or_default()
    }

    pub(crate) fn set_gate(&mut self, job: JobId, state: CalloutState) {
        if state == CalloutState::Idle {
            self.callouts.remove(&job);
        } else {
            self.callouts.insert(job, state);
        }
    }
}

impl Engine {
    pub(crate) fn callout_of(&self, job: JobId) -> Option<usize> {
        self.config.jobs[job.index()].callout
    }

    /// Moves the gate to `PostInitial` if a post-callout is owed and returns
    /// the callout to run. A gate still waiting for its pre-callout is reset.
    pub(crate) fn take_post_callout(&self, part: &mut PartitionState, job: JobId) -> Option<usize> {
        let callout = self.callout_of(job)?;
        match part.gate(job) {
            CalloutState::Processing | CalloutState::ProcessingAbortedByCallout => {
                part.set_gate(job, CalloutState::PostInitial);
                Some(callout)
            }
            CalloutState::PrePending => {
                part.set_gate(job, CalloutState::Idle);
                None
            }
            CalloutState::Idle | CalloutState::PostInitial => None,
        }
    }

    /// Runs a post-callout outside THE LOCK and closes the gate.
    pub(crate) fn run_post_callout(
        &self,
        callout: usize,
        job: JobId,
        partition: usize,
        result: JobResult,
    ) -> JobResult {
        let result = self.callouts[callout].post(job, partition, result);
        debug!("{}: post-callout returned {:?}", job, result);
        let mut st = self.lock();
        st[partition].set_gate(job, CalloutState::Idle);
        result
    }
}
