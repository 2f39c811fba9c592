// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::{debug, warn};

use crate::diagnostics::ApiId;
use crate::engine::{CalloutVerdict, ChannelBusyGuard, Engine, Locked};
use crate::error::DevError;
use crate::job::{CalloutState, JobId, JobState};

/// What the pre-callout gate decided for a job about to be dispatched.
pub(crate) enum Gate {
    Open,
    Pending,
    Rejected,
}

impl Engine {
    /// Asks the pre-callout of `job` if it has not passed yet. THE LOCK is
    /// released around the call.
    pub(crate) fn pass_gate<'a>(&'a self, st: Locked<'a>, p: usize, job: JobId) -> (Gate, Locked<'a>) {
        let Some(callout) = self.callout_of(job) else {
            return (Gate::Open, st);
        };
        if !st[p].gate(job).needs_pre() {
            return (Gate::Open, st);
        }
        let (verdict, st) = self.call_out(st, || self.callouts[callout].pre(job, p));
        debug!("{}: pre-callout answered {:?}", job, verdict);
        let gate = match verdict {
            CalloutVerdict::Proceed => Gate::Open,
            CalloutVerdict::Pending => Gate::Pending,
            CalloutVerdict::Reject => Gate::Rejected,
        };
        (gate, st)
    }

    /// Drops the busy guard of a queue and serves the queue if a completion
    /// asked for it while the guard was up.
    pub(crate) fn release_channel<'a>(&'a self, st: Locked<'a>, guard: ChannelBusyGuard<'a>, p: usize, q: usize) {
        drop(guard);
        if st[p].queues[q].retrigger_pending {
            self.retrigger(st, p, q);
        }
    }

    /// Hands queued jobs to the channel, tail first, until the channel
    /// accepts one or the queue runs empty.
    pub(crate) fn retrigger<'a>(&'a self, mut st: Locked<'a>, p: usize, q: usize) {
        let layout = &self.layout.queues[q];
        let channel = self.config.queues[q].channel;

        loop {
            if self.is_locked(p, q) {
                // the guard holder picks this up when it lets go
                return;
            }
            st[p].queues[q].retrigger_pending = false;
            let Some(entry) = st[p].queue_tail(layout, q) else {
                return;
            };
            let job = entry.job;
            let guard = self.busy_guard(p, q);

            let (gate, relocked) = self.pass_gate(st, p, job);
            st = relocked;
            if st[p].state(job) != JobState::Queued {
                // canceled or otherwise taken care of meanwhile
                drop(guard);
                continue;
            }
            match gate {
                Gate::Open => {
                    if self.callout_of(job).is_some() {
                        st[p].set_gate(job, CalloutState::Processing);
                    }
                }
                Gate::Pending => {
                    st[p].set_gate(job, CalloutState::PrePending);
                    drop(guard);
                    if !st[p].queues[q].retrigger_pending {
                        return;
                    }
                }
                Gate::Rejected => {
                    st[p].dequeue(layout, q, job);
                    st[p].set_gate(job, CalloutState::ProcessingAbortedByCallout);
                    st[p].set_state(job, JobState::Waiting);
                    drop(guard);
                    continue;
                }
            }

            let Some(driver_job) = self.driver_job(&st[p], p, job) else {
                warn!("{}: queued without an object, dropping it", job);
                st[p].dequeue(layout, q, job);
                st[p].set_state(job, JobState::Idle);
                self.diagnostics
                    .report_runtime_error(ApiId::MainFunction, DevError::UnexpectedNotification(job.0));
                drop(guard);
                continue;
            };
            st[p].set_state(job, JobState::progressing());
            let (result, relocked) = self.call_out(st, || self.driver.process(channel, &driver_job));
            st = relocked;

            match result {
                Ok(()) => {
                    st[p].dequeue(layout, q, job);
                    match st[p].state(job) {
                        JobState::Progressing { deferred: Some(r) } => {
                            if let Some(pending) = self.conclude(&mut st, p, job, r) {
                                drop(st);
                                self.deliver(pending);
                                st = self.lock();
                            }
                        }
                        JobState::Progressing { deferred: None } => st[p].set_state(job, JobState::Waiting),
                        _ => {}
                    }
                    drop(guard);
                    if !st[p].queues[q].retrigger_pending {
                        return;
                    }
                }
                Err(e) if e.is_busy() => {
                    debug!("{}: channel {} still busy, stays queued", job, channel.0);
                    if let Some(object) = st[p].object_mut(job) {
                        object.apply_redirection();
                    }
                    st[p].set_state(job, JobState::Queued);
                    drop(guard);
                    if !st[p].queues[q].retrigger_pending {
                        return;
                    }
                }
                Err(e) => {
                    debug!("{}: channel {} refused with {:?}", job, channel.0, e);
                    st[p].dequeue(layout, q, job);
                    if let Some(pending) = self.conclude(&mut st, p, job, Err(e)) {
                        drop(st);
                        self.deliver(pending);
                        st = self.lock();
                    }
                    drop(guard);
                }
            }
        }
    }
}
