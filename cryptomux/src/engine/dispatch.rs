// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Admission of a populated job: straight to the channel, onto the queue or
//! back to the caller.

use log::debug;

use crate::engine::retrigger::Gate;
use crate::engine::{ChannelBusyGuard, Engine, Locked};
use crate::error::{JobError, JobResult};
use crate::job::{CalloutState, JobId, JobState, OperationMode};

impl Engine {
    /// Submits `job`, whose object has been acquired and populated.
    pub(crate) fn submit<'a>(&'a self, st: Locked<'a>, p: usize, job: JobId) -> JobResult {
        if self.is_async(job) {
            self.submit_async(st, p, job)
        } else {
            self.submit_sync(st, p, job)
        }
    }

    fn submit_async<'a>(&'a self, mut st: Locked<'a>, p: usize, job: JobId) -> JobResult {
        let q = self.queue_of(job);
        let was_active = st[p].state(job).is_active();

        let direct = !self.is_locked(p, q) && (st[p].queues[q].fill == 0 || was_active);
        if !direct {
            debug!("{}: channel occupied, queueing", job);
            return self.enqueue_or_reject(st, p, job, was_active, None);
        }

        let guard = self.busy_guard(p, q);
        // Claims the job before THE LOCK is let go for the callout.
        st[p].set_state(job, JobState::progressing());
        let (gate, relocked) = self.pass_gate(st, p, job);
        st = relocked;
        match gate {
            Gate::Open => {
                if self.callout_of(job).is_some() {
                    st[p].set_gate(job, CalloutState::Processing);
                }
            }
            Gate::Pending => {
                st[p].set_gate(job, CalloutState::PrePending);
                return self.enqueue_or_reject(st, p, job, was_active, Some(guard));
            }
            Gate::Rejected => {
                st[p].set_gate(job, CalloutState::ProcessingAbortedByCallout);
                st[p].set_state(job, JobState::Waiting);
                self.release_channel(st, guard, p, q);
                return Ok(());
            }
        }

        let Some(driver_job) = self.driver_job(&st[p], p, job) else {
            return self.abort_submission(st, p, job, false, JobError::NotOk, Some(guard));
        };
        let channel = self.config.queues[q].channel;
        let (result, relocked) = self.call_out(st, || self.driver.process(channel, &driver_job));
        st = relocked;

        match result {
            Ok(()) => {
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
                self.release_channel(st, guard, p, q);
                Ok(())
            }
            Err(e) if e.is_busy() => {
                debug!("{}: channel {} busy, queueing", job, channel.0);
                if let Some(object) = st[p].object_mut(job) {
                    object.apply_redirection();
                }
                self.enqueue_or_reject(st, p, job, was_active, Some(guard))
            }
            // a hard channel error ends the job, continuing or not
            Err(e) => self.abort_submission(st, p, job, false, e, Some(guard)),
        }
    }

    fn submit_sync<'a>(&'a self, mut st: Locked<'a>, p: usize, job: JobId) -> JobResult {
        let q = self.queue_of(job);
        let layout = &self.layout.queues[q];
        let was_active = st[p].state(job).is_active();
        let priority = st[p].object_mut(job).map_or(0, |o| o.priority);

        let admit = match st[p].queue_tail(layout, q) {
            None => true,
            Some(tail) => was_active || priority > tail.priority,
        };
        if !admit {
            debug!("{}: queued jobs take precedence", job);
            return self.abort_submission(st, p, job, was_active, JobError::Busy, None);
        }

        st[p].set_state(job, JobState::progressing());
        let (gate, relocked) = self.pass_gate(st, p, job);
        st = relocked;
        let result = match gate {
            Gate::Open => {
                if self.callout_of(job).is_some() {
                    st[p].set_gate(job, CalloutState::Processing);
                }
                match self.driver_job(&st[p], p, job) {
                    Some(driver_job) => {
                        let channel = self.config.queues[q].channel;
                        let (result, relocked) = self.call_out(st, || self.driver.process(channel, &driver_job));
                        st = relocked;
                        result
                    }
                    None => Err(JobError::NotOk),
                }
            }
            Gate::Pending | Gate::Rejected => {
                st[p].set_gate(job, CalloutState::ProcessingAbortedByCallout);
                Err(JobError::NotOk)
            }
        };

        let finished = result.is_err()
            || st[p]
                .object_mut(job)
                .map_or(true, |o| o.mode.contains(OperationMode::FINISH));
        if finished {
            st[p].retire(job);
        } else {
            st[p].set_state(job, JobState::Active);
        }
        let callout = self.take_post_callout(&mut st[p], job);
        drop(st);

        let result = match callout {
            Some(callout) => self.run_post_callout(callout, job, p, result),
            None => result,
        };
        self.public_result(result)
    }

    /// Queues `job`. A full queue leaves a continuing job `Active`. The busy
    /// guard, if any, is released once the queue is settled.
    fn enqueue_or_reject<'a>(
        &'a self,
        mut st: Locked<'a>,
        p: usize,
        job: JobId,
        was_active: bool,
        guard: Option<ChannelBusyGuard<'a>>,
    ) -> JobResult {
        let q = self.queue_of(job);
        let priority = st[p].object_mut(job).map_or(0, |o| o.priority);
        match st[p].enqueue(&self.layout.queues[q], q, job, priority, was_active) {
            Ok(()) => {
                if let Some(guard) = guard {
                    self.release_channel(st, guard, p, q);
                }
                Ok(())
            }
            Err(e) => self.abort_submission(st, p, job, was_active, e, guard),
        }
    }

    /// Undoes a submission that did not reach the channel. With `keep_active`
    /// the job stays `Active`, otherwise it gives its object back. A
    /// post-callout owed by the job still runs, then the busy guard is
    /// released.
    fn abort_submission<'a>(
        &'a self,
        mut st: Locked<'a>,
        p: usize,
        job: JobId,
        keep_active: bool,
        err: JobError,
        guard: Option<ChannelBusyGuard<'a>>,
    ) -> JobResult {
        if keep_active {
            st[p].set_state(job, JobState::Active);
        } else {
            st[p].retire(job);
        }
        let callout = self.take_post_callout(&mut st[p], job);
        drop(st);
        if let Some(callout) = callout {
            let _ = self.run_post_callout(callout, job, p, Err(err));
        }
        if let Some(guard) = guard {
            self.release_channel(self.lock(), guard, p, self.queue_of(job));
        }
        debug!("{}: submission rejected with {:?}", job, err);
        Err(self.public_error(err))
    }
}
