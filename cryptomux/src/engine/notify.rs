// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::{debug, warn};

use crate::diagnostics::ApiId;
use crate::driver::JobRef;
use crate::engine::{Completion, Delivery, Engine, Locked, PartitionState};
use crate::error::{DevError, JobError, JobResult};
use crate::job::{JobId, JobState, OperationMode};

/// Work left for a completion once THE LOCK has been released.
#[derive(Debug)]
#[must_use]
pub(crate) struct PendingDelivery {
    pub(crate) job: JobId,
    pub(crate) partition: usize,
    pub(crate) queue: usize,
    pub(crate) result: JobResult,
    pub(crate) callout: Option<usize>,
}

impl Engine {
    /// Entry point for channels reporting the end of a job.
    pub(crate) fn notify(&self, job_ref: &JobRef, result: JobResult) {
        let mut st = self.lock();
        if !self.is_current_binding(&st, job_ref) {
            drop(st);
            debug!("{}: ignoring completion {:?}", job_ref.job, result);
            self.diagnostics
                .report_runtime_error(ApiId::Notification, DevError::UnexpectedNotification(job_ref.job.0));
            return;
        }
        let pending = self.resolve_completion(&mut st[job_ref.partition], job_ref.partition, job_ref.job, result);
        drop(st);
        if let Some(pending) = pending {
            self.deliver(pending);
        }
    }

    fn is_current_binding(&self, st: &Locked<'_>, job_ref: &JobRef) -> bool {
        let Some(part) = st.get(job_ref.partition) else {
            return false;
        };
        let Some(slot) = part.jobs.get(job_ref.job.index()) else {
            return false;
        };
        !slot.state.is_idle() && slot.object == Some(job_ref.object) && slot.binding == job_ref.binding
    }

    /// Applies a completion to the job state. Returns what still has to be
    /// delivered, or `None` if the completion was parked or dropped.
    pub(crate) fn resolve_completion(
        &self,
        part: &mut PartitionState,
        partition: usize,
        job: JobId,
        result: JobResult,
    ) -> Option<PendingDelivery> {
        let result = match part.state(job) {
            JobState::Canceled => {
                part.retire(job);
                Err(JobError::Canceled)
            }
            JobState::Progressing { deferred: None } => {
                debug!("{}: completion overtook the dispatcher, deferring {:?}", job, result);
                part.set_state(job, JobState::Progressing { deferred: Some(result) });
                return None;
            }
            JobState::Waiting | JobState::Active | JobState::Canceling { .. } => {
                let finished = part
                    .object_mut(job)
                    .map_or(true, |o| o.mode.contains(OperationMode::FINISH));
                if result.is_ok() && !finished {
                    part.set_state(job, JobState::Active);
                } else {
                    part.retire(job);
                }
                result
            }
            state @ (JobState::Idle | JobState::Queued | JobState::Progressing { deferred: Some(_) }) => {
                warn!("{}: completion {:?} in state {:?} dropped", job, result, state);
                self.diagnostics
                    .report_runtime_error(ApiId::Notification, DevError::UnexpectedNotification(job.0));
                return None;
            }
        };
        let callout = self.take_post_callout(part, job);
        Some(PendingDelivery {
            job,
            partition,
            queue: self.queue_of(job),
            result,
            callout,
        })
    }

    /// Completes a job that the engine itself ends (cancellation, refused
    /// callout, synchronous channel error on retrigger).
    pub(crate) fn conclude(
        &self,
        st: &mut Locked<'_>,
        partition: usize,
        job: JobId,
        result: JobResult,
    ) -> Option<PendingDelivery> {
        let part = &mut st[partition];
        part.set_state(job, JobState::Waiting);
        self.resolve_completion(part, partition, job, result)
    }

    /// Runs the post-callout, hands the result to the job's consumer and
    /// retriggers the queue. Must be called without THE LOCK.
    pub(crate) fn deliver(&self, pending: PendingDelivery) {
        let PendingDelivery {
            job,
            partition,
            queue,
            result,
            callout,
        } = pending;

        let result = match callout {
            Some(callout) => self.run_post_callout(callout, job, partition, result),
            None => result,
        };
        let result = self.public_result(result);
        debug!("{}: delivering {:?}", job, result);

        match &self.deliveries[job.index()] {
            Delivery::Direct(callback) => callback(job, result),
            Delivery::Polled(slot) => {
                let mut st = self.lock();
                st[partition].polled[*slot] = Some(Completion {
                    job,
                    partition,
                    result,
                });
            }
            Delivery::None => {}
        }

        if self.retrigger_in_callback(queue) {
            let mut st = self.lock();
            st[partition].queues[queue].retrigger_pending = true;
            self.retrigger(st, partition, queue);
        }
    }
}
