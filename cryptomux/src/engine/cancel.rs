// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::diagnostics::ApiId;
use crate::driver::CancelResponse;
use crate::engine::{Engine, Locked};
use crate::error::{DevError, JobError};
use crate::job::{JobId, JobState, OperationMode, Resumable};

/// Successful outcomes of `Engine::cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelStatus {
    /// Nothing to cancel.
    Idle,
    /// The job is gone; its consumer got `Canceled`.
    Canceled,
    /// The channel still calls back; the consumer gets `Canceled` then.
    Pending,
    /// The job completed while the channel was asked.
    Completed,
}

impl Engine {
    /// Cancels `job` in the caller's partition. `mode` is handed to the
    /// channel with the cancellation request.
    pub fn cancel(&self, job: JobId, mode: OperationMode) -> Result<CancelStatus, JobError> {
        if job.index() >= self.config.jobs.len() {
            return Err(self.dev_error(ApiId::CancelJob, DevError::InvalidJobId(job.0)));
        }
        let p = self.partition(ApiId::CancelJob)?;
        let mut st = self.lock();
        if !st[p].initialized {
            drop(st);
            return Err(self.dev_error(ApiId::CancelJob, DevError::Uninit(p)));
        }

        let q = self.queue_of(job);
        let layout = &self.layout.queues[q];
        let channel = self.config.queues[q].channel;
        let state = st[p].state(job);
        debug!("{}: cancel requested in state {:?}", job, state);

        match state {
            JobState::Idle => Ok(CancelStatus::Idle),
            JobState::Queued => {
                let not_started = st[p]
                    .object_mut(job)
                    .is_some_and(|o| o.mode.contains(OperationMode::START));
                if not_started {
                    st[p].dequeue(layout, q, job);
                    self.finish_cancel(st, p, job);
                    return Ok(CancelStatus::Canceled);
                }

                let Some(mut driver_job) = self.driver_job(&st[p], p, job) else {
                    return Err(JobError::NotOk);
                };
                driver_job.mode = mode;
                let guard = self.busy_guard(p, q);
                let (response, relocked) = self.call_out(st, || self.driver.cancel(channel, &driver_job));
                st = relocked;
                if response == CancelResponse::Ok && st[p].state(job) == JobState::Queued {
                    st[p].dequeue(layout, q, job);
                    self.finish_cancel(st, p, job);
                    st = self.lock();
                    self.release_channel(st, guard, p, q);
                    Ok(CancelStatus::Canceled)
                } else {
                    debug!("{}: channel refused to cancel a started job ({:?})", job, response);
                    self.release_channel(st, guard, p, q);
                    Err(JobError::NotOk)
                }
            }
            JobState::Active | JobState::Waiting => {
                let prior = if state.is_active() {
                    Resumable::Active
                } else {
                    Resumable::Waiting
                };
                let Some(mut driver_job) = self.driver_job(&st[p], p, job) else {
                    return Err(JobError::NotOk);
                };
                driver_job.mode = mode;
                let canceling = JobState::Canceling { prior };
                st[p].set_state(job, canceling);
                let (response, relocked) = self.call_out(st, || self.driver.cancel(channel, &driver_job));
                st = relocked;

                if st[p].state(job) != canceling {
                    info!("{}: completed while being canceled", job);
                    return Ok(CancelStatus::Completed);
                }
                match response {
                    CancelResponse::Ok => {
                        self.finish_cancel(st, p, job);
                        Ok(CancelStatus::Canceled)
                    }
                    CancelResponse::Pending => {
                        st[p].set_state(job, JobState::Canceled);
                        Ok(CancelStatus::Pending)
                    }
                    CancelResponse::Failed(e) => {
                        debug!("{}: channel refused cancel with {:?}", job, e);
                        st[p].set_state(job, prior.into());
                        Err(JobError::NotOk)
                    }
                }
            }
            JobState::Progressing { .. } | JobState::Canceling { .. } | JobState::Canceled => Err(JobError::NotOk),
        }
    }

    /// Ends a canceled job and delivers `Canceled` to its consumer.
    fn finish_cancel<'a>(&'a self, mut st: Locked<'a>, p: usize, job: JobId) {
        st[p].set_state(job, JobState::Canceled);
        let pending = self.resolve_completion(&mut st[p], p, job, Err(JobError::Canceled));
        drop(st);
        if let Some(pending) = pending {
            info!("{}: canceled", job);
            self.deliver(pending);
        }
    }
}
