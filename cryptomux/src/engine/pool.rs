// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::debug;

use crate::config::Processing;
use crate::engine::{Engine, PartitionState};
use crate::error::JobError;
use crate::job::{JobId, JobState, ObjectHandle};

impl Engine {
    /// Binds an object to `job`. An Active job keeps its object; any other
    /// job in flight is `Busy`.
    pub(crate) fn acquire(&self, part: &mut PartitionState, job: JobId) -> Result<ObjectHandle, JobError> {
        let slot = part.slot(job);
        match slot.state {
            JobState::Idle => {}
            JobState::Active => return slot.object.ok_or(JobError::NotOk),
            _ => return Err(JobError::Busy),
        }

        let config = &self.config.jobs[job.index()];
        let handle = match self.layout.dedicated[job.index()] {
            Some(handle) => handle,
            None => {
                let queue = &self.layout.queues[config.queue];
                let candidates = match config.processing {
                    Processing::Async => queue.pool.clone(),
                    Processing::Sync => queue.sync_slot..queue.sync_slot + 1,
                };
                candidates
                    .into_iter()
                    .find(|&i| part.objects[i].is_empty())
                    .map(|i| ObjectHandle(i as u32))
                    .ok_or(JobError::QueueFull)?
            }
        };

        part.objects[handle.index()].bind(job, config.priority, config.primitive, config.redirection);
        let slot = part.slot_mut(job);
        slot.object = Some(handle);
        slot.binding = slot.binding.wrapping_add(1);
        debug!("{}: bound to object {} (binding {})", job, handle.0, slot.binding);
        Ok(handle)
    }
}

impl PartitionState {
    /// Unbinds the object of `job` and marks it empty. The job must not be
    /// referenced by the queue anymore.
    pub(crate) fn release(&mut self, job: JobId) {
        if let Some(handle) = self.slot_mut(job).object.take() {
            self.objects[handle.index()].release();
            debug!("{}: released object {}", job, handle.0);
        }
    }

    /// Returns the job to `Idle` and gives its object back.
    pub(crate) fn retire(&mut self, job: JobId) {
        self.set_state(job, JobState::Idle);
        self.release(job);
    }
}
