// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Priority queue in front of a channel.
//!
//! Entries of queue `q` live in `queue[entries.start..entries.start + fill]`.
//! Priority grows toward the tail and the tail is served first. One slot is
//! held back so a continuing job always finds room.

use log::debug;

use crate::config::QueueLayout;
use crate::engine::{PartitionState, QueueEntry};
use crate::error::JobError;
use crate::job::{JobId, JobState};

impl PartitionState {
    /// Inserts `job` by priority and marks it `Queued`. On error nothing
    /// changes.
    pub(crate) fn enqueue(
        &mut self,
        layout: &QueueLayout,
        queue: usize,
        job: JobId,
        priority: u8,
        continuing: bool,
    ) -> Result<(), JobError> {
        let start = layout.entries.start;
        let fill = self.queues[queue].fill;
        let entry = QueueEntry {
            job,
            priority,
            continuing,
        };

        if continuing {
            if fill >= layout.capacity() {
                return Err(JobError::QueueFull);
            }
            self.queue[start + fill] = Some(entry);
        } else {
            if fill + 2 > layout.capacity() {
                return Err(JobError::QueueFull);
            }
            let mut pos = start + fill;
            while pos > start {
                match self.queue[pos - 1] {
                    Some(prev) if prev.priority > priority && !prev.continuing => {
                        self.queue[pos] = self.queue[pos - 1].take();
                        pos -= 1;
                    }
                    _ => break,
                }
            }
            self.queue[pos] = Some(entry);
        }

        self.queues[queue].fill = fill + 1;
        self.set_state(job, JobState::Queued);
        debug!("{}: queued on queue {} ({} entries)", job, queue, fill + 1);
        Ok(())
    }

    /// Removes `job` from the queue, closing the gap. Returns whether it was
    /// queued.
    pub(crate) fn dequeue(&mut self, layout: &QueueLayout, queue: usize, job: JobId) -> bool {
        let start = layout.entries.start;
        let fill = self.queues[queue].fill;
        let Some(pos) = (start..start + fill)
            .rev()
            .find(|&i| matches!(self.queue[i], Some(e) if e.job == job))
        else {
            return false;
        };
        for i in pos..start + fill - 1 {
            self.queue[i] = self.queue[i + 1].take();
        }
        self.queue[start + fill - 1] = None;
        self.queues[queue].fill = fill - 1;
        true
    }

    /// Highest priority entry, the next one to be served.
    pub(crate) fn queue_tail(&self, layout: &QueueLayout, queue: usize) -> Option<QueueEntry> {
        let fill = self.queues[queue].fill;
        if fill == 0 {
            return None;
        }
        self.queue[layout.entries.start + fill - 1]
    }

    /// Entries head first.
    pub(crate) fn queued<'a>(
        &'a self,
        layout: &QueueLayout,
        queue: usize,
    ) -> impl Iterator<Item = QueueEntry> + 'a {
        let start = layout.entries.start;
        let fill = self.queues[queue].fill;
        self.queue[start..start + fill].iter().flatten().copied()
    }
}
