// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::ops::Range;

use crate::config::EngineConfig;
use crate::job::ObjectHandle;

/// Where a queue lives in the per-partition arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    /// Slots of the shared queue array owned by this queue.
    pub entries: Range<usize>,
    /// Shared objects for asynchronous jobs.
    pub pool: Range<usize>,
    /// The single shared object for synchronous jobs.
    pub sync_slot: usize,
}

impl QueueLayout {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

/// Arena layout derived once from the configuration. Every partition gets
/// arrays of exactly these sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub queues: Vec<QueueLayout>,
    /// Dedicated object of each job, `None` for shared jobs.
    pub dedicated: Vec<Option<ObjectHandle>>,
    pub object_count: usize,
    pub queue_array_len: usize,
}

impl Layout {
    /// Objects: dedicated objects first, then per queue its pool followed by
    /// its sync slot.
    pub(crate) fn compute(config: &EngineConfig) -> Self {
        let mut next_object = 0usize;
        let dedicated = config
            .jobs
            .iter()
            .map(|job| {
                if job.shared_object {
                    None
                } else {
                    let handle = ObjectHandle(next_object as u32);
                    next_object += 1;
                    Some(handle)
                }
            })
            .collect();

        let mut next_entry = 0usize;
        let queues = config
            .queues
            .iter()
            .map(|q| {
                let entries = next_entry..next_entry + q.capacity;
                next_entry += q.capacity;
                let pool = next_object..next_object + q.pool_size;
                next_object += q.pool_size;
                let sync_slot = next_object;
                next_object += 1;
                QueueLayout {
                    entries,
                    pool,
                    sync_slot,
                }
            })
            .collect();

        Self {
            queues,
            dedicated,
            object_count: next_object,
            queue_array_len: next_entry,
        }
    }
}
