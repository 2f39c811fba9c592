// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job::io::{JobIo, Redirection};
use crate::job::types::{JobId, OperationMode, Primitive, Service};

/// Working record of an in-flight job.
#[derive(Debug, Clone)]
pub struct JobObject {
    pub job: Option<JobId>,
    pub priority: u8,
    pub primitive: Primitive,
    pub mode: OperationMode,
    pub io: JobIo,
    pub redirection: Option<Redirection>,
}

impl JobObject {
    pub fn empty() -> Self {
        Self {
            job: None,
            priority: 0,
            primitive: Primitive {
                service: Service::Hash,
                algorithm: Default::default(),
            },
            mode: OperationMode::default(),
            io: JobIo::default(),
            redirection: None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.job.is_none()
    }

    pub fn bind(
        &mut self,
        job: JobId,
        priority: u8,
        primitive: Primitive,
        redirection: Option<Redirection>,
    ) {
        self.job = Some(job);
        self.priority = priority;
        self.primitive = primitive;
        self.redirection = redirection;
    }

    /// Loads the descriptors of one call.
    pub fn populate(&mut self, mode: OperationMode, io: JobIo) {
        self.mode = mode;
        self.io = io;
        self.apply_redirection();
    }

    pub fn apply_redirection(&mut self) {
        if let Some(redirection) = &self.redirection {
            redirection.apply(&mut self.io);
        }
    }

    /// Marks the slot empty and drops the buffers it still references.
    pub fn release(&mut self) {
        *self = JobObject::empty();
    }
}
