// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod accelerator;

use crate::config::Processing;
use crate::error::{JobError, JobResult};
use crate::job::{ChannelId, JobId, JobIo, ObjectHandle, OperationMode, Primitive};

/// Identifies one binding of a job to an object. Channels hand it back to
/// `Notifier::notify` when the job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub job: JobId,
    pub partition: usize,
    pub object: ObjectHandle,
    /// Counts the bindings of the job, so a dedicated object handed out
    /// again is told apart from its earlier use.
    pub binding: u32,
}

/// Copy of a job object taken while THE LOCK is held, handed to the channel.
#[derive(Debug, Clone)]
pub struct DriverJob {
    pub job_ref: JobRef,
    pub priority: u8,
    pub processing: Processing,
    pub primitive: Primitive,
    pub mode: OperationMode,
    pub io: JobIo,
}

/// Answer of a channel to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResponse {
    Ok,
    /// The channel will still call back; the job is canceled once it does.
    Pending,
    Failed(JobError),
}

/// An execution channel. Implementations run one job at a time.
///
/// Asynchronous jobs return `Ok` once accepted and report their outcome
/// later through a `Notifier`, possibly from another thread and possibly
/// before `process` has returned.
pub trait ChannelDriver: Send + Sync {
    fn process(&self, channel: ChannelId, job: &DriverJob) -> JobResult;

    fn cancel(&self, channel: ChannelId, job: &DriverJob) -> CancelResponse;
}
