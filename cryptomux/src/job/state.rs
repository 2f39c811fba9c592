// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::error::JobResult;

/// State a cancellation falls back to if the channel refuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumable {
    Active,
    Waiting,
}

impl From<Resumable> for JobState {
    fn from(r: Resumable) -> Self {
        match r {
            Resumable::Active => JobState::Active,
            Resumable::Waiting => JobState::Waiting,
        }
    }
}

/// Lifecycle of a job id within one partition.
///
/// `Progressing` is the window between handing the job to the channel and
/// the dispatcher seeing the channel's answer. A completion arriving inside
/// that window is parked in `deferred` and delivered by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    /// Started, waiting for further input from the caller.
    Active,
    Queued,
    Progressing {
        deferred: Option<JobResult>,
    },
    /// Accepted by an asynchronous channel, completion pending.
    Waiting,
    Canceling {
        prior: Resumable,
    },
    /// Cancellation accepted by the channel, its callback is still due.
    Canceled,
}

impl JobState {
    pub const fn progressing() -> Self {
        JobState::Progressing { deferred: None }
    }

    #[inline]
    pub const fn is_idle(&self) -> bool {
        matches!(self, JobState::Idle)
    }

    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, JobState::Active)
    }
}

/// Callout gate of one job in one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalloutState {
    #[default]
    Idle,
    /// Pre-callout asked to be asked again.
    PrePending,
    /// Pre-callout passed, job may reach the channel.
    Processing,
    /// Post-callout is being run.
    PostInitial,
    /// Pre-callout refused an asynchronous job; the post-callout is still owed.
    ProcessingAbortedByCallout,
}

impl CalloutState {
    /// Whether the pre-callout still has to be asked before processing.
    #[inline]
    pub const fn needs_pre(&self) -> bool {
        matches!(self, CalloutState::Idle | CalloutState::PrePending)
    }
}
