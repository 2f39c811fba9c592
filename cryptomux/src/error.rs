// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a job, as returned to the caller or handed to its delivery.
pub type JobResult = Result<(), JobError>;

/// Errors a job can end with. Channel specific errors are passed through to
/// the caller unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobError {
    #[error("request failed")]
    NotOk,

    #[error("channel busy")]
    Busy,

    #[error("queue full")]
    QueueFull,

    #[error("job canceled")]
    Canceled,

    #[error("key not valid")]
    KeyNotValid,

    #[error("key size mismatch")]
    KeySizeMismatch,

    #[error("key could not be read")]
    KeyReadFail,

    #[error("key could not be written")]
    KeyWriteFail,

    #[error("key is empty")]
    KeyEmpty,

    #[error("output buffer too small")]
    SmallBuffer,

    #[error("entropy exhausted")]
    EntropyExhausted,

    #[error("invalid parameter")]
    InvalidParameter,
}

impl JobError {
    /// Transient errors the dispatcher recovers from by queueing.
    #[inline]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Busy | Self::QueueFull)
    }
}

/// Development errors. They are reported to the diagnostic sink and the
/// caller sees `JobError::NotOk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DevError {
    #[error("job id {0} is not configured")]
    InvalidJobId(u32),

    #[error("job {0} is not configured for this service")]
    ServiceMismatch(u32),

    #[error("partition {0} is not initialized")]
    Uninit(usize),

    #[error("empty or missing buffer")]
    EmptyBuffer,

    #[error("queue of job {0} belongs to another partition")]
    WrongPartition(u32),

    #[error("no partition configured for execution context {0}")]
    PartitionNotFound(u32),

    #[error("notification for job {0} that is not in flight")]
    UnexpectedNotification(u32),

    #[error("no key store attached")]
    NoKeyStore,
}

/// Errors rejected while building an engine from its configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("job {job}: queue {queue} is not configured")]
    UnknownQueue { job: String, queue: usize },

    #[error("queue {0}: capacity must be at least 2")]
    QueueTooSmall(String),

    #[error("queue {queue}: partition {partition} is not configured")]
    UnknownPartition { queue: String, partition: usize },

    #[error("job {0}: asynchronous processing is disabled")]
    AsyncDisabled(String),

    #[error("job {0}: synchronous processing is disabled")]
    SyncDisabled(String),

    #[error("job {0}: shared job objects are disabled")]
    SharedObjectsDisabled(String),

    #[error("job {job}: queue {queue} has no pooled objects to share")]
    EmptyPool { job: String, queue: String },

    #[error("job {0}: callouts are disabled")]
    CalloutsDisabled(String),

    #[error("job {job}: callout {callout} is not registered")]
    UnknownCallout { job: String, callout: usize },

    #[error("job {job}: polled slot {slot} is out of range")]
    PolledSlotOutOfRange { job: String, slot: usize },

    #[error("job {0}: callback delivery configured but no callback bound")]
    MissingCallback(String),

    #[error("execution context {0} is listed for more than one partition")]
    DuplicateContext(u32),

    #[error("at least one partition must be configured")]
    NoPartitions,

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64 configuration: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("configuration is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
