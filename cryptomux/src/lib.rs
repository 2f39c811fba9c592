// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! cryptomux: admission, queueing, dispatch, cancellation and completion of
//! cryptographic jobs on channels that run one job at a time.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod error;
pub mod job;
pub mod requests;
pub mod services;

pub use config::{EngineConfig, Features, Processing};
pub use driver::accelerator::Accelerator;
pub use driver::{CancelResponse, ChannelDriver, DriverJob, JobRef};
pub use engine::{
    Callout, CalloutVerdict, CancelStatus, Completion, Engine, EngineBuilder, ExecutionContext, FixedContext,
    Notifier, ThreadContext,
};
pub use error::{ConfigError, DevError, JobError, JobResult};
pub use job::{JobId, JobState, KeyId, OperationMode, OutputBuffer, VerifySlot};
pub use services::keys::{KeyStore, MemoryKeyStore};
