// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod io;
pub mod object;
pub mod state;
pub mod types;

pub use io::{Input, JobIo, KeyElement, Output, OutputBuffer, Redirection, Verification, VerifySlot};
pub use object::JobObject;
pub use state::{CalloutState, JobState, Resumable};
pub use types::{Algorithm, ChannelId, JobId, KeyId, ObjectHandle, OperationMode, Primitive, Service};
