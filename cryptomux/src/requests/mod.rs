// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod handle_request;
pub mod request;

pub use handle_request::{handle_cli_request, handle_request, Submission, SubmissionReport};
pub use request::ServiceRequest;
