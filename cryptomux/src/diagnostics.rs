// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::{error, warn};

use crate::error::DevError;

/// Entry point that detected a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiId {
    Init,
    Hash,
    MacGenerate,
    MacVerify,
    Encrypt,
    Decrypt,
    AeadEncrypt,
    AeadDecrypt,
    SignatureGenerate,
    SignatureVerify,
    RandomGenerate,
    RandomSeed,
    KeyGenerate,
    KeyDerive,
    KeyExchangeCalcPubVal,
    KeyExchangeCalcSecret,
    KeySetValidJob,
    KeyManagement,
    CancelJob,
    Notification,
    MainFunction,
}

/// Fire-and-forget sink for development and runtime errors. Reporting never
/// changes the control flow of the caller.
pub trait DiagnosticSink: Send + Sync {
    fn report_development_error(&self, api: ApiId, err: DevError);

    fn report_runtime_error(&self, api: ApiId, err: DevError);
}

/// Default sink, writes everything to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report_development_error(&self, api: ApiId, err: DevError) {
        error!("{:?}: {}", api, err);
    }

    fn report_runtime_error(&self, api: ApiId, err: DevError) {
        warn!("{:?}: {}", api, err);
    }
}
