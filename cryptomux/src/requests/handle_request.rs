// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use anyhow::Context;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use log::debug;
use serde::Serialize;

use super::request::ServiceRequest;
use crate::engine::{CancelStatus, Engine};
use crate::error::JobResult;
use crate::job::{JobId, OutputBuffer, Verification, VerifySlot};

/// A request handed to the engine. Outputs of asynchronous jobs fill in
/// once the job has completed.
#[derive(Debug)]
pub struct Submission {
    pub job: Option<JobId>,
    pub accepted: JobResult,
    pub canceled: Option<CancelStatus>,
    outputs: Vec<OutputBuffer>,
    verify: Option<VerifySlot>,
}

/// Printable state of a submission.
#[derive(Debug, Serialize)]
pub struct SubmissionReport {
    pub job: Option<JobId>,
    pub accepted: JobResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled: Option<CancelStatus>,
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

impl Submission {
    fn new(job: Option<JobId>, accepted: JobResult) -> Self {
        Self {
            job,
            accepted,
            canceled: None,
            outputs: Vec::new(),
            verify: None,
        }
    }

    fn with_outputs(mut self, outputs: &[&OutputBuffer]) -> Self {
        self.outputs = outputs.iter().map(|b| (*b).clone()).collect();
        self
    }

    fn with_verify(mut self, verify: VerifySlot) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn report(&self) -> SubmissionReport {
        SubmissionReport {
            job: self.job,
            accepted: self.accepted,
            canceled: self.canceled,
            outputs: self
                .outputs
                .iter()
                .map(|b| BASE64_STANDARD.encode(b.contents()))
                .collect(),
            verification: self.verify.as_ref().and_then(VerifySlot::get),
        }
    }
}

fn decode(field: &str, b64: &str) -> anyhow::Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(b64)
        .with_context(|| format!("field {field} is not valid base64"))
}

pub fn handle_cli_request(engine: &Engine, json: &str) -> anyhow::Result<Submission> {
    let request: ServiceRequest = serde_json::from_str(json).context("invalid request JSON")?;
    handle_request(engine, request)
}

pub fn handle_request(engine: &Engine, request: ServiceRequest) -> anyhow::Result<Submission> {
    debug!("handling {:?}", request);
    let submission = match request {
        ServiceRequest::Hash {
            job,
            mode,
            data,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.hash(job, mode, &decode("data", &data)?, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::MacGenerate {
            job,
            mode,
            data,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.mac_generate(job, mode, &decode("data", &data)?, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::MacVerify { job, mode, data, mac } => {
            let verify = VerifySlot::new();
            let accepted = engine.mac_verify(job, mode, &decode("data", &data)?, &decode("mac", &mac)?, &verify);
            Submission::new(Some(job), accepted).with_verify(verify)
        }
        ServiceRequest::Encrypt {
            job,
            mode,
            data,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.encrypt(job, mode, &decode("data", &data)?, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::Decrypt {
            job,
            mode,
            data,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.decrypt(job, mode, &decode("data", &data)?, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::AeadEncrypt {
            job,
            mode,
            data,
            associated,
            output_len,
            tag_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let tag = OutputBuffer::with_capacity(tag_len);
            let accepted = engine.aead_encrypt(
                job,
                mode,
                &decode("data", &data)?,
                &decode("associated", &associated)?,
                &out,
                &tag,
            );
            Submission::new(Some(job), accepted).with_outputs(&[&out, &tag])
        }
        ServiceRequest::AeadDecrypt {
            job,
            mode,
            data,
            associated,
            tag,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let verify = VerifySlot::new();
            let accepted = engine.aead_decrypt(
                job,
                mode,
                &decode("data", &data)?,
                &decode("associated", &associated)?,
                &decode("tag", &tag)?,
                &out,
                &verify,
            );
            Submission::new(Some(job), accepted)
                .with_outputs(&[&out])
                .with_verify(verify)
        }
        ServiceRequest::SignatureGenerate {
            job,
            mode,
            data,
            output_len,
        } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.signature_generate(job, mode, &decode("data", &data)?, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::SignatureVerify {
            job,
            mode,
            data,
            signature,
        } => {
            let verify = VerifySlot::new();
            let accepted = engine.signature_verify(
                job,
                mode,
                &decode("data", &data)?,
                &decode("signature", &signature)?,
                &verify,
            );
            Submission::new(Some(job), accepted).with_verify(verify)
        }
        ServiceRequest::RandomGenerate { job, output_len } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.random_generate(job, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::RandomSeed { job, key, seed } => {
            let accepted = engine.random_seed(job, key, &decode("seed", &seed)?);
            Submission::new(Some(job), accepted)
        }
        ServiceRequest::KeyGenerate { job, key } => Submission::new(Some(job), engine.key_generate(job, key)),
        ServiceRequest::KeyDerive { job, key, target } => {
            Submission::new(Some(job), engine.key_derive(job, key, target))
        }
        ServiceRequest::KeyExchangeCalcPubVal { job, key, output_len } => {
            let out = OutputBuffer::with_capacity(output_len);
            let accepted = engine.key_exchange_calc_pub_val(job, key, &out);
            Submission::new(Some(job), accepted).with_outputs(&[&out])
        }
        ServiceRequest::KeyExchangeCalcSecret { job, key, partner } => {
            let accepted = engine.key_exchange_calc_secret(job, key, &decode("partner", &partner)?);
            Submission::new(Some(job), accepted)
        }
        ServiceRequest::KeySetValidJob { job, key } => {
            Submission::new(Some(job), engine.key_set_valid_job(job, key))
        }
        ServiceRequest::KeyElementSet { key, element, data } => {
            let accepted = engine.key_element_set(key, element, &decode("data", &data)?);
            Submission::new(None, accepted)
        }
        ServiceRequest::KeySetValid { key } => Submission::new(None, engine.key_set_valid(key)),
        ServiceRequest::Cancel { job, mode } => {
            let result = engine.cancel(job, mode);
            let mut submission = Submission::new(Some(job), result.map(|_| ()));
            submission.canceled = result.ok();
            submission
        }
    };
    Ok(submission)
}
