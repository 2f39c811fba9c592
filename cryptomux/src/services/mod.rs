// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Per-primitive entry points. Each one checks its arguments, binds an
//! object to the job, loads the call's descriptors into it and submits it.
//!
//! Streaming services (hash, MAC, cipher, AEAD, signature) take an
//! `OperationMode`; the other services always run as a single call.

use log::debug;

use crate::diagnostics::ApiId;
use crate::engine::Engine;
use crate::error::{DevError, JobError, JobResult};
use crate::job::{JobId, JobIo, KeyId, OperationMode, OutputBuffer, Service, VerifySlot};

pub mod keys;

impl Engine {
    /// Partition of the caller, provided it is initialized.
    pub(crate) fn ready(&self, api: ApiId) -> Result<usize, JobError> {
        let p = self.partition(api)?;
        if !self.lock()[p].initialized {
            return Err(self.dev_error(api, DevError::Uninit(p)));
        }
        Ok(p)
    }

    fn check(&self, api: ApiId, ok: bool, err: DevError) -> JobResult {
        if ok {
            Ok(())
        } else {
            Err(self.dev_error(api, err))
        }
    }

    fn run_service(&self, api: ApiId, job: JobId, service: Service, mode: OperationMode, io: JobIo) -> JobResult {
        let Some(config) = self.config.jobs.get(job.index()) else {
            return Err(self.dev_error(api, DevError::InvalidJobId(job.0)));
        };
        self.check(api, config.primitive.service == service, DevError::ServiceMismatch(job.0))?;
        let p = self.partition(api)?;
        if let Some(owner) = self.config.queues[config.queue].partition {
            self.check(api, owner == p, DevError::WrongPartition(job.0))?;
        }

        let mut st = self.lock();
        if !st[p].initialized {
            drop(st);
            return Err(self.dev_error(api, DevError::Uninit(p)));
        }
        if st[p].state(job).is_idle() && !mode.contains(OperationMode::START) {
            debug!("{}: {:?} without START on an idle job", job, mode);
            return Err(JobError::NotOk);
        }

        let handle = match self.acquire(&mut st[p], job) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("{}: no object ({:?})", job, e);
                return Err(self.public_error(e));
            }
        };
        st[p].objects[handle.index()].populate(mode, io);
        debug!("{}: {:?} {:?} submitted", job, service, mode);
        self.submit(st, p, job)
    }

    /// Output needed by a streaming service once FINISH is given.
    fn check_output(&self, api: ApiId, mode: OperationMode, out: &OutputBuffer) -> JobResult {
        let needed = mode.contains(OperationMode::FINISH);
        self.check(api, !needed || out.capacity() > 0, DevError::EmptyBuffer)
    }

    pub fn hash(&self, job: JobId, mode: OperationMode, data: &[u8], digest: &OutputBuffer) -> JobResult {
        self.check_output(ApiId::Hash, mode, digest)?;
        let io = JobIo::new().input(data).output(digest);
        self.run_service(ApiId::Hash, job, Service::Hash, mode, io)
    }

    pub fn mac_generate(&self, job: JobId, mode: OperationMode, data: &[u8], mac: &OutputBuffer) -> JobResult {
        self.check_output(ApiId::MacGenerate, mode, mac)?;
        let io = JobIo::new().input(data).output(mac);
        self.run_service(ApiId::MacGenerate, job, Service::MacGenerate, mode, io)
    }

    pub fn mac_verify(
        &self,
        job: JobId,
        mode: OperationMode,
        data: &[u8],
        mac: &[u8],
        verify: &VerifySlot,
    ) -> JobResult {
        let finish = mode.contains(OperationMode::FINISH);
        self.check(ApiId::MacVerify, !finish || !mac.is_empty(), DevError::EmptyBuffer)?;
        let io = JobIo::new().input(data).input(mac).verify(verify);
        self.run_service(ApiId::MacVerify, job, Service::MacVerify, mode, io)
    }

    pub fn encrypt(&self, job: JobId, mode: OperationMode, data: &[u8], result: &OutputBuffer) -> JobResult {
        self.check(ApiId::Encrypt, result.capacity() > 0, DevError::EmptyBuffer)?;
        let io = JobIo::new().input(data).output(result);
        self.run_service(ApiId::Encrypt, job, Service::Encrypt, mode, io)
    }

    pub fn decrypt(&self, job: JobId, mode: OperationMode, data: &[u8], result: &OutputBuffer) -> JobResult {
        self.check(ApiId::Decrypt, result.capacity() > 0, DevError::EmptyBuffer)?;
        let io = JobIo::new().input(data).output(result);
        self.run_service(ApiId::Decrypt, job, Service::Decrypt, mode, io)
    }

    pub fn aead_encrypt(
        &self,
        job: JobId,
        mode: OperationMode,
        plaintext: &[u8],
        associated: &[u8],
        ciphertext: &OutputBuffer,
        tag: &OutputBuffer,
    ) -> JobResult {
        self.check(ApiId::AeadEncrypt, ciphertext.capacity() > 0, DevError::EmptyBuffer)?;
        self.check_output(ApiId::AeadEncrypt, mode, tag)?;
        let io = JobIo::new()
            .input(plaintext)
            .input(associated)
            .output(ciphertext)
            .output(tag);
        self.run_service(ApiId::AeadEncrypt, job, Service::AeadEncrypt, mode, io)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn aead_decrypt(
        &self,
        job: JobId,
        mode: OperationMode,
        ciphertext: &[u8],
        associated: &[u8],
        tag: &[u8],
        plaintext: &OutputBuffer,
        verify: &VerifySlot,
    ) -> JobResult {
        let finish = mode.contains(OperationMode::FINISH);
        self.check(ApiId::AeadDecrypt, plaintext.capacity() > 0, DevError::EmptyBuffer)?;
        self.check(ApiId::AeadDecrypt, !finish || !tag.is_empty(), DevError::EmptyBuffer)?;
        let io = JobIo::new()
            .input(ciphertext)
            .input(associated)
            .input(tag)
            .output(plaintext)
            .verify(verify);
        self.run_service(ApiId::AeadDecrypt, job, Service::AeadDecrypt, mode, io)
    }

    pub fn signature_generate(
        &self,
        job: JobId,
        mode: OperationMode,
        data: &[u8],
        signature: &OutputBuffer,
    ) -> JobResult {
        self.check_output(ApiId::SignatureGenerate, mode, signature)?;
        let io = JobIo::new().input(data).output(signature);
        self.run_service(ApiId::SignatureGenerate, job, Service::SignatureGenerate, mode, io)
    }

    pub fn signature_verify(
        &self,
        job: JobId,
        mode: OperationMode,
        data: &[u8],
        signature: &[u8],
        verify: &VerifySlot,
    ) -> JobResult {
        let finish = mode.contains(OperationMode::FINISH);
        self.check(ApiId::SignatureVerify, !finish || !signature.is_empty(), DevError::EmptyBuffer)?;
        let io = JobIo::new().input(data).input(signature).verify(verify);
        self.run_service(ApiId::SignatureVerify, job, Service::SignatureVerify, mode, io)
    }

    pub fn random_generate(&self, job: JobId, result: &OutputBuffer) -> JobResult {
        self.check(ApiId::RandomGenerate, result.capacity() > 0, DevError::EmptyBuffer)?;
        let io = JobIo::new().output(result);
        self.run_service(ApiId::RandomGenerate, job, Service::RandomGenerate, OperationMode::SINGLE_CALL, io)
    }

    pub fn random_seed(&self, job: JobId, key: KeyId, seed: &[u8]) -> JobResult {
        self.check(ApiId::RandomSeed, !seed.is_empty(), DevError::EmptyBuffer)?;
        let io = JobIo::new().key(key).input(seed);
        self.run_service(ApiId::RandomSeed, job, Service::RandomSeed, OperationMode::SINGLE_CALL, io)
    }

    pub fn key_generate(&self, job: JobId, key: KeyId) -> JobResult {
        let io = JobIo::new().key(key);
        self.run_service(ApiId::KeyGenerate, job, Service::KeyGenerate, OperationMode::SINGLE_CALL, io)
    }

    pub fn key_derive(&self, job: JobId, key: KeyId, target: KeyId) -> JobResult {
        let io = JobIo::new().key(key).target_key(target);
        self.run_service(ApiId::KeyDerive, job, Service::KeyDerive, OperationMode::SINGLE_CALL, io)
    }

    pub fn key_exchange_calc_pub_val(&self, job: JobId, key: KeyId, public_value: &OutputBuffer) -> JobResult {
        self.check(ApiId::KeyExchangeCalcPubVal, public_value.capacity() > 0, DevError::EmptyBuffer)?;
        let io = JobIo::new().key(key).output(public_value);
        self.run_service(
            ApiId::KeyExchangeCalcPubVal,
            job,
            Service::KeyExchangeCalcPubVal,
            OperationMode::SINGLE_CALL,
            io,
        )
    }

    pub fn key_exchange_calc_secret(&self, job: JobId, key: KeyId, partner_public: &[u8]) -> JobResult {
        self.check(ApiId::KeyExchangeCalcSecret, !partner_public.is_empty(), DevError::EmptyBuffer)?;
        let io = JobIo::new().key(key).input(partner_public);
        self.run_service(
            ApiId::KeyExchangeCalcSecret,
            job,
            Service::KeyExchangeCalcSecret,
            OperationMode::SINGLE_CALL,
            io,
        )
    }

    /// Marks a key valid through a job, so the channel holding the key sees
    /// the change in order with the other jobs on it.
    pub fn key_set_valid_job(&self, job: JobId, key: KeyId) -> JobResult {
        let io = JobIo::new().key(key);
        self.run_service(ApiId::KeySetValidJob, job, Service::KeySetValid, OperationMode::SINGLE_CALL, io)
    }
}
