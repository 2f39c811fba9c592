// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Simulated accelerator. Every channel runs one job at a time on a shared
//! worker thread; results are stand-ins derived with blake3, not real
//! cryptography.
//!
//! ```text
//!         process() ──► dispatcher loop ──► per-channel loop ──► Notifier
//!                        (one LocalPool on the worker thread)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use log::{debug, info, warn};

use crate::config::Processing;
use crate::driver::{CancelResponse, ChannelDriver, DriverJob, JobRef};
use crate::engine::Notifier;
use crate::error::{JobError, JobResult};
use crate::job::{ChannelId, Input, JobId, JobIo, OperationMode, Output, Service, Verification};
use crate::services::keys::{KeyStore, KEY_MATERIAL, SHARED_SECRET};

const DIGEST_LEN: usize = 32;

#[derive(Debug, Default)]
struct ChannelSlot {
    in_flight: Option<JobRef>,
    canceled: bool,
}

/// Context of a streaming job between START and FINISH.
struct Stream {
    hasher: blake3::Hasher,
    key: [u8; 32],
    offset: u64,
}

struct Shared {
    channels: Mutex<HashMap<u32, ChannelSlot>>,
    streams: Mutex<HashMap<(usize, JobId), Stream>>,
    rng: Mutex<([u8; 32], u64)>,
    keys: Option<Arc<dyn KeyStore>>,
    notifier: Notifier,
    latency: Duration,
}

pub struct Accelerator {
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    worker: ThreadId,
    tx: Sender<(u32, DriverJob)>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accelerator")
            .field("worker", &self.worker)
            .field("latency", &self.shared.latency)
            .finish()
    }
}

impl Accelerator {
    /// Starts the worker thread. Asynchronous jobs complete `latency` after
    /// they were accepted.
    pub fn new(notifier: Notifier, keys: Option<Arc<dyn KeyStore>>, latency: Duration) -> Self {
        let (tx, rx) = async_channel::unbounded();
        let shared = Arc::new(Shared {
            channels: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            rng: Mutex::new(([0x5a; 32], 0)),
            keys,
            notifier,
            latency,
        });

        let shared_in_thread = shared.clone();
        // run all channels in a dedicated thread
        let thread_handle = thread::spawn(move || {
            let mut pool = LocalPool::new();
            let spawner = pool.spawner();
            if let Err(e) = spawner.spawn_local(dispatcher_loop(spawner.clone(), rx, shared_in_thread)) {
                warn!("Accelerator could not start: {e}");
                return;
            }
            pool.run(); // blocks until all channel loops ended
        });

        Self {
            worker: thread_handle.thread().id(),
            thread_handle: Mutex::new(Some(thread_handle)),
            tx,
            shared,
        }
    }

    /// Stops accepting jobs and waits for the accepted ones to complete.
    pub fn shutdown(&self) {
        self.tx.close();
        if thread::current().id() == self.worker {
            // dropped from a completion; the thread ends on its own
            return;
        }
        let handle = self
            .thread_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Accelerator worker panicked");
            }
        }
    }
}

impl Drop for Accelerator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChannelDriver for Accelerator {
    fn process(&self, channel: ChannelId, job: &DriverJob) -> JobResult {
        {
            let mut channels = self.shared.lock_channels();
            let slot = channels.entry(channel.0).or_default();
            if let Some(running) = slot.in_flight {
                debug!("channel {}: busy with {}", channel.0, running.job);
                return Err(JobError::Busy);
            }
            slot.in_flight = Some(job.job_ref);
            slot.canceled = false;
        }

        if job.processing == Processing::Sync {
            let result = self.shared.compute(job);
            self.shared.finish(channel.0);
            return result;
        }

        if self.tx.send_blocking((channel.0, job.clone())).is_err() {
            self.shared.finish(channel.0);
            warn!("channel {}: accelerator stopped, refusing {}", channel.0, job.job_ref.job);
            return Err(JobError::NotOk);
        }
        Ok(())
    }

    fn cancel(&self, channel: ChannelId, job: &DriverJob) -> CancelResponse {
        let mut channels = self.shared.lock_channels();
        let slot = channels.entry(channel.0).or_default();
        if slot.in_flight == Some(job.job_ref) {
            slot.canceled = true;
            return CancelResponse::Pending;
        }
        drop(channels);
        self.shared.drop_stream(job.job_ref);
        CancelResponse::Ok
    }
}

/// Routes accepted jobs to the loop of their channel.
async fn dispatcher_loop(spawner: LocalSpawner, rx: Receiver<(u32, DriverJob)>, shared: Arc<Shared>) {
    let mut channels: HashMap<u32, Sender<DriverJob>> = HashMap::new();
    while let Ok((channel, job)) = rx.recv().await {
        let tx = match channels.get(&channel).cloned() {
            Some(tx) => tx,
            None => {
                let (tx, rx) = async_channel::unbounded();
                if let Err(e) = spawner.spawn_local(channel_loop(channel, rx, shared.clone())) {
                    warn!("Failed to start loop for channel {}: {e}", channel);
                    continue;
                }
                info!("Spawned new loop for channel {}", channel);
                channels.insert(channel, tx.clone());
                tx
            }
        };
        if let Err(e) = tx.send(job).await {
            warn!("Failed to hand over job: {e}");
        }
    }
    info!("Accelerator dispatcher shutting down gracefully");
}

async fn channel_loop(channel: u32, rx: Receiver<DriverJob>, shared: Arc<Shared>) {
    while let Ok(job) = rx.recv().await {
        if !shared.latency.is_zero() {
            Timer::after(shared.latency).await;
        }
        let result = if shared.is_canceled(channel) {
            shared.drop_stream(job.job_ref);
            Err(JobError::Canceled)
        } else {
            shared.compute(&job)
        };
        shared.finish(channel);
        debug!("channel {}: {} done with {:?}", channel, job.job_ref.job, result);
        shared.notifier.notify(&job.job_ref, result);
    }
    info!("Loop for channel {} ended", channel);
}

impl Shared {
    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<u32, ChannelSlot>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_canceled(&self, channel: u32) -> bool {
        self.lock_channels().get(&channel).is_some_and(|s| s.canceled)
    }

    fn finish(&self, channel: u32) {
        if let Some(slot) = self.lock_channels().get_mut(&channel) {
            *slot = ChannelSlot::default();
        }
    }

    fn drop_stream(&self, job: JobRef) {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(job.partition, job.job));
    }

    fn key_store(&self) -> Result<&dyn KeyStore, JobError> {
        self.keys.as_deref().ok_or(JobError::KeyNotValid)
    }

    /// Key material of the job's key, or a fixed key for unkeyed jobs.
    fn key_material(&self, io: &JobIo) -> Result<[u8; 32], JobError> {
        match io.key {
            Some(key) => Ok(*blake3::hash(&self.key_store()?.element(key, KEY_MATERIAL)?).as_bytes()),
            None => Ok([0; 32]),
        }
    }

    fn input(&self, io: &JobIo, pos: usize) -> Result<Vec<u8>, JobError> {
        match io.inputs.get(pos) {
            Some(Input::Data(data)) => Ok(data.to_vec()),
            Some(Input::Key(e)) => self.key_store()?.element(e.key, e.element),
            None => Ok(Vec::new()),
        }
    }

    /// Writes a digest, cut to the size of the caller's buffer.
    fn output_digest(&self, io: &JobIo, pos: usize, digest: &[u8]) -> JobResult {
        let len = match io.outputs.get(pos) {
            Some(Output::Buffer(buffer)) => digest.len().min(buffer.capacity()),
            _ => digest.len(),
        };
        self.output(io, pos, &digest[..len])
    }

    fn output(&self, io: &JobIo, pos: usize, data: &[u8]) -> JobResult {
        match io.outputs.get(pos) {
            Some(Output::Buffer(buffer)) => buffer.write(data),
            Some(Output::Key(e)) => {
                let keys = self.key_store()?;
                keys.element_set(e.key, e.element, data)
                    .map_err(|_| JobError::KeyWriteFail)?;
                keys.set_valid(e.key)
            }
            None => Err(JobError::InvalidParameter),
        }
    }

    fn verify(&self, io: &JobIo, ok: bool) {
        if let Some(slot) = &io.verify {
            slot.set(if ok { Verification::Ok } else { Verification::NotOk });
        }
    }

    fn compute(&self, job: &DriverJob) -> JobResult {
        let io = &job.io;
        match job.primitive.service {
            Service::Hash
            | Service::MacGenerate
            | Service::MacVerify
            | Service::Encrypt
            | Service::Decrypt
            | Service::AeadEncrypt
            | Service::AeadDecrypt
            | Service::SignatureGenerate
            | Service::SignatureVerify => self.stream(job),
            Service::RandomGenerate => {
                let len = io.outputs.first().and_then(Output::buffer).map_or(DIGEST_LEN, |b| b.capacity());
                let bytes = self.random(len);
                self.output(io, 0, &bytes)
            }
            Service::RandomSeed => {
                let seed = self.input(io, 0)?;
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                let mut hasher = blake3::Hasher::new();
                hasher.update(&rng.0).update(&seed);
                rng.0 = *hasher.finalize().as_bytes();
                Ok(())
            }
            Service::KeyGenerate => {
                let key = io.key.ok_or(JobError::InvalidParameter)?;
                let material = self.random(DIGEST_LEN);
                self.key_store()?.element_set(key, KEY_MATERIAL, &material)
            }
            Service::KeyDerive => {
                let target = io.target_key.ok_or(JobError::InvalidParameter)?;
                let material = self.key_material(io)?;
                let derived = blake3::derive_key("cryptomux key derivation", &material);
                self.key_store()?.element_set(target, KEY_MATERIAL, &derived)
            }
            Service::KeyExchangeCalcPubVal => {
                let public = blake3::hash(&self.key_material(io)?);
                self.output_digest(io, 0, public.as_bytes())
            }
            Service::KeyExchangeCalcSecret => {
                let key = io.key.ok_or(JobError::InvalidParameter)?;
                let own = *blake3::hash(&self.key_material(io)?).as_bytes();
                let partner = self.input(io, 0)?;
                // both sides arrive at the same value
                let (first, second) = if own.as_slice() <= partner.as_slice() {
                    (own.as_slice(), partner.as_slice())
                } else {
                    (partner.as_slice(), own.as_slice())
                };
                let mut hasher = blake3::Hasher::new();
                hasher.update(first).update(second);
                self.key_store()?
                    .element_set(key, SHARED_SECRET, hasher.finalize().as_bytes())
            }
            Service::KeySetValid => {
                let key = io.key.ok_or(JobError::InvalidParameter)?;
                self.key_store()?.set_valid(key)
            }
        }
    }

    fn random(&self, len: usize) -> Vec<u8> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = vec![0u8; len];
        let mut reader = blake3::Hasher::new_keyed(&rng.0).finalize_xof();
        reader.set_position(rng.1);
        reader.fill(&mut out);
        rng.1 += len as u64;
        out
    }

    fn stream(&self, job: &DriverJob) -> JobResult {
        let key = (job.job_ref.partition, job.job_ref.job);
        let result = self.stream_step(job, key);
        if result.is_err() || job.mode.contains(OperationMode::FINISH) {
            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
        result
    }

    fn stream_step(&self, job: &DriverJob, key: (usize, JobId)) -> JobResult {
        let io = &job.io;
        let service = job.primitive.service;
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);

        if job.mode.contains(OperationMode::START) {
            let material = self.key_material(io)?;
            let hasher = match service {
                Service::Hash => blake3::Hasher::new(),
                _ => blake3::Hasher::new_keyed(&material),
            };
            streams.insert(
                key,
                Stream {
                    hasher,
                    key: material,
                    offset: 0,
                },
            );
        }
        let stream = streams.get_mut(&key).ok_or(JobError::NotOk)?;

        if job.mode.contains(OperationMode::UPDATE) {
            let data = self.input(io, 0)?;
            match service {
                Service::Encrypt | Service::Decrypt => {
                    let out = keystream_xor(stream, &data);
                    self.output(io, 0, &out)?;
                }
                Service::AeadEncrypt => {
                    stream.hasher.update(&self.input(io, 1)?);
                    let out = keystream_xor(stream, &data);
                    stream.hasher.update(&out);
                    self.output(io, 0, &out)?;
                }
                Service::AeadDecrypt => {
                    stream.hasher.update(&self.input(io, 1)?);
                    stream.hasher.update(&data);
                    let out = keystream_xor(stream, &data);
                    self.output(io, 0, &out)?;
                }
                _ => {
                    stream.hasher.update(&data);
                }
            }
        }

        if job.mode.contains(OperationMode::FINISH) {
            let digest = stream.hasher.finalize();
            let digest = digest.as_bytes();
            match service {
                Service::Hash | Service::MacGenerate | Service::SignatureGenerate => self.output_digest(io, 0, digest)?,
                Service::AeadEncrypt => self.output_digest(io, 1, digest)?,
                Service::MacVerify | Service::SignatureVerify => {
                    let expected = self.input(io, 1)?;
                    self.verify(io, matches_prefix(digest, &expected));
                }
                Service::AeadDecrypt => {
                    let expected = self.input(io, 2)?;
                    self.verify(io, matches_prefix(digest, &expected));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn keystream_xor(stream: &mut Stream, data: &[u8]) -> Vec<u8> {
    let mut keystream = vec![0u8; data.len()];
    let mut reader = blake3::Hasher::new_keyed(&stream.key).finalize_xof();
    reader.set_position(stream.offset);
    reader.fill(&mut keystream);
    stream.offset += data.len() as u64;
    data.iter().zip(keystream).map(|(d, k)| d ^ k).collect()
}

fn matches_prefix(digest: &[u8], expected: &[u8]) -> bool {
    !expected.is_empty() && expected.len() <= digest.len() && digest[..expected.len()] == *expected
}
