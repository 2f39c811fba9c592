// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Engines wired up for tests: either on the simulated accelerator or on a
//! channel the test completes by hand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cryptomux::config::DeliveryConfig;
use cryptomux::{
    Accelerator, CancelResponse, ChannelDriver, DriverJob, Engine, EngineBuilder, EngineConfig, JobId, JobRef,
    JobResult, KeyStore, MemoryKeyStore, Notifier,
};
use cryptomux::job::ChannelId;

/// Test logging, off unless RUST_LOG asks for it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off"))
        .is_test(true)
        .try_init();
}

/// Polls `f` until it holds or `timeout` has passed.
pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Collects the results handed to callback deliveries, in order.
#[derive(Clone, Default)]
pub struct Recorder {
    completions: Arc<Mutex<Vec<(JobId, JobResult)>>>,
}

impl Recorder {
    /// Binds a recording callback for every job configured with callback
    /// delivery.
    pub fn bind(&self, mut builder: EngineBuilder, config: &EngineConfig) -> EngineBuilder {
        for (i, job) in config.jobs.iter().enumerate() {
            if job.delivery == DeliveryConfig::Callback {
                let completions = self.completions.clone();
                builder = builder.callback(JobId(i as u32), move |job, result| {
                    completions.lock().unwrap().push((job, result));
                });
            }
        }
        builder
    }

    pub fn completions(&self) -> Vec<(JobId, JobResult)> {
        self.completions.lock().unwrap().clone()
    }

    pub fn order(&self) -> Vec<JobId> {
        self.completions().into_iter().map(|(job, _)| job).collect()
    }

    /// Waits for `count` deliveries while driving the main function.
    pub fn wait_for(&self, engine: &Engine, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || {
            engine.main_function();
            self.completions.lock().unwrap().len() >= count
        })
    }
}

/// An engine on the simulated accelerator with an in-memory key store.
pub struct Accelerated {
    pub engine: Arc<Engine>,
    pub keys: Arc<MemoryKeyStore>,
    pub recorder: Recorder,
}

impl Accelerated {
    pub fn start(config: EngineConfig, latency: Duration) -> Self {
        init_logging();
        let keys = Arc::new(MemoryKeyStore::default());
        let recorder = Recorder::default();
        let store: Arc<dyn KeyStore> = keys.clone();

        let builder = recorder.bind(Engine::builder(config.clone()), &config).key_store(store.clone());
        let engine = builder
            .build(|notifier| -> Arc<dyn ChannelDriver> {
                Arc::new(Accelerator::new(notifier, Some(store), latency))
            })
            .unwrap_or_else(|e| panic!("invalid test configuration: {e}"));
        engine.init().unwrap_or_else(|e| panic!("engine init failed: {e}"));

        Self {
            engine,
            keys,
            recorder,
        }
    }

    pub fn from_json(json: &str, latency: Duration) -> Self {
        let config = EngineConfig::from_json(json).unwrap_or_else(|e| panic!("invalid test configuration: {e}"));
        Self::start(config, latency)
    }
}

/// Channel that accepts jobs (or answers `Busy` while blocked) and never
/// completes them on its own. Tests finish jobs with `complete`.
#[derive(Default)]
pub struct ManualChannel {
    blocked: AtomicBool,
    accepted: Mutex<Vec<DriverJob>>,
    refused: Mutex<Vec<JobId>>,
}

impl ManualChannel {
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }

    /// Jobs the channel took, in order.
    pub fn accepted(&self) -> Vec<JobId> {
        self.accepted.lock().unwrap().iter().map(|j| j.job_ref.job).collect()
    }

    pub fn refused(&self) -> Vec<JobId> {
        self.refused.lock().unwrap().clone()
    }

    /// The job the channel took last.
    pub fn running(&self) -> Option<JobRef> {
        self.accepted.lock().unwrap().last().map(|j| j.job_ref)
    }
}

impl ChannelDriver for ManualChannel {
    fn process(&self, _channel: ChannelId, job: &DriverJob) -> JobResult {
        if self.blocked.load(Ordering::SeqCst) {
            self.refused.lock().unwrap().push(job.job_ref.job);
            return Err(cryptomux::JobError::Busy);
        }
        self.accepted.lock().unwrap().push(job.clone());
        Ok(())
    }

    fn cancel(&self, _channel: ChannelId, _job: &DriverJob) -> CancelResponse {
        CancelResponse::Pending
    }
}

/// An engine on a `ManualChannel`.
pub struct Manual {
    pub engine: Arc<Engine>,
    pub channel: Arc<ManualChannel>,
    pub notifier: Notifier,
    pub recorder: Recorder,
}

impl Manual {
    pub fn start(config: EngineConfig) -> Self {
        init_logging();
        let channel = Arc::new(ManualChannel::default());
        let recorder = Recorder::default();
        let mut notifier = None;

        let driver: Arc<dyn ChannelDriver> = channel.clone();
        let engine = recorder
            .bind(Engine::builder(config.clone()), &config)
            .build(|n| {
                notifier = Some(n);
                driver
            })
            .unwrap_or_else(|e| panic!("invalid test configuration: {e}"));
        engine.init().unwrap_or_else(|e| panic!("engine init failed: {e}"));

        Self {
            engine,
            channel,
            notifier: notifier.unwrap_or_else(|| panic!("engine built without notifier")),
            recorder,
        }
    }

    /// Completes the job the channel took last.
    pub fn complete(&self, result: JobResult) -> Option<JobId> {
        let running = self.channel.running()?;
        self.notifier.notify(&running, result);
        Some(running.job)
    }
}

/// Builds a single-queue configuration as JSON. `jobs` are
/// `(priority, processing, service)` triples; every job reports through a
/// callback.
pub fn single_queue_json(capacity: usize, jobs: &[(u8, &str, &str)]) -> String {
    let jobs: Vec<String> = jobs
        .iter()
        .enumerate()
        .map(|(i, (priority, processing, service))| {
            format!(
                r#"{{ "name": "job{i}", "queue": 0, "priority": {priority}, "processing": "{processing}",
                     "service": "{service}", "delivery": {{ "kind": "callback" }} }}"#
            )
        })
        .collect();
    format!(
        r#"{{
            "queues": [ {{ "name": "q0", "channel": 0, "capacity": {capacity}, "retrigger_in_callback": true }} ],
            "jobs": [ {} ]
        }}"#,
        jobs.join(",\n")
    )
}

pub fn single_queue(capacity: usize, jobs: &[(u8, &str, &str)]) -> EngineConfig {
    EngineConfig::from_json(&single_queue_json(capacity, jobs))
        .unwrap_or_else(|e| panic!("invalid test configuration: {e}"))
}
