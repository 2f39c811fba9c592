// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Job engine
//!
//! Multiplexes jobs onto channels that run one job at a time.
//!
//! ```text
//!         caller ──► submit ──► channel free? ──yes──► ChannelDriver::process
//!                                   │no                       │
//!                                   ▼                         ▼ (later, any thread)
//!                             priority queue ◄── retrigger ◄── Notifier::notify ──► delivery
//! ```
//!
//! All mutable state of all partitions sits behind one mutex (THE LOCK).
//! THE LOCK is never held while the driver, a callout or a delivery
//! callback runs: `Engine::call_out` takes the guard, drops it, runs the
//! call-out and hands back a fresh guard. Everything read before a call-out
//! is read again afterwards.
//!
//! Re-entrant dispatch is kept off a queue by its `ChannelBusyGuard`
//! counter, which stays up across the call-out. While it is non-zero new
//! jobs go to the queue and retriggering the queue is left to the guard
//! holder (`QueueState::retrigger_pending`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{DeliveryConfig, EngineConfig, Layout, Processing};
use crate::diagnostics::{ApiId, DiagnosticSink, LogSink};
use crate::driver::{ChannelDriver, DriverJob, JobRef};
use crate::error::{ConfigError, DevError, JobError, JobResult};
use crate::job::{CalloutState, JobId, JobObject, JobState, ObjectHandle};
use crate::services::keys::KeyStore;

pub mod callout;
pub mod cancel;
mod dispatch;
mod guard;
mod notify;
pub mod partition;
mod pool;
mod queue;
mod retrigger;

pub use callout::{Callout, CalloutVerdict};
pub use cancel::CancelStatus;
pub use partition::{ExecutionContext, FixedContext, ThreadContext};

pub(crate) use guard::ChannelBusyGuard;


pub type CompletionCallback = Arc<dyn Fn(JobId, JobResult) + Send + Sync>;

/// The single consumer a job reports to.
#[derive(Clone, Default)]
pub enum Delivery {
    #[default]
    None,
    Direct(CompletionCallback),
    Polled(usize),
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::None => f.write_str("None"),
            Delivery::Direct(_) => f.write_str("Direct(..)"),
            Delivery::Polled(slot) => write!(f, "Polled({})", slot),
        }
    }
}

/// A finished job as seen by a polled consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub job: JobId,
    pub partition: usize,
    pub result: JobResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub(crate) job: JobId,
    pub(crate) priority: u8,
    /// The job was Active when it was queued; it is never displaced.
    pub(crate) continuing: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueueState {
    pub(crate) fill: usize,
    pub(crate) retrigger_pending: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JobSlot {
    pub(crate) state: JobState,
    pub(crate) object: Option<ObjectHandle>,
    pub(crate) binding: u32,
}

/// Mutable state of one partition.
#[derive(Debug)]
pub(crate) struct PartitionState {
    pub(crate) initialized: bool,
    pub(crate) jobs: Vec<JobSlot>,
    pub(crate) objects: Vec<JobObject>,
    pub(crate) queue: Vec<Option<QueueEntry>>,
    pub(crate) queues: Vec<QueueState>,
    pub(crate) callouts: HashMap<JobId, CalloutState>,
    pub(crate) polled: Vec<Option<Completion>>,
}

impl PartitionState {
    fn new(config: &EngineConfig, layout: &Layout) -> Self {
        Self {
            initialized: false,
            jobs: vec![JobSlot::default(); config.jobs.len()],
            objects: (0..layout.object_count).map(|_| JobObject::empty()).collect(),
            queue: vec![None; layout.queue_array_len],
            queues: vec![QueueState::default(); config.queues.len()],
            callouts: HashMap::new(),
            polled: vec![None; config.polled_slots],
        }
    }

    pub(crate) fn slot(&self, job: JobId) -> &JobSlot {
        &self.jobs[job.index()]
    }

    pub(crate) fn slot_mut(&mut self, job: JobId) -> &mut JobSlot {
        &mut self.jobs[job.index()]
    }

    pub(crate) fn state(&self, job: JobId) -> JobState {
        self.jobs[job.index()].state
    }

    pub(crate) fn set_state(&mut self, job: JobId, state: JobState) {
        debug!("{}: {:?} -> {:?}", job, self.jobs[job.index()].state, state);
        self.jobs[job.index()].state = state;
    }

    pub(crate) fn object_mut(&mut self, job: JobId) -> Option<&mut JobObject> {
        let handle = self.jobs[job.index()].object?;
        Some(&mut self.objects[handle.index()])
    }
}

pub(crate) type Locked<'a> = MutexGuard<'a, Vec<PartitionState>>;

/// Hands completions back to the engine. Safe to call from any thread and
/// from inside `ChannelDriver::process`.
#[derive(Debug, Clone)]
pub struct Notifier(Weak<Engine>);

impl Notifier {
    pub fn notify(&self, job: &JobRef, result: JobResult) {
        if let Some(engine) = self.0.upgrade() {
            engine.notify(job, result);
        } else {
            debug!("{}: engine gone, dropping completion {:?}", job.job, result);
        }
    }
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) layout: Layout,
    state: Mutex<Vec<PartitionState>>,
    /// Re-entrancy counter per partition per queue.
    busy: Vec<Vec<AtomicU32>>,
    pub(crate) driver: Arc<dyn ChannelDriver>,
    pub(crate) callouts: Vec<Arc<dyn Callout>>,
    pub(crate) deliveries: Vec<Delivery>,
    pub(crate) keys: Option<Arc<dyn KeyStore>>,
    pub(crate) diagnostics: Arc<dyn DiagnosticSink>,
    resolver: partition::PartitionResolver,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("partitions", &self.config.partitions.len())
            .field("queues", &self.config.queues.len())
            .field("jobs", &self.config.jobs.len())
            .finish()
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    callouts: Vec<Arc<dyn Callout>>,
    callbacks: HashMap<JobId, CompletionCallback>,
    keys: Option<Arc<dyn KeyStore>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    context: Arc<dyn ExecutionContext>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            callouts: Vec::new(),
            callbacks: HashMap::new(),
            keys: None,
            diagnostics: Arc::new(LogSink),
            context: Arc::new(ThreadContext),
        }
    }

    /// Registers a callout. Jobs refer to callouts by registration order.
    pub fn callout(mut self, callout: Arc<dyn Callout>) -> Self {
        self.callouts.push(callout);
        self
    }

    /// Binds the delivery callback of a job configured with `Callback` delivery.
    pub fn callback<F>(mut self, job: JobId, f: F) -> Self
    where
        F: Fn(JobId, JobResult) + Send + Sync + 'static,
    {
        self.callbacks.insert(job, Arc::new(f));
        self
    }

    pub fn key_store(mut self, keys: Arc<dyn KeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn execution_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    /// Builds the engine. `driver` receives the notifier the channel reports
    /// completions through.
    pub fn build<F>(mut self, driver: F) -> Result<Arc<Engine>, ConfigError>
    where
        F: FnOnce(Notifier) -> Arc<dyn ChannelDriver>,
    {
        let layout = self.config.validate(self.callouts.len())?;

        let mut deliveries = Vec::with_capacity(self.config.jobs.len());
        for (i, job) in self.config.jobs.iter().enumerate() {
            let delivery = match job.delivery {
                DeliveryConfig::None => Delivery::None,
                DeliveryConfig::Polled { slot } => Delivery::Polled(slot),
                DeliveryConfig::Callback => match self.callbacks.remove(&JobId(i as u32)) {
                    Some(f) => Delivery::Direct(f),
                    None => return Err(ConfigError::MissingCallback(job.name.clone())),
                },
            };
            deliveries.push(delivery);
        }

        let partitions = (0..self.config.partitions.len())
            .map(|_| PartitionState::new(&self.config, &layout))
            .collect();
        let busy = (0..self.config.partitions.len())
            .map(|_| (0..self.config.queues.len()).map(|_| AtomicU32::new(0)).collect())
            .collect();
        let resolver = partition::PartitionResolver::new(&self.config.partitions, self.context);

        info!(
            "engine built: {} partition(s), {} queue(s), {} job(s), {} object(s)",
            self.config.partitions.len(),
            self.config.queues.len(),
            self.config.jobs.len(),
            layout.object_count
        );

        Ok(Arc::new_cyclic(|weak| Engine {
            driver: driver(Notifier(weak.clone())),
            config: self.config,
            layout,
            state: Mutex::new(partitions),
            busy,
            callouts: self.callouts,
            deliveries,
            keys: self.keys,
            diagnostics: self.diagnostics,
            resolver,
        }))
    }
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initializes (or resets) the partition of the calling context.
    pub fn init(&self) -> JobResult {
        let p = self.partition(ApiId::Init)?;
        let mut st = self.lock();
        st[p] = PartitionState::new(&self.config, &self.layout);
        st[p].initialized = true;
        info!("partition {} initialized", p);
        Ok(())
    }

    pub(crate) fn lock(&self) -> Locked<'_> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with THE LOCK released and returns its result with the lock
    /// taken again.
    pub(crate) fn call_out<'a, R>(&'a self, guard: Locked<'a>, f: impl FnOnce() -> R) -> (R, Locked<'a>) {
        drop(guard);
        let r = f();
        (r, self.lock())
    }

    pub(crate) fn busy_guard(&self, partition: usize, queue: usize) -> ChannelBusyGuard<'_> {
        ChannelBusyGuard::acquire(&self.busy[partition][queue])
    }

    pub(crate) fn is_locked(&self, partition: usize, queue: usize) -> bool {
        self.busy[partition][queue].load(Ordering::Acquire) > 0
    }

    pub(crate) fn retrigger_in_callback(&self, queue: usize) -> bool {
        self.config.features.retrigger_in_callback && self.config.queues[queue].retrigger_in_callback
    }

    pub(crate) fn queue_of(&self, job: JobId) -> usize {
        self.config.jobs[job.index()].queue
    }

    /// Partition of the caller; reports and maps a miss to `NotOk`.
    pub(crate) fn partition(&self, api: ApiId) -> Result<usize, JobError> {
        self.resolver.resolve().map_err(|e| self.dev_error(api, e))
    }

    pub(crate) fn dev_error(&self, api: ApiId, err: DevError) -> JobError {
        self.diagnostics.report_development_error(api, err);
        JobError::NotOk
    }

    /// `QueueFull` is folded into `Busy` unless configured otherwise.
    pub(crate) fn public_error(&self, err: JobError) -> JobError {
        if err == JobError::QueueFull && !self.config.features.queue_full_distinct {
            JobError::Busy
        } else {
            err
        }
    }

    pub(crate) fn public_result(&self, result: JobResult) -> JobResult {
        result.map_err(|e| self.public_error(e))
    }

    /// Copy of the bound object for the channel.
    pub(crate) fn driver_job(&self, part: &PartitionState, partition: usize, job: JobId) -> Option<DriverJob> {
        let slot = part.slot(job);
        let handle = slot.object?;
        let object = &part.objects[handle.index()];
        Some(DriverJob {
            job_ref: JobRef {
                job,
                partition,
                object: handle,
                binding: slot.binding,
            },
            priority: object.priority,
            processing: self.config.jobs[job.index()].processing,
            primitive: object.primitive,
            mode: object.mode,
            io: object.io.clone(),
        })
    }

    pub(crate) fn is_async(&self, job: JobId) -> bool {
        self.config.jobs[job.index()].processing == Processing::Async
    }

    /// Periodic entry point: settles jobs whose pre-callout refused them,
    /// retriggers every queue of every initialized partition and drains the
    /// polled delivery slots.
    pub fn main_function(&self) -> Vec<Completion> {
        let mut deliveries = Vec::new();
        {
            let mut st = self.lock();
            for p in 0..st.len() {
                if !st[p].initialized {
                    continue;
                }
                let aborted: Vec<JobId> = st[p]
                    .callouts
                    .iter()
                    .filter(|(_, gate)| **gate == CalloutState::ProcessingAbortedByCallout)
                    .map(|(job, _)| *job)
                    .collect();
                for job in aborted {
                    debug!("{}: settling job refused by its pre-callout", job);
                    if let Some(d) = self.conclude(&mut st, p, job, Err(JobError::NotOk)) {
                        deliveries.push(d);
                    }
                }
            }
        }
        for d in deliveries {
            self.deliver(d);
        }

        for p in 0..self.config.partitions.len() {
            for q in 0..self.config.queues.len() {
                if let Some(owner) = self.config.queues[q].partition {
                    if owner != p {
                        continue;
                    }
                }
                let st = self.lock();
                if !st[p].initialized {
                    break;
                }
                self.retrigger(st, p, q);
            }
        }

        let mut st = self.lock();
        st.iter_mut()
            .flat_map(|part| part.polled.iter_mut())
            .filter_map(Option::take)
            .collect()
    }

    /// Takes the completion left in a polled slot of the caller's partition.
    pub fn take_polled(&self, slot: usize) -> Option<Completion> {
        let p = self.partition(ApiId::MainFunction).ok()?;
        let mut st = self.lock();
        st[p].polled.get_mut(slot)?.take()
    }

    /// Current state of a job in the caller's partition.
    pub fn job_state(&self, job: JobId) -> Option<JobState> {
        let p = self.resolver.resolve().ok()?;
        let st = self.lock();
        st[p].jobs.get(job.index()).map(|s| s.state)
    }

    /// Object bound to a job in the caller's partition.
    pub fn bound_object(&self, job: JobId) -> Option<ObjectHandle> {
        let p = self.resolver.resolve().ok()?;
        let st = self.lock();
        st[p].jobs.get(job.index()).and_then(|s| s.object)
    }

    /// The reference a channel would report for the current binding of a
    /// job in the caller's partition.
    pub fn job_ref(&self, job: JobId) -> Option<JobRef> {
        let p = self.resolver.resolve().ok()?;
        let st = self.lock();
        let slot = st[p].jobs.get(job.index())?;
        Some(JobRef {
            job,
            partition: p,
            object: slot.object?,
            binding: slot.binding,
        })
    }

    /// Jobs waiting in a queue of the caller's partition, head first.
    pub fn queued_jobs(&self, queue: usize) -> Vec<JobId> {
        let Ok(p) = self.resolver.resolve() else {
            return Vec::new();
        };
        let Some(layout) = self.layout.queues.get(queue) else {
            return Vec::new();
        };
        let st = self.lock();
        st[p].queued(layout, queue).map(|e| e.job).collect()
    }

    pub fn callout_state(&self, job: JobId) -> Option<CalloutState> {
        let p = self.resolver.resolve().ok()?;
        let st = self.lock();
        Some(st[p].gate(job))
    }
}
