// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::Path;

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::job::{ChannelId, Primitive, Redirection};

pub mod layout;

pub use layout::{Layout, QueueLayout};

/// Static configuration of an engine: which code paths exist, the
/// partitions, the queues in front of the channels and the job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub features: Features,
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionConfig>,
    pub queues: Vec<QueueConfig>,
    pub jobs: Vec<JobConfig>,
    /// Number of polled delivery slots per partition.
    #[serde(default)]
    pub polled_slots: usize,
}

/// Code paths that can be switched off. A job that needs a disabled path is
/// rejected when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub async_jobs: bool,
    pub sync_jobs: bool,
    pub callouts: bool,
    pub shared_objects: bool,
    pub retrigger_in_callback: bool,
    /// Report `QueueFull` as its own error instead of folding it into `Busy`.
    pub queue_full_distinct: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            async_jobs: true,
            sync_jobs: true,
            callouts: true,
            shared_objects: true,
            retrigger_in_callback: true,
            queue_full_distinct: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Execution context id that selects this partition.
    pub context: u32,
}

fn default_partitions() -> Vec<PartitionConfig> {
    vec![PartitionConfig { context: 0 }]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub channel: ChannelId,
    /// Slots of the queue array. One slot is held back for continuing jobs.
    pub capacity: usize,
    /// Shared job objects for asynchronous jobs of this queue.
    #[serde(default)]
    pub pool_size: usize,
    /// Partition owning the queue; `None` means every partition has its own.
    #[serde(default)]
    pub partition: Option<usize>,
    #[serde(default)]
    pub retrigger_in_callback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Processing {
    Sync,
    Async,
}

/// How a finished job reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeliveryConfig {
    #[default]
    None,
    /// A function bound with `EngineBuilder::callback`.
    Callback,
    /// Indexed slot drained by `Engine::main_function`.
    Polled { slot: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub queue: usize,
    pub priority: u8,
    pub processing: Processing,
    #[serde(flatten)]
    pub primitive: Primitive,
    #[serde(default)]
    pub shared_object: bool,
    #[serde(default)]
    pub callout: Option<usize>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub redirection: Option<Redirection>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_base64(b64: &str) -> Result<Self, ConfigError> {
        let decoded = BASE64_STANDARD.decode(b64.trim())?;
        let json = String::from_utf8(decoded)?;
        Self::from_json(&json)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks the registry against the enabled features and computes the
    /// arena layout.
    pub fn validate(&self, registered_callouts: usize) -> Result<Layout, ConfigError> {
        if self.partitions.is_empty() {
            return Err(ConfigError::NoPartitions);
        }
        for (i, p) in self.partitions.iter().enumerate() {
            if self.partitions[..i].iter().any(|q| q.context == p.context) {
                return Err(ConfigError::DuplicateContext(p.context));
            }
        }
        for q in &self.queues {
            if q.capacity < 2 {
                return Err(ConfigError::QueueTooSmall(q.name.clone()));
            }
            if let Some(partition) = q.partition {
                if partition >= self.partitions.len() {
                    return Err(ConfigError::UnknownPartition {
                        queue: q.name.clone(),
                        partition,
                    });
                }
            }
        }
        for job in &self.jobs {
            if job.queue >= self.queues.len() {
                return Err(ConfigError::UnknownQueue {
                    job: job.name.clone(),
                    queue: job.queue,
                });
            }
            match job.processing {
                Processing::Async if !self.features.async_jobs => {
                    return Err(ConfigError::AsyncDisabled(job.name.clone()))
                }
                Processing::Sync if !self.features.sync_jobs => {
                    return Err(ConfigError::SyncDisabled(job.name.clone()))
                }
                _ => {}
            }
            if job.shared_object && !self.features.shared_objects {
                return Err(ConfigError::SharedObjectsDisabled(job.name.clone()));
            }
            let queue = &self.queues[job.queue];
            if job.shared_object && job.processing == Processing::Async && queue.pool_size == 0 {
                return Err(ConfigError::EmptyPool {
                    job: job.name.clone(),
                    queue: queue.name.clone(),
                });
            }
            if let Some(callout) = job.callout {
                if !self.features.callouts {
                    return Err(ConfigError::CalloutsDisabled(job.name.clone()));
                }
                if callout >= registered_callouts {
                    return Err(ConfigError::UnknownCallout {
                        job: job.name.clone(),
                        callout,
                    });
                }
            }
            if let DeliveryConfig::Polled { slot } = job.delivery {
                if slot >= self.polled_slots {
                    return Err(ConfigError::PolledSlotOutOfRange {
                        job: job.name.clone(),
                        slot,
                    });
                }
            }
        }
        Ok(Layout::compute(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Algorithm, Service};

    const SAMPLE: &str = r#"{
        "queues": [
            { "name": "hsm", "channel": 0, "capacity": 4, "pool_size": 2, "retrigger_in_callback": true }
        ],
        "jobs": [
            { "name": "digest", "queue": 0, "priority": 5, "processing": "async",
              "service": "hash", "algorithm": "sha2-256", "shared_object": true,
              "delivery": { "kind": "polled", "slot": 0 } },
            { "name": "mac", "queue": 0, "priority": 1, "processing": "sync",
              "service": "mac-generate" }
        ],
        "polled_slots": 1
    }"#;

    #[test]
    fn parses_and_defaults() {
        let config = EngineConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.partitions, vec![PartitionConfig { context: 0 }]);
        assert_eq!(config.features, Features::default());
        assert_eq!(config.jobs[0].primitive.algorithm, Algorithm::Sha2_256);
        assert_eq!(config.jobs[1].primitive.service, Service::MacGenerate);
        assert_eq!(config.jobs[1].delivery, DeliveryConfig::None);
        assert_eq!(config.jobs[0].delivery, DeliveryConfig::Polled { slot: 0 });
    }

    #[test]
    fn base64_round_trips_to_same_config() {
        let b64 = BASE64_STANDARD.encode(SAMPLE);
        let config = EngineConfig::from_base64(&b64).unwrap();
        assert_eq!(config.jobs.len(), 2);
    }

    #[test]
    fn rejects_disabled_features() {
        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.features.shared_objects = false;
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::SharedObjectsDisabled(name)) if name == "digest"
        ));

        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.features.sync_jobs = false;
        assert!(matches!(config.validate(0), Err(ConfigError::SyncDisabled(_))));
    }

    #[test]
    fn rejects_bad_references() {
        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.jobs[1].queue = 3;
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::UnknownQueue { queue: 3, .. })
        ));

        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.jobs[1].callout = Some(0);
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::UnknownCallout { callout: 0, .. })
        ));

        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.queues[0].capacity = 1;
        assert!(matches!(config.validate(0), Err(ConfigError::QueueTooSmall(_))));

        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.polled_slots = 0;
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::PolledSlotOutOfRange { slot: 0, .. })
        ));

        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.partitions = vec![PartitionConfig { context: 3 }, PartitionConfig { context: 3 }];
        assert!(matches!(config.validate(0), Err(ConfigError::DuplicateContext(3))));
    }

    #[test]
    fn rejects_shared_async_job_without_pool() {
        let mut config = EngineConfig::from_json(SAMPLE).unwrap();
        config.queues[0].pool_size = 0;
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::EmptyPool { job, queue }) if job == "digest" && queue == "hsm"
        ));

        // dedicated objects need no pool
        config.jobs[0].shared_object = false;
        assert!(config.validate(0).is_ok());
    }
}
