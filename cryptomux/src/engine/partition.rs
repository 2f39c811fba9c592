// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::PartitionConfig;
use crate::error::DevError;

/// Source of the identifier of the calling execution context.
pub trait ExecutionContext: Send + Sync {
    fn current(&self) -> u32;
}

/// Identifies the caller by its OS thread id.
#[derive(Debug, Default)]
pub struct ThreadContext;

impl ExecutionContext for ThreadContext {
    fn current(&self) -> u32 {
        nix::unistd::gettid().as_raw() as u32
    }
}

/// Context id set explicitly, e.g. by a scheduler that knows which
/// application is running.
#[derive(Debug, Default)]
pub struct FixedContext(AtomicU32);

impl FixedContext {
    pub fn new(context: u32) -> Self {
        Self(AtomicU32::new(context))
    }

    pub fn set(&self, context: u32) {
        self.0.store(context, Ordering::Release);
    }
}

impl ExecutionContext for FixedContext {
    fn current(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

pub(crate) struct PartitionResolver {
    contexts: Vec<u32>,
    source: Arc<dyn ExecutionContext>,
}

impl PartitionResolver {
    pub(crate) fn new(partitions: &[PartitionConfig], source: Arc<dyn ExecutionContext>) -> Self {
        Self {
            contexts: partitions.iter().map(|p| p.context).collect(),
            source,
        }
    }

    pub(crate) fn resolve(&self) -> Result<usize, DevError> {
        if self.contexts.len() == 1 {
            return Ok(0);
        }
        let context = self.source.current();
        self.contexts
            .iter()
            .position(|c| *c == context)
            .ok_or(DevError::PartitionNotFound(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partition_ignores_context() {
        let source = Arc::new(FixedContext::new(99));
        let resolver = PartitionResolver::new(&[PartitionConfig { context: 1 }], source);
        assert_eq!(resolver.resolve(), Ok(0));
    }

    #[test]
    fn multi_partition_looks_up_context() {
        let source = Arc::new(FixedContext::new(20));
        let resolver = PartitionResolver::new(
            &[PartitionConfig { context: 10 }, PartitionConfig { context: 20 }],
            source.clone(),
        );
        assert_eq!(resolver.resolve(), Ok(1));
        source.set(10);
        assert_eq!(resolver.resolve(), Ok(0));
        source.set(30);
        assert_eq!(resolver.resolve(), Err(DevError::PartitionNotFound(30)));
    }
}
