// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::diagnostics::ApiId;
use crate::engine::Engine;
use crate::error::{DevError, JobError, JobResult};
use crate::job::{KeyId, OutputBuffer};

/// Element holding the key material of a key.
pub const KEY_MATERIAL: u32 = 1;
/// Element receiving the result of a key exchange.
pub const SHARED_SECRET: u32 = 2;

/// Storage of key elements, shared by the engine's key-management calls and
/// the channels that read redirected inputs.
pub trait KeyStore: Send + Sync {
    /// Writes an element. The key becomes invalid until `set_valid`.
    fn element_set(&self, key: KeyId, element: u32, data: &[u8]) -> JobResult;

    fn element_get(&self, key: KeyId, element: u32, out: &OutputBuffer) -> JobResult;

    fn element_copy(&self, key: KeyId, element: u32, target: KeyId, target_element: u32) -> JobResult;

    fn set_valid(&self, key: KeyId) -> JobResult;

    fn set_invalid(&self, key: KeyId) -> JobResult;

    /// Raw element of a valid key, for channels.
    fn element(&self, key: KeyId, element: u32) -> Result<Vec<u8>, JobError>;
}

#[derive(Debug, Default)]
struct StoredKey {
    elements: HashMap<u32, Vec<u8>>,
    valid: bool,
}

/// Keys kept in process memory. Elements are limited to `max_element` bytes.
#[derive(Debug)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<KeyId, StoredKey>>,
    max_element: usize,
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemoryKeyStore {
    pub fn new(max_element: usize) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            max_element,
        }
    }

    fn with_keys<R>(&self, f: impl FnOnce(&mut HashMap<KeyId, StoredKey>) -> R) -> R {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut keys)
    }
}

impl KeyStore for MemoryKeyStore {
    fn element_set(&self, key: KeyId, element: u32, data: &[u8]) -> JobResult {
        if data.len() > self.max_element {
            return Err(JobError::KeySizeMismatch);
        }
        self.with_keys(|keys| {
            let stored = keys.entry(key).or_default();
            stored.elements.insert(element, data.to_vec());
            stored.valid = false;
        });
        debug!("key {}: element {} set ({} bytes)", key.0, element, data.len());
        Ok(())
    }

    fn element_get(&self, key: KeyId, element: u32, out: &OutputBuffer) -> JobResult {
        let data = self.element(key, element)?;
        out.write(&data)
    }

    fn element_copy(&self, key: KeyId, element: u32, target: KeyId, target_element: u32) -> JobResult {
        let data = self.element(key, element)?;
        self.element_set(target, target_element, &data)
    }

    fn set_valid(&self, key: KeyId) -> JobResult {
        self.with_keys(|keys| match keys.get_mut(&key) {
            Some(stored) if !stored.elements.is_empty() => {
                stored.valid = true;
                Ok(())
            }
            _ => Err(JobError::KeyEmpty),
        })
    }

    fn set_invalid(&self, key: KeyId) -> JobResult {
        self.with_keys(|keys| {
            if let Some(stored) = keys.get_mut(&key) {
                stored.valid = false;
            }
        });
        Ok(())
    }

    fn element(&self, key: KeyId, element: u32) -> Result<Vec<u8>, JobError> {
        self.with_keys(|keys| {
            let stored = keys.get(&key).ok_or(JobError::KeyEmpty)?;
            if !stored.valid {
                return Err(JobError::KeyNotValid);
            }
            stored.elements.get(&element).cloned().ok_or(JobError::KeyEmpty)
        })
    }
}

impl Engine {
    fn key_store(&self) -> Result<&dyn KeyStore, JobError> {
        self.ready(ApiId::KeyManagement)?;
        match &self.keys {
            Some(keys) => Ok(keys.as_ref()),
            None => Err(self.dev_error(ApiId::KeyManagement, DevError::NoKeyStore)),
        }
    }

    pub fn key_element_set(&self, key: KeyId, element: u32, data: &[u8]) -> JobResult {
        if data.is_empty() {
            return Err(self.dev_error(ApiId::KeyManagement, DevError::EmptyBuffer));
        }
        self.key_store()?.element_set(key, element, data)
    }

    pub fn key_element_get(&self, key: KeyId, element: u32, out: &OutputBuffer) -> JobResult {
        if out.capacity() == 0 {
            return Err(self.dev_error(ApiId::KeyManagement, DevError::EmptyBuffer));
        }
        self.key_store()?.element_get(key, element, out)
    }

    pub fn key_element_copy(&self, key: KeyId, element: u32, target: KeyId, target_element: u32) -> JobResult {
        self.key_store()?.element_copy(key, element, target, target_element)
    }

    pub fn key_set_valid(&self, key: KeyId) -> JobResult {
        self.key_store()?.set_valid(key)
    }

    pub fn key_set_invalid(&self, key: KeyId) -> JobResult {
        self.key_store()?.set_invalid(key)
    }
}
