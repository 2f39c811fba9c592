// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{JobError, JobResult};
use crate::job::types::KeyId;

pub const MAX_INPUTS: usize = 3;
pub const MAX_OUTPUTS: usize = 2;

/// A key element used in place of a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyElement {
    pub key: KeyId,
    pub element: u32,
}

/// Input data of a job. Caller buffers are copied when the job is populated,
/// the object never borrows caller memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Data(Arc<[u8]>),
    Key(KeyElement),
}

impl Input {
    pub fn data(bytes: &[u8]) -> Self {
        Input::Data(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Input::Data(d) => Some(d),
            Input::Key(_) => None,
        }
    }
}

/// Output buffer shared between the caller and the channel that fills it.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replaces the content. Fails with `SmallBuffer` if `data` does not fit.
    pub fn write(&self, data: &[u8]) -> JobResult {
        if data.len() > self.capacity {
            return Err(JobError::SmallBuffer);
        }
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buf.clear();
        buf.extend_from_slice(data);
        Ok(())
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of a job: a caller buffer or a redirected key element.
#[derive(Debug, Clone)]
pub enum Output {
    Buffer(OutputBuffer),
    Key(KeyElement),
}

impl Output {
    pub fn buffer(&self) -> Option<&OutputBuffer> {
        match self {
            Output::Buffer(b) => Some(b),
            Output::Key(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verification {
    Ok,
    NotOk,
}

/// Receives the verification result of verify services.
#[derive(Debug, Clone, Default)]
pub struct VerifySlot(Arc<Mutex<Option<Verification>>>);

impl VerifySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, v: Verification) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(v);
    }

    pub fn get(&self) -> Option<Verification> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Input and output descriptors of a job object.
#[derive(Debug, Clone, Default)]
pub struct JobIo {
    pub inputs: SmallVec<[Input; MAX_INPUTS]>,
    pub outputs: SmallVec<[Output; MAX_OUTPUTS]>,
    pub verify: Option<VerifySlot>,
    pub key: Option<KeyId>,
    pub target_key: Option<KeyId>,
}

impl JobIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, data: &[u8]) -> Self {
        self.inputs.push(Input::data(data));
        self
    }

    pub fn output(mut self, out: &OutputBuffer) -> Self {
        self.outputs.push(Output::Buffer(out.clone()));
        self
    }

    pub fn verify(mut self, slot: &VerifySlot) -> Self {
        self.verify = Some(slot.clone());
        self
    }

    pub fn key(mut self, key: KeyId) -> Self {
        self.key = Some(key);
        self
    }

    pub fn target_key(mut self, key: KeyId) -> Self {
        self.target_key = Some(key);
        self
    }
}

/// Alternative key sources and sinks for the inputs and outputs of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Redirection {
    #[serde(default)]
    pub inputs: [Option<KeyElement>; MAX_INPUTS],
    #[serde(default)]
    pub outputs: [Option<KeyElement>; MAX_OUTPUTS],
}

impl Redirection {
    /// Points the redirected positions of `io` at their key elements.
    /// Applying twice yields the same descriptors.
    pub fn apply(&self, io: &mut JobIo) {
        for (pos, redirect) in self.inputs.iter().enumerate() {
            if let Some(element) = redirect {
                if pos < io.inputs.len() {
                    io.inputs[pos] = Input::Key(*element);
                } else if pos == io.inputs.len() {
                    io.inputs.push(Input::Key(*element));
                }
            }
        }
        for (pos, redirect) in self.outputs.iter().enumerate() {
            if let Some(element) = redirect {
                if pos < io.outputs.len() {
                    io.outputs[pos] = Output::Key(*element);
                } else if pos == io.outputs.len() {
                    io.outputs.push(Output::Key(*element));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_buffer_rejects_oversized_writes() {
        let out = OutputBuffer::with_capacity(4);
        assert_eq!(out.write(&[1, 2, 3, 4, 5]), Err(JobError::SmallBuffer));
        assert!(out.is_empty());
        out.write(&[9, 8]).unwrap();
        assert_eq!(out.contents(), vec![9, 8]);
    }

    #[test]
    fn redirection_is_idempotent() {
        let element = KeyElement {
            key: KeyId(7),
            element: 1,
        };
        let redirection = Redirection {
            inputs: [None, Some(element), None],
            outputs: [Some(element), None],
        };
        let out = OutputBuffer::with_capacity(8);
        let mut io = JobIo::new().input(b"a").input(b"b").output(&out);

        redirection.apply(&mut io);
        redirection.apply(&mut io);

        assert_eq!(io.inputs.len(), 2);
        assert_eq!(io.inputs[0], Input::data(b"a"));
        assert_eq!(io.inputs[1], Input::Key(element));
        assert!(matches!(io.outputs[0], Output::Key(e) if e == element));
    }
}
