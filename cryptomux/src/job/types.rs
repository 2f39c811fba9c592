// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

/// Stable handle of a configured job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl JobId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Index of a job object inside the object arena of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Key handle understood by the key store and the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u32);

/// Identifier of an underlying execution channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

/// Operation mode flags of a single call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationMode(u8);

impl OperationMode {
    pub const START: Self = Self(0x01);
    pub const UPDATE: Self = Self(0x02);
    pub const FINISH: Self = Self(0x04);
    pub const SINGLE_CALL: Self = Self(0x07);
    pub const SAVE_CONTEXT: Self = Self(0x08);
    pub const RESTORE_CONTEXT: Self = Self(0x10);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x1f)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for OperationMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::fmt::Debug for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Self::START, "START"),
            (Self::UPDATE, "UPDATE"),
            (Self::FINISH, "FINISH"),
            (Self::SAVE_CONTEXT, "SAVE_CONTEXT"),
            (Self::RESTORE_CONTEXT, "RESTORE_CONTEXT"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("OperationMode()")
        } else {
            write!(f, "OperationMode({})", set.join("|"))
        }
    }
}

/// The cryptographic service a job is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
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
    KeySetValid,
}

/// Algorithm family handed through to the channel. The engine never looks
/// inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    Unspecified,
    Sha2_256,
    Sha3_256,
    Blake3,
    HmacSha256,
    CmacAes128,
    Aes128Cbc,
    Aes128Gcm,
    ChaCha20Poly1305,
    Ed25519,
    EcdsaP256,
    CtrDrbg,
    Hkdf,
    X25519,
}

/// Primitive descriptor of a job: service plus algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Primitive {
    pub service: Service,
    #[serde(default)]
    pub algorithm: Algorithm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_call_covers_start_update_finish() {
        let m = OperationMode::SINGLE_CALL;
        assert!(m.contains(OperationMode::START));
        assert!(m.contains(OperationMode::UPDATE));
        assert!(m.contains(OperationMode::FINISH));
        assert!(!m.contains(OperationMode::SAVE_CONTEXT));
    }

    #[test]
    fn mode_debug_lists_flags() {
        let m = OperationMode::START | OperationMode::UPDATE;
        assert_eq!(format!("{:?}", m), "OperationMode(START|UPDATE)");
        assert_eq!(format!("{:?}", OperationMode::default()), "OperationMode()");
    }
}
