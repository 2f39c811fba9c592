// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

use crate::job::{JobId, KeyId, OperationMode};

fn single_call() -> OperationMode {
    OperationMode::SINGLE_CALL
}

fn digest_len() -> usize {
    32
}

/// A service call in JSON form. Binary fields are base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service")]
pub enum ServiceRequest {
    #[serde(rename = "hash")]
    Hash {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "mac-generate")]
    MacGenerate {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "mac-verify")]
    MacVerify {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        mac: String,
    },

    #[serde(rename = "encrypt")]
    Encrypt {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "decrypt")]
    Decrypt {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "aead-encrypt")]
    AeadEncrypt {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default)]
        associated: String,
        #[serde(default = "digest_len")]
        output_len: usize,
        #[serde(default = "digest_len")]
        tag_len: usize,
    },

    #[serde(rename = "aead-decrypt")]
    AeadDecrypt {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default)]
        associated: String,
        tag: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "signature-generate")]
    SignatureGenerate {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "signature-verify")]
    SignatureVerify {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
        data: String,
        signature: String,
    },

    #[serde(rename = "random-generate")]
    RandomGenerate {
        job: JobId,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "random-seed")]
    RandomSeed { job: JobId, key: KeyId, seed: String },

    #[serde(rename = "key-generate")]
    KeyGenerate { job: JobId, key: KeyId },

    #[serde(rename = "key-derive")]
    KeyDerive { job: JobId, key: KeyId, target: KeyId },

    #[serde(rename = "key-exchange-calc-pub-val")]
    KeyExchangeCalcPubVal {
        job: JobId,
        key: KeyId,
        #[serde(default = "digest_len")]
        output_len: usize,
    },

    #[serde(rename = "key-exchange-calc-secret")]
    KeyExchangeCalcSecret { job: JobId, key: KeyId, partner: String },

    #[serde(rename = "key-set-valid-job")]
    KeySetValidJob { job: JobId, key: KeyId },

    #[serde(rename = "key-element-set")]
    KeyElementSet { key: KeyId, element: u32, data: String },

    #[serde(rename = "key-set-valid")]
    KeySetValid { key: KeyId },

    #[serde(rename = "cancel")]
    Cancel {
        job: JobId,
        #[serde(default = "single_call")]
        mode: OperationMode,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_and_lengths_default() {
        let req: ServiceRequest =
            serde_json::from_str(r#"{ "service": "hash", "job": 2, "data": "YWJj" }"#).unwrap();
        assert_eq!(
            req,
            ServiceRequest::Hash {
                job: JobId(2),
                mode: OperationMode::SINGLE_CALL,
                data: "YWJj".into(),
                output_len: 32,
            }
        );
    }

    #[test]
    fn explicit_mode_bits() {
        let req: ServiceRequest =
            serde_json::from_str(r#"{ "service": "cancel", "job": 1, "mode": 3 }"#).unwrap();
        assert_eq!(
            req,
            ServiceRequest::Cancel {
                job: JobId(1),
                mode: OperationMode::START | OperationMode::UPDATE,
            }
        );
    }
}
