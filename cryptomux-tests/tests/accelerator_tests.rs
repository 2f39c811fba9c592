// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use cryptomux::job::Verification;
use cryptomux::services::keys::{KEY_MATERIAL, SHARED_SECRET};
use cryptomux::{JobError, JobId, KeyId, OperationMode, OutputBuffer, VerifySlot};
use cryptomux_tests::harness::{single_queue, Accelerated};

const SINGLE: OperationMode = OperationMode::SINGLE_CALL;

fn sync_engine(services: &[&str]) -> Accelerated {
    let jobs: Vec<(u8, &str, &str)> = services.iter().map(|s| (1, "sync", *s)).collect();
    let mut config = single_queue(4, &jobs);
    for job in &mut config.jobs {
        job.delivery = cryptomux::config::DeliveryConfig::None;
    }
    Accelerated::start(config, Duration::ZERO)
}

fn install_key(a: &Accelerated, key: KeyId, material: &[u8]) {
    assert_eq!(a.engine.key_element_set(key, KEY_MATERIAL, material), Ok(()));
    assert_eq!(a.engine.key_set_valid(key), Ok(()));
}

#[test]
fn test_hash_matches_single_call_when_streamed() {
    let a = sync_engine(&["hash"]);
    let whole = OutputBuffer::with_capacity(32);
    assert_eq!(a.engine.hash(JobId(0), SINGLE, b"hello world", &whole), Ok(()));
    assert_eq!(whole.contents(), blake3::hash(b"hello world").as_bytes());

    let streamed = OutputBuffer::with_capacity(32);
    let none = OutputBuffer::with_capacity(0);
    let start = OperationMode::START | OperationMode::UPDATE;
    let finish = OperationMode::UPDATE | OperationMode::FINISH;
    assert_eq!(a.engine.hash(JobId(0), start, b"hello", &none), Ok(()));
    assert!(a.engine.bound_object(JobId(0)).is_some());
    assert_eq!(a.engine.hash(JobId(0), OperationMode::UPDATE, b" wor", &none), Ok(()));
    assert_eq!(a.engine.hash(JobId(0), finish, b"ld", &streamed), Ok(()));
    assert_eq!(streamed.contents(), whole.contents());
    assert_eq!(a.engine.bound_object(JobId(0)), None);
}

#[test]
fn test_short_digest_buffer_gets_prefix() {
    let a = sync_engine(&["hash"]);
    let out = OutputBuffer::with_capacity(8);
    assert_eq!(a.engine.hash(JobId(0), SINGLE, b"abc", &out), Ok(()));
    assert_eq!(out.contents(), blake3::hash(b"abc").as_bytes()[..8]);
}

#[test]
fn test_encrypt_decrypt_round_trip() {
    let a = sync_engine(&["encrypt", "decrypt"]);
    let plain = b"attack at dawn";
    let cipher = OutputBuffer::with_capacity(plain.len());
    let back = OutputBuffer::with_capacity(plain.len());

    assert_eq!(a.engine.encrypt(JobId(0), SINGLE, plain, &cipher), Ok(()));
    assert_ne!(cipher.contents(), plain);
    assert_eq!(a.engine.decrypt(JobId(1), SINGLE, &cipher.contents(), &back), Ok(()));
    assert_eq!(back.contents(), plain);
}

#[test]
fn test_ciphertext_does_not_fit() {
    let a = sync_engine(&["encrypt"]);
    let cipher = OutputBuffer::with_capacity(4);
    assert_eq!(
        a.engine.encrypt(JobId(0), SINGLE, b"longer than four", &cipher),
        Err(JobError::SmallBuffer)
    );
    assert_eq!(a.engine.bound_object(JobId(0)), None);
}

#[test]
fn test_mac_verify_accepts_own_mac_only() {
    let a = sync_engine(&["mac-generate", "mac-verify"]);
    let mac = OutputBuffer::with_capacity(16);
    assert_eq!(a.engine.mac_generate(JobId(0), SINGLE, b"message", &mac), Ok(()));

    let verify = VerifySlot::new();
    assert_eq!(a.engine.mac_verify(JobId(1), SINGLE, b"message", &mac.contents(), &verify), Ok(()));
    assert_eq!(verify.get(), Some(Verification::Ok));

    let verify = VerifySlot::new();
    assert_eq!(a.engine.mac_verify(JobId(1), SINGLE, b"tampered", &mac.contents(), &verify), Ok(()));
    assert_eq!(verify.get(), Some(Verification::NotOk));
}

#[test]
fn test_aead_tag_covers_associated_data() {
    let a = sync_engine(&["aead-encrypt", "aead-decrypt"]);
    let cipher = OutputBuffer::with_capacity(5);
    let tag = OutputBuffer::with_capacity(16);
    assert_eq!(a.engine.aead_encrypt(JobId(0), SINGLE, b"hello", b"header", &cipher, &tag), Ok(()));

    let plain = OutputBuffer::with_capacity(5);
    let verify = VerifySlot::new();
    assert_eq!(
        a.engine
            .aead_decrypt(JobId(1), SINGLE, &cipher.contents(), b"header", &tag.contents(), &plain, &verify),
        Ok(())
    );
    assert_eq!(plain.contents(), b"hello");
    assert_eq!(verify.get(), Some(Verification::Ok));

    let verify = VerifySlot::new();
    assert_eq!(
        a.engine
            .aead_decrypt(JobId(1), SINGLE, &cipher.contents(), b"other", &tag.contents(), &plain, &verify),
        Ok(())
    );
    assert_eq!(verify.get(), Some(Verification::NotOk));
}

#[test]
fn test_random_output_changes() {
    let a = sync_engine(&["random-generate"]);
    let first = OutputBuffer::with_capacity(24);
    let second = OutputBuffer::with_capacity(24);
    assert_eq!(a.engine.random_generate(JobId(0), &first), Ok(()));
    assert_eq!(a.engine.random_generate(JobId(0), &second), Ok(()));
    assert_eq!(first.len(), 24);
    assert_ne!(first.contents(), second.contents());
}

#[test]
fn test_key_derive_needs_valid_key() {
    let a = sync_engine(&["key-set-valid", "key-derive"]);
    assert_eq!(a.engine.key_element_set(KeyId(3), KEY_MATERIAL, b"secret"), Ok(()));

    // set but not yet valid
    assert_eq!(a.engine.key_derive(JobId(1), KeyId(3), KeyId(4)), Err(JobError::KeyNotValid));

    assert_eq!(a.engine.key_set_valid_job(JobId(0), KeyId(3)), Ok(()));
    assert_eq!(a.engine.key_derive(JobId(1), KeyId(3), KeyId(4)), Ok(()));
    assert_eq!(a.engine.key_set_valid(KeyId(4)), Ok(()));

    let derived = OutputBuffer::with_capacity(64);
    assert_eq!(a.engine.key_element_get(KeyId(4), KEY_MATERIAL, &derived), Ok(()));
    let material = blake3::hash(b"secret");
    assert_eq!(
        derived.contents(),
        blake3::derive_key("cryptomux key derivation", material.as_bytes())
    );
}

#[test]
fn test_key_exchange_is_symmetric() {
    let a = sync_engine(&["key-exchange-calc-pub-val", "key-exchange-calc-secret"]);
    let (alice, bob) = (KeyId(1), KeyId(2));
    install_key(&a, alice, b"alice");
    install_key(&a, bob, b"bob");

    let alice_pub = OutputBuffer::with_capacity(32);
    let bob_pub = OutputBuffer::with_capacity(32);
    assert_eq!(a.engine.key_exchange_calc_pub_val(JobId(0), alice, &alice_pub), Ok(()));
    assert_eq!(a.engine.key_exchange_calc_pub_val(JobId(0), bob, &bob_pub), Ok(()));
    assert_ne!(alice_pub.contents(), bob_pub.contents());

    assert_eq!(a.engine.key_exchange_calc_secret(JobId(1), alice, &bob_pub.contents()), Ok(()));
    assert_eq!(a.engine.key_exchange_calc_secret(JobId(1), bob, &alice_pub.contents()), Ok(()));

    let alice_secret = OutputBuffer::with_capacity(32);
    let bob_secret = OutputBuffer::with_capacity(32);
    for (key, out) in [(alice, &alice_secret), (bob, &bob_secret)] {
        assert_eq!(a.engine.key_set_valid(key), Ok(()));
        assert_eq!(a.engine.key_element_get(key, SHARED_SECRET, out), Ok(()));
    }
    assert_eq!(alice_secret.len(), 32);
    assert_eq!(alice_secret.contents(), bob_secret.contents());
}

#[test]
fn test_async_jobs_deliver_through_callbacks() {
    let config = single_queue(4, &[(4, "async", "encrypt"), (2, "async", "random-generate")]);
    let a = Accelerated::start(config, Duration::from_millis(10));

    let cipher = OutputBuffer::with_capacity(3);
    let random = OutputBuffer::with_capacity(16);
    assert_eq!(a.engine.encrypt(JobId(0), SINGLE, b"abc", &cipher), Ok(()));
    assert_eq!(a.engine.random_generate(JobId(1), &random), Ok(()));

    assert!(a.recorder.wait_for(&a.engine, 2, Duration::from_secs(5)));
    assert_eq!(a.recorder.completions(), vec![(JobId(0), Ok(())), (JobId(1), Ok(()))]);
    assert_eq!(cipher.len(), 3);
    assert_eq!(random.len(), 16);
}
