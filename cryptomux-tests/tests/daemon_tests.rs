// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use cryptomux::JobId;
use cryptomux_tests::run_cryptomuxd::CryptomuxdBuilder;

#[cfg(feature = "requires-cargo")]
#[test]
fn test_daemon_hashes_demo_request() {
    let request = format!(r#"{{ "service": "hash", "job": 0, "data": "{}" }}"#, BASE64_STANDARD.encode("abc"));
    let (out, log) = CryptomuxdBuilder::new()
        .request(&request)
        .rounds(20)
        .period_ms(5)
        .latency_ms(1)
        .run_and_parse()
        .unwrap_or_else(|e| panic!("failed to run cryptomuxd: {e}"));

    println!("stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(out.status.success());

    // the demo digest job reports through a polled slot
    assert!(log.completions.iter().any(|c| c.job == JobId(0) && c.result.is_ok()));
    assert_eq!(log.submissions.len(), 1);
    let digest = BASE64_STANDARD
        .decode(&log.submissions[0].outputs[0])
        .expect("output is not base64");
    assert_eq!(digest, blake3::hash(b"abc").as_bytes());
}

#[cfg(feature = "requires-cargo")]
#[test]
fn test_daemon_rejects_conflicting_config_flags() {
    let out = std::process::Command::new("cargo")
        .args(["run", "-q", "-p", "cryptomux", "--bin", "cryptomuxd", "--"])
        .args(["--config", "a.json", "--config-base64", "e30="])
        .output()
        .unwrap_or_else(|e| panic!("failed to run cryptomuxd: {e}"));
    assert_eq!(out.status.code(), Some(2));
}

#[cfg(feature = "requires-cargo")]
#[test]
fn test_daemon_cancels_idle_job() {
    let (out, log) = CryptomuxdBuilder::new()
        .config_json(
            r#"{
            "queues": [ { "name": "q", "channel": 0, "capacity": 2 } ],
            "jobs": [ { "name": "h", "queue": 0, "priority": 1, "processing": "async", "service": "hash" } ]
        }"#,
        )
        .request(r#"{ "service": "cancel", "job": 0 }"#)
        .rounds(1)
        .run_and_parse()
        .unwrap_or_else(|e| panic!("failed to run cryptomuxd: {e}"));
    assert!(out.status.success());
    assert_eq!(log.submissions.len(), 1);
    assert_eq!(log.submissions[0].canceled, Some(cryptomux::engine::CancelStatus::Idle));
}
