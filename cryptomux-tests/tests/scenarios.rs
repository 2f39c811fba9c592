// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use cryptomux::engine::CancelStatus;
use cryptomux::{JobError, JobId, JobState, OperationMode, OutputBuffer};
use cryptomux_tests::harness::{single_queue, Accelerated, Manual};

const SINGLE: OperationMode = OperationMode::SINGLE_CALL;

fn hash(engine: &cryptomux::Engine, job: u32) -> Result<(), JobError> {
    engine.hash(JobId(job), SINGLE, b"scenario", &OutputBuffer::with_capacity(32))
}

#[test]
fn test_queue_drains_by_priority_after_busy_channel() {
    let m = Manual::start(single_queue(4, &[(5, "async", "hash"), (10, "async", "hash"), (1, "async", "hash")]));
    m.channel.block();

    for job in 0..3 {
        assert_eq!(hash(&m.engine, job), Ok(()));
    }
    assert_eq!(m.engine.queued_jobs(0), vec![JobId(2), JobId(0), JobId(1)]);

    m.channel.unblock();
    m.engine.main_function();
    assert_eq!(m.channel.accepted(), vec![JobId(1)]);

    // every completion hands the channel the next job
    for _ in 0..3 {
        assert!(m.complete(Ok(())).is_some());
    }

    assert_eq!(m.channel.accepted(), vec![JobId(1), JobId(0), JobId(2)]);
    assert_eq!(m.recorder.order(), vec![JobId(1), JobId(0), JobId(2)]);
    assert!((0..3).all(|j| m.engine.job_state(JobId(j)) == Some(JobState::Idle)));
    assert!(m.engine.queued_jobs(0).is_empty());
}

#[test]
fn test_cancel_of_waiting_job_reaches_consumer_once() {
    let m = Manual::start(single_queue(4, &[(3, "async", "hash")]));

    assert_eq!(hash(&m.engine, 0), Ok(()));
    assert_eq!(m.engine.job_state(JobId(0)), Some(JobState::Waiting));

    assert_eq!(m.engine.cancel(JobId(0), SINGLE), Ok(CancelStatus::Pending));
    assert!(m.recorder.completions().is_empty());

    // the channel reports back after all
    m.complete(Ok(()));
    assert_eq!(m.recorder.completions(), vec![(JobId(0), Err(JobError::Canceled))]);
    assert_eq!(m.engine.job_state(JobId(0)), Some(JobState::Idle));

    m.engine.main_function();
    assert_eq!(m.recorder.completions().len(), 1);
}

#[test]
fn test_sync_job_passes_while_async_job_waits() {
    let m = Manual::start(single_queue(4, &[(3, "async", "hash"), (8, "sync", "hash")]));

    assert_eq!(hash(&m.engine, 0), Ok(()));
    assert_eq!(hash(&m.engine, 1), Ok(()));
    assert_eq!(m.engine.job_state(JobId(1)), Some(JobState::Idle));
    assert_eq!(m.channel.accepted(), vec![JobId(0), JobId(1)]);
}

#[test]
fn test_accelerator_serves_higher_priority_first() {
    let json = r#"{
        "queues": [ { "name": "hsm", "channel": 0, "capacity": 4, "retrigger_in_callback": true } ],
        "jobs": [
            { "name": "first", "queue": 0, "priority": 2, "processing": "async", "service": "hash",
              "delivery": { "kind": "callback" } },
            { "name": "low", "queue": 0, "priority": 1, "processing": "async", "service": "hash",
              "delivery": { "kind": "callback" } },
            { "name": "high", "queue": 0, "priority": 9, "processing": "async", "service": "hash",
              "delivery": { "kind": "callback" } }
        ]
    }"#;
    let a = Accelerated::from_json(json, Duration::from_millis(100));
    let outputs: Vec<OutputBuffer> = (0..3).map(|_| OutputBuffer::with_capacity(32)).collect();

    for (job, out) in outputs.iter().enumerate() {
        assert_eq!(a.engine.hash(JobId(job as u32), SINGLE, b"abc", out), Ok(()));
    }
    assert_eq!(a.engine.queued_jobs(0), vec![JobId(1), JobId(2)]);

    assert!(a.recorder.wait_for(&a.engine, 3, Duration::from_secs(5)));
    assert_eq!(a.recorder.order(), vec![JobId(0), JobId(2), JobId(1)]);
    for out in &outputs {
        assert_eq!(out.contents(), blake3::hash(b"abc").as_bytes());
    }
}

#[test]
fn test_accelerator_cancel_in_flight() {
    let a = Accelerated::start(single_queue(4, &[(3, "async", "hash")]), Duration::from_millis(100));
    let out = OutputBuffer::with_capacity(32);

    assert_eq!(a.engine.hash(JobId(0), SINGLE, b"abc", &out), Ok(()));
    assert_eq!(a.engine.cancel(JobId(0), SINGLE), Ok(CancelStatus::Pending));

    assert!(a.recorder.wait_for(&a.engine, 1, Duration::from_secs(5)));
    assert_eq!(a.recorder.completions(), vec![(JobId(0), Err(JobError::Canceled))]);
    assert_eq!(a.engine.job_state(JobId(0)), Some(JobState::Idle));
    assert!(out.is_empty());
}

#[test]
fn test_accelerator_polled_delivery() {
    let json = r#"{
        "queues": [ { "name": "hsm", "channel": 0, "capacity": 4, "pool_size": 1 } ],
        "jobs": [
            { "name": "digest", "queue": 0, "priority": 5, "processing": "async", "service": "hash",
              "shared_object": true, "delivery": { "kind": "polled", "slot": 0 } }
        ],
        "polled_slots": 1
    }"#;
    let a = Accelerated::from_json(json, Duration::from_millis(5));
    let out = OutputBuffer::with_capacity(32);

    assert_eq!(a.engine.hash(JobId(0), SINGLE, b"polled", &out), Ok(()));

    let mut completions = Vec::new();
    assert!(cryptomux_tests::harness::wait_until(Duration::from_secs(5), || {
        completions.extend(a.engine.main_function());
        !completions.is_empty()
    }));
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].job, JobId(0));
    assert_eq!(completions[0].result, Ok(()));
    assert_eq!(out.contents(), blake3::hash(b"polled").as_bytes());

    // drained once
    assert!(a.engine.main_function().is_empty());
}
