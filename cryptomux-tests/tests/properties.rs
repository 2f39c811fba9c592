// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::cmp::Reverse;

use cryptomux::{JobError, JobId, JobState, OperationMode, OutputBuffer};
use cryptomux_tests::harness::{single_queue, Manual};

const PRIORITIES: [u8; 5] = [1, 2, 2, 3, 5];

fn permutations(items: &[u32]) -> Vec<Vec<u32>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *first);
            out.push(tail);
        }
    }
    out
}

fn hash(m: &Manual, job: u32) -> Result<(), JobError> {
    m.engine
        .hash(JobId(job), OperationMode::SINGLE_CALL, b"p", &OutputBuffer::with_capacity(32))
}

fn blocked_engine(capacity: usize, priorities: &[u8]) -> Manual {
    let jobs: Vec<(u8, &str, &str)> = priorities.iter().map(|p| (*p, "async", "hash")).collect();
    let m = Manual::start(single_queue(capacity, &jobs));
    m.channel.block();
    m
}

#[test]
fn test_every_submission_order_drains_by_priority() {
    let jobs: Vec<u32> = (0..PRIORITIES.len() as u32).collect();
    for order in permutations(&jobs) {
        let m = blocked_engine(PRIORITIES.len() + 1, &PRIORITIES);
        for job in &order {
            assert_eq!(hash(&m, *job), Ok(()), "order {:?}", order);
        }

        let queued = m.engine.queued_jobs(0);
        assert_eq!(queued.len(), PRIORITIES.len());
        let priorities: Vec<u8> = queued.iter().map(|j| PRIORITIES[j.index()]).collect();
        assert!(
            priorities.windows(2).all(|w| w[0] <= w[1]),
            "order {:?} left queue {:?}",
            order,
            queued
        );

        m.channel.unblock();
        m.engine.main_function();
        for _ in 0..PRIORITIES.len() {
            m.complete(Ok(()));
        }

        // ties go to the later submission
        let mut expected: Vec<JobId> = order.iter().rev().map(|j| JobId(*j)).collect();
        expected.sort_by_key(|j| Reverse(PRIORITIES[j.index()]));
        assert_eq!(m.channel.accepted(), expected, "order {:?}", order);
        assert_eq!(m.recorder.order(), expected, "order {:?}", order);
        assert!(m.engine.queued_jobs(0).is_empty());
    }
}

#[test]
fn test_one_slot_is_held_back_for_continuing_jobs() {
    for capacity in 2..=6usize {
        let priorities: Vec<u8> = (0..capacity as u8).collect();
        let m = blocked_engine(capacity, &priorities);

        for job in 0..capacity as u32 - 1 {
            assert_eq!(hash(&m, job), Ok(()), "capacity {capacity}");
        }
        let last = capacity as u32 - 1;
        assert_eq!(hash(&m, last), Err(JobError::QueueFull), "capacity {capacity}");
        assert_eq!(m.engine.job_state(JobId(last)), Some(JobState::Idle));
        assert_eq!(m.engine.bound_object(JobId(last)), None);
        assert_eq!(m.engine.queued_jobs(0).len(), capacity - 1);
    }
}

#[test]
fn test_refused_retrigger_keeps_queue_order() {
    let m = blocked_engine(4, &[1, 5, 9]);
    for job in 0..3 {
        assert_eq!(hash(&m, job), Ok(()));
    }
    let before = m.engine.queued_jobs(0);

    for _ in 0..5 {
        m.engine.main_function();
        assert_eq!(m.engine.queued_jobs(0), before);
    }
    let refused = m.channel.refused();
    assert_eq!(refused.len(), 6);
    assert!(refused.iter().skip(1).all(|j| *j == JobId(2)));
    assert!(m.channel.accepted().is_empty());

    m.channel.unblock();
    m.engine.main_function();
    for _ in 0..3 {
        m.complete(Ok(()));
    }
    assert_eq!(m.recorder.order(), vec![JobId(2), JobId(1), JobId(0)]);
}
