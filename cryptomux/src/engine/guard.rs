// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU32, Ordering};

/// Holds a queue's re-entrancy counter up while THE LOCK is released around
/// a call-out. Create it before giving up the lock and drop it after taking
/// the lock again.
#[must_use]
pub(crate) struct ChannelBusyGuard<'a> {
    counter: &'a AtomicU32,
}

impl<'a> ChannelBusyGuard<'a> {
    pub(crate) fn acquire(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for ChannelBusyGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
