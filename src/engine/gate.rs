//! Admission gate for dispatched work.
//!
//! The draining flag and the active-work counter live under one lock, so
//! registering new work and starting a drain can never interleave: once
//! `begin_drain` returns, no further registration succeeds, and every
//! registration that did succeed is counted by `wait_for_drain`.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct GateState {
    draining: bool,
    active: usize,
}

#[derive(Debug, Default)]
pub(crate) struct WorkGate {
    state: Mutex<GateState>,
    idle: Notify,
}

/// One unit of registered work. Dropping it deregisters.
#[derive(Debug)]
pub(crate) struct WorkGuard {
    gate: Arc<WorkGate>,
}

impl WorkGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a unit of work unless a drain has begun.
    pub(crate) fn try_register_work(self: &Arc<Self>) -> Option<WorkGuard> {
        let mut state = self.state.lock();
        if state.draining {
            return None;
        }
        state.active += 1;
        Some(WorkGuard {
            gate: Arc::clone(self),
        })
    }

    /// Refuse all further registrations. Returns `false` if already draining.
    pub(crate) fn begin_drain(&self) -> bool {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.draining, true)
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    pub(crate) fn active(&self) -> usize {
        self.state.lock().active
    }

    /// Wait until no registered work remains.
    pub(crate) async fn wait_for_drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before reading the counter so a release
            // between the check and the await is not missed.
            notified.as_mut().enable();
            if self.state.lock().active == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release(&self) {
        let now_idle = {
            let mut state = self.state.lock();
            state.active -= 1;
            state.active == 0
        };
        if now_idle {
            self.idle.notify_waiters();
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}
