// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::frame::{FunctionCode, Pdu, SlaveId};

/// Correlation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// No request is waiting for its response.
    Idle,
    /// The last request seen on the bus.
    Request(Pdu),
}

#[derive(Debug)]
struct Inner {
    pending: Pending,
    last_heard_master: Instant,
}

impl Inner {
    fn replace_pending(&mut self, request: Pdu) {
        if let Pending::Request(previous) = &self.pending {
            debug!("Request for function {} went unanswered", previous.function);
        }
        self.pending = Pending::Request(request);
    }
}

/// State shared by the correlator and the automaster.
///
/// All accessors take the same lock, so a pending request is always
/// seen either completely or not at all.
#[derive(Debug, Clone)]
pub struct TapState {
    target: SlaveId,
    inner: Arc<Mutex<Inner>>,
}

impl TapState {
    /// The master counts as heard right now.
    #[must_use]
    pub fn new(target: SlaveId) -> Self {
        Self {
            target,
            inner: Arc::new(Mutex::new(Inner {
                pending: Pending::Idle,
                last_heard_master: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every update leaves `Inner` consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn target_slave(&self) -> SlaveId {
        self.target
    }

    #[must_use]
    pub fn pending(&self) -> Pending {
        self.lock().pending.clone()
    }

    /// Expect a response to `request`, replacing any unanswered request.
    pub fn set_pending(&self, request: Pdu) {
        self.lock().replace_pending(request);
    }

    /// A request from the master has been observed at `now`.
    pub fn heard_request(&self, request: Pdu, now: Instant) {
        let mut inner = self.lock();
        inner.replace_pending(request);
        inner.last_heard_master = now;
    }

    /// Take the pending request if `function` answers it.
    ///
    /// Leaves the state untouched otherwise.
    pub fn take_matching(&self, function: FunctionCode) -> Option<Pdu> {
        let mut inner = self.lock();
        match &inner.pending {
            Pending::Request(req) if req.function == function => {
                match std::mem::replace(&mut inner.pending, Pending::Idle) {
                    Pending::Request(req) => Some(req),
                    Pending::Idle => None,
                }
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn last_heard_master(&self) -> Instant {
        self.lock().last_heard_master
    }

    /// Time since the master was heard last.
    #[must_use]
    pub fn master_silence(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_heard_master())
    }
}
