/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Host futures paired one-to-one with guest promises.
//!
//! A pairing is created from either side: the host asks the guest to mint a
//! promise for a fresh future ([`crate::Scope::create_future`]), or the guest
//! hands a promise across the boundary and the `create_paired_future` import
//! allocates the future. Settlement may then come from either side too, and
//! the `settled_by_guest` flag keeps it from bouncing back.

use crate::error::{BridgeError, Result, ScriptError};
use crate::state::{ContextId, Owner};
use crate::value::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context as TaskContext, Poll, Waker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Rejected,
}

type Listener = Box<dyn FnOnce(bool) + Send>;

struct Inner {
    outcome: Option<std::result::Result<Value, ScriptError>>,
    settled_by_guest: bool,
    waker: Option<Waker>,
    listeners: Vec<Listener>,
}

struct FutureCell {
    owner: Owner,
    index: usize,
    inner: Mutex<Inner>,
}

/// The host half of a promise pairing. Cheap to clone; clones share state.
///
/// Settlement is allowed from any thread. The guest side learns about a
/// host-side settlement at the next [`crate::Scope::poll`].
#[derive(Clone)]
pub struct HostFuture {
    cell: Arc<FutureCell>,
}

impl HostFuture {
    pub(crate) fn new(owner: Owner, index: usize) -> Self {
        Self {
            cell: Arc::new(FutureCell {
                owner,
                index,
                inner: Mutex::new(Inner {
                    outcome: None,
                    settled_by_guest: false,
                    waker: None,
                    listeners: Vec::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.cell.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn context(&self) -> ContextId {
        self.cell.owner.context
    }

    pub(crate) fn owner(&self) -> Owner {
        self.cell.owner
    }

    /// Slot in the owning Context's future registry.
    pub fn index(&self) -> usize {
        self.cell.index
    }

    pub fn state(&self) -> FutureState {
        match &self.lock().outcome {
            None => FutureState::Pending,
            Some(Ok(_)) => FutureState::Fulfilled,
            Some(Err(_)) => FutureState::Rejected,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() != FutureState::Pending
    }

    pub fn settled_by_guest(&self) -> bool {
        self.lock().settled_by_guest
    }

    /// Settled outcome, or `None` while pending.
    pub fn result(&self) -> Option<Result<Value>> {
        self.lock()
            .outcome
            .clone()
            .map(|o| o.map_err(BridgeError::Script))
    }

    pub(crate) fn outcome(&self) -> Option<std::result::Result<Value, ScriptError>> {
        self.lock().outcome.clone()
    }

    /// Fulfil from the host. Returns false if already settled.
    pub fn complete(&self, value: impl Into<Value>) -> bool {
        self.settle(Ok(value.into()), false)
    }

    /// Reject from the host. Returns false if already settled.
    pub fn fail(&self, error: ScriptError) -> bool {
        self.settle(Err(error), false)
    }

    /// Settlement reported by the guest. Never forwarded back.
    pub(crate) fn settle_from_guest(&self, outcome: std::result::Result<Value, ScriptError>) -> bool {
        self.settle(outcome, true)
    }

    /// Run `listener` once on settlement, with the `settled_by_guest` flag.
    pub(crate) fn on_settle(&self, listener: impl FnOnce(bool) + Send + 'static) {
        let mut inner = self.lock();
        if inner.outcome.is_none() {
            inner.listeners.push(Box::new(listener));
            return;
        }
        let by_guest = inner.settled_by_guest;
        drop(inner);
        listener(by_guest);
    }

    fn settle(&self, outcome: std::result::Result<Value, ScriptError>, by_guest: bool) -> bool {
        let (waker, listeners) = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return false;
            }
            inner.settled_by_guest = by_guest;
            inner.outcome = Some(outcome);
            (inner.waker.take(), std::mem::take(&mut inner.listeners))
        };
        log::debug!(
            "future {}:{} settled (by guest: {})",
            self.cell.owner.context,
            self.cell.index,
            by_guest
        );
        for listener in listeners {
            listener(by_guest);
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub(crate) fn same_as(&self, other: &HostFuture) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for HostFuture {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for HostFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFuture")
            .field("context", &self.cell.owner.context)
            .field("index", &self.cell.index)
            .field("state", &self.state())
            .finish()
    }
}

impl Future for HostFuture {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut inner = self.lock();
        match &inner.outcome {
            Some(outcome) => Poll::Ready(outcome.clone().map_err(BridgeError::Script)),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
