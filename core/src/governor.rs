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

use crate::error::Result;
use crate::guest::{EntryPoint, Guest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// INTERRUPT HANDLE
// ============================================================================

/// Requests an interrupt from outside the executing thread (a signal
/// handler, a watchdog). Observed by the guest at its next interrupt poll.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// GOVERNOR
// ============================================================================

/// Wall-clock ceiling on guest execution.
///
/// The clock starts when the outermost guest call begins. Calls made while
/// another is in flight (host callback re-entering the guest) share it.
#[derive(Debug, Default)]
pub struct Governor {
    limit: Option<Duration>,
    depth: usize,
    started: Option<Instant>,
    interrupt: InterruptHandle,
}

impl Governor {
    /// A ceiling of zero or less leaves execution unbounded.
    pub fn new(timeout_ms: i64) -> Self {
        let mut governor = Self::default();
        governor.set_timeout_ms(timeout_ms);
        governor
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: i64) {
        self.limit = if timeout_ms > 0 {
            Some(Duration::from_millis(timeout_ms as u64))
        } else {
            None
        };
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn enter(&mut self) {
        if self.depth == 0 {
            self.started = Some(Instant::now());
        }
        self.depth += 1;
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.started = None;
            self.interrupt.clear();
        }
    }

    pub fn in_flight(&self) -> bool {
        self.depth > 0
    }

    /// Answer to the guest's interrupt poll.
    pub fn should_interrupt(&self) -> bool {
        if self.interrupt.is_requested() {
            return true;
        }
        match (self.limit, self.started) {
            (Some(limit), Some(started)) => started.elapsed() > limit,
            _ => false,
        }
    }
}

/// Call a guest export under the governor's clock.
pub(crate) fn governed_call(guest: &mut dyn Guest, entry: EntryPoint, args: &[u64]) -> Result<u64> {
    guest.state().governor.enter();
    log::trace!("-> {}{:x?}", entry, args);
    let result = guest.call(entry, args);
    guest.state().governor.exit();
    result
}
