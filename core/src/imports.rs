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

//! Handlers for the imports the guest calls while one of its exports is
//! running. Each handler receives the calling guest, so anything it does
//! (decoding handles, running host callbacks, calling back into the guest)
//! happens inside the call that is already in flight.
//!
//! Nothing here traps: failures are reported to the guest through the
//! return value or, for host callables, as an `exception` wire value.

use crate::codec::{self, Wire};
use crate::context::Scope;
use crate::error::{BridgeError, Result, ScriptError};
use crate::guest::Guest;
use crate::logging;
use crate::memory;
use crate::state::ContextId;
use crate::value::Value;

/// Module name the guest imports these functions from.
pub const IMPORT_MODULE: &str = "env";

// =============================================================================
// Host Callables
// =============================================================================

/// `invoke_host_callable(ctx, index, args_ptr, args_len) -> packed`
///
/// The argument buffer stays owned by the guest. The result buffer is
/// allocated in guest memory and handed over to the guest.
pub fn invoke_host_callable(
    guest: &mut dyn Guest,
    context: u64,
    index: u32,
    args_ptr: u32,
    args_len: u32,
) -> u64 {
    let bytes = match guest.state().find_context(context) {
        Some(id) => match dispatch(guest, id, index, args_ptr, args_len) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("host callable {} in context {} failed: {}", index, id, e);
                exception_bytes(error_message(&e))
            }
        },
        None => {
            log::error!("host callable {} invoked on unknown context {:#x}", index, context);
            exception_bytes("unknown context".to_string())
        }
    };
    match memory::write(guest, &bytes) {
        Ok(region) => region.pack(),
        Err(e) => {
            log::error!("could not hand host callable result to guest: {}", e);
            0
        }
    }
}

fn dispatch(
    guest: &mut dyn Guest,
    id: ContextId,
    index: u32,
    args_ptr: u32,
    args_len: u32,
) -> Result<Vec<u8>> {
    let function = guest.state().context(id)?.function(index as usize)?;
    let raw = guest.read(args_ptr, args_len)?;
    let mut scope = Scope::new(guest, id);
    let args = match scope.decode(&raw)? {
        Value::List(args) => args,
        single => vec![single],
    };
    log::trace!("dispatch host callable {}:{} ({} args)", id, index, args.len());
    let result = function.call(&mut scope, args)?;
    scope.encode(&result)
}

fn error_message(e: &BridgeError) -> String {
    match e {
        BridgeError::Script(script) => script.message.clone(),
        other => other.to_string(),
    }
}

fn exception_bytes(message: String) -> Vec<u8> {
    codec::to_bytes(&Wire::Exception(message, String::new())).unwrap_or_default()
}

// =============================================================================
// Logging & Governance
// =============================================================================

/// `log(level, ptr, len)`
pub fn log(guest: &mut dyn Guest, level: i32, ptr: u32, len: u32) {
    match guest.read(ptr, len) {
        Ok(bytes) => logging::forward_guest_record(level, &String::from_utf8_lossy(&bytes)),
        Err(e) => log::warn!("unreadable guest log record: {}", e),
    }
}

/// `interrupt_poll() -> i32`, 1 asks the guest to abort.
pub fn interrupt_poll(guest: &mut dyn Guest) -> i32 {
    if guest.state().governor.should_interrupt() {
        log::debug!("interrupting guest execution");
        1
    } else {
        0
    }
}

// =============================================================================
// Promise Pairing
// =============================================================================

/// `create_paired_future(ctx, promise) -> index`, negative on failure.
///
/// Called when the guest hands out a promise the host has not seen. The
/// promise handle becomes a resource of the context.
pub fn create_paired_future(guest: &mut dyn Guest, context: u64, promise: u64) -> i32 {
    let Some(id) = guest.state().find_context(context) else {
        log::error!("paired future requested for unknown context {:#x}", context);
        return -1;
    };
    if promise == 0 {
        return -1;
    }
    let owner = guest.state().owner(id);
    let ctx = match guest.state().context_mut(id) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("paired future for context {}: {}", id, e);
            return -1;
        }
    };
    let future = ctx.reserve_future(owner);
    ctx.attach_promise(future.index(), promise);
    log::debug!("guest promise {:#x} paired with future {}:{}", promise, id, future.index());
    i32::try_from(future.index()).unwrap_or(-1)
}

/// `settle_paired_future(ctx, index, rejected, ptr, len) -> i32`
///
/// 1 when the future was settled now, 0 when it was already settled,
/// negative on failure.
pub fn settle_paired_future(
    guest: &mut dyn Guest,
    context: u64,
    index: u32,
    rejected: i32,
    ptr: u32,
    len: u32,
) -> i32 {
    match settle(guest, context, index, rejected != 0, ptr, len) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            log::error!("guest settlement of future {} failed: {}", index, e);
            -1
        }
    }
}

fn settle(
    guest: &mut dyn Guest,
    context: u64,
    index: u32,
    rejected: bool,
    ptr: u32,
    len: u32,
) -> Result<bool> {
    let id = guest
        .state()
        .find_context(context)
        .ok_or(BridgeError::Closed("context"))?;
    let future = guest.state().context(id)?.future(index as usize)?.future.clone();
    let raw = guest.read(ptr, len)?;
    let value = codec::decode(guest.state(), id, &raw)?;
    let outcome = if rejected {
        Err(match value {
            Value::Exception(e) => e,
            Value::String(s) => ScriptError::new(s, ""),
            other => ScriptError::new(format!("promise rejected with {}", other.type_name()), ""),
        })
    } else {
        Ok(value)
    };
    Ok(future.settle_from_guest(outcome))
}
