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

//! The narrow contract between the bridge and the guest module.
//!
//! Everything the bridge does to the guest goes through [`Guest`]: one
//! generic entry-point call plus raw access to the guest's linear memory.
//! The production implementation drives a wasmtime instance
//! ([`wasm::WasmGuest`]); tests use an in-process fake.

#[cfg(test)]
pub(crate) mod fake;
pub mod wasm;

use crate::error::Result;
use crate::state::HostState;
use std::fmt;

// =============================================================================
// Entry Points
// =============================================================================

/// Every export the bridge calls on the guest module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Alloc,
    Dealloc,
    CreateRuntime,
    CloseRuntime,
    SetMemoryLimit,
    InitLogger,
    PollJobs,
    CreateContext,
    CloseContext,
    EvalScript,
    EvalScriptAsync,
    SetGlobal,
    GetGlobal,
    Invoke,
    ArrayCreate,
    ArrayClose,
    ArraySize,
    ArrayGet,
    ArraySet,
    ArrayAdd,
    ArrayRemove,
    ObjectCreate,
    ObjectClose,
    ObjectSize,
    ObjectContainsKey,
    ObjectGetValue,
    ObjectSetValue,
    ObjectRemoveValue,
    ObjectKeySet,
    FunctionCall,
    FunctionClose,
    PromiseCreate,
    PromiseResolve,
    PromiseReject,
    PromiseClose,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 35] = [
        EntryPoint::Alloc,
        EntryPoint::Dealloc,
        EntryPoint::CreateRuntime,
        EntryPoint::CloseRuntime,
        EntryPoint::SetMemoryLimit,
        EntryPoint::InitLogger,
        EntryPoint::PollJobs,
        EntryPoint::CreateContext,
        EntryPoint::CloseContext,
        EntryPoint::EvalScript,
        EntryPoint::EvalScriptAsync,
        EntryPoint::SetGlobal,
        EntryPoint::GetGlobal,
        EntryPoint::Invoke,
        EntryPoint::ArrayCreate,
        EntryPoint::ArrayClose,
        EntryPoint::ArraySize,
        EntryPoint::ArrayGet,
        EntryPoint::ArraySet,
        EntryPoint::ArrayAdd,
        EntryPoint::ArrayRemove,
        EntryPoint::ObjectCreate,
        EntryPoint::ObjectClose,
        EntryPoint::ObjectSize,
        EntryPoint::ObjectContainsKey,
        EntryPoint::ObjectGetValue,
        EntryPoint::ObjectSetValue,
        EntryPoint::ObjectRemoveValue,
        EntryPoint::ObjectKeySet,
        EntryPoint::FunctionCall,
        EntryPoint::FunctionClose,
        EntryPoint::PromiseCreate,
        EntryPoint::PromiseResolve,
        EntryPoint::PromiseReject,
        EntryPoint::PromiseClose,
    ];

    /// Export name in the guest module.
    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::Alloc => "alloc",
            EntryPoint::Dealloc => "dealloc",
            EntryPoint::CreateRuntime => "create_runtime_wasm",
            EntryPoint::CloseRuntime => "close_runtime_wasm",
            EntryPoint::SetMemoryLimit => "set_memory_limit_wasm",
            EntryPoint::InitLogger => "init_logger_wasm",
            EntryPoint::PollJobs => "poll_jobs_wasm",
            EntryPoint::CreateContext => "create_context_wasm",
            EntryPoint::CloseContext => "close_context_wasm",
            EntryPoint::EvalScript => "eval_script_wasm",
            EntryPoint::EvalScriptAsync => "eval_script_async_wasm",
            EntryPoint::SetGlobal => "set_global_wasm",
            EntryPoint::GetGlobal => "get_global_wasm",
            EntryPoint::Invoke => "invoke_wasm",
            EntryPoint::ArrayCreate => "array_create_wasm",
            EntryPoint::ArrayClose => "array_close_wasm",
            EntryPoint::ArraySize => "array_size_wasm",
            EntryPoint::ArrayGet => "array_get_wasm",
            EntryPoint::ArraySet => "array_set_wasm",
            EntryPoint::ArrayAdd => "array_add_wasm",
            EntryPoint::ArrayRemove => "array_remove_wasm",
            EntryPoint::ObjectCreate => "object_create_wasm",
            EntryPoint::ObjectClose => "object_close_wasm",
            EntryPoint::ObjectSize => "object_size_wasm",
            EntryPoint::ObjectContainsKey => "object_contains_key_wasm",
            EntryPoint::ObjectGetValue => "object_get_value_wasm",
            EntryPoint::ObjectSetValue => "object_set_value_wasm",
            EntryPoint::ObjectRemoveValue => "object_remove_value_wasm",
            EntryPoint::ObjectKeySet => "object_key_set_wasm",
            EntryPoint::FunctionCall => "call_function_wasm",
            EntryPoint::FunctionClose => "close_function_wasm",
            EntryPoint::PromiseCreate => "promise_create_wasm",
            EntryPoint::PromiseResolve => "promise_resolve_wasm",
            EntryPoint::PromiseReject => "promise_reject_wasm",
            EntryPoint::PromiseClose => "promise_close_wasm",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Guest
// =============================================================================

/// A live guest instance as seen from the host.
///
/// Implementations must tolerate re-entrant use: while a [`Guest::call`] is in
/// flight the guest may call a host import, and the host may in turn call back
/// into the same instance through the `&mut dyn Guest` it was handed.
pub trait Guest {
    /// Invoke one export. Every argument travels as a 64-bit word and is
    /// narrowed to the export's declared parameter type.
    fn call(&mut self, entry: EntryPoint, args: &[u64]) -> Result<u64>;

    /// Copy `len` bytes out of guest linear memory.
    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>>;

    /// Copy bytes into guest linear memory.
    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()>;

    /// Bridge state attached to this instance.
    fn state(&mut self) -> &mut HostState;

    /// Drain whatever the guest wrote to stdout, if the guest captures it.
    fn take_output(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn alloc(&mut self, len: u32) -> Result<u32> {
        let ptr = self.call(EntryPoint::Alloc, &[len as u64])?;
        Ok(ptr as u32)
    }

    fn dealloc(&mut self, ptr: u32, len: u32) -> Result<()> {
        self.call(EntryPoint::Dealloc, &[ptr as u64, len as u64])?;
        Ok(())
    }
}
