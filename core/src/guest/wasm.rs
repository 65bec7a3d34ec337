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

//! wasmtime embedding of the guest module.
//!
//! The store's data carries the bridge's [`HostState`], so import handlers
//! running inside a guest call see the same registries as the top-level API.
//! A [`WasmGuest`] is a view over either the store itself (top-level calls)
//! or the `Caller` of an import (calls made while the guest is blocked in
//! that import).

use crate::error::{BridgeError, Result};
use crate::guest::{EntryPoint, Guest};
use crate::imports::{self, IMPORT_MODULE};
use crate::logging;
use crate::state::HostState;
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use wasmtime::{
    AsContextMut, Caller, Engine, Extern, Func, Linker, Memory, Module, Store, Val, ValType,
};

const WASI_MODULE: &str = "wasi_snapshot_preview1";

// =============================================================================
// Store Data
// =============================================================================

/// Per-instance data held by the wasmtime store.
#[derive(Debug, Default)]
pub struct WasmData {
    pub(crate) state: HostState,
    exports: Option<Arc<GuestExports>>,
    /// Raw bytes written to stdout via fd_write.
    stdout_raw: Vec<u8>,
    /// Exit code passed to proc_exit, if the guest ever called it.
    exit_code: Option<i32>,
}

#[derive(Debug)]
pub(crate) struct GuestExports {
    memory: Memory,
    funcs: HashMap<EntryPoint, Func>,
}

/// Anything that can hand out the store context and its data: the store
/// itself, or the `Caller` of an import.
pub trait StoreAccess: AsContextMut<Data = WasmData> {
    fn bridge_data(&mut self) -> &mut WasmData;
}

impl StoreAccess for Store<WasmData> {
    fn bridge_data(&mut self) -> &mut WasmData {
        self.data_mut()
    }
}

impl StoreAccess for Caller<'_, WasmData> {
    fn bridge_data(&mut self) -> &mut WasmData {
        self.data_mut()
    }
}

// =============================================================================
// Guest
// =============================================================================

pub struct WasmGuest<S: StoreAccess> {
    store: S,
    exports: Arc<GuestExports>,
}

impl WasmGuest<Store<WasmData>> {
    /// Compile, link and instantiate a guest module, then verify that it
    /// provides every export the bridge calls.
    pub fn instantiate(bytes: &[u8]) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::from_binary(&engine, bytes).map_err(|e| {
            BridgeError::trap("WasmGuest::load", format!("Failed to load WASM module: {}", e))
        })?;
        check_contract(&module)?;

        let mut linker = Linker::<WasmData>::new(&engine);
        link_bridge_imports(&mut linker)?;
        link_wasi_shims(&mut linker)?;
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| BridgeError::trap("WasmGuest::link", e))?;

        let mut store = Store::new(&engine, WasmData::default());
        let instance = linker.instantiate(&mut store, &module).map_err(|e| {
            BridgeError::trap("WasmGuest::instantiate", format!("Failed to instantiate: {}", e))
        })?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::Contract {
                missing: vec!["memory".to_string()],
            })?;
        let mut funcs = HashMap::new();
        for entry in EntryPoint::ALL {
            let func = instance
                .get_func(&mut store, entry.name())
                .ok_or_else(|| BridgeError::Contract {
                    missing: vec![entry.name().to_string()],
                })?;
            funcs.insert(entry, func);
        }
        let exports = Arc::new(GuestExports { memory, funcs });
        store.data_mut().exports = Some(Arc::clone(&exports));
        log::debug!("guest module instantiated ({} bytes)", bytes.len());
        Ok(WasmGuest { store, exports })
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.store.data().exit_code
    }
}

impl<S: StoreAccess> Guest for WasmGuest<S> {
    fn call(&mut self, entry: EntryPoint, args: &[u64]) -> Result<u64> {
        let func = *self
            .exports
            .funcs
            .get(&entry)
            .ok_or_else(|| BridgeError::Contract {
                missing: vec![entry.name().to_string()],
            })?;
        let ty = func.ty(&self.store);
        if ty.params().len() != args.len() {
            return Err(BridgeError::Guest {
                entry: entry.name(),
                message: format!(
                    "export takes {} parameters, bridge passed {}",
                    ty.params().len(),
                    args.len()
                ),
            });
        }
        // Pointers and lengths are i32 in a wasm32 guest; handles are i64.
        let params: Vec<Val> = ty
            .params()
            .zip(args)
            .map(|(param, &arg)| match param {
                ValType::I32 => Val::I32(arg as u32 as i32),
                _ => Val::I64(arg as i64),
            })
            .collect();
        let mut results = vec![Val::I64(0); ty.results().len()];

        func.call(&mut self.store, &params, &mut results)
            .map_err(|e| BridgeError::trap(entry.name(), format!("Call trapped: {}", e)))?;

        Ok(match results.first() {
            Some(Val::I64(v)) => *v as u64,
            Some(Val::I32(v)) => *v as i64 as u64,
            _ => 0,
        })
    }

    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.exports
            .memory
            .read(&self.store, ptr as usize, &mut buf)
            .map_err(|e| BridgeError::trap("memory::read", e))?;
        Ok(buf)
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()> {
        self.exports
            .memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|e| BridgeError::trap("memory::write", e))
    }

    fn state(&mut self) -> &mut HostState {
        &mut self.store.bridge_data().state
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.store.bridge_data().stdout_raw)
    }
}

fn check_contract(module: &Module) -> Result<()> {
    let present: HashSet<&str> = module.exports().map(|e| e.name()).collect();
    let mut missing: Vec<String> = EntryPoint::ALL
        .iter()
        .map(|e| e.name())
        .filter(|name| !present.contains(name))
        .map(String::from)
        .collect();
    if !present.contains("memory") {
        missing.push("memory".to_string());
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::Contract { missing })
    }
}

/// Run an import handler against the guest that called it.
fn with_caller<R>(caller: Caller<'_, WasmData>, fallback: R, f: impl FnOnce(&mut dyn Guest) -> R) -> R {
    let Some(exports) = caller.data().exports.clone() else {
        log::error!("guest called an import before instantiation finished");
        return fallback;
    };
    let mut guest = WasmGuest {
        store: caller,
        exports,
    };
    f(&mut guest)
}

// =============================================================================
// Bridge Imports
// =============================================================================

fn link_bridge_imports(linker: &mut Linker<WasmData>) -> Result<()> {
    let link_err = |name: &str, e: wasmtime::Error| {
        BridgeError::trap("link_bridge_imports", format!("Failed to link {}: {}", name, e))
    };

    linker
        .func_wrap(
            IMPORT_MODULE,
            "invoke_host_callable",
            |caller: Caller<'_, WasmData>, context: i64, index: i32, args_ptr: i32, args_len: i32| -> i64 {
                with_caller(caller, 0, |guest| {
                    imports::invoke_host_callable(
                        guest,
                        context as u64,
                        index as u32,
                        args_ptr as u32,
                        args_len as u32,
                    ) as i64
                })
            },
        )
        .map_err(|e| link_err("invoke_host_callable", e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "log",
            |caller: Caller<'_, WasmData>, level: i32, ptr: i32, len: i32| {
                with_caller(caller, (), |guest| {
                    imports::log(guest, level, ptr as u32, len as u32)
                })
            },
        )
        .map_err(|e| link_err("log", e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "interrupt_poll",
            |caller: Caller<'_, WasmData>| -> i32 {
                with_caller(caller, 0, imports::interrupt_poll)
            },
        )
        .map_err(|e| link_err("interrupt_poll", e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "create_paired_future",
            |caller: Caller<'_, WasmData>, context: i64, promise: i64| -> i32 {
                with_caller(caller, -1, |guest| {
                    imports::create_paired_future(guest, context as u64, promise as u64)
                })
            },
        )
        .map_err(|e| link_err("create_paired_future", e))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            "settle_paired_future",
            |caller: Caller<'_, WasmData>,
             context: i64,
             index: i32,
             rejected: i32,
             ptr: i32,
             len: i32|
             -> i32 {
                with_caller(caller, -1, |guest| {
                    imports::settle_paired_future(
                        guest,
                        context as u64,
                        index as u32,
                        rejected,
                        ptr as u32,
                        len as u32,
                    )
                })
            },
        )
        .map_err(|e| link_err("settle_paired_future", e))?;

    Ok(())
}

// =============================================================================
// WASI Shims
// =============================================================================

fn guest_memory(caller: &mut Caller<'_, WasmData>) -> Option<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(mem)) => Some(mem),
        _ => None,
    }
}

/// Guest pointers are unsigned 32-bit offsets passed as `i32`.
fn guest_addr(ptr: i32) -> usize {
    ptr as u32 as usize
}

/// `offset..offset + len`, or `None` if the end does not fit in `usize`.
fn guest_range(offset: usize, len: usize) -> Option<Range<usize>> {
    Some(offset..offset.checked_add(len)?)
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(guest_range(offset, 4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn write_bytes(data: &mut [u8], offset: usize, bytes: &[u8]) -> bool {
    let Some(range) = guest_range(offset, bytes.len()) else {
        return false;
    };
    match data.get_mut(range) {
        Some(slot) => {
            slot.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_BADF: i32 = 8;
const ERRNO_FAULT: i32 = 21;

/// Lightweight preview1 surface: output goes to the host log, time and
/// randomness come from the host, everything else is empty.
fn link_wasi_shims(linker: &mut Linker<WasmData>) -> Result<()> {
    let link_err = |name: &str, e: wasmtime::Error| {
        BridgeError::trap("link_wasi_shims", format!("Failed to link {}: {}", name, e))
    };

    // fd_write(fd, iovs, iovs_len, nwritten) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "fd_write",
            |mut caller: Caller<'_, WasmData>, fd: i32, iovs: i32, iovs_len: i32, nwritten: i32| -> i32 {
                if fd != 1 && fd != 2 {
                    return ERRNO_BADF;
                }
                let Some(memory) = guest_memory(&mut caller) else {
                    return ERRNO_BADF;
                };
                let mut written = Vec::new();
                {
                    let data = memory.data(&caller);
                    for i in 0..iovs_len.max(0) as usize {
                        let Some(iov) = i.checked_mul(8).and_then(|o| guest_addr(iovs).checked_add(o)) else {
                            return ERRNO_FAULT;
                        };
                        let buf = read_u32(data, iov);
                        let len = iov.checked_add(4).and_then(|at| read_u32(data, at));
                        let (Some(buf), Some(len)) = (buf, len) else {
                            return ERRNO_FAULT;
                        };
                        match guest_range(buf as usize, len as usize).and_then(|r| data.get(r)) {
                            Some(bytes) => written.extend_from_slice(bytes),
                            None => return ERRNO_FAULT,
                        }
                    }
                }
                logging::forward_guest_output(fd, &written);
                if fd == 1 {
                    caller.data_mut().stdout_raw.extend_from_slice(&written);
                }
                let total = written.len() as u32;
                let data = memory.data_mut(&mut caller);
                if !write_bytes(data, guest_addr(nwritten), &total.to_le_bytes()) {
                    return ERRNO_FAULT;
                }
                ERRNO_SUCCESS
            },
        )
        .map_err(|e| link_err("fd_write", e))?;

    // clock_time_get(clock_id, precision, timestamp_ptr) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "clock_time_get",
            |mut caller: Caller<'_, WasmData>, _clock_id: i32, _precision: i64, timestamp: i32| -> i32 {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                let Some(memory) = guest_memory(&mut caller) else {
                    return ERRNO_BADF;
                };
                if write_bytes(memory.data_mut(&mut caller), guest_addr(timestamp), &now.to_le_bytes()) {
                    ERRNO_SUCCESS
                } else {
                    ERRNO_FAULT
                }
            },
        )
        .map_err(|e| link_err("clock_time_get", e))?;

    // random_get(buf, buf_len) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "random_get",
            |mut caller: Caller<'_, WasmData>, buf: i32, buf_len: i32| -> i32 {
                let Some(memory) = guest_memory(&mut caller) else {
                    return ERRNO_BADF;
                };
                let data = memory.data_mut(&mut caller);
                let range = guest_range(guest_addr(buf), buf_len.max(0) as usize);
                match range.and_then(|r| data.get_mut(r)) {
                    Some(slot) => {
                        rand::thread_rng().fill_bytes(slot);
                        ERRNO_SUCCESS
                    }
                    None => ERRNO_FAULT,
                }
            },
        )
        .map_err(|e| link_err("random_get", e))?;

    // args_sizes_get / environ_sizes_get(count_ptr, buf_size_ptr) -> errno: always empty
    for name in ["args_sizes_get", "environ_sizes_get"] {
        linker
            .func_wrap(
                WASI_MODULE,
                name,
                |mut caller: Caller<'_, WasmData>, count: i32, buf_size: i32| -> i32 {
                    let Some(memory) = guest_memory(&mut caller) else {
                        return ERRNO_BADF;
                    };
                    let data = memory.data_mut(&mut caller);
                    if write_bytes(data, guest_addr(count), &0u32.to_le_bytes())
                        && write_bytes(data, guest_addr(buf_size), &0u32.to_le_bytes())
                    {
                        ERRNO_SUCCESS
                    } else {
                        ERRNO_FAULT
                    }
                },
            )
            .map_err(|e| link_err(name, e))?;
    }

    // args_get / environ_get(ptrs, buf) -> errno: nothing to copy
    for name in ["args_get", "environ_get"] {
        linker
            .func_wrap(
                WASI_MODULE,
                name,
                |_caller: Caller<'_, WasmData>, _ptrs: i32, _buf: i32| -> i32 { ERRNO_SUCCESS },
            )
            .map_err(|e| link_err(name, e))?;
    }

    // proc_exit(code)
    linker
        .func_wrap(
            WASI_MODULE,
            "proc_exit",
            |mut caller: Caller<'_, WasmData>, code: i32| {
                log::warn!(target: "guest", "guest called proc_exit({})", code);
                caller.data_mut().exit_code = Some(code);
            },
        )
        .map_err(|e| link_err("proc_exit", e))?;

    // fd_close(fd) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "fd_close",
            |_caller: Caller<'_, WasmData>, _fd: i32| -> i32 { ERRNO_SUCCESS },
        )
        .map_err(|e| link_err("fd_close", e))?;

    Ok(())
}
