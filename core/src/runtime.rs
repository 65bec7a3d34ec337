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

use crate::config::RuntimeConfig;
use crate::context::{close_context, Context};
use crate::state::ContextId;
use crate::error::{BridgeError, Result};
use crate::governor::{governed_call, InterruptHandle};
use crate::guest::wasm::WasmGuest;
use crate::guest::{EntryPoint, Guest};
use crate::logging;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io;
use std::rc::Rc;

/// The guest instance shared by a runtime and its contexts.
pub(crate) struct RuntimeShared {
    guest: RefCell<Box<dyn Guest>>,
    /// Close state kept outside the guest borrow so it stays readable mid-call.
    runtime_closed: Cell<bool>,
    closed_contexts: RefCell<HashSet<ContextId>>,
}

impl RuntimeShared {
    fn new(guest: Box<dyn Guest>) -> Self {
        Self {
            guest: RefCell::new(guest),
            runtime_closed: Cell::new(false),
            closed_contexts: RefCell::new(HashSet::new()),
        }
    }

    /// Borrow the guest for one top-level operation.
    pub(crate) fn enter<R>(&self, f: impl FnOnce(&mut dyn Guest) -> Result<R>) -> Result<R> {
        let mut guest = self.guest.try_borrow_mut().map_err(|_| BridgeError::Busy)?;
        f(&mut **guest)
    }

    pub(crate) fn is_runtime_closed(&self) -> bool {
        self.runtime_closed.get()
    }

    pub(crate) fn is_context_closed(&self, id: ContextId) -> bool {
        self.is_runtime_closed() || self.closed_contexts.borrow().contains(&id)
    }

    pub(crate) fn mark_context_closed(&self, id: ContextId) {
        self.closed_contexts.borrow_mut().insert(id);
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// One guest engine instance and the contexts created in it.
///
/// Dropping the runtime closes every context, then the guest runtime.
pub struct Runtime {
    shared: Rc<RuntimeShared>,
    config: RuntimeConfig,
    interrupt: InterruptHandle,
}

impl Runtime {
    /// Load the guest module named by `config.module_path`.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let path = config.module_path.clone().ok_or_else(|| {
            BridgeError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no guest module path configured",
            ))
        })?;
        let bytes = std::fs::read(&path)?;
        Self::from_module_bytes(&bytes, config)
    }

    pub fn from_module_bytes(bytes: &[u8], config: RuntimeConfig) -> Result<Self> {
        Self::with_guest(WasmGuest::instantiate(bytes)?, config)
    }

    /// Build a runtime on any guest implementation.
    pub fn with_guest(guest: impl Guest + 'static, config: RuntimeConfig) -> Result<Self> {
        let mut guest: Box<dyn Guest> = Box::new(guest);
        guest.state().governor.set_timeout_ms(config.script_timeout_ms);
        let interrupt = guest.state().governor.interrupt_handle();

        let level = config.guest_log_level();
        governed_call(&mut *guest, EntryPoint::InitLogger, &[logging::level_code(level)])?;

        let native = governed_call(&mut *guest, EntryPoint::CreateRuntime, &[])?;
        if native == 0 {
            return Err(BridgeError::Guest {
                entry: EntryPoint::CreateRuntime.name(),
                message: "guest returned a null runtime".to_string(),
            });
        }
        guest.state().runtime_native = native;
        log::debug!("runtime {:#x} created (guest log level {})", native, level);

        Ok(Self {
            shared: Rc::new(RuntimeShared::new(guest)),
            config,
            interrupt,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Handle for interrupting guest execution from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn create_context(&self) -> Result<Context> {
        let memory_limit = self.config.memory_limit;
        let id = self.shared.enter(|guest| {
            let runtime = guest.state().runtime_native;
            if runtime == 0 {
                return Err(BridgeError::Closed("runtime"));
            }
            if !guest.state().memory_limit_sent {
                if let Some(limit) = memory_limit {
                    governed_call(guest, EntryPoint::SetMemoryLimit, &[runtime, limit])?;
                    log::debug!("guest memory limit set to {} bytes", limit);
                }
                guest.state().memory_limit_sent = true;
            }
            let native = governed_call(guest, EntryPoint::CreateContext, &[runtime])?;
            if native == 0 {
                return Err(BridgeError::Guest {
                    entry: EntryPoint::CreateContext.name(),
                    message: "guest returned a null context".to_string(),
                });
            }
            let id = guest.state().add_context(native);
            log::debug!("context {} created ({:#x})", id, native);
            Ok(id)
        })?;
        Ok(Context::new(Rc::clone(&self.shared), id))
    }

    /// Captured guest stdout since the last call.
    pub fn take_output(&self) -> Result<Vec<u8>> {
        self.shared.enter(|guest| Ok(guest.take_output()))
    }

    /// Answers without touching the guest, so it also works inside a call.
    pub fn is_closed(&self) -> bool {
        self.shared.is_runtime_closed()
    }

    /// Close every context, then the guest runtime. Safe to call more than once.
    pub fn close(&self) {
        match self.shared.enter(|guest| {
            close_runtime(guest);
            Ok(())
        }) {
            Ok(()) => self.shared.runtime_closed.set(true),
            Err(e) => log::warn!("runtime not closed: {}", e),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn close_runtime(guest: &mut dyn Guest) {
    if guest.state().is_runtime_closed() {
        return;
    }
    let native = guest.state().runtime_native;
    let contexts = guest.state().contexts.len();
    for id in 0..contexts {
        close_context(guest, id);
    }
    if let Err(e) = governed_call(guest, EntryPoint::CloseRuntime, &[native]) {
        log::warn!("failed to close runtime {:#x}: {}", native, e);
    }
    guest.state().runtime_native = 0;
    log::debug!("runtime {:#x} closed", native);
}
