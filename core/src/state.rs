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

//! Host-side bookkeeping for one guest instance.
//!
//! `HostState` lives inside the guest's store so that import handlers, which
//! only see the store, can reach the same registries as the public API.

use crate::error::{BridgeError, Result};
use crate::function::HostFunction;
use crate::future::HostFuture;
use crate::governor::Governor;
use crate::guest::EntryPoint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Index of a Context within its Runtime. Never reused.
pub type ContextId = usize;

/// Process-wide identity of a Runtime. Never reused.
pub type RuntimeId = u64;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

/// Where a handle was minted: the runtime and the context within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    pub runtime: RuntimeId,
    pub context: ContextId,
}

/// Index of a resource within its Context. Never reused.
pub type ResourceId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Object,
    Array,
    Function,
    Promise,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Object => "object",
            ResourceKind::Array => "array",
            ResourceKind::Function => "function",
            ResourceKind::Promise => "promise",
        }
    }

    pub(crate) fn close_entry(self) -> EntryPoint {
        match self {
            ResourceKind::Object => EntryPoint::ObjectClose,
            ResourceKind::Array => EntryPoint::ArrayClose,
            ResourceKind::Function => EntryPoint::FunctionClose,
            ResourceKind::Promise => EntryPoint::PromiseClose,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceEntry {
    pub kind: ResourceKind,
    /// Guest handle. Zero once released.
    pub ptr: u64,
}

#[derive(Debug)]
pub(crate) struct FutureEntry {
    pub future: HostFuture,
    pub promise: Option<ResourceId>,
}

/// Future indices settled on the host and waiting to be forwarded.
pub(crate) type Outbox = Arc<Mutex<Vec<usize>>>;

// =============================================================================
// Context State
// =============================================================================

#[derive(Debug)]
pub struct ContextState {
    pub(crate) native: u64,
    pub(crate) functions: Vec<HostFunction>,
    pub(crate) futures: Vec<FutureEntry>,
    pub(crate) resources: Vec<ResourceEntry>,
    pub(crate) outbox: Outbox,
}

impl ContextState {
    pub(crate) fn new(native: u64) -> Self {
        Self {
            native,
            functions: Vec::new(),
            futures: Vec::new(),
            resources: Vec::new(),
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.native == 0
    }

    /// Number of resources not yet released.
    pub fn open_resources(&self) -> usize {
        self.resources.iter().filter(|r| r.ptr != 0).count()
    }

    pub(crate) fn track(&mut self, kind: ResourceKind, ptr: u64) -> ResourceId {
        self.resources.push(ResourceEntry { kind, ptr });
        self.resources.len() - 1
    }

    /// Guest handle of an open resource.
    pub(crate) fn resource(&self, slot: ResourceId) -> Result<u64> {
        let entry = self.resources.get(slot).ok_or(BridgeError::MissingEntry {
            registry: "resource",
            index: slot,
        })?;
        if entry.ptr == 0 {
            return Err(BridgeError::Closed(entry.kind.label()));
        }
        Ok(entry.ptr)
    }

    /// Mark a resource released. Returns the entry only the first time.
    pub(crate) fn release(&mut self, slot: ResourceId) -> Option<ResourceEntry> {
        let entry = self.resources.get_mut(slot)?;
        if entry.ptr == 0 {
            return None;
        }
        let released = *entry;
        entry.ptr = 0;
        Some(released)
    }

    /// Release every open resource, newest first.
    pub(crate) fn release_all(&mut self) -> Vec<ResourceEntry> {
        (0..self.resources.len())
            .rev()
            .filter_map(|slot| self.release(slot))
            .collect()
    }

    /// Register a host callable. The same callable always maps to the same index.
    pub(crate) fn register_function(&mut self, function: &HostFunction) -> u32 {
        if let Some(index) = self.functions.iter().position(|f| f.same_as(function)) {
            return index as u32;
        }
        self.functions.push(function.clone());
        (self.functions.len() - 1) as u32
    }

    pub(crate) fn function(&self, index: usize) -> Result<HostFunction> {
        self.functions
            .get(index)
            .cloned()
            .ok_or(BridgeError::MissingEntry {
                registry: "host function",
                index,
            })
    }

    pub(crate) fn future(&self, index: usize) -> Result<&FutureEntry> {
        self.futures.get(index).ok_or(BridgeError::MissingEntry {
            registry: "future",
            index,
        })
    }

    /// Allocate the next future slot and hook its settlement into the outbox.
    pub(crate) fn reserve_future(&mut self, owner: Owner) -> HostFuture {
        let index = self.futures.len();
        let future = HostFuture::new(owner, index);
        let outbox = Arc::clone(&self.outbox);
        future.on_settle(move |settled_by_guest| {
            if !settled_by_guest {
                outbox
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(index);
            }
        });
        self.futures.push(FutureEntry {
            future: future.clone(),
            promise: None,
        });
        future
    }

    pub(crate) fn attach_promise(&mut self, index: usize, ptr: u64) -> ResourceId {
        let slot = self.track(ResourceKind::Promise, ptr);
        if let Some(entry) = self.futures.get_mut(index) {
            entry.promise = Some(slot);
        }
        slot
    }

    pub(crate) fn take_outbox(&self) -> Vec<usize> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

// =============================================================================
// Host State
// =============================================================================

#[derive(Debug)]
pub struct HostState {
    pub(crate) runtime_id: RuntimeId,
    pub(crate) runtime_native: u64,
    pub(crate) contexts: Vec<ContextState>,
    pub(crate) governor: Governor,
    pub(crate) memory_limit_sent: bool,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            runtime_id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
            runtime_native: 0,
            contexts: Vec::new(),
            governor: Governor::default(),
            memory_limit_sent: false,
        }
    }
}

impl HostState {
    pub fn new(governor: Governor) -> Self {
        Self {
            governor,
            ..Self::default()
        }
    }

    pub fn is_runtime_closed(&self) -> bool {
        self.runtime_native == 0
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime_id
    }

    pub(crate) fn owner(&self, context: ContextId) -> Owner {
        Owner {
            runtime: self.runtime_id,
            context,
        }
    }

    /// Handles only work in the context of the runtime that minted them.
    pub(crate) fn check_owner(&self, owner: Owner, context: ContextId) -> Result<()> {
        if owner != self.owner(context) {
            return Err(BridgeError::ForeignHandle);
        }
        Ok(())
    }

    /// Guest handle behind a proxy, after checking where the proxy came from.
    pub(crate) fn handle(
        &self,
        owner: Owner,
        context: ContextId,
        slot: ResourceId,
        ptr: u64,
    ) -> Result<u64> {
        self.check_owner(owner, context)?;
        let live = self.context(context)?.resource(slot)?;
        if live != ptr {
            return Err(BridgeError::ForeignHandle);
        }
        Ok(live)
    }

    /// An open context.
    pub fn context(&self, id: ContextId) -> Result<&ContextState> {
        let ctx = self.contexts.get(id).ok_or(BridgeError::MissingEntry {
            registry: "context",
            index: id,
        })?;
        if ctx.is_closed() {
            return Err(BridgeError::Closed("context"));
        }
        Ok(ctx)
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> Result<&mut ContextState> {
        let ctx = self.contexts.get_mut(id).ok_or(BridgeError::MissingEntry {
            registry: "context",
            index: id,
        })?;
        if ctx.is_closed() {
            return Err(BridgeError::Closed("context"));
        }
        Ok(ctx)
    }

    /// Look up an open context by its guest handle.
    pub(crate) fn find_context(&self, native: u64) -> Option<ContextId> {
        if native == 0 {
            return None;
        }
        self.contexts.iter().position(|c| c.native == native)
    }

    pub(crate) fn add_context(&mut self, native: u64) -> ContextId {
        self.contexts.push(ContextState::new(native));
        self.contexts.len() - 1
    }
}
