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

use crate::array::JsArray;
use crate::codec;
use crate::error::{BridgeError, Result, ScriptError};
use crate::function::HostFunction;
use crate::future::HostFuture;
use crate::governor::governed_call;
use crate::guest::{EntryPoint, Guest};
use crate::memory::{self, MemoryRegion};
use crate::object::JsObject;
use crate::runtime::RuntimeShared;
use crate::state::{ContextId, HostState, Owner, ResourceId, ResourceKind};
use crate::value::Value;
use std::rc::Rc;

// =============================================================================
// Scope
// =============================================================================

/// Exclusive access to the guest on behalf of one Context.
///
/// A scope is handed out by [`Context::with`] and, for host callbacks, by the
/// dispatcher while the guest is blocked in a call. Every proxy and function
/// operation takes the scope explicitly, so nested guest calls from inside a
/// callback reuse the borrow that is already held.
pub struct Scope<'g> {
    guest: &'g mut dyn Guest,
    context: ContextId,
}

impl<'g> Scope<'g> {
    pub(crate) fn new(guest: &'g mut dyn Guest, context: ContextId) -> Self {
        Self { guest, context }
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub(crate) fn state(&mut self) -> &mut HostState {
        self.guest.state()
    }

    fn owner(&mut self) -> Owner {
        let context = self.context;
        self.state().owner(context)
    }

    /// Guest handle of this scope's context.
    pub(crate) fn native(&mut self) -> Result<u64> {
        let context = self.context;
        Ok(self.state().context(context)?.native)
    }

    /// Guest handle of a resource minted under `owner`.
    pub(crate) fn resource(&mut self, owner: Owner, slot: ResourceId, ptr: u64) -> Result<u64> {
        let context = self.context;
        self.state().handle(owner, context, slot, ptr)
    }

    pub fn encode(&mut self, value: &Value) -> Result<Vec<u8>> {
        codec::encode(self.guest.state(), self.context, value)
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Result<Value> {
        codec::decode(self.guest.state(), self.context, bytes)
    }

    // -------------------------------------------------------------------------
    // Guest calls
    // -------------------------------------------------------------------------

    pub(crate) fn call_raw(&mut self, entry: EntryPoint, args: &[u64]) -> Result<u64> {
        governed_call(&mut *self.guest, entry, args)
    }

    /// Call an export that answers with a packed wire value.
    pub(crate) fn call_value(&mut self, entry: EntryPoint, args: &[u64]) -> Result<Value> {
        let packed = self.call_raw(entry, args)?;
        let bytes = memory::take(&mut *self.guest, MemoryRegion::unpack(packed)).map_err(|e| match e {
            BridgeError::Guest { message, .. } => BridgeError::Guest {
                entry: entry.name(),
                message,
            },
            other => other,
        })?;
        self.decode(&bytes)?.into_result()
    }

    /// Call an export that answers with a success flag.
    pub(crate) fn call_flag(&mut self, entry: EntryPoint, args: &[u64]) -> Result<()> {
        if self.call_raw(entry, args)? == 0 {
            return Err(BridgeError::Guest {
                entry: entry.name(),
                message: "operation rejected by guest".to_string(),
            });
        }
        Ok(())
    }

    /// Call an export that answers with a count, negative on failure.
    pub(crate) fn call_count(&mut self, entry: EntryPoint, args: &[u64]) -> Result<usize> {
        let count = self.call_raw(entry, args)? as i64;
        if count < 0 {
            return Err(BridgeError::Guest {
                entry: entry.name(),
                message: format!("guest reported status {}", count),
            });
        }
        Ok(count as usize)
    }

    /// Stage `bytes` in guest memory for the duration of `f`.
    pub(crate) fn with_bytes<R>(
        &mut self,
        bytes: &[u8],
        f: impl FnOnce(&mut Scope<'_>, MemoryRegion) -> Result<R>,
    ) -> Result<R> {
        let context = self.context;
        memory::with_scratch(&mut *self.guest, bytes, |guest, region| {
            f(&mut Scope::new(guest, context), region)
        })
    }

    pub(crate) fn with_value<R>(
        &mut self,
        value: &Value,
        f: impl FnOnce(&mut Scope<'_>, MemoryRegion) -> Result<R>,
    ) -> Result<R> {
        let bytes = self.encode(value)?;
        self.with_bytes(&bytes, f)
    }

    pub(crate) fn close_resource(&mut self, owner: Owner, slot: ResourceId) -> Result<()> {
        let context = self.context;
        self.state().check_owner(owner, context)?;
        let (native, released) = match self.state().context_mut(context) {
            Ok(ctx) => (ctx.native, ctx.release(slot)),
            Err(BridgeError::Closed(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        if let Some(entry) = released {
            if let Err(e) = self.call_raw(entry.kind.close_entry(), &[native, entry.ptr]) {
                log::warn!(
                    "failed to release {} {:#x}: {}",
                    entry.kind.label(),
                    entry.ptr,
                    e
                );
            }
        }
        Ok(())
    }

    fn track(&mut self, kind: ResourceKind, ptr: u64) -> Result<ResourceId> {
        let context = self.context;
        Ok(self.state().context_mut(context)?.track(kind, ptr))
    }

    // -------------------------------------------------------------------------
    // Script evaluation and globals
    // -------------------------------------------------------------------------

    pub fn eval(&mut self, script: &str) -> Result<Value> {
        let native = self.native()?;
        self.with_bytes(script.as_bytes(), |scope, src| {
            scope.call_value(
                EntryPoint::EvalScript,
                &[native, src.ptr as u64, src.len as u64],
            )
        })
    }

    /// Evaluate with top-level `await` allowed. The completion value arrives
    /// through the returned future once jobs have been drained.
    pub fn eval_async(&mut self, script: &str) -> Result<HostFuture> {
        let native = self.native()?;
        self.with_bytes(script.as_bytes(), |scope, src| {
            scope.call_value(
                EntryPoint::EvalScriptAsync,
                &[native, src.ptr as u64, src.len as u64],
            )
        })?
        .into_future()
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let native = self.native()?;
        let value = self.encode(&value.into())?;
        self.with_bytes(name.as_bytes(), |scope, n| {
            scope.with_bytes(&value, |scope, v| {
                scope.call_value(
                    EntryPoint::SetGlobal,
                    &[
                        native,
                        n.ptr as u64,
                        n.len as u64,
                        v.ptr as u64,
                        v.len as u64,
                    ],
                )
            })
        })?;
        Ok(())
    }

    pub fn get_global(&mut self, name: &str) -> Result<Value> {
        let native = self.native()?;
        self.with_bytes(name.as_bytes(), |scope, n| {
            scope.call_value(
                EntryPoint::GetGlobal,
                &[native, n.ptr as u64, n.len as u64],
            )
        })
    }

    /// Call the function found at a dotted global path, e.g. `"JSON.stringify"`.
    pub fn invoke(&mut self, path: &str, args: Vec<Value>) -> Result<Value> {
        let native = self.native()?;
        let args = self.encode(&Value::List(args))?;
        self.with_bytes(path.as_bytes(), |scope, p| {
            scope.with_bytes(&args, |scope, a| {
                scope.call_value(
                    EntryPoint::Invoke,
                    &[
                        native,
                        p.ptr as u64,
                        p.len as u64,
                        a.ptr as u64,
                        a.len as u64,
                    ],
                )
            })
        })
    }

    // -------------------------------------------------------------------------
    // Resource construction
    // -------------------------------------------------------------------------

    pub fn create_object(&mut self) -> Result<JsObject> {
        let native = self.native()?;
        let ptr = self.call_raw(EntryPoint::ObjectCreate, &[native])?;
        if ptr == 0 {
            return Err(BridgeError::Guest {
                entry: EntryPoint::ObjectCreate.name(),
                message: "guest returned a null object".to_string(),
            });
        }
        let slot = self.track(ResourceKind::Object, ptr)?;
        let owner = self.owner();
        Ok(JsObject::new(owner, slot, ptr))
    }

    pub fn create_array(&mut self) -> Result<JsArray> {
        let native = self.native()?;
        let ptr = self.call_raw(EntryPoint::ArrayCreate, &[native])?;
        if ptr == 0 {
            return Err(BridgeError::Guest {
                entry: EntryPoint::ArrayCreate.name(),
                message: "guest returned a null array".to_string(),
            });
        }
        let slot = self.track(ResourceKind::Array, ptr)?;
        let owner = self.owner();
        Ok(JsArray::new(owner, slot, ptr))
    }

    /// Export a host callable. Registering the same callable twice returns
    /// the same index.
    pub fn register_function(&mut self, function: &HostFunction) -> Result<u32> {
        let context = self.context;
        Ok(self.state().context_mut(context)?.register_function(function))
    }

    /// Create a future whose paired promise is minted by the guest.
    pub fn create_future(&mut self) -> Result<HostFuture> {
        let native = self.native()?;
        let context = self.context;
        let owner = self.owner();
        let future = self.state().context_mut(context)?.reserve_future(owner);
        let ptr = match self.call_raw(EntryPoint::PromiseCreate, &[native, future.index() as u64]) {
            Ok(ptr) if ptr != 0 => ptr,
            Ok(_) => {
                future.fail(ScriptError::from_host("guest could not create a promise"));
                return Err(BridgeError::Guest {
                    entry: EntryPoint::PromiseCreate.name(),
                    message: "guest returned a null promise".to_string(),
                });
            }
            Err(e) => {
                future.fail(ScriptError::from_host(e.to_string()));
                return Err(e);
            }
        };
        self.state()
            .context_mut(context)?
            .attach_promise(future.index(), ptr);
        log::debug!("future {}:{} paired with promise {:#x}", context, future.index(), ptr);
        Ok(future)
    }

    // -------------------------------------------------------------------------
    // Job loop
    // -------------------------------------------------------------------------

    /// Forward host-side settlements, then run one batch of guest jobs.
    /// Returns true while more jobs are queued.
    pub fn poll(&mut self) -> Result<bool> {
        self.flush_settlements();
        let runtime = self.state().runtime_native;
        if runtime == 0 {
            return Err(BridgeError::Closed("runtime"));
        }
        let status = self.call_raw(EntryPoint::PollJobs, &[runtime])? as i64;
        match status {
            s if s < 0 => Err(BridgeError::Guest {
                entry: EntryPoint::PollJobs.name(),
                message: format!("job execution failed with status {}", s),
            }),
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.poll()? {}
        Ok(())
    }

    fn flush_settlements(&mut self) {
        let count = self.state().contexts.len();
        for id in 0..count {
            let pending = match self.state().contexts.get(id) {
                Some(ctx) if !ctx.is_closed() => ctx.take_outbox(),
                _ => continue,
            };
            let mut scope = Scope::new(&mut *self.guest, id);
            for index in pending {
                // One bad forward must not strand the rest of the batch.
                if let Err(e) = scope.forward_settlement(index) {
                    log::warn!("settlement of future {}:{} not forwarded: {}", id, index, e);
                }
            }
        }
    }

    fn forward_settlement(&mut self, index: usize) -> Result<()> {
        let native = self.native()?;
        let context = self.context;
        let (future, promise) = {
            let ctx = self.state().context(context)?;
            let entry = ctx.future(index)?;
            let promise = entry.promise.and_then(|slot| ctx.resource(slot).ok());
            (entry.future.clone(), promise)
        };
        let Some(promise) = promise else {
            log::debug!("future {}:{} has no live promise, not forwarded", context, index);
            return Ok(());
        };
        let (mut entry, value) = match future.outcome() {
            Some(Ok(value)) => (EntryPoint::PromiseResolve, value),
            Some(Err(error)) => (EntryPoint::PromiseReject, Value::Exception(error)),
            None => return Ok(()),
        };
        let bytes = match self.encode(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                entry = EntryPoint::PromiseReject;
                self.encode(&Value::Exception(ScriptError::from_host(e.to_string())))?
            }
        };
        let accepted = self.with_bytes(&bytes, |scope, v| {
            scope.call_raw(entry, &[native, promise, v.ptr as u64, v.len as u64])
        })?;
        if accepted == 0 {
            log::warn!("guest refused {} for future {}:{}", entry, context, index);
        }
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// An isolated script global environment inside a [`crate::Runtime`].
///
/// Not `Send`: all access is serialised through the owning runtime's guest
/// borrow. Dropping the context closes it.
pub struct Context {
    shared: Rc<RuntimeShared>,
    id: ContextId,
}

impl Context {
    pub(crate) fn new(shared: Rc<RuntimeShared>, id: ContextId) -> Self {
        Self { shared, id }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Run `f` with exclusive guest access. Fails with [`BridgeError::Busy`]
    /// if another call on this runtime is already in progress, and with
    /// [`BridgeError::Closed`] once the context is closed.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scope<'_>) -> Result<R>) -> Result<R> {
        self.shared.enter(|guest| {
            let mut scope = Scope::new(guest, self.id);
            scope.native()?;
            f(&mut scope)
        })
    }

    pub fn eval(&self, script: &str) -> Result<Value> {
        self.with(|scope| scope.eval(script))
    }

    pub fn eval_async(&self, script: &str) -> Result<HostFuture> {
        self.with(|scope| scope.eval_async(script))
    }

    pub fn set_global(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with(|scope| scope.set_global(name, value))
    }

    pub fn get_global(&self, name: &str) -> Result<Value> {
        self.with(|scope| scope.get_global(name))
    }

    pub fn invoke(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        self.with(|scope| scope.invoke(path, args))
    }

    pub fn poll(&self) -> Result<bool> {
        self.with(|scope| scope.poll())
    }

    pub fn run_until_idle(&self) -> Result<()> {
        self.with(|scope| scope.run_until_idle())
    }

    /// Answers without touching the guest, so it also works inside a call.
    pub fn is_closed(&self) -> bool {
        self.shared.is_context_closed(self.id)
    }

    /// Release every resource created in this context, then the context
    /// itself. Safe to call more than once.
    pub fn close(&self) {
        let closed = self.shared.enter(|guest| {
            close_context(guest, self.id);
            Ok(())
        });
        match closed {
            Ok(()) => self.shared.mark_context_closed(self.id),
            Err(e) => log::warn!("context {} not closed: {}", self.id, e),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn close_context(guest: &mut dyn Guest, id: ContextId) {
    let (native, released, futures) = {
        let Some(ctx) = guest.state().contexts.get_mut(id) else {
            return;
        };
        if ctx.is_closed() {
            return;
        }
        let futures: Vec<HostFuture> = ctx.futures.iter().map(|f| f.future.clone()).collect();
        (ctx.native, ctx.release_all(), futures)
    };
    log::debug!("closing context {} ({} open resources)", id, released.len());

    for entry in released {
        if let Err(e) = governed_call(guest, entry.kind.close_entry(), &[native, entry.ptr]) {
            log::warn!(
                "failed to release {} {:#x} in context {}: {}",
                entry.kind.label(),
                entry.ptr,
                id,
                e
            );
        }
    }
    for future in futures {
        future.fail(ScriptError::from_host("context closed"));
    }
    if let Err(e) = governed_call(guest, EntryPoint::CloseContext, &[native]) {
        log::warn!("failed to close context {}: {}", id, e);
    }
    if let Some(ctx) = guest.state().contexts.get_mut(id) {
        ctx.native = 0;
        ctx.take_outbox();
    }
}
