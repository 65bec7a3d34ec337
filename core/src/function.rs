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

use crate::context::Scope;
use crate::error::Result;
use crate::guest::EntryPoint;
use crate::state::{ContextId, Owner, ResourceId};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type Callback = dyn Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value> + Send + Sync;

// =============================================================================
// Host Functions
// =============================================================================

/// A host callable exported to script code.
///
/// The callback runs synchronously on the thread that is driving the guest
/// and receives a [`Scope`] for the calling Context, so it may read proxies
/// or call back into the guest before returning. An `Err` is delivered to
/// the script as a thrown exception carrying the error message.
#[derive(Clone)]
pub struct HostFunction(Arc<Callback>);

impl HostFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        HostFunction(Arc::new(f))
    }

    pub(crate) fn call(&self, scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value> {
        (self.0)(scope, args)
    }

    /// Identity, not behaviour: two clones are the same function.
    pub fn same_as(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// =============================================================================
// Script Functions
// =============================================================================

/// A script function handed to the host.
#[derive(Debug, Clone)]
pub struct JsFunction {
    name: String,
    owner: Owner,
    slot: ResourceId,
    ptr: u64,
}

impl JsFunction {
    pub(crate) fn new(name: String, owner: Owner, slot: ResourceId, ptr: u64) -> Self {
        Self {
            name,
            owner,
            slot,
            ptr,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> ContextId {
        self.owner.context
    }

    pub(crate) fn owner(&self) -> Owner {
        self.owner
    }

    pub(crate) fn ptr(&self) -> u64 {
        self.ptr
    }

    pub(crate) fn slot(&self) -> ResourceId {
        self.slot
    }

    /// Call with positional arguments. The argument buffer is released only
    /// after the result has been copied out of guest memory.
    pub fn call(&self, scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value> {
        let ptr = scope.resource(self.owner, self.slot, self.ptr)?;
        let native = scope.native()?;
        scope.with_value(&Value::List(args), |scope, region| {
            scope.call_value(
                EntryPoint::FunctionCall,
                &[native, ptr, region.ptr as u64, region.len as u64],
            )
        })
    }

    pub fn close(&self, scope: &mut Scope<'_>) -> Result<()> {
        scope.close_resource(self.owner, self.slot)
    }
}

impl PartialEq for JsFunction {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.ptr == other.ptr
    }
}
