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

//! MessagePack wire format shared with the guest.
//!
//! Every value is a single-key map `{tag: payload}`, except `null` and
//! `undefined` which travel as the bare tag string. Aggregates created by the
//! guest always cross by reference (a guest handle); host collections cross
//! by value and become brand-new guest aggregates.

use crate::array::JsArray;
use crate::error::{BridgeError, Result, ScriptError};
use crate::function::JsFunction;
use crate::object::JsObject;
use crate::state::{ContextId, HostState, ResourceKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Wire {
    Null,
    Undefined,
    String(String),
    Int(i32),
    Float(f64),
    Boolean(bool),
    Array(Vec<Wire>),
    /// Guest array handle.
    NativeArray(u64),
    Object(BTreeMap<String, Wire>),
    /// Guest object handle.
    NativeObject(u64),
    /// Function name, guest function handle.
    Function(String, u64),
    /// Guest context handle, index into that context's host function registry.
    HostFunction(u64, u32),
    /// Message, stack.
    Exception(String, String),
    /// Index into the context's future registry, guest promise handle.
    Future(u32, u64),
}

pub fn to_bytes(wire: &Wire) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(wire)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Wire> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Encode a value for delivery to `context`.
pub fn encode(state: &mut HostState, context: ContextId, value: &Value) -> Result<Vec<u8>> {
    let wire = to_wire(state, context, value)?;
    to_bytes(&wire)
}

/// Decode a value received from `context`, registering any handles it carries.
pub fn decode(state: &mut HostState, context: ContextId, bytes: &[u8]) -> Result<Value> {
    let wire = from_bytes(bytes)?;
    from_wire(state, context, wire)
}

// =============================================================================
// Host -> Wire
// =============================================================================


pub(crate) fn to_wire(state: &mut HostState, context: ContextId, value: &Value) -> Result<Wire> {
    Ok(match value {
        Value::Null => Wire::Null,
        Value::Bool(b) => Wire::Boolean(*b),
        Value::Int(i) => Wire::Int(*i),
        Value::Float(f) => Wire::Float(*f),
        Value::String(s) => Wire::String(s.clone()),
        Value::List(items) => Wire::Array(
            items
                .iter()
                .map(|item| to_wire(state, context, item))
                .collect::<Result<_>>()?,
        ),
        Value::Map(entries) => Wire::Object(
            entries
                .iter()
                .map(|(k, v)| -> Result<(String, Wire)> { Ok((k.clone(), to_wire(state, context, v)?)) })
                .collect::<Result<_>>()?,
        ),
        Value::Array(a) => {
            Wire::NativeArray(state.handle(a.owner(), context, a.slot(), a.ptr())?)
        }
        Value::Object(o) => {
            Wire::NativeObject(state.handle(o.owner(), context, o.slot(), o.ptr())?)
        }
        Value::Function(f) => {
            let ptr = state.handle(f.owner(), context, f.slot(), f.ptr())?;
            Wire::Function(f.name().to_string(), ptr)
        }
        Value::HostFunction(f) => {
            let ctx = state.context_mut(context)?;
            let index = ctx.register_function(f);
            Wire::HostFunction(ctx.native, index)
        }
        Value::Exception(e) => Wire::Exception(e.message.clone(), e.stack.clone()),
        Value::Future(f) => {
            state.check_owner(f.owner(), context)?;
            let ctx = state.context(context)?;
            let entry = ctx.future(f.index())?;
            let promise = match entry.promise {
                Some(slot) => ctx.resource(slot)?,
                None => return Err(BridgeError::Closed("promise")),
            };
            Wire::Future(f.index() as u32, promise)
        }
    })
}

// =============================================================================
// Wire -> Host
// =============================================================================

pub(crate) fn from_wire(state: &mut HostState, context: ContextId, wire: Wire) -> Result<Value> {
    Ok(match wire {
        Wire::Null | Wire::Undefined => Value::Null,
        Wire::Boolean(b) => Value::Bool(b),
        Wire::Int(i) => Value::Int(i),
        Wire::Float(f) => Value::Float(f),
        Wire::String(s) => Value::String(s),
        Wire::Array(items) => Value::List(
            items
                .into_iter()
                .map(|item| from_wire(state, context, item))
                .collect::<Result<_>>()?,
        ),
        Wire::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| -> Result<(String, Value)> { Ok((k, from_wire(state, context, v)?)) })
                .collect::<Result<_>>()?,
        ),
        Wire::NativeArray(ptr) => {
            let slot = state.context_mut(context)?.track(ResourceKind::Array, ptr);
            Value::Array(JsArray::new(state.owner(context), slot, ptr))
        }
        Wire::NativeObject(ptr) => {
            let slot = state.context_mut(context)?.track(ResourceKind::Object, ptr);
            Value::Object(JsObject::new(state.owner(context), slot, ptr))
        }
        Wire::Function(name, ptr) => {
            let slot = state.context_mut(context)?.track(ResourceKind::Function, ptr);
            Value::Function(JsFunction::new(name, state.owner(context), slot, ptr))
        }
        Wire::HostFunction(native, index) => {
            let owner = state
                .find_context(native)
                .ok_or(BridgeError::Closed("context"))?;
            if owner != context {
                return Err(BridgeError::ForeignHandle);
            }
            Value::HostFunction(state.context(owner)?.function(index as usize)?)
        }
        Wire::Exception(message, stack) => Value::Exception(ScriptError::new(message, stack)),
        Wire::Future(index, _) => {
            Value::Future(state.context(context)?.future(index as usize)?.future.clone())
        }
    })
}
