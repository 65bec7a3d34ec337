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
use crate::error::{BridgeError, Result, ScriptError};
use crate::function::{HostFunction, JsFunction};
use crate::future::HostFuture;
use crate::object::JsObject;
use std::collections::BTreeMap;

/// A value crossing the host/guest boundary.
///
/// Primitives and the by-value collections (`List`, `Map`) are plain host
/// data. Everything else is a handle into a live guest-side resource owned by
/// a [`crate::Context`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Script `null` and `undefined`.
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    String(String),
    /// Host list, copied into a fresh guest array on every crossing.
    List(Vec<Value>),
    /// Host map, copied into a fresh guest object on every crossing.
    Map(BTreeMap<String, Value>),
    Array(JsArray),
    Object(JsObject),
    Function(JsFunction),
    HostFunction(HostFunction),
    Exception(ScriptError),
    Future(HostFuture),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::HostFunction(_) => "host function",
            Value::Exception(_) => "exception",
            Value::Future(_) => "future",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view. Integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_object(self) -> Result<JsObject> {
        match self {
            Value::Object(o) => Ok(o),
            other => Err(other.mismatch("object")),
        }
    }

    pub fn into_array(self) -> Result<JsArray> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn into_function(self) -> Result<JsFunction> {
        match self {
            Value::Function(f) => Ok(f),
            other => Err(other.mismatch("function")),
        }
    }

    pub fn into_future(self) -> Result<HostFuture> {
        match self {
            Value::Future(f) => Ok(f),
            other => Err(other.mismatch("future")),
        }
    }

    /// Turn a decoded guest exception into an error, pass everything else through.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Value::Exception(e) => Err(BridgeError::Script(e)),
            other => Ok(other),
        }
    }

    fn mismatch(&self, expected: &'static str) -> BridgeError {
        BridgeError::Type {
            expected,
            found: self.type_name(),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl From<JsArray> for Value {
    fn from(a: JsArray) -> Self {
        Value::Array(a)
    }
}

impl From<JsObject> for Value {
    fn from(o: JsObject) -> Self {
        Value::Object(o)
    }
}

impl From<JsFunction> for Value {
    fn from(f: JsFunction) -> Self {
        Value::Function(f)
    }
}

impl From<HostFunction> for Value {
    fn from(f: HostFunction) -> Self {
        Value::HostFunction(f)
    }
}

impl From<HostFuture> for Value {
    fn from(f: HostFuture) -> Self {
        Value::Future(f)
    }
}

impl From<ScriptError> for Value {
    fn from(e: ScriptError) -> Self {
        Value::Exception(e)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
