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
use crate::error::{BridgeError, Result};
use crate::guest::EntryPoint;
use crate::state::{ContextId, Owner, ResourceId};
use crate::value::Value;

/// Live view of a guest object.
///
/// Nothing is cached: every read goes to the guest, and guest-side mutation
/// is visible through the proxy immediately.
#[derive(Debug, Clone)]
pub struct JsObject {
    owner: Owner,
    slot: ResourceId,
    ptr: u64,
}

impl JsObject {
    pub(crate) fn new(owner: Owner, slot: ResourceId, ptr: u64) -> Self {
        Self { owner, slot, ptr }
    }

    /// Create a guest object and copy `entries` into it one by one.
    pub fn from_entries<K, V>(
        scope: &mut Scope<'_>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let object = scope.create_object()?;
        for (key, value) in entries {
            object.put(scope, &key.into(), value)?;
        }
        Ok(object)
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

    fn target(&self, scope: &mut Scope<'_>) -> Result<(u64, u64)> {
        let ptr = scope.resource(self.owner, self.slot, self.ptr)?;
        Ok((scope.native()?, ptr))
    }

    pub fn size(&self, scope: &mut Scope<'_>) -> Result<usize> {
        let (native, ptr) = self.target(scope)?;
        scope.call_count(EntryPoint::ObjectSize, &[native, ptr])
    }

    pub fn is_empty(&self, scope: &mut Scope<'_>) -> Result<bool> {
        Ok(self.size(scope)? == 0)
    }

    pub fn contains_key(&self, scope: &mut Scope<'_>, key: &str) -> Result<bool> {
        let (native, ptr) = self.target(scope)?;
        scope.with_value(&Value::from(key), |scope, k| {
            let found = scope.call_raw(
                EntryPoint::ObjectContainsKey,
                &[native, ptr, k.ptr as u64, k.len as u64],
            )?;
            Ok(found != 0)
        })
    }

    /// Property value. A missing key reads as `Null`.
    pub fn get(&self, scope: &mut Scope<'_>, key: &str) -> Result<Value> {
        let (native, ptr) = self.target(scope)?;
        scope.with_value(&Value::from(key), |scope, k| {
            scope.call_value(
                EntryPoint::ObjectGetValue,
                &[native, ptr, k.ptr as u64, k.len as u64],
            )
        })
    }

    /// Set a property and return the value it replaced.
    pub fn put(&self, scope: &mut Scope<'_>, key: &str, value: impl Into<Value>) -> Result<Value> {
        let previous = self.get(scope, key)?;
        let (native, ptr) = self.target(scope)?;
        let value = scope.encode(&value.into())?;
        scope.with_value(&Value::from(key), |scope, k| {
            scope.with_bytes(&value, |scope, v| {
                scope.call_flag(
                    EntryPoint::ObjectSetValue,
                    &[
                        native,
                        ptr,
                        k.ptr as u64,
                        k.len as u64,
                        v.ptr as u64,
                        v.len as u64,
                    ],
                )
            })
        })?;
        Ok(previous)
    }

    /// Delete a property and return the value it held.
    pub fn remove(&self, scope: &mut Scope<'_>, key: &str) -> Result<Value> {
        let previous = self.get(scope, key)?;
        let (native, ptr) = self.target(scope)?;
        scope.with_value(&Value::from(key), |scope, k| {
            scope.call_raw(
                EntryPoint::ObjectRemoveValue,
                &[native, ptr, k.ptr as u64, k.len as u64],
            )
        })?;
        Ok(previous)
    }

    /// Snapshot of the own enumerable keys.
    pub fn keys(&self, scope: &mut Scope<'_>) -> Result<Vec<String>> {
        let (native, ptr) = self.target(scope)?;
        let keys = match scope.call_value(EntryPoint::ObjectKeySet, &[native, ptr])? {
            Value::List(keys) => keys,
            other => {
                return Err(BridgeError::Type {
                    expected: "list",
                    found: other.type_name(),
                })
            }
        };
        keys.into_iter()
            .map(|key| match key {
                Value::String(s) => Ok(s),
                Value::Int(i) => Ok(i.to_string()),
                Value::Float(f) => Ok(f.to_string()),
                other => Err(BridgeError::Type {
                    expected: "string",
                    found: other.type_name(),
                }),
            })
            .collect()
    }

    /// Iterate over `(key, value)` pairs. Keys are snapshotted up front,
    /// values are read as the iterator advances.
    pub fn entries<'a, 'g>(&'a self, scope: &'a mut Scope<'g>) -> Result<Entries<'a, 'g>> {
        let keys = self.keys(scope)?;
        Ok(Entries {
            object: self,
            scope,
            keys: keys.into_iter(),
        })
    }

    /// Whether some property currently holds a value equal to `value`.
    /// Stops reading at the first match.
    pub fn contains_value(&self, scope: &mut Scope<'_>, value: &Value) -> Result<bool> {
        for entry in self.entries(scope)? {
            if entry?.1 == *value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn values(&self, scope: &mut Scope<'_>) -> Result<Vec<Value>> {
        self.entries(scope)?
            .map(|entry| entry.map(|(_, value)| value))
            .collect()
    }

    /// Call the method stored under `name`.
    pub fn invoke(&self, scope: &mut Scope<'_>, name: &str, args: Vec<Value>) -> Result<Value> {
        let function = self.get(scope, name)?.into_function()?;
        let result = function.call(scope, args);
        function.close(scope)?;
        result
    }

    pub fn close(&self, scope: &mut Scope<'_>) -> Result<()> {
        scope.close_resource(self.owner, self.slot)
    }
}

impl PartialEq for JsObject {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.ptr == other.ptr
    }
}

pub struct Entries<'a, 'g> {
    object: &'a JsObject,
    scope: &'a mut Scope<'g>,
    keys: std::vec::IntoIter<String>,
}

impl Iterator for Entries<'_, '_> {
    type Item = Result<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(self.object.get(self.scope, &key).map(|value| (key, value)))
    }
}
