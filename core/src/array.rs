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

/// Live view of a guest array.
///
/// Every index operation re-reads the length from the guest, so bounds are
/// checked against the array as it is now, not as it was when the proxy was
/// created.
#[derive(Debug, Clone)]
pub struct JsArray {
    owner: Owner,
    slot: ResourceId,
    ptr: u64,
}

impl JsArray {
    pub(crate) fn new(owner: Owner, slot: ResourceId, ptr: u64) -> Self {
        Self { owner, slot, ptr }
    }

    /// Create a guest array and append `values` one by one.
    pub fn from_values<V: Into<Value>>(
        scope: &mut Scope<'_>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let array = scope.create_array()?;
        for value in values {
            array.add(scope, value)?;
        }
        Ok(array)
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

    /// `index` must address an element, or the end when `allow_end` is set.
    fn checked(&self, scope: &mut Scope<'_>, index: usize, allow_end: bool) -> Result<(u64, u64)> {
        let len = self.size(scope)?;
        if index > len || (index == len && !allow_end) {
            return Err(BridgeError::IndexOutOfRange { index, len });
        }
        self.target(scope)
    }

    pub fn size(&self, scope: &mut Scope<'_>) -> Result<usize> {
        let (native, ptr) = self.target(scope)?;
        scope.call_count(EntryPoint::ArraySize, &[native, ptr])
    }

    pub fn is_empty(&self, scope: &mut Scope<'_>) -> Result<bool> {
        Ok(self.size(scope)? == 0)
    }

    pub fn get(&self, scope: &mut Scope<'_>, index: usize) -> Result<Value> {
        let (native, ptr) = self.checked(scope, index, false)?;
        scope.call_value(EntryPoint::ArrayGet, &[native, ptr, index as u64])
    }

    /// Replace an element and return the one it replaced.
    pub fn set(&self, scope: &mut Scope<'_>, index: usize, value: impl Into<Value>) -> Result<Value> {
        let previous = self.get(scope, index)?;
        let (native, ptr) = self.target(scope)?;
        scope.with_value(&value.into(), |scope, v| {
            scope.call_flag(
                EntryPoint::ArraySet,
                &[native, ptr, index as u64, v.ptr as u64, v.len as u64],
            )
        })?;
        Ok(previous)
    }

    pub fn add(&self, scope: &mut Scope<'_>, value: impl Into<Value>) -> Result<()> {
        let len = self.size(scope)?;
        self.insert(scope, len, value)
    }

    /// Insert before `index`; `index == size` appends.
    pub fn insert(&self, scope: &mut Scope<'_>, index: usize, value: impl Into<Value>) -> Result<()> {
        let (native, ptr) = self.checked(scope, index, true)?;
        scope.with_value(&value.into(), |scope, v| {
            scope.call_flag(
                EntryPoint::ArrayAdd,
                &[native, ptr, index as u64, v.ptr as u64, v.len as u64],
            )
        })
    }

    /// Remove an element, shifting the rest down, and return it.
    pub fn remove(&self, scope: &mut Scope<'_>, index: usize) -> Result<Value> {
        let previous = self.get(scope, index)?;
        let (native, ptr) = self.target(scope)?;
        scope.call_flag(EntryPoint::ArrayRemove, &[native, ptr, index as u64])?;
        Ok(previous)
    }

    pub fn to_vec(&self, scope: &mut Scope<'_>) -> Result<Vec<Value>> {
        let len = self.size(scope)?;
        (0..len).map(|i| self.get(scope, i)).collect()
    }

    pub fn close(&self, scope: &mut Scope<'_>) -> Result<()> {
        scope.close_resource(self.owner, self.slot)
    }
}

impl PartialEq for JsArray {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.ptr == other.ptr
    }
}
