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

use crate::error::{BridgeError, Result};
use crate::guest::Guest;

/// A span of guest linear memory.
///
/// Guest exports that hand back variable-sized data return the span packed
/// into one 64-bit word: pointer in the high half, length in the low half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub ptr: u32,
    pub len: u32,
}

impl MemoryRegion {
    pub fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    pub fn unpack(packed: u64) -> Self {
        Self {
            ptr: (packed >> 32) as u32,
            len: (packed & 0xffff_ffff) as u32,
        }
    }

    pub fn pack(&self) -> u64 {
        ((self.ptr as u64) << 32) | self.len as u64
    }

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }
}

/// Allocate a fresh region and copy `bytes` into it. The caller owns the
/// region and must release it with [`free`].
pub fn write(guest: &mut dyn Guest, bytes: &[u8]) -> Result<MemoryRegion> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| BridgeError::Codec(format!("{} bytes exceed guest memory", bytes.len())))?;
    let ptr = guest.alloc(len)?;
    if ptr == 0 && len > 0 {
        return Err(BridgeError::Guest {
            entry: "alloc",
            message: format!("allocation of {} bytes failed", len),
        });
    }
    if len > 0 {
        if let Err(e) = guest.write(ptr, bytes) {
            let _ = guest.dealloc(ptr, len);
            return Err(e);
        }
    }
    Ok(MemoryRegion { ptr, len })
}

pub fn free(guest: &mut dyn Guest, region: MemoryRegion) -> Result<()> {
    if region.is_null() {
        return Ok(());
    }
    guest.dealloc(region.ptr, region.len)
}

/// Copy a guest-allocated region into host ownership, then release it.
pub fn take(guest: &mut dyn Guest, region: MemoryRegion) -> Result<Vec<u8>> {
    if region.is_null() {
        return Err(BridgeError::Guest {
            entry: "result",
            message: "guest returned a null result region".to_string(),
        });
    }
    let bytes = guest.read(region.ptr, region.len);
    let freed = guest.dealloc(region.ptr, region.len);
    let bytes = bytes?;
    freed?;
    Ok(bytes)
}

/// Run `f` with `bytes` staged in guest memory. The region is released after
/// `f` returns, whether or not it succeeded.
pub fn with_scratch<R>(
    guest: &mut dyn Guest,
    bytes: &[u8],
    f: impl FnOnce(&mut dyn Guest, MemoryRegion) -> Result<R>,
) -> Result<R> {
    let region = write(guest, bytes)?;
    let result = f(guest, region);
    if let Err(e) = free(guest, region) {
        log::warn!("failed to release scratch region {:?}: {}", region, e);
    }
    result
}
