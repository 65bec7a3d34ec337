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

//! Host side of the script bridge.
//!
//! A script engine compiled to WebAssembly runs inside a wasmtime instance.
//! This crate owns that instance and moves values across the boundary in
//! both directions: plain data is copied through a MessagePack codec, while
//! objects, arrays, functions and promises travel as handles and come back
//! as live proxies ([`JsObject`], [`JsArray`], [`JsFunction`],
//! [`HostFuture`]). Host closures registered as [`HostFunction`]s are
//! callable from scripts and may call back into the guest.

pub mod array;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod future;
pub mod governor;
pub mod guest;
pub mod imports;
pub mod logging;
pub mod memory;
pub mod object;
pub mod runtime;
pub mod state;
pub mod value;

pub use array::JsArray;
pub use config::RuntimeConfig;
pub use context::{Context, Scope};
pub use error::{BridgeError, Result, ScriptError};
pub use function::{HostFunction, JsFunction};
pub use future::{FutureState, HostFuture};
pub use governor::InterruptHandle;
pub use guest::{EntryPoint, Guest};
pub use object::JsObject;
pub use runtime::Runtime;
pub use value::Value;
