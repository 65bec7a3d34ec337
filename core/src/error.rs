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

use std::fmt;
use thiserror::Error;

/// A script-level failure: an exception raised inside the guest engine, or a
/// host callback failure that crossed the guest and came back unhandled.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    /// Guest stack text. Empty when the failure originated on the host.
    pub stack: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// A failure raised by host code. Host stack traces never cross the boundary.
    pub fn from_host(message: impl Into<String>) -> Self {
        Self::new(message, String::new())
    }

    /// True when the guest aborted because the execution governor asked it to.
    pub fn is_interrupted(&self) -> bool {
        self.message.contains("interrupted")
    }

    /// True when the guest allocator refused to grow past the memory ceiling.
    pub fn is_out_of_memory(&self) -> bool {
        self.message.contains("out of memory")
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Script Error: {0}")]
    Script(ScriptError),
    #[error("Resource Closed: {0} is no longer usable")]
    Closed(&'static str),
    #[error("Index Out Of Range: index {index}, size {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Missing Entry: no {registry} at index {index}")]
    MissingEntry { registry: &'static str, index: usize },
    #[error("Foreign Handle: handle belongs to another context")]
    ForeignHandle,
    #[error("Busy: the runtime is already executing a call on this thread")]
    Busy,
    #[error("Type Error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Codec Error: {0}")]
    Codec(String),
    #[error("Guest Error [{entry}]: {message}")]
    Guest { entry: &'static str, message: String },
    #[error("[{context}] {message}")]
    Trap { context: String, message: String },
    #[error("Contract Error: guest module is missing exports {missing:?}")]
    Contract { missing: Vec<String> },
    #[error("Config Error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn trap(context: impl Into<String>, err: impl fmt::Display) -> Self {
        BridgeError::Trap {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// The script error carried by this failure, if it is one.
    pub fn script(&self) -> Option<&ScriptError> {
        match self {
            BridgeError::Script(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScriptError> for BridgeError {
    fn from(e: ScriptError) -> Self {
        BridgeError::Script(e)
    }
}

impl From<rmp_serde::encode::Error> for BridgeError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for BridgeError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
