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
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Settings applied when a [`crate::Runtime`] is created.
///
/// Loadable from JSON; every field is optional:
///
/// ```json
/// { "module_path": "guest.wasm", "memory_limit": 33554432,
///   "script_timeout_ms": 5000, "guest_log_level": "warn" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Guest module loaded by [`crate::Runtime::new`].
    pub module_path: Option<PathBuf>,
    /// Guest heap ceiling in bytes. `None` keeps the guest's default.
    pub memory_limit: Option<u64>,
    /// Wall-clock ceiling per outermost call. Zero or less is unbounded.
    pub script_timeout_ms: i64,
    /// Filter for records the guest forwards through the log import.
    pub guest_log_level: Option<String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(text)?;
        if let Some(level) = &config.guest_log_level {
            LevelFilter::from_str(level).map_err(|_| {
                BridgeError::Config(serde::de::Error::custom(format!(
                    "unknown log level '{}'",
                    level
                )))
            })?;
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.script_timeout_ms = timeout_ms;
        self
    }

    pub fn with_guest_log_level(mut self, level: LevelFilter) -> Self {
        self.guest_log_level = Some(level.as_str().to_string());
        self
    }

    /// Effective guest filter: the configured level, else the host's own.
    pub fn guest_log_level(&self) -> LevelFilter {
        self.guest_log_level
            .as_deref()
            .and_then(|level| LevelFilter::from_str(level).ok())
            .unwrap_or_else(log::max_level)
    }
}
