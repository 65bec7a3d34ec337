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

//! Log plumbing between host and guest.
//!
//! The bridge logs through the `log` facade. Records the guest emits arrive
//! through the `log` import and are re-emitted under the `guest` target;
//! bytes written to the guest's stdout/stderr go to `guest::stdout` and
//! `guest::stderr`.

use log::{Level, LevelFilter};

/// Install `env_logger`, honouring `RUST_LOG`, defaulting to `default_level`.
pub fn init(default_level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .format_timestamp(None)
        .parse_default_env()
        .try_init();
}

/// Level code understood by the guest's `init_logger` export.
pub fn level_code(level: LevelFilter) -> u64 {
    match level {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}

pub fn level_from_code(code: i32) -> Option<Level> {
    match code {
        1 => Some(Level::Error),
        2 => Some(Level::Warn),
        3 => Some(Level::Info),
        4 => Some(Level::Debug),
        5 => Some(Level::Trace),
        _ => None,
    }
}

pub(crate) fn forward_guest_record(code: i32, text: &str) {
    let level = level_from_code(code).unwrap_or(Level::Info);
    log::log!(target: "guest", level, "{}", text);
}

pub(crate) fn forward_guest_output(fd: i32, bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines().filter(|l| !l.is_empty()) {
        if fd == 2 {
            log::warn!(target: "guest::stderr", "{}", line);
        } else {
            log::info!(target: "guest::stdout", "{}", line);
        }
    }
}

#[cfg(test)]
pub(crate) fn init_test() {
    let _ = env_logger::builder().is_test(true).try_init();
}
