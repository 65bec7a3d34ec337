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

use ark_script_bridge::logging;
use ark_script_bridge::{Runtime, RuntimeConfig, Value};
use log::LevelFilter;
use std::env;
use std::fs;
use std::process;

const USAGE: &str = "Usage: ark_script <guest.wasm> <script.js> [--async] [--timeout-ms N] [--memory-limit BYTES] [--config FILE] [--wire]";

struct Options {
    module: String,
    script: String,
    is_async: bool,
    show_wire: bool,
    config: RuntimeConfig,
}

/// Flags may come in any order: the `--config` file is the base and the
/// other flags override it.
fn parse_args(args: &[String]) -> Result<Options, String> {
    if args.len() < 3 {
        return Err(USAGE.to_string());
    }
    let mut is_async = false;
    let mut show_wire = false;
    let mut timeout_ms = None;
    let mut memory_limit = None;
    let mut config_path = None;
    let mut rest = args[3..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--async" => is_async = true,
            "--wire" => show_wire = true,
            "--timeout-ms" => {
                let ms = rest
                    .next()
                    .and_then(|v| v.parse::<i64>().ok())
                    .ok_or("--timeout-ms expects a number")?;
                timeout_ms = Some(ms);
            }
            "--memory-limit" => {
                let bytes = rest
                    .next()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or("--memory-limit expects a byte count")?;
                memory_limit = Some(bytes);
            }
            "--config" => config_path = Some(rest.next().ok_or("--config expects a file")?),
            other => return Err(format!("Unknown option: {}\n{}", other, USAGE)),
        }
    }

    let mut config = match config_path {
        Some(path) => RuntimeConfig::from_file(path).map_err(|e| e.to_string())?,
        None => RuntimeConfig::new(),
    };
    if let Some(ms) = timeout_ms {
        config = config.with_timeout_ms(ms);
    }
    if let Some(bytes) = memory_limit {
        config = config.with_memory_limit(bytes);
    }
    let module = args[1].clone();
    Ok(Options {
        config: config.with_module_path(&module),
        module,
        script: args[2].clone(),
        is_async,
        show_wire,
    })
}

fn run(options: Options) -> Result<Value, String> {
    let source = fs::read_to_string(&options.script)
        .map_err(|e| format!("Failed to read {}: {}", options.script, e))?;

    let runtime = Runtime::new(options.config).map_err(|e| e.to_string())?;
    let interrupt = runtime.interrupt_handle();
    if let Err(e) = ctrlc::set_handler(move || interrupt.interrupt()) {
        log::warn!("Ctrl-C handler not installed: {}", e);
    }

    let context = runtime.create_context().map_err(|e| e.to_string())?;
    let result = context
        .with(|scope| {
            let value = if options.is_async {
                let future = scope.eval_async(&source)?;
                scope.run_until_idle()?;
                match future.result() {
                    Some(outcome) => outcome?,
                    None => Value::Null,
                }
            } else {
                let value = scope.eval(&source)?;
                scope.run_until_idle()?;
                value
            };
            if options.show_wire {
                println!("Wire: {}", hex::encode(scope.encode(&value)?));
            }
            Ok(value)
        })
        .map_err(|e| e.to_string());

    let output = runtime.take_output().unwrap_or_default();
    if !output.is_empty() {
        print!("{}", String::from_utf8_lossy(&output));
    }
    result
}

fn main() {
    logging::init(LevelFilter::Warn);
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    match run(options) {
        Ok(value) => println!("Result: {:?}", value),
        Err(e) => {
            eprintln!("Execution Error: {}", e);
            process::exit(1);
        }
    }
}
