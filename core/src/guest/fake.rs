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

//! In-process stand-in for the guest module.
//!
//! Implements every entry point over a tiny object heap so the bridge can be
//! exercised without a compiled engine. Scripts are canned: each source text
//! maps to a closure that manipulates the heap the way the script would.
//! Callbacks into the host go through the real import handlers.

use crate::codec::{self, Wire};
use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::error::{BridgeError, Result};
use crate::guest::{EntryPoint, Guest};
use crate::imports;
use crate::memory::{self, MemoryRegion};
use crate::runtime::Runtime;
use crate::state::HostState;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

const RUNTIME: u64 = 0xa000;
const FIRST_CONTEXT: u64 = 0xc000;
const FIRST_HANDLE: u64 = 0x10_0000;
const EVAL_STACK: &str = "    at <eval>";

/// A script-side value.
#[derive(Debug, Clone, PartialEq)]
pub enum FVal {
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    Ref(usize),
}

type ScriptFn = Rc<dyn Fn(&mut FakeGuest, u64) -> std::result::Result<FVal, String>>;
type NativeFn = Rc<dyn Fn(&mut FakeGuest, u64, Vec<FVal>) -> std::result::Result<FVal, String>>;
type Outcome = std::result::Result<FVal, FVal>;
type Reaction = Box<dyn FnOnce(&mut FakeGuest, Outcome) -> std::result::Result<(), String>>;
type Job = Box<dyn FnOnce(&mut FakeGuest) -> std::result::Result<(), String>>;

enum Item {
    Object(Vec<(String, FVal)>),
    Array(Vec<FVal>),
    Function { name: String, body: NativeFn },
    HostFn { context: u64, index: u32 },
    Error { message: String, stack: String },
    Promise {
        outcome: Option<Outcome>,
        reactions: Vec<Reaction>,
        /// `(handle, future index)` once the host knows about it.
        paired: Option<(u64, u32)>,
    },
}

/// Everything the tests observe about guest-side effects.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub live: BTreeMap<u32, u32>,
    pub resolve_calls: usize,
    pub reject_calls: usize,
    pub minted_handles: Vec<u64>,
    pub closed_handles: Vec<u64>,
    pub closed_contexts: Vec<u64>,
    pub runtime_closes: usize,
    pub memory_limits: Vec<u64>,
    pub log_level: Option<u64>,
}

impl FakeStats {
    pub fn leaked_allocations(&self) -> usize {
        self.live.len()
    }
}

pub struct FakeGuest {
    state: HostState,
    stats: Rc<RefCell<FakeStats>>,
    memory: Vec<u8>,
    next_ptr: u32,
    heap: Vec<Item>,
    handles: HashMap<u64, usize>,
    next_handle: u64,
    globals: HashMap<u64, HashMap<String, FVal>>,
    next_context: u64,
    scripts: HashMap<String, ScriptFn>,
    jobs: VecDeque<Job>,
    failing_settlements: usize,
}

/// Runtime plus one context over `fake`, with its stats kept for inspection.
pub fn boot(fake: FakeGuest) -> (Runtime, Context, Rc<RefCell<FakeStats>>) {
    boot_with(fake, RuntimeConfig::new())
}

pub fn boot_with(
    fake: FakeGuest,
    config: RuntimeConfig,
) -> (Runtime, Context, Rc<RefCell<FakeStats>>) {
    let stats = fake.stats();
    let runtime = Runtime::with_guest(fake, config).expect("fake runtime boots");
    let context = runtime.create_context().expect("fake context opens");
    (runtime, context, stats)
}

impl FakeGuest {
    pub fn new() -> Self {
        Self {
            state: HostState::default(),
            stats: Rc::new(RefCell::new(FakeStats::default())),
            memory: vec![0; 8],
            next_ptr: 8,
            heap: Vec::new(),
            handles: HashMap::new(),
            next_handle: FIRST_HANDLE,
            globals: HashMap::new(),
            next_context: FIRST_CONTEXT,
            scripts: HashMap::new(),
            jobs: VecDeque::new(),
            failing_settlements: 0,
        }
    }

    /// Make the next `count` promise settlements from the host fail.
    pub fn fail_settlements(&mut self, count: usize) {
        self.failing_settlements = count;
    }

    pub fn stats(&self) -> Rc<RefCell<FakeStats>> {
        Rc::clone(&self.stats)
    }

    pub fn live_allocations(&self) -> usize {
        self.stats.borrow().live.len()
    }

    /// Register the behaviour of `src` when it is evaluated.
    pub fn script(
        &mut self,
        src: &str,
        body: impl Fn(&mut FakeGuest, u64) -> std::result::Result<FVal, String> + 'static,
    ) {
        self.scripts.insert(src.to_string(), Rc::new(body));
    }

    // -------------------------------------------------------------------------
    // Heap
    // -------------------------------------------------------------------------

    fn push_item(&mut self, item: Item) -> usize {
        self.heap.push(item);
        self.heap.len() - 1
    }

    fn alloc_item(&mut self, item: Item) -> FVal {
        FVal::Ref(self.push_item(item))
    }

    fn item(&self, value: &FVal) -> Option<&Item> {
        match value {
            FVal::Ref(id) => self.heap.get(*id),
            _ => None,
        }
    }

    fn item_mut(&mut self, value: &FVal) -> Option<&mut Item> {
        match value {
            FVal::Ref(id) => self.heap.get_mut(*id),
            _ => None,
        }
    }

    pub fn new_object(&mut self, entries: Vec<(&str, FVal)>) -> FVal {
        let props = entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.alloc_item(Item::Object(props))
    }

    pub fn new_array(&mut self, items: Vec<FVal>) -> FVal {
        self.alloc_item(Item::Array(items))
    }

    pub fn new_function(
        &mut self,
        name: &str,
        body: impl Fn(&mut FakeGuest, u64, Vec<FVal>) -> std::result::Result<FVal, String> + 'static,
    ) -> FVal {
        self.alloc_item(Item::Function {
            name: name.to_string(),
            body: Rc::new(body),
        })
    }

    pub fn new_promise(&mut self) -> FVal {
        self.alloc_item(Item::Promise {
            outcome: None,
            reactions: Vec::new(),
            paired: None,
        })
    }

    pub fn global(&self, ctx: u64, name: &str) -> FVal {
        self.globals
            .get(&ctx)
            .and_then(|g| g.get(name))
            .cloned()
            .unwrap_or(FVal::Undefined)
    }

    pub fn set_global(&mut self, ctx: u64, name: &str, value: FVal) {
        self.globals
            .entry(ctx)
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn property(&self, object: &FVal, key: &str) -> FVal {
        match self.item(object) {
            Some(Item::Object(props)) => props
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(FVal::Undefined),
            _ => FVal::Undefined,
        }
    }

    pub fn set_property(&mut self, object: &FVal, key: &str, value: FVal) {
        if let Some(Item::Object(props)) = self.item_mut(object) {
            match props.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => props.push((key.to_string(), value)),
            }
        }
    }

    fn remove_property(&mut self, object: &FVal, key: &str) -> bool {
        if let Some(Item::Object(props)) = self.item_mut(object) {
            let before = props.len();
            props.retain(|(k, _)| k != key);
            return props.len() != before;
        }
        false
    }

    pub fn push_element(&mut self, array: &FVal, value: FVal) {
        if let Some(Item::Array(items)) = self.item_mut(array) {
            items.push(value);
        }
    }

    pub fn array_len(&self, array: &FVal) -> usize {
        match self.item(array) {
            Some(Item::Array(items)) => items.len(),
            _ => 0,
        }
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    pub fn call_fn(
        &mut self,
        ctx: u64,
        callee: &FVal,
        args: Vec<FVal>,
    ) -> std::result::Result<FVal, String> {
        match self.item(callee) {
            Some(Item::Function { body, .. }) => {
                let body = Rc::clone(body);
                body(self, ctx, args)
            }
            Some(Item::HostFn { context, index }) => {
                let (context, index) = (*context, *index);
                self.call_host(context, index, args)
            }
            _ => Err("TypeError: not a function".to_string()),
        }
    }

    fn call_host(
        &mut self,
        context: u64,
        index: u32,
        args: Vec<FVal>,
    ) -> std::result::Result<FVal, String> {
        let wire = Wire::Array(args.iter().map(|a| self.to_wire(context, a)).collect());
        let bytes = codec::to_bytes(&wire).map_err(|e| e.to_string())?;
        let region = memory::write(self, &bytes).map_err(|e| e.to_string())?;
        let packed = imports::invoke_host_callable(self, context, index, region.ptr, region.len);
        memory::free(self, region).map_err(|e| e.to_string())?;
        if packed == 0 {
            return Err("InternalError: host call failed".to_string());
        }
        let reply = memory::take(self, MemoryRegion::unpack(packed)).map_err(|e| e.to_string())?;
        match codec::from_bytes(&reply).map_err(|e| e.to_string())? {
            Wire::Exception(message, _) => Err(message),
            other => self.from_wire(other),
        }
    }

    fn run_script(&mut self, ctx: u64, src: &str) -> std::result::Result<FVal, String> {
        let body = self
            .scripts
            .get(src)
            .cloned()
            .ok_or_else(|| format!("SyntaxError: unknown script {:?}", src))?;
        body(self, ctx)
    }

    /// Busy-wait like a runaway loop, checking for interrupts the way the
    /// engine's interrupt handler does.
    pub fn spin_until_interrupted(&mut self) -> std::result::Result<FVal, String> {
        let start = Instant::now();
        loop {
            if imports::interrupt_poll(self) == 1 {
                return Err("InternalError: interrupted".to_string());
            }
            if start.elapsed() > Duration::from_secs(5) {
                return Err("InternalError: spun for too long".to_string());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn log(&mut self, level: i32, text: &str) {
        if let Ok(region) = memory::write(self, text.as_bytes()) {
            imports::log(self, level, region.ptr, region.len);
            let _ = memory::free(self, region);
        }
    }

    // -------------------------------------------------------------------------
    // Promises
    // -------------------------------------------------------------------------

    pub fn then(
        &mut self,
        promise: &FVal,
        reaction: impl FnOnce(&mut FakeGuest, Outcome) -> std::result::Result<(), String> + 'static,
    ) {
        let FVal::Ref(id) = promise else {
            return;
        };
        let Some(Item::Promise { outcome, reactions, .. }) = self.heap.get_mut(*id) else {
            return;
        };
        match outcome.clone() {
            Some(settled) => self
                .jobs
                .push_back(Box::new(move |g: &mut FakeGuest| reaction(g, settled))),
            None => reactions.push(Box::new(reaction)),
        }
    }

    /// Settle a pending promise and queue its reactions. Later calls are ignored.
    pub fn resolve_promise(&mut self, promise: &FVal, settled: Outcome) {
        let FVal::Ref(id) = promise else {
            return;
        };
        let Some(Item::Promise { outcome, reactions, .. }) = self.heap.get_mut(*id) else {
            return;
        };
        if outcome.is_some() {
            return;
        }
        *outcome = Some(settled.clone());
        for reaction in std::mem::take(reactions) {
            let settled = settled.clone();
            self.jobs
                .push_back(Box::new(move |g: &mut FakeGuest| reaction(g, settled)));
        }
    }

    /// Report a guest-side settlement to the paired host future.
    fn notify_host(&mut self, ctx: u64, index: u32, settled: Outcome) -> std::result::Result<(), String> {
        let (rejected, value) = match settled {
            Ok(v) => (0, v),
            Err(v) => (1, v),
        };
        let wire = self.to_wire(ctx, &value);
        let bytes = codec::to_bytes(&wire).map_err(|e| e.to_string())?;
        let region = memory::write(self, &bytes).map_err(|e| e.to_string())?;
        let status =
            imports::settle_paired_future(self, ctx, index, rejected, region.ptr, region.len);
        memory::free(self, region).map_err(|e| e.to_string())?;
        if status < 0 {
            return Err(format!("host refused settlement of future {}", index));
        }
        Ok(())
    }

    fn poll_jobs(&mut self) -> i64 {
        let batch: Vec<Job> = self.jobs.drain(..).collect();
        for job in batch {
            if let Err(e) = job(self) {
                log::warn!("fake job failed: {}", e);
                return -1;
            }
        }
        if self.jobs.is_empty() {
            0
        } else {
            1
        }
    }

    // -------------------------------------------------------------------------
    // Wire conversion
    // -------------------------------------------------------------------------

    fn mint(&mut self, id: usize) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 0x10;
        self.handles.insert(handle, id);
        self.stats.borrow_mut().minted_handles.push(handle);
        handle
    }

    fn close_handle(&mut self, handle: u64) {
        self.handles.remove(&handle);
        self.stats.borrow_mut().closed_handles.push(handle);
    }

    fn lookup(&self, handle: u64) -> std::result::Result<FVal, String> {
        self.handles
            .get(&handle)
            .map(|id| FVal::Ref(*id))
            .ok_or_else(|| format!("ReferenceError: stale handle {:#x}", handle))
    }

    fn to_wire(&mut self, ctx: u64, value: &FVal) -> Wire {
        let id = match value {
            FVal::Undefined => return Wire::Undefined,
            FVal::Null => return Wire::Null,
            FVal::Bool(b) => return Wire::Boolean(*b),
            FVal::Int(i) => return Wire::Int(*i),
            FVal::Float(f) => return Wire::Float(*f),
            FVal::Str(s) => return Wire::String(s.clone()),
            FVal::Ref(id) => *id,
        };
        match &self.heap[id] {
            Item::Object(_) => Wire::NativeObject(self.mint(id)),
            Item::Array(_) => Wire::NativeArray(self.mint(id)),
            Item::Function { name, .. } => {
                let name = name.clone();
                Wire::Function(name, self.mint(id))
            }
            Item::HostFn { .. } => Wire::Function(String::new(), self.mint(id)),
            Item::Error { message, stack } => Wire::Exception(message.clone(), stack.clone()),
            Item::Promise {
                paired: Some((handle, index)),
                ..
            } => Wire::Future(*index, *handle),
            Item::Promise { paired: None, .. } => self.pair_promise(ctx, id),
        }
    }

    /// First crossing of a script promise: ask the host for a future and
    /// report the settlement back to it.
    fn pair_promise(&mut self, ctx: u64, id: usize) -> Wire {
        let handle = self.mint(id);
        let index = imports::create_paired_future(self, ctx, handle);
        if index < 0 {
            return Wire::Exception("InternalError: promise pairing failed".to_string(), String::new());
        }
        let index = index as u32;
        if let Some(Item::Promise { paired, .. }) = self.heap.get_mut(id) {
            *paired = Some((handle, index));
        }
        self.then(&FVal::Ref(id), move |g, settled| g.notify_host(ctx, index, settled));
        Wire::Future(index, handle)
    }

    fn from_wire(&mut self, wire: Wire) -> std::result::Result<FVal, String> {
        Ok(match wire {
            Wire::Null => FVal::Null,
            Wire::Undefined => FVal::Undefined,
            Wire::String(s) => FVal::Str(s),
            Wire::Int(i) => FVal::Int(i),
            Wire::Float(f) => FVal::Float(f),
            Wire::Boolean(b) => FVal::Bool(b),
            Wire::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|w| self.from_wire(w))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                self.alloc_item(Item::Array(items))
            }
            Wire::Object(map) => {
                let mut props = Vec::with_capacity(map.len());
                for (k, w) in map {
                    props.push((k, self.from_wire(w)?));
                }
                self.alloc_item(Item::Object(props))
            }
            Wire::NativeArray(h) | Wire::NativeObject(h) | Wire::Function(_, h) | Wire::Future(_, h) => {
                self.lookup(h)?
            }
            Wire::HostFunction(context, index) => self.alloc_item(Item::HostFn { context, index }),
            Wire::Exception(message, stack) => self.alloc_item(Item::Error { message, stack }),
        })
    }

    /// Argument lists arrive as a wire array; anything else is one argument.
    fn args_from_wire(&mut self, wire: Wire) -> std::result::Result<Vec<FVal>, String> {
        match wire {
            Wire::Array(items) => items.into_iter().map(|w| self.from_wire(w)).collect(),
            other => Ok(vec![self.from_wire(other)?]),
        }
    }

    // -------------------------------------------------------------------------
    // Entry point plumbing
    // -------------------------------------------------------------------------

    fn read_wire(&mut self, ptr: u64, len: u64) -> std::result::Result<Wire, String> {
        let bytes = self.read(ptr as u32, len as u32).map_err(|e| e.to_string())?;
        codec::from_bytes(&bytes).map_err(|e| e.to_string())
    }

    fn read_value(&mut self, ptr: u64, len: u64) -> std::result::Result<FVal, String> {
        let wire = self.read_wire(ptr, len)?;
        self.from_wire(wire)
    }

    fn read_text(&mut self, ptr: u64, len: u64) -> std::result::Result<String, String> {
        let bytes = self.read(ptr as u32, len as u32).map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }

    fn read_key(&mut self, ptr: u64, len: u64) -> std::result::Result<String, String> {
        match self.read_wire(ptr, len)? {
            Wire::String(s) => Ok(s),
            Wire::Int(i) => Ok(i.to_string()),
            other => Err(format!("TypeError: bad property key {:?}", other)),
        }
    }

    /// Encode a completion into freshly allocated memory and pack it.
    fn reply(&mut self, ctx: u64, result: std::result::Result<FVal, String>) -> std::result::Result<u64, String> {
        let wire = match result {
            Ok(value) => self.to_wire(ctx, &value),
            Err(message) => Wire::Exception(message, EVAL_STACK.to_string()),
        };
        self.reply_wire(&wire)
    }

    fn reply_wire(&mut self, wire: &Wire) -> std::result::Result<u64, String> {
        let bytes = codec::to_bytes(wire).map_err(|e| e.to_string())?;
        let ptr = self.alloc_bytes(bytes.len() as u32);
        self.write(ptr, &bytes).map_err(|e| e.to_string())?;
        Ok(MemoryRegion::new(ptr, bytes.len() as u32).pack())
    }

    fn flag(ok: bool) -> u64 {
        u64::from(ok)
    }

    fn invoke_path(&mut self, ctx: u64, path: &str, args: Vec<FVal>) -> std::result::Result<FVal, String> {
        let mut segments = path.split('.');
        let mut target = self.global(ctx, segments.next().unwrap_or_default());
        for segment in segments {
            target = self.property(&target, segment);
        }
        match self.item(&target) {
            Some(Item::Function { .. }) | Some(Item::HostFn { .. }) => self.call_fn(ctx, &target, args),
            _ => Err(format!("TypeError: {} is not a function", path)),
        }
    }

    fn alloc_bytes(&mut self, len: u32) -> u32 {
        let ptr = self.next_ptr;
        self.next_ptr += (len.max(1) + 7) & !7;
        self.memory.resize(self.next_ptr as usize, 0);
        self.stats.borrow_mut().live.insert(ptr, len);
        ptr
    }

    fn dispatch(&mut self, entry: EntryPoint, args: &[u64]) -> std::result::Result<u64, String> {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        let ctx = arg(0);
        match entry {
            EntryPoint::Alloc => Ok(self.alloc_bytes(arg(0) as u32) as u64),
            EntryPoint::Dealloc => {
                let ptr = arg(0) as u32;
                match self.stats.borrow_mut().live.remove(&ptr) {
                    Some(_) => Ok(0),
                    None => Err(format!("dealloc of unknown pointer {:#x}", ptr)),
                }
            }
            EntryPoint::CreateRuntime => Ok(RUNTIME),
            EntryPoint::CloseRuntime => {
                self.stats.borrow_mut().runtime_closes += 1;
                Ok(0)
            }
            EntryPoint::SetMemoryLimit => {
                self.stats.borrow_mut().memory_limits.push(arg(1));
                Ok(0)
            }
            EntryPoint::InitLogger => {
                self.stats.borrow_mut().log_level = Some(arg(0));
                Ok(0)
            }
            EntryPoint::PollJobs => Ok(self.poll_jobs() as u64),
            EntryPoint::CreateContext => {
                let native = self.next_context;
                self.next_context += 1;
                self.globals.insert(native, HashMap::new());
                Ok(native)
            }
            EntryPoint::CloseContext => {
                self.globals.remove(&ctx);
                self.stats.borrow_mut().closed_contexts.push(ctx);
                Ok(0)
            }
            EntryPoint::EvalScript => {
                let src = self.read_text(arg(1), arg(2))?;
                let result = self.run_script(ctx, &src);
                self.reply(ctx, result)
            }
            EntryPoint::EvalScriptAsync => {
                let src = self.read_text(arg(1), arg(2))?;
                let result = self.run_script(ctx, &src);
                let promise = match result {
                    Ok(value) if matches!(self.item(&value), Some(Item::Promise { .. })) => value,
                    Ok(value) => {
                        let promise = self.new_promise();
                        self.resolve_promise(&promise, Ok(value));
                        promise
                    }
                    Err(message) => {
                        let promise = self.new_promise();
                        self.resolve_promise(&promise, Err(FVal::Str(message)));
                        promise
                    }
                };
                self.reply(ctx, Ok(promise))
            }
            EntryPoint::SetGlobal => {
                let name = self.read_text(arg(1), arg(2))?;
                let value = self.read_value(arg(3), arg(4))?;
                self.set_global(ctx, &name, value);
                self.reply(ctx, Ok(FVal::Undefined))
            }
            EntryPoint::GetGlobal => {
                let name = self.read_text(arg(1), arg(2))?;
                let value = self.global(ctx, &name);
                self.reply(ctx, Ok(value))
            }
            EntryPoint::Invoke => {
                let path = self.read_text(arg(1), arg(2))?;
                let wire = self.read_wire(arg(3), arg(4))?;
                let call_args = self.args_from_wire(wire)?;
                let result = self.invoke_path(ctx, &path, call_args);
                self.reply(ctx, result)
            }
            EntryPoint::ArrayCreate => {
                let id = self.push_item(Item::Array(Vec::new()));
                Ok(self.mint(id))
            }
            EntryPoint::ObjectCreate => {
                let id = self.push_item(Item::Object(Vec::new()));
                Ok(self.mint(id))
            }
            EntryPoint::ArrayClose
            | EntryPoint::ObjectClose
            | EntryPoint::FunctionClose
            | EntryPoint::PromiseClose => {
                self.close_handle(arg(1));
                Ok(0)
            }
            EntryPoint::ArraySize => {
                let array = self.lookup(arg(1))?;
                match self.item(&array) {
                    Some(Item::Array(items)) => Ok(items.len() as u64),
                    _ => Ok(-1i64 as u64),
                }
            }
            EntryPoint::ArrayGet => {
                let array = self.lookup(arg(1))?;
                let value = match self.item(&array) {
                    Some(Item::Array(items)) => items.get(arg(2) as usize).cloned(),
                    _ => None,
                };
                self.reply(ctx, Ok(value.unwrap_or(FVal::Undefined)))
            }
            EntryPoint::ArraySet | EntryPoint::ArrayAdd => {
                let array = self.lookup(arg(1))?;
                let index = arg(2) as usize;
                let value = self.read_value(arg(3), arg(4))?;
                let Some(Item::Array(items)) = self.item_mut(&array) else {
                    return Ok(Self::flag(false));
                };
                if entry == EntryPoint::ArraySet && index < items.len() {
                    items[index] = value;
                    Ok(Self::flag(true))
                } else if entry == EntryPoint::ArrayAdd && index <= items.len() {
                    items.insert(index, value);
                    Ok(Self::flag(true))
                } else {
                    Ok(Self::flag(false))
                }
            }
            EntryPoint::ArrayRemove => {
                let array = self.lookup(arg(1))?;
                let index = arg(2) as usize;
                match self.item_mut(&array) {
                    Some(Item::Array(items)) if index < items.len() => {
                        items.remove(index);
                        Ok(Self::flag(true))
                    }
                    _ => Ok(Self::flag(false)),
                }
            }
            EntryPoint::ObjectSize => {
                let object = self.lookup(arg(1))?;
                match self.item(&object) {
                    Some(Item::Object(props)) => Ok(props.len() as u64),
                    _ => Ok(-1i64 as u64),
                }
            }
            EntryPoint::ObjectContainsKey => {
                let object = self.lookup(arg(1))?;
                let key = self.read_key(arg(2), arg(3))?;
                let found = match self.item(&object) {
                    Some(Item::Object(props)) => props.iter().any(|(k, _)| *k == key),
                    _ => false,
                };
                Ok(Self::flag(found))
            }
            EntryPoint::ObjectGetValue => {
                let object = self.lookup(arg(1))?;
                let key = self.read_key(arg(2), arg(3))?;
                let value = self.property(&object, &key);
                self.reply(ctx, Ok(value))
            }
            EntryPoint::ObjectSetValue => {
                let object = self.lookup(arg(1))?;
                let key = self.read_key(arg(2), arg(3))?;
                let value = self.read_value(arg(4), arg(5))?;
                let is_object = matches!(self.item(&object), Some(Item::Object(_)));
                self.set_property(&object, &key, value);
                Ok(Self::flag(is_object))
            }
            EntryPoint::ObjectRemoveValue => {
                let object = self.lookup(arg(1))?;
                let key = self.read_key(arg(2), arg(3))?;
                Ok(Self::flag(self.remove_property(&object, &key)))
            }
            EntryPoint::ObjectKeySet => {
                let object = self.lookup(arg(1))?;
                let keys = match self.item(&object) {
                    Some(Item::Object(props)) => {
                        props.iter().map(|(k, _)| Wire::String(k.clone())).collect()
                    }
                    _ => Vec::new(),
                };
                self.reply_wire(&Wire::Array(keys))
            }
            EntryPoint::FunctionCall => {
                let callee = self.lookup(arg(1))?;
                let wire = self.read_wire(arg(2), arg(3))?;
                let call_args = self.args_from_wire(wire)?;
                let result = self.call_fn(ctx, &callee, call_args);
                self.reply(ctx, result)
            }
            EntryPoint::PromiseCreate => {
                let id = self.push_item(Item::Promise {
                    outcome: None,
                    reactions: Vec::new(),
                    paired: None,
                });
                let handle = self.mint(id);
                if let Some(Item::Promise { paired, .. }) = self.heap.get_mut(id) {
                    *paired = Some((handle, arg(1) as u32));
                }
                Ok(handle)
            }
            EntryPoint::PromiseResolve | EntryPoint::PromiseReject => {
                if self.failing_settlements > 0 {
                    self.failing_settlements -= 1;
                    return Err(format!("{} failed", entry));
                }
                let Ok(promise) = self.lookup(arg(1)) else {
                    return Ok(Self::flag(false));
                };
                let value = self.read_value(arg(2), arg(3))?;
                let settled = if entry == EntryPoint::PromiseResolve {
                    self.stats.borrow_mut().resolve_calls += 1;
                    Ok(value)
                } else {
                    self.stats.borrow_mut().reject_calls += 1;
                    Err(value)
                };
                self.resolve_promise(&promise, settled);
                Ok(Self::flag(true))
            }
        }
    }
}

impl Guest for FakeGuest {
    fn call(&mut self, entry: EntryPoint, args: &[u64]) -> Result<u64> {
        self.dispatch(entry, args).map_err(|message| BridgeError::Guest {
            entry: entry.name(),
            message,
        })
    }

    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>> {
        let (start, end) = (ptr as usize, ptr as usize + len as usize);
        self.memory
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| BridgeError::trap("memory::read", format!("{:#x}+{} out of bounds", ptr, len)))
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()> {
        let start = ptr as usize;
        match self.memory.get_mut(start..start + bytes.len()) {
            Some(slot) => {
                slot.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(BridgeError::trap(
                "memory::write",
                format!("{:#x}+{} out of bounds", ptr, bytes.len()),
            )),
        }
    }

    fn state(&mut self) -> &mut HostState {
        &mut self.state
    }
}
