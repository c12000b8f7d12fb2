use tracing::{debug, trace};

use crate::bytecode::{Op, Script, Syscall};
use crate::runtime::host::Host;
use crate::runtime::runtime_error::{
    RuntimeError, division_by_zero, index_out_of_bounds, stack_underflow, type_error,
};
use crate::runtime::serialize::{deserialize, serialize};
use crate::runtime::value::{StackItem, StorageIter, int_to_le};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    pub max_invocation_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: Some(1_000_000),
            max_stack_size: 2048,
            max_invocation_depth: 1024,
        }
    }
}

/// Stack machine that executes assembled scripts against a [`Host`].
///
/// One evaluation stack is shared by every invocation: `CALLA` records a
/// return address and jumps, and the callee leaves its results in place.
pub struct Vm<H: Host> {
    stack: Vec<StackItem>,
    alt: Vec<StackItem>,
    returns: Vec<usize>,
    config: VmConfig,
    steps: usize,
    /// Contracts entered through `System.Contract.Call` and not yet left.
    nested: usize,
    host: H,
}

impl<H: Host> Vm<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, VmConfig::default())
    }

    pub fn with_config(host: H, config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            alt: Vec::new(),
            returns: Vec::new(),
            config,
            steps: 0,
            nested: 0,
            host,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    #[allow(dead_code)]
    pub fn stack(&self) -> &[StackItem] {
        &self.stack
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.alt.clear();
        self.returns.clear();
        self.steps = 0;
        self.nested = 0;
    }

    /// Call `method` with raw `params`, the way a transaction would.
    pub fn invoke(
        &mut self,
        script: &Script,
        method: &str,
        params: Vec<StackItem>,
    ) -> Result<StackItem, RuntimeError> {
        debug!(method, params = params.len(), "invoke");
        let args = StackItem::array(vec![StackItem::bytes(method), StackItem::array(params)]);
        self.run(script, args)
    }

    /// Run a script from offset 0 with `args` as the only stack item and
    /// return what it leaves behind.
    pub fn run(&mut self, script: &Script, args: StackItem) -> Result<StackItem, RuntimeError> {
        self.reset_execution_state();
        self.stack.push(args);
        self.execute(&script.ops)?;
        let result = self
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::new("script returned no result"))?;
        if !self.stack.is_empty() {
            return Err(RuntimeError::new(&format!(
                "script left {} extra items on the stack",
                self.stack.len()
            )));
        }
        Ok(result)
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::new(&format!(
                    "execution step limit exceeded ({})",
                    max
                )));
            }
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeError::new(&format!(
                "stack size limit exceeded ({})",
                self.config.max_stack_size
            )));
        }

        Ok(())
    }

    /// Run `ops` on the current stacks until the outermost `RET` or the end
    /// of the instruction stream.
    pub fn execute(&mut self, ops: &[Op]) -> Result<(), RuntimeError> {
        let mut ip: usize = 0;

        while ip < ops.len() {
            self.check_limits()?;

            match self.step(&ops[ip], ip) {
                Ok(Some(next)) => ip = next,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.annotate(e, ip)),
            }
        }

        Ok(())
    }

    fn annotate(&self, err: RuntimeError, ip: usize) -> RuntimeError {
        self.returns
            .iter()
            .rev()
            .fold(err.at(ip), |err, ret| err.at(ret.saturating_sub(1)))
    }

    /// Execute one op. Returns the next ip, or None to halt.
    fn step(&mut self, op: &Op, ip: usize) -> Result<Option<usize>, RuntimeError> {
        match op {
            // Push
            Op::PushInt(n) => self.push(StackItem::Integer(*n)),
            Op::PushBool(b) => self.push(StackItem::Boolean(*b)),
            Op::PushBytes(b) => self.push(StackItem::ByteString(b.clone())),
            Op::PushNull => self.push(StackItem::Null),
            Op::PushAddr(t) => self.push(StackItem::Pointer(*t)),

            // Stack operations
            Op::Dup => {
                let a = self.peek(0, ip)?;
                self.push(a);
            }
            Op::Drop => {
                self.pop(ip)?;
            }
            Op::Nip => {
                let b = self.pop(ip)?;
                self.pop(ip)?;
                self.push(b);
            }
            Op::Swap => {
                let b = self.pop(ip)?;
                let a = self.pop(ip)?;
                self.push(b);
                self.push(a);
            }
            Op::Over => {
                let a = self.peek(1, ip)?;
                self.push(a);
            }
            Op::Rot => {
                let c = self.pop(ip)?;
                let b = self.pop(ip)?;
                let a = self.pop(ip)?;
                self.push(b);
                self.push(c);
                self.push(a);
            }
            Op::Tuck => {
                let b = self.pop(ip)?;
                let a = self.pop(ip)?;
                self.push(b.clone());
                self.push(a);
                self.push(b);
            }
            Op::Pick => {
                let n = self.pop_index(ip)?;
                let item = self.peek(n, ip)?;
                self.push(item);
            }
            Op::Roll => {
                let n = self.pop_index(ip)?;
                let at = self.depth_index(n, ip)?;
                let item = self.stack.remove(at);
                self.push(item);
            }
            Op::XSwap => {
                let n = self.pop_index(ip)?;
                let at = self.depth_index(n, ip)?;
                let top = self.stack.len() - 1;
                self.stack.swap(at, top);
            }
            Op::XTuck => {
                let n = self.pop_index(ip)?;
                let top = self.peek(0, ip)?;
                if n > self.stack.len() {
                    return Err(stack_underflow(ip));
                }
                let at = self.stack.len() - n;
                self.stack.insert(at, top);
            }
            Op::Reverse3 => self.reverse_top(3, ip)?,
            Op::Reverse4 => self.reverse_top(4, ip)?,
            Op::ReverseN => {
                let n = self.pop_index(ip)?;
                self.reverse_top(n, ip)?;
            }

            // Arithmetic
            Op::Add => self.binary_int(ip, |a, b| a.checked_add(b).ok_or_else(overflow))?,
            Op::Sub => self.binary_int(ip, |a, b| a.checked_sub(b).ok_or_else(overflow))?,
            Op::Mul => self.binary_int(ip, |a, b| a.checked_mul(b).ok_or_else(overflow))?,
            Op::Div => self.binary_int(ip, |a, b| {
                if b == 0 {
                    return Err(division_by_zero());
                }
                a.checked_div(b).ok_or_else(overflow)
            })?,
            Op::Mod => self.binary_int(ip, |a, b| {
                if b == 0 {
                    return Err(division_by_zero());
                }
                a.checked_rem(b).ok_or_else(overflow)
            })?,
            Op::Negate => {
                let a = self.pop_int(ip)?;
                self.push(StackItem::Integer(a.checked_neg().ok_or_else(overflow)?));
            }
            Op::Inc => {
                let a = self.pop_int(ip)?;
                self.push(StackItem::Integer(a.checked_add(1).ok_or_else(overflow)?));
            }
            Op::Dec => {
                let a = self.pop_int(ip)?;
                self.push(StackItem::Integer(a.checked_sub(1).ok_or_else(overflow)?));
            }

            // Comparison and logic
            Op::NumEqual => self.compare(ip, |a, b| a == b)?,
            Op::NumNotEqual => self.compare(ip, |a, b| a != b)?,
            Op::Lt => self.compare(ip, |a, b| a < b)?,
            Op::Gt => self.compare(ip, |a, b| a > b)?,
            Op::Le => self.compare(ip, |a, b| a <= b)?,
            Op::Ge => self.compare(ip, |a, b| a >= b)?,
            Op::BoolAnd => {
                let b = self.pop(ip)?.to_bool();
                let a = self.pop(ip)?.to_bool();
                self.push(StackItem::Boolean(a && b));
            }
            Op::BoolOr => {
                let b = self.pop(ip)?.to_bool();
                let a = self.pop(ip)?.to_bool();
                self.push(StackItem::Boolean(a || b));
            }
            Op::Not => {
                let a = self.pop(ip)?.to_bool();
                self.push(StackItem::Boolean(!a));
            }
            Op::Equal => {
                let b = self.pop(ip)?;
                let a = self.pop(ip)?;
                self.push(StackItem::Boolean(a.vm_equals(&b)));
            }

            // Byte strings
            Op::Cat => {
                let b = self.pop_bytes(ip)?;
                let mut a = self.pop_bytes(ip)?;
                a.extend_from_slice(&b);
                self.push(StackItem::ByteString(a));
            }
            Op::Left => {
                let n = self.pop_index(ip)?;
                let mut bytes = self.pop_bytes(ip)?;
                bytes.truncate(n);
                self.push(StackItem::ByteString(bytes));
            }
            Op::Right => {
                let n = self.pop_index(ip)?;
                let bytes = self.pop_bytes(ip)?;
                let start = bytes.len().saturating_sub(n);
                self.push(StackItem::ByteString(bytes[start..].to_vec()));
            }
            Op::Size => {
                let a = self.pop(ip)?;
                let size = match &a {
                    StackItem::ByteString(b) => b.len(),
                    StackItem::Integer(n) => int_to_le(*n).len(),
                    StackItem::Boolean(_) => 1,
                    StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
                    StackItem::Map(entries) => entries.borrow().len(),
                    other => return Err(type_error("sized item", other)),
                };
                self.push(StackItem::Integer(size as i64));
            }

            // Compound items
            Op::NewArray => {
                let n = self.pop_index(ip)?;
                self.push(StackItem::array(vec![StackItem::Null; n]));
            }
            Op::NewStruct => {
                let n = self.pop_index(ip)?;
                self.push(StackItem::structure(vec![StackItem::Null; n]));
            }
            Op::NewMap => self.push(StackItem::map(Vec::new())),
            Op::Pack | Op::PackStruct => {
                let n = self.pop_index(ip)?;
                if n > self.stack.len() {
                    return Err(stack_underflow(ip));
                }
                let mut items = self.stack.split_off(self.stack.len() - n);
                items.reverse();
                if matches!(op, Op::Pack) {
                    self.push(StackItem::array(items));
                } else {
                    self.push(StackItem::structure(items));
                }
            }
            Op::Unpack => match self.pop(ip)? {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    let items = items.borrow();
                    for item in items.iter().rev() {
                        self.stack.push(item.clone());
                    }
                    self.push(StackItem::Integer(items.len() as i64));
                }
                other => return Err(type_error("array", &other)),
            },
            Op::PickItem => {
                let key = self.pop(ip)?;
                let coll = self.pop(ip)?;
                let item = pick_item(&coll, &key)?;
                self.push(item);
            }
            Op::SetItem => {
                let value = self.pop(ip)?;
                let key = self.pop(ip)?;
                let coll = self.pop(ip)?;
                set_item(&coll, key, value)?;
            }
            Op::Append => {
                let item = self.pop(ip)?;
                match self.pop(ip)? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        items.borrow_mut().push(item)
                    }
                    other => return Err(type_error("array", &other)),
                }
            }
            Op::Remove => {
                let key = self.pop(ip)?;
                match self.pop(ip)? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let mut items = items.borrow_mut();
                        let i = index_of(&key, items.len())?;
                        items.remove(i);
                    }
                    StackItem::Map(entries) => {
                        entries.borrow_mut().retain(|(k, _)| !k.vm_equals(&key));
                    }
                    other => return Err(type_error("collection", &other)),
                }
            }
            Op::HasKey => {
                let key = self.pop(ip)?;
                let found = match self.pop(ip)? {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let i = key.to_int().ok_or_else(|| type_error("integer", &key))?;
                        i >= 0 && (i as usize) < items.borrow().len()
                    }
                    StackItem::Map(entries) => {
                        entries.borrow().iter().any(|(k, _)| k.vm_equals(&key))
                    }
                    StackItem::ByteString(b) => {
                        let i = key.to_int().ok_or_else(|| type_error("integer", &key))?;
                        i >= 0 && (i as usize) < b.len()
                    }
                    other => return Err(type_error("collection", &other)),
                };
                self.push(StackItem::Boolean(found));
            }
            Op::Keys => match self.pop(ip)? {
                StackItem::Map(entries) => {
                    let keys = entries.borrow().iter().map(|(k, _)| k.clone()).collect();
                    self.push(StackItem::array(keys));
                }
                other => return Err(type_error("map", &other)),
            },
            Op::Values => {
                let values = match self.pop(ip)? {
                    StackItem::Map(entries) => {
                        entries.borrow().iter().map(|(_, v)| v.clone()).collect()
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
                    other => return Err(type_error("collection", &other)),
                };
                self.push(StackItem::array(values));
            }
            Op::IsNull => {
                let a = self.pop(ip)?;
                self.push(StackItem::Boolean(a.is_null()));
            }

            // Alternate stack
            Op::ToAlt => {
                let a = self.pop(ip)?;
                self.alt.push(a);
            }
            Op::FromAlt => {
                let a = self
                    .alt
                    .pop()
                    .ok_or_else(|| RuntimeError::new("alt stack underflow"))?;
                self.push(a);
            }
            Op::DupFromAlt => {
                let a = self
                    .alt
                    .last()
                    .cloned()
                    .ok_or_else(|| RuntimeError::new("alt stack underflow"))?;
                self.push(a);
            }

            // Control
            Op::Jmp(t) => return Ok(Some(*t as usize)),
            Op::JmpIf(t) => {
                if self.pop(ip)?.to_bool() {
                    return Ok(Some(*t as usize));
                }
            }
            Op::JmpIfNot(t) => {
                if !self.pop(ip)?.to_bool() {
                    return Ok(Some(*t as usize));
                }
            }
            Op::CallA => {
                let target = match self.pop(ip)? {
                    StackItem::Pointer(t) => t as usize,
                    other => return Err(type_error("pointer", &other)),
                };
                if self.returns.len() >= self.config.max_invocation_depth {
                    return Err(RuntimeError::new(&format!(
                        "invocation depth limit exceeded ({}) - possible infinite recursion",
                        self.config.max_invocation_depth
                    )));
                }
                self.returns.push(ip + 1);
                return Ok(Some(target));
            }
            Op::Ret => {
                return Ok(self.returns.pop());
            }
            Op::Throw => {
                let value = self.pop(ip)?;
                return Err(RuntimeError::thrown(value));
            }
            Op::Syscall(call) => self.syscall(*call, ip)?,
        }

        Ok(Some(ip + 1))
    }

    fn syscall(&mut self, call: Syscall, ip: usize) -> Result<(), RuntimeError> {
        trace!(syscall = call.name(), ip, "syscall");
        match call {
            Syscall::GetTrigger => {
                let trigger = self.host.trigger();
                self.push(StackItem::Integer(trigger));
            }
            Syscall::StorageGet => {
                let key = self.pop_bytes(ip)?;
                let value = self.host.storage_get(&key).unwrap_or_default();
                self.push(StackItem::ByteString(value));
            }
            Syscall::StoragePut => {
                let value = self.pop_bytes(ip)?;
                let key = self.pop_bytes(ip)?;
                self.host.storage_put(&key, &value);
            }
            Syscall::StorageDelete => {
                let key = self.pop_bytes(ip)?;
                self.host.storage_delete(&key);
            }
            Syscall::StorageFind => {
                let prefix = self.pop_bytes(ip)?;
                let entries = self.host.storage_find(&prefix);
                self.push(StackItem::Interop(Rc::new(RefCell::new(StorageIter::new(
                    entries,
                )))));
            }
            Syscall::IteratorNext => {
                let iter = self.pop_iter(ip)?;
                let more = iter.borrow_mut().advance();
                self.push(StackItem::Boolean(more));
            }
            Syscall::IteratorKey | Syscall::IteratorValue => {
                let iter = self.pop_iter(ip)?;
                let (key, value) = iter
                    .borrow()
                    .current()
                    .cloned()
                    .ok_or_else(|| RuntimeError::new("iterator has no current entry"))?;
                let item = if call == Syscall::IteratorKey { key } else { value };
                self.push(StackItem::ByteString(item));
            }
            Syscall::Serialize => {
                let item = self.pop(ip)?;
                let bytes = serialize(&item)?;
                self.push(StackItem::ByteString(bytes));
            }
            Syscall::Deserialize => {
                let bytes = self.pop_bytes(ip)?;
                let item = deserialize(&bytes)?;
                self.push(item);
            }
            Syscall::Notify => {
                let state = self.pop(ip)?;
                self.host.notify(state);
            }
            Syscall::Log => {
                let message = self.pop_bytes(ip)?;
                self.host.log(&message);
            }
            Syscall::CheckWitness => {
                let hash = self.pop_bytes(ip)?;
                let ok = self.host.check_witness(&hash);
                self.push(StackItem::Boolean(ok));
            }
            Syscall::GetTime => {
                let time = self.host.time();
                self.push(StackItem::Integer(time));
            }
            Syscall::GetHeight => {
                let height = self.host.height();
                self.push(StackItem::Integer(height));
            }
            Syscall::GetScriptContainer => {
                let hash = self.host.transaction_hash();
                self.push(StackItem::array(vec![StackItem::ByteString(hash)]));
            }
            Syscall::GetBlock => {
                let height = self.pop_int(ip)?;
                let block = match self.host.block_hash(height) {
                    Some(hash) => StackItem::array(vec![
                        StackItem::ByteString(hash),
                        StackItem::Integer(height),
                    ]),
                    None => StackItem::Null,
                };
                self.push(block);
            }
            Syscall::GetAccount => {
                let hash = self.pop_bytes(ip)?;
                self.push(StackItem::array(vec![StackItem::ByteString(hash)]));
            }
            Syscall::Migrate => {
                let script = self.pop_bytes(ip)?;
                let ok = self.host.migrate(&script);
                self.push(StackItem::Boolean(ok));
            }
            Syscall::ContractCall => {
                let params = self.pop(ip)?;
                let method = self.pop_bytes(ip)?;
                let hash = self.pop_bytes(ip)?;
                let result = self.call_contract(&hash, method, params)?;
                self.push(result);
            }
        }
        Ok(())
    }

    /// Run the contract deployed under `hash` on fresh stacks, as if invoked
    /// with `method` and `params`, and return its single result. A fault in
    /// the callee faults the caller.
    fn call_contract(
        &mut self,
        hash: &[u8],
        method: Vec<u8>,
        params: StackItem,
    ) -> Result<StackItem, RuntimeError> {
        let script = self.host.contract(hash).ok_or_else(|| {
            RuntimeError::new(&format!("no contract deployed at {}", hex(hash)))
        })?;
        if self.nested >= self.config.max_invocation_depth {
            return Err(RuntimeError::new(&format!(
                "invocation depth limit exceeded ({})",
                self.config.max_invocation_depth
            )));
        }
        debug!(
            contract = %hex(hash),
            method = %String::from_utf8_lossy(&method),
            "contract call"
        );

        let stack = std::mem::take(&mut self.stack);
        let alt = std::mem::take(&mut self.alt);
        let returns = std::mem::take(&mut self.returns);
        self.stack
            .push(StackItem::array(vec![StackItem::ByteString(method), params]));
        self.nested += 1;
        self.host.enter_contract(hash);

        let outcome = self.execute(&script.ops).and_then(|()| {
            let result = self
                .stack
                .pop()
                .ok_or_else(|| RuntimeError::new("called contract returned no result"))?;
            if !self.stack.is_empty() {
                return Err(RuntimeError::new(&format!(
                    "called contract left {} extra items on the stack",
                    self.stack.len()
                )));
            }
            Ok(result)
        });

        self.host.leave_contract();
        self.nested -= 1;
        self.stack = stack;
        self.alt = alt;
        self.returns = returns;
        outcome
    }

    // Stack operations

    fn push(&mut self, item: StackItem) {
        self.stack.push(item);
    }

    fn pop(&mut self, ip: usize) -> Result<StackItem, RuntimeError> {
        self.stack.pop().ok_or_else(|| stack_underflow(ip))
    }

    /// Vector index of the item `n` below the top.
    fn depth_index(&self, n: usize, ip: usize) -> Result<usize, RuntimeError> {
        self.stack
            .len()
            .checked_sub(n + 1)
            .ok_or_else(|| stack_underflow(ip))
    }

    fn peek(&self, n: usize, ip: usize) -> Result<StackItem, RuntimeError> {
        let at = self.depth_index(n, ip)?;
        Ok(self.stack[at].clone())
    }

    fn reverse_top(&mut self, n: usize, ip: usize) -> Result<(), RuntimeError> {
        if n > self.stack.len() {
            return Err(stack_underflow(ip));
        }
        let len = self.stack.len();
        self.stack[len - n..].reverse();
        Ok(())
    }

    fn pop_int(&mut self, ip: usize) -> Result<i64, RuntimeError> {
        let item = self.pop(ip)?;
        item.to_int().ok_or_else(|| type_error("integer", &item))
    }

    fn pop_index(&mut self, ip: usize) -> Result<usize, RuntimeError> {
        let n = self.pop_int(ip)?;
        usize::try_from(n).map_err(|_| RuntimeError::new(&format!("negative count {}", n)))
    }

    fn pop_bytes(&mut self, ip: usize) -> Result<Vec<u8>, RuntimeError> {
        let item = self.pop(ip)?;
        item.to_bytes().ok_or_else(|| type_error("byte string", &item))
    }

    fn pop_iter(&mut self, ip: usize) -> Result<Rc<RefCell<StorageIter>>, RuntimeError> {
        match self.pop(ip)? {
            StackItem::Interop(iter) => Ok(iter),
            other => Err(type_error("iterator", &other)),
        }
    }

    fn binary_int(
        &mut self,
        ip: usize,
        f: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let b = self.pop_int(ip)?;
        let a = self.pop_int(ip)?;
        self.push(StackItem::Integer(f(a, b)?));
        Ok(())
    }

    fn compare(&mut self, ip: usize, f: impl Fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop_int(ip)?;
        let a = self.pop_int(ip)?;
        self.push(StackItem::Boolean(f(a, b)));
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn overflow() -> RuntimeError {
    RuntimeError::new("integer overflow")
}

fn index_of(key: &StackItem, len: usize) -> Result<usize, RuntimeError> {
    let i = key.to_int().ok_or_else(|| type_error("integer", key))?;
    if i < 0 || i as usize >= len {
        return Err(index_out_of_bounds(i, len));
    }
    Ok(i as usize)
}

fn pick_item(coll: &StackItem, key: &StackItem) -> Result<StackItem, RuntimeError> {
    match coll {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let items = items.borrow();
            let i = index_of(key, items.len())?;
            Ok(items[i].clone())
        }
        StackItem::Map(entries) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k.vm_equals(key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RuntimeError::new(&format!("key {} not found in map", key))),
        StackItem::ByteString(bytes) => {
            let i = index_of(key, bytes.len())?;
            Ok(StackItem::Integer(bytes[i] as i64))
        }
        other => Err(type_error("collection", other)),
    }
}

fn set_item(coll: &StackItem, key: StackItem, value: StackItem) -> Result<(), RuntimeError> {
    match coll {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let mut items = items.borrow_mut();
            let i = index_of(&key, items.len())?;
            items[i] = value;
            Ok(())
        }
        StackItem::Map(entries) => {
            if !key.is_key() {
                return Err(type_error("primitive map key", &key));
            }
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| k.vm_equals(&key)) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
            Ok(())
        }
        other => Err(type_error("collection", other)),
    }
}
