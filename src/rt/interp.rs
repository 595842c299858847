//! The operand-stack interpreter hosting woven code.
//!
//! Deliberately small: suspension works only through the woven
//! save/restore ops and the continuation-stack flag protocol, never
//! through interpreter magic. Calls dispatch in three tiers: the
//! continuation-stack intrinsics, registered host functions, and module
//! procedures (executed by Rust recursion, mirroring the frame chain).
//!
//! The interpreter tracks how many frames on the current chain the weaver
//! never touched; suspension primitives consult that count and fall back
//! to blocking the carrier when a suspension could not be saved.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{Result, WeftError};
use crate::names::Sym;
use crate::proc::{
    ArithOp, CmpOp, Cond, Const, Module, Op, Procedure, ValueKind,
};
use crate::rt::host::{HostCtx, HostRegistry};
use crate::rt::stack::ContStack;
use crate::rt::value::{Obj, Value};
use crate::sched::Strand;
use crate::weave::emit;

/// Shared runtime environment: the module, host registry, static fields,
/// and the monitor table. Safe for concurrent use by all carriers.
#[derive(Debug)]
pub struct RtEnv {
    pub module: Module,
    pub hosts: HostRegistry,
    pub(crate) statics: Mutex<FxHashMap<(Sym, Sym), Value>>,
    pub(crate) monitors: MonitorTable,
}

impl RtEnv {
    pub fn new(module: Module) -> Self {
        RtEnv {
            module,
            hosts: HostRegistry::new(),
            statics: Mutex::new(FxHashMap::default()),
            monitors: MonitorTable::default(),
        }
    }

    /// Read a static field (missing fields read as the lane default).
    pub fn get_static(&self, owner: Sym, field: Sym, kind: ValueKind) -> Value {
        self.statics
            .lock()
            .get(&(owner, field))
            .cloned()
            .unwrap_or_else(|| Value::default_of(kind))
    }

    pub fn set_static(&self, owner: Sym, field: Sym, value: Value) {
        self.statics.lock().insert((owner, field), value);
    }
}

/// Reentrant, carrier-blocking monitors keyed by object identity.
#[derive(Debug, Default)]
pub(crate) struct MonitorTable {
    inner: Mutex<FxHashMap<usize, (u64, u32)>>,
    cv: Condvar,
}

impl MonitorTable {
    fn enter(&self, key: usize, token: u64) {
        let mut held = self.inner.lock();
        loop {
            match held.get_mut(&key) {
                None => {
                    held.insert(key, (token, 1));
                    return;
                }
                Some((owner, count)) if *owner == token => {
                    *count += 1;
                    return;
                }
                Some(_) => self.cv.wait(&mut held),
            }
        }
    }

    fn exit(&self, key: usize, token: u64) -> Result<()> {
        let mut held = self.inner.lock();
        match held.get_mut(&key) {
            Some((owner, count)) if *owner == token => {
                *count -= 1;
                if *count == 0 {
                    held.remove(&key);
                    self.cv.notify_all();
                }
                Ok(())
            }
            _ => Err(WeftError::invalid_procedure(
                "monitorexit without ownership",
            )),
        }
    }
}

/// Monitor-owner token for a carrier with no strand.
fn thread_token() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut h);
    h.finish() | (1 << 63)
}

/// One execution of a continuation: drives procedures against an operand
/// stack, with the continuation stack threaded through for the woven
/// save/restore code.
pub struct Interp<'a> {
    env: &'a RtEnv,
    shelf: &'a mut ContStack,
    strand: Option<&'a Strand>,
    unwoven_depth: u32,
    token: u64,
}

impl<'a> Interp<'a> {
    pub fn new(env: &'a RtEnv, shelf: &'a mut ContStack, strand: Option<&'a Strand>) -> Self {
        let token = strand.map(|s| s.id()).unwrap_or_else(thread_token);
        Interp {
            env,
            shelf,
            strand,
            unwoven_depth: 0,
            token,
        }
    }

    /// Execute one procedure with the given argument values (receiver
    /// first for instance procedures).
    pub fn run(&mut self, proc: &'a Procedure, args: Vec<Value>) -> Result<Option<Value>> {
        if !proc.woven {
            self.unwoven_depth += 1;
        }
        let mut held: Vec<usize> = Vec::new();
        let result = self.exec(proc, args, &mut held);
        if !proc.woven {
            self.unwoven_depth -= 1;
        }
        if result.is_err() {
            // Failure hygiene: release anything this frame still holds.
            for key in held.drain(..).rev() {
                let _ = self.env.monitors.exit(key, self.token);
            }
        }
        result
    }

    fn exec(
        &mut self,
        proc: &'a Procedure,
        args: Vec<Value>,
        held: &mut Vec<usize>,
    ) -> Result<Option<Value>> {
        if args.len() > proc.max_locals as usize {
            return Err(WeftError::invalid_procedure(format!(
                "{} args for {} local slots",
                args.len(),
                proc.max_locals
            )));
        }
        let mut locals = vec![Value::NULL; proc.max_locals as usize];
        for (slot, v) in args.into_iter().enumerate() {
            locals[slot] = v;
        }
        let mut stack: Vec<Value> = Vec::new();
        let labels = proc.label_indices();

        let mut pc = 0usize;
        loop {
            let op = proc.ops.get(pc).ok_or_else(|| {
                WeftError::invalid_procedure(format!("control fell off the end at op {}", pc))
            })?;
            match op {
                Op::Push(c) => stack.push(self.const_value(c)),
                Op::Load { kind, slot } => {
                    let v = locals[*slot as usize].clone();
                    if v.kind() != *kind {
                        return Err(WeftError::kind_mismatch(
                            kind.to_string(),
                            format!("{:?}", v),
                        ));
                    }
                    stack.push(v);
                }
                Op::Store { kind, slot } => {
                    let v = pop(&mut stack, pc)?;
                    if v.kind() != *kind {
                        return Err(WeftError::kind_mismatch(
                            kind.to_string(),
                            format!("{:?}", v),
                        ));
                    }
                    locals[*slot as usize] = v;
                }
                Op::Pop => {
                    pop(&mut stack, pc)?;
                }
                Op::Dup => {
                    let v = stack
                        .last()
                        .cloned()
                        .ok_or(WeftError::StackUnderflow { at: pc })?;
                    stack.push(v);
                }
                Op::Swap => {
                    let n = stack.len();
                    if n < 2 {
                        return Err(WeftError::StackUnderflow { at: pc });
                    }
                    stack.swap(n - 1, n - 2);
                }
                Op::Arith { kind, op } => {
                    let b = pop(&mut stack, pc)?;
                    let a = pop(&mut stack, pc)?;
                    stack.push(arith(*kind, *op, a, b)?);
                }
                Op::Cmp { kind, op } => {
                    let b = pop(&mut stack, pc)?;
                    let a = pop(&mut stack, pc)?;
                    stack.push(Value::Int(compare(*kind, *op, a, b)? as i32));
                }
                Op::GetField { field, kind, .. } => {
                    let obj = pop(&mut stack, pc)?.as_obj(pc)?;
                    stack.push(
                        obj.get_field(*field)
                            .unwrap_or_else(|| Value::default_of(*kind)),
                    );
                }
                Op::PutField { field, .. } => {
                    let v = pop(&mut stack, pc)?;
                    let obj = pop(&mut stack, pc)?.as_obj(pc)?;
                    obj.set_field(*field, v);
                }
                Op::GetStatic { owner, field, kind } => {
                    stack.push(self.env.get_static(*owner, *field, *kind));
                }
                Op::PutStatic { owner, field, .. } => {
                    let v = pop(&mut stack, pc)?;
                    self.env.set_static(*owner, *field, v);
                }
                Op::Jump(target) => {
                    pc = resolve(&labels, *target)?;
                    continue;
                }
                Op::Branch { cond, target } => {
                    let taken = match cond {
                        Cond::IfZero => pop(&mut stack, pc)?.as_int()? == 0,
                        Cond::IfNonZero => pop(&mut stack, pc)?.as_int()? != 0,
                        Cond::IfNull => pop(&mut stack, pc)?.as_ref()?.is_none(),
                        Cond::IfNonNull => pop(&mut stack, pc)?.as_ref()?.is_some(),
                    };
                    if taken {
                        pc = resolve(&labels, *target)?;
                        continue;
                    }
                }
                Op::Switch { targets, default } => {
                    let idx = pop(&mut stack, pc)?.as_int()?;
                    let target = usize::try_from(idx)
                        .ok()
                        .and_then(|i| targets.get(i).copied())
                        .unwrap_or(*default);
                    pc = resolve(&labels, target)?;
                    continue;
                }
                Op::Label(_) => {}
                Op::Call { target, dispatch } => {
                    self.call(*target, *dispatch, &mut stack, pc)?;
                }
                Op::Return(kind) => {
                    return match kind {
                        None => Ok(None),
                        Some(k) => {
                            let v = pop(&mut stack, pc)?;
                            if v.kind() != *k {
                                return Err(WeftError::kind_mismatch(
                                    k.to_string(),
                                    format!("{:?}", v),
                                ));
                            }
                            Ok(Some(v))
                        }
                    };
                }
                Op::Throw => {
                    let obj = pop(&mut stack, pc)?.as_obj(pc)?;
                    let msg = obj
                        .native_as::<String>()
                        .cloned()
                        .or_else(|| self.env.module.names.name(obj.class).map(String::from))
                        .unwrap_or_else(|| "throw".to_string());
                    return Err(WeftError::user_throw(msg));
                }
                Op::MonitorEnter => {
                    let obj = pop(&mut stack, pc)?.as_obj(pc)?;
                    let key = Obj::key(&obj);
                    self.env.monitors.enter(key, self.token);
                    held.push(key);
                }
                Op::MonitorExit => {
                    let obj = pop(&mut stack, pc)?.as_obj(pc)?;
                    let key = Obj::key(&obj);
                    self.env.monitors.exit(key, self.token)?;
                    if let Some(i) = held.iter().rposition(|k| *k == key) {
                        held.remove(i);
                    }
                }
                Op::New { class } => {
                    stack.push(Value::obj(Obj::new(*class)));
                }
            }
            pc += 1;
        }
    }

    fn const_value(&self, c: &Const) -> Value {
        match c {
            Const::Int(v) => Value::Int(*v),
            Const::Float(v) => Value::Float(*v),
            Const::Long(v) => Value::Long(*v),
            Const::Double(v) => Value::Double(*v),
            Const::Str(s) => Value::string(self.env.module.string_class(), s),
            Const::Null => Value::NULL,
        }
    }

    fn call(
        &mut self,
        target: crate::names::MethodId,
        dispatch: crate::proc::DispatchKind,
        stack: &mut Vec<Value>,
        pc: usize,
    ) -> Result<()> {
        if target.owner == self.env.module.rt_owner() {
            return self.intrinsic(target, stack, pc);
        }

        let env = self.env;
        let sig = env
            .module
            .names
            .sig(target.sig)
            .ok_or_else(|| WeftError::invalid_procedure("unknown signature id"))?
            .clone();

        let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(sig.params.len() + 1);
        for _ in 0..sig.params.len() {
            args.push(pop(stack, pc)?);
        }
        args.reverse();

        if dispatch.has_receiver() {
            let recv = pop(stack, pc)?;
            if recv.is_null() {
                return Err(WeftError::NullReference { at: pc });
            }
            args.insert(0, recv);
        }

        if let Some(host) = env.hosts.get(target) {
            let mut ctx = HostCtx {
                shelf: &mut *self.shelf,
                strand: self.strand,
                chain_woven: self.unwoven_depth == 0,
            };
            let ret = host(&mut ctx, &args)?;
            if let Some(kind) = sig.ret {
                stack.push(ret.unwrap_or_else(|| Value::default_of(kind)));
            }
            return Ok(());
        }

        let recv_class = if dispatch.is_overridable() {
            args.first().and_then(|v| match v {
                Value::Ref(Some(o)) => Some(o.class),
                _ => None,
            })
        } else {
            None
        };
        let callee = env
            .module
            .resolve(target, recv_class)
            .ok_or_else(|| WeftError::unknown_method(env.module.names.describe(target)))?;

        let ret = self.run(callee, args.into_vec())?;
        match (sig.ret, ret) {
            (Some(_), Some(v)) => stack.push(v),
            (Some(kind), None) => {
                return Err(WeftError::kind_mismatch(kind.to_string(), "void"));
            }
            (None, _) => {}
        }
        Ok(())
    }

    /// Continuation-stack intrinsics, matched by name under the rt owner.
    fn intrinsic(
        &mut self,
        target: crate::names::MethodId,
        stack: &mut Vec<Value>,
        pc: usize,
    ) -> Result<()> {
        let name = self
            .env
            .module
            .names
            .name(target.name)
            .unwrap_or("")
            .to_string();
        match name.as_str() {
            emit::RESTORING_NAME => {
                stack.push(Value::Int(self.shelf.is_suspended() as i32));
            }
            emit::SUSPENDING_NAME => {
                stack.push(Value::Int(self.shelf.is_suspending() as i32));
            }
            emit::POP_INDEX_NAME => {
                let v = self.shelf.pop_index()?;
                stack.push(Value::Int(v));
            }
            emit::PUSH_INDEX_NAME => {
                let v = pop(stack, pc)?.as_int()?;
                self.shelf.push_index(v);
            }
            "pop_i" => {
                let v = self.shelf.pop_int()?;
                stack.push(Value::Int(v));
            }
            "pop_f" => {
                let v = self.shelf.pop_float()?;
                stack.push(Value::Float(v));
            }
            "pop_l" => {
                let v = self.shelf.pop_long()?;
                stack.push(Value::Long(v));
            }
            "pop_d" => {
                let v = self.shelf.pop_double()?;
                stack.push(Value::Double(v));
            }
            "pop_r" => {
                let v = self.shelf.pop_ref()?;
                stack.push(Value::Ref(v));
            }
            "push_i" => {
                let v = pop(stack, pc)?.as_int()?;
                self.shelf.push_int(v);
            }
            "push_f" => match pop(stack, pc)? {
                Value::Float(v) => self.shelf.push_float(v),
                other => return Err(WeftError::kind_mismatch("F", format!("{:?}", other))),
            },
            "push_l" => {
                let v = pop(stack, pc)?.as_long()?;
                self.shelf.push_long(v);
            }
            "push_d" => match pop(stack, pc)? {
                Value::Double(v) => self.shelf.push_double(v),
                other => return Err(WeftError::kind_mismatch("D", format!("{:?}", other))),
            },
            "push_r" => {
                let v = pop(stack, pc)?.as_ref()?;
                self.shelf.push_ref(v);
            }
            _ => {
                return Err(WeftError::unknown_method(
                    self.env.module.names.describe(target),
                ))
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<Value>, pc: usize) -> Result<Value> {
    stack.pop().ok_or(WeftError::StackUnderflow { at: pc })
}

fn resolve(labels: &FxHashMap<crate::proc::Label, usize>, target: crate::proc::Label) -> Result<usize> {
    labels
        .get(&target)
        .copied()
        .ok_or_else(|| WeftError::invalid_procedure(format!("dangling branch target L{}", target.0)))
}

fn arith(kind: ValueKind, op: ArithOp, a: Value, b: Value) -> Result<Value> {
    match kind {
        ValueKind::Int => {
            let (a, b) = (a.as_int()?, b.as_int()?);
            let v = match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => {
                    if b == 0 {
                        return Err(WeftError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
                ArithOp::Rem => {
                    if b == 0 {
                        return Err(WeftError::DivisionByZero);
                    }
                    a.wrapping_rem(b)
                }
            };
            Ok(Value::Int(v))
        }
        ValueKind::Long => {
            let (a, b) = (a.as_long()?, b.as_long()?);
            let v = match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => {
                    if b == 0 {
                        return Err(WeftError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
                ArithOp::Rem => {
                    if b == 0 {
                        return Err(WeftError::DivisionByZero);
                    }
                    a.wrapping_rem(b)
                }
            };
            Ok(Value::Long(v))
        }
        ValueKind::Float => {
            let (a, b) = match (a, b) {
                (Value::Float(a), Value::Float(b)) => (a, b),
                (a, _) => return Err(WeftError::kind_mismatch("F", format!("{:?}", a))),
            };
            let v = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            };
            Ok(Value::Float(v))
        }
        ValueKind::Double => {
            let (a, b) = match (a, b) {
                (Value::Double(a), Value::Double(b)) => (a, b),
                (a, _) => return Err(WeftError::kind_mismatch("D", format!("{:?}", a))),
            };
            let v = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            };
            Ok(Value::Double(v))
        }
        ValueKind::Ref => Err(WeftError::kind_mismatch("numeric", "R")),
    }
}

fn compare(kind: ValueKind, op: CmpOp, a: Value, b: Value) -> Result<bool> {
    if kind == ValueKind::Ref {
        let eq = a == b;
        return match op {
            CmpOp::Eq => Ok(eq),
            CmpOp::Ne => Ok(!eq),
            _ => Err(WeftError::kind_mismatch("numeric", "R")),
        };
    }
    let ord = match kind {
        ValueKind::Int => a.as_int()?.cmp(&b.as_int()?),
        ValueKind::Long => a.as_long()?.cmp(&b.as_long()?),
        ValueKind::Float => {
            let (a, b) = match (a, b) {
                (Value::Float(a), Value::Float(b)) => (a, b),
                (a, _) => return Err(WeftError::kind_mismatch("F", format!("{:?}", a))),
            };
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Greater)
        }
        ValueKind::Double => {
            let (a, b) = match (a, b) {
                (Value::Double(a), Value::Double(b)) => (a, b),
                (a, _) => return Err(WeftError::kind_mismatch("D", format!("{:?}", a))),
            };
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Greater)
        }
        ValueKind::Ref => unreachable!(),
    };
    Ok(match op {
        CmpOp::Eq => ord.is_eq(),
        CmpOp::Ne => !ord.is_eq(),
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
    })
}
