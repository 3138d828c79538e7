//! # Interpreter core
//!
//! [`Vm`] owns a decoded [`ProgramImage`] plus the one piece of runtime state
//! that outlives any single call: the global object. Each call to
//! [`Vm::call_method`]/[`Vm::new_instance`]/[`Vm::entry_point`] builds a
//! fresh [`Environment`] (registers, scope stack, operand stack) and drives
//! [`Vm::execute_body`]'s fetch-decode-execute loop until a [`Signal::Return`]
//! escapes it — the `Signal` enum is this interpreter's explicit
//! continue/branch/return result, replacing the original implementation's
//! control-flow-by-exception (`ASReturnException`/`ASJumpException`) with
//! an explicit return value, generalizing
//! `sentrychris-omglang`'s `pc`/`advance_pc` pair from that same module.
//!
//! Per-opcode-group handlers live in sibling modules (`ops_stack`,
//! `ops_arith`, `ops_control`, `ops_scope`) mirroring
//! `sentrychris-omglang::vm`'s `ops_arith`/`ops_control` split; `opcode`
//! holds instruction decoding and `builtins` the String/Math/StringUtil
//! bridge.

pub mod builtins;
pub mod opcode;
pub mod ops_arith;
pub mod ops_control;
pub mod ops_scope;
pub mod ops_stack;

#[cfg(test)]
mod tests;

use crate::abc::types::{Method, MethodBody, MethodFlags, Multiname, OptionDetail};
use crate::error::VmError;
use crate::image::ProgramImage;
use crate::reader::Reader;
use crate::value::{Object, Value};
use opcode::{decode_instr, Instr};

/// A per-instruction observer installed via [`Vm::set_trace_hook`],
/// given the program counter and the decoded instruction about to execute.
/// Diagnostics only — never consulted for control flow.
pub type TraceHook = Box<dyn FnMut(usize, &Instr)>;

/// What a handler did.
pub enum Signal {
    /// Fall through to the next instruction.
    Continue,
    /// Branch by a signed delta, relative to the byte after the branch
    /// instruction.
    Branch(i32),
    /// Unwind the current call with this value.
    Return(Value),
}

/// Number of trailing instructions kept in [`Environment::trail`] for error
/// context strings.
const TRAIL_LEN: usize = 8;

/// Per-call execution state.
pub struct Environment {
    pub registers: Vec<Value>,
    pub scope_stack: Vec<Value>,
    pub operand_stack: Vec<Value>,
    pub max_stack: u32,
    pub trail: Vec<String>,
    pub instr_count: u64,
}

impl Environment {
    fn record(&mut self, opcode_pc: usize, instr: &Instr) {
        if self.trail.len() == TRAIL_LEN {
            self.trail.remove(0);
        }
        self.trail.push(format!("{:04}: {:?}", opcode_pc, instr));
        self.instr_count += 1;
    }

    /// Short context string for error reporting.
    pub fn context(&self) -> String {
        format!(
            "scope_depth={} stack_depth={} trail=[{}]",
            self.scope_stack.len(),
            self.operand_stack.len(),
            self.trail.join(" | ")
        )
    }
}

/// Push onto the operand stack, enforcing the method body's declared
/// `max_stack`.
pub(crate) fn push(env: &mut Environment, opcode_pc: usize, v: Value) -> Result<(), VmError> {
    if env.operand_stack.len() >= env.max_stack.max(1) as usize {
        return Err(VmError::StackOverflow {
            opcode_pc,
            context: env.context(),
        });
    }
    env.operand_stack.push(v);
    Ok(())
}

/// Pop the operand stack, reporting underflow with the opcode's PC.
pub(crate) fn pop(env: &mut Environment, opcode_pc: usize) -> Result<Value, VmError> {
    env.operand_stack.pop().ok_or_else(|| VmError::StackUnderflow {
        opcode_pc,
        context: env.context(),
    })
}

pub(crate) fn pop_scope(env: &mut Environment, opcode_pc: usize) -> Result<Value, VmError> {
    env.scope_stack
        .pop()
        .ok_or(VmError::ScopeUnderflow { opcode_pc })
}

/// Resolve a default-value constant by `(kind, index)` against the program
/// image's constant pool — used for `HAS_OPTIONAL` parameter defaults
/// and nowhere else, since every other constant push goes
/// through `ops_stack`'s direct pool-index opcodes instead.
fn default_value(pool: &crate::abc::types::ConstantPool, kind: u8, index: u32) -> Value {
    use crate::abc::enums::ConstantKind;
    match ConstantKind::try_from(kind) {
        Ok(ConstantKind::Utf8) => Value::string(pool.string(index)),
        Ok(ConstantKind::Int) => Value::Int(pool.integers.get(index as usize).copied().unwrap_or(0)),
        Ok(ConstantKind::Uint) => Value::Uint(pool.uints.get(index as usize).copied().unwrap_or(0)),
        Ok(ConstantKind::Double) => Value::Double(pool.doubles.get(index as usize).copied().unwrap_or(f64::NAN)),
        Ok(ConstantKind::True) => Value::Bool(true),
        Ok(ConstantKind::False) => Value::Bool(false),
        Ok(ConstantKind::Null) => Value::Null,
        Ok(ConstantKind::Undefined) => Value::Undefined,
        Ok(
            ConstantKind::Namespace
            | ConstantKind::PackageNamespace
            | ConstantKind::PackageInternalNs
            | ConstantKind::ProtectedNamespace
            | ConstantKind::ExplicitNamespace
            | ConstantKind::StaticProtectedNs
            | ConstantKind::PrivateNs,
        ) => pool
            .namespaces
            .get(index as usize)
            .and_then(|ns| ns.name.clone())
            .map(Value::string)
            .unwrap_or(Value::Null),
        _ => Value::Undefined,
    }
}

/// Build a dynamic array-like object: integer-keyed properties `"0".."n-1"`
/// plus `"length"`, under the empty namespace. AVM2 arrays are themselves
/// dynamic objects, so this
/// is the same `Object` every other dynamic property lives on.
pub(crate) fn make_array(items: Vec<Value>) -> Value {
    let obj = Object::new(None);
    for (i, v) in items.iter().enumerate() {
        obj.set("", &i.to_string(), v.clone());
    }
    obj.set("", "length", Value::Int(items.len() as i32));
    Value::Object(obj)
}

/// The interpreter: a decoded program image plus the global object every
/// call's scope stack is seeded with.
pub struct Vm {
    pub image: ProgramImage,
    pub global: Value,
    initialized_scripts: std::collections::HashSet<u32>,
    trace_hook: Option<TraceHook>,
}

impl Vm {
    /// `new-vm(image) -> VM` — link tables are already built by
    /// [`ProgramImage::new`]; this only seeds the global object.
    pub fn new(image: ProgramImage) -> Self {
        let global = Value::Object(Object::new(None));
        builtins::seed_global(&global);
        Vm {
            image,
            global,
            initialized_scripts: std::collections::HashSet::new(),
            trace_hook: None,
        }
    }

    /// `vm.set-trace-hook(observer?)`.
    pub fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.trace_hook = hook;
    }

    /// `vm.lookup-class(qname) -> class_ix`.
    pub fn lookup_class(&self, qualified_name: &str) -> Result<u32, VmError> {
        self.image.lookup_class(qualified_name)
    }

    /// `vm.lookup-method(qname) -> method_ix`.
    pub fn lookup_method(&self, qualified_name: &str) -> Result<u32, VmError> {
        self.image.lookup_method(qualified_name)
    }

    /// `vm.init-script(script_ix)` — idempotent; running a script's
    /// init body a second time is a silent no-op.
    pub fn init_script(&mut self, script_ix: u32) -> Result<Value, VmError> {
        if self.initialized_scripts.contains(&script_ix) {
            return Ok(Value::Undefined);
        }
        let init_ix = match self.image.file.scripts.get(script_ix as usize) {
            Some(s) => s.init_ix,
            None => return Err(VmError::reference(format!("script#{}", script_ix), 0, 0)),
        };
        self.initialized_scripts.insert(script_ix);
        self.call_method(init_ix, self.global.clone(), &[])
    }

    /// `vm.entry-point()` — the conventional entry: the last
    /// script's init.
    pub fn entry_point(&mut self) -> Result<Value, VmError> {
        let last = self.image.file.scripts.len();
        if last == 0 {
            return Err(VmError::reference("<no scripts>", 0, 0));
        }
        self.init_script((last - 1) as u32)
    }

    /// `vm.new-instance(class_id_or_name, args…) -> Object`:
    /// allocates a bare object tagged with `class_ix` and runs the paired
    /// instance's instance-init method on it, once per `new` call.
    pub fn new_instance(&mut self, class_ix: u32, args: &[Value]) -> Result<Value, VmError> {
        let init_ix = self
            .image
            .file
            .instances
            .get(class_ix as usize)
            .map(|inst| inst.init_ix)
            .ok_or_else(|| VmError::reference(format!("class#{}", class_ix), 0, 0))?;
        let obj = Value::Object(Object::new(Some(class_ix)));
        self.call_method(init_ix, obj.clone(), args)?;
        Ok(obj)
    }

    /// `vm.call-method(method_id, this, args…) -> Any | VmError`.
    pub fn call_method(&mut self, method_ix: u32, this: Value, args: &[Value]) -> Result<Value, VmError> {
        let body_ix = self
            .image
            .body_for_method(method_ix)
            .ok_or_else(|| VmError::reference(format!("method#{} (no body)", method_ix), 0, 0))?;
        let method = self.image.file.methods[method_ix as usize].clone();
        let body = self.image.file.method_bodies[body_ix as usize].clone();
        let mut env = self.build_environment(&method, &body, this, args)?;
        let result = self.execute_body(&body, &mut env)?;
        match &method.return_type_name {
            Some(ty) => result.coerce_to(ty),
            None => Ok(result),
        }
    }

    /// `vm.call-static(method_id, args…) -> Any | VmError`: same as
    /// `call_method` with the global object as the implicit receiver, the
    /// shape top-level/static functions are called with.
    pub fn call_static(&mut self, method_ix: u32, args: &[Value]) -> Result<Value, VmError> {
        self.call_method(method_ix, self.global.clone(), args)
    }

    fn build_environment(
        &self,
        method: &Method,
        body: &MethodBody,
        this: Value,
        args: &[Value],
    ) -> Result<Environment, VmError> {
        let local_count = body.local_count.max(1 + method.param_count) as usize;
        let mut registers = vec![Value::Undefined; local_count];
        registers[0] = this;

        let n = args.len().min(method.param_count as usize);
        for i in 0..n {
            registers[1 + i] = args[i].clone();
        }

        if method.flags.contains(MethodFlags::HAS_OPTIONAL) && args.len() < method.param_count as usize {
            let optional_start = method.param_count as usize - method.options.len();
            for (i, opt) in method.options.iter().enumerate() {
                let param_index = optional_start + i; // 0-based among params
                if param_index >= args.len() {
                    if let Some(slot) = registers.get_mut(param_index + 1) {
                        *slot = default_value(&self.image.file.pool, opt_kind(opt), opt.value_index);
                    }
                }
            }
        }

        let rest_slot = method.param_count as usize + 1;
        if method.flags.contains(MethodFlags::NEED_REST) {
            let rest = if args.len() > method.param_count as usize {
                args[method.param_count as usize..].to_vec()
            } else {
                Vec::new()
            };
            if let Some(slot) = registers.get_mut(rest_slot) {
                *slot = make_array(rest);
            }
        } else if method.flags.contains(MethodFlags::NEED_ARGUMENTS) {
            if let Some(slot) = registers.get_mut(rest_slot) {
                *slot = make_array(args.to_vec());
            }
        }

        Ok(Environment {
            registers,
            scope_stack: vec![self.global.clone()],
            operand_stack: Vec::new(),
            max_stack: body.max_stack,
            trail: Vec::new(),
            instr_count: 0,
        })
    }

    /// The execution loop: decode one instruction at `pc`, dispatch
    /// it, and either fall through, branch, or return.
    fn execute_body(&mut self, body: &MethodBody, env: &mut Environment) -> Result<Value, VmError> {
        let mut pc: usize = 0;
        loop {
            if pc >= body.code.len() {
                return Ok(Value::Undefined);
            }
            let mut r = Reader::new(&body.code[pc..]);
            let (instr, len) = decode_instr(&mut r).map_err(|e| VmError::MalformedInstruction {
                opcode_pc: pc,
                source: e,
            })?;

            if let Some(hook) = self.trace_hook.as_mut() {
                hook(pc, &instr);
            }
            env.record(pc, &instr);

            let signal = self.dispatch(env, pc, &instr)?;
            match signal {
                Signal::Continue => pc += len,
                Signal::Branch(offset) => {
                    let next = pc as i64 + len as i64 + offset as i64;
                    if next < 0 || next as usize > body.code.len() {
                        return Err(VmError::RangeError {
                            message: format!("branch target {} out of bounds", next),
                            context: env.context(),
                        });
                    }
                    pc = next as usize;
                }
                Signal::Return(v) => return Ok(v),
            }
        }
    }

    fn dispatch(&mut self, env: &mut Environment, pc: usize, instr: &Instr) -> Result<Signal, VmError> {
        use Instr::*;
        match instr {
            Nop | Label | DebugLine(_) | DebugFile(_) | Debug { .. } => Ok(Signal::Continue),

            // --- stack / locals ---
            PushNull | PushUndefined | PushByte(_) | PushShort(_) | PushTrue | PushFalse | PushNan
            | PushString(_) | PushInt(_) | PushUint(_) | PushDouble(_) | PushNamespace(_) | Pop | Dup
            | Swap | GetLocal(_) | SetLocal(_) | Kill(_) | IncLocal(_) | IncLocalI(_) | DecLocal(_)
            | DecLocalI(_) | PushScope | PopScope | GetGlobalScope | GetScopeObject(_) => {
                ops_stack::dispatch(self, env, pc, instr)
            }

            // --- arithmetic / comparison / conversion ---
            Add | AddI | Subtract | SubtractI | Multiply | MultiplyI | Divide | Modulo | Negate
            | NegateI | Increment | IncrementI | Decrement | DecrementI | Not | BitNot | BitAnd
            | BitOr | BitXor | LShift | RShift | URShift | Equals | StrictEquals | LessThan
            | LessEquals | GreaterThan | GreaterEquals | TypeOf | InstanceOf | IsType(_) | IsTypeLate
            | AsType(_) | AsTypeLate | ConvertB | ConvertI | ConvertU | ConvertD | ConvertS | ConvertO
            | CoerceS | Coerce(_) | CoerceA => ops_arith::dispatch(self, env, pc, instr),

            // --- property / scope access ---
            FindProperty(_) | FindPropStrict(_) | GetLex(_) | GetProperty(_) | SetProperty(_)
            | InitProperty(_) | GetSuper(_) | SetSuper(_) | NewObject(_) | NewArray(_) | NewClass(_)
            | NewFunction(_) | NewActivation | GetSlot(_) | SetSlot(_) | GetGlobalSlot(_)
            | SetGlobalSlot(_) | DeleteProperty(_) | GetDescendants(_) | In | NextName | NextValue
            | HasNext | HasNext2(_, _) | CheckFilter | EscXElem | EscXAttr | Dxns(_) | DxnsLate
            | NewCatch(_) => ops_scope::dispatch(self, env, pc, instr),

            // --- control flow / calls ---
            Jump(_) | IfTrue(_) | IfFalse(_) | IfEq(_) | IfNe(_) | IfLt(_) | IfLe(_) | IfGt(_) | IfGe(_)
            | IfNLt(_) | IfNLe(_) | IfNGt(_) | IfNGe(_) | IfStrictEq(_) | IfStrictNe(_)
            | LookupSwitch { .. } | Throw | PushWith | ReturnValue | ReturnVoid | Call(_) | Construct(_)
            | CallMethod(_, _) | CallStatic(_, _) | CallSuper(_, _) | CallProperty(_, _)
            | ConstructSuper(_) | ConstructProp(_, _) | CallPropLex(_, _) | CallSuperVoid(_, _)
            | CallPropVoid(_, _) => ops_control::dispatch(self, env, pc, instr),
        }
    }
}

fn opt_kind(opt: &OptionDetail) -> u8 {
    opt.kind
}

/// A multiname resolved against its runtime operands: a concrete name and
/// one or more candidate namespaces, ready to hand to
/// [`crate::resolver::resolve_multiname`]/[`crate::resolver::resolve_qname`].
pub(crate) struct ResolvedName {
    pub name: String,
    pub namespaces: Vec<String>,
}

/// Resolve the multiname at `index`, pulling its name and/or namespace off
/// the operand stack first when the tag requires it (`RtqName`/`RtqNameL`/
/// `MultinameL`). The Python original's `CallProperty`/`FindProperty`
/// traces agree on the order: **name is popped before namespace** when both
/// are runtime-supplied, so that is the order used here too, shared by
/// `ops_scope` and `ops_control` so the two call sites can't drift apart.
pub(crate) fn resolve_name_operand(
    vm: &Vm,
    env: &mut Environment,
    pc: usize,
    index: u32,
) -> Result<ResolvedName, VmError> {
    let multiname = vm
        .image
        .file
        .pool
        .multinames
        .get(index as usize)
        .cloned()
        .ok_or_else(|| VmError::reference(format!("multiname#{}", index), env.scope_stack.len(), env.operand_stack.len()))?;
    let names = vm
        .image
        .file
        .multiname_names
        .get(index as usize)
        .cloned()
        .unwrap_or_default();

    let name = if multiname.needs_name_from_stack() {
        pop(env, pc)?.to_string_lossy()
    } else {
        names.name.clone().unwrap_or_default()
    };

    let namespaces = if multiname.needs_namespace_from_stack() {
        vec![pop(env, pc)?.to_string_lossy()]
    } else {
        match &multiname {
            Multiname::Multiname { .. } | Multiname::MultinameL { .. } if !names.ns_set_names.is_empty() => {
                names.ns_set_names.clone()
            }
            _ => vec![names.namespace_name.clone().unwrap_or_default()],
        }
    };

    Ok(ResolvedName { name, namespaces })
}
