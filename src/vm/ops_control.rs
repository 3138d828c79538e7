//! # Control flow and call opcodes
//!
//! Branches return [`Signal::Branch`] with a delta relative to the byte
//! after the instruction; `Vm::execute_body` (in `vm::mod`) does the actual
//! program-counter arithmetic and bounds check.
//!
//! Call-family opcodes (`callproperty`, `constructprop`, `callsuper`, ...)
//! pop operands in the order confirmed from the original implementation's
//! doctested traces: arguments first (highest index popped first, rebuilt
//! into left-to-right order), then the runtime name/namespace via
//! [`super::resolve_name_operand`], then the receiver object last.
//! `getsuper`/`setsuper`-adjacent call opcodes that are unimplemented stubs
//! in the original are given here the behavior their docstrings describe,
//! per this interpreter's policy of completing those paths rather than
//! carrying the stub forward.

use super::opcode::Instr;
use super::{builtins, pop, push, resolve_name_operand, Environment, Signal, Vm};
use crate::error::VmError;
use crate::resolver::resolve_qname;
use crate::value::Value;

pub(super) fn dispatch(vm: &mut Vm, env: &mut Environment, pc: usize, instr: &Instr) -> Result<Signal, VmError> {
    use Instr::*;
    match instr {
        Jump(offset) => return Ok(Signal::Branch(*offset)),
        IfTrue(offset) => return branch_if(env, pc, *offset, |v| v.to_boolean()),
        IfFalse(offset) => return branch_if(env, pc, *offset, |v| !v.to_boolean()),
        IfEq(offset) => return branch_pair(env, pc, *offset, |a, b| a.abstract_equals(b)),
        IfNe(offset) => return branch_pair(env, pc, *offset, |a, b| !a.abstract_equals(b)),
        IfLt(offset) => return branch_pair(env, pc, *offset, |a, b| a.abstract_compare(b) == Some(std::cmp::Ordering::Less)),
        IfLe(offset) => return branch_pair(env, pc, *offset, |a, b| {
            matches!(a.abstract_compare(b), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
        }),
        IfGt(offset) => return branch_pair(env, pc, *offset, |a, b| a.abstract_compare(b) == Some(std::cmp::Ordering::Greater)),
        IfGe(offset) => return branch_pair(env, pc, *offset, |a, b| {
            matches!(a.abstract_compare(b), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
        }),
        IfNLt(offset) => return branch_pair(env, pc, *offset, |a, b| a.abstract_compare(b) != Some(std::cmp::Ordering::Less)),
        IfNLe(offset) => return branch_pair(env, pc, *offset, |a, b| {
            !matches!(a.abstract_compare(b), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
        }),
        IfNGt(offset) => return branch_pair(env, pc, *offset, |a, b| a.abstract_compare(b) != Some(std::cmp::Ordering::Greater)),
        IfNGe(offset) => return branch_pair(env, pc, *offset, |a, b| {
            !matches!(a.abstract_compare(b), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
        }),
        IfStrictEq(offset) => return branch_pair(env, pc, *offset, |a, b| a.strict_equals(b)),
        IfStrictNe(offset) => return branch_pair(env, pc, *offset, |a, b| !a.strict_equals(b)),
        LookupSwitch { default_offset, case_offsets } => {
            let index = pop(env, pc)?.to_int32();
            let chosen = if index >= 0 && (index as usize) < case_offsets.len() {
                case_offsets[index as usize]
            } else {
                *default_offset
            };
            return Ok(Signal::Branch(chosen));
        }
        Throw => {
            let v = pop(env, pc)?;
            return Err(VmError::Thrown { value: v.to_string_lossy() });
        }
        PushWith => {
            let v = pop(env, pc)?;
            env.scope_stack.push(v);
        }
        ReturnValue => {
            let v = pop(env, pc)?;
            return Ok(Signal::Return(v));
        }
        ReturnVoid => return Ok(Signal::Return(Value::Undefined)),

        Call(arg_count) => {
            let args = pop_args(env, pc, *arg_count)?;
            let receiver = pop(env, pc)?;
            let function = pop(env, pc)?;
            let result = call_value(vm, &function, receiver, &args)?;
            push(env, pc, result)?;
        }
        Construct(arg_count) => {
            let args = pop_args(env, pc, *arg_count)?;
            let ctor = pop(env, pc)?;
            let result = construct_from(vm, &ctor, &args)?;
            push(env, pc, result)?;
        }
        CallMethod(disp_id, arg_count) => {
            // No per-class virtual-dispatch table is maintained here, so the
            // disposition id is treated as a direct method index, the same
            // resolution `callstatic` uses.
            let args = pop_args(env, pc, *arg_count)?;
            let receiver = pop(env, pc)?;
            let result = vm.call_method(*disp_id, receiver, &args)?;
            push(env, pc, result)?;
        }
        CallStatic(method_ix, arg_count) => {
            let args = pop_args(env, pc, *arg_count)?;
            let receiver = pop(env, pc)?;
            let result = vm.call_method(*method_ix, receiver, &args)?;
            push(env, pc, result)?;
        }
        CallSuper(name_ix, arg_count) => {
            let result = call_super(vm, env, pc, *name_ix, *arg_count)?;
            push(env, pc, result)?;
        }
        CallSuperVoid(name_ix, arg_count) => {
            call_super(vm, env, pc, *name_ix, *arg_count)?;
        }
        CallProperty(name_ix, arg_count) => {
            let result = call_property(vm, env, pc, *name_ix, *arg_count)?;
            push(env, pc, result)?;
        }
        CallPropLex(name_ix, arg_count) => {
            let result = call_property(vm, env, pc, *name_ix, *arg_count)?;
            push(env, pc, result)?;
        }
        CallPropVoid(name_ix, arg_count) => {
            call_property(vm, env, pc, *name_ix, *arg_count)?;
        }
        ConstructSuper(arg_count) => {
            let args = pop_args(env, pc, *arg_count)?;
            let receiver = pop(env, pc)?;
            if let Some(init_ix) = super_init_ix(vm, &receiver) {
                vm.call_method(init_ix, receiver, &args)?;
            }
        }
        ConstructProp(name_ix, arg_count) => {
            let args = pop_args(env, pc, *arg_count)?;
            let resolved = resolve_name_operand(vm, env, pc, *name_ix)?;
            let base = pop(env, pc)?;
            let ns = resolved.namespaces.first().cloned().unwrap_or_default();
            let ctor = resolve_qname(&base, &ns, &resolved.name).unwrap_or(Value::Undefined);
            let result = construct_from(vm, &ctor, &args)?;
            push(env, pc, result)?;
        }
        _ => return Err(VmError::UnimplementedOpcode { opcode: 0, opcode_pc: pc }),
    }
    Ok(Signal::Continue)
}

fn branch_if(env: &mut Environment, pc: usize, offset: i32, f: impl Fn(&Value) -> bool) -> Result<Signal, VmError> {
    let v = pop(env, pc)?;
    Ok(if f(&v) { Signal::Branch(offset) } else { Signal::Continue })
}

fn branch_pair(env: &mut Environment, pc: usize, offset: i32, f: impl Fn(&Value, &Value) -> bool) -> Result<Signal, VmError> {
    let b = pop(env, pc)?;
    let a = pop(env, pc)?;
    Ok(if f(&a, &b) { Signal::Branch(offset) } else { Signal::Continue })
}

/// Pop `count` call arguments off the operand stack and return them in
/// left-to-right order (the top of the stack holds the last argument).
fn pop_args(env: &mut Environment, pc: usize, count: u32) -> Result<Vec<Value>, VmError> {
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        args.push(pop(env, pc)?);
    }
    args.reverse();
    Ok(args)
}

fn class_ix_of(v: &Value) -> Option<u32> {
    match v {
        Value::Object(o) => o.0.borrow().class_ix,
        _ => None,
    }
}

/// `call arg_count`'s target invocation: a null/undefined receiver defers to
/// the closure's bound receiver (the `this` its enclosing activation had
/// when `newfunction` created it); any other popped receiver overrides it.
fn call_value(vm: &mut Vm, function: &Value, receiver: Value, args: &[Value]) -> Result<Value, VmError> {
    match function {
        Value::Function(f) => {
            let this = if receiver.is_null_or_undefined() {
                f.bound_receiver.clone()
            } else {
                receiver
            };
            vm.call_method(f.method_ix, this, args)
        }
        _ => Err(VmError::TypeError {
            message: "value is not callable".to_string(),
            context: format!("{:?}", function),
        }),
    }
}

fn construct_from(vm: &mut Vm, ctor: &Value, args: &[Value]) -> Result<Value, VmError> {
    match class_ix_of(ctor) {
        Some(class_ix) => vm.new_instance(class_ix, args),
        None => Err(VmError::TypeError {
            message: "value is not a constructor".to_string(),
            context: format!("{:?}", ctor),
        }),
    }
}

fn super_init_ix(vm: &Vm, receiver: &Value) -> Option<u32> {
    let class_ix = class_ix_of(receiver)?;
    let instance = vm.image.file.instances.get(class_ix as usize)?;
    let super_name = instance.super_qualified_name.as_ref()?;
    let super_class_ix = vm.image.lookup_class(super_name).ok()?;
    vm.image.file.instances.get(super_class_ix as usize).map(|i| i.init_ix)
}

/// Shared body for `callproperty`/`callproplex`: resolve the call's runtime
/// operands, then try the built-ins bridge before falling back to a
/// user-defined instance method keyed by `"<class qualified name>.<member>"`.
fn call_property(vm: &mut Vm, env: &mut Environment, pc: usize, name_ix: u32, arg_count: u32) -> Result<Value, VmError> {
    let args = pop_args(env, pc, arg_count)?;
    let resolved = resolve_name_operand(vm, env, pc, name_ix)?;
    let receiver = pop(env, pc)?;
    let ns = resolved.namespaces.first().cloned().unwrap_or_default();

    if let Some(result) = builtins::call_builtin(&receiver, &ns, &resolved.name, &args) {
        return result;
    }
    if let Some(class_ix) = class_ix_of(&receiver) {
        if let Some(qname) = vm.image.file.instances.get(class_ix as usize).and_then(|i| i.qualified_name.clone()) {
            let key = format!("{}.{}", qname, resolved.name);
            if let Ok(method_ix) = vm.image.lookup_method(&key) {
                return vm.call_method(method_ix, receiver, &args);
            }
        }
    }
    Err(VmError::reference(
        format!("{}.{}", ns, resolved.name),
        env.scope_stack.len(),
        env.operand_stack.len(),
    ))
}

fn call_super(vm: &mut Vm, env: &mut Environment, pc: usize, name_ix: u32, arg_count: u32) -> Result<Value, VmError> {
    let args = pop_args(env, pc, arg_count)?;
    let resolved = resolve_name_operand(vm, env, pc, name_ix)?;
    let receiver = pop(env, pc)?;

    let class_ix = class_ix_of(&receiver).ok_or_else(|| VmError::reference(resolved.name.clone(), 0, 0))?;
    let instance = vm
        .image
        .file
        .instances
        .get(class_ix as usize)
        .ok_or_else(|| VmError::reference(format!("class#{}", class_ix), 0, 0))?;
    let super_name = instance
        .super_qualified_name
        .clone()
        .ok_or_else(|| VmError::reference(resolved.name.clone(), 0, 0))?;
    let key = format!("{}.{}", super_name, resolved.name);
    let method_ix = vm.image.lookup_method(&key)?;
    vm.call_method(method_ix, receiver, &args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::decode_abc;
    use crate::image::ProgramImage;

    fn empty_abc_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&46u16.to_le_bytes());
        for _ in 0..7 {
            b.push(0);
        }
        for _ in 0..5 {
            b.push(0);
        }
        b
    }

    fn new_vm() -> Vm {
        let file = decode_abc(&empty_abc_bytes()).unwrap();
        Vm::new(ProgramImage::new(file))
    }

    fn env_with(stack: Vec<Value>) -> Environment {
        Environment {
            registers: Vec::new(),
            scope_stack: Vec::new(),
            operand_stack: stack,
            max_stack: 16,
            trail: Vec::new(),
            instr_count: 0,
        }
    }

    #[test]
    fn if_true_branches_only_when_truthy() {
        let mut env = env_with(vec![Value::Bool(true)]);
        let mut vm = new_vm();
        let signal = dispatch(&mut vm, &mut env, 0, &Instr::IfTrue(12)).unwrap();
        assert!(matches!(signal, Signal::Branch(12)));
    }

    #[test]
    fn if_nlt_treats_nan_comparison_as_not_less() {
        let mut env = env_with(vec![Value::Double(1.0), Value::Double(f64::NAN)]);
        let mut vm = new_vm();
        let signal = dispatch(&mut vm, &mut env, 0, &Instr::IfNLt(5)).unwrap();
        assert!(matches!(signal, Signal::Branch(5)));
    }

    #[test]
    fn lookup_switch_falls_back_to_default_for_out_of_range_index() {
        let mut env = env_with(vec![Value::Int(9)]);
        let mut vm = new_vm();
        let signal = dispatch(
            &mut vm,
            &mut env,
            0,
            &Instr::LookupSwitch {
                default_offset: 99,
                case_offsets: vec![1, 2, 3],
            },
        )
        .unwrap();
        assert!(matches!(signal, Signal::Branch(99)));
    }

    #[test]
    fn return_value_pops_and_returns_top_of_stack() {
        let mut env = env_with(vec![Value::Int(7)]);
        let mut vm = new_vm();
        let signal = dispatch(&mut vm, &mut env, 0, &Instr::ReturnValue).unwrap();
        assert!(matches!(signal, Signal::Return(Value::Int(7))));
    }

    #[test]
    fn throw_surfaces_the_popped_value_as_a_thrown_error() {
        let mut env = env_with(vec![Value::string("boom")]);
        let mut vm = new_vm();
        let err = dispatch(&mut vm, &mut env, 0, &Instr::Throw).unwrap_err();
        assert!(matches!(err, VmError::Thrown { value } if value == "boom"));
    }

    #[test]
    fn call_method_resolves_the_disposition_id_as_a_method_index() {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&46u16.to_le_bytes());
        for _ in 0..7 {
            b.push(0);
        }
        b.push(1); // method_count
        b.push(0); // param_count
        b.push(0); // return_type_ix
        b.push(0); // name_ix
        b.push(0); // flags
        b.push(0); // metadata_count
        b.push(0); // class_count
        b.push(0); // script_count
        b.push(1); // method_body_count
        b.push(0); // method_ix
        b.push(4); // max_stack
        b.push(1); // local_count
        b.push(0); // init_scope_depth
        b.push(1); // max_scope_depth
        let code = [0x24, 0x09, 0x48]; // pushbyte 9; returnvalue
        b.push(code.len() as u8);
        b.extend_from_slice(&code);
        b.push(0); // exception_count
        b.push(0); // traits count

        let file = decode_abc(&b).unwrap();
        let mut vm = Vm::new(ProgramImage::new(file));
        // bottom of stack: receiver; top of stack: the single call argument.
        let mut env = env_with(vec![Value::Undefined, Value::Int(1)]);
        let signal = dispatch(&mut vm, &mut env, 0, &Instr::CallMethod(0, 1)).unwrap();
        assert!(matches!(signal, Signal::Continue));
        assert!(matches!(env.operand_stack.last(), Some(Value::Int(9))));
    }

    #[test]
    fn call_invokes_a_newfunction_value_through_its_bound_method() {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&46u16.to_le_bytes());
        for _ in 0..7 {
            b.push(0);
        }
        b.push(1); // method_count
        b.push(0); // param_count
        b.push(0); // return_type_ix
        b.push(0); // name_ix
        b.push(0); // flags
        b.push(0); // metadata_count
        b.push(0); // class_count
        b.push(0); // script_count
        b.push(1); // method_body_count
        b.push(0); // method_ix
        b.push(4); // max_stack
        b.push(1); // local_count
        b.push(0); // init_scope_depth
        b.push(1); // max_scope_depth
        let code = [0x24, 0x2A, 0x48]; // pushbyte 42; returnvalue
        b.push(code.len() as u8);
        b.extend_from_slice(&code);
        b.push(0); // exception_count
        b.push(0); // traits count

        let file = decode_abc(&b).unwrap();
        let mut vm = Vm::new(ProgramImage::new(file));
        let function = Value::Function(std::rc::Rc::new(crate::value::FunctionData {
            method_ix: 0,
            bound_receiver: Value::Undefined,
        }));
        // bottom of stack: function; then receiver; no call arguments.
        let mut env = env_with(vec![function, Value::Undefined]);
        let signal = dispatch(&mut vm, &mut env, 0, &Instr::Call(0)).unwrap();
        assert!(matches!(signal, Signal::Continue));
        assert!(matches!(env.operand_stack.last(), Some(Value::Int(42))));
    }

    #[test]
    fn call_on_a_non_function_value_is_a_type_error() {
        let mut vm = new_vm();
        let mut env = env_with(vec![Value::Int(1), Value::Undefined]);
        let err = dispatch(&mut vm, &mut env, 0, &Instr::Call(0)).unwrap_err();
        assert!(matches!(err, VmError::TypeError { .. }));
    }
}
