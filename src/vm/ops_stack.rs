//! # Stack and local-register opcodes
//!
//! Literal pushes, the plain operand-stack shuffles (`pop`/`dup`/`swap`),
//! local-register load/store/kill/inc/dec, and scope-stack push/pop/peek.
//! Grounded on `sentrychris-omglang::vm::ops_arith`'s
//! `pub(super) fn handle_x(env: &mut Environment, ...) -> Result<(), VmError>`
//! handler shape, adapted to this interpreter's `Signal`-returning form.

use super::opcode::Instr;
use super::{pop, pop_scope, push, Environment, Signal, Vm};
use crate::error::VmError;
use crate::value::Value;

pub(super) fn dispatch(vm: &mut Vm, env: &mut Environment, pc: usize, instr: &Instr) -> Result<Signal, VmError> {
    use Instr::*;
    match instr {
        PushNull => push(env, pc, Value::Null)?,
        PushUndefined => push(env, pc, Value::Undefined)?,
        PushByte(b) => push(env, pc, Value::Int(*b as i32))?,
        PushShort(s) => push(env, pc, Value::Int(*s))?,
        PushTrue => push(env, pc, Value::Bool(true))?,
        PushFalse => push(env, pc, Value::Bool(false))?,
        PushNan => push(env, pc, Value::Double(f64::NAN))?,
        PushString(ix) => push(env, pc, Value::string(vm.image.file.pool.string(*ix)))?,
        PushInt(ix) => {
            let v = vm.image.file.pool.integers.get(*ix as usize).copied().unwrap_or(0);
            push(env, pc, Value::Int(v))?
        }
        PushUint(ix) => {
            let v = vm.image.file.pool.uints.get(*ix as usize).copied().unwrap_or(0);
            push(env, pc, Value::Uint(v))?
        }
        PushDouble(ix) => {
            let v = vm
                .image
                .file
                .pool
                .doubles
                .get(*ix as usize)
                .copied()
                .unwrap_or(f64::NAN);
            push(env, pc, Value::Double(v))?
        }
        PushNamespace(ix) => {
            let name = vm
                .image
                .file
                .pool
                .namespaces
                .get(*ix as usize)
                .and_then(|ns| ns.name.clone())
                .unwrap_or_default();
            push(env, pc, Value::string(name))?
        }
        Pop => {
            pop(env, pc)?;
        }
        Dup => {
            let v = pop(env, pc)?;
            push(env, pc, v.clone())?;
            push(env, pc, v)?;
        }
        Swap => {
            let top = pop(env, pc)?;
            let under = pop(env, pc)?;
            push(env, pc, top)?;
            push(env, pc, under)?;
        }
        GetLocal(ix) => push(env, pc, local(env, pc, *ix)?)?,
        SetLocal(ix) => {
            let v = pop(env, pc)?;
            set_local(env, pc, *ix, v)?;
        }
        Kill(ix) => set_local(env, pc, *ix, Value::Undefined)?,
        IncLocal(ix) => {
            let v = local(env, pc, *ix)?;
            set_local(env, pc, *ix, Value::Double(v.to_number() + 1.0))?;
        }
        IncLocalI(ix) => {
            let v = local(env, pc, *ix)?;
            set_local(env, pc, *ix, Value::Int(v.to_int32().wrapping_add(1)))?;
        }
        DecLocal(ix) => {
            let v = local(env, pc, *ix)?;
            set_local(env, pc, *ix, Value::Double(v.to_number() - 1.0))?;
        }
        DecLocalI(ix) => {
            let v = local(env, pc, *ix)?;
            set_local(env, pc, *ix, Value::Int(v.to_int32().wrapping_sub(1)))?;
        }
        PushScope => {
            let v = pop(env, pc)?;
            env.scope_stack.push(v);
        }
        PopScope => {
            pop_scope(env, pc)?;
        }
        GetGlobalScope => push(env, pc, vm.global.clone())?,
        GetScopeObject(ix) => {
            let v = env
                .scope_stack
                .get(*ix as usize)
                .cloned()
                .ok_or(VmError::ScopeUnderflow { opcode_pc: pc })?;
            push(env, pc, v)?
        }
        // dispatch() in vm/mod.rs only routes this group's variants here.
        _ => {
            return Err(VmError::UnimplementedOpcode {
                opcode: 0,
                opcode_pc: pc,
            })
        }
    }
    Ok(Signal::Continue)
}

fn local(env: &Environment, opcode_pc: usize, ix: u32) -> Result<Value, VmError> {
    env.registers
        .get(ix as usize)
        .cloned()
        .ok_or(VmError::StackUnderflow {
            opcode_pc,
            context: format!("register {} out of range", ix),
        })
}

fn set_local(env: &mut Environment, opcode_pc: usize, ix: u32, value: Value) -> Result<(), VmError> {
    match env.registers.get_mut(ix as usize) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(VmError::StackUnderflow {
            opcode_pc,
            context: format!("register {} out of range", ix),
        }),
    }
}
