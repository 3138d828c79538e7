//! # Arithmetic, comparison, and conversion opcodes
//!
//! Binary/unary arithmetic and bitwise ops work on `f64`/`i32` via
//! [`Value::to_number`]/[`Value::to_int32`]; the `*I` suffixed forms
//! (`addi`, `subtracti`, ...) stay in 32-bit integer arithmetic throughout
//! instead of round-tripping through `f64`. Comparisons use
//! [`Value::abstract_compare`]/[`Value::abstract_equals`]/
//! [`Value::strict_equals`] from `value.rs`. Grounded on
//! `sentrychris-omglang::vm::ops_arith`'s one-handler-per-opcode shape,
//! adapted to this interpreter's `Signal`-returning dispatch and AVM2's
//! opcode set instead of OMG's.

use super::opcode::Instr;
use super::{pop, push, Environment, Signal, Vm};
use crate::error::VmError;
use crate::value::Value;

pub(super) fn dispatch(vm: &mut Vm, env: &mut Environment, pc: usize, instr: &Instr) -> Result<Signal, VmError> {
    use Instr::*;
    match instr {
        Add => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            let result = match (&a, &b) {
                (Value::String(_), _) | (_, Value::String(_)) => Value::string(format!("{}{}", a, b)),
                _ => Value::Double(a.to_number() + b.to_number()),
            };
            push(env, pc, result)?;
        }
        AddI => binary_int(env, pc, i32::wrapping_add)?,
        Subtract => binary_number(env, pc, |x, y| x - y)?,
        SubtractI => binary_int(env, pc, i32::wrapping_sub)?,
        Multiply => binary_number(env, pc, |x, y| x * y)?,
        MultiplyI => binary_int(env, pc, i32::wrapping_mul)?,
        Divide => binary_number(env, pc, |x, y| x / y)?,
        Modulo => binary_number(env, pc, |x, y| x % y)?,
        Negate => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Double(-v.to_number()))?;
        }
        NegateI => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Int(v.to_int32().wrapping_neg()))?;
        }
        Increment => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Double(v.to_number() + 1.0))?;
        }
        IncrementI => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Int(v.to_int32().wrapping_add(1)))?;
        }
        Decrement => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Double(v.to_number() - 1.0))?;
        }
        DecrementI => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Int(v.to_int32().wrapping_sub(1)))?;
        }
        Not => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Bool(!v.to_boolean()))?;
        }
        BitNot => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Int(!v.to_int32()))?;
        }
        BitAnd => binary_int(env, pc, |x, y| x & y)?,
        BitOr => binary_int(env, pc, |x, y| x | y)?,
        BitXor => binary_int(env, pc, |x, y| x ^ y)?,
        LShift => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            let shift = b.to_uint32() & 0x1F;
            push(env, pc, Value::Int(a.to_int32().wrapping_shl(shift)))?;
        }
        RShift => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            let shift = b.to_uint32() & 0x1F;
            push(env, pc, Value::Int(a.to_int32().wrapping_shr(shift)))?;
        }
        URShift => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            let shift = b.to_uint32() & 0x1F;
            push(env, pc, Value::Uint(a.to_uint32().wrapping_shr(shift)))?;
        }
        Equals => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            push(env, pc, Value::Bool(a.abstract_equals(&b)))?;
        }
        StrictEquals => {
            let b = pop(env, pc)?;
            let a = pop(env, pc)?;
            push(env, pc, Value::Bool(a.strict_equals(&b)))?;
        }
        LessThan => compare(env, pc, |o| o == std::cmp::Ordering::Less)?,
        LessEquals => compare(env, pc, |o| o != std::cmp::Ordering::Greater)?,
        GreaterThan => compare(env, pc, |o| o == std::cmp::Ordering::Greater)?,
        GreaterEquals => compare(env, pc, |o| o != std::cmp::Ordering::Less)?,
        TypeOf => {
            let v = pop(env, pc)?;
            push(env, pc, Value::string(v.type_name()))?;
        }
        InstanceOf => {
            let class_val = pop(env, pc)?;
            let v = pop(env, pc)?;
            push(env, pc, Value::Bool(matches_type_name(&v, Some(class_val.to_string_lossy().as_str()))))?;
        }
        IsType(ix) => {
            let v = pop(env, pc)?;
            let type_name = class_name_at(vm, *ix);
            push(env, pc, Value::Bool(matches_type_name(&v, type_name.as_deref())))?;
        }
        IsTypeLate => {
            let type_val = pop(env, pc)?;
            let v = pop(env, pc)?;
            push(env, pc, Value::Bool(matches_type_name(&v, Some(&type_val.to_string_lossy()))))?;
        }
        AsType(ix) => {
            let v = pop(env, pc)?;
            let type_name = class_name_at(vm, *ix);
            let result = if matches_type_name(&v, type_name.as_deref()) { v } else { Value::Null };
            push(env, pc, result)?;
        }
        AsTypeLate => {
            let type_val = pop(env, pc)?;
            let v = pop(env, pc)?;
            let result = if matches_type_name(&v, Some(&type_val.to_string_lossy())) { v } else { Value::Null };
            push(env, pc, result)?;
        }
        ConvertB => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Bool(v.to_boolean()))?;
        }
        ConvertI => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Int(v.to_int32()))?;
        }
        ConvertU => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Uint(v.to_uint32()))?;
        }
        ConvertD => {
            let v = pop(env, pc)?;
            push(env, pc, Value::Double(v.to_number()))?;
        }
        ConvertS => {
            let v = pop(env, pc)?;
            push(env, pc, Value::string(v.to_string_lossy()))?;
        }
        ConvertO => {
            let v = pop(env, pc)?;
            match v {
                Value::Object(_) => push(env, pc, v)?,
                _ => {
                    return Err(VmError::TypeError {
                        message: "convert_o requires an Object receiver".to_string(),
                        context: env.context(),
                    })
                }
            }
        }
        CoerceS => {
            let v = pop(env, pc)?;
            push(env, pc, v.coerce_string())?;
        }
        Coerce(ix) => {
            let v = pop(env, pc)?;
            let type_name = class_name_at(vm, *ix).unwrap_or_default();
            let coerced = v.coerce_to(&type_name)?;
            push(env, pc, coerced)?;
        }
        CoerceA => {}
        _ => {
            return Err(VmError::UnimplementedOpcode {
                opcode: 0,
                opcode_pc: pc,
            })
        }
    }
    Ok(Signal::Continue)
}

fn binary_number(env: &mut Environment, pc: usize, f: impl Fn(f64, f64) -> f64) -> Result<(), VmError> {
    let b = pop(env, pc)?;
    let a = pop(env, pc)?;
    push(env, pc, Value::Double(f(a.to_number(), b.to_number())))
}

fn binary_int(env: &mut Environment, pc: usize, f: impl Fn(i32, i32) -> i32) -> Result<(), VmError> {
    let b = pop(env, pc)?;
    let a = pop(env, pc)?;
    push(env, pc, Value::Int(f(a.to_int32(), b.to_int32())))
}

fn compare(env: &mut Environment, pc: usize, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), VmError> {
    let b = pop(env, pc)?;
    let a = pop(env, pc)?;
    let result = a.abstract_compare(&b).map(f).unwrap_or(false);
    push(env, pc, Value::Bool(result))
}

/// Resolves a `coerce`/`istype`/`astype` operand's qualified class name
/// from the constant pool's back-filled multiname names, same `QName`-only
/// limitation as [`crate::abc::decoder::qualified_name_of`].
fn class_name_at(vm: &Vm, multiname_ix: u32) -> Option<String> {
    vm.image
        .file
        .multiname_names
        .get(multiname_ix as usize)
        .and_then(|n| n.qualified_name.clone())
}

fn matches_type_name(v: &Value, type_name: Option<&str>) -> bool {
    match type_name {
        Some("int") => matches!(v, Value::Int(_)),
        Some("uint") => matches!(v, Value::Uint(_)),
        Some("Number") => matches!(v, Value::Int(_) | Value::Uint(_) | Value::Double(_)),
        Some("Boolean") => matches!(v, Value::Bool(_)),
        Some("String") => matches!(v, Value::String(_)),
        Some(_) => matches!(v, Value::Object(_)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::decode_abc;
    use crate::image::ProgramImage;
    use crate::value::Object;

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

    #[test]
    fn add_concatenates_when_either_side_is_string() {
        let mut env = env_with(vec![Value::Int(2), Value::string("x")]);
        let mut vm = new_vm();
        dispatch(&mut vm, &mut env, 0, &Instr::Add).unwrap();
        assert_eq!(env.operand_stack.pop().unwrap().to_string_lossy(), "2x");
    }

    #[test]
    fn add_sums_numbers_when_neither_side_is_string() {
        let mut env = env_with(vec![Value::Int(2), Value::Int(3)]);
        let mut vm = new_vm();
        dispatch(&mut vm, &mut env, 0, &Instr::Add).unwrap();
        assert!(matches!(env.operand_stack.pop(), Some(Value::Double(d)) if d == 5.0));
    }

    #[test]
    fn divide_on_doubles_produces_expected_quotient() {
        let mut env = env_with(vec![Value::Double(6.0), Value::Double(4.0)]);
        let mut vm = new_vm();
        dispatch(&mut vm, &mut env, 0, &Instr::Divide).unwrap();
        assert!(matches!(env.operand_stack.pop(), Some(Value::Double(d)) if d == 1.5));
    }

    #[test]
    fn less_than_is_false_when_either_operand_is_nan() {
        let mut env = env_with(vec![Value::Double(f64::NAN), Value::Int(1)]);
        let mut vm = new_vm();
        dispatch(&mut vm, &mut env, 0, &Instr::LessThan).unwrap();
        assert!(matches!(env.operand_stack.pop(), Some(Value::Bool(false))));
    }

    #[test]
    fn is_type_checks_object_by_default_for_unknown_class_names() {
        let obj = Value::Object(Object::new(None));
        assert!(matches_type_name(&obj, Some("com.example.Foo")));
        assert!(!matches_type_name(&Value::Int(1), Some("com.example.Foo")));
    }
}
