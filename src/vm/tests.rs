//! End-to-end interpreter tests: build a minimal but complete ABC block by
//! hand and drive it through [`decode_abc`]/[`Vm::call_method`], rather than
//! poking individual opcode handlers (covered in the `ops_*` modules).

use super::*;
use crate::abc::decode_abc;
use crate::image::ProgramImage;

fn u30(n: u32) -> Vec<u8> {
    // every value used by these fixtures fits in one byte (< 0x80)
    assert!(n < 0x80, "fixture helper only handles single-byte u30s");
    vec![n as u8]
}

/// One method (no params, no flags), one body running `code`, no classes,
/// scripts, or constant-pool entries beyond the sentinels.
fn single_method_abc(code: &[u8], max_stack: u32, local_count: u32) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&0u16.to_le_bytes()); // minor
    b.extend_from_slice(&46u16.to_le_bytes()); // major
    for _ in 0..7 {
        b.push(0); // cpool arrays: count = 0
    }
    b.extend(u30(1)); // method_count = 1
    b.extend(u30(0)); // param_count
    b.extend(u30(0)); // return_type_ix
    b.extend(u30(0)); // name_ix
    b.push(0); // flags
    b.push(0); // metadata_count
    b.push(0); // class_count
    b.push(0); // script_count
    b.extend(u30(1)); // method_body_count = 1
    b.extend(u30(0)); // method_ix
    b.extend(u30(max_stack));
    b.extend(u30(local_count));
    b.extend(u30(0)); // init_scope_depth
    b.extend(u30(1)); // max_scope_depth
    b.extend(u30(code.len() as u32));
    b.extend_from_slice(code);
    b.push(0); // exception_count
    b.push(0); // traits count
    b
}

fn vm_with_method(code: &[u8], max_stack: u32, local_count: u32) -> Vm {
    let file = decode_abc(&single_method_abc(code, max_stack, local_count)).unwrap();
    Vm::new(ProgramImage::new(file))
}

/// `pushbyte 2; pushbyte 3; add_i; returnvalue` yields the sum of the two
/// pushed ints.
#[test]
fn synthetic_body_add_i_yields_five() {
    let code = [
        0x24, 0x02, // pushbyte 2
        0x24, 0x03, // pushbyte 3
        0xC5, // add_i
        0x48, // returnvalue
    ];
    let mut vm = vm_with_method(&code, 4, 1);
    let result = vm.call_method(0, Value::Undefined, &[]).unwrap();
    assert!(matches!(result, Value::Int(5)));
}

/// `divide` on `6.0`/`4.0` yields `1.5`. `divide` has no literal-double
/// opcode operand here, so the body pushes the operands via `convert_d` on
/// integer literals instead.
#[test]
fn synthetic_body_divide_yields_one_point_five() {
    let code = [
        0x24, 0x06, // pushbyte 6
        0x75, // convert_d -> 6.0
        0x24, 0x04, // pushbyte 4
        0x75, // convert_d -> 4.0
        0xA3, // divide
        0x48, // returnvalue
    ];
    let mut vm = vm_with_method(&code, 4, 1);
    let result = vm.call_method(0, Value::Undefined, &[]).unwrap();
    assert!(matches!(result, Value::Double(d) if d == 1.5));
}

/// A forward `jump` skips the instruction it targets.
#[test]
fn jump_skips_to_the_targeted_instruction() {
    let code = [
        0x10, 0x02, 0x00, 0x00, // jump +2 (over the next pushbyte)
        0x24, 0x09, // pushbyte 9 (skipped)
        0x24, 0x07, // pushbyte 7
        0x48, // returnvalue
    ];
    let mut vm = vm_with_method(&code, 4, 1);
    let result = vm.call_method(0, Value::Undefined, &[]).unwrap();
    assert!(matches!(result, Value::Int(7)));
}

/// `returnvoid` yields `undefined` regardless of operand-stack contents.
#[test]
fn return_void_yields_undefined() {
    let code = [0x47]; // returnvoid
    let mut vm = vm_with_method(&code, 4, 1);
    let result = vm.call_method(0, Value::Undefined, &[]).unwrap();
    assert!(matches!(result, Value::Undefined));
}

/// A branch landing outside the method body is a `RangeError`.
#[test]
fn out_of_bounds_jump_is_a_range_error() {
    let code = [0x10, 0x7F, 0x00, 0x00]; // jump way past the end
    let mut vm = vm_with_method(&code, 4, 1);
    let err = vm.call_method(0, Value::Undefined, &[]).unwrap_err();
    assert!(matches!(err, VmError::RangeError { .. }));
}

/// An unknown opcode byte is reported as a malformed instruction, distinct
/// from an out-of-bounds jump/lookupswitch target (`RangeError`).
#[test]
fn unknown_opcode_byte_is_a_decode_error_with_position() {
    let code = [0xFE]; // not a defined AVM2 opcode
    let file = decode_abc(&single_method_abc(&code, 4, 1)).unwrap();
    let mut vm = Vm::new(ProgramImage::new(file));
    let err = vm.call_method(0, Value::Undefined, &[]).unwrap_err();
    assert!(matches!(err, VmError::MalformedInstruction { opcode_pc: 0, .. }));
}
