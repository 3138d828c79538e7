//! # Instruction decoding
//!
//! [`Instr`] is a tagged variant with one entry per AVM2 opcode;
//! [`decode_instr`] reads one opcode byte plus its immediate operands from a
//! [`Reader`] positioned at a method body's current program counter and
//! returns the instruction alongside its encoded length (opcode byte +
//! operands), which jump arithmetic needs to find the next instruction's
//! start.
//!
//! Shape follows `sentrychris-omglang`'s `Instr` enum and its
//! byte-to-variant `match` in `bytecode::parse_bytecode` — one instruction
//! per opcode byte, decoded by a single dispatching function rather than a
//! lookup table of closures (the fixed-array dispatch that fits the
//! *execution* loop is a separate concern from *decoding*, handled in
//! `vm::mod`'s opcode-indexed handler table).

use crate::error::DecodeError;
use crate::reader::Reader;

#[derive(Debug, Clone)]
pub enum Instr {
    Nop,
    // --- stack / locals ---
    PushNull,
    PushUndefined,
    PushByte(i8),
    PushShort(i32),
    PushTrue,
    PushFalse,
    PushNan,
    PushString(u32),
    PushInt(u32),
    PushUint(u32),
    PushDouble(u32),
    PushNamespace(u32),
    PushScope,
    PopScope,
    Pop,
    Dup,
    Swap,
    GetLocal(u32),
    SetLocal(u32),
    Kill(u32),
    IncLocal(u32),
    IncLocalI(u32),
    DecLocal(u32),
    DecLocalI(u32),

    // --- arithmetic / comparison / conversion ---
    Add,
    AddI,
    Subtract,
    SubtractI,
    Multiply,
    MultiplyI,
    Divide,
    Modulo,
    Negate,
    NegateI,
    Increment,
    IncrementI,
    Decrement,
    DecrementI,
    Not,
    BitNot,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    URShift,
    Equals,
    StrictEquals,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
    TypeOf,
    InstanceOf,
    IsType(u32),
    IsTypeLate,
    AsType(u32),
    AsTypeLate,
    ConvertB,
    ConvertI,
    ConvertU,
    ConvertD,
    ConvertS,
    ConvertO,
    CoerceS,
    Coerce(u32),
    CoerceA,

    // --- control flow ---
    Jump(i32),
    IfTrue(i32),
    IfFalse(i32),
    IfEq(i32),
    IfNe(i32),
    IfLt(i32),
    IfLe(i32),
    IfGt(i32),
    IfGe(i32),
    IfNLt(i32),
    IfNLe(i32),
    IfNGt(i32),
    IfNGe(i32),
    IfStrictEq(i32),
    IfStrictNe(i32),
    LookupSwitch { default_offset: i32, case_offsets: Vec<i32> },
    Label,
    Throw,
    NewCatch(u32),
    PushWith,
    ReturnValue,
    ReturnVoid,

    // --- property / scope access ---
    FindProperty(u32),
    FindPropStrict(u32),
    GetLex(u32),
    GetProperty(u32),
    SetProperty(u32),
    InitProperty(u32),
    GetSuper(u32),
    SetSuper(u32),
    NewObject(u32),
    NewArray(u32),
    NewClass(u32),
    NewFunction(u32),
    NewActivation,
    GetSlot(u32),
    SetSlot(u32),
    GetGlobalSlot(u32),
    SetGlobalSlot(u32),
    GetGlobalScope,
    GetScopeObject(u8),
    DeleteProperty(u32),
    GetDescendants(u32),
    In,

    // --- calls ---
    Call(u32),
    Construct(u32),
    CallMethod(u32, u32),
    CallStatic(u32, u32),
    CallSuper(u32, u32),
    CallProperty(u32, u32),
    ConstructSuper(u32),
    ConstructProp(u32, u32),
    CallPropLex(u32, u32),
    CallSuperVoid(u32, u32),
    CallPropVoid(u32, u32),

    // --- iteration ---
    NextName,
    NextValue,
    HasNext,
    HasNext2(u32, u32),

    // --- misc / coercion-adjacent (diagnostics-only at execution time) ---
    CheckFilter,
    EscXElem,
    EscXAttr,
    Debug { debug_type: u8, index: u32, reg: u8, extra: u32 },
    DebugLine(u32),
    DebugFile(u32),
    Dxns(u32),
    DxnsLate,
}

/// Decode one instruction at the reader's current position. Returns the
/// instruction plus its total encoded length (opcode byte + operands),
/// which callers use for jump-offset arithmetic (branch offsets are measured
/// relative to the byte *after* the instruction).
pub fn decode_instr(r: &mut Reader) -> Result<(Instr, usize), DecodeError> {
    let start = r.position();
    let op = r.read_u8()?;
    let instr = match op {
        0x02 => Instr::Nop,
        0x20 => Instr::PushNull,
        0x21 => Instr::PushUndefined,
        0x24 => Instr::PushByte(r.read_u8()? as i8),
        0x25 => Instr::PushShort(r.read_var_int(true)? as i32),
        0x26 => Instr::PushTrue,
        0x27 => Instr::PushFalse,
        0x28 => Instr::PushNan,
        0x2C => Instr::PushString(r.read_u30()?),
        0x2D => Instr::PushInt(r.read_u30()?),
        0x2E => Instr::PushUint(r.read_u30()?),
        0x2F => Instr::PushDouble(r.read_u30()?),
        0x31 => Instr::PushNamespace(r.read_u30()?),
        0x30 => Instr::PushScope,
        0x1D => Instr::PopScope,
        0x29 => Instr::Pop,
        0x2A => Instr::Dup,
        0x2B => Instr::Swap,
        0x62 => Instr::GetLocal(r.read_u30()?),
        0x63 => Instr::SetLocal(r.read_u30()?),
        0xD0..=0xD3 => Instr::GetLocal((op - 0xD0) as u32),
        0xD4..=0xD7 => Instr::SetLocal((op - 0xD4) as u32),
        0x08 => Instr::Kill(r.read_u30()?),
        0x92 => Instr::IncLocal(r.read_u30()?),
        0xC2 => Instr::IncLocalI(r.read_u30()?),
        0x94 => Instr::DecLocal(r.read_u30()?),
        0xC3 => Instr::DecLocalI(r.read_u30()?),

        0xA0 => Instr::Add,
        0xC5 => Instr::AddI,
        0xA1 => Instr::Subtract,
        0xC6 => Instr::SubtractI,
        0xA2 => Instr::Multiply,
        0xC7 => Instr::MultiplyI,
        0xA3 => Instr::Divide,
        0xA4 => Instr::Modulo,
        0x90 => Instr::Negate,
        0xC4 => Instr::NegateI,
        0x91 => Instr::Increment,
        0xC0 => Instr::IncrementI,
        0x93 => Instr::Decrement,
        0xC1 => Instr::DecrementI,
        0x96 => Instr::Not,
        0x97 => Instr::BitNot,
        0xA8 => Instr::BitAnd,
        0xA9 => Instr::BitOr,
        0xAA => Instr::BitXor,
        0xA5 => Instr::LShift,
        0xA6 => Instr::RShift,
        0xA7 => Instr::URShift,
        0xAB => Instr::Equals,
        0xAC => Instr::StrictEquals,
        0xAD => Instr::LessThan,
        0xAE => Instr::LessEquals,
        0xAF => Instr::GreaterThan,
        0xB0 => Instr::GreaterEquals,
        0x95 => Instr::TypeOf,
        0xB1 => Instr::InstanceOf,
        0xB2 => Instr::IsType(r.read_u30()?),
        0xB3 => Instr::IsTypeLate,
        0x86 => Instr::AsType(r.read_u30()?),
        0x87 => Instr::AsTypeLate,
        0x76 => Instr::ConvertB,
        0x73 => Instr::ConvertI,
        0x74 => Instr::ConvertU,
        0x75 => Instr::ConvertD,
        0x70 => Instr::ConvertS,
        0x77 => Instr::ConvertO,
        0x85 => Instr::CoerceS,
        0x80 => Instr::Coerce(r.read_u30()?),
        0x82 => Instr::CoerceA,

        0x10 => Instr::Jump(r.read_s24()?),
        0x11 => Instr::IfTrue(r.read_s24()?),
        0x12 => Instr::IfFalse(r.read_s24()?),
        0x13 => Instr::IfEq(r.read_s24()?),
        0x14 => Instr::IfNe(r.read_s24()?),
        0x15 => Instr::IfLt(r.read_s24()?),
        0x16 => Instr::IfLe(r.read_s24()?),
        0x17 => Instr::IfGt(r.read_s24()?),
        0x18 => Instr::IfGe(r.read_s24()?),
        0x0C => Instr::IfNLt(r.read_s24()?),
        0x0D => Instr::IfNLe(r.read_s24()?),
        0x0E => Instr::IfNGt(r.read_s24()?),
        0x0F => Instr::IfNGe(r.read_s24()?),
        0x19 => Instr::IfStrictEq(r.read_s24()?),
        0x1A => Instr::IfStrictNe(r.read_s24()?),
        0x1B => {
            let default_offset = r.read_s24()?;
            let case_count = r.read_u30()?;
            let mut case_offsets = Vec::with_capacity(case_count as usize + 1);
            for _ in 0..=case_count {
                case_offsets.push(r.read_s24()?);
            }
            Instr::LookupSwitch { default_offset, case_offsets }
        }
        0x09 => Instr::Label,
        0x03 => Instr::Throw,
        0x5A => Instr::NewCatch(r.read_u30()?),
        0x1C => Instr::PushWith,
        0x48 => Instr::ReturnValue,
        0x47 => Instr::ReturnVoid,

        0x5E => Instr::FindProperty(r.read_u30()?),
        0x5D => Instr::FindPropStrict(r.read_u30()?),
        0x60 => Instr::GetLex(r.read_u30()?),
        0x66 => Instr::GetProperty(r.read_u30()?),
        0x61 => Instr::SetProperty(r.read_u30()?),
        0x68 => Instr::InitProperty(r.read_u30()?),
        0x04 => Instr::GetSuper(r.read_u30()?),
        0x05 => Instr::SetSuper(r.read_u30()?),
        0x55 => Instr::NewObject(r.read_u30()?),
        0x56 => Instr::NewArray(r.read_u30()?),
        0x58 => Instr::NewClass(r.read_u30()?),
        0x40 => Instr::NewFunction(r.read_u30()?),
        0x57 => Instr::NewActivation,
        0x6C => Instr::GetSlot(r.read_u30()?),
        0x6D => Instr::SetSlot(r.read_u30()?),
        0x6E => Instr::GetGlobalSlot(r.read_u30()?),
        0x6F => Instr::SetGlobalSlot(r.read_u30()?),
        0x64 => Instr::GetGlobalScope,
        0x65 => Instr::GetScopeObject(r.read_u8()?),
        0x6A => Instr::DeleteProperty(r.read_u30()?),
        0x59 => Instr::GetDescendants(r.read_u30()?),
        0xB4 => Instr::In,

        0x41 => Instr::Call(r.read_u30()?),
        0x42 => Instr::Construct(r.read_u30()?),
        0x43 => Instr::CallMethod(r.read_u30()?, r.read_u30()?),
        0x44 => Instr::CallStatic(r.read_u30()?, r.read_u30()?),
        0x45 => Instr::CallSuper(r.read_u30()?, r.read_u30()?),
        0x46 => Instr::CallProperty(r.read_u30()?, r.read_u30()?),
        0x49 => Instr::ConstructSuper(r.read_u30()?),
        0x4A => Instr::ConstructProp(r.read_u30()?, r.read_u30()?),
        0x4C => Instr::CallPropLex(r.read_u30()?, r.read_u30()?),
        0x4E => Instr::CallSuperVoid(r.read_u30()?, r.read_u30()?),
        0x4F => Instr::CallPropVoid(r.read_u30()?, r.read_u30()?),

        0x1E => Instr::NextName,
        0x23 => Instr::NextValue,
        0x1F => Instr::HasNext,
        0x32 => Instr::HasNext2(r.read_u30()?, r.read_u30()?),

        0x78 => Instr::CheckFilter,
        0x71 => Instr::EscXElem,
        0x72 => Instr::EscXAttr,
        0xEF => Instr::Debug {
            debug_type: r.read_u8()?,
            index: r.read_u30()?,
            reg: r.read_u8()?,
            extra: r.read_u30()?,
        },
        0xF0 => Instr::DebugLine(r.read_u30()?),
        0xF1 => Instr::DebugFile(r.read_u30()?),
        0x06 => Instr::Dxns(r.read_u30()?),
        0x07 => Instr::DxnsLate,

        other => {
            return Err(DecodeError::UnknownTag {
                position: start,
                tag: other,
                context: "opcode".to_string(),
            })
        }
    };
    Ok((instr, r.position() - start))
}
