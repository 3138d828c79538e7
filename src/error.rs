//! # Error Handling for the AVM2 Interpreter
//!
//! Two error families, matching the two phases of the pipeline:
//!
//! - [`DecodeError`] covers malformed ABC bytes: unknown tag bytes, out-of-range
//!   constant-pool indices, and truncated input. Decode errors are fatal to the
//!   decode call; no partial image is ever handed back to the host.
//! - [`VmError`] covers everything that can go wrong once a method body is
//!   executing: failed name resolution, bad coercions, stack discipline
//!   violations, and opcodes that are recognized but not (yet) implemented.
//!
//! Every variant carries enough context to reproduce the failure without a
//! debugger attached: a byte position or program counter, and a short
//! free-text description. Both types implement [`fmt::Display`] and
//! [`std::error::Error`] by hand, matching the rest of this interpreter's
//! error handling rather than pulling in a derive-macro crate for it.

use std::fmt;

/// Failures raised while decoding an ABC byte block.
#[derive(Debug, PartialEq)]
pub enum DecodeError {
    /// The read cursor ran past the end of the input while decoding a
    /// primitive or a length-prefixed field.
    UnexpectedEof { position: usize, context: String },
    /// A multiname or trait's leading tag byte did not match any known kind.
    UnknownTag {
        position: usize,
        tag: u8,
        context: String,
    },
    /// A constant-pool or table index was outside the bounds of its array.
    IndexOutOfRange {
        position: usize,
        index: u32,
        context: String,
    },
    /// A string field was not valid UTF-8.
    InvalidUtf8 { position: usize, context: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { position, context } => {
                write!(
                    f,
                    "DecodeError: unexpected end of input at byte {} ({})",
                    position, context
                )
            }
            DecodeError::UnknownTag {
                position,
                tag,
                context,
            } => write!(
                f,
                "DecodeError: unknown tag byte 0x{:02X} at byte {} ({})",
                tag, position, context
            ),
            DecodeError::IndexOutOfRange {
                position,
                index,
                context,
            } => write!(
                f,
                "DecodeError: index {} out of range at byte {} ({})",
                index, position, context
            ),
            DecodeError::InvalidUtf8 { position, context } => write!(
                f,
                "DecodeError: invalid UTF-8 at byte {} ({})",
                position, context
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Failures raised while executing a method body.
#[derive(Debug, PartialEq)]
pub enum VmError {
    /// Name resolution missed every scope/namespace combination.
    ReferenceError { name: String, context: String },
    /// A coercion or return-value-type mismatch.
    TypeError { message: String, context: String },
    /// A jump landed outside the method body, or another range violation.
    RangeError { message: String, context: String },
    /// The operand stack was popped below empty, or exceeded `max_stack`.
    StackUnderflow { opcode_pc: usize, context: String },
    StackOverflow { opcode_pc: usize, context: String },
    /// The scope stack was popped below empty.
    ScopeUnderflow { opcode_pc: usize },
    /// A recognized opcode with no execution provided.
    UnimplementedOpcode { opcode: u8, opcode_pc: usize },
    /// An instruction byte (or its immediate operands) could not be decoded
    /// mid-execution — an unknown opcode tag or a truncated operand. Kept
    /// distinct from `RangeError`, which is reserved for an otherwise
    /// well-formed jump/lookupswitch target landing out of bounds.
    MalformedInstruction { opcode_pc: usize, source: DecodeError },
    /// A user-level exception thrown by `throw` that escaped every `newcatch`
    /// scope in the active call.
    Thrown { value: String },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::ReferenceError { name, context } => {
                write!(f, "ReferenceError: {} is not defined ({})", name, context)
            }
            VmError::TypeError { message, context } => {
                write!(f, "TypeError: {} ({})", message, context)
            }
            VmError::RangeError { message, context } => {
                write!(f, "RangeError: {} ({})", message, context)
            }
            VmError::StackUnderflow { opcode_pc, context } => write!(
                f,
                "StackUnderflow: operand stack exhausted at pc={} ({})",
                opcode_pc, context
            ),
            VmError::StackOverflow { opcode_pc, context } => write!(
                f,
                "StackOverflow: operand stack exceeded max_stack at pc={} ({})",
                opcode_pc, context
            ),
            VmError::ScopeUnderflow { opcode_pc } => {
                write!(f, "VmInvariant: scope stack exhausted at pc={}", opcode_pc)
            }
            VmError::UnimplementedOpcode { opcode, opcode_pc } => write!(
                f,
                "UnimplementedOpcode: 0x{:02X} at pc={}",
                opcode, opcode_pc
            ),
            VmError::MalformedInstruction { opcode_pc, source } => write!(
                f,
                "MalformedInstruction: {} at pc={}",
                source, opcode_pc
            ),
            VmError::Thrown { value } => write!(f, "Error: {}", value),
        }
    }
}

impl std::error::Error for VmError {}

impl VmError {
    /// Build a [`VmError::ReferenceError`] with a short scope/stack-depth
    /// context string, the shape every resolver failure reports.
    pub fn reference(name: impl Into<String>, scope_depth: usize, stack_depth: usize) -> Self {
        VmError::ReferenceError {
            name: name.into(),
            context: format!("scope_depth={} stack_depth={}", scope_depth, stack_depth),
        }
    }
}
