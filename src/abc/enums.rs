//! # ABC tag/flag enumerations
//!
//! Plain integer-enums decode via `num_enum`'s `TryFromPrimitive`; bit-set
//! fields decode via `bitflags`. Both crates solve the same problem this
//! format repeatedly poses (a tagged byte that must become a checked Rust
//! type) the way a bitcode-format parser elsewhere in this codebase's
//! lineage already solves it, rather than hand-rolling another `TryFrom`
//! per enum.
//!
//! Numeric values are load-bearing: they are exactly the tag bytes AVM2
//! writes into an ABC block, not an arbitrary internal numbering.

use num_enum::TryFromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum NamespaceKind {
    Namespace = 0x08,
    PackageNamespace = 0x16,
    PackageInternalNs = 0x17,
    ProtectedNamespace = 0x18,
    ExplicitNamespace = 0x19,
    StaticProtectedNs = 0x1A,
    PrivateNs = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MultinameKind {
    QName = 0x07,
    QNameA = 0x0D,
    RtqName = 0x0F,
    RtqNameA = 0x10,
    RtqNameL = 0x11,
    RtqNameLA = 0x12,
    Multiname = 0x09,
    MultinameA = 0x0E,
    MultinameL = 0x1B,
    MultinameLA = 0x1C,
    TypeName = 0x1D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ConstantKind {
    Undefined = 0x00,
    Utf8 = 0x01,
    Int = 0x03,
    Uint = 0x04,
    PrivateNs = 0x05,
    Double = 0x06,
    Namespace = 0x08,
    Multiname = 0x09,
    False = 0x0A,
    True = 0x0B,
    Null = 0x0C,
    PackageNamespace = 0x16,
    PackageInternalNs = 0x17,
    ProtectedNamespace = 0x18,
    ExplicitNamespace = 0x19,
    StaticProtectedNs = 0x1A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TraitKind {
    Slot = 0,
    Method = 1,
    Getter = 2,
    Setter = 3,
    Class = 4,
    Function = 5,
    Const = 6,
}

bitflags::bitflags! {
    /// Method flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        const NEED_ARGUMENTS  = 0x01;
        const NEED_ACTIVATION = 0x02;
        const NEED_REST       = 0x04;
        const HAS_OPTIONAL    = 0x08;
        const IGNORE_REST     = 0x10;
        const EXPLICIT        = 0x20;
        const SET_DXNS        = 0x40;
        const HAS_PARAM_NAMES = 0x80;
    }

    /// Instance/class flags. `DYNAMIC` is the all-zero value (a class
    /// is dynamic exactly when it is not `SEALED`), named here to match the
    /// original implementation's `ClassFlags.DYNAMIC = 0x00` rather than
    /// leaving that state implicit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u8 {
        const DYNAMIC      = 0x00;
        const SEALED       = 0x01;
        const FINAL        = 0x02;
        const INTERFACE    = 0x04;
        const PROTECTED_NS = 0x08;
    }

    /// Trait attributes, the high nibble of a trait's kind byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraitAttributes: u8 {
        const FINAL    = 0x01;
        const OVERRIDE = 0x02;
        const METADATA = 0x04;
    }
}
