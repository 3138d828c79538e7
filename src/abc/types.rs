//! # ABC data model
//!
//! Plain structs and tagged enums for every record an ABC block can contain.
//! Nothing here owns another record directly — cross-references are stored
//! as plain `u32` indices into the owning [`super::decoder::AbcFile`]'s
//! arrays, avoiding owning-pointer cycles through a deeply cross-referenced
//! format. Back-fill attaches the denormalized
//! string fields (`name`, `qualified_name`, ...) as plain `Option<String>`
//! fields set by a second pass over an already-built `AbcFile`, rather than
//! computing them during the initial decode.

use super::enums::{ClassFlags, MethodFlags, TraitAttributes};

/// One of the constant pool's seven parallel arrays. Index 0 is
/// always a sentinel value; callers index with the raw 1-based value
/// straight from the bytecode.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub integers: Vec<i32>,
    pub uints: Vec<u32>,
    pub doubles: Vec<f64>,
    pub strings: Vec<String>,
    pub namespaces: Vec<Namespace>,
    pub ns_sets: Vec<NsSet>,
    pub multinames: Vec<Multiname>,
}

impl ConstantPool {
    pub fn string(&self, ix: u32) -> &str {
        self.strings.get(ix as usize).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct Namespace {
    pub kind: u8,
    pub name_ix: u32,
    /// Back-filled literal name.
    pub name: Option<String>,
}

/// An ordered list of namespace indices, as referenced by `Multiname` and
/// `MultinameL`.
#[derive(Debug, Clone, Default)]
pub struct NsSet {
    pub namespace_ixs: Vec<u32>,
    /// Back-filled namespace literal names, same order as `namespace_ixs`.
    pub namespace_names: Vec<String>,
}

/// Tagged multiname variant. The attribute-flavored (`*A`) kinds
/// carry identical payloads to their non-attribute counterparts and are
/// folded into the same payload variant with `is_attribute` recorded
/// alongside for the rare opcode that cares (`istype`/`astype` do not).
#[derive(Debug, Clone)]
pub enum Multiname {
    QName {
        ns_ix: u32,
        name_ix: u32,
        is_attribute: bool,
    },
    RtqName {
        name_ix: u32,
        is_attribute: bool,
    },
    RtqNameL {
        is_attribute: bool,
    },
    Multiname {
        name_ix: u32,
        ns_set_ix: u32,
        is_attribute: bool,
    },
    MultinameL {
        ns_set_ix: u32,
        is_attribute: bool,
    },
    TypeName {
        q_name_ix: u32,
        type_ixs: Vec<u32>,
    },
}

impl Multiname {
    pub fn needs_name_from_stack(&self) -> bool {
        matches!(self, Multiname::RtqNameL { .. } | Multiname::MultinameL { .. })
    }

    pub fn needs_namespace_from_stack(&self) -> bool {
        matches!(self, Multiname::RtqName { .. } | Multiname::RtqNameL { .. })
    }
}

/// Denormalized fields attached to a `Multiname` by the back-fill pass,
/// kept alongside the pool rather than inside the tagged enum so that
/// decoding stays a pure structural step and back-fill stays a pure
/// string-resolution step.
#[derive(Debug, Clone, Default)]
pub struct MultinameNames {
    pub namespace_name: Option<String>,
    pub name: Option<String>,
    pub ns_set_names: Vec<String>,
    pub qualified_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OptionDetail {
    pub value_index: u32,
    pub kind: u8,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub param_count: u32,
    pub return_type_ix: u32,
    pub param_type_ixs: Vec<u32>,
    pub name_ix: u32,
    pub flags: MethodFlags,
    pub options: Vec<OptionDetail>,
    pub param_name_ixs: Vec<u32>,
    /// Back-filled.
    pub name: Option<String>,
    pub return_type_name: Option<String>,
    pub param_type_names: Vec<Option<String>>,
    pub param_names: Vec<Option<String>>,
    /// Back-filled by the method-body back-reference pass: the body that
    /// implements this method, if any (abstract/interface methods have
    /// none).
    pub body_ix: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub key_ix: u32,
    pub value_ix: u32,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub name_ix: u32,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum TraitData {
    Slot {
        slot_id: u32,
        type_name_ix: u32,
        vindex: u32,
        vkind: Option<u8>,
    },
    Const {
        slot_id: u32,
        type_name_ix: u32,
        vindex: u32,
        vkind: Option<u8>,
    },
    Class {
        slot_id: u32,
        class_ix: u32,
    },
    Function {
        slot_id: u32,
        function_ix: u32,
    },
    Method {
        disposition_id: u32,
        method_ix: u32,
    },
    Getter {
        disposition_id: u32,
        method_ix: u32,
    },
    Setter {
        disposition_id: u32,
        method_ix: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Trait {
    pub name_ix: u32,
    pub attributes: TraitAttributes,
    pub data: TraitData,
    pub metadata_ixs: Vec<u32>,
    /// Back-filled qualified name of `name_ix`.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name_ix: u32,
    pub super_name_ix: u32,
    pub flags: ClassFlags,
    pub protected_ns_ix: Option<u32>,
    pub interface_ixs: Vec<u32>,
    pub init_ix: u32,
    pub traits: Vec<Trait>,
    /// Back-filled qualified names.
    pub qualified_name: Option<String>,
    pub super_qualified_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub init_ix: u32,
    pub traits: Vec<Trait>,
    /// Copied from the paired `Instance` by back-fill.
    pub qualified_name: Option<String>,
    pub super_qualified_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub init_ix: u32,
    pub traits: Vec<Trait>,
}

#[derive(Debug, Clone)]
pub struct Exception {
    pub from: u32,
    pub to: u32,
    pub target: u32,
    pub exc_type_ix: u32,
    pub var_name_ix: u32,
    /// Back-filled.
    pub exc_type_name: Option<String>,
    pub var_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MethodBody {
    pub method_ix: u32,
    pub max_stack: u32,
    pub local_count: u32,
    pub init_scope_depth: u32,
    pub max_scope_depth: u32,
    pub code: Vec<u8>,
    pub exceptions: Vec<Exception>,
    pub traits: Vec<Trait>,
}
