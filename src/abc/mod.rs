//! # ABC decoding
//!
//! `enums` holds the tag/flag byte enumerations, `types` the plain data
//! model they decode into, and `decoder` the actual byte-to-struct pass.

pub mod decoder;
pub mod enums;
pub mod types;

pub use decoder::{decode_abc, AbcFile};
pub use types::{Class, ConstantPool, Instance, Method, MethodBody, Multiname, Script, Trait};
