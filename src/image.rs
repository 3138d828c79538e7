//! # Program image and link tables
//!
//! [`ProgramImage`] wraps a decoded [`AbcFile`] with the four lookup tables
//! the interpreter needs at call time: method→body, class→script,
//! qualified-name→class, and qualified-class-name.trait-name→method. These
//! are built once, eagerly, right after decode — the same shape as
//! `VirtualMachine.__init__`'s `link_methods_to_bodies` /
//! `link_classes_to_scripts` / `link_names_to_classes` /
//! `link_names_to_methods` in the Python original, just computed up front
//! into owned `HashMap`s instead of on first access.

use std::collections::HashMap;

use crate::abc::types::TraitData;
use crate::abc::AbcFile;
use crate::error::VmError;

/// A decoded ABC block plus its derived link tables, ready for execution.
pub struct ProgramImage {
    pub file: AbcFile,
    /// method index → method body index (not every method has a body:
    /// abstract/interface methods do not).
    method_to_body: HashMap<u32, u32>,
    /// class index → script index that declares it as a top-level trait.
    class_to_script: HashMap<u32, u32>,
    /// qualified class name → class index.
    name_to_class: HashMap<String, u32>,
    /// `"<class qualified name>.<member name>"` → method index, for getters,
    /// setters, and ordinary methods declared on a class.
    name_to_method: HashMap<String, u32>,
}

impl ProgramImage {
    pub fn new(file: AbcFile) -> Self {
        let method_to_body = link_methods_to_bodies(&file);
        let class_to_script = link_classes_to_scripts(&file);
        let name_to_class = link_names_to_classes(&file);
        let name_to_method = link_names_to_methods(&file);
        ProgramImage {
            file,
            method_to_body,
            class_to_script,
            name_to_class,
            name_to_method,
        }
    }

    pub fn body_for_method(&self, method_ix: u32) -> Option<u32> {
        self.method_to_body.get(&method_ix).copied()
    }

    pub fn script_for_class(&self, class_ix: u32) -> Option<u32> {
        self.class_to_script.get(&class_ix).copied()
    }

    pub fn lookup_class(&self, qualified_name: &str) -> Result<u32, VmError> {
        self.name_to_class
            .get(qualified_name)
            .copied()
            .ok_or_else(|| VmError::reference(qualified_name, 0, 0))
    }

    pub fn lookup_method(&self, qualified_name: &str) -> Result<u32, VmError> {
        self.name_to_method
            .get(qualified_name)
            .copied()
            .ok_or_else(|| VmError::reference(qualified_name, 0, 0))
    }
}

fn link_methods_to_bodies(file: &AbcFile) -> HashMap<u32, u32> {
    file.method_bodies
        .iter()
        .enumerate()
        .map(|(body_ix, body)| (body.method_ix, body_ix as u32))
        .collect()
}

fn link_classes_to_scripts(file: &AbcFile) -> HashMap<u32, u32> {
    let mut map = HashMap::new();
    for (script_ix, script) in file.scripts.iter().enumerate() {
        for t in &script.traits {
            if let TraitData::Class { class_ix, .. } = t.data {
                map.insert(class_ix, script_ix as u32);
            }
        }
    }
    map
}

fn link_names_to_classes(file: &AbcFile) -> HashMap<String, u32> {
    file.instances
        .iter()
        .enumerate()
        .filter_map(|(class_ix, inst)| inst.qualified_name.clone().map(|n| (n, class_ix as u32)))
        .collect()
}

fn link_names_to_methods(file: &AbcFile) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    for (inst, class) in file.instances.iter().zip(file.classes.iter()) {
        let class_name = match &inst.qualified_name {
            Some(n) => n,
            None => continue,
        };
        // Instance traits carry per-instance methods/getters/setters; class
        // traits carry the static ones. Both resolve under the same
        // "<class>.<member>" key.
        for t in inst.traits.iter().chain(class.traits.iter()) {
            let method_ix = match &t.data {
                TraitData::Method { method_ix, .. }
                | TraitData::Getter { method_ix, .. }
                | TraitData::Setter { method_ix, .. } => *method_ix,
                _ => continue,
            };
            if let Some(member_name) = &t.name {
                map.insert(format!("{}.{}", class_name, member_name), method_ix);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::decode_abc;

    fn empty_abc_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&46u16.to_le_bytes());
        for _ in 0..7 {
            b.push(0);
        }
        b.push(0);
        b.push(0);
        b.push(0);
        b.push(0);
        b.push(0);
        b
    }

    #[test]
    fn empty_image_has_empty_link_tables() {
        let file = decode_abc(&empty_abc_bytes()).unwrap();
        let image = ProgramImage::new(file);
        assert!(image.lookup_class("Foo").is_err());
        assert!(image.body_for_method(0).is_none());
    }
}
