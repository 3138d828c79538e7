//! # ABC decoder
//!
//! Turns a byte slice holding one complete ABC block into an [`AbcFile`]:
//! the constant pool plus the five top-level tables (methods, metadata,
//! instances+classes, scripts, method bodies), read in the order the
//! format lays them out. A second pass, [`AbcFile::propagate_strings`], then
//! walks the freshly built arrays and denormalizes every numeric index that
//! names a string, multiname, or other record into a plain owned `String`
//! or `Option<String>` field, so that later components never have to chase
//! an index through the pool at run time.
//!
//! Decode control flow mirrors `sentrychris-omglang`'s `parse_bytecode`: a
//! single forward pass over a cursor, one function per sub-record, building
//! up owned vectors. Unlike that parser, malformed input here is reported
//! as a typed [`DecodeError`] rather than asserted or unwrapped away, since
//! an ABC block is untrusted input rather than this system's own compiler
//! output.

use crate::error::DecodeError;
use crate::reader::Reader;

use super::enums::{ClassFlags, MethodFlags, MultinameKind, NamespaceKind, TraitAttributes, TraitKind};
use super::types::{
    Class, ConstantPool, Exception, Instance, Item, Metadata, Method, MethodBody, Multiname,
    MultinameNames, Namespace, NsSet, OptionDetail, Script, Trait, TraitData,
};

/// The fully decoded program image's raw data, before link tables are built
/// (those live one layer up, in [`crate::image::ProgramImage`]).
#[derive(Debug, Clone)]
pub struct AbcFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub methods: Vec<Method>,
    pub metadata: Vec<Metadata>,
    pub instances: Vec<Instance>,
    pub classes: Vec<Class>,
    pub scripts: Vec<Script>,
    pub method_bodies: Vec<MethodBody>,
    /// Back-filled, parallel to `pool.multinames`.
    pub multiname_names: Vec<MultinameNames>,
}

/// Decode one complete ABC block.
pub fn decode_abc(data: &[u8]) -> Result<AbcFile, DecodeError> {
    let mut r = Reader::new(data);

    let minor_version = r.read_u16()?;
    let major_version = r.read_u16()?;
    let pool = read_constant_pool(&mut r)?;

    let method_count = r.read_u30()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(&mut r)?);
    }

    let metadata_count = r.read_u30()?;
    let mut metadata = Vec::with_capacity(metadata_count as usize);
    for _ in 0..metadata_count {
        metadata.push(read_metadata(&mut r)?);
    }

    let class_count = r.read_u30()?;
    let mut instances = Vec::with_capacity(class_count as usize);
    for _ in 0..class_count {
        instances.push(read_instance(&mut r)?);
    }
    let mut classes = Vec::with_capacity(class_count as usize);
    for _ in 0..class_count {
        classes.push(read_class(&mut r)?);
    }

    let script_count = r.read_u30()?;
    let mut scripts = Vec::with_capacity(script_count as usize);
    for _ in 0..script_count {
        scripts.push(read_script(&mut r)?);
    }

    let method_body_count = r.read_u30()?;
    let mut method_bodies = Vec::with_capacity(method_body_count as usize);
    for _ in 0..method_body_count {
        method_bodies.push(read_method_body(&mut r)?);
    }

    let mut file = AbcFile {
        minor_version,
        major_version,
        pool,
        methods,
        metadata,
        instances,
        classes,
        scripts,
        method_bodies,
        multiname_names: Vec::new(),
    };
    file.back_reference_bodies();
    file.propagate_strings();
    Ok(file)
}

fn read_constant_pool(r: &mut Reader) -> Result<ConstantPool, DecodeError> {
    let mut pool = ConstantPool::default();

    let int_count = r.read_u30()?;
    pool.integers.push(0);
    for _ in 1..int_count {
        pool.integers.push(r.read_var_int(true)? as i32);
    }

    let uint_count = r.read_u30()?;
    pool.uints.push(0);
    for _ in 1..uint_count {
        pool.uints.push(r.read_var_int(false)? as u32);
    }

    let double_count = r.read_u30()?;
    pool.doubles.push(f64::NAN);
    for _ in 1..double_count {
        pool.doubles.push(r.read_d64()?);
    }

    let string_count = r.read_u30()?;
    pool.strings.push(String::new());
    for _ in 1..string_count {
        pool.strings.push(r.read_string_u30()?);
    }

    let ns_count = r.read_u30()?;
    pool.namespaces.push(Namespace {
        kind: 0,
        name_ix: 0,
        name: None,
    });
    for _ in 1..ns_count {
        let pos = r.position();
        let kind = r.read_u8()?;
        NamespaceKind::try_from(kind).map_err(|_| DecodeError::UnknownTag {
            position: pos,
            tag: kind,
            context: "namespace_info kind".to_string(),
        })?;
        let name_ix = r.read_u30()?;
        pool.namespaces.push(Namespace {
            kind,
            name_ix,
            name: None,
        });
    }

    let ns_set_count = r.read_u30()?;
    pool.ns_sets.push(NsSet::default());
    for _ in 1..ns_set_count {
        let n = r.read_u30()?;
        let mut namespace_ixs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            namespace_ixs.push(r.read_u30()?);
        }
        pool.ns_sets.push(NsSet {
            namespace_ixs,
            namespace_names: Vec::new(),
        });
    }

    let multiname_count = r.read_u30()?;
    // index 0's payload is never read as a real multiname; QName{0,0} is an
    // inert placeholder satisfying the tagged enum without an Option layer.
    pool.multinames.push(Multiname::QName {
        ns_ix: 0,
        name_ix: 0,
        is_attribute: false,
    });
    for _ in 1..multiname_count {
        pool.multinames.push(read_multiname(r)?);
    }

    Ok(pool)
}

fn read_multiname(r: &mut Reader) -> Result<Multiname, DecodeError> {
    let pos = r.position();
    let tag = r.read_u8()?;
    let kind = MultinameKind::try_from(tag).map_err(|_| DecodeError::UnknownTag {
        position: pos,
        tag,
        context: "multiname_info kind".to_string(),
    })?;
    Ok(match kind {
        MultinameKind::QName => Multiname::QName {
            ns_ix: r.read_u30()?,
            name_ix: r.read_u30()?,
            is_attribute: false,
        },
        MultinameKind::QNameA => Multiname::QName {
            ns_ix: r.read_u30()?,
            name_ix: r.read_u30()?,
            is_attribute: true,
        },
        MultinameKind::RtqName => Multiname::RtqName {
            name_ix: r.read_u30()?,
            is_attribute: false,
        },
        MultinameKind::RtqNameA => Multiname::RtqName {
            name_ix: r.read_u30()?,
            is_attribute: true,
        },
        MultinameKind::RtqNameL => Multiname::RtqNameL { is_attribute: false },
        MultinameKind::RtqNameLA => Multiname::RtqNameL { is_attribute: true },
        MultinameKind::Multiname => {
            let name_ix = r.read_u30()?;
            let ns_set_ix = r.read_u30()?;
            Multiname::Multiname {
                name_ix,
                ns_set_ix,
                is_attribute: false,
            }
        }
        MultinameKind::MultinameA => {
            let name_ix = r.read_u30()?;
            let ns_set_ix = r.read_u30()?;
            Multiname::Multiname {
                name_ix,
                ns_set_ix,
                is_attribute: true,
            }
        }
        MultinameKind::MultinameL => Multiname::MultinameL {
            ns_set_ix: r.read_u30()?,
            is_attribute: false,
        },
        MultinameKind::MultinameLA => Multiname::MultinameL {
            ns_set_ix: r.read_u30()?,
            is_attribute: true,
        },
        MultinameKind::TypeName => {
            let q_name_ix = r.read_u30()?;
            let n = r.read_u30()?;
            let mut type_ixs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                type_ixs.push(r.read_u30()?);
            }
            Multiname::TypeName { q_name_ix, type_ixs }
        }
    })
}

fn read_method(r: &mut Reader) -> Result<Method, DecodeError> {
    let param_count = r.read_u30()?;
    let return_type_ix = r.read_u30()?;
    let mut param_type_ixs = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        param_type_ixs.push(r.read_u30()?);
    }
    let name_ix = r.read_u30()?;
    let flags = MethodFlags::from_bits_truncate(r.read_u8()?);

    let mut options = Vec::new();
    if flags.contains(MethodFlags::HAS_OPTIONAL) {
        let n = r.read_u30()?;
        for _ in 0..n {
            let value_index = r.read_u30()?;
            let kind = r.read_u8()?;
            options.push(OptionDetail { value_index, kind });
        }
    }

    let mut param_name_ixs = Vec::new();
    if flags.contains(MethodFlags::HAS_PARAM_NAMES) {
        for _ in 0..param_count {
            param_name_ixs.push(r.read_u30()?);
        }
    }

    Ok(Method {
        param_count,
        return_type_ix,
        param_type_ixs,
        name_ix,
        flags,
        options,
        param_name_ixs,
        name: None,
        return_type_name: None,
        param_type_names: Vec::new(),
        param_names: Vec::new(),
        body_ix: None,
    })
}

fn read_metadata(r: &mut Reader) -> Result<Metadata, DecodeError> {
    let name_ix = r.read_u30()?;
    let item_count = r.read_u30()?;
    let mut items = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        items.push(Item {
            key_ix: r.read_u30()?,
            value_ix: r.read_u30()?,
        });
    }
    Ok(Metadata { name_ix, items })
}

fn read_instance(r: &mut Reader) -> Result<Instance, DecodeError> {
    let name_ix = r.read_u30()?;
    let super_name_ix = r.read_u30()?;
    let flags = ClassFlags::from_bits_truncate(r.read_u8()?);
    let protected_ns_ix = if flags.contains(ClassFlags::PROTECTED_NS) {
        Some(r.read_u30()?)
    } else {
        None
    };
    let interface_count = r.read_u30()?;
    let mut interface_ixs = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interface_ixs.push(r.read_u30()?);
    }
    let init_ix = r.read_u30()?;
    let traits = read_traits(r)?;
    Ok(Instance {
        name_ix,
        super_name_ix,
        flags,
        protected_ns_ix,
        interface_ixs,
        init_ix,
        traits,
        qualified_name: None,
        super_qualified_name: None,
    })
}

fn read_class(r: &mut Reader) -> Result<Class, DecodeError> {
    let init_ix = r.read_u30()?;
    let traits = read_traits(r)?;
    Ok(Class {
        init_ix,
        traits,
        qualified_name: None,
        super_qualified_name: None,
    })
}

fn read_script(r: &mut Reader) -> Result<Script, DecodeError> {
    let init_ix = r.read_u30()?;
    let traits = read_traits(r)?;
    Ok(Script { init_ix, traits })
}

fn read_traits(r: &mut Reader) -> Result<Vec<Trait>, DecodeError> {
    let count = r.read_u30()?;
    let mut traits = Vec::with_capacity(count as usize);
    for _ in 0..count {
        traits.push(read_trait(r)?);
    }
    Ok(traits)
}

fn read_trait(r: &mut Reader) -> Result<Trait, DecodeError> {
    let name_ix = r.read_u30()?;
    let pos = r.position();
    let kind_byte = r.read_u8()?;
    let kind = TraitKind::try_from(kind_byte & 0x0F).map_err(|_| DecodeError::UnknownTag {
        position: pos,
        tag: kind_byte,
        context: "trait kind".to_string(),
    })?;
    let attributes = TraitAttributes::from_bits_truncate(kind_byte >> 4);

    let data = match kind {
        TraitKind::Slot | TraitKind::Const => {
            let slot_id = r.read_u30()?;
            let type_name_ix = r.read_u30()?;
            let vindex = r.read_u30()?;
            let vkind = if vindex != 0 { Some(r.read_u8()?) } else { None };
            if matches!(kind, TraitKind::Const) {
                TraitData::Const {
                    slot_id,
                    type_name_ix,
                    vindex,
                    vkind,
                }
            } else {
                TraitData::Slot {
                    slot_id,
                    type_name_ix,
                    vindex,
                    vkind,
                }
            }
        }
        TraitKind::Class => TraitData::Class {
            slot_id: r.read_u30()?,
            class_ix: r.read_u30()?,
        },
        TraitKind::Function => TraitData::Function {
            slot_id: r.read_u30()?,
            function_ix: r.read_u30()?,
        },
        TraitKind::Method => TraitData::Method {
            disposition_id: r.read_u30()?,
            method_ix: r.read_u30()?,
        },
        TraitKind::Getter => TraitData::Getter {
            disposition_id: r.read_u30()?,
            method_ix: r.read_u30()?,
        },
        TraitKind::Setter => TraitData::Setter {
            disposition_id: r.read_u30()?,
            method_ix: r.read_u30()?,
        },
    };

    let mut metadata_ixs = Vec::new();
    if attributes.contains(TraitAttributes::METADATA) {
        let n = r.read_u30()?;
        for _ in 0..n {
            metadata_ixs.push(r.read_u30()?);
        }
    }

    Ok(Trait {
        name_ix,
        attributes,
        data,
        metadata_ixs,
        name: None,
    })
}

fn read_method_body(r: &mut Reader) -> Result<MethodBody, DecodeError> {
    let method_ix = r.read_u30()?;
    let max_stack = r.read_u30()?;
    let local_count = r.read_u30()?;
    let init_scope_depth = r.read_u30()?;
    let max_scope_depth = r.read_u30()?;
    let code_len = r.read_u30()?;
    let code = r.read_n(code_len as usize)?.to_vec();

    let exception_count = r.read_u30()?;
    let mut exceptions = Vec::with_capacity(exception_count as usize);
    for _ in 0..exception_count {
        exceptions.push(Exception {
            from: r.read_u30()?,
            to: r.read_u30()?,
            target: r.read_u30()?,
            exc_type_ix: r.read_u30()?,
            var_name_ix: r.read_u30()?,
            exc_type_name: None,
            var_name: None,
        });
    }

    let traits = read_traits(r)?;

    Ok(MethodBody {
        method_ix,
        max_stack,
        local_count,
        init_scope_depth,
        max_scope_depth,
        code,
        exceptions,
        traits,
    })
}

impl AbcFile {
    /// method → body back-reference: each body names exactly one
    /// method; this records the inverse on the method record itself so that
    /// callers holding a method index can reach its body without a lookup
    /// through [`crate::image::ProgramImage`].
    fn back_reference_bodies(&mut self) {
        for (body_ix, body) in self.method_bodies.iter().enumerate() {
            if let Some(method) = self.methods.get_mut(body.method_ix as usize) {
                method.body_ix = Some(body_ix as u32);
            }
        }
    }

    /// "Propagate strings": attach literal names to every record that
    /// only stores a numeric index, in one pass over the freshly decoded
    /// arrays. Idempotent — running it twice yields the same result, since
    /// every field it writes is a pure function of already-decoded data.
    pub fn propagate_strings(&mut self) {
        // namespaces: attach literal names from the string pool.
        for ns in self.pool.namespaces.iter_mut() {
            ns.name = Some(self.pool.strings.get(ns.name_ix as usize).cloned().unwrap_or_default());
        }

        // ns_sets: attach the list of namespace names.
        let ns_names: Vec<String> = self
            .pool
            .namespaces
            .iter()
            .map(|ns| ns.name.clone().unwrap_or_default())
            .collect();
        for set in self.pool.ns_sets.iter_mut() {
            set.namespace_names = set
                .namespace_ixs
                .iter()
                .map(|&ix| ns_names.get(ix as usize).cloned().unwrap_or_default())
                .collect();
        }

        // multinames: attach (namespace-name, name, ns-set-names, qualified-name).
        self.multiname_names = self
            .pool
            .multinames
            .iter()
            .map(|m| multiname_names(m, &self.pool, &ns_names))
            .collect();

        // instances: attach qualified class name and super name.
        for inst in self.instances.iter_mut() {
            inst.qualified_name = qualified_name_of(inst.name_ix, &self.pool, &ns_names);
            inst.super_qualified_name = if inst.super_name_ix != 0 {
                qualified_name_of(inst.super_name_ix, &self.pool, &ns_names)
            } else {
                None
            };
            backfill_trait_names(&mut inst.traits, &self.pool, &ns_names);
        }

        // classes: copy class/super name from the paired instance.
        for (class, inst) in self.classes.iter_mut().zip(self.instances.iter()) {
            class.qualified_name = inst.qualified_name.clone();
            class.super_qualified_name = inst.super_qualified_name.clone();
            backfill_trait_names(&mut class.traits, &self.pool, &ns_names);
        }

        for script in self.scripts.iter_mut() {
            backfill_trait_names(&mut script.traits, &self.pool, &ns_names);
        }

        // methods: attach return-type name, param-type names, name, param names.
        for method in self.methods.iter_mut() {
            method.name = non_empty(self.pool.string(method.name_ix));
            method.return_type_name = qualified_name_of(method.return_type_ix, &self.pool, &ns_names);
            method.param_type_names = method
                .param_type_ixs
                .iter()
                .map(|&ix| qualified_name_of(ix, &self.pool, &ns_names))
                .collect();
            method.param_names = method
                .param_name_ixs
                .iter()
                .map(|&ix| non_empty(self.pool.string(ix)))
                .collect();
        }

        // method bodies: exceptions and their own traits.
        for body in self.method_bodies.iter_mut() {
            for exc in body.exceptions.iter_mut() {
                exc.exc_type_name = qualified_name_of(exc.exc_type_ix, &self.pool, &ns_names);
                exc.var_name = non_empty(self.pool.string(exc.var_name_ix));
            }
            backfill_trait_names(&mut body.traits, &self.pool, &ns_names);
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// The `"namespace.name"` qualified-name stringification used as a link
/// table key (GLOSSARY), computed for a `QName`-kind multiname index. Only
/// `QName` carries enough information to compute this at decode time;
/// runtime-resolved variants have no fixed qualified name.
fn qualified_name_of(multiname_ix: u32, pool: &ConstantPool, ns_names: &[String]) -> Option<String> {
    match pool.multinames.get(multiname_ix as usize)? {
        Multiname::QName { ns_ix, name_ix, .. } => {
            let ns = ns_names.get(*ns_ix as usize).cloned().unwrap_or_default();
            let name = pool.string(*name_ix);
            if ns.is_empty() && name.is_empty() {
                None
            } else {
                Some(format!("{}.{}", ns, name).trim_matches('.').to_string())
            }
        }
        Multiname::TypeName { q_name_ix, .. } => qualified_name_of(*q_name_ix, pool, ns_names),
        _ => None,
    }
}

fn multiname_names(m: &Multiname, pool: &ConstantPool, ns_names: &[String]) -> MultinameNames {
    match m {
        Multiname::QName { ns_ix, name_ix, .. } => {
            let namespace_name = ns_names.get(*ns_ix as usize).cloned();
            let name = non_empty(pool.string(*name_ix));
            let qualified_name = match (&namespace_name, &name) {
                (Some(ns), Some(n)) => Some(format!("{}.{}", ns, n).trim_matches('.').to_string()),
                (None, Some(n)) => Some(n.clone()),
                _ => None,
            };
            MultinameNames {
                namespace_name,
                name,
                ns_set_names: Vec::new(),
                qualified_name,
            }
        }
        Multiname::RtqName { name_ix, .. } => MultinameNames {
            namespace_name: None,
            name: non_empty(pool.string(*name_ix)),
            ns_set_names: Vec::new(),
            qualified_name: None,
        },
        Multiname::RtqNameL { .. } => MultinameNames::default(),
        Multiname::Multiname {
            name_ix, ns_set_ix, ..
        } => MultinameNames {
            namespace_name: None,
            name: non_empty(pool.string(*name_ix)),
            ns_set_names: pool
                .ns_sets
                .get(*ns_set_ix as usize)
                .map(|s| s.namespace_names.clone())
                .unwrap_or_default(),
            qualified_name: None,
        },
        Multiname::MultinameL { ns_set_ix, .. } => MultinameNames {
            namespace_name: None,
            name: None,
            ns_set_names: pool
                .ns_sets
                .get(*ns_set_ix as usize)
                .map(|s| s.namespace_names.clone())
                .unwrap_or_default(),
            qualified_name: None,
        },
        Multiname::TypeName { q_name_ix, .. } => MultinameNames {
            qualified_name: qualified_name_of(*q_name_ix, pool, ns_names),
            ..MultinameNames::default()
        },
    }
}

fn backfill_trait_names(traits: &mut [Trait], pool: &ConstantPool, ns_names: &[String]) {
    for t in traits.iter_mut() {
        t.name = qualified_name_of(t.name_ix, pool, ns_names).or_else(|| non_empty(pool.string(t.name_ix)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the smallest possible ABC block: no constant pool entries
    /// beyond the sentinels, no methods/classes/scripts/bodies.
    fn empty_abc_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes()); // minor
        b.extend_from_slice(&46u16.to_le_bytes()); // major
        for _ in 0..7 {
            b.push(0); // each cpool array's u30 count = 0
        }
        b.push(0); // method_count
        b.push(0); // metadata_count
        b.push(0); // class_count
        b.push(0); // script_count
        b.push(0); // method_body_count
        b
    }

    #[test]
    fn decodes_empty_abc_with_sentinels_only() {
        let file = decode_abc(&empty_abc_bytes()).unwrap();
        assert_eq!(file.major_version, 46);
        assert_eq!(file.pool.integers.len(), 1);
        assert_eq!(file.pool.strings.len(), 1);
        assert_eq!(file.methods.len(), 0);
        assert_eq!(file.method_bodies.len(), 0);
    }

    #[test]
    fn truncated_input_reports_unexpected_eof() {
        let bytes = &empty_abc_bytes()[..4];
        match decode_abc(bytes) {
            Err(DecodeError::UnexpectedEof { .. }) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn decodes_one_qname_multiname_and_backfills_qualified_name() {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&46u16.to_le_bytes());
        b.push(0); // ints
        b.push(0); // uints
        b.push(0); // doubles
        // strings: count=3 (sentinel + "pkg" + "Foo")
        b.push(3);
        b.push(3);
        b.extend_from_slice(b"pkg");
        b.push(3);
        b.extend_from_slice(b"Foo");
        // namespaces: count=2 (sentinel + one PackageNamespace -> "pkg")
        b.push(2);
        b.push(0x16); // PackageNamespace
        b.push(1); // name_ix = 1 ("pkg")
        b.push(0); // ns_sets count
        // multinames: count=2 (sentinel + QName{ns_ix=1,name_ix=2})
        b.push(2);
        b.push(0x07); // QName
        b.push(1); // ns_ix
        b.push(2); // name_ix
        b.push(0); // method_count
        b.push(0); // metadata_count
        b.push(0); // class_count
        b.push(0); // script_count
        b.push(0); // method_body_count

        let file = decode_abc(&b).unwrap();
        assert_eq!(file.multiname_names[1].qualified_name.as_deref(), Some("pkg.Foo"));
    }
}
