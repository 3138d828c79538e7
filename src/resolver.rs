//! # Multiname / scope resolver
//!
//! `resolve_multiname` binds a `(name, candidate-namespaces)` pair against
//! the active scope stack, most-recently-pushed scope first, matching
//! `VirtualMachine.resolve_multiname`/`resolve_qname` in the original
//! implementation. A scope stack entry that is a plain string is a
//! "degenerate scope" — a practical stand-in for a primitive receiver that
//! has no property map of its own — and resolves to itself immediately,
//! without a namespace/name match.

use crate::error::VmError;
use crate::value::{Object, Value};

/// What `resolve_multiname` found: the resolved value, the `(namespace,
/// name)` pair that matched, and the scope-stack entry it matched in.
pub struct Resolution {
    pub value: Value,
    pub namespace: String,
    pub name: String,
    pub scope: Value,
}

/// Resolve `name` against `namespaces` (tried in order) in each scope of
/// `scope_stack`, most-recent scope first.
pub fn resolve_multiname(
    scope_stack: &[Value],
    name: &str,
    namespaces: &[String],
) -> Result<Resolution, VmError> {
    for scope in scope_stack.iter().rev() {
        if let Value::String(s) = scope {
            return Ok(Resolution {
                value: Value::String(s.clone()),
                namespace: namespaces.first().cloned().unwrap_or_default(),
                name: name.to_string(),
                scope: scope.clone(),
            });
        }
        if let Value::Object(obj) = scope {
            for ns in namespaces {
                if let Some(value) = obj.get(ns, name) {
                    return Ok(Resolution {
                        value,
                        namespace: ns.clone(),
                        name: name.to_string(),
                        scope: scope.clone(),
                    });
                }
            }
        }
    }
    Err(VmError::reference(
        name,
        scope_stack.len(),
        namespaces.len(),
    ))
}

/// Resolve a fixed `(object, namespace, name)` triple directly, bypassing
/// the scope walk — used by `getproperty`/`setproperty` once the receiver
/// is already on the operand stack instead of implicit in scope.
pub fn resolve_qname(scope: &Value, namespace: &str, name: &str) -> Result<Value, VmError> {
    match scope {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Object(obj) => obj
            .get(namespace, name)
            .ok_or_else(|| VmError::reference(format!("{}.{}", namespace, name), 0, 0)),
        _ => Err(VmError::reference(name, 0, 0)),
    }
}

/// Set `name` on `obj` under `namespace` — the non-degenerate counterpart
/// used by `initproperty`/`setproperty`/trait slot initialization.
pub fn set_qname(obj: &Object, namespace: &str, name: &str, value: Value) {
    obj.set(namespace, name, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_in_most_recently_pushed_scope_first() {
        let outer = Object::new(None);
        outer.set("", "x", Value::Int(1));
        let inner = Object::new(None);
        inner.set("", "x", Value::Int(2));
        let stack = vec![Value::Object(outer), Value::Object(inner)];
        let ns = vec![String::new()];
        let r = resolve_multiname(&stack, "x", &ns).unwrap();
        assert!(matches!(r.value, Value::Int(2)));
    }

    #[test]
    fn degenerate_string_scope_resolves_to_itself() {
        let stack = vec![Value::string("Math")];
        let ns = vec![String::new()];
        let r = resolve_multiname(&stack, "max", &ns).unwrap();
        assert!(matches!(r.value, Value::String(_)));
    }

    #[test]
    fn missing_name_in_every_scope_is_a_reference_error() {
        let obj = Object::new(None);
        let stack = vec![Value::Object(obj)];
        let ns = vec![String::new()];
        assert!(matches!(
            resolve_multiname(&stack, "missing", &ns),
            Err(VmError::ReferenceError { .. })
        ));
    }
}
