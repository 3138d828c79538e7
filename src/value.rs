//! # Runtime Value Representation
//!
//! [`Value`] is the single tagged representation every operand-stack slot,
//! local register, and object property holds — primitives are never
//! re-wrapped once pushed. [`Object`] backs the one non-primitive case:
//! a reference-counted, interior-mutable property map keyed by
//! `(namespace, name)`, matching `avm2.runtime.ASObject`'s `properties`
//! dict in the original implementation, translated into the
//! `Rc<RefCell<_>>` shared-mutable-value idiom this codebase already used
//! for its other collection values.
//!
//! `undefined` and `null` are both distinguished [`Value`] variants rather
//! than one shared "absent" sentinel: AVM2 code observably tells
//! them apart (`== null` vs `== undefined`), so collapsing them would lose
//! information the interpreter needs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::VmError;

/// A class instance's or plain object's property bag, shared by reference
/// wherever the object itself is shared (assignment never copies it).
#[derive(Debug, Default)]
pub struct ObjectData {
    pub class_ix: Option<u32>,
    pub properties: HashMap<(String, String), Value>,
}

#[derive(Debug, Clone)]
pub struct Object(pub Rc<RefCell<ObjectData>>);

impl Object {
    pub fn new(class_ix: Option<u32>) -> Self {
        Object(Rc::new(RefCell::new(ObjectData {
            class_ix,
            properties: HashMap::new(),
        })))
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Value> {
        self.0
            .borrow()
            .properties
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn set(&self, namespace: &str, name: &str, value: Value) {
        self.0
            .borrow_mut()
            .properties
            .insert((namespace.to_string(), name.to_string()), value);
    }
}

/// A first-class function value produced by `newfunction`: the method it
/// invokes, plus the receiver its enclosing activation had at the time the
/// closure was created (AVM2 nested functions close over the outer `this`).
#[derive(Debug)]
pub struct FunctionData {
    pub method_ix: u32,
    pub bound_receiver: Value,
}

/// The VM's universal stack/register/property value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Uint(u32),
    Double(f64),
    Bool(bool),
    String(Rc<str>),
    Object(Object),
    Function(Rc<FunctionData>),
    Undefined,
    Null,
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "Number",
            Value::Bool(_) => "Boolean",
            Value::String(_) => "String",
            Value::Object(_) => "Object",
            Value::Function(_) => "Function",
            Value::Undefined => "undefined",
            Value::Null => "Object",
        }
    }

    /// ECMA-262 ToBoolean (used by `convert_b` and every truthiness test).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Uint(u) => *u != 0,
            Value::Double(d) => *d != 0.0 && !d.is_nan(),
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
            Value::Undefined | Value::Null => false,
        }
    }

    /// ECMA-262 ToNumber.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Uint(u) => *u as f64,
            Value::Double(d) => *d,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// ECMA-262 ToInt32 (via ToNumber, §9.5).
    pub fn to_int32(&self) -> i32 {
        to_int32(self.to_number())
    }

    /// ECMA-262 ToUint32 (via ToNumber, §9.6).
    pub fn to_uint32(&self) -> u32 {
        to_int32(self.to_number()) as u32
    }

    /// `convert_s`: null/undefined stringify to the literal words.
    pub fn to_string_lossy(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Uint(u) => u.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) => "[object Function]".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
        }
    }

    /// `coerce_s`: null/undefined coerce to null, not to the literal words
    /// `convert_s` produces.
    pub fn coerce_string(&self) -> Value {
        match self {
            Value::Undefined | Value::Null => Value::Null,
            other => Value::string(other.to_string_lossy()),
        }
    }

    /// Abstract equality (`equals`, ECMA-262 §11.9.3): numeric-leaning, with
    /// the usual null/undefined mutual equality and no other cross-type
    /// equalities implemented for this instruction subset.
    pub fn abstract_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined, Undefined) | (Null, Null) => true,
            (Undefined, Null) | (Null, Undefined) => true,
            (String(a), String(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Undefined, _) | (_, Undefined) | (Null, _) | (_, Null) => false,
            _ => self.to_number() == other.to_number(),
        }
    }

    /// Strict equality (`strictequals`): no coercion across representation
    /// kinds, except `int`/`uint`/`double` compare by numeric value.
    pub fn strict_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (String(a), String(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Undefined, Undefined) => true,
            (Null, Null) => true,
            (Object(a), Object(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Int(_) | Uint(_) | Double(_), Int(_) | Uint(_) | Double(_)) => {
                self.to_number() == other.to_number()
            }
            _ => false,
        }
    }

    /// Abstract relational comparison (ECMA-262 §11.8.5), returning `None`
    /// when either operand is NaN (the "undefined" comparison result).
    pub fn abstract_compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        if let (Value::String(a), Value::String(b)) = (self, other) {
            return Some(a.as_ref().cmp(b.as_ref()));
        }
        let (a, b) = (self.to_number(), other.to_number());
        a.partial_cmp(&b)
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// Coerce to a declared return/parameter type by qualified name, used
    /// by `coerce` and return-value coercion. Unknown class names
    /// pass the value through unchanged — the interpreter does not carry a
    /// full class hierarchy for every built-in type.
    pub fn coerce_to(&self, qualified_type_name: &str) -> Result<Value, VmError> {
        match qualified_type_name {
            "int" => Ok(Value::Int(self.to_int32())),
            "uint" => Ok(Value::Uint(self.to_uint32())),
            "Number" => Ok(Value::Double(self.to_number())),
            "Boolean" => Ok(Value::Bool(self.to_boolean())),
            "String" => Ok(self.coerce_string()),
            _ => Ok(self.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc();
    let m = n.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_int32_wraps_like_ecma_toint32() {
        assert_eq!(Value::Double(4294967296.0).to_int32(), 0);
        assert_eq!(Value::Double(-1.0).to_int32(), -1);
        assert_eq!(Value::Double(2147483648.0).to_int32(), -2147483648);
    }

    #[test]
    fn coerce_string_differs_from_convert_string_on_null() {
        assert!(matches!(Value::Null.coerce_string(), Value::Null));
        assert_eq!(Value::Null.to_string_lossy(), "null");
        assert_eq!(Value::Undefined.to_string_lossy(), "undefined");
    }

    #[test]
    fn abstract_equals_treats_null_and_undefined_as_equal() {
        assert!(Value::Null.abstract_equals(&Value::Undefined));
        assert!(!Value::Null.abstract_equals(&Value::Int(0)));
    }

    #[test]
    fn object_property_roundtrips_by_namespace_and_name() {
        let obj = Object::new(None);
        obj.set("", "x", Value::Int(42));
        assert!(matches!(obj.get("", "x"), Some(Value::Int(42))));
        assert!(obj.get("", "y").is_none());
    }
}
