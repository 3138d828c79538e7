//! # Built-in function bridge
//!
//! A minimal registry of built-in receivers — string objects for the
//! `http://adobe.com/AS3/2006/builtin` namespace, and singleton `Math`/
//! `StringUtil` objects for the empty namespace — mapping
//! `(receiver-shape, method-name)` to host-implemented functions. Consulted
//! by `callproperty`/`callpropvoid`/`callproplex` (`ops_control`) when name
//! resolution does not find the method on a user-defined object.
//!
//! Grounded in `avm2.abc.abc_instructions`'s `findInternalMethod` /
//! `bagForFindingInternalMethod` pattern — a name-keyed dispatch table
//! consulted by the call opcodes rather than a first-class function value —
//! translated here into a plain `match` over `(namespace, receiver, name)`
//! instead of a runtime "bag" lookup, since this interpreter has no
//! first-class function value to store in one.

use crate::error::VmError;
use crate::value::Value;

/// The ABC constant pool's conventional namespace for built-in instance
/// methods (`String.charAt`, `indexOf`, ...).
pub const BUILTIN_NS: &str = "http://adobe.com/AS3/2006/builtin";

/// Seed the global object with the sentinel properties `findpropstrict`
/// resolves `Math`/`StringUtil` references to. These are plain `Value`
/// strings, not full objects — the interpreter has no class hierarchy for
/// built-in library types, so the sentinel's own string content is what
/// [`call_builtin`] keys off of.
pub fn seed_global(global: &Value) {
    if let Value::Object(obj) = global {
        obj.set("", "Math", Value::string("Math"));
        obj.set("", "StringUtil", Value::string("StringUtil"));
        obj.set("", "URLUtil", Value::string("URLUtil"));
    }
}

/// Look up and invoke a built-in given the receiver already popped off the
/// operand stack, the multiname's resolved namespace, and its name. Returns
/// `None` when no built-in matches, so the caller can fall through to a
/// user-defined-method lookup (or a `ReferenceError`) instead.
pub fn call_builtin(receiver: &Value, namespace: &str, name: &str, args: &[Value]) -> Option<Result<Value, VmError>> {
    if namespace == BUILTIN_NS {
        if let Value::String(s) = receiver {
            return Some(string_method(s, name, args));
        }
    }
    match receiver {
        Value::String(tag) if tag.as_ref() == "Math" => math_method(name, args),
        Value::String(tag) if tag.as_ref() == "StringUtil" => string_util_method(name, args),
        Value::String(tag) if tag.as_ref() == "URLUtil" => url_util_method(name, args),
        _ => None,
    }
}

fn url_util_method(name: &str, args: &[Value]) -> Option<Result<Value, VmError>> {
    match name {
        "createAbsoluteURL" => {
            let base = args.first().map(|v| v.to_string_lossy()).unwrap_or_default();
            let rel = args.get(1).map(|v| v.to_string_lossy()).unwrap_or_default();
            Some(Ok(Value::string(create_absolute_url(&base, &rel))))
        }
        _ => None,
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, VmError> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i32;
    match name {
        "charAt" => {
            let index = args.first().map(|v| v.to_int32()).unwrap_or(0);
            let ch = if index >= 0 && index < len {
                chars[index as usize].to_string()
            } else {
                String::new()
            };
            Ok(Value::string(ch))
        }
        "indexOf" => {
            let needle = args.first().map(|v| v.to_string_lossy()).unwrap_or_default();
            let start = args.get(1).map(|v| v.to_int32().max(0) as usize).unwrap_or(0);
            Ok(Value::Int(find_from(&chars, &needle, start)))
        }
        "lastIndexOf" => {
            let needle = args.first().map(|v| v.to_string_lossy()).unwrap_or_default();
            let bound = args.get(1).map(|v| v.to_int32()).unwrap_or(len);
            Ok(Value::Int(rfind_before(&chars, &needle, bound)))
        }
        "substr" => {
            let start = resolve_substr_start(args.first(), len);
            let count = args
                .get(1)
                .map(|v| v.to_int32())
                .unwrap_or(len - start)
                .max(0);
            let end = (start + count).min(len);
            Ok(Value::string(slice_chars(&chars, start, end)))
        }
        "substring" => {
            let mut start = args.first().map(|v| v.to_int32()).unwrap_or(0).clamp(0, len);
            let mut end = args.get(1).map(|v| v.to_int32()).unwrap_or(len).clamp(0, len);
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Ok(Value::string(slice_chars(&chars, start, end)))
        }
        "length" => Ok(Value::Int(len)),
        "trim" => Ok(Value::string(s.trim().to_string())),
        _ => Err(VmError::reference(format!("String.{}", name), 0, args.len())),
    }
}

fn math_method(name: &str, args: &[Value]) -> Option<Result<Value, VmError>> {
    match name {
        "min" | "max" => {
            if args.len() < 2 {
                return Some(Err(VmError::RangeError {
                    message: format!("Math.{} requires at least 2 arguments", name),
                    context: format!("argc={}", args.len()),
                }));
            }
            let numbers: Vec<f64> = args.iter().map(|v| v.to_number()).collect();
            if numbers.iter().any(|n| n.is_nan()) {
                return Some(Ok(Value::Double(f64::NAN)));
            }
            let result = if name == "min" {
                numbers.into_iter().fold(f64::INFINITY, f64::min)
            } else {
                numbers.into_iter().fold(f64::NEG_INFINITY, f64::max)
            };
            Some(Ok(Value::Double(result)))
        }
        _ => None,
    }
}

fn string_util_method(name: &str, args: &[Value]) -> Option<Result<Value, VmError>> {
    match name {
        "trim" => {
            let value = match args.first() {
                Some(v) if !v.is_null_or_undefined() => v.to_string_lossy(),
                _ => String::new(),
            };
            Some(Ok(Value::string(value.trim().to_string())))
        }
        _ => None,
    }
}

/// Resolve a relative URL against a base path (observed source behavior,
/// not a conventional URL-join): the query portion of `base` (after `?`) is
/// dropped first. A `"./"`-prefixed `rel` is joined onto `base`'s segments
/// after each segment but the last donates its trailing character to the
/// next one (`"PAR/AM/1"` becomes `"PA/RA/M1"` before the join); a
/// `"../"`-prefixed `rel` instead drops `base`'s last segment and
/// concatenates directly with no separator and no character-shift; anything
/// else is returned unchanged (already absolute).
pub fn create_absolute_url(base: &str, rel: &str) -> String {
    let path = base.split('?').next().unwrap_or(base);
    let segments: Vec<&str> = path.split('/').collect();

    if let Some(tail) = rel.strip_prefix("./") {
        let shifted = shift_segments(&segments);
        format!("{}/{}", shifted.join("/"), tail)
    } else if let Some(tail) = rel.strip_prefix("../") {
        let dirname = if segments.len() > 1 {
            segments[..segments.len() - 1].join("/")
        } else {
            String::new()
        };
        format!("{}{}", dirname, tail)
    } else {
        rel.to_string()
    }
}

/// Carries each segment's trailing character into the start of the next
/// one, leaving the last segment whole. `["PAR","AM","1"]` becomes
/// `["PA","RA","M1"]`.
fn shift_segments(segments: &[&str]) -> Vec<String> {
    let mut result = Vec::with_capacity(segments.len());
    let mut carry = String::new();
    for (i, seg) in segments.iter().enumerate() {
        let combined = format!("{}{}", carry, seg);
        if i + 1 == segments.len() {
            result.push(combined);
        } else {
            let mut chars: Vec<char> = combined.chars().collect();
            carry = chars.pop().map(|c| c.to_string()).unwrap_or_default();
            result.push(chars.into_iter().collect());
        }
    }
    result
}

fn find_from(chars: &[char], needle: &str, start: usize) -> i32 {
    if needle.is_empty() {
        return start.min(chars.len()) as i32;
    }
    let needle: Vec<char> = needle.chars().collect();
    if start >= chars.len() || needle.len() > chars.len() - start {
        return -1;
    }
    for i in start..=(chars.len() - needle.len()) {
        if chars[i..i + needle.len()] == needle[..] {
            return i as i32;
        }
    }
    -1
}

fn rfind_before(chars: &[char], needle: &str, bound: i32) -> i32 {
    if needle.is_empty() {
        return bound.clamp(0, chars.len() as i32);
    }
    let needle: Vec<char> = needle.chars().collect();
    if needle.len() > chars.len() {
        return -1;
    }
    let last_start = (chars.len() - needle.len()) as i32;
    let mut i = bound.min(last_start);
    while i >= 0 {
        let start = i as usize;
        if chars[start..start + needle.len()] == needle[..] {
            return i;
        }
        i -= 1;
    }
    -1
}

fn resolve_substr_start(arg: Option<&Value>, len: i32) -> i32 {
    let start = arg.map(|v| v.to_int32()).unwrap_or(0);
    if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    }
}

fn slice_chars(chars: &[char], start: i32, end: i32) -> String {
    if start >= end {
        return String::new();
    }
    chars[start as usize..end as usize].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_index_of_finds_the_expected_offset() {
        let v = string_method("some:kinda:string", "indexOf", &[Value::string(":")]).unwrap();
        assert!(matches!(v, Value::Int(4)));
    }

    #[test]
    fn string_util_trim_handles_whitespace_and_null() {
        assert_eq!(
            string_util_method("trim", &[Value::string("  abc  ")]).unwrap().unwrap().to_string_lossy(),
            "abc"
        );
        assert_eq!(
            string_util_method("trim", &[Value::string("xyz")]).unwrap().unwrap().to_string_lossy(),
            "xyz"
        );
        assert_eq!(
            string_util_method("trim", &[Value::Null]).unwrap().unwrap().to_string_lossy(),
            ""
        );
    }

    #[test]
    fn math_max_and_min_pick_the_expected_extreme() {
        let max = math_method("max", &[Value::Double(45.0), Value::Double(123.45)]).unwrap().unwrap();
        assert_eq!(max.to_number(), 123.45);
        let min = math_method("min", &[Value::Double(23.45), Value::Double(123.0)]).unwrap().unwrap();
        assert_eq!(min.to_number(), 23.45);
        let max3 = math_method("max", &[Value::Double(-123.45), Value::Double(23.0), Value::Double(234.0)])
            .unwrap()
            .unwrap();
        assert_eq!(max3.to_number(), 234.0);
    }

    #[test]
    fn math_min_requires_at_least_two_arguments() {
        assert!(math_method("max", &[Value::Int(1)]).unwrap().is_err());
    }

    #[test]
    fn substr_handles_negative_start() {
        let v = string_method("abcdef", "substr", &[Value::Int(-3)]).unwrap();
        assert_eq!(v.to_string_lossy(), "def");
    }

    #[test]
    fn substring_swaps_reversed_bounds() {
        let v = string_method("abcdef", "substring", &[Value::Int(4), Value::Int(1)]).unwrap();
        assert_eq!(v.to_string_lossy(), "bcd");
    }

    #[test]
    fn create_absolute_url_dot_slash_shifts_base_segments() {
        assert_eq!(create_absolute_url("PAR/AM/1?a", "./param2"), "PA/RA/M1/param2");
    }

    #[test]
    fn create_absolute_url_dot_dot_slash_drops_last_segment_unshifted() {
        assert_eq!(create_absolute_url("PAR/AM/1?a", "../param2"), "PAR/AMparam2");
    }

    #[test]
    fn create_absolute_url_passes_through_already_relative_names() {
        assert_eq!(create_absolute_url("PAR/AM/1?a", "param2"), "param2");
    }
}
