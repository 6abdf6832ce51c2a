//! Python-compatible text rendering of JSON values
//!
//! Assignment hash inputs and stored variation values were historically
//! produced by Python's `str()`. Rendering them identically keeps hashes and
//! variation keys stable across implementations.
//!
//! ```text
//! "abc"           -> abc        ('abc' inside a list or object)
//! true / null     -> True / None
//! 2.0             -> 2.0
//! 0.00001 / 1e16  -> 1e-05 / 1e+16
//! [1, "a"]        -> [1, 'a']
//! {"k": 1}        -> {'k': 1}
//! ```
//!
//! Object keys follow `serde_json::Map` order, which is sorted.

use serde_json::{Map, Number, Value};
use std::fmt::Write;

/// `str(value)`: strings bare, everything else as [`python_repr`].
#[must_use]
pub fn python_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => python_repr(other),
    }
}

/// `repr(value)`: strings quoted, containers with `", "` separators.
#[must_use]
pub fn python_repr(value: &Value) -> String {
    let mut out = String::new();
    write_repr(&mut out, value);
    out
}

/// `repr(float)`: shortest round-trip digits, scientific notation when the
/// decimal exponent is below -4 or at least 16.
#[must_use]
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let scientific = format!("{f:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let fixed = f.to_string();
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}

fn number_repr(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map_or_else(|| n.to_string(), float_repr)
    }
}

fn write_repr(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&number_repr(n)),
        Value::String(s) => write_string_repr(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_dict_repr(out, map),
    }
}

fn write_dict_repr(out: &mut String, map: &Map<String, Value>) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_string_repr(out, key);
        out.push_str(": ");
        write_repr(out, value);
    }
    out.push('}');
}

// Single quotes unless the text holds a single quote and no double quote
fn write_string_repr(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(python_str(&json!("abc")), "abc");
        assert_eq!(python_str(&json!(42)), "42");
        assert_eq!(python_str(&json!(u64::MAX)), "18446744073709551615");
        assert_eq!(python_str(&json!(true)), "True");
        assert_eq!(python_str(&json!(false)), "False");
        assert_eq!(python_str(&json!(null)), "None");
    }

    #[test]
    fn test_float_fixed_range() {
        assert_eq!(float_repr(2.0), "2.0");
        assert_eq!(float_repr(0.25), "0.25");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(123_456_789.125), "123456789.125");
        assert_eq!(float_repr(1e15), "1000000000000000.0");
    }

    #[test]
    fn test_float_scientific_range() {
        assert_eq!(float_repr(0.00001), "1e-05");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(-2.5e20), "-2.5e+20");
        assert_eq!(float_repr(1e100), "1e+100");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn test_containers_use_repr() {
        assert_eq!(python_str(&json!([1, 2])), "[1, 2]");
        assert_eq!(python_str(&json!(["a", true, null, 0.5])), "['a', True, None, 0.5]");
        assert_eq!(python_str(&json!([])), "[]");
        assert_eq!(python_str(&json!({"k": [1.0], "a": "x"})), "{'a': 'x', 'k': [1.0]}");
        assert_eq!(python_str(&json!({})), "{}");
    }

    #[test]
    fn test_string_repr_quoting() {
        assert_eq!(python_repr(&json!("plain")), "'plain'");
        assert_eq!(python_repr(&json!("it's")), "\"it's\"");
        assert_eq!(python_repr(&json!("both ' and \"")), "'both \\' and \"'");
        assert_eq!(python_repr(&json!("a\\b\nc")), "'a\\\\b\\nc'");
        assert_eq!(python_repr(&json!("\u{1}")), "'\\x01'");
        assert_eq!(python_repr(&json!("café")), "'café'");
    }
}
