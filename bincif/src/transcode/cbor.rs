//! CBOR transcoding: convert a CIF document tree to CBOR binary data, and
//! render CBOR as diagnostic notation.
//!
//! Mapping from CIF to CBOR:
//!   - Node::Null    -> CBOR null (simple value 22)
//!   - Node::Integer -> CBOR integer (smallest encoding that fits)
//!   - Node::Float   -> CBOR float64 (always 9 bytes, never downgraded)
//!   - Node::String  -> CBOR text string (determinate length)
//!   - Node::Array   -> CBOR array (determinate length)
//!   - Node::Object  -> CBOR map (determinate length, text string keys, in
//!     document order)
//!
//! Integers that exceed CBOR's native integer range (-2^64 to 2^64-1)
//! produce an error rather than using bignum tags.

use ciborium::value::Value as CborValue;
use libcif::Node;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::fmt::Write as FmtWrite;

// ---------------------------------------------------------------------------
// Encode (CIF -> CBOR)
//
// Written directly rather than through ciborium's Value type, which would
// downgrade float64 to float16/float32 when the value fits.
// ---------------------------------------------------------------------------

/// Encode a document tree as CBOR bytes.
pub fn encode(node: &Node) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    write_node(&mut buf, node)?;
    Ok(buf)
}

fn write_node(buf: &mut Vec<u8>, node: &Node) -> Result<(), String> {
    match node {
        Node::Null => {
            buf.push(0xf6);
            Ok(())
        }
        Node::Integer(n) => write_integer(buf, n),
        Node::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
            Ok(())
        }
        Node::String(s) => {
            write_text(buf, s);
            Ok(())
        }
        Node::Array(items) => {
            write_type_and_length(buf, 4, items.len() as u64);
            for item in items {
                write_node(buf, item)?;
            }
            Ok(())
        }
        Node::Object(entries) => {
            write_type_and_length(buf, 5, entries.len() as u64);
            for (k, v) in entries {
                write_text(buf, k);
                write_node(buf, v)?;
            }
            Ok(())
        }
    }
}

fn write_text(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    write_type_and_length(buf, 3, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Write a CBOR major type and its argument in the shortest form:
/// 0-23 inline, then 1, 2, 4 or 8 following bytes (additional info 24-27).
fn write_type_and_length(buf: &mut Vec<u8>, major: u8, val: u64) {
    let high = major << 5;
    match val {
        0..=23 => buf.push(high | val as u8),
        24..=0xff => {
            buf.push(high | 24);
            buf.push(val as u8);
        }
        0x100..=0xffff => {
            buf.push(high | 25);
            buf.extend_from_slice(&(val as u16).to_be_bytes());
        }
        0x10000..=0xffff_ffff => {
            buf.push(high | 26);
            buf.extend_from_slice(&(val as u32).to_be_bytes());
        }
        _ => {
            buf.push(high | 27);
            buf.extend_from_slice(&val.to_be_bytes());
        }
    }
}

/// Major 0 holds n, major 1 holds -1 - n.
fn write_integer(buf: &mut Vec<u8>, n: &BigInt) -> Result<(), String> {
    let out_of_range = || {
        format!(
            "integer {} exceeds CBOR's native integer range (-2^64 to 2^64-1)",
            n
        )
    };
    if n.sign() == num_bigint::Sign::Minus {
        let val = ((-n) - BigInt::from(1)).to_u64().ok_or_else(out_of_range)?;
        write_type_and_length(buf, 1, val);
    } else {
        let val = n.to_u64().ok_or_else(out_of_range)?;
        write_type_and_length(buf, 0, val);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Diagnostic Notation (RFC 8949 §8)
// ---------------------------------------------------------------------------

/// Render CBOR bytes as diagnostic notation.
///
/// Renders from the binary rather than from the tree, so the output shows
/// the actual wire encoding.
pub fn diagnostic(input: &[u8]) -> Result<String, String> {
    let cbor_value: CborValue =
        ciborium::de::from_reader(input).map_err(|e| format!("CBOR decode error: {}", e))?;
    let mut out = String::new();
    diag_value(&mut out, &cbor_value, 0);
    out.push('\n');
    Ok(out)
}

// Writing to a String cannot fail; results of write! are ignored below.

fn diag_value(out: &mut String, val: &CborValue, indent: usize) {
    match val {
        CborValue::Null => out.push_str("null"),
        CborValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        CborValue::Integer(i) => {
            let _ = write!(out, "{}", i128::from(*i));
        }
        CborValue::Float(f) => diag_float(out, *f),
        CborValue::Text(s) => diag_text(out, s),
        CborValue::Bytes(b) => {
            out.push_str("h'");
            for byte in b {
                let _ = write!(out, "{:02x}", byte);
            }
            out.push('\'');
        }
        CborValue::Array(arr) => diag_array(out, arr, indent),
        CborValue::Map(pairs) => diag_map(out, pairs, indent),
        CborValue::Tag(tag, inner) => {
            let _ = write!(out, "{}(", tag);
            diag_value(out, inner, indent);
            out.push(')');
        }
        _ => {
            let _ = write!(out, "<?unknown {:?}>", val);
        }
    }
}

fn diag_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("NaN");
    } else if f.is_infinite() {
        out.push_str(if f.is_sign_positive() { "Infinity" } else { "-Infinity" });
    } else if f == 0.0 && f.is_sign_negative() {
        out.push_str("-0.0");
    } else if f.fract() == 0.0 && f.abs() < 1e18 {
        let _ = write!(out, "{:.1}", f);
    } else {
        let s = f.to_string();
        out.push_str(&s);
        if !s.contains(['.', 'e', 'E']) {
            out.push_str(".0");
        }
    }
}

fn diag_text(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn diag_array(out: &mut String, arr: &[CborValue], indent: usize) {
    if arr.is_empty() {
        out.push_str("[]");
        return;
    }
    // Short columns of scalars stay on one line
    if arr.len() <= 5 && arr.iter().all(is_simple_value) {
        out.push('[');
        for (i, item) in arr.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            diag_value(out, item, indent);
        }
        out.push(']');
        return;
    }
    out.push_str("[\n");
    for (i, item) in arr.iter().enumerate() {
        pad(out, indent + 2);
        diag_value(out, item, indent + 2);
        if i + 1 < arr.len() {
            out.push(',');
        }
        out.push('\n');
    }
    pad(out, indent);
    out.push(']');
}

fn diag_map(out: &mut String, pairs: &[(CborValue, CborValue)], indent: usize) {
    if pairs.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for (i, (k, v)) in pairs.iter().enumerate() {
        pad(out, indent + 2);
        diag_value(out, k, indent + 2);
        out.push_str(": ");
        diag_value(out, v, indent + 2);
        if i + 1 < pairs.len() {
            out.push(',');
        }
        out.push('\n');
    }
    pad(out, indent);
    out.push('}');
}

fn is_simple_value(val: &CborValue) -> bool {
    matches!(
        val,
        CborValue::Null
            | CborValue::Bool(_)
            | CborValue::Integer(_)
            | CborValue::Float(_)
            | CborValue::Text(_)
            | CborValue::Bytes(_)
    )
}
