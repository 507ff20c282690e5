//! Human-readable structure summaries.
//!
//! [`summarize`] turns a nested dict into a tree of short descriptions
//! (shapes, formatted numbers, type names); [`render`] prints that tree as
//! indented, key-sorted JSON with optional per-key annotations.

use std::collections::BTreeMap;
use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};

use crate::array::{format_shape, shape_of};
use crate::error::{NestoreError, Result};
use crate::value::{Dict, Value};

/// How many levels of nested dicts are expanded by default.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// A summarized dict with more entries than this is shown as a single line.
pub const COLLAPSE_THRESHOLD: usize = 5;

const COLLAPSED_DICT: &str = "variable of type dict";
const EMPTY_DICT: &str = "empty dict";

/// One node of a structure summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Summary {
    /// A one-line description.
    Text(String),
    /// An expanded nested dict.
    Nested(BTreeMap<String, Summary>),
}

impl Summary {
    /// The description, if this node is a leaf line.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Summary::Text(s) => Some(s),
            Summary::Nested(_) => None,
        }
    }

    /// The nested entries, if this node was expanded.
    pub fn as_nested(&self) -> Option<&BTreeMap<String, Summary>> {
        match self {
            Summary::Nested(m) => Some(m),
            Summary::Text(_) => None,
        }
    }
}

/// Summarizes `data`, expanding nested dicts up to `max_depth` levels.
///
/// ```rust
/// use nestore::{dict, summarize, Summary, Value};
///
/// let data = dict([("n", Value::from(7)), ("f", Value::from(1.2345))]);
/// let s = summarize(&data, 3);
/// assert_eq!(s["n"], Summary::Text("7 (type : int)".into()));
/// assert_eq!(s["f"], Summary::Text("1.235 (type : float)".into()));
/// ```
pub fn summarize(data: &Dict, max_depth: usize) -> BTreeMap<String, Summary> {
    data.iter()
        .map(|(key, value)| (key.clone(), summarize_value(value, max_depth)))
        .collect()
}

fn summarize_value(value: &Value, max_depth: usize) -> Summary {
    match value {
        Value::Dict(nested) => {
            if max_depth == 0 {
                Summary::Text(COLLAPSED_DICT.into())
            } else if nested.is_empty() {
                Summary::Text(EMPTY_DICT.into())
            } else {
                let inner = summarize(nested, max_depth - 1);
                if inner.len() > COLLAPSE_THRESHOLD {
                    Summary::Text(COLLAPSED_DICT.into())
                } else {
                    Summary::Nested(inner)
                }
            }
        }
        Value::Array(array) => Summary::Text(describe_shape(array.shape(), value.type_name())),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            // Ragged sequences still have a well-defined length.
            let shape = shape_of(value).unwrap_or_else(|_| vec![items.len()]);
            Summary::Text(describe_shape(&shape, value.type_name()))
        }
        Value::Int(i) => Summary::Text(format!("{i} (type : {})", value.type_name())),
        Value::Bool(b) => Summary::Text(format!("{} (type : {})", i64::from(*b), value.type_name())),
        Value::Float(f) => {
            Summary::Text(format!("{} (type : {})", format_float(*f), value.type_name()))
        }
        other => Summary::Text(format!("variable of type {}", other.type_name())),
    }
}

fn describe_shape(shape: &[usize], type_name: &str) -> String {
    format!("shape: {} (type: {type_name})", format_shape(shape))
}

/// Summarizes `data` at [`DEFAULT_MAX_DEPTH`] and renders it.
///
/// Output is pure ASCII: any other character in keys or descriptions is
/// written as a `\uXXXX` escape (a surrogate pair above U+FFFF).
///
/// Each `annotations` entry is inserted verbatim between a quoted key and its
/// colon, wherever that key appears in the output.
///
/// ```rust
/// use nestore::{dict, render, Value};
///
/// let out = render(&dict([("µ", Value::from(7))]), None)?;
/// assert_eq!(out, "{\n    \"\\u00b5\": \"7 (type : int)\"\n}");
/// # Ok::<(), nestore::NestoreError>(())
/// ```
pub fn render(data: &Dict, annotations: Option<&BTreeMap<String, String>>) -> Result<String> {
    render_summary(&summarize(data, DEFAULT_MAX_DEPTH), annotations)
}

/// Renders an already computed summary as 4-space indented JSON.
pub fn render_summary(
    summary: &BTreeMap<String, Summary>,
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<String> {
    let mut out = to_ascii_json(summary, PrettyFormatter::with_indent(b"    "))?;

    for (key, note) in annotations.into_iter().flatten() {
        let quoted = to_ascii_json(key, PrettyFormatter::new())?;
        out = out.replace(&format!("{quoted}:"), &format!("{quoted}{note}:"));
    }
    Ok(out)
}

fn to_ascii_json<T: Serialize + ?Sized>(value: &T, pretty: PrettyFormatter<'_>) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, AsciiFormatter(pretty));
    value.serialize(&mut ser)?;
    String::from_utf8(buf)
        .map_err(|e| NestoreError::Serialization(format!("summary is not UTF-8: {e}")))
}

/// Pretty printing with every non-ASCII character escaped.
struct AsciiFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiFormatter<'_> {
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

/// Three decimals when `0.1 <= |v| <= 100`, otherwise `d.ddde±XX`.
///
/// Rounding is half-up on the shortest decimal representation of `v`, so
/// `1.2345` becomes `1.235`.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }

    let sign = if v.is_sign_negative() && v != 0.0 { "-" } else { "" };
    let magnitude = v.abs();
    let (digits, exp) = decimal_digits(magnitude);

    if (0.1..=100.0).contains(&magnitude) {
        // Keep every digit down to the 10^-3 place.
        let keep = usize::try_from(exp + 4).unwrap_or(0);
        let (mut rounded, new_exp) = round_digits(&digits, exp, keep);
        if new_exp > exp {
            rounded.push('0');
        }
        format!("{sign}{}", fixed_point(&rounded, new_exp))
    } else {
        let (rounded, exp) = round_digits(&digits, exp, 4);
        let (head, tail) = rounded.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{head}.{tail}e{exp_sign}{:02}", exp.unsigned_abs())
    }
}

/// Shortest round-trip digits of a non-negative finite value and the decimal
/// exponent of the first digit.
///
/// Subnormals carry too few bits for the shortest form to keep their real
/// leading digits (`5e-324` is really `4.94...e-324`), so they are expanded
/// to 17 significant digits instead.
fn decimal_digits(v: f64) -> (Vec<u8>, i32) {
    let sci = if v.is_subnormal() {
        format!("{v:.16e}")
    } else {
        format!("{v:e}")
    };
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits = mantissa
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();
    (digits, exp.parse().unwrap_or(0))
}

/// Rounds half-up to `keep` significant digits, padding with zeros. A carry out
/// of the first digit bumps the exponent.
fn round_digits(digits: &[u8], exp: i32, keep: usize) -> (String, i32) {
    let mut kept: Vec<u8> = digits.iter().copied().take(keep).collect();
    kept.resize(keep, 0);
    let round_up = digits.get(keep).is_some_and(|d| *d >= 5);

    let mut exp = exp;
    if round_up {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, 1);
                kept.pop();
                exp += 1;
                break;
            }
            i -= 1;
            if kept[i] == 9 {
                kept[i] = 0;
            } else {
                kept[i] += 1;
                break;
            }
        }
    }
    let text = kept.iter().map(|d| char::from(b'0' + d)).collect();
    (text, exp)
}

fn fixed_point(digits: &str, exp: i32) -> String {
    // `digits` covers the places 10^exp down to 10^-3.
    let mut digits = digits.to_string();
    let int_len = exp + 1;
    if int_len <= 0 {
        let pad = usize::try_from(-int_len).unwrap_or(0);
        digits.insert_str(0, &"0".repeat(pad));
        return format!("0.{digits}");
    }
    let split = usize::try_from(int_len).unwrap_or(0).min(digits.len());
    let (int_part, frac_part) = digits.split_at(split);
    format!("{int_part}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::value::dict;

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.2345), "1.235");
        assert_eq!(format_float(0.05), "5.000e-02");
        assert_eq!(format_float(0.1), "0.100");
        assert_eq!(format_float(100.0), "100.000");
        assert_eq!(format_float(99.9996), "100.000");
        assert_eq!(format_float(-2.5), "-2.500");
        assert_eq!(format_float(123456.0), "1.235e+05");
        assert_eq!(format_float(9.99951e-7), "1.000e-06");
        assert_eq!(format_float(0.0), "0.000e+00");
        assert_eq!(format_float(5e-324), "4.941e-324");
        assert_eq!(format_float(-5e-324), "-4.941e-324");
        assert_eq!(format_float(f64::MIN_POSITIVE), "2.225e-308");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn scalar_and_shape_lines() {
        let data = dict([
            ("i", Value::from(7)),
            ("b", Value::from(true)),
            ("s", Value::from("text")),
            ("arr", Value::Array(Array::from(vec![1.0, 2.0, 3.0]))),
            ("lst", Value::from(vec![1, 2])),
            ("none", Value::None),
        ]);
        let s = summarize(&data, DEFAULT_MAX_DEPTH);
        assert_eq!(s["i"].as_text(), Some("7 (type : int)"));
        assert_eq!(s["b"].as_text(), Some("1 (type : bool)"));
        assert_eq!(s["s"].as_text(), Some("variable of type str"));
        assert_eq!(s["arr"].as_text(), Some("shape: (3,) (type: ndarray)"));
        assert_eq!(s["lst"].as_text(), Some("shape: (2,) (type: list)"));
        assert_eq!(s["none"].as_text(), Some("variable of type NoneType"));
    }

    #[test]
    fn nested_dicts_collapse_past_threshold() {
        let five = Value::dict((0..5).map(|i| (format!("k{i}"), Value::from(i))));
        let six = Value::dict((0..6).map(|i| (format!("k{i}"), Value::from(i))));
        let data = dict([
            ("five", five),
            ("six", six),
            ("empty", Value::Dict(Dict::new())),
        ]);
        let s = summarize(&data, DEFAULT_MAX_DEPTH);
        assert_eq!(s["five"].as_nested().map(BTreeMap::len), Some(5));
        assert_eq!(s["six"].as_text(), Some("variable of type dict"));
        assert_eq!(s["empty"].as_text(), Some("empty dict"));
    }

    #[test]
    fn zero_depth_collapses_every_dict() {
        let data = dict([("inner", Value::dict([("a", 1)])), ("x", Value::from(2))]);
        let s = summarize(&data, 0);
        assert_eq!(s["inner"].as_text(), Some("variable of type dict"));
        assert_eq!(s["x"].as_text(), Some("2 (type : int)"));
    }

    #[test]
    fn render_escapes_non_ascii() -> Result<()> {
        let data = dict([("température", Value::from("°C")), ("g", Value::from("𝄞"))]);
        let notes = BTreeMap::from([("température".to_string(), " [K]".to_string())]);
        let out = render(&data, Some(&notes))?;
        assert!(out.is_ascii());
        assert_eq!(
            out,
            "{\n    \"g\": \"variable of type str\",\n    \"temp\\u00e9rature\" [K]: \"variable of type str\"\n}"
        );

        let quoted = to_ascii_json("é𝄞", PrettyFormatter::new())?;
        assert_eq!(quoted, "\"\\u00e9\\ud834\\udd1e\"");
        Ok(())
    }

    #[test]
    fn render_splices_annotations() -> Result<()> {
        let data = dict([("volts", Value::from(1.5)), ("a", Value::from(2))]);
        let notes = BTreeMap::from([("volts".to_string(), " [V]".to_string())]);
        let out = render(&data, Some(&notes))?;
        assert_eq!(
            out,
            "{\n    \"a\": \"2 (type : int)\",\n    \"volts\" [V]: \"1.500 (type : float)\"\n}"
        );
        Ok(())
    }
}
