//! Text export and import of property stores.
//!
//! Three forms are supported:
//!
//! - [`Properties::dump`]: `name=value` lines, every binding with a string
//!   form, in insertion order.
//! - [`Properties::to_yaml`] / [`Properties::from_yaml`]: a block-style YAML
//!   subset. Nested stores become nested maps, and a store whose names are
//!   exactly `0..n` becomes a sequence. Private names (leading `_`) are not
//!   exported; opaque data is exported only when it carries a serializer.
//! - `serde::Serialize` (and [`Properties::to_json`]), following the same
//!   export rules as YAML.

use std::fmt::Write as _;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Result, StrataError};
use crate::properties::Properties;
use crate::value::Value;

fn is_private(name: &str) -> bool {
    name.starts_with('_')
}

/// Bindings that leave the process: public, and with an exportable value.
fn exported(props: &Properties) -> Vec<(String, Value)> {
    props
        .entries()
        .into_iter()
        .filter(|(name, value)| {
            !is_private(name)
                && match value {
                    Value::Data(data) => data.is_serializable(),
                    _ => true,
                }
        })
        .collect()
}

/// Whether the store reads as a list: names `0`, `1`, ... in order.
fn is_sequence(entries: &[(String, Value)]) -> bool {
    !entries.is_empty()
        && entries
            .iter()
            .enumerate()
            .all(|(i, (name, _))| name.parse::<usize>() == Ok(i))
}

impl Properties {
    /// Every binding with a string form as `name=value` lines.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.entries() {
            if let Some(text) = value.as_string() {
                let _ = writeln!(out, "{name}={text}");
            }
        }
        out
    }

    /// Export the public bindings as a YAML document.
    pub fn to_yaml(&self) -> String {
        let mut out = String::from("---\n");
        emit_map(&mut out, &exported(self), 0);
        out
    }

    /// Build a store from a YAML document produced by [`Properties::to_yaml`]
    /// (or hand-written in the same block style).
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut lines = yaml_lines(text);
        let props = Properties::new();
        if lines.is_empty() {
            return Ok(props);
        }
        let indent = lines[0].indent;
        let mut at = 0;
        match parse_block(&mut lines, &mut at, indent)? {
            Node::Map(entries) => fill_map(&props, entries)?,
            Node::Seq(items) => fill_seq(&props, items)?,
            Node::Scalar(text) => {
                return Err(StrataError::Serialization(format!(
                    "document is a scalar ({text:?}), not a map"
                )))
            }
        }
        if at < lines.len() {
            return Err(StrataError::Serialization(format!(
                "unexpected indentation at line {}",
                lines[at].number
            )));
        }
        Ok(props)
    }

    /// Export the public bindings as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StrataError::Serialization(e.to_string()))
    }
}

// ── YAML output ────────────────────────────────────────────────

fn emit_map(out: &mut String, entries: &[(String, Value)], indent: usize) {
    for (name, value) in entries {
        let _ = write!(out, "{:indent$}{}:", "", quote(name));
        emit_value(out, value, indent);
    }
}

fn emit_seq(out: &mut String, entries: &[(String, Value)], indent: usize) {
    for (_, value) in entries {
        let _ = write!(out, "{:indent$}-", "");
        emit_value(out, value, indent);
    }
}

/// Write the rest of a line that already holds `key:` or `-`.
fn emit_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Properties(nested) => {
            let entries = exported(nested);
            if entries.is_empty() {
                out.push_str(" {}\n");
            } else {
                out.push('\n');
                if is_sequence(&entries) {
                    emit_seq(out, &entries, indent + 2);
                } else {
                    emit_map(out, &entries, indent + 2);
                }
            }
        }
        other => {
            let text = match other {
                Value::Data(data) => data.serialize().unwrap_or_default(),
                scalar => scalar.as_string().unwrap_or_default(),
            };
            let _ = writeln!(out, " {}", quote(&text));
        }
    }
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text != text.trim()
        || text.contains(": ")
        || text.contains(" #")
        || text.ends_with(':')
        || text.contains(['\n', '\r', '\t', '"'])
        || text.starts_with([
            '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '%', '@', '`',
        ])
}

fn quote(text: &str) -> String {
    if !needs_quotes(text) {
        return text.to_string();
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

// ── YAML input ─────────────────────────────────────────────────

#[derive(Debug)]
enum Node {
    Scalar(String),
    Map(Vec<(String, Node)>),
    Seq(Vec<Node>),
}

#[derive(Debug)]
struct Line {
    number: usize,
    indent: usize,
    content: String,
}

fn yaml_lines(text: &str) -> Vec<Line> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let content = raw.trim_end();
            let trimmed = content.trim_start();
            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed == "---"
                || trimmed == "..."
            {
                return None;
            }
            Some(Line {
                number: i + 1,
                indent: content.len() - trimmed.len(),
                content: trimmed.to_string(),
            })
        })
        .collect()
}

fn is_item(content: &str) -> bool {
    content == "-" || content.starts_with("- ")
}

fn parse_block(lines: &mut [Line], at: &mut usize, indent: usize) -> Result<Node> {
    if is_item(&lines[*at].content) {
        parse_seq(lines, at, indent)
    } else {
        parse_map(lines, at, indent)
    }
}

/// The nested block that follows `key:` or `-` on line `*at - 1`, if any.
fn parse_child(lines: &mut [Line], at: &mut usize, parent: usize, sequence_parent: bool) -> Result<Node> {
    match lines.get(*at) {
        Some(next) if next.indent > parent => {
            let indent = next.indent;
            parse_block(lines, at, indent)
        }
        // A map value may be a sequence at the map's own indentation.
        Some(next) if !sequence_parent && next.indent == parent && is_item(&next.content) => {
            parse_seq(lines, at, parent)
        }
        _ => Ok(Node::Scalar(String::new())),
    }
}

fn parse_map(lines: &mut [Line], at: &mut usize, indent: usize) -> Result<Node> {
    let mut entries = Vec::new();
    while let Some(line) = lines.get(*at) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent || is_item(&line.content) {
            if line.indent == indent {
                break;
            }
            return Err(StrataError::Serialization(format!(
                "unexpected indentation at line {}",
                line.number
            )));
        }
        let number = line.number;
        let (key, rest) = split_key(&line.content).ok_or_else(|| {
            StrataError::Serialization(format!("expected `key: value` at line {number}"))
        })?;
        *at += 1;
        let value = if rest.is_empty() {
            parse_child(lines, at, indent, false)?
        } else {
            inline_value(&rest, number)?
        };
        entries.push((key, value));
    }
    Ok(Node::Map(entries))
}

fn parse_seq(lines: &mut [Line], at: &mut usize, indent: usize) -> Result<Node> {
    let mut items = Vec::new();
    while let Some(line) = lines.get(*at) {
        if line.indent != indent || !is_item(&line.content) {
            if line.indent > indent {
                return Err(StrataError::Serialization(format!(
                    "unexpected indentation at line {}",
                    line.number
                )));
            }
            break;
        }
        let number = line.number;
        let rest = line.content[1..].trim_start().to_string();
        if rest.is_empty() {
            *at += 1;
            items.push(parse_child(lines, at, indent, true)?);
        } else if is_item(&rest) || (!looks_quoted(&rest) && split_key(&rest).is_some()) {
            // `- key: value` or `- - x`: the item is a block starting on this line.
            let nested = indent + (line.content.len() - rest.len());
            lines[*at].indent = nested;
            lines[*at].content = rest;
            items.push(parse_block(lines, at, nested)?);
        } else {
            *at += 1;
            items.push(inline_value(&rest, number)?);
        }
    }
    Ok(Node::Seq(items))
}

fn looks_quoted(text: &str) -> bool {
    (text.starts_with('"') && text.ends_with('"') && text.len() > 1)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() > 1)
}

fn inline_value(text: &str, number: usize) -> Result<Node> {
    match text {
        "{}" => Ok(Node::Map(Vec::new())),
        "[]" => Ok(Node::Seq(Vec::new())),
        _ => scalar(text, number).map(Node::Scalar),
    }
}

/// Split `key: value` (or `key:`) outside quotes.
fn split_key(content: &str) -> Option<(String, String)> {
    if content.starts_with('"') || content.starts_with('\'') {
        let end = closing_quote(content)?;
        let after = content[end + 1..].trim_start();
        let rest = after.strip_prefix(':')?;
        if !rest.is_empty() && !rest.starts_with(' ') {
            return None;
        }
        let key = scalar(&content[..=end], 0).ok()?;
        return Some((key, rest.trim().to_string()));
    }
    let mut search = 0;
    while let Some(found) = content[search..].find(':') {
        let colon = search + found;
        let after = &content[colon + 1..];
        if after.is_empty() || after.starts_with(' ') {
            return Some((content[..colon].trim_end().to_string(), after.trim().to_string()));
        }
        search = colon + 1;
    }
    None
}

/// Byte index of the quote closing the one at index 0.
fn closing_quote(text: &str) -> Option<usize> {
    let quote = text.chars().next()?;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if quote == '"' && c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        if c == quote && !escaped {
            if quote == '\'' && text[i + 1..].starts_with('\'') {
                escaped = true;
                continue;
            }
            return Some(i);
        }
        escaped = false;
    }
    None
}

fn scalar(text: &str, number: usize) -> Result<String> {
    let unterminated =
        || StrataError::Serialization(format!("unterminated quoted string at line {number}"));
    if text.starts_with('"') {
        let end = closing_quote(text).ok_or_else(unterminated)?;
        let mut out = String::with_capacity(end);
        let mut chars = text[1..end].chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return Ok(out);
    }
    if text.starts_with('\'') {
        let end = closing_quote(text).ok_or_else(unterminated)?;
        return Ok(text[1..end].replace("''", "'"));
    }
    let plain = match text.find(" #") {
        Some(comment) => &text[..comment],
        None => text,
    };
    Ok(plain.trim_end().to_string())
}

fn fill_map(props: &Properties, entries: Vec<(String, Node)>) -> Result<()> {
    for (name, node) in entries {
        fill_value(props, &name, node)?;
    }
    Ok(())
}

fn fill_seq(props: &Properties, items: Vec<Node>) -> Result<()> {
    for (i, node) in items.into_iter().enumerate() {
        fill_value(props, &i.to_string(), node)?;
    }
    Ok(())
}

fn fill_value(props: &Properties, name: &str, node: Node) -> Result<()> {
    match node {
        Node::Scalar(text) => props.set(name, &text),
        Node::Map(entries) => {
            let nested = Properties::new();
            fill_map(&nested, entries)?;
            props.set_properties(name, &nested)
        }
        Node::Seq(items) => {
            let nested = Properties::new();
            fill_seq(&nested, items)?;
            props.set_properties(name, &nested)
        }
    }
}

// ── serde ──────────────────────────────────────────────────────

struct Exported<'a>(&'a Value);

impl Serialize for Exported<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Position(v) => serializer.serialize_i64(*v),
            Value::Data(data) => serializer.serialize_str(&data.serialize().unwrap_or_default()),
            Value::Properties(nested) => nested.serialize(serializer),
        }
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entries = exported(self);
        if is_sequence(&entries) {
            let mut seq = serializer.serialize_seq(Some(entries.len()))?;
            for (_, value) in &entries {
                seq.serialize_element(&Exported(value))?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(entries.len()))?;
            for (name, value) in &entries {
                map.serialize_entry(name, &Exported(value))?;
            }
            map.end()
        }
    }
}
