//! Markdown frontmatter reader
//!
//! Splits a workflow file into its YAML frontmatter and markdown body,
//! parses the YAML, and remembers which null-valued keys were written as
//! an explicit `null`/`~` rather than left bare. serde_yaml reports both as
//! `Null`; the rules downstream treat them differently.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::error::{AwcError, Result};
use crate::field::{describe_value, Presence};

/// `key:` / `key: value` on a block mapping line
static KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:"([^"]*)"|'([^']*)'|([^\s#'"{\[\-][^:#]*?))\s*:(?:\s+(.*))?$"#)
        .expect("key line regex")
});

/// Block scalar indicator (`|`, `>-`, `|+2`...)
static BLOCK_SCALAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[|>][0-9+\-]*$").expect("block scalar regex"));

const NULL_TOKENS: &[&str] = &["null", "Null", "NULL", "~"];

/// Parsed frontmatter with explicit-null bookkeeping
#[derive(Debug, Clone)]
pub struct Frontmatter {
    pub mapping: Mapping,
    explicit_nulls: HashSet<String>,
}

impl Frontmatter {
    /// Parse frontmatter YAML text (without the `---` fences)
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(text)?
        };

        let mapping = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            other => {
                return Err(AwcError::FrontmatterNotMapping {
                    found: describe_value(&other),
                })
            }
        };

        Ok(Self {
            mapping,
            explicit_nulls: scan_explicit_nulls(text),
        })
    }

    /// Top-level value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapping.get(key)
    }

    /// Whether the key at `path` (dot-separated) was written as `null`/`~`
    pub fn is_explicit_null(&self, path: &str) -> bool {
        self.explicit_nulls.contains(path)
    }

    /// Classify a value found at `path`
    pub fn presence(&self, path: &str, value: Option<&Value>) -> Presence<Value> {
        match value {
            None => Presence::Absent,
            Some(Value::Null) if !self.is_explicit_null(path) => Presence::Marker,
            Some(v) => Presence::Value(v.clone()),
        }
    }

    /// Top-level keys in document order
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.mapping.keys().map(key_string)
    }
}

/// Render a mapping key as a string (non-string keys are stringified)
pub fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// A markdown workflow file: frontmatter plus body
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl MarkdownDocument {
    /// Parse file content. `origin` names the file in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let (yaml, body) = split_frontmatter(content, origin)?;
        Ok(Self {
            frontmatter: Frontmatter::parse(&yaml)?,
            body,
        })
    }
}

/// Split content into (frontmatter YAML, markdown body)
pub fn split_frontmatter(content: &str, origin: &str) -> Result<(String, String)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.lines();

    // Must start with ---
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => {
            return Err(AwcError::FrontmatterMissing {
                path: origin.to_string(),
            })
        }
    }

    let mut yaml = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        yaml.push(line);
    }

    if !closed {
        return Err(AwcError::FrontmatterUnterminated {
            path: origin.to_string(),
        });
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    Ok((yaml.join("\n"), body.trim().to_string()))
}

/// One open mapping level while scanning. `key` is `None` inside sequences,
/// where nothing below is recorded.
struct Frame {
    indent: usize,
    key: Option<String>,
}

/// Collect dotted paths of keys written as explicit nulls.
///
/// Handles block mappings and single-level flow mappings. Keys nested in
/// sequences are not tracked.
fn scan_explicit_nulls(text: &str) -> HashSet<String> {
    let mut found = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut block_scalar_indent: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(owner) = block_scalar_indent {
            if trimmed.is_empty() || indent > owner {
                continue;
            }
            block_scalar_indent = None;
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        while stack.last().is_some_and(|f| f.indent >= indent) {
            stack.pop();
        }

        if trimmed == "-" || trimmed.starts_with("- ") {
            stack.push(Frame { indent, key: None });
            continue;
        }

        let Some(caps) = KEY_LINE.captures(trimmed.trim_end()) else {
            continue;
        };
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let value = caps.get(4).map(|m| strip_comment(m.as_str())).unwrap_or("");

        let in_sequence = stack.iter().any(|f| f.key.is_none());
        let path = join_path(&stack, &key);

        if !in_sequence {
            if NULL_TOKENS.contains(&value) {
                found.insert(path.clone());
            } else if value.starts_with('{') && value.ends_with('}') {
                scan_flow_mapping(&path, value, &mut found);
            }
        }

        if BLOCK_SCALAR.is_match(value) {
            block_scalar_indent = Some(indent);
        }

        stack.push(Frame {
            indent,
            key: if in_sequence { None } else { Some(key) },
        });
    }

    found
}

/// `{a: null, b}` → records `parent.a`
fn scan_flow_mapping(parent: &str, value: &str, found: &mut HashSet<String>) {
    let inner = &value[1..value.len() - 1];
    if inner.contains(['{', '[']) {
        return;
    }
    for entry in inner.split(',') {
        if let Some((k, v)) = entry.split_once(':') {
            let v = v.trim();
            if NULL_TOKENS.contains(&v) {
                let k = k.trim().trim_matches(|c| c == '"' || c == '\'');
                found.insert(format!("{}.{}", parent, k));
            }
        }
    }
}

fn join_path(stack: &[Frame], key: &str) -> String {
    let mut parts: Vec<&str> = stack.iter().filter_map(|f| f.key.as_deref()).collect();
    parts.push(key);
    parts.join(".")
}

fn strip_comment(value: &str) -> &str {
    let value = value.trim();
    if value.starts_with('"') || value.starts_with('\'') {
        return value;
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end(),
        None if value.starts_with('#') => "",
        None => value,
    }
}
