//! Properties File Format
//!
//! Flat `key=value` text format used by `cluster.properties` and the embedded
//! broker properties file. Supports `#`/`!` comments, `=`, `:` or whitespace
//! separators, backslash escapes and trailing-backslash line continuations.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::ConfigError;

/// Ordered string-to-string map with properties-format (de)serialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set a value, returning the previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Set a value only when the key is absent. Returns true if inserted.
    pub fn set_if_absent(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), value.into());
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Read a properties file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Write the properties to a file, preceded by a comment line
    pub fn store<P: AsRef<Path>>(&self, path: P, comment: &str) -> Result<(), ConfigError> {
        std::fs::write(path, self.render(comment))?;
        Ok(())
    }

    /// Parse properties text. Malformed lines are kept as keys with empty values.
    pub fn parse(content: &str) -> Self {
        let mut props = Properties::new();
        let mut logical = String::new();
        let mut continuing = false;

        for raw in content.lines() {
            let line = if continuing {
                raw.trim_start()
            } else {
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed
            };

            if ends_with_continuation(line) {
                logical.push_str(&line[..line.len() - 1]);
                continuing = true;
                continue;
            }

            logical.push_str(line);
            continuing = false;
            let (key, value) = split_entry(&logical);
            props.set(key, value);
            logical.clear();
        }

        if continuing && !logical.is_empty() {
            let (key, value) = split_entry(&logical);
            props.set(key, value);
        }

        props
    }

    /// Render as properties text, keys in sorted order
    pub fn render(&self, comment: &str) -> String {
        let mut out = String::new();
        for line in comment.lines() {
            let _ = writeln!(out, "#{}", line);
        }
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{}={}", escape(key, true), escape(value, false));
        }
        out
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars().peekable();
    let mut escaped = false;

    while let Some(&c) = chars.peek() {
        if escaped {
            key.push(unescape_char(c));
            escaped = false;
            chars.next();
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                chars.next();
            }
            '=' | ':' | ' ' | '\t' | '\x0c' => break,
            _ => {
                key.push(c);
                chars.next();
            }
        }
    }

    // Skip whitespace, at most one separator, then whitespace again
    while matches!(chars.peek(), Some(' ') | Some('\t') | Some('\x0c')) {
        chars.next();
    }
    if matches!(chars.peek(), Some('=') | Some(':')) {
        chars.next();
    }
    while matches!(chars.peek(), Some(' ') | Some('\t') | Some('\x0c')) {
        chars.next();
    }

    let mut value = String::new();
    let mut escaped = false;
    for c in chars {
        if escaped {
            value.push(unescape_char(c));
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            value.push(c);
        }
    }

    (key, value)
}

fn unescape_char(c: char) -> char {
    match c {
        't' => '\t',
        'n' => '\n',
        'r' => '\r',
        'f' => '\x0c',
        other => other,
    }
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}
