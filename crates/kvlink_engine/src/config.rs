//! Engine configuration string grammar.
//!
//! Every engine operation takes a configuration string of the form
//!
//! ```text
//! key[=value][,key[=value]...]
//! ```
//!
//! A bare key means `true`. Values are bare words, double-quoted strings,
//! or nested lists in parentheses or brackets:
//!
//! ```text
//! create,cache_size=500M,statistics=(fast)
//! key_format=S,value_format=S,columns=(id,data)
//! ```
//!
//! [`ConfigMap`] parses a string once and offers typed accessors. Every
//! operation checks its keys with [`ConfigMap::ensure_only`] so that unknown
//! keys fail at the call instead of being silently ignored. [`ConfigWriter`]
//! renders the same grammar.

use crate::error::{EngineError, EngineResult};
use std::fmt;

/// A parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// A bare key with no value (`create`).
    Flag,
    /// A scalar value (`cache_size=500M`).
    Value(String),
    /// A nested list (`statistics=(fast)`).
    Group(ConfigMap),
}

/// An ordered set of configuration entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    /// Parses a configuration string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the string has unbalanced brackets, an
    /// empty key, a missing value after `=`, or a duplicate key.
    pub fn parse(input: &str) -> EngineResult<Self> {
        let mut parser = Parser {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        };
        parser.parse_list(None)
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over entries in the order they were written.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Fails if any key is not in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first unknown key.
    pub fn ensure_only(&self, allowed: &[&str], context: &str) -> EngineResult<()> {
        match self.entries.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((key, _)) => Err(EngineError::invalid_config(format!(
                "unknown configuration key '{key}' for {context}"
            ))),
            None => Ok(()),
        }
    }

    /// Reads a boolean: a bare key, `true`/`false`, `on`/`off` or `1`/`0`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is not a boolean.
    pub fn get_bool(&self, key: &str) -> EngineResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Flag) => Ok(Some(true)),
            Some(ConfigValue::Value(v)) => match v.as_str() {
                "true" | "on" | "1" => Ok(Some(true)),
                "false" | "off" | "0" => Ok(Some(false)),
                other => Err(EngineError::invalid_config(format!(
                    "expected a boolean for '{key}', found '{other}'"
                ))),
            },
            Some(ConfigValue::Group(_)) => Err(EngineError::invalid_config(format!(
                "expected a boolean for '{key}', found a list"
            ))),
        }
    }

    /// Reads an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is not an integer.
    pub fn get_int(&self, key: &str) -> EngineResult<Option<u64>> {
        match self.get_str(key)? {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| {
                EngineError::invalid_config(format!("expected an integer for '{key}', found '{v}'"))
            }),
        }
    }

    /// Reads a signed integer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is not an integer.
    pub fn get_signed(&self, key: &str) -> EngineResult<Option<i64>> {
        match self.get_str(key)? {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| {
                EngineError::invalid_config(format!("expected an integer for '{key}', found '{v}'"))
            }),
        }
    }

    /// Reads a byte size with an optional `B`, `K`, `M`, `G` or `T` suffix.
    ///
    /// Suffixes are powers of 1024.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the value is not a size or overflows.
    pub fn get_size(&self, key: &str) -> EngineResult<Option<u64>> {
        match self.get_str(key)? {
            None => Ok(None),
            Some(v) => parse_size(v).map(Some).ok_or_else(|| {
                EngineError::invalid_config(format!("expected a size for '{key}', found '{v}'"))
            }),
        }
    }

    /// Reads a scalar string value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the key is a bare flag or a list.
    pub fn get_str(&self, key: &str) -> EngineResult<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Value(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(EngineError::invalid_config(format!(
                "expected a value for '{key}'"
            ))),
        }
    }

    /// Reads a list of names: `(a,b)` or a single bare value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a list member carries a value.
    pub fn get_list(&self, key: &str) -> EngineResult<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Flag) => Err(EngineError::invalid_config(format!(
                "expected a list for '{key}'"
            ))),
            Some(ConfigValue::Value(v)) => Ok(Some(vec![v.clone()])),
            Some(ConfigValue::Group(group)) => group
                .entries
                .iter()
                .map(|(name, value)| match value {
                    ConfigValue::Flag => Ok(name.clone()),
                    _ => Err(EngineError::invalid_config(format!(
                        "list '{key}' may only contain names, found '{name}=...'"
                    ))),
                })
                .collect::<EngineResult<Vec<_>>>()
                .map(Some),
        }
    }
}

impl fmt::Display for ConfigMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&quote_if_needed(key))?;
            match value {
                ConfigValue::Flag => {}
                ConfigValue::Value(v) => write!(f, "={}", quote_if_needed(v))?,
                ConfigValue::Group(group) => write!(f, "=({group})")?,
            }
        }
        Ok(())
    }
}

/// Parses a size such as `500M` into bytes.
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => {
            let shift = match c.to_ascii_uppercase() {
                'B' => 0,
                'K' => 10,
                'M' => 20,
                'G' => 30,
                'T' => 40,
                _ => return None,
            };
            (&value[..idx], 1u64 << shift)
        }
        _ => (value, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Builds a configuration string.
///
/// ```rust
/// use kvlink_engine::config::ConfigWriter;
///
/// let config = ConfigWriter::new()
///     .flag("create")
///     .value("cache_size", "500M")
///     .list("statistics", ["fast"])
///     .finish();
/// assert_eq!(config, "create,cache_size=500M,statistics=(fast)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigWriter {
    parts: Vec<String>,
}

impl ConfigWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bare key.
    #[must_use]
    pub fn flag(mut self, key: &str) -> Self {
        self.parts.push(key.to_string());
        self
    }

    /// Appends `key=true` or `key=false`.
    #[must_use]
    pub fn bool(mut self, key: &str, value: bool) -> Self {
        self.parts.push(format!("{key}={value}"));
        self
    }

    /// Appends `key=value`, quoting the value when needed.
    #[must_use]
    pub fn value(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.parts
            .push(format!("{key}={}", quote_if_needed(&value.to_string())));
        self
    }

    /// Appends `key=(a,b,...)`.
    #[must_use]
    pub fn list<I, S>(mut self, key: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = items
            .into_iter()
            .map(|s| quote_if_needed(s.as_ref()))
            .collect();
        self.parts.push(format!("{key}=({})", items.join(",")));
        self
    }

    /// Appends `key=value` when the value is present.
    #[must_use]
    pub fn opt_value<T: fmt::Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.value(key, v),
            None => self,
        }
    }

    /// Returns the rendered configuration string.
    #[must_use]
    pub fn finish(self) -> String {
        self.parts.join(",")
    }
}

fn quote_if_needed(s: &str) -> String {
    let plain = !s.is_empty()
        && !s
            .bytes()
            .any(|b| is_delimiter(b) || b.is_ascii_whitespace());
    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'=' | b',' | b'(' | b')' | b'[' | b']' | b'"')
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn parse_list(&mut self, closing: Option<u8>) -> EngineResult<ConfigMap> {
        let mut map = ConfigMap::default();
        loop {
            self.skip_whitespace();
            let Some(b) = self.peek() else {
                if let Some(c) = closing {
                    return Err(self.error(&format!("missing closing '{}'", c as char)));
                }
                return Ok(map);
            };

            if Some(b) == closing {
                self.pos += 1;
                return Ok(map);
            }
            match b {
                b',' => {
                    self.pos += 1;
                    continue;
                }
                b')' | b']' => return Err(self.error("unbalanced closing bracket")),
                _ => {}
            }

            let key = self.parse_scalar()?;
            if key.is_empty() {
                return Err(self.error("empty key"));
            }

            self.skip_whitespace();
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.skip_whitespace();
                match self.peek() {
                    Some(b'(') => {
                        self.pos += 1;
                        ConfigValue::Group(self.parse_list(Some(b')'))?)
                    }
                    Some(b'[') => {
                        self.pos += 1;
                        ConfigValue::Group(self.parse_list(Some(b']'))?)
                    }
                    next => {
                        let quoted = next == Some(b'"');
                        let value = self.parse_scalar()?;
                        if value.is_empty() && !quoted {
                            return Err(self.error(&format!("missing value for '{key}'")));
                        }
                        ConfigValue::Value(value)
                    }
                }
            } else {
                ConfigValue::Flag
            };

            if map.contains(&key) {
                return Err(EngineError::invalid_config(format!(
                    "duplicate key '{key}' in \"{}\"",
                    self.input
                )));
            }
            map.entries.push((key, value));

            self.skip_whitespace();
            match self.peek() {
                None | Some(b',') => {}
                Some(b) if Some(b) == closing => {}
                Some(_) => return Err(self.error("unexpected character")),
            }
        }
    }

    fn parse_scalar(&mut self) -> EngineResult<String> {
        if self.peek() == Some(b'"') {
            self.pos += 1;
            let mut out = String::new();
            let mut escaped = false;
            for (offset, c) in self.input[self.pos..].char_indices() {
                if escaped {
                    out.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    self.pos += offset + 1;
                    return Ok(out);
                } else {
                    out.push(c);
                }
            }
            return Err(self.error("unterminated quoted string"));
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_delimiter(b) || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, what: &str) -> EngineError {
        EngineError::invalid_config(format!(
            "{what} at offset {} in \"{}\"",
            self.pos, self.input
        ))
    }
}
