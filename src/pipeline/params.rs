//! Processor parameter model.
//!
//! Parameters travel from the command line, project config, and content
//! rules into processors as a named bag of typed values. The cache compares
//! parameter bags structurally across runs, so every value type carries an
//! explicit equality and a stable serialized form.
//!
//! Values serialize with a type tag so processor-specific types round-trip
//! through the cache document:
//!
//! ```json
//! { "type": "color", "value": "255,0,255,255" }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Four-component RGBA color.
///
/// Encoded as a single comma-separated scalar (`"r,g,b,a"`) wherever it is
/// persisted, rather than as a nested structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a color from components.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Classic magenta color key.
    pub const MAGENTA: Color = Color::rgba(255, 0, 255, 255);

    /// Fully transparent black.
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

impl FromStr for Color {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ParamError::BadColor(s.to_string()));
        }
        let mut c = [0u8; 4];
        for (slot, part) in c.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u8>()
                .map_err(|_| ParamError::BadColor(s.to_string()))?;
        }
        Ok(Color::rgba(c[0], c[1], c[2], c[3]))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Error while parsing or converting a parameter value.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParamError {
    /// Color string was not four comma-separated components
    #[error("invalid color '{0}', expected 'r,g,b,a'")]
    BadColor(String),
    /// Value text did not parse as the tagged type
    #[error("invalid {tag} value '{text}'")]
    BadValue { tag: String, text: String },
    /// Unknown type tag in a flattened parameter
    #[error("unknown parameter type tag '{0}'")]
    UnknownTag(String),
}

/// A single typed parameter value.
///
/// The closed set of variants is the conversion and equality contract:
/// comparing two values is plain `PartialEq`, no runtime introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Color(Color),
    List(Vec<ParameterValue>),
}

impl ParameterValue {
    /// Stable type tag, used by the flattened per-asset event format.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Int(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::Text(_) => "text",
            ParameterValue::Color(_) => "color",
            ParameterValue::List(_) => "list",
        }
    }

    /// Flattened scalar encoding.
    ///
    /// Lists join their elements' encodings with `;` and do not nest.
    pub fn encode(&self) -> String {
        match self {
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Int(i) => i.to_string(),
            ParameterValue::Float(x) => x.to_string(),
            ParameterValue::Text(s) => s.clone(),
            ParameterValue::Color(c) => c.to_string(),
            ParameterValue::List(items) => items
                .iter()
                .map(|v| v.encode())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    /// Parse a flattened scalar back into a value of the tagged type.
    pub fn decode(tag: &str, text: &str) -> Result<Self, ParamError> {
        let bad = || ParamError::BadValue {
            tag: tag.to_string(),
            text: text.to_string(),
        };
        match tag {
            "bool" => text.parse().map(ParameterValue::Bool).map_err(|_| bad()),
            "int" => text.parse().map(ParameterValue::Int).map_err(|_| bad()),
            "float" => text.parse().map(ParameterValue::Float).map_err(|_| bad()),
            "text" => Ok(ParameterValue::Text(text.to_string())),
            "color" => text.parse().map(ParameterValue::Color),
            "list" => {
                if text.is_empty() {
                    return Ok(ParameterValue::List(Vec::new()));
                }
                Ok(ParameterValue::List(
                    text.split(';')
                        .map(|s| ParameterValue::Text(s.to_string()))
                        .collect(),
                ))
            }
            other => Err(ParamError::UnknownTag(other.to_string())),
        }
    }

    /// Convert this value to the variant of `template`, if a conversion
    /// exists. Returns `None` for unconvertible combinations; callers drop
    /// those silently.
    pub fn convert_like(&self, template: &ParameterValue) -> Option<ParameterValue> {
        match (self, template) {
            (v, t) if std::mem::discriminant(v) == std::mem::discriminant(t) => Some(v.clone()),
            (ParameterValue::Text(s), ParameterValue::Bool(_)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(ParameterValue::Bool(true)),
                "false" | "no" | "0" => Some(ParameterValue::Bool(false)),
                _ => None,
            },
            (ParameterValue::Text(s), ParameterValue::Int(_)) => {
                s.parse().ok().map(ParameterValue::Int)
            }
            (ParameterValue::Text(s), ParameterValue::Float(_)) => {
                s.parse().ok().map(ParameterValue::Float)
            }
            (ParameterValue::Text(s), ParameterValue::Color(_)) => {
                s.parse().ok().map(ParameterValue::Color)
            }
            (ParameterValue::Int(i), ParameterValue::Float(_)) => {
                Some(ParameterValue::Float(*i as f64))
            }
            (v, ParameterValue::Text(_)) => Some(ParameterValue::Text(v.encode())),
            _ => None,
        }
    }
}

/// An ordered bag of named parameter values.
///
/// Backed by a `BTreeMap` so serialization and equality are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParameterValue>);

impl ParameterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    /// Remove a value by name.
    pub fn remove(&mut self, name: &str) -> Option<ParameterValue> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    /// Convenience accessors for processors reading their own parameters.
    pub fn get_bool(&self, name: &str, fallback: bool) -> bool {
        match self.get(name) {
            Some(ParameterValue::Bool(b)) => *b,
            _ => fallback,
        }
    }

    pub fn get_text(&self, name: &str, fallback: &str) -> String {
        match self.get(name) {
            Some(ParameterValue::Text(s)) => s.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn get_color(&self, name: &str, fallback: Color) -> Color {
        match self.get(name) {
            Some(ParameterValue::Color(c)) => *c,
            _ => fallback,
        }
    }

    /// Drop entries equal to the capability's defaults.
    ///
    /// Two parameter bags describe the same build when they agree after
    /// normalization, so values merely restating a default never force a
    /// rebuild.
    pub fn normalized(&self, defaults: &ParameterSet) -> ParameterSet {
        let mut out = BTreeMap::new();
        for (name, value) in &self.0 {
            if defaults.get(name) != Some(value) {
                out.insert(name.clone(), value.clone());
            }
        }
        ParameterSet(out)
    }

    /// Structural equality after normalizing both sides against `defaults`.
    pub fn matches(&self, other: &ParameterSet, defaults: &ParameterSet) -> bool {
        self.normalized(defaults) == other.normalized(defaults)
    }
}

impl FromIterator<(String, ParameterValue)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, ParameterValue)>>(iter: T) -> Self {
        ParameterSet(iter.into_iter().collect())
    }
}
