// SPDX-License-Identifier: GPL-3.0-only

//! Typed plugin options and the schemas used to validate them

use super::draw::Rgba;
use crate::errors::PluginError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar option value as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Integer(_) => "integer",
            OptionValue::Float(_) => "float",
            OptionValue::Text(_) => "string",
        }
    }

    /// Parse a value typed on a command line or in a hotkey binding
    pub fn parse(text: &str) -> OptionValue {
        match text {
            "true" => OptionValue::Bool(true),
            "false" => OptionValue::Bool(false),
            _ => text
                .parse::<i64>()
                .map(OptionValue::Integer)
                .or_else(|_| text.parse::<f64>().map(OptionValue::Float))
                .unwrap_or_else(|_| OptionValue::Text(text.to_string())),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Integer(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Integer(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

/// Ordered option map of one plugin instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(BTreeMap<String, OptionValue>);

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn mismatch(key: &str, expected: &str, got: &OptionValue) -> PluginError {
        PluginError::invalid(key, format!("expected {expected}, got {}", got.kind_name()))
    }

    pub fn text(&self, key: &str) -> Result<Option<&str>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Text(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn integer(&self, key: &str) -> Result<Option<i64>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(key, "integer", other)),
        }
    }

    /// Floats also accept integer literals (`opacity: 1`)
    pub fn float(&self, key: &str) -> Result<Option<f64>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Float(v)) => Ok(Some(*v)),
            Some(OptionValue::Integer(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(Self::mismatch(key, "float", other)),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(key, "bool", other)),
        }
    }

    pub fn color(&self, key: &str) -> Result<Option<Rgba>, PluginError> {
        match self.text(key)? {
            None => Ok(None),
            Some(s) => Rgba::parse_hex(s)
                .map(Some)
                .ok_or_else(|| PluginError::invalid(key, format!("'{s}' is not #RRGGBB[AA]"))),
        }
    }

    /// Non-negative integer, for sizes and line counts
    pub fn unsigned(&self, key: &str) -> Result<Option<u32>, PluginError> {
        match self.integer(key)? {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| PluginError::invalid(key, format!("{v} is out of range"))),
        }
    }

    pub fn required_text(&self, key: &str) -> Result<&str, PluginError> {
        self.text(key)?
            .ok_or_else(|| PluginError::invalid(key, "required option missing"))
    }
}

impl FromIterator<(String, OptionValue)> for PluginOptions {
    fn from_iter<T: IntoIterator<Item = (String, OptionValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Declared type of a plugin option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Integer,
    Float,
    Text,
    /// `#RRGGBB` or `#RRGGBBAA` string
    Color,
}

impl OptionKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptionKind::Bool => "bool",
            OptionKind::Integer => "integer",
            OptionKind::Float => "float",
            OptionKind::Text => "string",
            OptionKind::Color => "color",
        }
    }
}

/// One entry of a plugin kind's option schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionField {
    pub name: &'static str,
    pub kind: OptionKind,
    pub required: bool,
}

impl OptionField {
    pub const fn required(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    fn check(&self, options: &PluginOptions) -> Result<(), PluginError> {
        if !options.contains(self.name) {
            return if self.required {
                Err(PluginError::invalid(self.name, "required option missing"))
            } else {
                Ok(())
            };
        }
        match self.kind {
            OptionKind::Bool => options.boolean(self.name).map(drop),
            OptionKind::Integer => options.integer(self.name).map(drop),
            OptionKind::Float => options.float(self.name).map(drop),
            OptionKind::Text => options.text(self.name).map(drop),
            OptionKind::Color => options.color(self.name).map(drop),
        }
    }
}

/// Validate options against a schema
///
/// Options the schema does not mention are accepted and ignored.
pub fn validate(schema: &[OptionField], options: &PluginOptions) -> Result<(), PluginError> {
    schema.iter().try_for_each(|field| field.check(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialize() {
        let options: PluginOptions =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 0.5, "d": "hi"}"#).unwrap();
        assert_eq!(options.get("a"), Some(&OptionValue::Bool(true)));
        assert_eq!(options.get("b"), Some(&OptionValue::Integer(3)));
        assert_eq!(options.get("c"), Some(&OptionValue::Float(0.5)));
        assert_eq!(options.get("d"), Some(&OptionValue::Text("hi".into())));
    }

    #[test]
    fn test_float_accepts_integer() {
        let options = PluginOptions::new().with("opacity", 1i64);
        assert_eq!(options.float("opacity"), Ok(Some(1.0)));
        assert!(options.integer("missing").unwrap().is_none());
    }

    #[test]
    fn test_validate_schema() {
        let schema = [
            OptionField::required("text", OptionKind::Text),
            OptionField::optional("color", OptionKind::Color),
            OptionField::optional("x", OptionKind::Integer),
        ];

        let ok = PluginOptions::new().with("text", "LIVE").with("extra", 1i64);
        assert!(validate(&schema, &ok).is_ok());

        let missing = PluginOptions::new().with("x", 3i64);
        assert!(matches!(
            validate(&schema, &missing),
            Err(PluginError::InvalidOption { field, .. }) if field == "text"
        ));

        let bad_color = ok.clone().with("color", "red");
        assert!(validate(&schema, &bad_color).is_err());

        let bad_type = ok.with("x", "left");
        assert!(validate(&schema, &bad_type).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(OptionValue::parse("true"), OptionValue::Bool(true));
        assert_eq!(OptionValue::parse("12"), OptionValue::Integer(12));
        assert_eq!(OptionValue::parse("0.25"), OptionValue::Float(0.25));
        assert_eq!(OptionValue::parse("RED"), OptionValue::Text("RED".into()));
    }
}
