//! Typed attribute schema ("sdata")
//!
//! A class declares an ordered list of [`SdataDesc`]. Each instance gets a
//! value store built from the declared defaults; every later write goes
//! through [`SdataDesc::coerce`], so a stored value always matches its
//! declared type.

use crate::error::SdataError;
use crate::types::{Json, JsonMap, SdFlags};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Real,
    List,
    Dict,
    Json,
    /// Opaque integer handle
    Pointer,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Real => "real",
            DataType::List => "list",
            DataType::Dict => "dict",
            DataType::Json => "json",
            DataType::Pointer => "pointer",
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Real | DataType::Boolean)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SdataDesc {
    pub data_type: DataType,
    pub name: String,
    pub flags: SdFlags,
    /// Default in textual form, parsed per type by [`SdataDesc::default_value`]
    pub default: String,
    pub description: String,
}

impl SdataDesc {
    pub fn new(
        data_type: DataType,
        name: impl Into<String>,
        flags: SdFlags,
        default: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            data_type,
            name: name.into(),
            flags,
            default: default.into(),
            description: description.into(),
        }
    }

    pub fn string(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::String, name, flags, default, description)
    }

    pub fn boolean(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::Boolean, name, flags, default, description)
    }

    pub fn integer(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::Integer, name, flags, default, description)
    }

    pub fn real(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::Real, name, flags, default, description)
    }

    pub fn list(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::List, name, flags, default, description)
    }

    pub fn dict(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::Dict, name, flags, default, description)
    }

    pub fn json(name: &str, flags: SdFlags, default: &str, description: &str) -> Self {
        Self::new(DataType::Json, name, flags, default, description)
    }

    pub fn pointer(name: &str, flags: SdFlags, description: &str) -> Self {
        Self::new(DataType::Pointer, name, flags, "0", description)
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(SdFlags::REQUIRED)
    }

    pub fn is_readable(&self) -> bool {
        self.flags.intersects(SdFlags::ATTR_READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.intersects(SdFlags::ATTR_WRITABLE)
    }

    /// Parse the textual default into a typed value.
    ///
    /// Integer and real defaults that do not parse (the empty string
    /// included) yield `null`, which the required-attribute gate treats
    /// as missing.
    pub fn default_value(&self) -> Json {
        let text = self.default.trim();
        match self.data_type {
            DataType::String => Json::String(self.default.clone()),
            DataType::Boolean => Json::Bool(parse_bool(text)),
            DataType::Integer => parse_integer(text).map(Json::from).unwrap_or(Json::Null),
            DataType::Real => text
                .parse::<f64>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f).map(Json::Number))
                .unwrap_or(Json::Null),
            DataType::List => match serde_json::from_str::<Json>(text) {
                Ok(v @ Json::Array(_)) => v,
                _ => Json::Array(Vec::new()),
            },
            DataType::Dict => match serde_json::from_str::<Json>(text) {
                Ok(v @ Json::Object(_)) => v,
                _ => Json::Object(JsonMap::new()),
            },
            DataType::Json => serde_json::from_str::<Json>(text).unwrap_or(Json::Null),
            DataType::Pointer => Json::from(text.parse::<u64>().unwrap_or(0)),
        }
    }

    /// Convert `value` to the declared type or fail.
    ///
    /// - string: accepts any scalar through its string form
    /// - boolean: "true"/"false" in any case, other strings by integer truthiness
    /// - integer/real: numbers and numeric-looking strings
    /// - list/dict: a string is parsed and must yield that shape
    /// - json: anything
    /// - pointer: non-negative integers only
    pub fn coerce(&self, value: Json) -> Result<Json, SdataError> {
        match self.data_type {
            DataType::String => match value {
                Json::String(_) => Ok(value),
                Json::Bool(b) => Ok(Json::String(b.to_string())),
                Json::Number(n) => Ok(Json::String(n.to_string())),
                other => Err(self.mismatch(&other)),
            },
            DataType::Boolean => match value {
                Json::Bool(_) => Ok(value),
                Json::String(s) => Ok(Json::Bool(parse_bool(s.trim()))),
                Json::Number(n) => Ok(Json::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
                other => Err(self.mismatch(&other)),
            },
            DataType::Integer => match value {
                Json::Number(ref n) if n.is_i64() || n.is_u64() => Ok(value),
                Json::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(Json::from(f as i64)),
                    _ => Err(self.mismatch(&Json::Number(n))),
                },
                Json::String(s) => parse_integer(s.trim())
                    .map(Json::from)
                    .ok_or_else(|| self.unparsable(&s)),
                other => Err(self.mismatch(&other)),
            },
            DataType::Real => match value {
                Json::Number(n) => n
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Json::Number)
                    .ok_or_else(|| self.mismatch(&Json::Null)),
                Json::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Json::Number)
                    .ok_or_else(|| self.unparsable(&s)),
                other => Err(self.mismatch(&other)),
            },
            DataType::List => match value {
                Json::Array(_) => Ok(value),
                Json::String(s) => match serde_json::from_str::<Json>(&s) {
                    Ok(v @ Json::Array(_)) => Ok(v),
                    _ => Err(self.unparsable(&s)),
                },
                other => Err(self.mismatch(&other)),
            },
            DataType::Dict => match value {
                Json::Object(_) => Ok(value),
                Json::String(s) => match serde_json::from_str::<Json>(&s) {
                    Ok(v @ Json::Object(_)) => Ok(v),
                    _ => Err(self.unparsable(&s)),
                },
                other => Err(self.mismatch(&other)),
            },
            DataType::Json => Ok(value),
            DataType::Pointer => match value {
                Json::Number(ref n) if n.is_u64() => Ok(value),
                other => Err(self.mismatch(&other)),
            },
        }
    }

    /// True when `value` counts as absent for a required attribute
    pub fn is_missing(&self, value: &Json) -> bool {
        match (self.data_type, value) {
            (_, Json::Null) => true,
            (DataType::String, Json::String(s)) => s.is_empty(),
            (DataType::List | DataType::Json, Json::Array(a)) => a.is_empty(),
            (DataType::Dict | DataType::Json, Json::Object(o)) => o.is_empty(),
            (DataType::Json, Json::String(s)) => s.is_empty(),
            (DataType::Pointer, Json::Number(n)) => n.as_u64() == Some(0),
            _ => false,
        }
    }

    /// Description as JSON (name, type, flags, default, description)
    pub fn to_json(&self) -> Json {
        serde_json::json!({
            "id": self.name,
            "type": self.data_type.as_str(),
            "flag": self.flags.names(),
            "default_value": self.default,
            "description": self.description,
        })
    }

    fn mismatch(&self, got: &Json) -> SdataError {
        SdataError::TypeMismatch {
            attr: self.name.clone(),
            expected: self.data_type.as_str(),
            got: json_kind(got).to_string(),
        }
    }

    fn unparsable(&self, value: &str) -> SdataError {
        SdataError::Unparsable {
            attr: self.name.clone(),
            expected: self.data_type.as_str(),
            value: value.to_string(),
        }
    }
}

/// Find a descriptor by name
pub fn find_desc<'a>(schema: &'a [SdataDesc], name: &str) -> Option<&'a SdataDesc> {
    schema.iter().find(|it| it.name == name)
}

/// Build an attribute store holding every schema default
pub fn build_store(schema: &[SdataDesc]) -> JsonMap {
    schema
        .iter()
        .map(|it| (it.name.clone(), it.default_value()))
        .collect()
}

/// Short name of the JSON kind of `value`
pub fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_f64() => "real",
        Json::Number(_) => "integer",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "dict",
    }
}

/// Integer truthiness of a string, with "true"/"false" recognized
fn parse_bool(text: &str) -> bool {
    if text.eq_ignore_ascii_case("true") {
        true
    } else if text.eq_ignore_ascii_case("false") {
        false
    } else {
        leading_digits_nonzero(text)
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.2e18 => Some(f as i64),
        _ => None,
    }
}

/// True when the leading decimal digits (after an optional sign) are not all zero
fn leading_digits_nonzero(text: &str) -> bool {
    let trimmed = text.trim_start();
    let digits = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    digits
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .any(|c| c != '0')
}
