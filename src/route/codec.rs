//! Parameter codecs.
//!
//! A codec turns one URL segment (or query value) into a JSON value and back.
//! JSON is the common currency between the template engine and typed params:
//! whatever a codec produces must deserialize into the field type the caller
//! declares for that capture.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};

/// Failure to parse or serialize a single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Wire type reported to schema tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    String,
    Number,
    Boolean,
}

/// Bidirectional conversion between a URL string and a parameter value.
///
/// Implementations must be pure: the same input always yields the same output.
pub trait Codec: Send + Sync + fmt::Debug {
    fn parse(&self, raw: &str) -> Result<Value, CodecError>;

    fn serialize(&self, value: &Value) -> Result<String, CodecError>;

    fn wire_type(&self) -> Option<WireType> {
        None
    }
}

pub type SharedCodec = Arc<dyn Codec>;

/// Caller-supplied codecs, keyed by the type tag used in templates.
#[derive(Debug, Clone, Default)]
pub struct CodecMap {
    codecs: HashMap<String, SharedCodec>,
}

impl CodecMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, tag: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.insert(tag, Arc::new(codec));
        self
    }

    pub fn insert(&mut self, tag: impl Into<String>, codec: SharedCodec) {
        self.codecs.insert(tag.into(), codec);
    }

    pub fn get(&self, tag: &str) -> Option<SharedCodec> {
        self.codecs.get(tag).cloned()
    }
}

/// Look up a built-in codec by its template type tag.
pub fn builtin(tag: &str) -> Option<SharedCodec> {
    let codec: SharedCodec = match tag {
        "string" => Arc::new(StringCodec),
        "number" => Arc::new(NumberCodec),
        "number|null" => Arc::new(NullableNumberCodec),
        "number[]" => Arc::new(NumberArrayCodec),
        "number[]|null" => Arc::new(NullableNumberArrayCodec),
        "boolean" => Arc::new(BoolCodec),
        "date" => Arc::new(DateCodec),
        "instant" => Arc::new(InstantCodec),
        _ => return None,
    };
    Some(codec)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        Ok(Value::String(raw.to_string()))
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CodecError::new(format!("Expected a string, got {value}")))
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::String)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberCodec;

impl Codec for NumberCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        parse_number(raw).map(Value::Number)
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Number(n) => Ok(format_number(n)),
            other => Err(CodecError::new(format!("Expected a number, got {other}"))),
        }
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::Number)
    }
}

/// `-` stands for an explicit null.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableNumberCodec;

impl Codec for NullableNumberCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        if raw.trim() == "-" {
            Ok(Value::Null)
        } else {
            NumberCodec.parse(raw)
        }
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Null => Ok("-".to_string()),
            other => NumberCodec.serialize(other),
        }
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::Number)
    }
}

/// `_`-joined numbers. Both `-` and the empty string read as an empty array.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberArrayCodec;

impl Codec for NumberArrayCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        match raw.trim() {
            "-" | "" => Ok(Value::Array(Vec::new())),
            list => parse_number_list(list),
        }
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Array(items) if items.is_empty() => Ok("-".to_string()),
            other => serialize_number_list(other),
        }
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::String)
    }
}

/// Like [`NumberArrayCodec`] but keeps null (`-`) apart from empty (``).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableNumberArrayCodec;

impl Codec for NullableNumberArrayCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        match raw.trim() {
            "-" => Ok(Value::Null),
            "" => Ok(Value::Array(Vec::new())),
            list => parse_number_list(list),
        }
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Null => Ok("-".to_string()),
            other => serialize_number_list(other),
        }
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::String)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl Codec for BoolCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(CodecError::new(format!(
                "Failed to parse into boolean: {other}"
            ))),
        }
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Bool(true) => Ok("true".to_string()),
            Value::Bool(false) => Ok("false".to_string()),
            other => Err(CodecError::new(format!("Expected a boolean, got {other}"))),
        }
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::Boolean)
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date as `yyyy-MM-dd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCodec;

impl DateCodec {
    fn normalize(raw: &str) -> Result<String, CodecError> {
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(|date| date.format(DATE_FORMAT).to_string())
            .map_err(|e| CodecError::new(format!("Failed to parse into date: {raw}: {e}")))
    }
}

impl Codec for DateCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        Self::normalize(raw).map(Value::String)
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        let raw = value
            .as_str()
            .ok_or_else(|| CodecError::new(format!("Expected a date string, got {value}")))?;
        Self::normalize(raw)
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::String)
    }
}

/// Point in time as RFC 3339, normalized to UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantCodec;

impl InstantCodec {
    fn normalize(raw: &str) -> Result<String, CodecError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|at| {
                at.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            })
            .map_err(|e| CodecError::new(format!("Failed to parse into instant: {raw}: {e}")))
    }
}

impl Codec for InstantCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        Self::normalize(raw).map(Value::String)
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        let raw = value
            .as_str()
            .ok_or_else(|| CodecError::new(format!("Expected an instant string, got {value}")))?;
        Self::normalize(raw)
    }

    fn wire_type(&self) -> Option<WireType> {
        Some(WireType::String)
    }
}

/// Tagged union encoded as `case~value`.
///
/// The parameter value is a single-key object `{ case: inner }`. Parsing
/// splits on the first `~` only, so inner values may contain `~` themselves.
#[derive(Debug, Clone, Default)]
pub struct SumCodec {
    cases: Vec<(String, SharedCodec)>,
}

impl SumCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case(mut self, key: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.cases.push((key.into(), Arc::new(codec)));
        self
    }

    fn lookup(&self, key: &str) -> Option<&SharedCodec> {
        self.cases
            .iter()
            .find(|(case, _)| case == key)
            .map(|(_, codec)| codec)
    }
}

impl Codec for SumCodec {
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        let (case, inner) = raw
            .split_once('~')
            .filter(|(case, _)| !case.is_empty())
            .ok_or_else(|| CodecError::new("No \"~\" found to split cases"))?;
        let codec = self
            .lookup(case)
            .ok_or_else(|| CodecError::new(format!("{case} is not a valid case")))?;
        let value = codec
            .parse(inner)
            .map_err(|e| CodecError::new(format!("In case {case}: {e}")))?;

        let mut object = serde_json::Map::new();
        object.insert(case.to_string(), value);
        Ok(Value::Object(object))
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        let (case, inner) = value
            .as_object()
            .filter(|object| object.len() == 1)
            .and_then(|object| object.iter().next())
            .ok_or_else(|| {
                CodecError::new(format!("Expected a single-case object, got {value}"))
            })?;
        let codec = self
            .lookup(case)
            .ok_or_else(|| CodecError::new(format!("{case} is not a valid case")))?;
        Ok(format!("{case}~{}", codec.serialize(inner)?))
    }
}

/// Carries a JSON document in a URL segment, validated against `T`.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn parse(&self, raw: &str) -> Result<Value, CodecError> {
        let typed: T = serde_json::from_str(raw).map_err(|e| CodecError::new(e.to_string()))?;
        serde_json::to_value(typed).map_err(|e| CodecError::new(e.to_string()))
    }

    fn serialize(&self, value: &Value) -> Result<String, CodecError> {
        T::deserialize(value).map_err(|e| CodecError::new(e.to_string()))?;
        serde_json::to_string(value).map_err(|e| CodecError::new(e.to_string()))
    }
}

fn parse_number(raw: &str) -> Result<Number, CodecError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(number_from_f64)
        .ok_or_else(|| CodecError::new(format!("Failed to parse into number: {raw}")))
}

/// Integral values become JSON integers so they deserialize into integer fields.
fn number_from_f64(value: f64) -> Option<Number> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(|f| f.to_string()).unwrap_or_default()
    }
}

fn parse_number_list(list: &str) -> Result<Value, CodecError> {
    list.split('_')
        .map(|item| {
            parse_number(item)
                .map(Value::Number)
                .map_err(|_| CodecError::new(format!("Can't deserialize to float: {item}")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn serialize_number_list(value: &Value) -> Result<String, CodecError> {
    let items = value
        .as_array()
        .ok_or_else(|| CodecError::new(format!("Expected an array of numbers, got {value}")))?;
    let parts = items
        .iter()
        .map(|item| NumberCodec.serialize(item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("_"))
}
