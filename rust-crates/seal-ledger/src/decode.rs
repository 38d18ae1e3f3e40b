//! Normalization of raw ledger records.
//!
//! The gateway hands back a struct either as a positional array or as an
//! object keyed by the ABI field names. Every decoder here is total: absent or
//! mistyped fields fall back to a documented default and nothing panics.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

#[cfg(test)]
mod tests;

/// All-zero address used when a record carries no usable creator.
pub const ZERO_ADDRESS: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum RawRecord {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
    /// Anything that is neither an array nor an object, including `null`.
    Malformed(Value),
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RawRecord::Positional(items),
            Value::Object(fields) => RawRecord::Named(fields),
            other => RawRecord::Malformed(other),
        }
    }
}

impl From<RawRecord> for Value {
    fn from(raw: RawRecord) -> Self {
        match raw {
            RawRecord::Positional(items) => Value::Array(items),
            RawRecord::Named(fields) => Value::Object(fields),
            RawRecord::Malformed(value) => value,
        }
    }
}

impl RawRecord {
    /// Field by position or by name, depending on the record's shape.
    pub fn field(&self, index: usize, key: &str) -> Option<&Value> {
        match self {
            RawRecord::Positional(items) => items.get(index),
            RawRecord::Named(fields) => fields.get(key),
            RawRecord::Malformed(_) => None,
        }
    }
}

/// `(id, creator, targetTime, actualPrice, revealed, createdAt)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealRecord {
    pub id: u64,
    pub creator: String,
    pub target_time: u64,
    pub actual_price: u64,
    pub revealed: bool,
    pub created_at: u64,
}

impl Default for SealRecord {
    fn default() -> Self {
        Self {
            id: 0,
            creator: ZERO_ADDRESS.to_string(),
            target_time: 0,
            actual_price: 0,
            revealed: false,
            created_at: 0,
        }
    }
}

/// `(name, price, deviation, rank)`; `price` is 1e8 fixed point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredictionRecord {
    pub name: String,
    pub price: u64,
    pub deviation: u64,
    pub rank: u64,
}

pub fn decode_seal(raw: &RawRecord) -> SealRecord {
    SealRecord {
        id: as_u64(raw.field(0, "id")),
        creator: as_address(raw.field(1, "creator")),
        target_time: as_u64(raw.field(2, "targetTime")),
        actual_price: as_u64(raw.field(3, "actualPrice")),
        revealed: as_bool(raw.field(4, "revealed")),
        created_at: as_u64(raw.field(5, "createdAt")),
    }
}

pub fn decode_prediction(raw: &RawRecord) -> PredictionRecord {
    PredictionRecord {
        name: as_name(raw.field(0, "name")),
        price: as_u64(raw.field(1, "price")),
        deviation: as_u64(raw.field(2, "deviation")),
        rank: as_u64(raw.field(3, "rank")),
    }
}

/// Counts that are not a finite non-negative integer decode as `0`.
pub fn decode_count(value: &Value) -> u64 {
    as_u64(Some(value))
}

/// Unsigned integers, integral floats, decimal strings and `0x` hex strings.
pub fn as_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .filter(|f| *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        Some(Value::String(s)) => parse_integer_string(s).unwrap_or(0),
        _ => 0,
    }
}

pub fn as_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn as_address(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => ZERO_ADDRESS.to_string(),
    }
}

pub fn as_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn parse_integer_string(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    s.parse::<u64>().ok()
}
