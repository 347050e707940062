//! Column types and their codecs
//!
//! [`FieldType`] knows three things about a column type:
//!
//! - its DDL name (`Nullable(Array(String))`)
//! - how to turn a [`Value`] into a SQL literal (`to_db`)
//! - how to turn wire text back into a [`Value`] (`decode_text` / `decode_literal`)
//!
//! Type names coming back in result headers are parsed with [`parse_type_name`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, map_res, opt, recognize},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};
use rust_decimal::Decimal;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{OrmError, OrmResult};
use crate::fields::escape::quote;
use crate::fields::literal::{parse_literal, parse_quoted, Literal};
use crate::fields::value::{format_float, format_timestamp, Value};

/// Earliest value a `Date` column accepts
pub fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Latest value a `Date` column accepts
pub fn max_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2149, 6, 6).unwrap_or_default()
}

/// A column type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    FixedString(usize),
    Date,
    DateTime {
        timezone: Option<String>,
    },
    DateTime64 {
        precision: u8,
        timezone: Option<String>,
    },
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Bool,
    /// `Enum8('name' = value, ...)`
    Enum8(Vec<(String, i16)>),
    /// `Enum16('name' = value, ...)`
    Enum16(Vec<(String, i16)>),
    Array(Box<FieldType>),
    /// Elements may be named (`Tuple(a String, b Int32)`)
    Tuple(Vec<(Option<String>, FieldType)>),
    Map(Box<FieldType>, Box<FieldType>),
    Nullable(Box<FieldType>),
    LowCardinality(Box<FieldType>),
    Uuid,
    Ipv4,
    Ipv6,
    Json,
}

impl FieldType {
    /// `Decimal32(scale)`
    pub fn decimal32(scale: u8) -> Self {
        FieldType::Decimal { precision: 9, scale }
    }

    /// `Decimal64(scale)`
    pub fn decimal64(scale: u8) -> Self {
        FieldType::Decimal { precision: 18, scale }
    }

    /// `Decimal128(scale)`
    pub fn decimal128(scale: u8) -> Self {
        FieldType::Decimal { precision: 38, scale }
    }

    /// `Array(inner)`
    pub fn array(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// `Nullable(inner)`
    pub fn nullable(inner: FieldType) -> Self {
        FieldType::Nullable(Box::new(inner))
    }

    /// `LowCardinality(inner)`
    pub fn low_cardinality(inner: FieldType) -> Self {
        FieldType::LowCardinality(Box::new(inner))
    }

    /// `Map(key, value)`
    pub fn map(key: FieldType, value: FieldType) -> Self {
        FieldType::Map(Box::new(key), Box::new(value))
    }

    /// `Enum8` from `(name, value)` pairs
    pub fn enum8<S: Into<String>>(members: impl IntoIterator<Item = (S, i16)>) -> Self {
        FieldType::Enum8(members.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    /// `Enum16` from `(name, value)` pairs
    pub fn enum16<S: Into<String>>(members: impl IntoIterator<Item = (S, i16)>) -> Self {
        FieldType::Enum16(members.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    /// Check the type is one the server accepts, with the same nesting
    /// rules the server enforces
    pub fn check(&self) -> OrmResult<()> {
        match self {
            FieldType::Decimal { precision, scale } => {
                if !(1..=38).contains(precision) {
                    return Err(OrmError::build("Decimal precision must be between 1 and 38"));
                }
                if scale > precision {
                    return Err(OrmError::build(
                        "Decimal scale must be between 0 and the precision",
                    ));
                }
                Ok(())
            }
            FieldType::Enum8(members) | FieldType::Enum16(members) => {
                if members.is_empty() {
                    return Err(OrmError::build("Enum types need at least one member"));
                }
                if matches!(self, FieldType::Enum8(_))
                    && members.iter().any(|(_, v)| *v < i8::MIN as i16 || *v > i8::MAX as i16)
                {
                    return Err(OrmError::build("Enum8 values must fit in Int8"));
                }
                Ok(())
            }
            FieldType::LowCardinality(inner) => match inner.as_ref() {
                FieldType::LowCardinality(_) | FieldType::Array(_) => Err(OrmError::build(
                    "LowCardinality cannot wrap LowCardinality or Array; use Array(LowCardinality(T))",
                )),
                other => other.check(),
            },
            FieldType::Nullable(inner) => match inner.as_ref() {
                FieldType::Array(_) | FieldType::Map(..) | FieldType::Tuple(_) => Err(
                    OrmError::build("Nullable cannot wrap composite types"),
                ),
                other => other.check(),
            },
            FieldType::Array(inner) => inner.check(),
            FieldType::Tuple(items) => {
                let mut seen = std::collections::HashSet::new();
                for (name, ty) in items {
                    if let Some(name) = name {
                        if !seen.insert(name) {
                            return Err(OrmError::build(format!(
                                "duplicate tuple element name `{}`",
                                name
                            )));
                        }
                    }
                    ty.check()?;
                }
                Ok(())
            }
            FieldType::Map(k, v) => {
                k.check()?;
                v.check()
            }
            _ => Ok(()),
        }
    }

    /// DDL type name
    pub fn db_type(&self) -> String {
        match self {
            FieldType::String => "String".to_string(),
            FieldType::FixedString(n) => format!("FixedString({})", n),
            FieldType::Date => "Date".to_string(),
            FieldType::DateTime { timezone: None } => "DateTime".to_string(),
            FieldType::DateTime { timezone: Some(tz) } => format!("DateTime({})", quote(tz)),
            FieldType::DateTime64 {
                precision,
                timezone,
            } => match timezone {
                Some(tz) => format!("DateTime64({}, {})", precision, quote(tz)),
                None => format!("DateTime64({})", precision),
            },
            FieldType::Int8 => "Int8".to_string(),
            FieldType::Int16 => "Int16".to_string(),
            FieldType::Int32 => "Int32".to_string(),
            FieldType::Int64 => "Int64".to_string(),
            FieldType::UInt8 => "UInt8".to_string(),
            FieldType::UInt16 => "UInt16".to_string(),
            FieldType::UInt32 => "UInt32".to_string(),
            FieldType::UInt64 => "UInt64".to_string(),
            FieldType::Float32 => "Float32".to_string(),
            FieldType::Float64 => "Float64".to_string(),
            FieldType::Decimal { precision, scale } => format!("Decimal({}, {})", precision, scale),
            FieldType::Bool => "Bool".to_string(),
            FieldType::Enum8(members) => format!("Enum8({})", enum_members(members)),
            FieldType::Enum16(members) => format!("Enum16({})", enum_members(members)),
            FieldType::Array(inner) => format!("Array({})", inner.db_type()),
            FieldType::Tuple(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|(name, ty)| match name {
                        Some(name) => format!("{} {}", name, ty.db_type()),
                        None => ty.db_type(),
                    })
                    .collect();
                format!("Tuple({})", parts.join(", "))
            }
            FieldType::Map(k, v) => format!("Map({}, {})", k.db_type(), v.db_type()),
            FieldType::Nullable(inner) => format!("Nullable({})", inner.db_type()),
            FieldType::LowCardinality(inner) => format!("LowCardinality({})", inner.db_type()),
            FieldType::Uuid => "UUID".to_string(),
            FieldType::Ipv4 => "IPv4".to_string(),
            FieldType::Ipv6 => "IPv6".to_string(),
            FieldType::Json => "JSON".to_string(),
        }
    }

    /// Value used when a model attribute was never set
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::String | FieldType::FixedString(_) => Value::String(String::new()),
            FieldType::Date => Value::Date(min_date()),
            FieldType::DateTime { .. } | FieldType::DateTime64 { .. } => {
                Value::DateTime(DateTime::<Utc>::UNIX_EPOCH)
            }
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => {
                Value::Int(0)
            }
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64 => {
                Value::UInt(0)
            }
            FieldType::Float32 | FieldType::Float64 => Value::Float(0.0),
            FieldType::Decimal { scale, .. } => {
                let mut zero = Decimal::ZERO;
                zero.rescale(*scale as u32);
                Value::Decimal(zero)
            }
            FieldType::Bool => Value::Bool(false),
            FieldType::Enum8(members) | FieldType::Enum16(members) => members
                .first()
                .map(|(name, _)| Value::Enum(name.clone()))
                .unwrap_or(Value::Null),
            FieldType::Array(_) => Value::Array(Vec::new()),
            FieldType::Tuple(items) => {
                Value::Tuple(items.iter().map(|(_, ty)| ty.default_value()).collect())
            }
            FieldType::Map(..) => Value::Map(Vec::new()),
            FieldType::Nullable(_) => Value::Null,
            FieldType::LowCardinality(inner) => inner.default_value(),
            FieldType::Uuid => Value::Uuid(Uuid::nil()),
            FieldType::Ipv4 => Value::Ipv4(Ipv4Addr::UNSPECIFIED),
            FieldType::Ipv6 => Value::Ipv6(Ipv6Addr::UNSPECIFIED),
            FieldType::Json => Value::Json(serde_json::Value::Object(Default::default())),
        }
    }

    /// Strip `LowCardinality` wrappers, which don't change the value codec
    fn storage_type(&self) -> &FieldType {
        match self {
            FieldType::LowCardinality(inner) => inner.storage_type(),
            other => other,
        }
    }

    fn int_bounds(&self) -> Option<(i128, i128)> {
        Some(match self {
            FieldType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            FieldType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            FieldType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            FieldType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            FieldType::UInt8 => (0, u8::MAX as i128),
            FieldType::UInt16 => (0, u16::MAX as i128),
            FieldType::UInt32 => (0, u32::MAX as i128),
            FieldType::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    fn is_unsigned(&self) -> bool {
        matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64
        )
    }

    fn int_value(&self, n: i128) -> Result<Value, String> {
        let (min, max) = self.int_bounds().unwrap_or((i64::MIN as i128, u64::MAX as i128));
        if n < min || n > max {
            return Err(format!(
                "{} out of range - {} is not between {} and {}",
                self.db_type(),
                n,
                min,
                max
            ));
        }
        Ok(if self.is_unsigned() {
            Value::UInt(n as u64)
        } else {
            Value::Int(n as i64)
        })
    }

    fn enum_members(&self) -> Option<&[(String, i16)]> {
        match self {
            FieldType::Enum8(m) | FieldType::Enum16(m) => Some(m),
            _ => None,
        }
    }

    /// Convert `value` to this type, validating ranges and membership
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        let ty = self.storage_type();
        match (ty, value) {
            (FieldType::Nullable(_), Value::Null) => Ok(Value::Null),
            (FieldType::Nullable(inner), v) => inner.coerce(v),
            (_, Value::Null) => Err(format!("{} is not nullable", self.db_type())),

            (FieldType::String, Value::String(s)) => Ok(Value::String(s.clone())),
            (FieldType::FixedString(n), Value::String(s)) => {
                if s.len() > *n {
                    Err(format!(
                        "Value of {} bytes is too long for FixedString({})",
                        s.len(),
                        n
                    ))
                } else {
                    Ok(Value::String(s.clone()))
                }
            }

            (FieldType::Date, Value::Date(d)) => check_date(*d),
            (FieldType::Date, Value::DateTime(dt)) => check_date(dt.date_naive()),
            (FieldType::DateTime { .. } | FieldType::DateTime64 { .. }, Value::DateTime(dt)) => {
                if dt.timestamp() < 0 {
                    Err(format!("{} cannot hold dates before 1970", self.db_type()))
                } else {
                    Ok(Value::DateTime(*dt))
                }
            }
            (FieldType::DateTime { .. } | FieldType::DateTime64 { .. }, Value::Date(d)) => {
                Ok(Value::DateTime(Utc.from_utc_datetime(&d.and_time(Default::default()))))
            }

            (t, Value::Int(i)) if t.int_bounds().is_some() => t.int_value(*i as i128),
            (t, Value::UInt(u)) if t.int_bounds().is_some() => t.int_value(*u as i128),
            (t, Value::Bool(b)) if t.int_bounds().is_some() => t.int_value(*b as i128),

            (FieldType::Float32 | FieldType::Float64, Value::Float(f)) => Ok(Value::Float(*f)),
            (FieldType::Float32 | FieldType::Float64, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (FieldType::Float32 | FieldType::Float64, Value::UInt(u)) => {
                Ok(Value::Float(*u as f64))
            }

            (FieldType::Decimal { precision, scale }, v) => {
                let d = match v {
                    Value::Decimal(d) => *d,
                    Value::Int(i) => Decimal::from(*i),
                    Value::UInt(u) => Decimal::from(*u),
                    Value::Float(f) => Decimal::from_f64_retain(*f)
                        .ok_or_else(|| format!("Non-finite value for Decimal - {}", f))?,
                    other => return Err(mismatch(self, other)),
                };
                check_decimal(d, *precision, *scale)
            }

            (FieldType::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldType::Bool, Value::Int(i)) => Ok(Value::Bool(*i != 0)),
            (FieldType::Bool, Value::UInt(u)) => Ok(Value::Bool(*u != 0)),

            (t @ (FieldType::Enum8(_) | FieldType::Enum16(_)), v) => {
                let members = t.enum_members().unwrap_or_default();
                let found = match v {
                    Value::Enum(name) | Value::String(name) => {
                        members.iter().find(|(n, _)| n == name)
                    }
                    Value::Int(i) => members.iter().find(|(_, val)| *val as i64 == *i),
                    Value::UInt(u) => members.iter().find(|(_, val)| *val as i64 == *u as i64),
                    other => return Err(mismatch(self, other)),
                };
                found
                    .map(|(name, _)| Value::Enum(name.clone()))
                    .ok_or_else(|| format!("Invalid value for {}: {:?}", self.db_type(), v))
            }

            (FieldType::Array(inner), Value::Array(items)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|v| inner.coerce(v))
                    .collect::<Result<_, _>>()?,
            )),
            (FieldType::Tuple(types), Value::Tuple(items)) => {
                if types.len() != items.len() {
                    return Err(format!(
                        "{} expects {} elements, got {}",
                        self.db_type(),
                        types.len(),
                        items.len()
                    ));
                }
                Ok(Value::Tuple(
                    types
                        .iter()
                        .zip(items)
                        .map(|((_, ty), v)| ty.coerce(v))
                        .collect::<Result<_, _>>()?,
                ))
            }
            (FieldType::Map(kt, vt), Value::Map(entries)) => Ok(Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((kt.coerce(k)?, vt.coerce(v)?)))
                    .collect::<Result<_, String>>()?,
            )),

            (FieldType::Uuid, Value::Uuid(u)) => Ok(Value::Uuid(*u)),
            (FieldType::Uuid, Value::String(s)) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| format!("Invalid value for UUID: {}", e)),
            (FieldType::Ipv4, Value::Ipv4(ip)) => Ok(Value::Ipv4(*ip)),
            (FieldType::Ipv4, Value::UInt(u)) => u32::try_from(*u)
                .map(|n| Value::Ipv4(Ipv4Addr::from(n)))
                .map_err(|_| format!("Invalid value for IPv4: {}", u)),
            (FieldType::Ipv6, Value::Ipv6(ip)) => Ok(Value::Ipv6(*ip)),
            (FieldType::Ipv6, Value::Ipv4(ip)) => Ok(Value::Ipv6(ip.to_ipv6_mapped())),
            (FieldType::Json, Value::Json(j)) => Ok(Value::Json(j.clone())),
            (FieldType::Json, Value::String(s)) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|e| format!("Invalid JSON: {}", e)),

            (_, other) => Err(mismatch(self, other)),
        }
    }

    /// Render `value` as a SQL literal of this type
    pub fn to_db(&self, value: &Value) -> Result<String, String> {
        let coerced = self.coerce(value)?;
        Ok(self.render_coerced(&coerced))
    }

    fn render_coerced(&self, value: &Value) -> String {
        match (self.storage_type(), value) {
            (FieldType::Nullable(inner), v) if !v.is_null() => inner.render_coerced(v),
            (FieldType::DateTime { .. }, Value::DateTime(dt)) => {
                quote(&format_timestamp(dt, Some(0)))
            }
            (FieldType::DateTime64 { precision, .. }, Value::DateTime(dt)) => {
                quote(&format_timestamp(dt, Some(*precision)))
            }
            (FieldType::Float32 | FieldType::Float64, Value::Float(f)) => format_float(*f),
            (FieldType::Array(inner), Value::Array(items)) => {
                let parts: Vec<String> = items.iter().map(|v| inner.render_coerced(v)).collect();
                format!("[{}]", parts.join(", "))
            }
            (FieldType::Tuple(types), Value::Tuple(items)) => {
                let parts: Vec<String> = types
                    .iter()
                    .zip(items)
                    .map(|((_, ty), v)| ty.render_coerced(v))
                    .collect();
                if parts.len() == 1 {
                    format!("tuple({})", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            (FieldType::Map(kt, vt), Value::Map(entries)) => {
                let parts: Vec<String> = entries
                    .iter()
                    .flat_map(|(k, v)| [kt.render_coerced(k), vt.render_coerced(v)])
                    .collect();
                format!("map({})", parts.join(", "))
            }
            (_, v) => v.to_sql(),
        }
    }

    /// Decode a wire cell; `None` is SQL NULL
    pub fn decode_cell(&self, cell: Option<&str>) -> Result<Value, String> {
        match cell {
            None => match self.storage_type() {
                FieldType::Nullable(_) => Ok(Value::Null),
                _ => Err(format!("unexpected NULL for {}", self.db_type())),
            },
            Some(text) => self.decode_text(text),
        }
    }

    /// Decode unescaped wire text
    pub fn decode_text(&self, text: &str) -> Result<Value, String> {
        match self.storage_type() {
            // Wire NULL never reaches here, so `NULL` is data
            FieldType::Nullable(inner) => inner.decode_text(text),
            FieldType::Array(_) | FieldType::Tuple(_) | FieldType::Map(..) => {
                self.decode_literal(&parse_literal(text)?)
            }
            scalar => scalar.decode_scalar(text),
        }
    }

    /// Parse a SQL literal produced by [`FieldType::to_db`] back into a value
    pub fn from_sql_literal(&self, literal: &str) -> Result<Value, String> {
        self.decode_literal(&parse_literal(literal)?)
    }

    /// Decode an already-parsed literal tree
    pub fn decode_literal(&self, literal: &Literal) -> Result<Value, String> {
        match (self.storage_type(), literal) {
            (FieldType::Nullable(_), Literal::Null) => Ok(Value::Null),
            (FieldType::Nullable(inner), lit) => inner.decode_literal(lit),
            (_, Literal::Null) => Err(format!("unexpected NULL for {}", self.db_type())),
            (FieldType::Array(inner), Literal::List(items)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| inner.decode_literal(item))
                    .collect::<Result<_, _>>()?,
            )),
            (FieldType::Tuple(types), Literal::List(items)) => {
                if types.len() != items.len() {
                    return Err(format!(
                        "{} expects {} elements, got {}",
                        self.db_type(),
                        types.len(),
                        items.len()
                    ));
                }
                Ok(Value::Tuple(
                    types
                        .iter()
                        .zip(items)
                        .map(|((_, ty), item)| ty.decode_literal(item))
                        .collect::<Result<_, _>>()?,
                ))
            }
            (FieldType::Map(kt, vt), Literal::Map(entries)) => Ok(Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((kt.decode_literal(k)?, vt.decode_literal(v)?)))
                    .collect::<Result<_, String>>()?,
            )),
            (
                ty @ (FieldType::Array(_) | FieldType::Tuple(_) | FieldType::Map(..)),
                Literal::Scalar(s),
            ) => ty.decode_text(s),
            (ty, Literal::Scalar(s)) => ty.decode_scalar(s),
            (_, other) => Err(format!(
                "cannot decode {:?} as {}",
                other,
                self.db_type()
            )),
        }
    }

    fn decode_scalar(&self, text: &str) -> Result<Value, String> {
        match self {
            FieldType::String => Ok(Value::String(text.to_string())),
            FieldType::FixedString(_) => Ok(Value::String(text.trim_end_matches('\0').to_string())),
            FieldType::Date => parse_date(text).map(Value::Date),
            FieldType::DateTime { .. } | FieldType::DateTime64 { .. } => {
                parse_datetime(text).map(Value::DateTime)
            }
            t if t.int_bounds().is_some() => {
                let n: i128 = text
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid value for {} - '{}'", t.db_type(), text))?;
                t.int_value(n)
            }
            FieldType::Float32 | FieldType::Float64 => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("Invalid value for {} - '{}'", self.db_type(), text)),
            FieldType::Decimal { precision, scale } => {
                let d = Decimal::from_str(text.trim())
                    .or_else(|_| Decimal::from_scientific(text.trim()))
                    .map_err(|_| format!("Invalid value for {} - '{}'", self.db_type(), text))?;
                check_decimal(d, *precision, *scale)
            }
            FieldType::Bool => match text {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("Invalid value for Bool - '{}'", text)),
            },
            FieldType::Enum8(members) | FieldType::Enum16(members) => {
                if let Some((name, _)) = members.iter().find(|(n, _)| n == text) {
                    return Ok(Value::Enum(name.clone()));
                }
                text.parse::<i16>()
                    .ok()
                    .and_then(|n| members.iter().find(|(_, v)| *v == n))
                    .map(|(name, _)| Value::Enum(name.clone()))
                    .ok_or_else(|| format!("Invalid value for {}: '{}'", self.db_type(), text))
            }
            FieldType::Uuid => Uuid::parse_str(text)
                .map(Value::Uuid)
                .map_err(|e| format!("Invalid value for UUID: {}", e)),
            FieldType::Ipv4 => text
                .parse::<Ipv4Addr>()
                .or_else(|_| text.parse::<u32>().map(Ipv4Addr::from))
                .map(Value::Ipv4)
                .map_err(|_| format!("Invalid value for IPv4 - '{}'", text)),
            FieldType::Ipv6 => text
                .parse::<Ipv6Addr>()
                .map(Value::Ipv6)
                .map_err(|_| format!("Invalid value for IPv6 - '{}'", text)),
            FieldType::Json => serde_json::from_str(text)
                .map(Value::Json)
                .map_err(|e| format!("Invalid JSON: {}", e)),
            composite => composite.decode_text(text),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.db_type())
    }
}

impl FromStr for FieldType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type_name(s)
    }
}

fn enum_members(members: &[(String, i16)]) -> String {
    members
        .iter()
        .map(|(name, value)| format!("{} = {}", quote(name), value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn mismatch(ty: &FieldType, value: &Value) -> String {
    format!("cannot store {} value in {} column", value.kind(), ty.db_type())
}

fn check_date(d: NaiveDate) -> Result<Value, String> {
    if d < min_date() || d > max_date() {
        Err(format!(
            "Date out of range - {} is not between {} and {}",
            d,
            min_date(),
            max_date()
        ))
    } else {
        Ok(Value::Date(d))
    }
}

fn check_decimal(d: Decimal, precision: u8, scale: u8) -> Result<Value, String> {
    let rounded = d.round_dp(scale as u32);
    let integer_digits = precision.saturating_sub(scale) as u32;
    // 10^integer_digits overflows rust_decimal past 28 digits; nothing that
    // large fits in a Decimal anyway
    if integer_digits < 29 {
        let limit = Decimal::from_i128_with_scale(10i128.pow(integer_digits), 0);
        if rounded.abs() >= limit {
            return Err(format!(
                "Decimal({}, {}) out of range - {}",
                precision, scale, d
            ));
        }
    }
    let mut value = rounded;
    value.rescale(scale as u32);
    Ok(Value::Decimal(value))
}

fn parse_date(text: &str) -> Result<NaiveDate, String> {
    if text == "0000-00-00" {
        return Ok(min_date());
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(d);
    }
    text.parse::<i64>()
        .ok()
        .and_then(|days| min_date().checked_add_signed(Duration::days(days)))
        .ok_or_else(|| format!("Invalid value for Date - '{}'", text))
}

fn parse_datetime(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if text.starts_with("0000-00-00") {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    }

    // Unix timestamps, optionally with a fractional part
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if !whole.is_empty()
        && whole.trim_start_matches('-').chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit())
    {
        let secs: i64 = whole
            .parse()
            .map_err(|_| format!("Invalid value for DateTime - '{}'", text))?;
        let mut digits = frac.chars().take(9).collect::<String>();
        while digits.len() < 9 {
            digits.push('0');
        }
        let nanos: u32 = digits.parse().unwrap_or(0);
        return Utc
            .timestamp_opt(secs, nanos)
            .single()
            .ok_or_else(|| format!("Invalid value for DateTime - '{}'", text));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&d.and_time(Default::default())));
    }
    Err(format!("Invalid value for DateTime - '{}'", text))
}

// ============================================
// Type name parser
// ============================================

/// Parse a type name as printed by the server (`Nullable(Array(String))`)
///
/// Types the ORM has no codec for (`Int128`, `AggregateFunction(...)`, ...)
/// are an error here; [`parse_type_name_lenient`] maps them to `String`.
pub fn parse_type_name(input: &str) -> OrmResult<FieldType> {
    match delimited(multispace0, type_name, multispace0)(input) {
        Ok(("", ty)) => Ok(ty),
        Ok((rest, _)) => Err(OrmError::build(format!(
            "unexpected input after type name '{}': '{}'",
            input, rest
        ))),
        Err(_) => Err(OrmError::build(format!("unsupported type name '{}'", input))),
    }
}

/// Parse a type name, decoding unknown types as plain strings
pub fn parse_type_name_lenient(input: &str) -> FieldType {
    parse_type_name(input).unwrap_or_else(|_| {
        tracing::debug!(type_name = %input, "unknown column type, decoding as String");
        FieldType::String
    })
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn number<T: FromStr>(input: &str) -> IResult<&str, T> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<T>())(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn args<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(
        pair(char('('), multispace0),
        inner,
        pair(multispace0, char(')')),
    )
}

fn wrapper<'a>(
    name: &'static str,
    build: fn(FieldType) -> FieldType,
) -> impl FnMut(&'a str) -> IResult<&'a str, FieldType> {
    map(preceded(tag(name), args(type_name)), build)
}

fn type_name(input: &str) -> IResult<&str, FieldType> {
    alt((
        wrapper("Nullable", FieldType::nullable),
        wrapper("LowCardinality", FieldType::low_cardinality),
        wrapper("Array", FieldType::array),
        map(
            preceded(
                tag("Map"),
                args(separated_pair(type_name, comma, type_name)),
            ),
            |(k, v)| FieldType::map(k, v),
        ),
        map(
            preceded(tag("Tuple"), args(separated_list1(comma, tuple_element))),
            FieldType::Tuple,
        ),
        enum_type,
        decimal_type,
        datetime_type,
        map(preceded(tag("FixedString"), args(number::<usize>)), FieldType::FixedString),
        simple_type,
    ))(input)
}

fn tuple_element(input: &str) -> IResult<&str, (Option<String>, FieldType)> {
    alt((
        map(
            separated_pair(ident, multispace1, type_name),
            |(name, ty)| (Some(name.to_string()), ty),
        ),
        map(type_name, |ty| (None, ty)),
    ))(input)
}

fn enum_type(input: &str) -> IResult<&str, FieldType> {
    let member = separated_pair(
        parse_quoted,
        delimited(multispace0, char('='), multispace0),
        number::<i16>,
    );
    let (rest, (kind, members)) = pair(
        alt((tag("Enum8"), tag("Enum16"))),
        args(separated_list1(comma, member)),
    )(input)?;
    let ty = if kind == "Enum8" {
        FieldType::Enum8(members)
    } else {
        FieldType::Enum16(members)
    };
    Ok((rest, ty))
}

fn decimal_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        map(
            preceded(
                tag("Decimal32"),
                args(number::<u8>),
            ),
            FieldType::decimal32,
        ),
        map(preceded(tag("Decimal64"), args(number::<u8>)), FieldType::decimal64),
        map(preceded(tag("Decimal128"), args(number::<u8>)), FieldType::decimal128),
        map(
            preceded(
                tag("Decimal"),
                args(separated_pair(number::<u8>, comma, number::<u8>)),
            ),
            |(precision, scale)| FieldType::Decimal { precision, scale },
        ),
    ))(input)
}

fn datetime_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        map(
            preceded(
                tag("DateTime64"),
                args(pair(number::<u8>, opt(preceded(comma, parse_quoted)))),
            ),
            |(precision, timezone)| FieldType::DateTime64 {
                precision,
                timezone,
            },
        ),
        map(
            preceded(tag("DateTime"), args(parse_quoted)),
            |tz| FieldType::DateTime { timezone: Some(tz) },
        ),
    ))(input)
}

fn simple_type(input: &str) -> IResult<&str, FieldType> {
    let (rest, name) = terminated(ident, multispace0)(input)?;
    let ty = match name {
        "String" => FieldType::String,
        "Date" | "Date32" => FieldType::Date,
        "DateTime" => FieldType::DateTime { timezone: None },
        "Int8" => FieldType::Int8,
        "Int16" => FieldType::Int16,
        "Int32" => FieldType::Int32,
        "Int64" => FieldType::Int64,
        "UInt8" => FieldType::UInt8,
        "UInt16" => FieldType::UInt16,
        "UInt32" => FieldType::UInt32,
        "UInt64" => FieldType::UInt64,
        "Float32" => FieldType::Float32,
        "Float64" => FieldType::Float64,
        "Bool" | "Boolean" => FieldType::Bool,
        "UUID" => FieldType::Uuid,
        "IPv4" => FieldType::Ipv4,
        "IPv6" => FieldType::Ipv6,
        "JSON" => FieldType::Json,
        // NULL literals come back as Nullable(Nothing)
        "Nothing" => FieldType::String,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };
    Ok((rest, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ty: &FieldType, value: Value) {
        let literal = ty.to_db(&value).unwrap();
        let back = ty.from_sql_literal(&literal).unwrap();
        assert_eq!(back, value, "round trip through {} failed: {}", ty, literal);
    }

    #[test]
    fn test_db_type_names() {
        assert_eq!(FieldType::nullable(FieldType::array(FieldType::String)).db_type(), "Nullable(Array(String))");
        assert_eq!(FieldType::decimal64(4).db_type(), "Decimal(18, 4)");
        assert_eq!(
            FieldType::enum8([("apple", 1), ("banana", 2)]).db_type(),
            "Enum8('apple' = 1, 'banana' = 2)"
        );
        assert_eq!(
            FieldType::DateTime64 { precision: 3, timezone: Some("UTC".into()) }.db_type(),
            "DateTime64(3, 'UTC')"
        );
        assert_eq!(
            FieldType::Tuple(vec![(Some("a".into()), FieldType::String), (Some("b".into()), FieldType::Int32)]).db_type(),
            "Tuple(a String, b Int32)"
        );
    }

    #[test]
    fn test_parse_type_names() {
        let cases = [
            "String",
            "FixedString(16)",
            "Nullable(Int32)",
            "Array(Nullable(String))",
            "LowCardinality(String)",
            "Map(String, UInt64)",
            "Tuple(String, Int32)",
            "Tuple(a String, b Array(Int8))",
            "Enum8('apple' = 1, 'banana' = -2)",
            "Decimal(18, 4)",
            "DateTime('Europe/Berlin')",
            "DateTime64(3, 'UTC')",
            "DateTime64(6)",
            "UUID",
            "IPv4",
        ];
        for case in cases {
            let ty = parse_type_name(case).unwrap();
            assert_eq!(ty.db_type(), case, "type {} did not survive parsing", case);
        }
    }

    #[test]
    fn test_parse_type_name_aliases() {
        assert_eq!(parse_type_name("Decimal32(2)").unwrap(), FieldType::decimal32(2));
        assert_eq!(parse_type_name("Date32").unwrap(), FieldType::Date);
        assert_eq!(
            parse_type_name("Nullable(Nothing)").unwrap(),
            FieldType::nullable(FieldType::String)
        );
    }

    #[test]
    fn test_unknown_type_names() {
        assert!(parse_type_name("AggregateFunction(uniq, String)").is_err());
        assert_eq!(parse_type_name_lenient("Int256"), FieldType::String);
    }

    #[test]
    fn test_round_trip_scalars() {
        roundtrip(&FieldType::String, Value::from(""));
        roundtrip(&FieldType::String, Value::from("it's a \\ \t \n test"));
        roundtrip(&FieldType::UInt8, Value::UInt(0));
        roundtrip(&FieldType::UInt8, Value::UInt(255));
        roundtrip(&FieldType::Int64, Value::Int(i64::MIN));
        roundtrip(&FieldType::UInt64, Value::UInt(u64::MAX));
        roundtrip(&FieldType::Float64, Value::Float(0.0));
        roundtrip(&FieldType::Float64, Value::Float(-1.25e-7));
        roundtrip(&FieldType::Bool, Value::Bool(true));
        roundtrip(&FieldType::Uuid, Value::Uuid(Uuid::nil()));
        roundtrip(&FieldType::Ipv4, Value::Ipv4(Ipv4Addr::new(10, 0, 0, 1)));
        roundtrip(&FieldType::Ipv6, Value::Ipv6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn test_round_trip_dates() {
        roundtrip(&FieldType::Date, Value::Date(min_date()));
        roundtrip(&FieldType::Date, Value::Date(max_date()));
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 14, 35, 42).unwrap();
        roundtrip(&FieldType::DateTime { timezone: None }, Value::DateTime(dt));
        roundtrip(
            &FieldType::DateTime { timezone: None },
            Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
        );
        let precise = Utc.timestamp_opt(1705329342, 123_000_000).unwrap();
        roundtrip(
            &FieldType::DateTime64 { precision: 3, timezone: None },
            Value::DateTime(precise),
        );
    }

    #[test]
    fn test_round_trip_composites() {
        let arr = FieldType::array(FieldType::String);
        roundtrip(&arr, Value::Array(vec![]));
        roundtrip(&arr, Value::from(vec!["a", "b,c", "d'e"]));

        let nullable = FieldType::nullable(FieldType::Int32);
        roundtrip(&nullable, Value::Null);
        roundtrip(&nullable, Value::Int(-7));

        let tuple = FieldType::Tuple(vec![(None, FieldType::String), (None, FieldType::UInt8)]);
        roundtrip(&tuple, Value::Tuple(vec![Value::from("x"), Value::UInt(1)]));

        let map = FieldType::map(FieldType::String, FieldType::UInt64);
        roundtrip(&map, Value::Map(vec![(Value::from("k"), Value::UInt(3))]));
        roundtrip(&map, Value::Map(vec![]));

        let enums = FieldType::low_cardinality(FieldType::enum8([("apple", 1), ("banana", 2)]));
        roundtrip(&enums, Value::Enum("banana".into()));
    }

    #[test]
    fn test_round_trip_decimal() {
        let ty = FieldType::decimal32(2);
        roundtrip(&ty, Value::Decimal(Decimal::new(12345, 2)));
        roundtrip(&ty, Value::Decimal(Decimal::new(0, 2)));
    }

    #[test]
    fn test_range_validation() {
        assert!(FieldType::UInt8.to_db(&Value::Int(256)).is_err());
        assert!(FieldType::UInt8.to_db(&Value::Int(-1)).is_err());
        assert!(FieldType::Int8.to_db(&Value::Int(-128)).is_ok());
        assert!(FieldType::FixedString(2).to_db(&Value::from("abc")).is_err());
        assert!(FieldType::Date
            .to_db(&Value::Date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()))
            .is_err());
        assert!(FieldType::decimal32(2)
            .to_db(&Value::Decimal(Decimal::new(10_000_000, 0)))
            .is_err());
        assert!(FieldType::String.to_db(&Value::Null).is_err());
    }

    #[test]
    fn test_enum_coercion() {
        let ty = FieldType::enum8([("apple", 1), ("banana", 2)]);
        assert_eq!(ty.to_db(&Value::Int(2)).unwrap(), "'banana'");
        assert_eq!(ty.to_db(&Value::from("apple")).unwrap(), "'apple'");
        assert!(ty.to_db(&Value::from("cherry")).is_err());
        assert_eq!(ty.decode_text("2").unwrap(), Value::Enum("banana".into()));
    }

    #[test]
    fn test_decode_wire_text() {
        assert_eq!(
            FieldType::DateTime { timezone: None }.decode_text("2024-01-15T14:35:42Z").unwrap(),
            Value::DateTime(Utc.with_ymd_and_hms(2024, 1, 15, 14, 35, 42).unwrap())
        );
        assert_eq!(
            FieldType::DateTime { timezone: None }.decode_text("0000-00-00 00:00:00").unwrap(),
            Value::DateTime(DateTime::<Utc>::UNIX_EPOCH)
        );
        assert_eq!(
            FieldType::Date.decode_text("0000-00-00").unwrap(),
            Value::Date(min_date())
        );
        assert_eq!(
            FieldType::FixedString(4).decode_text("ab\0\0").unwrap(),
            Value::from("ab")
        );
        assert_eq!(
            FieldType::array(FieldType::nullable(FieldType::UInt8)).decode_text("[1,NULL]").unwrap(),
            Value::Array(vec![Value::UInt(1), Value::Null])
        );
        assert_eq!(
            FieldType::map(FieldType::String, FieldType::UInt8).decode_text("{'a':1}").unwrap(),
            Value::Map(vec![(Value::from("a"), Value::UInt(1))])
        );
        assert!(FieldType::UInt8.decode_text("abc").is_err());
        assert!(FieldType::UInt8.decode_cell(None).is_err());
        assert_eq!(
            FieldType::nullable(FieldType::UInt8).decode_cell(None).unwrap(),
            Value::Null
        );

        let nullable = FieldType::nullable(FieldType::String);
        assert_eq!(nullable.decode_cell(Some("NULL")).unwrap(), Value::from("NULL"));
        assert_eq!(nullable.decode_cell(Some("\\N")).unwrap(), Value::from("\\N"));
    }

    #[test]
    fn test_type_check() {
        assert!(FieldType::Decimal { precision: 0, scale: 0 }.check().is_err());
        assert!(FieldType::low_cardinality(FieldType::array(FieldType::String)).check().is_err());
        assert!(FieldType::array(FieldType::low_cardinality(FieldType::String)).check().is_ok());
        assert!(FieldType::enum8([("big", 300)]).check().is_err());
    }
}
