//! Native column values
//!
//! [`Value`] is the typed form of a single cell. Literals in expressions,
//! decoded wire values and model instance attributes all use it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::net::{Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

use crate::fields::escape::quote;

/// A typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Enum member name
    Enum(String),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    /// Map entries in wire order
    Map(Vec<(Value, Value)>),
    Json(serde_json::Value),
}

impl Value {
    /// Render this value as a SQL literal
    ///
    /// Strings are quoted and escaped; the output is always safe to splice
    /// into a statement.
    pub fn to_sql(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) | Value::Enum(s) => quote(s),
            Value::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => quote(&format_timestamp(dt, None)),
            Value::Uuid(u) => quote(&u.to_string()),
            Value::Ipv4(ip) => quote(&ip.to_string()),
            Value::Ipv6(ip) => quote(&ip.to_string()),
            Value::Array(items) => format!("[{}]", join_sql(items)),
            Value::Tuple(items) if items.len() == 1 => format!("tuple({})", join_sql(items)),
            Value::Tuple(items) => format!("({})", join_sql(items)),
            Value::Map(entries) => {
                let args: Vec<String> = entries
                    .iter()
                    .flat_map(|(k, v)| [k.to_sql(), v.to_sql()])
                    .collect();
                format!("map({})", args.join(", "))
            }
            Value::Json(j) => quote(&j.to_string()),
        }
    }

    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Uuid(_) => "uuid",
            Value::Ipv4(_) => "ipv4",
            Value::Ipv6(_) => "ipv6",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Json(_) => "json",
        }
    }
}

fn join_sql(items: &[Value]) -> String {
    items.iter().map(Value::to_sql).collect::<Vec<_>>().join(", ")
}

/// Float literal that the server parses back to the same value
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        f.to_string()
    }
}

/// Unix timestamp text, optionally with a fixed number of fraction digits
///
/// Without a precision, sub-second parts are written with 6 digits only
/// when present.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>, precision: Option<u8>) -> String {
    let secs = dt.timestamp();
    let nanos = dt.timestamp_subsec_nanos();
    let precision = match precision {
        Some(p) => p.min(9) as usize,
        None if nanos == 0 => 0,
        None => 6,
    };
    let sign = if secs < 0 { "-" } else { "" };
    let whole = format!("{}{:010}", sign, secs.unsigned_abs());
    if precision == 0 {
        return whole;
    }
    let frac = format!("{:09}", nanos);
    format!("{}.{}", whole, &frac[..precision])
}

macro_rules! value_from {
    ($($t:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt,
    f32 => Float as f64,
    f64 => Float,
    Decimal => Decimal,
    String => String,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion from a [`Value`] into a native Rust type
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) | Value::Enum(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::UInt(u) => Some(*u != 0),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

macro_rules! int_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Int(i) => <$t>::try_from(*i).ok(),
                        Value::UInt(u) => <$t>::try_from(*u).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

int_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::UInt(u) => Some(Decimal::from(*u)),
            _ => None,
        }
    }
}

macro_rules! variant_from_value {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

variant_from_value!(
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    serde_json::Value => Json
);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Value::from(18).to_sql(), "18");
        assert_eq!(Value::from(-3i64).to_sql(), "-3");
        assert_eq!(Value::from(1.5).to_sql(), "1.5");
        assert_eq!(Value::Float(f64::NAN).to_sql(), "nan");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_sql(), "-inf");
        assert_eq!(Value::Null.to_sql(), "NULL");
        assert_eq!(Value::from(true).to_sql(), "true");
    }

    #[test]
    fn test_string_literal_is_escaped() {
        assert_eq!(Value::from("O'Brien").to_sql(), "'O\\'Brien'");
        assert_eq!(
            Value::from("x\\' OR 1=1 --").to_sql(),
            "'x\\\\\\' OR 1=1 --'"
        );
    }

    #[test]
    fn test_date_literals() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::from(d).to_sql(), "'2024-01-15'");

        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 14, 35, 42).unwrap();
        assert_eq!(Value::from(dt).to_sql(), "'1705329342'");
    }

    #[test]
    fn test_timestamp_formatting() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(format_timestamp(&epoch, None), "0000000000");
        assert_eq!(format_timestamp(&epoch, Some(3)), "0000000000.000");

        let dt = Utc.timestamp_opt(1705329342, 123_456_000).unwrap();
        assert_eq!(format_timestamp(&dt, None), "1705329342.123456");
        assert_eq!(format_timestamp(&dt, Some(3)), "1705329342.123");
    }

    #[test]
    fn test_composite_literals() {
        let arr = Value::from(vec!["a", "b'c"]);
        assert_eq!(arr.to_sql(), "['a', 'b\\'c']");

        let tuple = Value::Tuple(vec![Value::from(1), Value::from("x")]);
        assert_eq!(tuple.to_sql(), "(1, 'x')");

        let single = Value::Tuple(vec![Value::from(1)]);
        assert_eq!(single.to_sql(), "tuple(1)");

        let map = Value::Map(vec![(Value::from("k"), Value::from(2))]);
        assert_eq!(map.to_sql(), "map('k', 2)");

        assert_eq!(Value::Array(vec![]).to_sql(), "[]");
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(u8::from_value(&Value::UInt(200)), Some(200));
        assert_eq!(u8::from_value(&Value::UInt(300)), None);
        assert_eq!(i32::from_value(&Value::Int(-5)), Some(-5));
        assert_eq!(
            Option::<String>::from_value(&Value::Null),
            Some(None)
        );
        assert_eq!(
            Vec::<i64>::from_value(&Value::Array(vec![Value::Int(1), Value::Int(2)])),
            Some(vec![1, 2])
        );
        assert_eq!(String::from_value(&Value::Int(1)), None);
    }
}
