//! DuckDB values to JSON

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value as DuckValue};
use serde_json::{json, Value};

/// Convert one DuckDB value to JSON.
///
/// Numbers and booleans map directly, timestamps and dates to ISO-8601
/// text, lists and arrays to JSON arrays. Types without a natural JSON form
/// fall back to a descriptive string.
pub fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => json!(i),
        DuckValue::SmallInt(i) => json!(i),
        DuckValue::Int(i) => json!(i),
        DuckValue::BigInt(i) => json!(i),
        DuckValue::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => json!(small),
            Err(_) => Value::String(i.to_string()),
        },
        DuckValue::UTinyInt(i) => json!(i),
        DuckValue::USmallInt(i) => json!(i),
        DuckValue::UInt(i) => json!(i),
        DuckValue::UBigInt(i) => json!(i),
        DuckValue::Float(f) => float(f as f64),
        DuckValue::Double(f) => float(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
        DuckValue::Timestamp(unit, v) => timestamp(unit, v),
        DuckValue::Date32(days) => date(days),
        DuckValue::Time64(unit, v) => time(unit, v),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

/// Non-finite floats have no JSON form
fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

fn timestamp(unit: TimeUnit, v: i64) -> Value {
    match DateTime::from_timestamp_micros(to_micros(unit, v)) {
        Some(ts) => Value::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        None => Value::Null,
    }
}

fn date(days: i32) -> Value {
    // 719_163 days from 0001-01-01 to the Unix epoch
    match NaiveDate::from_num_days_from_ce_opt(days.saturating_add(719_163)) {
        Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn time(unit: TimeUnit, v: i64) -> Value {
    let micros = to_micros(unit, v);
    let secs = u32::try_from(micros / 1_000_000).ok();
    let nanos = u32::try_from((micros % 1_000_000) * 1_000).ok();

    match secs
        .zip(nanos)
        .and_then(|(s, n)| NaiveTime::from_num_seconds_from_midnight_opt(s, n))
    {
        Some(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        None => Value::Null,
    }
}
