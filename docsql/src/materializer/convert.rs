use super::Value;
use crate::ir::ColumnType;
use bson::{spec::BinarySubtype, Bson, Decimal128, Uuid};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// The largest whole number of days a tick-based time span can hold.
const MAX_TIME_SPAN_DAYS: i64 = 10_675_199;

/// Converts a raw BSON value to the declared column type. When the value
/// cannot be read as that type it is converted from its own BSON type
/// instead, so conversion never fails.
pub fn convert(value: &Bson, column_type: ColumnType) -> Value {
    if matches!(value, Bson::Null | Bson::Undefined) {
        return Value::Null;
    }
    convert_exact(value, column_type).unwrap_or_else(|| convert_loose(value))
}

fn convert_exact(value: &Bson, column_type: ColumnType) -> Option<Value> {
    Some(match column_type {
        ColumnType::Unknown => return None,
        ColumnType::Boolean => Value::Boolean(to_bool(value)),
        ColumnType::Byte => Value::Byte(to_i64(value)? as u8),
        ColumnType::SByte => Value::SByte(to_i64(value)? as i8),
        ColumnType::Char => Value::Char(to_text(value).chars().next().unwrap_or('\0')),
        ColumnType::Int16 => Value::Int16(to_i64(value)? as i16),
        ColumnType::UInt16 => Value::UInt16(to_i64(value)? as u16),
        ColumnType::Int32 => Value::Int32(to_i32(value)?),
        ColumnType::UInt32 => Value::UInt32(to_i64(value)? as u32),
        ColumnType::Int64 => Value::Int64(to_i64(value)?),
        ColumnType::UInt64 => Value::UInt64(to_f64(value)? as u64),
        ColumnType::Single => Value::Single(to_f64(value)? as f32),
        ColumnType::Double => Value::Double(to_f64(value)?),
        ColumnType::Decimal => Value::Decimal(to_decimal(value)?),
        ColumnType::String => Value::String(to_text(value)),
        ColumnType::DateTime => Value::DateTime(to_date_time(value)?),
        ColumnType::Date => Value::Date(match value {
            Bson::DateTime(_) | Bson::String(_) => to_date_time(value)?.date_naive(),
            _ => NaiveDate::from_ymd_opt(1, 1, 1)?,
        }),
        ColumnType::Time => Value::Time(match value {
            Bson::DateTime(_) | Bson::String(_) => to_date_time(value)?.time(),
            _ => midnight()?,
        }),
        ColumnType::TimeSpan => Value::TimeSpan(match value {
            Bson::Int32(i) => from_ticks(i64::from(*i)),
            Bson::Int64(l) => from_ticks(*l),
            Bson::String(s) => parse_time_span(s).unwrap_or_else(Duration::zero),
            _ => Duration::zero(),
        }),
        ColumnType::Guid => Value::Guid(to_guid(value)?),
        ColumnType::ByteArray => match value {
            Bson::Binary(binary) => Value::Bytes(binary.bytes.clone()),
            _ => Value::Null,
        },
    })
}

/// Converts by the value's own BSON type.
fn convert_loose(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Boolean(*b),
        Bson::Int32(i) => Value::Int32(*i),
        Bson::Int64(l) => Value::Int64(*l),
        Bson::Double(d) => Value::Double(*d),
        Bson::Decimal128(d) => Value::Decimal(*d),
        Bson::String(s) => Value::String(s.clone()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::Timestamp(ts) => Value::Timestamp(*ts),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Binary(binary) => Value::Bytes(binary.bytes.clone()),
        Bson::Document(d) => Value::Document(d.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(convert_loose).collect()),
        other => Value::String(other.to_string()),
    }
}

fn to_bool(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => {
            to_f64(value).is_some_and(|d| d.abs() > 0.0)
        }
        Bson::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(l) => Some(*l as f64),
        Bson::Double(d) => Some(*d),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        Bson::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(l) => Some(*l),
        Bson::Double(_) | Bson::Decimal128(_) => to_f64(value).map(|d| d as i64),
        Bson::Boolean(b) => Some(i64::from(*b)),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_i32(value: &Bson) -> Option<i32> {
    match value {
        Bson::Double(_) | Bson::Decimal128(_) => to_f64(value).map(|d| d as i32),
        _ => to_i64(value).map(|l| l as i32),
    }
}

fn to_decimal(value: &Bson) -> Option<Decimal128> {
    match value {
        Bson::Decimal128(d) => Some(*d),
        _ => to_f64(value)?.to_string().parse().ok(),
    }
}

/// The textual form of a value; strings are taken as is.
fn to_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.to_string()),
        other => other.to_string(),
    }
}

fn to_date_time(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(dt) => Some(dt.to_chrono()),
        Bson::String(s) => parse_date_time(s),
        _ => None,
    }
}

fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn to_guid(value: &Bson) -> Option<Uuid> {
    match value {
        Bson::String(s) => Uuid::parse_str(s.trim()).ok(),
        Bson::Binary(binary)
            if matches!(binary.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld) =>
        {
            let bytes: [u8; 16] = binary.bytes.as_slice().try_into().ok()?;
            Some(Uuid::from_bytes(bytes))
        }
        _ => None,
    }
}

fn midnight() -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(0, 0, 0)
}

/// A duration counted in 100-nanosecond ticks.
fn from_ticks(ticks: i64) -> Duration {
    Duration::microseconds(ticks / 10) + Duration::nanoseconds((ticks % 10) * 100)
}

/// Parses `[-][d.]hh:mm[:ss[.fffffff]]`, or a bare number of days.
fn parse_time_span(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let span = match text.split_once(':') {
        None => days(text)?,
        Some((head, rest)) => {
            let (day_part, hours) = match head.split_once('.') {
                Some((d, h)) => (days(d)?, h),
                None => (Duration::zero(), head),
            };
            let mut clock = rest.splitn(2, ':');
            let minutes = bounded(clock.next()?, 60)?;
            let (seconds, fraction) = match clock.next() {
                Some(seconds) => match seconds.split_once('.') {
                    Some((s, f)) => (bounded(s, 60)?, fraction_ticks(f)?),
                    None => (bounded(seconds, 60)?, 0),
                },
                None => (0, 0),
            };
            day_part
                + Duration::hours(bounded(hours, 24)?)
                + Duration::minutes(minutes)
                + Duration::seconds(seconds)
                + from_ticks(fraction)
        }
    };
    Some(if negative { -span } else { span })
}

fn days(text: &str) -> Option<Duration> {
    text.parse::<i64>()
        .ok()
        .filter(|d| (0..=MAX_TIME_SPAN_DAYS).contains(d))
        .map(Duration::days)
}

fn bounded(text: &str, limit: i64) -> Option<i64> {
    text.parse::<i64>().ok().filter(|n| (0..limit).contains(n))
}

fn fraction_ticks(text: &str) -> Option<i64> {
    if text.is_empty() || text.len() > 7 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("{text:0<7}").parse().ok()
}
