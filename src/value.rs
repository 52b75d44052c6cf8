//! Owned values: prepared-statement parameters and decoded result cells.

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Calendar date-time as MySQL carries it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro: u32,
}

/// Duration value for TIME columns; MySQL allows up to 838 hours, hence
/// the separate day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeValue {
    pub negative: bool,
    pub days: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub micro: u32,
}

/// A single MySQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    DateTime(DateTime),
    Time(TimeValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, when it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

// ============================================================================
// Binary protocol decoding
// ============================================================================

/// Decode one binary-protocol value and return it with the remaining
/// bytes of the row.
pub fn read_binary_value(
    column_type: ColumnType,
    flags: ColumnFlags,
    data: &[u8],
) -> Result<(Value, &[u8])> {
    let unsigned = flags.contains(ColumnFlags::UNSIGNED_FLAG);

    match column_type {
        ColumnType::MYSQL_TYPE_NULL => Ok((Value::Null, data)),

        ColumnType::MYSQL_TYPE_TINY => {
            let (val, rest) = read_int_1(data)?;
            let value = if unsigned {
                Value::UInt(val as u64)
            } else {
                Value::Int(val as i8 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
            let (val, rest) = read_int_2(data)?;
            let value = if unsigned {
                Value::UInt(val as u64)
            } else {
                Value::Int(val as i16 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => {
            let (val, rest) = read_int_4(data)?;
            let value = if unsigned {
                Value::UInt(val as u64)
            } else {
                Value::Int(val as i32 as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_LONGLONG => {
            let (val, rest) = read_int_8(data)?;
            let value = if unsigned {
                Value::UInt(val)
            } else {
                Value::Int(val as i64)
            };
            Ok((value, rest))
        }

        ColumnType::MYSQL_TYPE_FLOAT => {
            let (val, rest) = read_int_4(data)?;
            Ok((Value::Float(f32::from_bits(val)), rest))
        }

        ColumnType::MYSQL_TYPE_DOUBLE => {
            let (val, rest) = read_int_8(data)?;
            Ok((Value::Double(f64::from_bits(val)), rest))
        }

        ColumnType::MYSQL_TYPE_DATE
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP2
        | ColumnType::MYSQL_TYPE_NEWDATE => {
            let (len, data) = read_int_1(data)?;
            let mut dt = DateTime::default();
            let rest = match len {
                0 => data,
                4 | 7 | 11 => {
                    let (ymd, rest) = read_string_fix(data, 4)?;
                    dt.year = u16::from_le_bytes([ymd[0], ymd[1]]);
                    dt.month = ymd[2];
                    dt.day = ymd[3];
                    let mut rest = rest;
                    if len >= 7 {
                        let (hms, r) = read_string_fix(rest, 3)?;
                        dt.hour = hms[0];
                        dt.minute = hms[1];
                        dt.second = hms[2];
                        rest = r;
                    }
                    if len == 11 {
                        let (micro, r) = read_int_4(rest)?;
                        dt.micro = micro;
                        rest = r;
                    }
                    rest
                }
                _ => return Err(Error::InvalidPacket),
            };
            Ok((Value::DateTime(dt), rest))
        }

        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            let (len, data) = read_int_1(data)?;
            let mut time = TimeValue::default();
            let rest = match len {
                0 => data,
                8 | 12 => {
                    let (sign, rest) = read_int_1(data)?;
                    time.negative = sign == 1;
                    let (days, rest) = read_int_4(rest)?;
                    time.days = days;
                    let (hms, rest) = read_string_fix(rest, 3)?;
                    time.hours = hms[0];
                    time.minutes = hms[1];
                    time.seconds = hms[2];
                    let mut rest = rest;
                    if len == 12 {
                        let (micro, r) = read_int_4(rest)?;
                        time.micro = micro;
                        rest = r;
                    }
                    rest
                }
                _ => return Err(Error::InvalidPacket),
            };
            Ok((Value::Time(time), rest))
        }

        // Everything else travels as a length-encoded byte string.
        _ => {
            let (bytes, rest) = read_string_lenenc(data)?;
            Ok((bytes_value(column_type, flags, bytes), rest))
        }
    }
}

/// String-ish cells become `Text` when they hold valid UTF-8 and the
/// column is not binary, `Bytes` otherwise.
fn bytes_value(column_type: ColumnType, flags: ColumnFlags, bytes: &[u8]) -> Value {
    let binary = flags.contains(ColumnFlags::BINARY_FLAG)
        || matches!(
            column_type,
            ColumnType::MYSQL_TYPE_TINY_BLOB
                | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                | ColumnType::MYSQL_TYPE_LONG_BLOB
                | ColumnType::MYSQL_TYPE_GEOMETRY
                | ColumnType::MYSQL_TYPE_BIT
        );

    if !binary {
        if let Ok(text) = simdutf8::basic::from_utf8(bytes) {
            return Value::Text(text.to_string());
        }
    }
    Value::Bytes(bytes.to_vec())
}

// ============================================================================
// Text protocol decoding
// ============================================================================

/// Convert a text-protocol cell to a typed value using the column type.
///
/// Cells that fail to parse as their announced type are kept verbatim as
/// `Text`/`Bytes` rather than failing the row.
pub fn from_text(column_type: ColumnType, flags: ColumnFlags, bytes: &[u8]) -> Value {
    let unsigned = flags.contains(ColumnFlags::UNSIGNED_FLAG);

    let text = match simdutf8::basic::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Value::Bytes(bytes.to_vec()),
    };

    match column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                match text.parse::<u64>() {
                    Ok(v) => Value::UInt(v),
                    Err(_) => Value::Text(text.to_string()),
                }
            } else {
                match text.parse::<i64>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => Value::Text(text.to_string()),
                }
            }
        }

        ColumnType::MYSQL_TYPE_FLOAT => match text.parse::<f32>() {
            Ok(v) => Value::Float(v),
            Err(_) => Value::Text(text.to_string()),
        },

        ColumnType::MYSQL_TYPE_DOUBLE => match text.parse::<f64>() {
            Ok(v) => Value::Double(v),
            Err(_) => Value::Text(text.to_string()),
        },

        ColumnType::MYSQL_TYPE_DATE
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP2
        | ColumnType::MYSQL_TYPE_NEWDATE => match parse_text_datetime(text) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(text.to_string()),
        },

        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
            match parse_text_time(text) {
                Some(t) => Value::Time(t),
                None => Value::Text(text.to_string()),
            }
        }

        _ => bytes_value(column_type, flags, bytes),
    }
}

/// `"2020-01-02"` or `"2020-01-02 03:04:05[.ffffff]"`.
fn parse_text_datetime(text: &str) -> Option<DateTime> {
    let (date, time) = match text.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let mut parts = date.split('-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let mut dt = DateTime {
        year,
        month,
        day,
        ..DateTime::default()
    };

    if let Some(time) = time {
        let (hms, micro) = split_fraction(time)?;
        let mut parts = hms.split(':');
        dt.hour = parts.next()?.parse().ok()?;
        dt.minute = parts.next()?.parse().ok()?;
        dt.second = parts.next()?.parse().ok()?;
        dt.micro = micro;
    }

    Some(dt)
}

/// `"[-]HHH:MM:SS[.ffffff]"`; hours may exceed 24.
fn parse_text_time(text: &str) -> Option<TimeValue> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (hms, micro) = split_fraction(text)?;
    let mut parts = hms.split(':');
    let total_hours: u32 = parts.next()?.parse().ok()?;
    let minutes = parts.next()?.parse().ok()?;
    let seconds = parts.next()?.parse().ok()?;

    Some(TimeValue {
        negative,
        days: total_hours / 24,
        hours: (total_hours % 24) as u8,
        minutes,
        seconds,
        micro,
    })
}

/// Split a trailing `.ffffff` fraction and scale it to microseconds.
fn split_fraction(text: &str) -> Option<(&str, u32)> {
    match text.split_once('.') {
        None => Some((text, 0)),
        Some((head, frac)) => {
            if frac.is_empty() || frac.len() > 6 {
                return None;
            }
            let digits: u32 = frac.parse().ok()?;
            let micro = digits * 10u32.pow(6 - frac.len() as u32);
            Some((head, micro))
        }
    }
}

// ============================================================================
// Binary protocol encoding (statement parameters)
// ============================================================================

impl Value {
    /// The `(type, flags)` pair written in the COM_STMT_EXECUTE type block.
    pub(crate) fn binary_type(&self) -> (ColumnType, u8) {
        match self {
            Value::Null => (ColumnType::MYSQL_TYPE_NULL, 0),
            Value::Int(_) => (ColumnType::MYSQL_TYPE_LONGLONG, 0),
            Value::UInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, 0x80),
            Value::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, 0),
            Value::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, 0),
            Value::Bytes(_) => (ColumnType::MYSQL_TYPE_LONG_BLOB, 0),
            Value::Text(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, 0),
            Value::DateTime(_) => (ColumnType::MYSQL_TYPE_DATETIME, 0),
            Value::Time(_) => (ColumnType::MYSQL_TYPE_TIME, 0),
        }
    }

    /// Append the binary-protocol encoding of this value.
    ///
    /// Servers older than 5.6.0 do not understand the microsecond forms,
    /// so fractional seconds are dropped for them.
    pub(crate) fn encode_binary(&self, out: &mut Vec<u8>, supports_micros: bool) {
        match self {
            Value::Null => {}
            Value::Int(v) => write_int_8(out, *v as u64),
            Value::UInt(v) => write_int_8(out, *v),
            Value::Float(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
            Value::Double(v) => write_int_8(out, v.to_bits()),
            Value::Bytes(b) => write_bytes_lenenc(out, b),
            Value::Text(s) => write_bytes_lenenc(out, s.as_bytes()),
            Value::DateTime(dt) => {
                let micro = if supports_micros { dt.micro } else { 0 };
                if micro != 0 {
                    write_int_1(out, 11);
                } else if dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
                    write_int_1(out, 7);
                } else {
                    write_int_1(out, 4);
                }
                write_int_2(out, dt.year);
                write_int_1(out, dt.month);
                write_int_1(out, dt.day);
                if micro != 0 || dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
                    write_int_1(out, dt.hour);
                    write_int_1(out, dt.minute);
                    write_int_1(out, dt.second);
                }
                if micro != 0 {
                    write_int_4(out, micro);
                }
            }
            Value::Time(t) => {
                let micro = if supports_micros { t.micro } else { 0 };
                if micro != 0 {
                    write_int_1(out, 12);
                } else {
                    write_int_1(out, 8);
                }
                write_int_1(out, t.negative as u8);
                write_int_4(out, t.days);
                write_int_1(out, t.hours);
                write_int_1(out, t.minutes);
                write_int_1(out, t.seconds);
                if micro != 0 {
                    write_int_4(out, micro);
                }
            }
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int(value as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64);

macro_rules! impl_from_uint {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::UInt(value as u64)
            }
        })*
    };
}

impl_from_uint!(u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
