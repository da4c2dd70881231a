//! Scalar value handling on top of [`sea_query::Value`].
//!
//! The persistence engine snapshots, diffs, and binds entity attributes as
//! `sea_query::Value`s. This module adds the comparison semantics the
//! change detector needs (datetimes compared by instant, integers by
//! numeric value) and the canonical key form primary keys are indexed by.

use chrono::{NaiveDateTime, Utc};
pub use sea_query::Value;

/// Returns `true` when the value is a typed NULL.
pub fn is_null(value: &Value) -> bool {
	*value == value.as_null()
}

/// Attribute equality as the change detector defines it.
///
/// Plain values compare by `==`; datetime-like values compare by their
/// epoch instant regardless of representation; integer variants compare by
/// numeric value so an `Int(5)` snapshot matches a `BigInt(5)` assignment.
pub fn values_equal(a: &Value, b: &Value) -> bool {
	if a == b {
		return true;
	}
	if is_null(a) && is_null(b) {
		return true;
	}
	if let (Some(x), Some(y)) = (datetime_epoch_micros(a), datetime_epoch_micros(b)) {
		return x == y;
	}
	if let (Some(x), Some(y)) = (to_i128(a), to_i128(b)) {
		return x == y;
	}
	false
}

/// Epoch microseconds for datetime-like values; naive datetimes are read
/// as UTC.
pub fn datetime_epoch_micros(value: &Value) -> Option<i64> {
	match value {
		Value::ChronoDate(Some(d)) => d
			.and_hms_opt(0, 0, 0)
			.map(|dt: NaiveDateTime| dt.and_utc().timestamp_micros()),
		Value::ChronoDateTime(Some(dt)) => Some(dt.and_utc().timestamp_micros()),
		Value::ChronoDateTimeUtc(Some(dt)) => Some(dt.timestamp_micros()),
		Value::ChronoDateTimeLocal(Some(dt)) => Some(dt.with_timezone(&Utc).timestamp_micros()),
		Value::ChronoDateTimeWithTimeZone(Some(dt)) => {
			Some(dt.with_timezone(&Utc).timestamp_micros())
		}
		_ => None,
	}
}

/// Signed integral reading of any integer variant.
pub fn to_i128(value: &Value) -> Option<i128> {
	match value {
		Value::TinyInt(Some(v)) => Some(i128::from(*v)),
		Value::SmallInt(Some(v)) => Some(i128::from(*v)),
		Value::Int(Some(v)) => Some(i128::from(*v)),
		Value::BigInt(Some(v)) => Some(i128::from(*v)),
		Value::TinyUnsigned(Some(v)) => Some(i128::from(*v)),
		Value::SmallUnsigned(Some(v)) => Some(i128::from(*v)),
		Value::Unsigned(Some(v)) => Some(i128::from(*v)),
		Value::BigUnsigned(Some(v)) => Some(i128::from(*v)),
		Value::Bool(Some(v)) => Some(i128::from(*v)),
		_ => None,
	}
}

pub fn to_i64(value: &Value) -> Option<i64> {
	to_i128(value).and_then(|v| i64::try_from(v).ok())
}

pub fn to_u64(value: &Value) -> Option<u64> {
	to_i128(value).and_then(|v| u64::try_from(v).ok())
}

/// String reading for text-like values (used by the schema reader and by
/// entity adapters).
pub fn to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(Some(s)) => Some(s.as_ref().clone()),
		Value::Char(Some(c)) => Some(c.to_string()),
		_ => None,
	}
}

pub fn to_bool(value: &Value) -> Option<bool> {
	match value {
		Value::Bool(Some(b)) => Some(*b),
		other => to_i128(other).map(|v| v != 0),
	}
}

/// Canonical string form primary keys are indexed by in the identity map.
///
/// Returns `None` for NULL (an unassigned key can never be an identity).
pub fn key_string(value: &Value) -> Option<String> {
	if is_null(value) {
		return None;
	}
	if let Some(v) = to_i128(value) {
		return Some(v.to_string());
	}
	if let Some(s) = to_string(value) {
		return Some(s);
	}
	Some(format!("{value:?}"))
}

/// UTC now as a bindable DATETIME value.
pub fn utc_now() -> Value {
	Value::ChronoDateTimeUtc(Some(Box::new(Utc::now())))
}

/// UTC reading of datetime-like values.
pub fn to_datetime_utc(value: &Value) -> Option<chrono::DateTime<Utc>> {
	datetime_epoch_micros(value).and_then(chrono::DateTime::<Utc>::from_timestamp_micros)
}

/// Rebuild a bindable value from a canonical key string (integers become
/// BIGINT, everything else binds as text).
pub fn from_key_string(key: &str) -> Value {
	match key.parse::<i64>() {
		Ok(v) => Value::BigInt(Some(v)),
		Err(_) => Value::from(key),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{NaiveDate, TimeZone};

	#[test]
	fn test_integer_variants_compare_by_numeric_value() {
		assert!(values_equal(&Value::Int(Some(5)), &Value::BigInt(Some(5))));
		assert!(!values_equal(&Value::Int(Some(5)), &Value::BigInt(Some(6))));
	}

	#[test]
	fn test_datetimes_compare_by_instant() {
		let naive = NaiveDate::from_ymd_opt(2025, 5, 1)
			.unwrap()
			.and_hms_opt(10, 24, 0)
			.unwrap();
		let utc = Utc.from_utc_datetime(&naive);
		let a = Value::ChronoDateTime(Some(Box::new(naive)));
		let b = Value::ChronoDateTimeUtc(Some(Box::new(utc)));
		assert!(values_equal(&a, &b));
	}

	#[test]
	fn test_nulls_are_equal_across_types() {
		assert!(values_equal(&Value::Int(None), &Value::String(None)));
	}

	#[test]
	fn test_key_string_for_common_primary_keys() {
		assert_eq!(key_string(&Value::BigUnsigned(Some(42))), Some("42".into()));
		assert_eq!(
			key_string(&Value::String(Some(Box::new("abc".into())))),
			Some("abc".into())
		);
		assert_eq!(key_string(&Value::Int(None)), None);
	}
}
