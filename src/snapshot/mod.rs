/*!
# Flat telemetry snapshots

A snapshot is what one polling cycle produces: a flat mapping of reading
names to scalar values. One of the keys carries the local wall clock time of
the cycle as `YYYY-MM-DD HH:MM:SS`; the archive engine buckets snapshots by
that field.

Cells are rendered with `Display`: a null reading becomes an empty cell, the
same as a missing one, and floats use Rust's shortest form, so `5.0` is
written as `5`. Day files written by other tools may spell these `None` and
`5.0`. Such files still restore, since only the header is compared, but rows
appended here will look different from the older ones.
*/
use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use smartstring::alias::String as SmartString;

use serde_derive::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
	Null,
	Bool(bool),
	Integer(i64),
	Float(f64),
	Text(SmartString),
}

impl fmt::Display for Value {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			// a reading the device could not deliver is an empty cell
			Self::Null => Ok(()),
			Self::Bool(v) => write!(f, "{}", v),
			Self::Integer(v) => write!(f, "{}", v),
			Self::Float(v) => write!(f, "{}", v),
			Self::Text(v) => f.write_str(v),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Integer(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Integer(v.into())
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Text(v.into())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::Text(v.into())
	}
}

#[derive(Debug)]
pub enum ParseError {
	MissingField(SmartString),
	NotText{field: SmartString, value: Value},
	Malformed{value: String, error: chrono::ParseError},
}

impl fmt::Display for ParseError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::MissingField(field) => write!(f, "timestamp field {:?} missing", field),
			Self::NotText{field, value} => write!(f, "timestamp field {:?} is not text: {:?}", field, value),
			Self::Malformed{value, error} => write!(f, "malformed timestamp {:?}: {}", value, error),
		}
	}
}

impl std::error::Error for ParseError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Malformed{error, ..} => Some(error),
			_ => None,
		}
	}
}

/// The parts of a snapshot timestamp which drive bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
	pub date: NaiveDate,
	pub hour: u32,
	pub minute: u32,
}

impl Stamp {
	pub fn parse(s: &str) -> Result<Self, ParseError> {
		match NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
			Ok(ts) => Ok(ts.into()),
			Err(error) => Err(ParseError::Malformed{value: s.into(), error}),
		}
	}
}

impl From<NaiveDateTime> for Stamp {
	fn from(ts: NaiveDateTime) -> Self {
		Self{
			date: ts.date(),
			hour: ts.hour(),
			minute: ts.minute(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
	fields: HashMap<SmartString, Value>,
}

impl Snapshot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert<K: Into<SmartString>, V: Into<Value>>(&mut self, k: K, v: V) -> Option<Value> {
		self.fields.insert(k.into(), v.into())
	}

	/// Builder-style insert, mostly useful to assemble snapshots inline.
	pub fn with<K: Into<SmartString>, V: Into<Value>>(mut self, k: K, v: V) -> Self {
		self.insert(k, v);
		self
	}

	pub fn get(&self, k: &str) -> Option<&Value> {
		self.fields.get(k)
	}

	pub fn contains_key(&self, k: &str) -> bool {
		self.fields.contains_key(k)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Render the value of `column` as a table cell. Absent keys give an
	/// empty cell.
	pub fn cell(&self, column: &str) -> String {
		match self.fields.get(column) {
			Some(v) => v.to_string(),
			None => String::new(),
		}
	}

	pub fn stamp(&self, column: &str) -> Result<Stamp, ParseError> {
		match self.fields.get(column) {
			Some(Value::Text(s)) => Stamp::parse(s),
			Some(other) => Err(ParseError::NotText{
				field: column.into(),
				value: other.clone(),
			}),
			None => Err(ParseError::MissingField(column.into())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_stamp_parse() {
		let stamp = Stamp::parse("2022-01-17 13:45:09").unwrap();
		assert_eq!(stamp.date, NaiveDate::from_ymd_opt(2022, 1, 17).unwrap());
		assert_eq!(stamp.hour, 13);
		assert_eq!(stamp.minute, 45);
	}

	#[test]
	fn test_stamp_parse_rejects_garbage() {
		match Stamp::parse("2022-01-17T13:45") {
			Err(ParseError::Malformed{value, ..}) => assert_eq!(value, "2022-01-17T13:45"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_stamp_parse_rejects_out_of_range_hour() {
		assert!(Stamp::parse("2022-01-17 24:00:00").is_err());
	}

	#[test]
	fn test_snapshot_stamp_missing_field() {
		let s = Snapshot::new().with("p", 5);
		match s.stamp("time") {
			Err(ParseError::MissingField(f)) => assert_eq!(f, "time"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_snapshot_stamp_non_text_field() {
		let s = Snapshot::new().with("time", 1642427109i64);
		assert!(matches!(s.stamp("time"), Err(ParseError::NotText{..})));
	}

	#[test]
	fn test_cell_rendering() {
		let s = Snapshot::new()
			.with("time", "2022-01-17 13:45:09")
			.with("p", -2284)
			.with("soc", 0.5)
			.with("stop", false)
			.with("water", Value::Null);
		assert_eq!(s.cell("time"), "2022-01-17 13:45:09");
		assert_eq!(s.cell("p"), "-2284");
		assert_eq!(s.cell("soc"), "0.5");
		assert_eq!(s.cell("stop"), "false");
		assert_eq!(s.cell("water"), "");
	}

	#[test]
	fn test_cell_of_absent_key_is_empty() {
		let s = Snapshot::new().with("p", 1);
		assert_eq!(s.cell("car_eto"), "");
	}

	#[test]
	fn test_insert_returns_old_value() {
		let mut s = Snapshot::new();
		assert!(s.insert("p", 1).is_none());
		assert_eq!(s.insert("p", 2), Some(Value::Integer(1)));
		assert_eq!(s.len(), 1);
	}
}
