/*!
# Day buffer

The in-memory table of one calendar day: a header (the schema at the time the
buffer was created) and one row per committed interval. The table is written
out as semicolon separated values, header line first, one newline terminated
line per row.
*/
use std::fmt;
use std::io;

use chrono::NaiveDate;

use crate::snapshot::Snapshot;

pub const DELIMITER: u8 = b';';

pub type Row = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
	Empty,
	MissingTimestamp(String),
}

impl fmt::Display for SchemaError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Empty => f.write_str("schema has no columns"),
			Self::MissingTimestamp(column) => write!(f, "schema lacks the timestamp column {:?}", column),
		}
	}
}

impl std::error::Error for SchemaError {}

/// First position at which a persisted header disagrees with the schema.
///
/// `found` or `expected` is `None` where one side ran out of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
	pub position: usize,
	pub found: Option<String>,
	pub expected: Option<String>,
}

impl fmt::Display for Mismatch {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"header mismatch at column {}: file has {:?}, schema has {:?}",
			self.position, self.found, self.expected,
		)
	}
}

/// Ordered column names of the archive table, fixed for the lifetime of an
/// engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
	columns: Vec<String>,
	timestamp_index: usize,
}

impl Schema {
	pub fn new(columns: Vec<String>, timestamp_column: &str) -> Result<Self, SchemaError> {
		if columns.is_empty() {
			return Err(SchemaError::Empty);
		}
		let timestamp_index = match columns.iter().position(|c| c == timestamp_column) {
			Some(i) => i,
			None => return Err(SchemaError::MissingTimestamp(timestamp_column.into())),
		};
		Ok(Self{
			columns,
			timestamp_index,
		})
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn len(&self) -> usize {
		self.columns.len()
	}

	pub fn timestamp_column(&self) -> &str {
		&self.columns[self.timestamp_index]
	}

	/// Map schema positions to snapshot values.
	pub fn row(&self, snapshot: &Snapshot) -> Row {
		self.columns.iter().map(|c| snapshot.cell(c)).collect()
	}

	/// Compare a persisted header positionally; lengths must agree too.
	pub fn compare<'x, I: IntoIterator<Item = &'x str>>(&self, header: I) -> Result<(), Mismatch> {
		let mut header = header.into_iter();
		for (position, expected) in self.columns.iter().enumerate() {
			match header.next() {
				Some(found) if found == expected => (),
				found => return Err(Mismatch{
					position,
					found: found.map(|v| v.into()),
					expected: Some(expected.clone()),
				}),
			}
		}
		match header.next() {
			None => Ok(()),
			Some(extra) => Err(Mismatch{
				position: self.columns.len(),
				found: Some(extra.into()),
				expected: None,
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
	date: NaiveDate,
	header: Vec<String>,
	rows: Vec<Row>,
}

impl Buffer {
	pub fn new(date: NaiveDate, schema: &Schema) -> Self {
		Self::with_rows(date, schema, Vec::new())
	}

	/// Callers must have checked every row against the schema length.
	pub(crate) fn with_rows(date: NaiveDate, schema: &Schema, rows: Vec<Row>) -> Self {
		Self{
			date,
			header: schema.columns().to_vec(),
			rows,
		}
	}

	pub fn date(&self) -> NaiveDate {
		self.date
	}

	pub fn header(&self) -> &[String] {
		&self.header
	}

	pub fn rows(&self) -> &[Row] {
		&self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn push(&mut self, row: Row) {
		debug_assert_eq!(row.len(), self.header.len());
		self.rows.push(row);
	}

	pub fn write_to<W: io::Write>(&self, w: W) -> csv::Result<()> {
		let mut writer = csv::WriterBuilder::new()
			.delimiter(DELIMITER)
			.terminator(csv::Terminator::Any(b'\n'))
			.from_writer(w);
		writer.write_record(&self.header)?;
		for row in self.rows.iter() {
			writer.write_record(row)?;
		}
		writer.flush()?;
		Ok(())
	}

	/// Serialize the complete table, header included.
	pub fn encode(&self) -> csv::Result<String> {
		let mut out = Vec::new();
		self.write_to(&mut out)?;
		// every cell went in as a String, so this never has to replace anything
		Ok(String::from_utf8_lossy(&out).into_owned())
	}
}
