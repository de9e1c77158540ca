use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use log::trace;

use crate::buffer::{Buffer, Mismatch, Schema, DELIMITER};

use super::archive::{RestoreError, SaveError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn year_name(date: NaiveDate) -> String {
	format!("{:04}", date.year())
}

pub fn file_name(date: NaiveDate) -> String {
	format!("{}.csv", date.format(DATE_FORMAT))
}

fn write_replace(staging: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
	let mut f = fs::File::create(staging)?;
	f.write_all(data)?;
	f.sync_all()?;
	drop(f);
	// readers only ever see the old or the new complete file
	fs::rename(staging, path)
}

#[derive(Debug)]
pub struct Saved {
	/// `None` only if the buffer could not be encoded.
	pub content: Option<Arc<str>>,
	pub result: Result<PathBuf, SaveError>,
}

/// Day files below a base directory, laid out as `<base>/<YYYY>/<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct LocalStore {
	root: PathBuf,
}

impl LocalStore {
	pub fn new<P: Into<PathBuf>>(root: P) -> Self {
		Self{
			root: root.into(),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn day_path(&self, date: NaiveDate) -> PathBuf {
		self.root.join(year_name(date)).join(file_name(date))
	}

	/// Encode `buffer` once and replace its day file with the result.
	///
	/// The encoded content is handed back even if writing failed, so it can
	/// still be passed on to a mirror.
	pub fn save(&self, buffer: &Buffer) -> Saved {
		let content: Arc<str> = match buffer.encode() {
			Ok(v) => v.into(),
			Err(e) => return Saved{
				content: None,
				result: Err(e.into()),
			},
		};
		let result = self.write_day(buffer.date(), &content);
		Saved{
			content: Some(content),
			result,
		}
	}

	/// Replace the day file for `date` with `content`, creating the year
	/// directory on demand.
	pub fn write_day(&self, date: NaiveDate, content: &str) -> Result<PathBuf, SaveError> {
		let dir = self.root.join(year_name(date));
		match fs::create_dir_all(&dir) {
			Ok(()) => (),
			Err(error) => return Err(SaveError::CreateDir{path: dir, error}),
		};
		let name = file_name(date);
		let path = dir.join(&name);
		let staging = dir.join(format!(".{}.tmp", name));
		trace!("writing {} bytes to {:?}", content.len(), path);
		match write_replace(&staging, &path, content.as_bytes()) {
			Ok(()) => Ok(path),
			Err(error) => {
				let _ = fs::remove_file(&staging);
				Err(SaveError::Write{path, error})
			},
		}
	}

	pub fn read_day(&self, date: NaiveDate) -> Result<String, RestoreError> {
		Ok(fs::read_to_string(self.day_path(date))?)
	}

	/// Load the day file for `date` if its header matches `schema` exactly.
	pub fn restore(&self, date: NaiveDate, schema: &Schema) -> Result<Buffer, RestoreError> {
		let content = self.read_day(date)?;
		let mut reader = csv::ReaderBuilder::new()
			.delimiter(DELIMITER)
			.has_headers(false)
			.flexible(true)
			.from_reader(content.as_bytes());
		let mut records = reader.records();

		match records.next() {
			Some(header) => {
				let header = header?;
				if let Err(m) = schema.compare(header.iter()) {
					return Err(RestoreError::SchemaMismatch(m));
				}
			},
			None => return Err(RestoreError::SchemaMismatch(Mismatch{
				position: 0,
				found: None,
				expected: schema.columns().first().cloned(),
			})),
		};

		let mut rows = Vec::new();
		for record in records {
			let record = record?;
			if record.len() != schema.len() {
				return Err(RestoreError::Malformed{
					line: record.position().map(|p| p.line()).unwrap_or(0),
					width: record.len(),
					expected: schema.len(),
				});
			}
			rows.push(record.iter().map(String::from).collect());
		}
		Ok(Buffer::with_rows(date, schema, rows))
	}
}
