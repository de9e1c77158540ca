use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::buffer::Mismatch;

#[derive(Debug)]
pub enum SaveError {
	Encode(csv::Error),
	CreateDir{path: PathBuf, error: io::Error},
	Write{path: PathBuf, error: io::Error},
}

impl fmt::Display for SaveError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Encode(e) => write!(f, "failed to encode day table: {}", e),
			Self::CreateDir{path, error} => write!(f, "failed to create {:?}: {}", path, error),
			Self::Write{path, error} => write!(f, "failed to write {:?}: {}", path, error),
		}
	}
}

impl std::error::Error for SaveError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Encode(e) => Some(e),
			Self::CreateDir{error, ..} => Some(error),
			Self::Write{error, ..} => Some(error),
		}
	}
}

impl From<csv::Error> for SaveError {
	fn from(e: csv::Error) -> Self {
		Self::Encode(e)
	}
}

#[derive(Debug)]
pub enum RestoreError {
	/// No day file for the date; the expected case on a fresh day.
	NotFound,
	SchemaMismatch(Mismatch),
	/// A data line whose width disagrees with the header.
	Malformed{line: u64, width: usize, expected: usize},
	IO(io::Error),
	Csv(csv::Error),
}

impl fmt::Display for RestoreError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NotFound => f.write_str("no day file"),
			Self::SchemaMismatch(m) => write!(f, "schema mismatch: {}", m),
			Self::Malformed{line, width, expected} => write!(
				f, "line {} has {} cells, expected {}", line, width, expected,
			),
			Self::IO(e) => write!(f, "i/o error: {}", e),
			Self::Csv(e) => write!(f, "csv error: {}", e),
		}
	}
}

impl std::error::Error for RestoreError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::IO(e) => Some(e),
			Self::Csv(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for RestoreError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::NotFound => Self::NotFound,
			_ => Self::IO(e),
		}
	}
}

impl From<csv::Error> for RestoreError {
	fn from(e: csv::Error) -> Self {
		Self::Csv(e)
	}
}
