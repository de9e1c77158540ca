use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::buffer::{Schema, SchemaError};
use crate::engine::{self, CadenceError};

fn default_timestamp_column() -> String {
	"time".into()
}

fn default_columns() -> Vec<String> {
	Vec::new()
}

fn default_commit_interval() -> u32 {
	engine::DEFAULT_COMMIT_INTERVAL
}

fn default_checkpoint_interval() -> u32 {
	engine::DEFAULT_CHECKPOINT_INTERVAL
}

fn default_mirror_port() -> u16 {
	21
}

fn default_mirror_timeout() -> f64 {
	30.
}

fn default_mirror_deadline() -> f64 {
	120.
}

fn default_mirror_queue() -> usize {
	4
}

fn default_poll_interval() -> f64 {
	1.
}

fn default_request_timeout() -> f64 {
	5.
}

#[derive(Debug)]
pub enum BuildError {
	Schema(SchemaError),
	Cadence(CadenceError),
	Storage{path: PathBuf, error: io::Error},
	InvalidDuration{which: &'static str, value: f64},
	MirrorDeadline{timeout: f64, deadline: f64},
	Unsupported(&'static str),
	Other(Box<dyn Error>),
}

impl fmt::Display for BuildError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Schema(e) => write!(f, "invalid archive columns: {}", e),
			Self::Cadence(e) => write!(f, "invalid archive cadence: {}", e),
			Self::Storage{path, error} => write!(f, "unusable archive path {:?}: {}", path, error),
			Self::InvalidDuration{which, value} => write!(f, "{} must be a positive number of seconds, not {}", which, value),
			Self::MirrorDeadline{timeout, deadline} => write!(f, "mirror deadline of {} seconds must exceed the socket timeout of {} seconds", deadline, timeout),
			Self::Unsupported(feature) => write!(f, "built without support for {}", feature),
			Self::Other(e) => write!(f, "{}", e),
		}
	}
}

impl Error for BuildError {}

impl From<SchemaError> for BuildError {
	fn from(e: SchemaError) -> Self {
		Self::Schema(e)
	}
}

impl From<CadenceError> for BuildError {
	fn from(e: CadenceError) -> Self {
		Self::Cadence(e)
	}
}

pub(super) fn seconds(which: &'static str, value: f64) -> Result<Duration, BuildError> {
	if value.is_finite() && value > 0. {
		Ok(Duration::from_secs_f64(value))
	} else {
		Err(BuildError::InvalidDuration{which, value})
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
	pub host: String,
	#[serde(default = "default_mirror_port")]
	pub port: u16,
	pub user: String,
	pub password: String,
	#[serde(default)]
	pub path: String,
	/// Per socket operation, in seconds.
	#[serde(default = "default_mirror_timeout")]
	pub timeout: f64,
	/// For a whole upload, in seconds.
	#[serde(default = "default_mirror_deadline")]
	pub deadline: f64,
	#[serde(default = "default_mirror_queue")]
	pub queue: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
	pub path: PathBuf,
	#[serde(default = "default_timestamp_column")]
	pub timestamp_column: String,
	/// An empty list leaves the archive disabled.
	#[serde(default = "default_columns")]
	pub columns: Vec<String>,
	#[serde(default = "default_commit_interval")]
	pub commit_interval: u32,
	#[serde(default = "default_checkpoint_interval")]
	pub checkpoint_interval: u32,
	pub mirror: Option<MirrorConfig>,
}

impl ArchiveConfig {
	pub fn schema(&self) -> Result<Option<Schema>, BuildError> {
		if self.columns.is_empty() {
			return Ok(None);
		}
		Ok(Some(Schema::new(self.columns.clone(), &self.timestamp_column)?))
	}

	pub fn cadence(&self) -> Result<engine::Cadence, BuildError> {
		Ok(engine::Cadence::new(self.commit_interval, self.checkpoint_interval)?)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
	pub url: String,
	#[serde(default = "default_poll_interval")]
	pub interval: f64,
	#[serde(default = "default_request_timeout")]
	pub timeout: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub archive: ArchiveConfig,
	pub source: SourceConfig,
}
