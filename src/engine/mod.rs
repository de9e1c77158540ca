/*!
# Bucketing engine

The engine turns a stream of snapshots into one archived row per commit
interval and persists the day table at checkpoints.

Boundaries are edge triggered: a commit happens when the minute of a snapshot
differs from the minute of the previous snapshot and is a multiple of the
commit interval. A caller polling less often than that can step over a
boundary; such a boundary is lost, nothing is backfilled. The same holds for
checkpoints, which fire on a commit whose hour differs from the previous
snapshot's hour and is a multiple of the checkpoint interval.

The buffer is either absent or holds exactly one day. On the first commit
after start the engine tries to resume that day from its day file. A commit
for a different day checkpoints the old day (rollover) and starts over.

Failures never leave the engine: a failed save keeps the buffer in memory
and the next scheduled checkpoint writes the then complete table again.
*/
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use log::{debug, error, info, trace, warn};

use tokio::sync::watch;

use crate::buffer::{Buffer, Schema};
use crate::snapshot::{ParseError, Snapshot, Stamp};
use crate::store::{LocalStore, RestoreError};

mod traits;

pub use traits::{Mirror, Upload};

pub const DEFAULT_COMMIT_INTERVAL: u32 = 5;
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceError {
	CommitInterval(u32),
	CheckpointInterval(u32),
}

impl fmt::Display for CadenceError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::CommitInterval(v) => write!(f, "commit interval of {} minutes does not divide 60", v),
			Self::CheckpointInterval(v) => write!(f, "checkpoint interval of {} hours does not divide 24", v),
		}
	}
}

impl std::error::Error for CadenceError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
	commit_minutes: u32,
	checkpoint_hours: u32,
}

impl Cadence {
	pub fn new(commit_minutes: u32, checkpoint_hours: u32) -> Result<Self, CadenceError> {
		if commit_minutes == 0 || 60 % commit_minutes != 0 {
			return Err(CadenceError::CommitInterval(commit_minutes));
		}
		if checkpoint_hours == 0 || 24 % checkpoint_hours != 0 {
			return Err(CadenceError::CheckpointInterval(checkpoint_hours));
		}
		Ok(Self{
			commit_minutes,
			checkpoint_hours,
		})
	}

	pub fn commit_minutes(&self) -> u32 {
		self.commit_minutes
	}

	pub fn checkpoint_hours(&self) -> u32 {
		self.checkpoint_hours
	}
}

impl Default for Cadence {
	fn default() -> Self {
		Self{
			commit_minutes: DEFAULT_COMMIT_INTERVAL,
			checkpoint_hours: DEFAULT_CHECKPOINT_INTERVAL,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
	Periodic,
	Rollover,
}

impl fmt::Display for CheckpointKind {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Periodic => f.write_str("periodic"),
			Self::Rollover => f.write_str("rollover"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
	pub kind: CheckpointKind,
	/// Day of the checkpointed buffer, which differs from the commit's day
	/// on rollover.
	pub date: NaiveDate,
	pub saved: bool,
	pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
	pub date: NaiveDate,
	/// Rows in the buffer after the commit.
	pub rows: usize,
	pub restored: bool,
	pub checkpoint: Option<Checkpoint>,
}

#[derive(Debug)]
pub enum PushOutcome {
	/// No schema configured.
	Disabled,
	Rejected(ParseError),
	/// Not on a commit boundary.
	Idle,
	Committed(Commit),
}

/// Read-only handle on the serialized buffer.
///
/// The engine publishes a complete copy after every change, so a reader sees
/// either the table before or after a commit. Without an active buffer the
/// content is empty.
#[derive(Clone)]
pub struct BufferView {
	content: watch::Receiver<Arc<str>>,
}

impl BufferView {
	pub fn content(&self) -> Arc<str> {
		self.content.borrow().clone()
	}
}

pub struct Engine {
	schema: Option<Arc<Schema>>,
	cadence: Cadence,
	store: LocalStore,
	mirror: Option<Box<dyn Mirror + Send + Sync + 'static>>,
	buffer: Option<Buffer>,
	last_hour: Option<u32>,
	last_minute: Option<u32>,
	published: watch::Sender<Arc<str>>,
	view: watch::Receiver<Arc<str>>,
}

impl Engine {
	pub fn new(schema: Option<Schema>, cadence: Cadence, store: LocalStore) -> Self {
		let (published, view) = watch::channel(Arc::from(""));
		Self{
			schema: schema.map(Arc::new),
			cadence,
			store,
			mirror: None,
			buffer: None,
			last_hour: None,
			last_minute: None,
			published,
			view,
		}
	}

	pub fn with_mirror(mut self, mirror: Box<dyn Mirror + Send + Sync + 'static>) -> Self {
		self.mirror = Some(mirror);
		self
	}

	pub fn schema(&self) -> Option<&Schema> {
		self.schema.as_deref()
	}

	pub fn cadence(&self) -> Cadence {
		self.cadence
	}

	pub fn store(&self) -> &LocalStore {
		&self.store
	}

	pub fn buffer(&self) -> Option<&Buffer> {
		self.buffer.as_ref()
	}

	pub fn view(&self) -> BufferView {
		BufferView{
			content: self.view.clone(),
		}
	}

	pub fn push(&mut self, snapshot: &Snapshot) -> PushOutcome {
		let schema = match self.schema {
			Some(ref schema) => schema.clone(),
			None => {
				trace!("no schema configured, ignoring snapshot");
				return PushOutcome::Disabled;
			},
		};
		let stamp = match snapshot.stamp(schema.timestamp_column()) {
			Ok(v) => v,
			Err(e) => {
				warn!("dropping snapshot: {}", e);
				return PushOutcome::Rejected(e);
			},
		};

		let outcome = if self.is_commit(&stamp) {
			PushOutcome::Committed(self.commit(&schema, &stamp, snapshot))
		} else {
			PushOutcome::Idle
		};
		self.last_hour = Some(stamp.hour);
		self.last_minute = Some(stamp.minute);
		outcome
	}

	fn is_commit(&self, stamp: &Stamp) -> bool {
		match self.last_minute {
			Some(last) => stamp.minute != last && stamp.minute % self.cadence.commit_minutes == 0,
			None => false,
		}
	}

	fn is_periodic_checkpoint(&self, stamp: &Stamp) -> bool {
		self.last_hour != Some(stamp.hour) && stamp.hour % self.cadence.checkpoint_hours == 0
	}

	fn commit(&mut self, schema: &Schema, stamp: &Stamp, snapshot: &Snapshot) -> Commit {
		let mut restored = false;
		if self.buffer.is_none() {
			self.buffer = self.restore(schema, stamp.date);
			restored = self.buffer.is_some();
		}

		let kind = match self.buffer {
			Some(ref buffer) if buffer.date() != stamp.date => Some(CheckpointKind::Rollover),
			Some(_) if self.is_periodic_checkpoint(stamp) => Some(CheckpointKind::Periodic),
			_ => None,
		};
		let checkpoint = match (kind, self.buffer.as_ref()) {
			(Some(kind), Some(buffer)) => Some(self.checkpoint(buffer, kind)),
			_ => None,
		};
		if kind == Some(CheckpointKind::Rollover) {
			self.buffer = None;
		}

		let buffer = self.buffer.get_or_insert_with(|| Buffer::new(stamp.date, schema));
		buffer.push(schema.row(snapshot));
		let rows = buffer.len();
		debug!("committed row {} of {}", rows, stamp.date);
		self.publish();

		Commit{
			date: stamp.date,
			rows,
			restored,
			checkpoint,
		}
	}

	fn restore(&self, schema: &Schema, date: NaiveDate) -> Option<Buffer> {
		match self.store.restore(date, schema) {
			Ok(buffer) => {
				info!("restored {} rows of {} from {:?}", buffer.len(), date, self.store.day_path(date));
				Some(buffer)
			},
			Err(RestoreError::NotFound) => {
				debug!("no day file for {}, starting a fresh buffer", date);
				None
			},
			Err(RestoreError::SchemaMismatch(m)) => {
				warn!("not restoring {}: {}", date, m);
				None
			},
			Err(e) => {
				error!("failed to restore {}: {}", date, e);
				None
			},
		}
	}

	fn checkpoint(&self, buffer: &Buffer, kind: CheckpointKind) -> Checkpoint {
		let date = buffer.date();
		let saved = self.store.save(buffer);
		let stored = match saved.result {
			Ok(path) => {
				info!("{} checkpoint of {} ({} rows) saved to {:?}", kind, date, buffer.len(), path);
				true
			},
			Err(e) => {
				error!("{} checkpoint of {} not saved, keeping it for the next checkpoint: {}", kind, date, e);
				false
			},
		};

		let mirrored = match (self.mirror.as_ref(), saved.content) {
			(Some(mirror), Some(content)) => {
				mirror.dispatch(Upload::new(date, content));
				true
			},
			_ => false,
		};

		Checkpoint{kind, date, saved: stored, mirrored}
	}

	fn publish(&self) {
		let content: Arc<str> = match self.buffer {
			Some(ref buffer) => match buffer.encode() {
				Ok(v) => v.into(),
				Err(e) => {
					warn!("not publishing buffer: {}", e);
					return;
				},
			},
			None => Arc::from(""),
		};
		self.published.send_replace(content);
	}
}
