/*!
# Runtime assembly

Turns a parsed [`Config`] into a running archive: the engine with its local
store, the optional FTP mirror worker and the HTTP poller which drives the
engine.
*/
use std::fs;

use log::{info, warn};

use crate::engine::{BufferView, Engine, Mirror};
use crate::store::LocalStore;

mod config;
#[cfg(feature = "ftp")]
mod mirror;
mod poll;

pub use config::{ArchiveConfig, BuildError, Config, MirrorConfig, SourceConfig};
#[cfg(feature = "ftp")]
pub use mirror::FtpMirror;
pub use poll::{decode, stamp_if_missing, FetchError, HttpPoller};

pub struct Runtime {
	view: BufferView,
	poller: HttpPoller,
}

impl Runtime {
	pub fn view(&self) -> BufferView {
		self.view.clone()
	}

	pub fn engine(&self) -> &Engine {
		self.poller.engine()
	}

	pub async fn run(self) {
		self.poller.run().await
	}
}

#[cfg(feature = "ftp")]
fn build_mirror(cfg: &MirrorConfig) -> Result<Box<dyn Mirror + Send + Sync + 'static>, BuildError> {
	let target = crate::ftp::Target{
		host: cfg.host.clone(),
		port: cfg.port,
		user: cfg.user.clone(),
		password: cfg.password.clone(),
		path: cfg.path.clone(),
		timeout: config::seconds("archive.mirror.timeout", cfg.timeout)?,
	};
	let deadline = config::seconds("archive.mirror.deadline", cfg.deadline)?;
	info!("mirroring checkpoints to ftp://{}:{}/{}", target.host, target.port, target.path);
	Ok(Box::new(FtpMirror::new(target, cfg.queue.max(1), deadline)))
}

#[cfg(not(feature = "ftp"))]
fn build_mirror(_cfg: &MirrorConfig) -> Result<Box<dyn Mirror + Send + Sync + 'static>, BuildError> {
	Err(BuildError::Unsupported("ftp mirroring"))
}

impl Config {
	pub fn check(&self) -> Option<BuildError> {
		if let Err(e) = self.archive.schema() {
			return Some(e);
		}
		if let Err(e) = self.archive.cadence() {
			return Some(e);
		}
		if let Err(e) = config::seconds("source.interval", self.source.interval) {
			return Some(e);
		}
		if let Err(e) = config::seconds("source.timeout", self.source.timeout) {
			return Some(e);
		}
		if let Some(ref mirror) = self.archive.mirror {
			if let Err(e) = config::seconds("archive.mirror.timeout", mirror.timeout) {
				return Some(e);
			}
			if let Err(e) = config::seconds("archive.mirror.deadline", mirror.deadline) {
				return Some(e);
			}
			if mirror.deadline <= mirror.timeout {
				return Some(BuildError::MirrorDeadline{
					timeout: mirror.timeout,
					deadline: mirror.deadline,
				});
			}
		}
		None
	}

	/// Must be called from within a tokio runtime if a mirror is configured.
	pub fn build(&self) -> Result<Runtime, BuildError> {
		match self.check() {
			Some(e) => return Err(e),
			None => (),
		}

		let schema = self.archive.schema()?;
		if schema.is_none() {
			warn!("no archive columns configured, snapshots will not be archived");
		}
		let cadence = self.archive.cadence()?;

		let path = &self.archive.path;
		match fs::create_dir_all(path) {
			Ok(()) => (),
			Err(error) => return Err(BuildError::Storage{path: path.clone(), error}),
		};

		let mut engine = Engine::new(schema, cadence, LocalStore::new(path.clone()));
		if let Some(ref mirror) = self.archive.mirror {
			engine = engine.with_mirror(build_mirror(mirror)?);
		}
		let view = engine.view();

		let poller = match HttpPoller::new(
			self.source.url.clone(),
			config::seconds("source.interval", self.source.interval)?,
			config::seconds("source.timeout", self.source.timeout)?,
			engine,
		) {
			Ok(v) => v,
			Err(e) => return Err(BuildError::Other(Box::new(e))),
		};

		info!(
			"archiving snapshots from {} to {:?} every {} minutes, checkpoints every {} hours",
			self.source.url, path, cadence.commit_minutes(), cadence.checkpoint_hours(),
		);
		Ok(Runtime{
			view,
			poller,
		})
	}
}
