use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::engine::{Mirror, Upload};
use crate::ftp;

type Transfer = Arc<dyn Fn(&Upload) -> Result<(), ftp::Error> + Send + Sync + 'static>;

struct FtpMirrorWorker {
	host: String,
	transfer: Transfer,
	deadline: Duration,
	uploads: mpsc::Receiver<Upload>,
	/// A transfer which outlived its deadline and still holds the server.
	overdue: Option<JoinHandle<Result<(), ftp::Error>>>,
}

impl FtpMirrorWorker {
	/// Wait for an overdue transfer, so that no two uploads ever run at the
	/// same time and an older day file cannot overwrite a newer one.
	async fn settle(&mut self) {
		let job = match self.overdue.take() {
			Some(v) => v,
			None => return,
		};
		match job.await {
			Ok(Ok(())) => debug!("overdue upload to {} finished after all", self.host),
			Ok(Err(e)) => debug!("overdue upload to {} ended: {}", self.host, e),
			Err(e) => error!("ftp upload task died: {}", e),
		}
	}

	async fn transfer(&mut self, upload: Upload) -> Result<(), ftp::Error> {
		self.settle().await;
		let transfer = self.transfer.clone();
		let mut job = tokio::task::spawn_blocking(move || transfer(&upload));
		match tokio::time::timeout(self.deadline, &mut job).await {
			Ok(Ok(result)) => result,
			Ok(Err(e)) => {
				error!("ftp upload task died: {}", e);
				Ok(())
			},
			Err(_) => {
				self.overdue = Some(job);
				Err(ftp::Error::Timeout(self.deadline))
			},
		}
	}

	async fn run(&mut self) {
		loop {
			let upload = match self.uploads.recv().await {
				Some(v) => v,
				None => break,
			};
			let date = upload.date;
			match self.transfer(upload).await {
				Ok(()) => (),
				Err(e) => warn!("mirror of {} to {} failed, next checkpoint will resend: {}", date, self.host, e),
			}
		}
		self.settle().await;
	}
}

/// Replicates checkpoints to an FTP server from a background task.
///
/// Uploads run one at a time. Each one is bounded by the target's socket
/// timeout per operation and by `deadline` overall.
pub struct FtpMirror {
	uploads: mpsc::Sender<Upload>,
}

impl FtpMirror {
	/// Must be called from within a tokio runtime.
	pub fn new(target: ftp::Target, depth: usize, deadline: Duration) -> Self {
		let host = target.host.clone();
		let transfer: Transfer = Arc::new(move |upload: &Upload| ftp::upload(&target, upload));
		Self::spawn(host, transfer, depth, deadline)
	}

	fn spawn(host: String, transfer: Transfer, depth: usize, deadline: Duration) -> Self {
		let (uploads, source) = mpsc::channel(depth);
		let mut worker = FtpMirrorWorker{
			host,
			transfer,
			deadline,
			uploads: source,
			overdue: None,
		};
		tokio::spawn(async move {
			worker.run().await
		});
		Self{
			uploads,
		}
	}
}

impl Mirror for FtpMirror {
	fn dispatch(&self, upload: Upload) {
		match self.uploads.try_send(upload) {
			Ok(()) => (),
			Err(TrySendError::Full(upload)) => {
				warn!("mirror queue full, dropping upload of {}", upload.date)
			},
			Err(TrySendError::Closed(upload)) => {
				error!("mirror worker gone, dropping upload of {}", upload.date)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::sync::Mutex;
	use std::time::Instant;

	use chrono::NaiveDate;

	fn unreachable_target() -> ftp::Target {
		let port = {
			let l = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
			l.local_addr().unwrap().port()
		};
		ftp::Target{
			host: "127.0.0.1".into(),
			port,
			user: "pi".into(),
			password: "secret".into(),
			path: String::new(),
			timeout: Duration::from_secs(1),
		}
	}

	fn sample(day: u32) -> Upload {
		Upload::new(NaiveDate::from_ymd_opt(2022, 1, day).unwrap(), Arc::from("time;p\n"))
	}

	fn worker(transfer: Transfer, deadline: Duration) -> (mpsc::Sender<Upload>, FtpMirrorWorker) {
		let (sender, uploads) = mpsc::channel(8);
		(sender, FtpMirrorWorker{
			host: "127.0.0.1".into(),
			transfer,
			deadline,
			uploads,
			overdue: None,
		})
	}

	#[tokio::test]
	async fn test_worker_reports_failed_transfer() {
		let target = unreachable_target();
		let (_sender, mut worker) = worker(
			Arc::new(move |u: &Upload| ftp::upload(&target, u)),
			Duration::from_secs(5),
		);
		match worker.transfer(sample(1)).await {
			Err(ftp::Error::Connect(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_overdue_transfer_finishes_before_the_next_starts() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let seen = log.clone();
		let (sender, mut worker) = worker(
			Arc::new(move |u: &Upload| -> Result<(), ftp::Error> {
				seen.lock().unwrap().push(format!("start {}", u.date));
				if u.date.to_string() == "2022-01-01" {
					std::thread::sleep(Duration::from_millis(300));
				}
				seen.lock().unwrap().push(format!("end {}", u.date));
				Ok(())
			}),
			Duration::from_millis(50),
		);

		match worker.transfer(sample(1)).await {
			Err(ftp::Error::Timeout(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		sender.send(sample(2)).await.unwrap();
		drop(sender);
		worker.run().await;

		assert_eq!(*log.lock().unwrap(), vec![
			"start 2022-01-01",
			"end 2022-01-01",
			"start 2022-01-02",
			"end 2022-01-02",
		]);
	}

	#[tokio::test]
	async fn test_dispatch_drops_overflow_without_blocking() {
		let done = Arc::new(Mutex::new(Vec::new()));
		let seen = done.clone();
		let mirror = FtpMirror::spawn(
			"127.0.0.1".into(),
			Arc::new(move |u: &Upload| -> Result<(), ftp::Error> {
				seen.lock().unwrap().push(u.date);
				Ok(())
			}),
			1,
			Duration::from_secs(5),
		);

		// the worker cannot run before this test yields, so only the first
		// upload fits into the queue
		let t0 = Instant::now();
		for day in 1..=20 {
			mirror.dispatch(sample(day));
		}
		assert!(t0.elapsed() < Duration::from_secs(1));

		let waited = Instant::now();
		while done.lock().unwrap().is_empty() && waited.elapsed() < Duration::from_secs(5) {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(*done.lock().unwrap(), vec![NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()]);
	}
}
