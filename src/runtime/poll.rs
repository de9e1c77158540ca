use std::fmt;
use std::time::Duration;

use chrono::Local;

use log::{debug, trace, warn};

use smartstring::alias::String as SmartString;

use tokio::time::MissedTickBehavior;

use crate::engine::{Engine, PushOutcome};
use crate::snapshot::{Snapshot, TIMESTAMP_FORMAT};

#[derive(Debug)]
pub enum FetchError {
	Request(reqwest::Error),
	Decode(serde_json::Error),
}

impl fmt::Display for FetchError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Decode(e) => write!(f, "not a flat JSON object: {}", e),
		}
	}
}

impl std::error::Error for FetchError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Request(e) => Some(e),
			Self::Decode(e) => Some(e),
		}
	}
}

impl From<reqwest::Error> for FetchError {
	fn from(e: reqwest::Error) -> Self {
		Self::Request(e)
	}
}

impl From<serde_json::Error> for FetchError {
	fn from(e: serde_json::Error) -> Self {
		Self::Decode(e)
	}
}

pub fn decode(body: &[u8]) -> Result<Snapshot, FetchError> {
	Ok(serde_json::from_slice(body)?)
}

/// Fill in the cycle time if the source did not provide one.
pub fn stamp_if_missing(snapshot: &mut Snapshot, column: &str, now: &str) {
	if !snapshot.contains_key(column) {
		snapshot.insert(column, now);
	}
}

/// Fetches one snapshot per tick from an HTTP JSON endpoint and feeds it to
/// the engine, which it owns as the only writer.
pub struct HttpPoller {
	client: reqwest::Client,
	url: String,
	interval: Duration,
	timestamp_column: SmartString,
	engine: Engine,
}

impl HttpPoller {
	pub fn new(url: String, interval: Duration, timeout: Duration, engine: Engine) -> Result<Self, reqwest::Error> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()?;
		let timestamp_column = match engine.schema() {
			Some(schema) => schema.timestamp_column().into(),
			None => "time".into(),
		};
		Ok(Self{
			client,
			url,
			interval,
			timestamp_column,
			engine,
		})
	}

	pub fn engine(&self) -> &Engine {
		&self.engine
	}

	pub async fn fetch(&self) -> Result<Snapshot, FetchError> {
		let resp = self.client.get(&self.url[..]).send().await?;
		let body = resp.error_for_status()?.bytes().await?;
		decode(&body)
	}

	async fn cycle(&mut self) {
		let mut snapshot = match self.fetch().await {
			Ok(v) => v,
			Err(e) => {
				warn!("lost cycle: failed to fetch snapshot from {}: {}", self.url, e);
				return;
			},
		};
		let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
		stamp_if_missing(&mut snapshot, &self.timestamp_column, &now);
		match self.engine.push(&snapshot) {
			PushOutcome::Committed(c) => debug!("snapshot committed: {:?}", c),
			other => trace!("snapshot pushed: {:?}", other),
		}
	}

	pub async fn run(mut self) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			self.cycle().await;
		}
	}
}
