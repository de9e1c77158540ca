use std::sync::Arc;

use chrono::NaiveDate;

use crate::store;

/// The complete content of one day file at the time a checkpoint was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
	pub date: NaiveDate,
	pub content: Arc<str>,
}

impl Upload {
	pub fn new(date: NaiveDate, content: Arc<str>) -> Self {
		Self{date, content}
	}

	pub fn year(&self) -> String {
		store::year_name(self.date)
	}

	pub fn file_name(&self) -> String {
		store::file_name(self.date)
	}
}

/// Best-effort replication of checkpointed day files.
///
/// `dispatch` must not block the caller for long and must not fail; failed
/// uploads are reported by the implementation and healed by the next
/// checkpoint, which always carries the full content.
pub trait Mirror {
	fn dispatch(&self, upload: Upload);
}
