/*!
# Local day file storage

Checkpoints replace the whole day file; restores only accept a file whose
header matches the configured schema column for column.
*/
mod archive;
mod filearchive;

pub use archive::{RestoreError, SaveError};
pub use filearchive::{file_name, year_name, LocalStore, Saved, DATE_FORMAT};
