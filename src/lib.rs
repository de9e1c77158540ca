pub mod buffer;
pub mod engine;
#[cfg(feature = "ftp")]
pub mod ftp;
#[cfg(feature = "poll")]
pub mod runtime;
pub mod snapshot;
pub mod store;
