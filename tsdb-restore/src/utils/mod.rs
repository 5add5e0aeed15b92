//! Utility modules for the restore client.

pub mod errors;
pub mod logger;

pub use errors::{RestoreError, Result, ResultExt};
