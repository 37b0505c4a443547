//! Persistence Module
//!
//! Append-only durability log and the recovery loader that replays it.

mod log;
mod record;
pub mod recovery;

pub use log::{DurableLog, LogReader};
pub use record::LogRecord;
pub use recovery::{load, ReplayStats};
