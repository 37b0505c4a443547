//! Background Tasks Module
//!
//! Contains background tasks that run periodically while an engine is open.
//!
//! # Tasks
//! - Expiration sweep: removes expired cache entries at configured intervals

mod sweeper;

pub use sweeper::spawn_sweeper;
