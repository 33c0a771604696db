//! Background Tasks Module
//!
//! Contains background tasks owned by a cache engine.
//!
//! # Tasks
//! - TTL Cleanup: Purges expired persistent records at the configured interval

mod cleanup;

pub(crate) use cleanup::spawn_cleanup_task;
