//! Scheduling: what runs when.
//!
//! | Mode | Entry | Traversal | Failure policy |
//! |------|-------|-----------|----------------|
//! | continuous | [`daemon::Daemon::run`] | weighted random, forever | count and move on |
//! | batch | [`batch::Batch::run`] | registry order, once | per-source exponential backoff |
//!
//! Both modes run one adapter at a time and observe [`crate::shutdown::Shutdown`]
//! only between steps.

pub mod batch;
pub mod daemon;
pub mod deep;
