//! Rebuild command supervision.
//!
//! # State Transitions
//! ```text
//! Idle → Running: trigger received, child spawned
//! Running → RunningWithPendingRerun: trigger received mid-run, child killed
//! RunningWithPendingRerun → Running: child exited, fresh run starts
//! Running → Idle: child exited, outcome reported
//! ```
//!
//! # Design Decisions
//! - At most one child process alive at any instant
//! - Triggers during an active run coalesce into exactly one follow-up run
//! - A failing command is informational, never fatal

pub mod supervisor;

pub use supervisor::{RunOutcome, Supervisor};
