//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! command line
//!     → schema.rs (clap parse into Options)
//!     → validation.rs (semantic checks, origin normalization)
//!     → Settings (validated, immutable)
//!     → shared by reference to all subsystems
//! ```
//!
//! # Design Decisions
//! - Configuration is pure CLI; a dev tool has no config file to reload
//! - Serve and proxy modes are mutually exclusive; the conflict is the
//!   only fatal startup error
//! - The proxy origin is normalized to a full URL before any server starts

pub mod schema;
pub mod validation;

pub use schema::{Mode, Options, Settings};
pub use validation::{validate, ConfigError};
