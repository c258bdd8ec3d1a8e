//! File watching and change coalescing.
//!
//! # Data Flow
//! ```text
//! filesystem events (notify, may burst per logical edit)
//!     → signal.rs (restart-on-activity debounce)
//!     → one trigger per quiet window
//!     → command supervisor
//! ```

pub mod signal;

pub use signal::ChangeSignal;
