//! Reload coordination: epoch minting and long-poll resolution.
//!
//! # Data Flow
//! ```text
//! supervisor completion (RunOutcome)
//!     → coordinator.publish()
//!         → mint new epoch
//!         → resolve all pending long-polls
//! browser poll (GET /__dev-refresh-poll?<epoch>)
//!     → coordinator.handle_poll()
//!         → stale/absent epoch: immediate steady-state response
//!         → current epoch: held until the next publish
//! ```

pub mod coordinator;

pub use coordinator::{Coordinator, PollResponse, PollWait};
