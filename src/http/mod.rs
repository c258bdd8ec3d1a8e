//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, dispatch)
//!     → poll endpoint (long-poll against the reload coordinator)
//!     → static_files.rs (serve mode) or proxy.rs (proxy mode)
//!     → websocket.rs + relay.rs for upgrade requests in proxy mode
//! ```

pub mod proxy;
pub mod relay;
pub mod server;
pub mod static_files;
pub mod websocket;

pub use relay::{HalfState, RelayHalf};
pub use server::{AppState, HttpServer, POLL_PATH};
