//! Live-reloading development proxy / static server library.

pub mod config;
pub mod http;
pub mod inject;
pub mod reload;
pub mod runner;
pub mod watch;

pub use config::{Mode, Options, Settings};
pub use http::HttpServer;
pub use inject::Injector;
pub use reload::Coordinator;
pub use runner::{RunOutcome, Supervisor};
pub use watch::ChangeSignal;
