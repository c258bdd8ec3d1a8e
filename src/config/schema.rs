//! Command-line options and the validated runtime settings they produce.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// Raw command-line options.
#[derive(Parser, Debug)]
#[command(name = "dev-refresh")]
#[command(about = "Reload web pages when watched files change", long_about = None)]
pub struct Options {
    /// Run <CMD> on change
    #[arg(short, long, value_name = "CMD")]
    pub cmd: Option<String>,

    /// Serve files in <DIR>
    #[arg(short, long, value_name = "DIR")]
    pub serve: Option<PathBuf>,

    /// Proxy requests to <HOST>
    #[arg(short, long, value_name = "HOST")]
    pub proxy: Option<String>,

    /// Serve on <PORT>
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Bind to <HOST>
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Don't open the page in a browser
    #[arg(short = 'n', long)]
    pub no_open: bool,

    /// Paths to watch for changes
    #[arg(value_name = "WATCH")]
    pub watch: Vec<PathBuf>,
}

/// What the HTTP server does with non-poll requests.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Serve static files from a root directory.
    Serve(PathBuf),
    /// Forward requests to an upstream origin.
    Proxy(Url),
}

/// Validated runtime settings.
///
/// Produced by [`validation::validate`](crate::config::validate); all
/// normalization happens there, nothing downstream re-checks these fields.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Command to run when watched files change.
    pub command: Option<String>,

    /// HTTP server mode, if serving or proxying was requested.
    pub mode: Option<Mode>,

    /// Host to bind the server to.
    pub host: String,

    /// Port to bind the server to.
    pub port: u16,

    /// Open the served page in a browser once listening.
    pub open_browser: bool,

    /// Directories (or files) watched for changes.
    pub watch_paths: Vec<PathBuf>,

    /// Quiet window for coalescing bursts of file events.
    pub quiet_window: Duration,
}

impl Settings {
    /// Whether anything is being watched. Injection and the reload
    /// protocol are inert when this is false.
    pub fn watching(&self) -> bool {
        !self.watch_paths.is_empty()
    }
}

/// Default quiet window for the change signal debounce.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(100);
