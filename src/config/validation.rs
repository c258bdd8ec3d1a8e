//! Semantic validation of parsed command-line options.

use thiserror::Error;
use url::Url;

use crate::config::schema::{Mode, Options, Settings, DEFAULT_QUIET_WINDOW};

/// Errors found while validating options. All of these are fatal at
/// startup; the process exits nonzero before any server is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot serve and proxy at the same time")]
    ServeAndProxy,

    #[error("nothing to do: pass --serve, --proxy or at least one watch path")]
    NothingToDo,

    #[error("invalid proxy origin '{origin}': {source}")]
    InvalidProxyOrigin {
        origin: String,
        source: url::ParseError,
    },

    #[error("unsupported proxy scheme '{0}', expected http or https")]
    UnsupportedProxyScheme(String),
}

/// Validate options and produce runtime settings.
pub fn validate(options: Options) -> Result<Settings, ConfigError> {
    if options.serve.is_some() && options.proxy.is_some() {
        return Err(ConfigError::ServeAndProxy);
    }

    if options.serve.is_none() && options.proxy.is_none() && options.watch.is_empty() {
        return Err(ConfigError::NothingToDo);
    }

    let mode = if let Some(dir) = options.serve {
        Some(Mode::Serve(dir))
    } else if let Some(origin) = options.proxy {
        Some(Mode::Proxy(parse_origin(&origin)?))
    } else {
        None
    };

    Ok(Settings {
        command: options.cmd,
        mode,
        host: options.host,
        port: options.port,
        open_browser: !options.no_open,
        watch_paths: options.watch,
        quiet_window: DEFAULT_QUIET_WINDOW,
    })
}

/// Normalize and parse the proxy origin. A bare `host:port` is taken as
/// plain HTTP; scheme selection is otherwise explicit.
fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    let normalized = if origin.contains("://") {
        origin.to_string()
    } else {
        format!("http://{origin}")
    };

    let url = Url::parse(&normalized).map_err(|source| ConfigError::InvalidProxyOrigin {
        origin: origin.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedProxyScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> Options {
        Options {
            cmd: None,
            serve: None,
            proxy: None,
            port: 8080,
            host: "127.0.0.1".into(),
            no_open: false,
            watch: vec![],
        }
    }

    #[test]
    fn test_serve_and_proxy_conflict() {
        let mut opts = options();
        opts.serve = Some(PathBuf::from("public"));
        opts.proxy = Some("localhost:3000".into());
        assert!(matches!(validate(opts), Err(ConfigError::ServeAndProxy)));
    }

    #[test]
    fn test_nothing_to_do() {
        assert!(matches!(validate(options()), Err(ConfigError::NothingToDo)));
    }

    #[test]
    fn test_bare_host_becomes_http() {
        let mut opts = options();
        opts.proxy = Some("localhost:3000".into());
        let settings = validate(opts).unwrap();
        match settings.mode {
            Some(Mode::Proxy(url)) => {
                assert_eq!(url.scheme(), "http");
                assert_eq!(url.host_str(), Some("localhost"));
                assert_eq!(url.port(), Some(3000));
            }
            other => panic!("expected proxy mode, got {other:?}"),
        }
    }

    #[test]
    fn test_https_origin_kept() {
        let mut opts = options();
        opts.proxy = Some("https://example.com".into());
        let settings = validate(opts).unwrap();
        match settings.mode {
            Some(Mode::Proxy(url)) => assert_eq!(url.scheme(), "https"),
            other => panic!("expected proxy mode, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let mut opts = options();
        opts.proxy = Some("ftp://example.com".into());
        assert!(matches!(
            validate(opts),
            Err(ConfigError::UnsupportedProxyScheme(_))
        ));
    }

    #[test]
    fn test_watch_only_is_allowed() {
        let mut opts = options();
        opts.cmd = Some("make".into());
        opts.watch = vec![PathBuf::from("src")];
        let settings = validate(opts).unwrap();
        assert!(settings.mode.is_none());
        assert!(settings.watching());
    }
}
