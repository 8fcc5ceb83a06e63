//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after configuration is resolved.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Directives appended to a configured level so long polling at `debug`
/// does not drown in HTTP client internals. An explicit directive for the
/// same target in `level` or `RUST_LOG` still wins.
const QUIET_TARGETS: &[&str] = &["hyper_util=info", "reqwest=info", "rustls=info", "h2=info"];

/// Initialise the global tracing subscriber, writing to stderr.
///
/// `level` accepts a plain level (`"error"` … `"trace"`) or any `EnvFilter`
/// directive list such as `"scorebot=debug,teloxide=warn"`.
///
/// If `prefer_level` is `true` (the level came from `SCOREBOT_LOG_LEVEL`),
/// `level` wins and `RUST_LOG` is only a fallback when `level` is invalid.
/// Otherwise `RUST_LOG` wins and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, prefer_level, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

fn build_filter(level: &str, prefer_level: bool, rust_log: Option<&str>) -> Result<EnvFilter, AppError> {
    let configured = || {
        let directives = std::iter::once(level).chain(QUIET_TARGETS.iter().copied()).collect::<Vec<_>>();
        EnvFilter::try_new(directives.join(","))
    };
    let from_env = || match rust_log {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| AppError::Logger(format!("invalid RUST_LOG '{directives}': {e}"))),
        None => Err(AppError::Logger("RUST_LOG is not set".into())),
    };

    if prefer_level {
        match configured() {
            Ok(filter) => Ok(filter),
            Err(level_err) => from_env().map_err(|env_err| {
                AppError::Logger(format!("invalid log level '{level}': {level_err}; {env_err}"))
            }),
        }
    } else {
        from_env()
            .or_else(|_| configured())
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    }
}
