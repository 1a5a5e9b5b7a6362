//! Process-wide logging bootstrap.
//!
//! Logs go to stderr so they never interleave with console or script output
//! on stdout. `RUST_LOG`, when set, overrides the requested level.

use std::sync::OnceLock;

use anyhow::{Result, bail};
use flexi_logger::{Logger, LoggerHandle};
use log::debug;

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

static LOGGING_STATE: OnceLock<LoggingState> = OnceLock::new();

struct LoggingState {
    level: &'static str,
    _logger: LoggerHandle,
}

/// Starts the logger once. Later calls with the same level are no-ops and a
/// different level is refused, since the backend cannot be swapped.
pub fn init(level: &str) -> Result<()> {
    let level = normalize_level(level)?;
    if let Some(state) = LOGGING_STATE.get() {
        if state.level != level {
            bail!(
                "logging already initialized with level `{}`; refusing to switch to `{level}`",
                state.level
            );
        }
        return Ok(());
    }

    let logger = Logger::try_with_env_or_str(level)?
        .log_to_stderr()
        .start()?;
    if LOGGING_STATE
        .set(LoggingState {
            level,
            _logger: logger,
        })
        .is_err()
    {
        bail!("logging initialized concurrently");
    }
    debug!("logging started at level {level}");
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str> {
    let lowered = level.trim().to_ascii_lowercase();
    match LEVELS.iter().find(|candidate| **candidate == lowered) {
        Some(found) => Ok(*found),
        None => bail!(
            "unsupported log level `{}`; expected one of {}",
            level.trim(),
            LEVELS.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_levels_in_any_case() {
        assert_eq!(normalize_level("warn").expect("level"), "warn");
        assert_eq!(normalize_level(" DEBUG ").expect("level"), "debug");
        assert_eq!(normalize_level("off").expect("level"), "off");
    }

    #[test]
    fn rejects_unknown_levels() {
        let err = normalize_level("loud").expect_err("unknown level");
        assert!(err.to_string().contains("unsupported log level `loud`"));
        assert!(normalize_level("").is_err());
    }
}
