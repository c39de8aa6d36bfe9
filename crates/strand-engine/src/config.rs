//! Runtime startup options.
//!
//! Options arrive as a list of `key=value` strings (the form the CLI harness
//! and embedding applications pass through) and are parsed once, before the
//! partitioner is built. Unknown keys and malformed values are hard errors,
//! never silently defaulted.

use crate::error::ConfigError;
use std::time::Duration;

/// Parsed startup options for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Unit count for the pool named "default" when it is registered without
    /// an explicit count (`os_threads=<N>`).
    pub os_threads: Option<usize>,

    /// Permit cumulative unit counts beyond the physical concurrency
    /// (`allow_oversubscription=1`).
    pub allow_oversubscription: bool,

    /// Watchdog bound for the drain-to-quiescence phase of `stop()`
    /// (`shutdown_timeout_ms=<N>`).
    pub shutdown_timeout: Duration,

    /// How long an idle worker parks between queue polls
    /// (`idle_backoff_us=<N>`).
    pub idle_backoff: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            os_threads: None,
            allow_oversubscription: false,
            shutdown_timeout: Duration::from_secs(30),
            idle_backoff: Duration::from_micros(100),
        }
    }
}

impl RuntimeOptions {
    /// Parse a list of `key=value` startup options.
    pub fn parse_kv<I, S>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        for pair in pairs {
            options.apply(pair.as_ref())?;
        }
        Ok(options)
    }

    /// Apply one `key=value` option in place.
    pub fn apply(&mut self, pair: &str) -> Result<(), ConfigError> {
        let (key, value) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            key: pair.to_string(),
            value: String::new(),
        })?;

        match key {
            "os_threads" => {
                let n = parse_number(key, value)?;
                if n == 0 {
                    return Err(invalid(key, value));
                }
                self.os_threads = Some(n);
            }
            "allow_oversubscription" => {
                self.allow_oversubscription = parse_bool(key, value)?;
            }
            "shutdown_timeout_ms" => {
                self.shutdown_timeout = Duration::from_millis(parse_number(key, value)? as u64);
            }
            "idle_backoff_us" => {
                self.idle_backoff = Duration::from_micros(parse_number(key, value)? as u64);
            }
            _ => {
                return Err(ConfigError::UnknownOption {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
