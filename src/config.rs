//! Client configuration and environment resolution.
//!
//! A [`Config`] is resolved once, when a client is built, by layering three
//! sources per field:
//!
//! 1. a value set programmatically (see [`ConfigOverrides`]),
//! 2. the field's environment variable, read through an [`EnvSource`],
//! 3. the built-in default.
//!
//! Environment values that fail to parse are ignored and the next layer
//! wins, so a typo in `PDP_PORT` never prevents a client from starting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Default PDP port.
pub const DEFAULT_PORT: u16 = 8181;
/// Default PDP hostname.
pub const DEFAULT_HOSTNAME: &str = "localhost";
/// Default URL scheme.
pub const DEFAULT_SCHEME: &str = "http";
/// Default policy path.
pub const DEFAULT_POLICY_PATH: &str = "/authz";
/// Default read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;
/// Default connection timeout in milliseconds.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;
/// Default maximum number of attempts per evaluation.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;
/// Default base backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

pub const ENV_PORT: &str = "PDP_PORT";
pub const ENV_HOSTNAME: &str = "PDP_HOSTNAME";
// The variable holds a URL scheme; the name is kept for compatibility.
pub const ENV_SCHEME: &str = "PDP_SCHEMA";
pub const ENV_POLICY_PATH: &str = "PDP_POLICY_PATH";
pub const ENV_READ_TIMEOUT_MS: &str = "PDP_READ_TIMEOUT_MILLISECONDS";
pub const ENV_CONNECTION_TIMEOUT_MS: &str = "PDP_CONNECTION_TIMEOUT_MILLISECONDS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "PDP_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BACKOFF_MS: &str = "PDP_RETRY_BACKOFF_MILLISECONDS";

/// A source of environment variables.
///
/// The client reads configuration through this trait rather than
/// `std::env` directly, so tests and embedders can supply their own values.
///
/// # Examples
///
/// ```
/// use pdp_client::config::EnvSource;
/// use std::collections::HashMap;
///
/// let mut env = HashMap::new();
/// env.insert("PDP_HOSTNAME".to_string(), "pdp.internal".to_string());
///
/// assert_eq!(env.var("PDP_HOSTNAME").as_deref(), Some("pdp.internal"));
/// assert_eq!(env.var("PDP_PORT"), None);
/// ```
pub trait EnvSource: Send + Sync {
    /// Returns the current value of `key`, or `None` if it is unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Values set programmatically, before environment resolution.
///
/// A field left as `None` falls through to the environment and then to the
/// default. A field set here always wins over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub scheme: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub policy_path: Option<String>,
    pub read_timeout_ms: Option<u64>,
    pub connection_timeout_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

/// The fully resolved client configuration.
///
/// Immutable once the client is built. Serializable so it can be dumped for
/// diagnostics.
///
/// A timeout of zero means "no timeout".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub scheme: String,
    pub hostname: String,
    pub port: u16,
    pub policy_path: String,
    pub read_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            policy_path: DEFAULT_POLICY_PATH.to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Resolves the final configuration from programmatic values and the
    /// environment.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdp_client::config::{Config, ConfigOverrides};
    /// use std::collections::HashMap;
    ///
    /// let mut env = HashMap::new();
    /// env.insert("PDP_PORT".to_string(), "9000".to_string());
    /// env.insert("PDP_HOSTNAME".to_string(), "pdp.internal".to_string());
    ///
    /// let overrides = ConfigOverrides {
    ///     hostname: Some("pdp.local".to_string()),
    ///     ..Default::default()
    /// };
    ///
    /// let config = Config::resolve(&overrides, &env);
    /// assert_eq!(config.hostname, "pdp.local");
    /// assert_eq!(config.port, 9000);
    /// ```
    pub fn resolve(overrides: &ConfigOverrides, env: &dyn EnvSource) -> Self {
        Self {
            scheme: overrides
                .scheme
                .clone()
                .or_else(|| env.var(ENV_SCHEME))
                .unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
            hostname: overrides
                .hostname
                .clone()
                .or_else(|| env.var(ENV_HOSTNAME))
                .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            port: overrides
                .port
                .or_else(|| parse_env(env, ENV_PORT))
                .unwrap_or(DEFAULT_PORT),
            policy_path: overrides
                .policy_path
                .clone()
                .or_else(|| env.var(ENV_POLICY_PATH))
                .unwrap_or_else(|| DEFAULT_POLICY_PATH.to_string()),
            read_timeout_ms: overrides
                .read_timeout_ms
                .or_else(|| parse_env(env, ENV_READ_TIMEOUT_MS))
                .unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            connection_timeout_ms: overrides
                .connection_timeout_ms
                .or_else(|| parse_env(env, ENV_CONNECTION_TIMEOUT_MS))
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_MS),
            retry_max_attempts: overrides
                .retry_max_attempts
                .or_else(|| parse_env_non_negative(env, ENV_RETRY_MAX_ATTEMPTS))
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            retry_backoff_ms: overrides
                .retry_backoff_ms
                .or_else(|| parse_env_non_negative(env, ENV_RETRY_BACKOFF_MS))
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Resolves a configuration from the process environment and defaults.
    pub fn from_env() -> Self {
        Self::resolve(&ConfigOverrides::default(), &ProcessEnv)
    }

    /// Returns the read timeout, or `None` when it is disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.read_timeout_ms)
    }

    /// Returns the connection timeout, or `None` when it is disabled.
    pub fn connection_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.connection_timeout_ms)
    }

    /// Returns the base backoff between attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_env<T: FromStr>(env: &dyn EnvSource, key: &str) -> Option<T> {
    let raw = env.var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::debug!(variable = key, value = %raw, "Ignoring malformed environment value");
            None
        }
    }
}

// Negative values are accepted by the parser but mean "use the default".
fn parse_env_non_negative<T: TryFrom<i64>>(env: &dyn EnvSource, key: &str) -> Option<T> {
    let value: i64 = parse_env(env, key)?;
    match T::try_from(value) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::debug!(variable = key, value, "Ignoring out-of-range environment value");
            None
        }
    }
}
