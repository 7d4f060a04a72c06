//! Layered configuration for the `sysdeploy` client.
//!
//! Values are merged from built-in defaults, configuration files, `SYSDEPLOY_*`
//! environment variables and the configuration flags that precede the command
//! name on the command line, in increasing order of precedence.

mod defaults;
mod endpoint;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BUS_SOCKET, DEFAULT_CLIENT_ID, DEFAULT_LOG_FILTER, DEFAULT_PEER_SOCKET,
    DEFAULT_REGISTRATION_ATTEMPTS, DEFAULT_REGISTRATION_BACKOFF_MS, DEFAULT_RELOAD_TIMEOUT_SECS,
    DEFAULT_SESSION_DIR, default_bus_socket, default_client_id, default_log_filter,
    default_log_filter_string, default_log_format, default_peer_socket, default_session_dir,
};
use defaults::{
    default_registration_attempts, default_registration_backoff_ms, default_reload_timeout_secs,
};
pub use endpoint::{SocketEndpoint, SocketParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SYSDEPLOY")]
pub struct Config {
    /// Endpoint of the addressed system bus.
    #[serde(default = "default_bus_socket")]
    #[ortho_config(default = default_bus_socket())]
    pub bus_socket: SocketEndpoint,
    /// Endpoint used for anonymous peer connections.
    #[serde(default = "default_peer_socket")]
    #[ortho_config(default = default_peer_socket())]
    pub peer_socket: SocketEndpoint,
    /// Identifier sent when registering as a client.
    #[serde(default = "default_client_id")]
    #[ortho_config(default = default_client_id())]
    pub client_id: String,
    /// Tracing filter expression for diagnostics.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Format of diagnostics written to stderr.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Registration attempts made while the daemon is mid-exit.
    #[serde(default = "default_registration_attempts")]
    #[ortho_config(default = default_registration_attempts())]
    pub registration_attempts: u32,
    /// Pause between registration attempts, in milliseconds.
    #[serde(default = "default_registration_backoff_ms")]
    #[ortho_config(default = default_registration_backoff_ms())]
    pub registration_backoff_ms: u64,
    /// Upper bound on a reload request, in seconds.
    #[serde(default = "default_reload_timeout_secs")]
    #[ortho_config(default = default_reload_timeout_secs())]
    pub reload_timeout_secs: u64,
    /// Directory holding per-user login session state.
    #[serde(default = "default_session_dir")]
    #[ortho_config(default = default_session_dir())]
    pub session_dir: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_socket: default_bus_socket(),
            peer_socket: default_peer_socket(),
            client_id: default_client_id(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            registration_attempts: default_registration_attempts(),
            registration_backoff_ms: default_registration_backoff_ms(),
            reload_timeout_secs: default_reload_timeout_secs(),
            session_dir: default_session_dir(),
        }
    }
}

/// Bounded retry schedule for client registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause before each retry.
    pub backoff: Duration,
}

impl Config {
    /// Loads configuration from every layer, treating `args` as the command
    /// line. `args` must start with the program name and contain only
    /// configuration flags.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Returns the addressed bus endpoint.
    #[must_use]
    pub const fn bus_socket(&self) -> &SocketEndpoint {
        &self.bus_socket
    }

    /// Returns the anonymous peer endpoint.
    #[must_use]
    pub const fn peer_socket(&self) -> &SocketEndpoint {
        &self.peer_socket
    }

    /// Returns the registration identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the diagnostics format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the registration retry schedule. At least one attempt is
    /// always made.
    #[must_use]
    pub fn registration_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.registration_attempts.max(1),
            backoff: Duration::from_millis(self.registration_backoff_ms),
        }
    }

    /// Returns the reload timeout.
    #[must_use]
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    /// Returns the session-state directory.
    #[must_use]
    pub fn session_dir(&self) -> &Utf8Path {
        &self.session_dir
    }
}
