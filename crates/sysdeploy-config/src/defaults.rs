use camino::Utf8PathBuf;

use crate::endpoint::SocketEndpoint;
use crate::logging::LogFormat;

/// Socket of the addressed system bus the daemon is reachable on.
pub const DEFAULT_BUS_SOCKET: &str = "/run/sysdeploy/bus.sock";

/// Socket accepting anonymous peer connections from privileged clients.
pub const DEFAULT_PEER_SOCKET: &str = "/run/sysdeploy/peer.sock";

/// Identifier sent when registering as a client.
pub const DEFAULT_CLIENT_ID: &str = "cli";

/// Default log filter. Diagnostics stay quiet unless asked for.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Attempts made when registration races a daemon that is exiting.
pub const DEFAULT_REGISTRATION_ATTEMPTS: u32 = 50;

/// Pause between registration attempts, in milliseconds.
pub const DEFAULT_REGISTRATION_BACKOFF_MS: u64 = 100;

/// Upper bound on a reload request, in seconds.
pub const DEFAULT_RELOAD_TIMEOUT_SECS: u64 = 120;

/// Directory where the login manager records per-user session state.
pub const DEFAULT_SESSION_DIR: &str = "/run/systemd/users";

/// Default endpoint of the addressed bus.
pub fn default_bus_socket() -> SocketEndpoint {
    SocketEndpoint::unix(DEFAULT_BUS_SOCKET)
}

/// Default endpoint for anonymous peer connections.
pub fn default_peer_socket() -> SocketEndpoint {
    SocketEndpoint::unix(DEFAULT_PEER_SOCKET)
}

/// Owned client identifier used where allocation is required (e.g. serde).
pub fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_owned()
}

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default diagnostics format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

pub(crate) const fn default_registration_attempts() -> u32 {
    DEFAULT_REGISTRATION_ATTEMPTS
}

pub(crate) const fn default_registration_backoff_ms() -> u64 {
    DEFAULT_REGISTRATION_BACKOFF_MS
}

pub(crate) const fn default_reload_timeout_secs() -> u64 {
    DEFAULT_RELOAD_TIMEOUT_SECS
}

/// Default session-state directory.
pub fn default_session_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_SESSION_DIR)
}
