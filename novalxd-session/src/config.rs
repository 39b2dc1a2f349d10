//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::client::Endpoint;

/// Default LXD socket on a host with the deb package.
pub const DEFAULT_SOCKET: &str = "/var/lib/lxd/unix.socket";

/// Settings a `Session` is built with. Nothing here changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    /// Operation status code that counts as success.
    pub expected_status: u16,
    pub poll_interval: Duration,
    /// Bound for snapshot and publish operations.
    pub snapshot_timeout: Duration,
    /// Bound for `operation_wait`; `None` waits indefinitely.
    pub operation_wait_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET)),
            expected_status: 200,
            poll_interval: Duration::from_millis(500),
            snapshot_timeout: Duration::from_secs(600),
            operation_wait_timeout: None,
        }
    }
}
