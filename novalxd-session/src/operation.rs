//! Background operation handles and the polling loop.
//!
//! LXD answers long-running requests (snapshot, publish, delete) with an
//! operation path. The handle is polled until LXD reports the expected
//! status code, reports a failure, or the deadline passes.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::{ApiResponse, ContainerApi};
use crate::error::SessionError;

const OPERATIONS_PREFIX: &str = "/1.0/operations/";

/// LXD status codes at or above this are terminal failures (400 Failure, 401 Cancelled).
const FAILURE_STATUS_FLOOR: u16 = 400;

/// Where a polled operation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Succeeded,
    /// Backend error or terminal failure status, already classified.
    Failed(SessionError),
    TimedOut,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

/// A single-use handle to an LXD operation.
///
/// `wait` consumes the handle, so an operation cannot be polled again after
/// it resolved or timed out.
#[derive(Debug, PartialEq, Eq)]
pub struct Operation {
    id: String,
    expected_status: u16,
}

impl Operation {
    /// Accepts either a bare id or a full `/1.0/operations/<id>` path.
    pub fn new(id_or_path: &str, expected_status: u16) -> Option<Self> {
        let trimmed = id_or_path.trim().trim_end_matches('/');
        let id = trimmed.strip_prefix(OPERATIONS_PREFIX).unwrap_or(trimmed);
        if id.is_empty() || id.contains('/') {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            expected_status,
        })
    }

    /// Handle for the operation an async response points at, if any.
    pub fn from_response(response: &ApiResponse, expected_status: u16) -> Option<Self> {
        response
            .operation()
            .and_then(|path| Self::new(path, expected_status))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }

    /// Query LXD once and classify the answer.
    pub async fn poll(&self, api: &dyn ContainerApi) -> OperationState {
        match api.operation_status(&self.id).await {
            Ok(status) if status.status_code == self.expected_status => OperationState::Succeeded,
            Ok(status) if status.status_code >= FAILURE_STATUS_FLOOR => {
                let detail = if status.err.is_empty() {
                    status.status
                } else {
                    status.err
                };
                OperationState::Failed(SessionError::OperationFailed(format!(
                    "operation {} ended with {}: {}",
                    self.id, status.status_code, detail
                )))
            }
            Ok(status) => {
                debug!(operation = %self.id, status_code = status.status_code, "Operation still running");
                OperationState::Pending
            }
            Err(e) => OperationState::Failed(
                SessionError::from(e).context(format_args!("operation {}", self.id)),
            ),
        }
    }

    /// Poll until the operation leaves `Pending` or `timeout` elapses.
    ///
    /// The first poll happens immediately. `None` waits without a bound;
    /// otherwise each poll is also cut off at the deadline, so a backend that
    /// never answers still ends in `TimedOut`.
    pub async fn wait(
        self,
        api: &dyn ContainerApi,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> OperationState {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let state = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match tokio::time::timeout(remaining, self.poll(api)).await {
                        Ok(state) => state,
                        Err(_) => {
                            warn!(operation = %self.id, timeout = ?timeout, "Timeout waiting for operation status");
                            return OperationState::TimedOut;
                        }
                    }
                }
                None => self.poll(api).await,
            };
            if state.is_terminal() {
                return state;
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(operation = %self.id, timeout = ?timeout, "Timeout waiting for operation");
                        return OperationState::TimedOut;
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Wait and map the terminal state onto the session error type.
    pub async fn wait_ok(
        self,
        api: &dyn ContainerApi,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), SessionError> {
        let id = self.id.clone();
        match self.wait(api, poll_interval, timeout).await {
            OperationState::Succeeded => Ok(()),
            OperationState::Failed(e) => Err(e),
            OperationState::TimedOut => Err(SessionError::Timeout(format!(
                "operation {} did not complete within {:?}",
                id,
                timeout.unwrap_or_default()
            ))),
            OperationState::Pending => Err(SessionError::OperationFailed(format!(
                "operation {} still pending",
                id
            ))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", OPERATIONS_PREFIX, self.id)
    }
}
