//! The remote surface the session needs from LXD.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::model::{AliasRequest, ProfileConfig, PublishRequest, SnapshotRequest};

/// A decoded LXD response: HTTP status plus the JSON envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Operation path carried by an async response, e.g. `/1.0/operations/<id>`.
    pub fn operation(&self) -> Option<&str> {
        self.body
            .get("operation")
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
    }
}

/// Status of a background operation as reported by LXD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub status_code: u16,
    /// `Running`, `Success`, `Failure`, ...
    pub status: String,
    /// Error text for failed operations.
    pub err: String,
}

/// Remote container-management API.
///
/// Lookups that can legitimately miss return `Ok(false)`; every other call
/// reports a missing resource as `ApiError::NotFound`.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Names of all profiles.
    async fn profile_list(&self) -> Result<Vec<String>, ApiError>;

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError>;

    async fn profile_create(&self, config: &ProfileConfig) -> Result<ApiResponse, ApiError>;

    async fn profile_delete(&self, name: &str) -> Result<ApiResponse, ApiError>;

    /// Starts a snapshot; the response carries an operation.
    async fn container_snapshot_create(
        &self,
        container: &str,
        snapshot: &SnapshotRequest,
    ) -> Result<ApiResponse, ApiError>;

    /// Starts publishing a container as an image; the response carries an operation.
    async fn container_publish(&self, image: &PublishRequest) -> Result<ApiResponse, ApiError>;

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError>;

    async fn alias_create(&self, alias: &AliasRequest) -> Result<ApiResponse, ApiError>;

    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ApiError>;
}
