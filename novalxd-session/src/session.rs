//! The session facade used by the compute driver.
//!
//! Every method makes a single attempt. Backend errors are translated into
//! `SessionError`; missing profiles and aliases are not errors, which keeps
//! create and delete idempotent.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::{ApiResponse, ContainerApi};
use crate::client::LxdClient;
use crate::config::SessionConfig;
use crate::error::{ApiError, Result, SessionError};
use crate::model::{AliasRequest, Instance, ProfileConfig, PublishRequest, SnapshotRequest};
use crate::operation::{Operation, OperationState};

pub struct Session {
    api: Arc<dyn ContainerApi>,
    config: SessionConfig,
}

impl Session {
    pub fn new(api: Arc<dyn ContainerApi>, config: SessionConfig) -> Self {
        Self { api, config }
    }

    /// Session talking to the LXD daemon named in `config.endpoint`.
    pub fn connect(config: SessionConfig) -> Self {
        let api = Arc::new(LxdClient::new(&config.endpoint));
        Self::new(api, config)
    }

    pub fn api(&self) -> &dyn ContainerApi {
        self.api.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // === Profiles ===

    pub async fn profile_list(&self) -> Result<Vec<String>> {
        self.api.profile_list().await.map_err(|e| {
            error!(error = %e, "Failed to list profiles");
            SessionError::from(e)
        })
    }

    /// Create the instance's profile unless it already exists.
    ///
    /// Returns `None` when the profile was already there; nothing is sent in
    /// that case. The profile must be named after the instance.
    pub async fn profile_create(
        &self,
        config: &ProfileConfig,
        instance: &Instance,
    ) -> Result<Option<ApiResponse>> {
        if config.name != instance.name {
            error!(instance = %instance.name, profile = %config.name, "Profile name does not match instance");
            return Err(SessionError::OperationFailed(format!(
                "profile {} does not belong to instance {}",
                config.name, instance.name
            )));
        }

        let defined = self
            .api
            .profile_defined(&instance.name)
            .await
            .map_err(|e| translate(e, "profile lookup", instance))?;
        if defined {
            debug!(instance = %instance.name, "Profile already exists");
            return Ok(None);
        }

        info!(instance = %instance.name, profile = %config.name, "Creating profile");
        let resp = self
            .api
            .profile_create(config)
            .await
            .map_err(|e| translate(e, "profile create", instance))?;
        Ok(Some(resp))
    }

    pub async fn profile_delete(&self, instance: &Instance) -> Result<()> {
        let defined = self
            .api
            .profile_defined(&instance.name)
            .await
            .map_err(|e| translate(e, "profile lookup", instance))?;
        if !defined {
            debug!(instance = %instance.name, "No profile to delete");
            return Ok(());
        }

        info!(instance = %instance.name, "Deleting profile");
        match self.api.profile_delete(&instance.name).await {
            Ok(_) => Ok(()),
            Err(ApiError::NotFound(_)) => {
                warn!(instance = %instance.name, "Profile vanished before delete");
                Ok(())
            }
            Err(e) => Err(translate(e, "profile delete", instance)),
        }
    }

    // === Containers ===

    /// Snapshot the instance's container and wait for the snapshot to land.
    pub async fn container_snapshot(
        &self,
        snapshot: &SnapshotRequest,
        instance: &Instance,
    ) -> Result<()> {
        info!(instance = %instance.name, snapshot = %snapshot.name, "Creating snapshot");
        let resp = self
            .api
            .container_snapshot_create(&instance.name, snapshot)
            .await
            .map_err(|e| translate(e, "snapshot create", instance))?;

        let operation = Operation::from_response(&resp, self.config.expected_status)
            .ok_or_else(|| {
                SessionError::OperationFailed(format!(
                    "snapshot of {} returned no operation",
                    instance.name
                ))
            })?;

        self.wait_bounded(operation, instance).await?;
        info!(instance = %instance.name, snapshot = %snapshot.name, "Snapshot created");
        Ok(())
    }

    /// Publish a container as an image.
    ///
    /// The answer comes from checking that the image alias exists afterwards,
    /// not from the publish call itself.
    pub async fn container_publish(
        &self,
        image: &PublishRequest,
        instance: &Instance,
    ) -> Result<bool> {
        info!(instance = %instance.name, alias = %image.alias, "Publishing container");
        match self.api.container_publish(image).await {
            Ok(resp) => {
                if !resp.is_success() {
                    warn!(instance = %instance.name, status_code = resp.status_code, "Publish not accepted");
                }
                if let Some(operation) = Operation::from_response(&resp, self.config.expected_status)
                {
                    let id = operation.id().to_string();
                    let state = operation
                        .wait(
                            self.api.as_ref(),
                            self.config.poll_interval,
                            Some(self.config.snapshot_timeout),
                        )
                        .await;
                    if state != OperationState::Succeeded {
                        warn!(instance = %instance.name, operation = %id, state = ?state, "Publish operation did not succeed");
                    }
                }
            }
            Err(e @ ApiError::Status { .. }) => {
                warn!(instance = %instance.name, error = %e, "Publish rejected");
            }
            Err(e) => return Err(translate(e, "publish", instance)),
        }

        let exported = self
            .api
            .alias_defined(&image.alias)
            .await
            .map_err(|e| translate(e, "image lookup", instance))?;
        info!(instance = %instance.name, alias = %image.alias, exported = exported, "Publish finished");
        Ok(exported)
    }

    // === Images ===

    /// Whether the instance's backing image is already known to LXD.
    pub async fn image_defined(&self, instance: &Instance) -> Result<bool> {
        match self.api.alias_defined(&instance.image_ref).await {
            Ok(defined) => {
                debug!(instance = %instance.name, image = %instance.image_ref, defined = defined, "Image lookup");
                Ok(defined)
            }
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(translate(e, "image lookup", instance)),
        }
    }

    pub async fn create_alias(&self, alias: &AliasRequest, instance: &Instance) -> Result<bool> {
        info!(instance = %instance.name, alias = %alias.name, "Creating image alias");
        match self.api.alias_create(alias).await {
            Ok(resp) if resp.is_success() => Ok(true),
            Ok(resp) => {
                warn!(instance = %instance.name, alias = %alias.name, status_code = resp.status_code, "Alias not created");
                Ok(false)
            }
            Err(e @ ApiError::Status { .. }) => {
                warn!(instance = %instance.name, alias = %alias.name, error = %e, "Alias rejected");
                Ok(false)
            }
            Err(e) => Err(translate(e, "alias create", instance)),
        }
    }

    // === Operations ===

    /// Wait for an operation to reach the expected status.
    ///
    /// Unbounded unless `operation_wait_timeout` is configured.
    pub async fn operation_wait(&self, operation_id: &str, instance: &Instance) -> Result<()> {
        let operation = Operation::new(operation_id, self.config.expected_status).ok_or_else(|| {
            SessionError::NotFound(format!("invalid operation id {:?}", operation_id))
        })?;

        debug!(instance = %instance.name, operation = %operation.id(), "Waiting for operation");
        operation
            .wait_ok(
                self.api.as_ref(),
                self.config.poll_interval,
                self.config.operation_wait_timeout,
            )
            .await
            .inspect_err(|e| {
                error!(instance = %instance.name, error = %e, "Operation wait failed");
            })
    }

    async fn wait_bounded(&self, operation: Operation, instance: &Instance) -> Result<()> {
        operation
            .wait_ok(
                self.api.as_ref(),
                self.config.poll_interval,
                Some(self.config.snapshot_timeout),
            )
            .await
            .inspect_err(|e| {
                error!(instance = %instance.name, error = %e, "Operation did not complete");
            })
    }
}

fn translate(e: ApiError, what: &str, instance: &Instance) -> SessionError {
    error!(instance = %instance.name, error = %e, "LXD {} failed", what);
    SessionError::from(e).context(format_args!("{} for {}", what, instance.name))
}
