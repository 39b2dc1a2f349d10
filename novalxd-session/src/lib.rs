//! novalxd-session - LXD session layer for the nova-lxd compute driver.
//!
//! Turns driver lifecycle calls into LXD REST calls and collapses LXD's
//! background operations into awaited calls with typed errors.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod operation;
pub mod session;

#[cfg(test)]
mod test_util;

pub use api::{ApiResponse, ContainerApi, OperationStatus};
pub use client::{Endpoint, LxdClient};
pub use config::SessionConfig;
pub use error::{ApiError, ModelError, SessionError};
pub use model::{
    AliasRequest, Instance, MacAddress, NetworkDevice, NicType, ProfileConfig, PublishRequest,
    ResourceLimits, SnapshotRequest,
};
pub use operation::{Operation, OperationState};
pub use session::Session;
