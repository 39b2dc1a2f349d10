//! In-memory `ContainerApi` for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::api::{ApiResponse, ContainerApi, OperationStatus};
use crate::error::ApiError;
use crate::model::{AliasRequest, ProfileConfig, PublishRequest, SnapshotRequest};

/// Which call an injected error applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    ProfileList,
    ProfileDefined,
    ProfileCreate,
    ProfileDelete,
    SnapshotCreate,
    Publish,
    AliasDefined,
    AliasCreate,
    OperationStatus,
}

#[derive(Default)]
struct State {
    profiles: Vec<String>,
    aliases: HashSet<String>,
    /// Scripted status codes per operation; the last one repeats.
    operations: HashMap<String, VecDeque<u16>>,
    polls: HashMap<String, usize>,
    failures: HashMap<Call, fn() -> ApiError>,
    calls: Vec<Call>,
    next_operation: usize,
    /// Status codes for operations created by snapshot/publish.
    created_operation_codes: Vec<u16>,
    /// Whether publish registers its alias.
    publish_creates_alias: bool,
    publish_status: u16,
    /// Operation status requests never answer.
    hang_operation_status: bool,
}

pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                created_operation_codes: vec![200],
                publish_creates_alias: true,
                publish_status: 202,
                ..Default::default()
            }),
        }
    }

    pub fn push_operation(&self, id: &str, codes: &[u16]) {
        self.state
            .lock()
            .unwrap()
            .operations
            .insert(id.to_string(), codes.iter().copied().collect());
    }

    /// Status codes reported by operations that snapshot/publish create.
    pub fn set_created_operation_codes(&self, codes: &[u16]) {
        self.state.lock().unwrap().created_operation_codes = codes.to_vec();
    }

    pub fn set_publish_outcome(&self, status: u16, creates_alias: bool) {
        let mut state = self.state.lock().unwrap();
        state.publish_status = status;
        state.publish_creates_alias = creates_alias;
    }

    pub fn fail(&self, call: Call, error: fn() -> ApiError) {
        self.state.lock().unwrap().failures.insert(call, error);
    }

    /// Make every `operation_status` call hang, like a stalled daemon.
    pub fn hang_operation_status(&self) {
        self.state.lock().unwrap().hang_operation_status = true;
    }

    pub fn add_alias(&self, alias: &str) {
        self.state.lock().unwrap().aliases.insert(alias.to_string());
    }

    pub fn profiles(&self) -> Vec<String> {
        self.state.lock().unwrap().profiles.clone()
    }

    pub fn operation_polls(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self, call: Call) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    fn enter(&self, call: Call) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get(&call) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }

    fn start_operation(&self, status_code: u16) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        state.next_operation += 1;
        let id = format!("op-{}", state.next_operation);
        let codes = state.created_operation_codes.iter().copied().collect();
        state.operations.insert(id.clone(), codes);
        ApiResponse::new(
            status_code,
            json!({
                "type": "async",
                "status_code": 100,
                "operation": format!("/1.0/operations/{}", id),
            }),
        )
    }
}

fn ok() -> ApiResponse {
    ApiResponse::new(200, json!({"type": "sync", "status_code": 200}))
}

#[async_trait]
impl ContainerApi for FakeApi {
    async fn profile_list(&self) -> Result<Vec<String>, ApiError> {
        self.enter(Call::ProfileList)?;
        Ok(self.profiles())
    }

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.enter(Call::ProfileDefined)?;
        Ok(self.profiles().iter().any(|p| p == name))
    }

    async fn profile_create(&self, config: &ProfileConfig) -> Result<ApiResponse, ApiError> {
        self.enter(Call::ProfileCreate)?;
        let mut state = self.state.lock().unwrap();
        if state.profiles.contains(&config.name) {
            return Err(ApiError::Status {
                code: 409,
                message: "profile already exists".into(),
            });
        }
        state.profiles.push(config.name.clone());
        Ok(ok())
    }

    async fn profile_delete(&self, name: &str) -> Result<ApiResponse, ApiError> {
        self.enter(Call::ProfileDelete)?;
        let mut state = self.state.lock().unwrap();
        let before = state.profiles.len();
        state.profiles.retain(|p| p != name);
        if state.profiles.len() == before {
            return Err(ApiError::NotFound(format!("profile {}", name)));
        }
        Ok(ok())
    }

    async fn container_snapshot_create(
        &self,
        _container: &str,
        _snapshot: &SnapshotRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.enter(Call::SnapshotCreate)?;
        Ok(self.start_operation(202))
    }

    async fn container_publish(&self, image: &PublishRequest) -> Result<ApiResponse, ApiError> {
        self.enter(Call::Publish)?;
        let (status, creates_alias) = {
            let state = self.state.lock().unwrap();
            (state.publish_status, state.publish_creates_alias)
        };
        if creates_alias {
            self.add_alias(&image.alias);
        }
        Ok(self.start_operation(status))
    }

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError> {
        self.enter(Call::AliasDefined)?;
        Ok(self.state.lock().unwrap().aliases.contains(alias))
    }

    async fn alias_create(&self, alias: &AliasRequest) -> Result<ApiResponse, ApiError> {
        self.enter(Call::AliasCreate)?;
        let mut state = self.state.lock().unwrap();
        if !state.aliases.insert(alias.name.clone()) {
            return Ok(ApiResponse::new(
                409,
                json!({"type": "error", "error_code": 409, "error": "alias already exists"}),
            ));
        }
        Ok(ok())
    }

    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ApiError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            *state.polls.entry(operation_id.to_string()).or_default() += 1;
            state.hang_operation_status
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.enter(Call::OperationStatus)?;

        let mut state = self.state.lock().unwrap();
        let codes = state
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| ApiError::NotFound(format!("operation {}", operation_id)))?;
        let code = if codes.len() > 1 {
            codes.pop_front().unwrap_or(200)
        } else {
            codes.front().copied().unwrap_or(200)
        };
        Ok(OperationStatus {
            status_code: code,
            status: match code {
                200 => "Success".into(),
                103 => "Running".into(),
                _ => "Failure".into(),
            },
            err: String::new(),
        })
    }
}
