//! HTTP client for the LXD REST API.
//!
//! LXD normally listens on a unix socket; a plain HTTP endpoint is also
//! accepted (TCP proxies, test servers).

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::http::uri::PathAndQuery;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use hyperlocal::UnixConnector;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiResponse, ContainerApi, OperationStatus};
use crate::error::ApiError;
use crate::model::{AliasRequest, ProfileConfig, PublishRequest, SnapshotRequest};

/// Where the LXD daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    /// Base URL such as `http://127.0.0.1:8443`.
    Http(String),
}

enum Transport {
    Unix {
        client: Client<UnixConnector, Full<Bytes>>,
        socket: PathBuf,
    },
    Http {
        client: Client<HttpConnector, Full<Bytes>>,
        base: String,
    },
}

/// `ContainerApi` backed by a live LXD daemon.
pub struct LxdClient {
    transport: Transport,
}

impl LxdClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        match endpoint {
            Endpoint::Unix(socket) => Self::unix(socket),
            Endpoint::Http(base) => Self::http(base),
        }
    }

    pub fn unix(socket: &Path) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(UnixConnector);
        Self {
            transport: Transport::Unix {
                client,
                socket: socket.to_path_buf(),
            },
        }
    }

    pub fn http(base: &str) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            transport: Transport::Http {
                client,
                base: base.trim_end_matches('/').to_string(),
            },
        }
    }

    fn uri(&self, path: &str) -> Result<Uri, ApiError> {
        match &self.transport {
            Transport::Unix { socket, .. } => {
                // hyperlocal panics on a path it cannot parse.
                path.parse::<PathAndQuery>()
                    .map_err(|e| ApiError::Unexpected(format!("invalid URI for {}: {}", path, e)))?;
                Ok(hyperlocal::Uri::new(socket, path).into())
            }
            Transport::Http { base, .. } => format!("{}{}", base, path)
                .parse::<Uri>()
                .map_err(|e| ApiError::Unexpected(format!("invalid URI for {}: {}", path, e))),
        }
    }

    /// Send one request and decode the LXD envelope.
    ///
    /// 404 maps to `ApiError::NotFound`, any other non-2xx to `ApiError::Status`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, ApiError> {
        let uri = self.uri(path)?;
        let payload = match &body {
            Some(value) => Bytes::from(serde_json::to_vec(value)?),
            None => Bytes::new(),
        };

        debug!(method = %method, path = %path, "LXD request");

        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(payload))?;

        let resp = match &self.transport {
            Transport::Unix { client, .. } => client.request(req).await?,
            Transport::Http { client, .. } => client.request(req).await?,
        };

        let status_code = resp.status().as_u16();
        let bytes = resp.into_body().collect().await?.to_bytes();
        let success = (200..300).contains(&status_code);
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                // Proxies answer errors with plain text; keep the status.
                Err(_) if !success => Value::Null,
                Err(e) => return Err(e.into()),
            }
        };

        debug!(path = %path, status_code = status_code, "LXD response");

        if status_code == 404 {
            return Err(ApiError::NotFound(error_message(&body, path)));
        }
        if !success {
            return Err(ApiError::Status {
                code: status_code,
                message: error_message(&body, path),
            });
        }

        Ok(ApiResponse::new(status_code, body))
    }

    async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// GET that answers `false` instead of failing when the resource is missing.
    async fn exists(&self, path: &str) -> Result<bool, ApiError> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Text of an LXD error envelope, falling back to the request path.
fn error_message(body: &Value, path: &str) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

/// Percent-encode a resource name for use as one path segment.
fn segment(name: &str) -> Cow<'_, str> {
    urlencoding::encode(name)
}

/// Last segment of a resource URL such as `/1.0/profiles/default`.
fn resource_name(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

#[async_trait]
impl ContainerApi for LxdClient {
    async fn profile_list(&self) -> Result<Vec<String>, ApiError> {
        let resp = self.get("/1.0/profiles").await?;
        let urls = resp
            .body
            .get("metadata")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Unexpected("profile list without metadata".into()))?;

        Ok(urls
            .iter()
            .filter_map(Value::as_str)
            .map(|url| resource_name(url).to_string())
            .collect())
    }

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.exists(&format!("/1.0/profiles/{}", segment(name))).await
    }

    async fn profile_create(&self, config: &ProfileConfig) -> Result<ApiResponse, ApiError> {
        self.post("/1.0/profiles", config.to_lxd()).await
    }

    async fn profile_delete(&self, name: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, &format!("/1.0/profiles/{}", segment(name)), None)
            .await
    }

    async fn container_snapshot_create(
        &self,
        container: &str,
        snapshot: &SnapshotRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.post(
            &format!("/1.0/containers/{}/snapshots", segment(container)),
            serde_json::to_value(snapshot)?,
        )
        .await
    }

    async fn container_publish(&self, image: &PublishRequest) -> Result<ApiResponse, ApiError> {
        self.post("/1.0/images", image.to_lxd()).await
    }

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError> {
        self.exists(&format!("/1.0/images/aliases/{}", segment(alias))).await
    }

    async fn alias_create(&self, alias: &AliasRequest) -> Result<ApiResponse, ApiError> {
        self.post("/1.0/images/aliases", serde_json::to_value(alias)?)
            .await
    }

    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ApiError> {
        let resp = self
            .get(&format!("/1.0/operations/{}", segment(operation_id)))
            .await?;
        let metadata = resp
            .body
            .get("metadata")
            .ok_or_else(|| ApiError::Unexpected(format!("operation {} without metadata", operation_id)))?;

        let status_code = metadata
            .get("status_code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .ok_or_else(|| {
                ApiError::Unexpected(format!("operation {} without status_code", operation_id))
            })?;
        let text = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(OperationStatus {
            status_code,
            status: text("status"),
            err: text("err"),
        })
    }
}
