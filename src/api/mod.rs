//! JSON request handlers for the chat feed, community and event directories.
//!
//! Every handler speaks the same envelope: a request carrying the method,
//! query string parameters and a raw JSON body, and a response carrying the
//! status code, headers and a serialized body.

mod chat;
mod communities;
mod events;
pub mod server;

use crate::db::repo::Repo;
use crate::error::{ApiError, ApiResult};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Timelike};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Category value meaning "do not filter"
pub const ALL_CATEGORIES: &str = "все";

/// Shown instead of a missing category name
pub const FALLBACK_CATEGORY: &str = "другое";

/// Incoming request in the serverless event encoding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default = "default_method")]
    pub http_method: String,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ApiRequest {
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(key))
            .map(String::as_str)
    }

    /// Decode the body; an absent body reads as `{}`
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let raw = self.body.as_deref().unwrap_or("{}");
        Ok(serde_json::from_str(raw)?)
    }

    /// The `category` filter, or `None` when it is absent, empty or the all sentinel
    pub fn category_filter(&self) -> Option<&str> {
        self.query("category")
            .filter(|category| !category.is_empty() && *category != ALL_CATEGORIES)
    }
}

/// Outgoing response in the serverless event encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ApiResponse {
    fn json(status: StatusCode, body: String) -> Self {
        let headers = BTreeMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        ]);

        Self {
            status_code: status.as_u16(),
            headers,
            body,
            is_base64_encoded: false,
        }
    }

    fn error(err: &ApiError) -> Self {
        let body = serde_json::json!({ "error": err.to_string() }).to_string();
        Self::json(err.status(), body)
    }

    fn preflight(resource: &Resource) -> Self {
        let headers = BTreeMap::from([
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            (
                "Access-Control-Allow-Methods".to_string(),
                resource.allow_methods.to_string(),
            ),
            (
                "Access-Control-Allow-Headers".to_string(),
                resource.allow_headers.to_string(),
            ),
            ("Access-Control-Max-Age".to_string(), "86400".to_string()),
        ]);

        Self {
            status_code: StatusCode::OK.as_u16(),
            headers,
            body: String::new(),
            is_base64_encoded: false,
        }
    }
}

#[cfg(test)]
impl ApiRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            http_method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query_string_parameters
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[cfg(test)]
impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// A successful handler result before it is wrapped in the envelope.
pub struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    pub fn new<T: Serialize>(status: StatusCode, body: &T) -> ApiResult<Self> {
        Ok(Self {
            status,
            body: serde_json::to_string(body)?,
        })
    }
}

/// Acknowledgement of a created row; `id` is the raw generated key.
#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i32,
    pub message: &'static str,
}

/// CORS profile of one endpoint.
pub struct Resource {
    pub name: &'static str,
    pub allow_methods: &'static str,
    pub allow_headers: &'static str,
}

/// Shared state of the three handlers.
#[derive(Clone)]
pub struct ApiHandler {
    repo: Arc<Repo>,
    query_timeout: Duration,
}

impl ApiHandler {
    pub fn new(repo: Arc<Repo>, query_timeout: Duration) -> Self {
        Self {
            repo,
            query_timeout,
        }
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// Answer pre-flight without touching the store, run `route` under the
    /// query timeout otherwise, and wrap the outcome in the envelope.
    async fn respond<F, Fut>(
        &self,
        resource: &Resource,
        request: &ApiRequest,
        route: F,
    ) -> ApiResponse
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<Reply>>,
    {
        let method = request.http_method.as_str();
        debug!(resource = resource.name, method, "Handling request");

        if method == "OPTIONS" {
            return ApiResponse::preflight(resource);
        }

        let outcome = match tokio::time::timeout(self.query_timeout, route()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::Timeout(self.query_timeout.as_secs())),
        };

        match outcome {
            Ok(reply) => ApiResponse::json(reply.status, reply.body),
            Err(err) => {
                if err.status().is_server_error() {
                    error!(resource = resource.name, method, "Request failed: {}", err);
                } else {
                    info!(resource = resource.name, method, "Request rejected: {}", err);
                }
                ApiResponse::error(&err)
            }
        }
    }
}

/// A required text field: present and non-empty
pub(crate) fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// ISO-8601 without a zone; the fraction is printed only when non-zero.
pub(crate) fn iso_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() / 1_000 == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
