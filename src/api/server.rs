//! Local HTTP adapter: mounts the three handlers on an axum router.

use super::{ApiHandler, ApiRequest, ApiResponse};
use crate::error::{ApiError, ApiResult};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

pub fn router(handler: ApiHandler) -> Router {
    Router::new()
        .route("/chat", any(chat_endpoint))
        .route("/communities", any(communities_endpoint))
        .route("/events", any(events_endpoint))
        .route("/health", get(health_endpoint))
        .with_state(handler)
}

pub async fn serve(handler: ApiHandler, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await
        .context("Server error")
}

type QueryParams = Result<Query<HashMap<String, String>>, QueryRejection>;
type RawBody = Result<Bytes, BytesRejection>;

impl ApiRequest {
    fn from_http(method: Method, query: HashMap<String, String>, body: Bytes) -> ApiResult<Self> {
        let body = String::from_utf8(body.to_vec()).map_err(|e| ApiError::invalid("body", e))?;

        Ok(Self {
            http_method: method.as_str().to_string(),
            query_string_parameters: (!query.is_empty()).then_some(query),
            body: (!body.is_empty()).then_some(body),
        })
    }
}

/// Turn extractor output into a request. Rejections become envelope errors
/// so they still carry the CORS headers.
fn decode_request(method: Method, query: QueryParams, body: RawBody) -> ApiResult<ApiRequest> {
    let Query(query) = query.map_err(|e| ApiError::invalid("query string", e.body_text()))?;
    let body = body.map_err(|e| ApiError::invalid("body", e.body_text()))?;
    ApiRequest::from_http(method, query, body)
}

fn rejected(endpoint: &str, err: &ApiError) -> ApiResponse {
    warn!(endpoint, "Unreadable request: {}", err);
    ApiResponse::error(err)
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let ApiResponse {
            status_code,
            headers,
            body,
            ..
        } = self;

        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, body).into_response();

        let response_headers = response.headers_mut();
        response_headers.remove(header::CONTENT_TYPE);
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    response_headers.insert(name, value);
                }
                _ => warn!("Dropping invalid response header {}", name),
            }
        }

        response
    }
}

async fn chat_endpoint(
    State(handler): State<ApiHandler>,
    method: Method,
    query: QueryParams,
    body: RawBody,
) -> ApiResponse {
    match decode_request(method, query, body) {
        Ok(request) => handler.handle_chat(&request).await,
        Err(err) => rejected("chat", &err),
    }
}

async fn communities_endpoint(
    State(handler): State<ApiHandler>,
    method: Method,
    query: QueryParams,
    body: RawBody,
) -> ApiResponse {
    match decode_request(method, query, body) {
        Ok(request) => handler.handle_communities(&request).await,
        Err(err) => rejected("communities", &err),
    }
}

async fn events_endpoint(
    State(handler): State<ApiHandler>,
    method: Method,
    query: QueryParams,
    body: RawBody,
) -> ApiResponse {
    match decode_request(method, query, body) {
        Ok(request) => handler.handle_events(&request).await,
        Err(err) => rejected("events", &err),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_endpoint(State(handler): State<ApiHandler>) -> (StatusCode, Json<HealthResponse>) {
    match handler.repo().ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "healthy" })),
        Err(e) => {
            warn!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                }),
            )
        }
    }
}
