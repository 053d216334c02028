use super::{iso_timestamp, required, ApiHandler, ApiRequest, ApiResponse, Reply, Resource};
use crate::error::{ApiError, ApiResult};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Author name for messages posted without one
pub const GUEST_USERNAME: &str = "Гость";

const DEFAULT_LIMIT: i64 = 50;

const CHAT: Resource = Resource {
    name: "chat",
    allow_methods: "GET, POST, OPTIONS",
    allow_headers: "Content-Type, X-Username",
};

#[derive(Debug, Serialize)]
struct MessageView {
    id: String,
    username: Option<String>,
    message: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct MessageFeed {
    messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
struct NewMessage {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Echo of a stored message. Unlike the feed, `id` stays numeric.
#[derive(Debug, Serialize)]
struct PostedMessage {
    id: i32,
    username: String,
    message: String,
    timestamp: String,
}

impl ApiHandler {
    pub async fn handle_chat(&self, request: &ApiRequest) -> ApiResponse {
        self.respond(&CHAT, request, move || async move {
            match request.http_method.as_str() {
                "GET" => self.list_messages(request).await,
                "POST" => self.post_message(request).await,
                _ => Err(ApiError::MethodNotAllowed),
            }
        })
        .await
    }

    /// Newest `limit` messages, returned oldest first
    async fn list_messages(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let limit = parse_limit(request)?;

        let mut rows = self.repo.recent_messages(limit).await?;
        rows.reverse();

        let messages = rows
            .into_iter()
            .map(|row| MessageView {
                id: row.id.to_string(),
                username: row.username,
                message: row.message,
                timestamp: row
                    .created_at
                    .as_ref()
                    .map(iso_timestamp)
                    .unwrap_or_default(),
            })
            .collect();

        Reply::new(StatusCode::OK, &MessageFeed { messages })
    }

    async fn post_message(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let body: NewMessage = request.json()?;

        let message = body.message.as_deref().unwrap_or_default().trim();
        if message.is_empty() {
            return Err(ApiError::Validation("Message cannot be empty"));
        }
        let username = required(&body.username).unwrap_or(GUEST_USERNAME);

        let row = self.repo.add_message(username, message).await?;

        Reply::new(
            StatusCode::CREATED,
            &PostedMessage {
                id: row.id,
                username: username.to_string(),
                message: row.message,
                timestamp: row
                    .created_at
                    .as_ref()
                    .map(iso_timestamp)
                    .unwrap_or_default(),
            },
        )
    }
}

fn parse_limit(request: &ApiRequest) -> ApiResult<u64> {
    let limit = match request.query("limit") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|e| ApiError::invalid("limit", e))?,
        None => DEFAULT_LIMIT,
    };

    u64::try_from(limit).map_err(|_| ApiError::invalid("limit", "LIMIT must not be negative"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{assert_cors, disconnected_handler, schemaless_handler, test_handler};
    use crate::db::repo::tests::{at, insert_message_at, insert_undated_message};
    use chrono::NaiveDateTime;
    use serde_json::json;

    #[tokio::test]
    async fn test_preflight_skips_database() {
        let handler = disconnected_handler();

        let response = handler.handle_chat(&ApiRequest::new("OPTIONS")).await;

        assert_eq!(response.status_code, 200);
        assert!(response.body.is_empty());
        assert_cors(&response);
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            response.header("Access-Control-Allow-Headers"),
            Some("Content-Type, X-Username")
        );
        assert_eq!(response.header("Access-Control-Max-Age"), Some("86400"));
    }

    #[tokio::test]
    async fn test_list_empty_feed() {
        let (handler, _db) = test_handler().await;

        let response = handler.handle_chat(&ApiRequest::new("GET")).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.json_body(), json!({ "messages": [] }));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_cors(&response);
    }

    #[tokio::test]
    async fn test_list_returns_newest_window_in_chronological_order() {
        let (handler, db) = test_handler().await;
        insert_message_at(&db, "a", "one", at("2025-03-01 10:00:00")).await;
        insert_message_at(&db, "b", "four", at("2025-03-01 13:00:00")).await;
        insert_message_at(&db, "c", "two", at("2025-03-01 11:00:00")).await;
        insert_message_at(&db, "d", "three", at("2025-03-01 12:00:00")).await;

        let response = handler
            .handle_chat(&ApiRequest::new("GET").with_query("limit", "3"))
            .await;

        assert_eq!(response.status_code, 200);
        let body = response.json_body();
        let messages = body["messages"].as_array().unwrap();
        let texts: Vec<_> = messages
            .iter()
            .map(|m| m["message"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["two", "three", "four"]);
        assert_eq!(messages[0]["timestamp"], "2025-03-01T11:00:00");
        assert_eq!(messages[0]["username"], "c");
        assert!(messages[0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_list_missing_timestamp_is_empty_string() {
        let (handler, db) = test_handler().await;
        let stored = insert_undated_message(&db, "from nowhere").await;

        let response = handler.handle_chat(&ApiRequest::new("GET")).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.json_body(),
            json!({
                "messages": [{
                    "id": stored.id.to_string(),
                    "username": null,
                    "message": "from nowhere",
                    "timestamp": ""
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_list_defaults_to_fifty() {
        let (handler, _db) = test_handler().await;
        for i in 0..55 {
            handler
                .repo()
                .add_message("bulk", &format!("message {}", i))
                .await
                .unwrap();
        }

        let response = handler.handle_chat(&ApiRequest::new("GET")).await;

        let body = response.json_body();
        assert_eq!(body["messages"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_limit() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_chat(&ApiRequest::new("GET").with_query("limit", "ten"))
            .await;
        assert_eq!(response.status_code, 500);
        assert!(response.json_body()["error"]
            .as_str()
            .unwrap()
            .contains("limit"));
        assert_cors(&response);

        let response = handler
            .handle_chat(&ApiRequest::new("GET").with_query("limit", "-1"))
            .await;
        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_post_message() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_chat(
                &ApiRequest::new("POST").with_body(r#"{"username": "Ann", "message": "hi"}"#),
            )
            .await;

        assert_eq!(response.status_code, 201);
        assert_cors(&response);
        let body = response.json_body();
        assert_eq!(body["username"], "Ann");
        assert_eq!(body["message"], "hi");
        assert!(body["id"].is_number());
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(timestamp.parse::<NaiveDateTime>().is_ok());
    }

    #[tokio::test]
    async fn test_post_trims_and_defaults_username() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_chat(&ApiRequest::new("POST").with_body(r#"{"message": "  hello  "}"#))
            .await;
        assert_eq!(response.status_code, 201);
        let body = response.json_body();
        assert_eq!(body["message"], "hello");
        assert_eq!(body["username"], GUEST_USERNAME);

        let response = handler
            .handle_chat(
                &ApiRequest::new("POST").with_body(r#"{"username": "", "message": "again"}"#),
            )
            .await;
        assert_eq!(response.json_body()["username"], GUEST_USERNAME);
    }

    #[tokio::test]
    async fn test_post_blank_message_is_rejected_without_insert() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_chat(
                &ApiRequest::new("POST").with_body(r#"{"username": "Ann", "message": "   "}"#),
            )
            .await;

        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.json_body(),
            json!({ "error": "Message cannot be empty" })
        );
        assert_cors(&response);

        let feed = handler.handle_chat(&ApiRequest::new("GET")).await;
        assert_eq!(feed.json_body(), json!({ "messages": [] }));
    }

    #[tokio::test]
    async fn test_post_without_body_is_rejected() {
        let (handler, _db) = test_handler().await;

        let response = handler.handle_chat(&ApiRequest::new("POST")).await;
        assert_eq!(response.status_code, 400);

        // An explicit null reads the same as a missing field
        let response = handler
            .handle_chat(&ApiRequest::new("POST").with_body(r#"{"message": null}"#))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.json_body(),
            json!({ "error": "Message cannot be empty" })
        );
    }

    #[tokio::test]
    async fn test_post_malformed_body_is_server_error() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_chat(&ApiRequest::new("POST").with_body("message=hi"))
            .await;

        assert_eq!(response.status_code, 500);
        assert!(response.json_body()["error"].is_string());
        assert_cors(&response);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let handler = disconnected_handler();

        let response = handler.handle_chat(&ApiRequest::new("DELETE")).await;

        assert_eq!(response.status_code, 405);
        assert_eq!(response.json_body(), json!({ "error": "Method not allowed" }));
        assert_cors(&response);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let handler = schemaless_handler().await;

        let response = handler.handle_chat(&ApiRequest::new("GET")).await;

        assert_eq!(response.status_code, 500);
        assert!(response.json_body()["error"]
            .as_str()
            .unwrap()
            .contains("chat_messages"));
        assert_cors(&response);
    }
}
