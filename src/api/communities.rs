use super::{
    required, ApiHandler, ApiRequest, ApiResponse, Created, Reply, Resource, FALLBACK_CATEGORY,
};
use crate::db::repo::CommunityListing;
use crate::error::{ApiError, ApiResult};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

const COMMUNITIES: Resource = Resource {
    name: "communities",
    allow_methods: "GET, POST, OPTIONS",
    allow_headers: "Content-Type, X-User-Id",
};

#[derive(Debug, Serialize)]
struct CommunityView {
    id: String,
    name: String,
    description: Option<String>,
    category: String,
    members: i32,
}

impl From<CommunityListing> for CommunityView {
    fn from(row: CommunityListing) -> Self {
        Self {
            id: row.id.to_string(),
            name: row.name,
            description: row.description,
            category: row
                .category
                .unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
            members: row.members_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
struct CommunityDirectory {
    communities: Vec<CommunityView>,
}

#[derive(Debug, Deserialize)]
struct NewCommunity {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl ApiHandler {
    pub async fn handle_communities(&self, request: &ApiRequest) -> ApiResponse {
        self.respond(&COMMUNITIES, request, move || async move {
            match request.http_method.as_str() {
                "GET" => self.list_communities(request).await,
                "POST" => self.create_community(request).await,
                _ => Err(ApiError::MethodNotAllowed),
            }
        })
        .await
    }

    async fn list_communities(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let rows = self
            .repo
            .list_communities(request.category_filter())
            .await?;

        let communities = rows.into_iter().map(CommunityView::from).collect();
        Reply::new(StatusCode::OK, &CommunityDirectory { communities })
    }

    async fn create_community(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let body: NewCommunity = request.json()?;

        let (Some(name), Some(category)) = (required(&body.name), required(&body.category))
        else {
            return Err(ApiError::Validation("Missing required fields"));
        };

        // Unknown names still create the community, just without a category
        let category_id = self.repo.find_category_id(category).await?;
        let id = self
            .repo
            .create_community(name, body.description, category_id)
            .await?;

        Reply::new(
            StatusCode::CREATED,
            &Created {
                id,
                message: "Community created",
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{assert_cors, disconnected_handler, schemaless_handler, test_handler};
    use crate::api::ALL_CATEGORIES;
    use crate::db::entities::communities;
    use crate::db::repo::tests::{insert_bare_community, insert_community_with_members};
    use sea_orm::EntityTrait;
    use serde_json::json;

    fn names(response: &ApiResponse) -> Vec<String> {
        response.json_body()["communities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_preflight_advertises_implemented_methods() {
        let handler = disconnected_handler();

        let response = handler
            .handle_communities(&ApiRequest::new("OPTIONS"))
            .await;

        assert_eq!(response.status_code, 200);
        assert!(response.body.is_empty());
        assert_cors(&response);
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            response.header("Access-Control-Allow-Headers"),
            Some("Content-Type, X-User-Id")
        );
    }

    #[tokio::test]
    async fn test_list_orders_by_members_and_filters() {
        let (handler, db) = test_handler().await;
        let sport = handler.repo().find_category_id("спорт").await.unwrap();
        let music = handler.repo().find_category_id("музыка").await.unwrap();
        insert_community_with_members(&db, "Runners", sport, 5).await;
        insert_community_with_members(&db, "Choir", music, 40).await;
        insert_community_with_members(&db, "Climbers", sport, 12).await;

        let all = handler.handle_communities(&ApiRequest::new("GET")).await;
        assert_eq!(all.status_code, 200);
        assert_cors(&all);
        assert_eq!(names(&all), vec!["Choir", "Climbers", "Runners"]);

        let sentinel = handler
            .handle_communities(&ApiRequest::new("GET").with_query("category", ALL_CATEGORIES))
            .await;
        assert_eq!(sentinel.json_body(), all.json_body());

        let sport_only = handler
            .handle_communities(&ApiRequest::new("GET").with_query("category", "спорт"))
            .await;
        assert_eq!(names(&sport_only), vec!["Climbers", "Runners"]);

        let unknown = handler
            .handle_communities(&ApiRequest::new("GET").with_query("category", "вязание"))
            .await;
        assert_eq!(unknown.json_body(), json!({ "communities": [] }));
    }

    #[tokio::test]
    async fn test_list_fills_in_missing_columns() {
        let (handler, db) = test_handler().await;
        let id = insert_bare_community(&db, "Drifters").await;

        let response = handler.handle_communities(&ApiRequest::new("GET")).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.json_body(),
            json!({
                "communities": [{
                    "id": id.to_string(),
                    "name": "Drifters",
                    "description": null,
                    "category": FALLBACK_CATEGORY,
                    "members": 0
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_create_and_list_shape() {
        let (handler, _db) = test_handler().await;

        let response = handler
            .handle_communities(&ApiRequest::new("POST").with_body(
                r#"{"name": "Book club", "description": "Monthly reads", "category": "образование"}"#,
            ))
            .await;

        assert_eq!(response.status_code, 201);
        let created = response.json_body();
        assert_eq!(created["message"], "Community created");
        assert!(created["id"].is_number());

        let listed = handler.handle_communities(&ApiRequest::new("GET")).await;
        let id = created["id"].as_i64().unwrap().to_string();
        assert_eq!(
            listed.json_body(),
            json!({
                "communities": [{
                    "id": id,
                    "name": "Book club",
                    "description": "Monthly reads",
                    "category": "образование",
                    "members": 1
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_create_with_unknown_category_leaves_orphan() {
        let (handler, db) = test_handler().await;

        let response = handler
            .handle_communities(
                &ApiRequest::new("POST").with_body(r#"{"name": "Knitters", "category": "вязание"}"#),
            )
            .await;

        assert_eq!(response.status_code, 201);
        let id = response.json_body()["id"].as_i64().unwrap() as i32;

        let stored = communities::Entity::find_by_id(id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.category_id, None);
        assert_eq!(stored.description, None);
        assert_eq!(stored.members_count, Some(1));

        let listed = handler.handle_communities(&ApiRequest::new("GET")).await;
        assert_eq!(
            listed.json_body()["communities"][0]["category"],
            FALLBACK_CATEGORY
        );
    }

    #[tokio::test]
    async fn test_create_requires_name_and_category() {
        let (handler, _db) = test_handler().await;

        for body in [
            r#"{"category": "спорт"}"#,
            r#"{"name": "Runners"}"#,
            r#"{"name": "", "category": "спорт"}"#,
            r#"{}"#,
        ] {
            let response = handler
                .handle_communities(&ApiRequest::new("POST").with_body(body))
                .await;
            assert_eq!(response.status_code, 400, "body: {}", body);
            assert_eq!(
                response.json_body(),
                json!({ "error": "Missing required fields" })
            );
            assert_cors(&response);
        }

        let listed = handler.handle_communities(&ApiRequest::new("GET")).await;
        assert_eq!(listed.json_body(), json!({ "communities": [] }));
    }

    #[tokio::test]
    async fn test_put_is_not_allowed() {
        let handler = disconnected_handler();

        let response = handler.handle_communities(&ApiRequest::new("PUT")).await;

        assert_eq!(response.status_code, 405);
        assert_eq!(response.json_body(), json!({ "error": "Method not allowed" }));
        assert_cors(&response);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let handler = schemaless_handler().await;

        let response = handler
            .handle_communities(
                &ApiRequest::new("POST").with_body(r#"{"name": "Runners", "category": "спорт"}"#),
            )
            .await;

        assert_eq!(response.status_code, 500);
        assert!(response.json_body()["error"]
            .as_str()
            .unwrap()
            .contains("categories"));
        assert_cors(&response);
    }
}
