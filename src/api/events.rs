use super::{
    required, ApiHandler, ApiRequest, ApiResponse, Created, Reply, Resource, FALLBACK_CATEGORY,
};
use crate::db::repo::{EventListing, NewEvent};
use crate::error::{ApiError, ApiResult};
use axum::http::StatusCode;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

const EVENTS: Resource = Resource {
    name: "events",
    allow_methods: "GET, POST, OPTIONS",
    allow_headers: "Content-Type, X-User-Id",
};

#[derive(Debug, Serialize)]
struct EventView {
    id: String,
    title: String,
    description: Option<String>,
    category: String,
    date: String,
    time: String,
    location: String,
    participants: i32,
}

impl From<EventListing> for EventView {
    fn from(row: EventListing) -> Self {
        Self {
            id: row.id.to_string(),
            title: row.title,
            description: row.description,
            category: row
                .category
                .unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
            // "05 March"
            date: row
                .event_date
                .map(|date| date.format("%d %B").to_string())
                .unwrap_or_default(),
            time: row
                .event_time
                .map(|time| time.format("%H:%M").to_string())
                .unwrap_or_default(),
            location: row.location.unwrap_or_default(),
            participants: row.participants_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventDirectory {
    events: Vec<EventView>,
}

#[derive(Debug, Deserialize)]
struct NewEventBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    event_date: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

impl ApiHandler {
    pub async fn handle_events(&self, request: &ApiRequest) -> ApiResponse {
        self.respond(&EVENTS, request, move || async move {
            match request.http_method.as_str() {
                "GET" => self.list_events(request).await,
                "POST" => self.create_event(request).await,
                _ => Err(ApiError::MethodNotAllowed),
            }
        })
        .await
    }

    async fn list_events(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let rows = self.repo.list_events(request.category_filter()).await?;

        let events = rows.into_iter().map(EventView::from).collect();
        Reply::new(StatusCode::OK, &EventDirectory { events })
    }

    async fn create_event(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let body: NewEventBody = request.json()?;

        let (Some(title), Some(category), Some(event_date), Some(event_time)) = (
            required(&body.title),
            required(&body.category),
            required(&body.event_date),
            required(&body.event_time),
        ) else {
            return Err(ApiError::Validation("Missing required fields"));
        };

        let event_date = parse_event_date(event_date)?;
        let event_time = parse_event_time(event_time)?;

        let category_id = self.repo.find_category_id(category).await?;
        let id = self
            .repo
            .create_event(NewEvent {
                title: title.to_string(),
                description: body.description,
                category_id,
                event_date,
                event_time,
                location: body.location,
            })
            .await?;

        Reply::new(
            StatusCode::CREATED,
            &Created {
                id,
                message: "Event created",
            },
        )
    }
}

fn parse_event_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| ApiError::invalid("event_date", e))
}

/// Accepts `HH:MM` and `HH:MM:SS`
fn parse_event_time(raw: &str) -> ApiResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| ApiError::invalid("event_time", e))
}
