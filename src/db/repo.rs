use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};

use super::entities::{categories, chat_messages, communities, events};

/// A community row joined with its category name.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct CommunityListing {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub members_count: Option<i32>,
}

/// An event row joined with its category name.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct EventListing {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub participants_count: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub location: Option<String>,
}

/// Every statement runs in autocommit mode; a lookup followed by an insert is
/// two independent round trips.
pub struct Repo {
    db: DatabaseConnection,
}

impl Repo {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await.context("Database ping failed")
    }

    // ==================== Chat ====================

    /// The `limit` newest messages, newest first
    pub async fn recent_messages(&self, limit: u64) -> Result<Vec<chat_messages::Model>, DbErr> {
        chat_messages::Entity::find()
            .order_by_desc(chat_messages::Column::CreatedAt)
            .order_by_desc(chat_messages::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn add_message(
        &self,
        username: &str,
        message: &str,
    ) -> Result<chat_messages::Model, DbErr> {
        let now = Local::now().naive_local();

        let new_message = chat_messages::ActiveModel {
            username: Set(Some(username.to_string())),
            message: Set(message.to_string()),
            created_at: Set(Some(now)),
            ..Default::default()
        };

        new_message.insert(&self.db).await
    }

    // ==================== Categories ====================

    /// Resolve a category name to its id; unknown names yield `None`
    pub async fn find_category_id(&self, name: &str) -> Result<Option<i32>, DbErr> {
        let category = categories::Entity::find()
            .filter(categories::Column::Name.eq(name))
            .one(&self.db)
            .await?;

        Ok(category.map(|c| c.id))
    }

    // ==================== Communities ====================

    /// Communities by popularity, optionally restricted to one category name
    pub async fn list_communities(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CommunityListing>, DbErr> {
        let mut query = communities::Entity::find()
            .select_only()
            .columns([
                communities::Column::Id,
                communities::Column::Name,
                communities::Column::Description,
                communities::Column::MembersCount,
            ])
            .column_as(categories::Column::Name, "category")
            .join(JoinType::LeftJoin, communities::Relation::Category.def());

        if let Some(name) = category {
            query = query.filter(categories::Column::Name.eq(name));
        }

        query
            .order_by_desc(communities::Column::MembersCount)
            .into_model::<CommunityListing>()
            .all(&self.db)
            .await
    }

    /// Insert a community with a single member; returns the generated id
    pub async fn create_community(
        &self,
        name: &str,
        description: Option<String>,
        category_id: Option<i32>,
    ) -> Result<i32, DbErr> {
        let new_community = communities::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description),
            category_id: Set(category_id),
            members_count: Set(Some(1)),
            ..Default::default()
        };

        let result = communities::Entity::insert(new_community)
            .exec(&self.db)
            .await?;

        Ok(result.last_insert_id)
    }

    // ==================== Events ====================

    /// Events soonest first, optionally restricted to one category name
    pub async fn list_events(&self, category: Option<&str>) -> Result<Vec<EventListing>, DbErr> {
        let mut query = events::Entity::find()
            .select_only()
            .columns([
                events::Column::Id,
                events::Column::Title,
                events::Column::Description,
                events::Column::EventDate,
                events::Column::EventTime,
                events::Column::Location,
                events::Column::ParticipantsCount,
            ])
            .column_as(categories::Column::Name, "category")
            .join(JoinType::LeftJoin, events::Relation::Category.def());

        if let Some(name) = category {
            query = query.filter(categories::Column::Name.eq(name));
        }

        query
            .order_by_asc(events::Column::EventDate)
            .into_model::<EventListing>()
            .all(&self.db)
            .await
    }

    /// Insert an event; `participants_count` is left to the column default
    pub async fn create_event(&self, event: NewEvent) -> Result<i32, DbErr> {
        let new_event = events::ActiveModel {
            title: Set(event.title),
            description: Set(event.description),
            category_id: Set(event.category_id),
            event_date: Set(Some(event.event_date)),
            event_time: Set(Some(event.event_time)),
            location: Set(event.location),
            ..Default::default()
        };

        let result = events::Entity::insert(new_event).exec(&self.db).await?;

        Ok(result.last_insert_id)
    }
}
