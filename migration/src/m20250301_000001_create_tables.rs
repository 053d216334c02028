use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Shared lookup table for communities and events
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Categories::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChatMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatMessages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChatMessages::Username).string())
                    .col(ColumnDef::new(ChatMessages::Message).text().not_null())
                    .col(
                        ColumnDef::new(ChatMessages::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // The feed is always read newest-first
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chat_messages_created_at")
                    .table(ChatMessages::Table)
                    .col(ChatMessages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Communities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Communities::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Communities::Name).string().not_null())
                    .col(ColumnDef::new(Communities::Description).text())
                    .col(ColumnDef::new(Communities::CategoryId).integer())
                    .col(
                        ColumnDef::new(Communities::MembersCount)
                            .integer()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_communities_category_id")
                            .from(Communities::Table, Communities::CategoryId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::Title).string().not_null())
                    .col(ColumnDef::new(Events::Description).text())
                    .col(ColumnDef::new(Events::CategoryId).integer())
                    .col(ColumnDef::new(Events::EventDate).date())
                    .col(ColumnDef::new(Events::EventTime).time())
                    .col(ColumnDef::new(Events::Location).string())
                    .col(
                        ColumnDef::new(Events::ParticipantsCount)
                            .integer()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_category_id")
                            .from(Events::Table, Events::CategoryId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_event_date")
                    .table(Events::Table)
                    .col(Events::EventDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Communities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChatMessages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum ChatMessages {
    Table,
    Id,
    Username,
    Message,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Communities {
    Table,
    Id,
    Name,
    Description,
    CategoryId,
    MembersCount,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    Title,
    Description,
    CategoryId,
    EventDate,
    EventTime,
    Location,
    ParticipantsCount,
}
