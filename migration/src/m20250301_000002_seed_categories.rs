use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Categories offered by the app's filter bar.
const CATEGORY_NAMES: [&str; 6] = [
    "спорт",
    "творчество",
    "образование",
    "развлечения",
    "музыка",
    "технологии",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut insert = Query::insert();
        insert
            .into_table(Categories::Table)
            .columns([Categories::Name])
            .on_conflict(OnConflict::column(Categories::Name).do_nothing().to_owned());

        for name in CATEGORY_NAMES {
            insert.values_panic([name.into()]);
        }

        manager.exec_stmt(insert).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete = Query::delete()
            .from_table(Categories::Table)
            .and_where(Expr::col(Categories::Name).is_in(CATEGORY_NAMES))
            .to_owned();

        manager.exec_stmt(delete).await
    }
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Name,
}
