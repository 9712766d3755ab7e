use sea_orm::sea_query::{ColumnDef, Expr, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{channels, subscriptions};
use nem_push_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let channels_table = Table::create()
        .table(channels::Entity)
        .col(
            ColumnDef::new(channels::Column::ChannelId)
                .string_len(128)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(channels::Column::WebhookUrl).text().not_null())
        .col(
            ColumnDef::new(channels::Column::RegisteredAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, channels_table).await?;

    let subscriptions_table = Table::create()
        .table(subscriptions::Entity)
        .col(
            ColumnDef::new(subscriptions::Column::ChannelId)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(subscriptions::Column::Address)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(subscriptions::Column::Name)
                .string()
                .not_null()
                .default(""),
        )
        .col(
            ColumnDef::new(subscriptions::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .primary_key(
            Index::create()
                .col(subscriptions::Column::ChannelId)
                .col(subscriptions::Column::Address),
        )
        .to_owned();
    create_table(db, backend, subscriptions_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
