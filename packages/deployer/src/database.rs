use std::time::Duration;

use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use tracing::info;

use crate::entity::patch;

/// Opens the connection pool and brings the schema up to date.
///
/// The returned handle is owned by the caller and passed explicitly to every
/// service function.
pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    prepare_schema(&db).await?;

    Ok(db)
}

/// Syncs entity tables and creates the unique indexes backing the
/// one-patch-per-file-per-owner rule.
pub async fn prepare_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.get_schema_registry("deployer::entity::*")
        .sync(db)
        .await?;

    ensure_unique_index(
        db,
        Index::create()
            .if_not_exists()
            .unique()
            .name("patch_filepath_application_unique")
            .table(patch::Entity)
            .col(patch::Column::FilePath)
            .col(patch::Column::ApplicationId)
            .to_owned(),
    )
    .await?;

    ensure_unique_index(
        db,
        Index::create()
            .if_not_exists()
            .unique()
            .name("patch_filepath_compose_unique")
            .table(patch::Entity)
            .col(patch::Column::FilePath)
            .col(patch::Column::ComposeId)
            .to_owned(),
    )
    .await
}

async fn ensure_unique_index(
    db: &DatabaseConnection,
    stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    let sql = match db.get_database_backend() {
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(PostgresQueryBuilder),
    };
    db.execute_unprepared(&sql).await?;
    info!(sql = %sql, "Ensured unique index exists");
    Ok(())
}
