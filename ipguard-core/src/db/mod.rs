use std::time::Duration;

use anyhow::Result;
use ipguard_common::helpers::fs::secure_file;
use ipguard_common::IpGuardConfig;
use ipguard_db_migrations::migrate_database;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, TransactionTrait};
use tracing::*;

pub async fn connect_to_db(config: &IpGuardConfig) -> Result<DatabaseConnection> {
    let mut url = url::Url::parse(&config.store.database_url.expose_secret()[..])?;
    if url.scheme() == "sqlite" {
        let path = url.path();
        let mut abs_path = config.paths_relative_to.clone();
        abs_path.push(path);
        abs_path.push("db.sqlite3");

        if let Some(parent) = abs_path.parent() {
            std::fs::create_dir_all(parent)?
        }

        url.set_path(
            abs_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Failed to convert database path to string"))?,
        );

        url.set_query(Some("mode=rwc"));

        let db = Database::connect(ConnectOptions::new(url.to_string())).await?;
        db.begin().await?.commit().await?;
        drop(db);

        secure_file(&abs_path)?;
        debug!(path = %abs_path.display(), "Using SQLite database");
    }

    let mut opt = ConnectOptions::new(url.to_string());
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(false);

    let connection = Database::connect(opt).await?;

    migrate_database(&connection).await?;
    Ok(connection)
}

/// Deletes rows matching a filter in chunks of at most `batch_size`, so that
/// maintenance never holds a long-running lock on a hot table.
///
/// `$pk` names the entity's single primary key column.
macro_rules! delete_in_batches {
    ($db:expr, $entity:ident, $pk:ident: $key:ty, $batch_size:expr, $filter:expr) => {{
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect};

        let batch_size: u64 = std::cmp::max($batch_size, 1);
        let mut removed: u64 = 0;
        loop {
            let ids: Vec<$key> = $entity::Entity::find()
                .select_only()
                .column($entity::Column::$pk)
                .filter($filter)
                .limit(batch_size)
                .into_tuple()
                .all($db)
                .await?;
            if ids.is_empty() {
                break;
            }
            let fetched = ids.len() as u64;
            let result = $entity::Entity::delete_many()
                .filter($entity::Column::$pk.is_in(ids))
                .exec($db)
                .await?;
            removed += result.rows_affected;
            if fetched < batch_size {
                break;
            }
        }
        removed
    }};
}

pub(crate) use delete_in_batches;
