use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;
use sea_orm_migration::MigrationTrait;

mod m00001_access_lists;
mod m00002_sessions_and_activity;
mod m00003_subscription_access;
mod m00004_geo_cache;
mod m00005_failed_attempts;
mod m00006_partition_locks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m00001_access_lists::Migration),
            Box::new(m00002_sessions_and_activity::Migration),
            Box::new(m00003_subscription_access::Migration),
            Box::new(m00004_geo_cache::Migration),
            Box::new(m00005_failed_attempts::Migration),
            Box::new(m00006_partition_locks::Migration),
        ]
    }
}

pub async fn migrate_database(connection: &DatabaseConnection) -> Result<(), DbErr> {
    Migrator::up(connection, None).await
}
