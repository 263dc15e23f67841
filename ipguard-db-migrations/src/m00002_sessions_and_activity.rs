use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub mod active_session {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "active_sessions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub ip: String,
        #[sea_orm(column_type = "Text")]
        pub user_agent: String,
        pub device_type: String,
        pub country: Option<String>,
        pub city: Option<String>,
        pub last_active_at: DateTime<Utc>,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod activity_record {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "activity_records")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub ip: String,
        #[sea_orm(column_type = "Text")]
        pub user_agent: String,
        #[sea_orm(column_type = "String(StringLen::N(16))")]
        pub access_type: String,
        pub country: Option<String>,
        pub city: Option<String>,
        pub is_suspicious: bool,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00002_sessions_and_activity"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let builder = manager.get_database_backend();
        let schema = Schema::new(builder);

        manager
            .create_table(schema.create_table_from_entity(active_session::Entity))
            .await?;

        // One row per (user, IP), upserts rely on it
        manager
            .create_index(
                Index::create()
                    .table(active_session::Entity)
                    .name("idx_active_sessions_user_id_ip")
                    .col(Alias::new("user_id"))
                    .col(Alias::new("ip"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(active_session::Entity)
                    .name("idx_active_sessions_user_id_last_active_at")
                    .col(Alias::new("user_id"))
                    .col(Alias::new("last_active_at"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(schema.create_table_from_entity(activity_record::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(activity_record::Entity)
                    .name("idx_activity_records_user_id_created_at")
                    .col(Alias::new("user_id"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(activity_record::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(active_session::Entity).to_owned())
            .await?;
        Ok(())
    }
}
