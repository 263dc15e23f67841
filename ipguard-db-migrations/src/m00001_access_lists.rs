use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub mod allow_entry {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "ip_allow_entries")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub ip_or_cidr: String,
        pub is_range: bool,
        #[sea_orm(column_type = "String(StringLen::N(16))")]
        pub scope: String,
        pub user_id: Option<Uuid>,
        #[sea_orm(column_type = "Text")]
        pub description: String,
        pub created_by: String,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod deny_entry {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "ip_deny_entries")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub ip_or_cidr: String,
        pub is_range: bool,
        #[sea_orm(column_type = "String(StringLen::N(16))")]
        pub scope: String,
        pub user_id: Option<Uuid>,
        #[sea_orm(column_type = "Text")]
        pub reason: String,
        pub created_by: String,
        pub expires_at: Option<DateTime<Utc>>,
        pub automatic: bool,
        pub offense_count: i32,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00001_access_lists"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let builder = manager.get_database_backend();
        let schema = Schema::new(builder);

        manager
            .create_table(schema.create_table_from_entity(allow_entry::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(allow_entry::Entity)
                    .name("idx_ip_allow_entries_ip_or_cidr")
                    .col(Alias::new("ip_or_cidr"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(schema.create_table_from_entity(deny_entry::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(deny_entry::Entity)
                    .name("idx_ip_deny_entries_ip_or_cidr")
                    .col(Alias::new("ip_or_cidr"))
                    .to_owned(),
            )
            .await?;

        // Sweeps look up expired automatic bans
        manager
            .create_index(
                Index::create()
                    .table(deny_entry::Entity)
                    .name("idx_ip_deny_entries_automatic_expires_at")
                    .col(Alias::new("automatic"))
                    .col(Alias::new("expires_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(deny_entry::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(allow_entry::Entity).to_owned())
            .await?;
        Ok(())
    }
}
