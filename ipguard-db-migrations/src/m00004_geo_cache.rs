use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub mod geo_cache_entry {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "geo_cache")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub ip: String,
        pub country: Option<String>,
        pub country_code: Option<String>,
        pub region: Option<String>,
        pub city: Option<String>,
        pub lat: Option<f64>,
        pub lon: Option<f64>,
        pub isp: Option<String>,
        pub cached_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00004_geo_cache"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let builder = manager.get_database_backend();
        let schema = Schema::new(builder);

        manager
            .create_table(schema.create_table_from_entity(geo_cache_entry::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(geo_cache_entry::Entity)
                    .name("idx_geo_cache_cached_at")
                    .col(Alias::new("cached_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(geo_cache_entry::Entity).to_owned())
            .await?;
        Ok(())
    }
}
