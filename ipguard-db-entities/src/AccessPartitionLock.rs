use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// One row per partition (user, subscription or IP) that admission
/// transactions lock to serialize their count-then-insert step
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "access_partition_locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub scope: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub partition_key: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
