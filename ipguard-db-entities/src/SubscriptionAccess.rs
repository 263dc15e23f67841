use chrono::{DateTime, Utc};
use poem_openapi::Object;
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

/// Unique on `(subscription_id, ip)`. Rows are never aged out, only reset by an operator.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Object)]
#[sea_orm(table_name = "subscription_accesses")]
#[oai(rename = "SubscriptionAccess")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub ip: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    pub country: Option<String>,
    pub access_count: i64,
    pub first_access_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
