use chrono::{DateTime, Utc};
use poem_openapi::{Enum, Object};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Serialize, Clone, Copy, Enum, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[oai(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    #[sea_orm(string_value = "api")]
    Api,
    #[sea_orm(string_value = "portal")]
    Portal,
    #[sea_orm(string_value = "subscription")]
    Subscription,
}

/// Append-only audit trail of admitted requests
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Object)]
#[sea_orm(table_name = "activity_records")]
#[oai(rename = "ActivityRecord")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    pub access_type: AccessType,
    pub country: Option<String>,
    pub city: Option<String>,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
