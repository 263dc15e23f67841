use chrono::{DateTime, Utc};
use poem_openapi::{Enum, Object};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Serialize, Clone, Copy, Enum, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[oai(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListScope {
    #[sea_orm(string_value = "global")]
    Global,
    #[sea_orm(string_value = "user")]
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Object)]
#[sea_orm(table_name = "ip_allow_entries")]
#[oai(rename = "AllowEntry")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Canonical single address or network in CIDR notation
    pub ip_or_cidr: String,

    /// True when `ip_or_cidr` is a network wider than a single host
    pub is_range: bool,

    pub scope: ListScope,

    /// Set if and only if `scope` is `user`
    pub user_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub created_by: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
