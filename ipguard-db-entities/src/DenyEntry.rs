use chrono::{DateTime, Utc};
use poem_openapi::Object;
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::ListScope;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Object)]
#[sea_orm(table_name = "ip_deny_entries")]
#[oai(rename = "DenyEntry")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Canonical single address or network in CIDR notation
    pub ip_or_cidr: String,

    pub is_range: bool,

    pub scope: ListScope,

    pub user_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub reason: String,

    pub created_by: String,

    /// None = permanent. An entry past its expiry is ignored during evaluation.
    pub expires_at: Option<DateTime<Utc>>,

    /// Created by the failed-attempt loop rather than an operator
    pub automatic: bool,

    /// Number of consecutive automatic bans, drives the ban duration backoff
    pub offense_count: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e > now).unwrap_or(true)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
