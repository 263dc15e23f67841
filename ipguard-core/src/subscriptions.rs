use std::net::IpAddr;

use chrono::Utc;
use ipguard_common::{EffectiveLimit, IpGuardError};
use ipguard_db_entities::SubscriptionAccess;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::*;
use uuid::Uuid;

use crate::geo::GeoResolver;
use crate::partition_lock::{PartitionLocks, PartitionScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionAdmission {
    pub allowed: bool,
    pub remaining_slots: Option<u32>,
    /// IPs that already used the link, oldest first. Only filled in on denial.
    pub known_ips: Vec<String>,
}

/// Caps the number of distinct IPs that may ever fetch a subscription link,
/// until an operator resets its history
#[derive(Clone)]
pub struct SubscriptionLinkLimiter {
    db: DatabaseConnection,
    locks: PartitionLocks,
    geo: GeoResolver,
}

impl SubscriptionLinkLimiter {
    pub fn new(db: DatabaseConnection, locks: PartitionLocks, geo: GeoResolver) -> Self {
        Self { db, locks, geo }
    }

    /// Unlimited links skip the quota but their accesses are still recorded
    pub async fn admit(
        &self,
        subscription_id: Uuid,
        ip: IpAddr,
        user_agent: &str,
        limit: EffectiveLimit,
    ) -> Result<SubscriptionAdmission, IpGuardError> {
        let now = Utc::now();
        let ip_str = ip.to_string();

        let txn = self
            .locks
            .begin(
                &self.db,
                PartitionScope::Subscription,
                &subscription_id.to_string(),
            )
            .await?;

        let known = SubscriptionAccess::Entity::find()
            .filter(SubscriptionAccess::Column::SubscriptionId.eq(subscription_id))
            .order_by_asc(SubscriptionAccess::Column::FirstAccessAt)
            .all(&*txn)
            .await?;
        let known_count = u32::try_from(known.len()).unwrap_or(u32::MAX);
        let remaining = |used: u32| match limit {
            EffectiveLimit::Unlimited => None,
            EffectiveLimit::Max(max) => Some(max.saturating_sub(used)),
        };

        if let Some(existing) = known.iter().find(|a| a.ip == ip_str) {
            SubscriptionAccess::Entity::update_many()
                .col_expr(
                    SubscriptionAccess::Column::AccessCount,
                    Expr::col(SubscriptionAccess::Column::AccessCount).add(1),
                )
                .col_expr(SubscriptionAccess::Column::LastAccessAt, Expr::value(now))
                .col_expr(
                    SubscriptionAccess::Column::UserAgent,
                    Expr::value(user_agent.to_owned()),
                )
                .filter(SubscriptionAccess::Column::Id.eq(existing.id))
                .exec(&*txn)
                .await?;
            let needs_geo = existing.country.is_none();
            txn.commit().await?;
            if needs_geo {
                self.enrich_country(subscription_id, ip);
            }
            debug!(%subscription_id, ip = %ip_str, "Repeat subscription access");
            return Ok(SubscriptionAdmission {
                allowed: true,
                remaining_slots: remaining(known_count),
                known_ips: vec![],
            });
        }

        let has_room = match limit {
            EffectiveLimit::Unlimited => true,
            EffectiveLimit::Max(max) => known_count < max,
        };

        if !has_room {
            txn.commit().await?;
            info!(%subscription_id, ip = %ip_str, "Subscription IP limit reached");
            return Ok(SubscriptionAdmission {
                allowed: false,
                remaining_slots: Some(0),
                known_ips: known.into_iter().map(|a| a.ip).collect(),
            });
        }

        SubscriptionAccess::ActiveModel {
            id: Set(Uuid::new_v4()),
            subscription_id: Set(subscription_id),
            ip: Set(ip_str.clone()),
            user_agent: Set(user_agent.to_owned()),
            country: Set(None),
            access_count: Set(1),
            first_access_at: Set(now),
            last_access_at: Set(now),
        }
        .insert(&*txn)
        .await?;
        txn.commit().await?;

        self.enrich_country(subscription_id, ip);
        debug!(%subscription_id, ip = %ip_str, "New subscription IP");
        Ok(SubscriptionAdmission {
            allowed: true,
            remaining_slots: remaining(known_count.saturating_add(1)),
            known_ips: vec![],
        })
    }

    /// Attaches the country in a detached task so admission never waits for geolocation
    fn enrich_country(&self, subscription_id: Uuid, ip: IpAddr) {
        let geo = self.geo.clone();
        let db = self.db.clone();
        tokio::spawn(async move {
            let info = geo.resolve(ip).await;
            let Some(country) = info.country else {
                return;
            };
            if let Err(error) = SubscriptionAccess::Entity::update_many()
                .col_expr(SubscriptionAccess::Column::Country, Expr::value(country))
                .filter(SubscriptionAccess::Column::SubscriptionId.eq(subscription_id))
                .filter(SubscriptionAccess::Column::Ip.eq(ip.to_string()))
                .exec(&db)
                .await
            {
                warn!(%subscription_id, %ip, %error, "Failed to store subscription access country");
            }
        });
    }

    /// Every IP that used the link, oldest first
    pub async fn list_accesses(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionAccess::Model>, DbErr> {
        SubscriptionAccess::Entity::find()
            .filter(SubscriptionAccess::Column::SubscriptionId.eq(subscription_id))
            .order_by_asc(SubscriptionAccess::Column::FirstAccessAt)
            .all(&self.db)
            .await
    }

    pub async fn reset(&self, subscription_id: Uuid) -> Result<u64, DbErr> {
        let txn = self
            .locks
            .begin(
                &self.db,
                PartitionScope::Subscription,
                &subscription_id.to_string(),
            )
            .await?;
        let result = SubscriptionAccess::Entity::delete_many()
            .filter(SubscriptionAccess::Column::SubscriptionId.eq(subscription_id))
            .exec(&*txn)
            .await?;
        txn.commit().await?;
        info!(%subscription_id, removed = result.rows_affected, "Subscription access history reset");
        Ok(result.rows_affected)
    }
}
