use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipguard_common::{EffectiveLimit, IpGuardError};
use ipguard_db_entities::ActiveSession;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::*;
use uuid::Uuid;

use crate::db::delete_in_batches;
use crate::failed_attempts::window_start;
use crate::geo::GeoInfo;
use crate::partition_lock::{PartitionLocks, PartitionScope};
use crate::SharedConfig;

pub const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAdmission {
    pub allowed: bool,
    /// `None` when the user has no limit
    pub remaining_slots: Option<u32>,
    /// Live IPs of the user, oldest first. Only filled in on denial.
    pub online_ips: Vec<String>,
}

/// Fields refreshed on a user's session row by an admitted request
#[derive(Debug, Clone)]
pub struct SessionTouch<'a> {
    pub user_agent: &'a str,
    pub device_type: &'a str,
    pub geo: &'a GeoInfo,
}

/// Caps the number of distinct IPs a user may have active within the activity window
#[derive(Clone)]
pub struct ConcurrentSessionLimiter {
    db: DatabaseConnection,
    config: SharedConfig,
    locks: PartitionLocks,
}

impl ConcurrentSessionLimiter {
    pub fn new(db: DatabaseConnection, config: SharedConfig, locks: PartitionLocks) -> Self {
        Self { db, config, locks }
    }

    async fn live_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = self.config.read().await.store.sessions.activity_window;
        window_start(now, window)
    }

    pub async fn admit(
        &self,
        user_id: Uuid,
        ip: IpAddr,
        limit: EffectiveLimit,
    ) -> Result<SessionAdmission, IpGuardError> {
        let max = match limit {
            EffectiveLimit::Unlimited => {
                return Ok(SessionAdmission {
                    allowed: true,
                    remaining_slots: None,
                    online_ips: vec![],
                })
            }
            EffectiveLimit::Max(max) => max,
        };

        let now = Utc::now();
        let cutoff = self.live_cutoff(now).await;
        let ip = ip.to_string();

        let txn = self
            .locks
            .begin(&self.db, PartitionScope::User, &user_id.to_string())
            .await?;

        ActiveSession::Entity::delete_many()
            .filter(ActiveSession::Column::UserId.eq(user_id))
            .filter(ActiveSession::Column::LastActiveAt.lt(cutoff))
            .exec(&*txn)
            .await?;

        let live = ActiveSession::Entity::find()
            .filter(ActiveSession::Column::UserId.eq(user_id))
            .order_by_asc(ActiveSession::Column::CreatedAt)
            .all(&*txn)
            .await?;
        let live_count = u32::try_from(live.len()).unwrap_or(u32::MAX);

        if live.iter().any(|s| s.ip == ip) {
            Self::upsert_admitted(&*txn, user_id, &ip, now).await?;
            txn.commit().await?;
            debug!(%user_id, %ip, "Renewed active IP");
            return Ok(SessionAdmission {
                allowed: true,
                remaining_slots: Some(max.saturating_sub(live_count)),
                online_ips: vec![],
            });
        }

        if live_count < max {
            Self::upsert_admitted(&*txn, user_id, &ip, now).await?;
            txn.commit().await?;
            debug!(%user_id, %ip, live = live_count + 1, max, "Admitted new IP");
            return Ok(SessionAdmission {
                allowed: true,
                remaining_slots: Some(max - live_count - 1),
                online_ips: vec![],
            });
        }

        txn.commit().await?;
        info!(%user_id, %ip, max, "Concurrent IP limit reached");
        Ok(SessionAdmission {
            allowed: false,
            remaining_slots: Some(0),
            online_ips: live.into_iter().map(|s| s.ip).collect(),
        })
    }

    async fn upsert_admitted<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        ActiveSession::Entity::insert(ActiveSession::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            ip: Set(ip.to_owned()),
            user_agent: Set(String::new()),
            device_type: Set(UNKNOWN_DEVICE.to_owned()),
            country: Set(None),
            city: Set(None),
            last_active_at: Set(now),
            created_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([ActiveSession::Column::UserId, ActiveSession::Column::Ip])
                .update_column(ActiveSession::Column::LastActiveAt)
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
        Ok(())
    }

    /// Refreshes the row [Self::admit] created for `(user_id, ip)`. Addresses admitted
    /// without taking a slot (allow-listed, unlimited) have no row and stay uncounted.
    /// Geo fields are only overwritten when the lookup produced them.
    pub async fn touch(
        &self,
        user_id: Uuid,
        ip: IpAddr,
        touch: SessionTouch<'_>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let mut update = ActiveSession::Entity::update_many()
            .col_expr(ActiveSession::Column::LastActiveAt, Expr::value(now))
            .col_expr(
                ActiveSession::Column::UserAgent,
                Expr::value(touch.user_agent.to_owned()),
            )
            .col_expr(
                ActiveSession::Column::DeviceType,
                Expr::value(touch.device_type.to_owned()),
            );
        if let Some(country) = &touch.geo.country {
            update = update.col_expr(ActiveSession::Column::Country, Expr::value(country.clone()));
        }
        if let Some(city) = &touch.geo.city {
            update = update.col_expr(ActiveSession::Column::City, Expr::value(city.clone()));
        }

        let result = update
            .filter(ActiveSession::Column::UserId.eq(user_id))
            .filter(ActiveSession::Column::Ip.eq(ip.to_string()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Live sessions of a user, oldest first
    pub async fn list_online(&self, user_id: Uuid) -> Result<Vec<ActiveSession::Model>, DbErr> {
        let cutoff = self.live_cutoff(Utc::now()).await;
        ActiveSession::Entity::find()
            .filter(ActiveSession::Column::UserId.eq(user_id))
            .filter(ActiveSession::Column::LastActiveAt.gte(cutoff))
            .order_by_asc(ActiveSession::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// Frees the slot held by `ip`, or every slot of the user when `ip` is `None`
    pub async fn disconnect(&self, user_id: Uuid, ip: Option<IpAddr>) -> Result<u64, DbErr> {
        let txn = self
            .locks
            .begin(&self.db, PartitionScope::User, &user_id.to_string())
            .await?;
        let mut query =
            ActiveSession::Entity::delete_many().filter(ActiveSession::Column::UserId.eq(user_id));
        if let Some(ip) = ip {
            query = query.filter(ActiveSession::Column::Ip.eq(ip.to_string()));
        }
        let result = query.exec(&*txn).await?;
        txn.commit().await?;
        info!(%user_id, ip = ?ip, removed = result.rows_affected, "Disconnected sessions");
        Ok(result.rows_affected)
    }

    pub async fn count_live(&self) -> Result<u64, DbErr> {
        let cutoff = self.live_cutoff(Utc::now()).await;
        ActiveSession::Entity::find()
            .filter(ActiveSession::Column::LastActiveAt.gte(cutoff))
            .count(&self.db)
            .await
    }

    /// Countries of the user's other live sessions
    pub async fn other_live_countries(
        &self,
        user_id: Uuid,
        ip: IpAddr,
    ) -> Result<Vec<String>, DbErr> {
        let cutoff = self.live_cutoff(Utc::now()).await;
        let countries: Vec<Option<String>> = ActiveSession::Entity::find()
            .select_only()
            .column(ActiveSession::Column::Country)
            .filter(ActiveSession::Column::UserId.eq(user_id))
            .filter(ActiveSession::Column::Ip.ne(ip.to_string()))
            .filter(ActiveSession::Column::LastActiveAt.gte(cutoff))
            .filter(ActiveSession::Column::Country.is_not_null())
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(countries.into_iter().flatten().collect())
    }

    pub async fn sweep_stale(&self, batch_size: u64) -> Result<u64, DbErr> {
        let cutoff = self.live_cutoff(Utc::now()).await;
        let removed = delete_in_batches!(
            &self.db,
            ActiveSession,
            Id: Uuid,
            batch_size,
            ActiveSession::Column::LastActiveAt.lt(cutoff)
        );
        Ok(removed)
    }
}
