use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipguard_common::AutoBanConfig;
use ipguard_db_entities::FailedAttempt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use tracing::*;
use uuid::Uuid;

use crate::db::delete_in_batches;
use crate::SharedConfig;

/// Records failed authentications per IP and decides when an IP crossed the ban threshold
#[derive(Clone)]
pub struct FailedAttemptTracker {
    db: DatabaseConnection,
    config: SharedConfig,
}

impl FailedAttemptTracker {
    pub fn new(db: DatabaseConnection, config: SharedConfig) -> Self {
        Self { db, config }
    }

    pub async fn record_failure(&self, ip: IpAddr, reason: &str) -> Result<(), DbErr> {
        FailedAttempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            ip: Set(ip.to_string()),
            reason: Set(reason.to_owned()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        debug!(%ip, reason, "Recorded failed attempt");
        Ok(())
    }

    /// Whether the attempts inside the rolling window reached the threshold
    pub async fn should_auto_ban(&self, ip: IpAddr) -> Result<bool, DbErr> {
        let config = self.config.read().await.store.auto_ban.clone();
        if !config.enabled {
            return Ok(false);
        }
        let count = self.count_recent(ip).await?;
        Ok(count >= u64::from(config.max_attempts.max(1)))
    }

    /// Attempts from `ip` inside the configured window
    pub async fn count_recent(&self, ip: IpAddr) -> Result<u64, DbErr> {
        let time_window = self.config.read().await.store.auto_ban.time_window;
        Self::count_since(&self.db, ip, window_start(Utc::now(), time_window)).await
    }

    pub async fn count_since<C: ConnectionTrait>(
        conn: &C,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        FailedAttempt::Entity::find()
            .filter(FailedAttempt::Column::Ip.eq(ip.to_string()))
            .filter(FailedAttempt::Column::CreatedAt.gte(since))
            .count(conn)
            .await
    }

    pub async fn count_all_since(&self, since: DateTime<Utc>) -> Result<u64, DbErr> {
        FailedAttempt::Entity::find()
            .filter(FailedAttempt::Column::CreatedAt.gte(since))
            .count(&self.db)
            .await
    }

    /// Forgets every attempt from `ip`, e.g. after a successful login
    pub async fn clear<C: ConnectionTrait>(conn: &C, ip: IpAddr) -> Result<u64, DbErr> {
        let result = FailedAttempt::Entity::delete_many()
            .filter(FailedAttempt::Column::Ip.eq(ip.to_string()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Newest first, optionally narrowed to one IP
    pub fn attempts_query(&self, ip: Option<IpAddr>) -> sea_orm::Select<FailedAttempt::Entity> {
        let mut query =
            FailedAttempt::Entity::find().order_by_desc(FailedAttempt::Column::CreatedAt);
        if let Some(ip) = ip {
            query = query.filter(FailedAttempt::Column::Ip.eq(ip.to_string()));
        }
        query
    }

    pub async fn sweep_old(&self, batch_size: u64) -> Result<u64, DbErr> {
        let retention = self.config.read().await.store.auto_ban.retention;
        let cutoff = window_start(Utc::now(), retention);
        let removed = delete_in_batches!(
            &self.db,
            FailedAttempt,
            Id: Uuid,
            batch_size,
            FailedAttempt::Column::CreatedAt.lt(cutoff)
        );
        Ok(removed)
    }
}

pub(crate) fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Ban duration with exponential backoff.
/// Formula: base * multiplier^(offense_count - 1), capped at max
pub fn calculate_ban_duration(offense_count: u32, config: &AutoBanConfig) -> Duration {
    let base_secs = config.ban_duration.as_secs();
    let max_secs = config.max_ban_duration.as_secs();

    if offense_count == 0 {
        return Duration::from_secs(std::cmp::min(base_secs, max_secs));
    }

    let factor = config
        .duration_multiplier
        .powi(offense_count.saturating_sub(1).min(i32::MAX as u32) as i32);
    let duration_secs = (base_secs as f64 * factor as f64) as u64;

    Duration::from_secs(std::cmp::min(duration_secs, max_secs))
}
