mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use common::*;
use ipguard_common::ConcurrencyLimit;
use ipguard_core::access_lists::ListEvaluator;
use ipguard_db_entities::{AccessType, ActiveSession, DenyEntry, FailedAttempt, GeoCacheEntry};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

#[tokio::test]
async fn test_sweep_removes_stale_rows_in_batches() {
    let mut config = test_config();
    config.store.maintenance.batch_size = 2;
    let services = services(config).await;
    let user = Uuid::new_v4();

    for i in 0..5 {
        services
            .access
            .check_access(
                user,
                ip(&format!("192.0.2.{i}")),
                AccessType::Api,
                ConcurrencyLimit::Limited(10),
            )
            .await
            .unwrap();
    }
    services
        .access
        .check_access(user, ip("192.0.2.200"), AccessType::Api, ConcurrencyLimit::Limited(10))
        .await
        .unwrap();

    ActiveSession::Entity::update_many()
        .col_expr(
            ActiveSession::Column::LastActiveAt,
            Expr::value(Utc::now() - chrono::Duration::hours(3)),
        )
        .filter(ActiveSession::Column::Ip.ne("192.0.2.200"))
        .exec(&services.db)
        .await
        .unwrap();

    let stats = services.access.sweep().await.unwrap();
    assert_eq!(stats.stale_sessions_removed, 5);
    assert_eq!(
        ActiveSession::Entity::find().count(&services.db).await.unwrap(),
        1
    );

    let again = services.access.sweep().await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_sweep_keeps_recent_bans_for_escalation() {
    let services = services(test_config()).await;
    let config = services.config.read().await.store.auto_ban.clone();

    let mut ids = vec![];
    for (addr, ended_hours_ago) in [("203.0.113.1", 1), ("203.0.113.2", 30)] {
        let ban =
            ListEvaluator::ensure_automatic_deny(&services.db, ip(addr), &config, Utc::now())
                .await
                .unwrap();
        DenyEntry::Entity::update_many()
            .col_expr(
                DenyEntry::Column::ExpiresAt,
                Expr::value(Some(Utc::now() - chrono::Duration::hours(ended_hours_ago))),
            )
            .filter(DenyEntry::Column::Id.eq(ban.id))
            .exec(&services.db)
            .await
            .unwrap();
        ids.push(ban.id);
    }

    let stats = services.access.sweep().await.unwrap();
    assert_eq!(stats.expired_bans_removed, 1);
    let left = DenyEntry::Entity::find().all(&services.db).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, ids[0]);
}

#[tokio::test]
async fn test_sweep_drops_attempts_beyond_retention() {
    let services = services(test_config()).await;
    for _ in 0..3 {
        services
            .access
            .failures
            .record_failure(ip("203.0.113.9"), "bad_password")
            .await
            .unwrap();
    }
    FailedAttempt::Entity::update_many()
        .col_expr(
            FailedAttempt::Column::CreatedAt,
            Expr::value(Utc::now() - chrono::Duration::days(8)),
        )
        .exec(&services.db)
        .await
        .unwrap();
    services
        .access
        .failures
        .record_failure(ip("203.0.113.9"), "bad_password")
        .await
        .unwrap();

    let stats = services.access.sweep().await.unwrap();
    assert_eq!(stats.old_attempts_removed, 3);
    assert_eq!(
        FailedAttempt::Entity::find().count(&services.db).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_geo_cache_ttl() {
    let provider = Arc::new(StaticGeoProvider::new(&[("8.8.8.8", "United States")]));
    let services = services_with_geo(test_config(), provider.clone()).await;
    let geo = &services.access.geo;

    assert_eq!(
        geo.resolve(ip("8.8.8.8")).await.country.as_deref(),
        Some("United States")
    );
    assert_eq!(
        geo.resolve(ip("8.8.8.8")).await.country.as_deref(),
        Some("United States")
    );
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);

    // Past the TTL the row is a miss and gets refreshed
    GeoCacheEntry::Entity::update_many()
        .col_expr(
            GeoCacheEntry::Column::CachedAt,
            Expr::value(Utc::now() - chrono::Duration::days(8)),
        )
        .exec(&services.db)
        .await
        .unwrap();
    geo.resolve(ip("8.8.8.8")).await;
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);

    GeoCacheEntry::Entity::update_many()
        .col_expr(
            GeoCacheEntry::Column::CachedAt,
            Expr::value(Utc::now() - chrono::Duration::days(8)),
        )
        .exec(&services.db)
        .await
        .unwrap();
    let stats = services.access.sweep().await.unwrap();
    assert_eq!(stats.geo_cache_removed, 1);
}

#[tokio::test]
async fn test_geo_skips_private_addresses_and_failures() {
    let provider = Arc::new(StaticGeoProvider::new(&[]));
    let services = services_with_geo(test_config(), provider.clone()).await;
    let geo = &services.access.geo;

    let local = geo.resolve(ip("192.168.1.10")).await;
    assert_eq!(local.country.as_deref(), Some("Local Network"));

    let unknown = geo.resolve(ip("1.1.1.1")).await;
    assert!(unknown.is_empty());
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(
        GeoCacheEntry::Entity::find().count(&services.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_security_status() {
    let services = services(test_config()).await;
    let config = services.config.read().await.store.auto_ban.clone();
    ListEvaluator::ensure_automatic_deny(&services.db, ip("203.0.113.5"), &config, Utc::now())
        .await
        .unwrap();
    services
        .access
        .failures
        .record_failure(ip("203.0.113.6"), "bad_password")
        .await
        .unwrap();
    services
        .access
        .check_access(
            Uuid::new_v4(),
            ip("192.0.2.1"),
            AccessType::Api,
            ConcurrencyLimit::Limited(2),
        )
        .await
        .unwrap();

    let status = services.access.security_status().await.unwrap();
    assert_eq!(status.active_auto_bans, 1);
    assert_eq!(status.active_deny_entries, 0);
    assert_eq!(status.live_sessions, 1);
    assert_eq!(status.failed_attempts_last_hour, 1);
    assert_eq!(status.failed_attempts_last_24h, 1);
}
