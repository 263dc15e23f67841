mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use ipguard_common::ConcurrencyLimit;
use ipguard_core::access_lists::NewAllowEntry;
use ipguard_core::geo::NoopGeoProvider;
use ipguard_core::{DenialCode, Services};
use ipguard_db_entities::{AccessType, ActiveSession, ActivityRecord, ListScope};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

async fn session_rows(services: &Services, user_id: Uuid) -> Vec<ActiveSession::Model> {
    ActiveSession::Entity::find()
        .filter(ActiveSession::Column::UserId.eq(user_id))
        .all(&services.db)
        .await
        .unwrap()
}

async fn admit(services: &Services, user_id: Uuid, addr: &str) {
    let decision = services
        .access
        .check_access(user_id, ip(addr), AccessType::Api, ConcurrencyLimit::Limited(5))
        .await
        .unwrap();
    assert!(decision.allowed, "{addr} should be admitted");
}

#[tokio::test]
async fn test_quota_admits_n_then_denies_the_next_new_ip() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(3);

    for (n, addr) in ["198.51.100.1", "198.51.100.2", "198.51.100.3"]
        .iter()
        .enumerate()
    {
        let decision = services
            .access
            .check_access(user, ip(addr), AccessType::Api, limit)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_slots, Some(2 - n as u32));
    }

    let decision = services
        .access
        .check_access(user, ip("198.51.100.4"), AccessType::Api, limit)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.code, Some(DenialCode::ConcurrentIpLimit));
    assert_eq!(decision.remaining_slots, Some(0));
    assert_eq!(
        decision.online_ips,
        vec!["198.51.100.1", "198.51.100.2", "198.51.100.3"]
    );

    // A repeat from an active IP is a renewal, not a new slot
    for addr in ["198.51.100.1", "198.51.100.3"] {
        let decision = services
            .access
            .check_access(user, ip(addr), AccessType::Portal, limit)
            .await
            .unwrap();
        assert!(decision.allowed, "{addr} should be renewed");
        assert_eq!(decision.remaining_slots, Some(0));
    }
    assert_eq!(session_rows(&services, user).await.len(), 3);
}

#[tokio::test]
async fn test_example_abc_d() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(3);
    for addr in ["203.0.113.10", "203.0.113.11", "203.0.113.12"] {
        assert!(services
            .access
            .check_access(user, ip(addr), AccessType::Api, limit)
            .await
            .unwrap()
            .allowed);
    }

    let d = services
        .access
        .check_access(user, ip("203.0.113.13"), AccessType::Api, limit)
        .await
        .unwrap();
    assert!(!d.allowed);
    assert_eq!(d.remaining_slots, Some(0));
    assert_eq!(
        d.online_ips,
        vec!["203.0.113.10", "203.0.113.11", "203.0.113.12"]
    );

    let a = services
        .access
        .check_access(user, ip("203.0.113.10"), AccessType::Api, limit)
        .await
        .unwrap();
    assert!(a.allowed);
}

#[tokio::test]
async fn test_unlimited_sentinel_bypasses_the_store() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    for i in 0..20 {
        let decision = services
            .access
            .check_access(
                user,
                ip(&format!("192.0.2.{i}")),
                AccessType::Api,
                ConcurrencyLimit::from_raw(-1),
            )
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_slots, None);
    }
    assert!(session_rows(&services, user).await.is_empty());
}

#[tokio::test]
async fn test_plan_default_of_zero_is_unlimited() {
    let mut config = test_config();
    config.store.sessions.default_max_concurrent_ips = 0;
    let services = services(config).await;
    let user = Uuid::new_v4();
    for i in 0..10 {
        assert!(services
            .access
            .check_access(
                user,
                ip(&format!("192.0.2.{i}")),
                AccessType::Api,
                ConcurrencyLimit::PlanDefault
            )
            .await
            .unwrap()
            .allowed);
    }
}

#[tokio::test]
async fn test_plan_quota_source_overrides_config_default() {
    let generous = Uuid::new_v4();
    let defaulted = Uuid::new_v4();
    let services = Services::with_geo_provider(
        test_db().await,
        test_config(),
        Arc::new(NoopGeoProvider),
        Arc::new(FixedPlanQuotas {
            per_user: HashMap::from([(generous, 5)]),
        }),
    );

    let admitted = |user: Uuid| {
        let services = services.clone();
        async move {
            let mut admitted = 0;
            for i in 0..8 {
                if services
                    .access
                    .check_access(
                        user,
                        ip(&format!("192.0.2.{i}")),
                        AccessType::Api,
                        ConcurrencyLimit::PlanDefault,
                    )
                    .await
                    .unwrap()
                    .allowed
                {
                    admitted += 1;
                }
            }
            admitted
        }
    };

    assert_eq!(admitted(generous).await, 5);
    // configured default is 3
    assert_eq!(admitted(defaulted).await, 3);
}

#[tokio::test]
async fn test_explicit_override_wins_over_plan_default() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    for i in 0..5 {
        assert!(services
            .access
            .check_access(
                user,
                ip(&format!("192.0.2.{i}")),
                AccessType::Api,
                ConcurrencyLimit::from_raw(5)
            )
            .await
            .unwrap()
            .allowed);
    }
}

#[tokio::test]
async fn test_stale_ip_frees_its_slot() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(1);

    assert!(services
        .access
        .check_access(user, ip("198.51.100.1"), AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);
    assert!(!services
        .access
        .check_access(user, ip("198.51.100.2"), AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);

    // Idle for longer than the activity window
    ActiveSession::Entity::update_many()
        .col_expr(
            ActiveSession::Column::LastActiveAt,
            Expr::value(Utc::now() - chrono::Duration::hours(2)),
        )
        .filter(ActiveSession::Column::UserId.eq(user))
        .exec(&services.db)
        .await
        .unwrap();

    assert!(services
        .access
        .check_access(user, ip("198.51.100.2"), AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);
    let rows = session_rows(&services, user).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip, "198.51.100.2");
}

#[tokio::test]
async fn test_users_do_not_share_quota() {
    let services = services(test_config()).await;
    let limit = ConcurrencyLimit::Limited(1);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    assert!(services
        .access
        .check_access(alice, ip("198.51.100.1"), AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);
    assert!(services
        .access
        .check_access(bob, ip("198.51.100.1"), AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);
    assert!(services
        .access
        .check_access(bob, ip("198.51.100.2"), AccessType::Api, limit)
        .await
        .unwrap()
        .code
        .is_some());
}

#[tokio::test]
async fn test_disconnect_frees_slots() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(2);
    for addr in ["198.51.100.1", "198.51.100.2"] {
        services
            .access
            .check_access(user, ip(addr), AccessType::Api, limit)
            .await
            .unwrap();
    }

    let removed = services
        .access
        .sessions
        .disconnect(user, Some(ip("198.51.100.1")))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let online = services.access.sessions.list_online(user).await.unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].ip, "198.51.100.2");

    assert_eq!(services.access.sessions.disconnect(user, None).await.unwrap(), 1);
    assert!(services.access.sessions.list_online(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_activity_keeps_one_session_row() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let addr = ip("198.51.100.7");
    admit(&services, user, "198.51.100.7").await;

    services
        .access
        .record_activity(user, addr, "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", AccessType::Portal)
        .await
        .unwrap();
    let first = session_rows(&services, user).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].device_type, "mobile");

    tokio::time::sleep(Duration::from_millis(20)).await;
    services
        .access
        .record_activity(user, addr, "Mozilla/5.0 (Windows NT 10.0; Win64; x64)", AccessType::Api)
        .await
        .unwrap();
    let second = session_rows(&services, user).await;
    assert_eq!(second.len(), 1);
    assert!(second[0].last_active_at > first[0].last_active_at);
    assert_eq!(second[0].created_at, first[0].created_at);
    assert_eq!(second[0].device_type, "desktop");

    let records = ActivityRecord::Entity::find()
        .filter(ActivityRecord::Column::UserId.eq(user))
        .count(&services.db)
        .await
        .unwrap();
    assert_eq!(records, 2);
}

#[tokio::test]
async fn test_record_activity_flags_country_change() {
    let geo = Arc::new(StaticGeoProvider::new(&[
        ("198.51.100.1", "Germany"),
        ("198.51.100.2", "Germany"),
        ("203.0.113.9", "Brazil"),
    ]));
    let services = services_with_geo(test_config(), geo).await;
    let user = Uuid::new_v4();
    for addr in ["198.51.100.1", "198.51.100.2", "203.0.113.9"] {
        admit(&services, user, addr).await;
    }

    let first = services
        .access
        .record_activity(user, ip("198.51.100.1"), "curl/8.0", AccessType::Api)
        .await
        .unwrap();
    assert!(!first.is_suspicious);
    assert_eq!(first.country.as_deref(), Some("Germany"));

    let same_country = services
        .access
        .record_activity(user, ip("198.51.100.2"), "curl/8.0", AccessType::Api)
        .await
        .unwrap();
    assert!(!same_country.is_suspicious);

    let elsewhere = services
        .access
        .record_activity(user, ip("203.0.113.9"), "curl/8.0", AccessType::Api)
        .await
        .unwrap();
    assert!(elsewhere.is_suspicious);
}

#[tokio::test]
async fn test_record_activity_survives_geo_failure() {
    let geo = Arc::new(StaticGeoProvider::new(&[]));
    let services = services_with_geo(test_config(), geo).await;
    let user = Uuid::new_v4();
    admit(&services, user, "198.51.100.1").await;
    let record = services
        .access
        .record_activity(user, ip("198.51.100.1"), "", AccessType::Subscription)
        .await
        .unwrap();
    assert_eq!(record.country, None);
    assert!(!record.is_suspicious);
    assert_eq!(session_rows(&services, user).await[0].device_type, "unknown");
}

#[tokio::test]
async fn test_admission_then_activity_shares_the_row() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let addr = ip("198.51.100.20");
    services
        .access
        .check_access(user, addr, AccessType::Api, ConcurrencyLimit::Limited(2))
        .await
        .unwrap();
    services
        .access
        .record_activity(user, addr, "Mozilla/5.0 (Macintosh)", AccessType::Api)
        .await
        .unwrap();
    let rows = session_rows(&services, user).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_agent, "Mozilla/5.0 (Macintosh)");
}

#[tokio::test]
async fn test_allow_listed_activity_takes_no_slot() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(1);
    services
        .access
        .lists
        .add_allow_entry(NewAllowEntry {
            ip_or_cidr: "198.51.100.10".into(),
            scope: ListScope::User,
            user_id: Some(user),
            description: "office".into(),
            created_by: "admin".into(),
        })
        .await
        .unwrap();

    let trusted = ip("198.51.100.10");
    assert!(services
        .access
        .check_access(user, trusted, AccessType::Api, limit)
        .await
        .unwrap()
        .allowed);
    services
        .access
        .record_activity(user, trusted, "curl/8.0", AccessType::Api)
        .await
        .unwrap();
    assert!(session_rows(&services, user).await.is_empty());

    let decision = services
        .access
        .check_access(user, ip("198.51.100.20"), AccessType::Api, limit)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining_slots, Some(0));

    let rows = session_rows(&services, user).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip, "198.51.100.20");
}

#[tokio::test]
async fn test_activity_without_admission_creates_no_session() {
    let services = services(test_config()).await;
    let user = Uuid::new_v4();
    let record = services
        .access
        .record_activity(user, ip("198.51.100.30"), "curl/8.0", AccessType::Api)
        .await
        .unwrap();
    assert_eq!(record.ip, "198.51.100.30");
    assert!(session_rows(&services, user).await.is_empty());
}
