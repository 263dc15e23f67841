mod common;

use common::*;
use ipguard_common::ConcurrencyLimit;
use ipguard_core::access_lists::NewAllowEntry;
use ipguard_core::DenialCode;
use ipguard_db_entities::ListScope;
use uuid::Uuid;

#[tokio::test]
async fn test_link_quota_and_repeat_access() {
    let services = services(test_config()).await;
    let link = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(2);

    for addr in ["198.51.100.1", "198.51.100.2", "198.51.100.1"] {
        let decision = services
            .access
            .check_subscription_access(link, None, ip(addr), "clash/1.0", limit)
            .await
            .unwrap();
        assert!(decision.allowed, "{addr}");
    }

    let denied = services
        .access
        .check_subscription_access(link, None, ip("198.51.100.3"), "clash/1.0", limit)
        .await
        .unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.code, Some(DenialCode::SubscriptionIpLimit));
    assert!(denied
        .reason
        .as_deref()
        .unwrap()
        .starts_with("subscription IP limit reached"));
    assert_eq!(denied.remaining_slots, Some(0));

    let accesses = services
        .access
        .subscriptions
        .list_accesses(link)
        .await
        .unwrap();
    assert_eq!(accesses.len(), 2);
    assert_eq!(accesses[0].ip, "198.51.100.1");
    assert_eq!(accesses[0].access_count, 2);
    assert_eq!(accesses[1].access_count, 1);
    assert!(accesses[0].last_access_at >= accesses[0].first_access_at);
}

#[tokio::test]
async fn test_repeat_access_refreshes_user_agent() {
    let services = services(test_config()).await;
    let link = Uuid::new_v4();
    for ua in ["clash/1.0", "clash-verge/2.0"] {
        services
            .access
            .check_subscription_access(
                link,
                None,
                ip("198.51.100.1"),
                ua,
                ConcurrencyLimit::PlanDefault,
            )
            .await
            .unwrap();
    }
    let accesses = services
        .access
        .subscriptions
        .list_accesses(link)
        .await
        .unwrap();
    assert_eq!(accesses[0].user_agent, "clash-verge/2.0");
}

#[tokio::test]
async fn test_reset_frees_the_link() {
    let services = services(test_config()).await;
    let link = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(1);

    assert!(services
        .access
        .check_subscription_access(link, None, ip("198.51.100.1"), "", limit)
        .await
        .unwrap()
        .allowed);
    assert!(!services
        .access
        .check_subscription_access(link, None, ip("198.51.100.2"), "", limit)
        .await
        .unwrap()
        .allowed);

    assert_eq!(services.access.subscriptions.reset(link).await.unwrap(), 1);
    assert!(services
        .access
        .check_subscription_access(link, None, ip("198.51.100.2"), "", limit)
        .await
        .unwrap()
        .allowed);
}

#[tokio::test]
async fn test_links_are_independent() {
    let services = services(test_config()).await;
    let limit = ConcurrencyLimit::Limited(1);
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(services
        .access
        .check_subscription_access(first, None, ip("198.51.100.1"), "", limit)
        .await
        .unwrap()
        .allowed);
    assert!(services
        .access
        .check_subscription_access(second, None, ip("198.51.100.2"), "", limit)
        .await
        .unwrap()
        .allowed);
}

#[tokio::test]
async fn test_unlimited_link_still_records_history() {
    let services = services(test_config()).await;
    let link = Uuid::new_v4();
    for i in 0..8 {
        let decision = services
            .access
            .check_subscription_access(
                link,
                None,
                ip(&format!("192.0.2.{i}")),
                "",
                ConcurrencyLimit::Unlimited,
            )
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_slots, None);
    }
    assert_eq!(
        services
            .access
            .subscriptions
            .list_accesses(link)
            .await
            .unwrap()
            .len(),
        8
    );
}

#[tokio::test]
async fn test_owner_allow_entry_bypasses_link_quota() {
    let services = services(test_config()).await;
    let owner = Uuid::new_v4();
    let link = Uuid::new_v4();
    let limit = ConcurrencyLimit::Limited(1);
    services
        .access
        .lists
        .add_allow_entry(NewAllowEntry {
            ip_or_cidr: "10.8.0.0/24".into(),
            scope: ListScope::User,
            user_id: Some(owner),
            description: "office".into(),
            created_by: "admin".into(),
        })
        .await
        .unwrap();

    assert!(services
        .access
        .check_subscription_access(link, Some(owner), ip("198.51.100.1"), "", limit)
        .await
        .unwrap()
        .allowed);
    assert!(services
        .access
        .check_subscription_access(link, Some(owner), ip("10.8.0.5"), "", limit)
        .await
        .unwrap()
        .allowed);
    // Without the owner the range does not apply
    assert!(!services
        .access
        .check_subscription_access(link, None, ip("10.8.0.6"), "", limit)
        .await
        .unwrap()
        .allowed);
}
