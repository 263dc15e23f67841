mod common;

use common::*;
use ipguard_common::ConcurrencyLimit;
use ipguard_db_entities::{AccessType, ActiveSession, DenyEntry, SubscriptionAccess};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

const ROUNDS: u64 = 12;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_new_ips_respect_quota() {
    let services = services(test_config()).await;

    for round in 0..ROUNDS {
        let mut rng = StdRng::seed_from_u64(round);
        let user = Uuid::new_v4();
        let quota: u32 = rng.gen_range(1..=4);
        let contenders: u32 = quota + rng.gen_range(1..=6);

        let mut addresses = (0..contenders)
            .map(|i| format!("198.51.{round}.{i}"))
            .collect::<Vec<_>>();
        addresses.shuffle(&mut rng);

        let tasks = addresses
            .into_iter()
            .map(|addr| {
                let services = services.clone();
                tokio::spawn(async move {
                    services
                        .access
                        .check_access(
                            user,
                            ip(&addr),
                            AccessType::Api,
                            ConcurrencyLimit::Limited(quota),
                        )
                        .await
                        .unwrap()
                        .allowed
                })
            })
            .collect::<Vec<_>>();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, quota, "round {round}: {contenders} contenders");
        let rows = ActiveSession::Entity::find()
            .filter(ActiveSession::Column::UserId.eq(user))
            .count(&services.db)
            .await
            .unwrap();
        assert_eq!(rows, quota as u64, "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_sharing_a_store_respect_quota() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.sqlite3");
    // Each instance has its own in-process lock table, only the store is shared
    let instances = [
        services_on(shared_file_db(&path).await, test_config()),
        services_on(shared_file_db(&path).await, test_config()),
    ];

    for round in 0..ROUNDS {
        let mut rng = StdRng::seed_from_u64(500 + round);
        let user = Uuid::new_v4();
        let quota: u32 = rng.gen_range(1..=3);
        let contenders: u32 = quota + rng.gen_range(2..=8);

        let tasks = (0..contenders)
            .map(|i| {
                let services = instances[rng.gen_range(0..instances.len())].clone();
                let addr = format!("192.0.{round}.{i}");
                tokio::spawn(async move {
                    services
                        .access
                        .check_access(
                            user,
                            ip(&addr),
                            AccessType::Api,
                            ConcurrencyLimit::Limited(quota),
                        )
                        .await
                        .unwrap()
                        .allowed
                })
            })
            .collect::<Vec<_>>();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, quota, "round {round}: {contenders} contenders");
        for instance in &instances {
            let rows = ActiveSession::Entity::find()
                .filter(ActiveSession::Column::UserId.eq(user))
                .count(&instance.db)
                .await
                .unwrap();
            assert_eq!(rows, quota as u64, "round {round}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_subscription_fetches_respect_quota() {
    let services = services(test_config()).await;

    for round in 0..ROUNDS {
        let mut rng = StdRng::seed_from_u64(1000 + round);
        let subscription = Uuid::new_v4();
        let quota: u32 = rng.gen_range(1..=3);
        let contenders: u32 = quota + rng.gen_range(1..=5);

        // Every contender fetches twice, so renewals interleave with new IPs
        let mut requests = (0..contenders)
            .flat_map(|i| {
                let addr = format!("203.0.{round}.{i}");
                [addr.clone(), addr]
            })
            .collect::<Vec<_>>();
        requests.shuffle(&mut rng);

        let tasks = requests
            .into_iter()
            .map(|addr| {
                let services = services.clone();
                tokio::spawn(async move {
                    services
                        .access
                        .check_subscription_access(
                            subscription,
                            None,
                            ip(&addr),
                            "clash/1.0",
                            ConcurrencyLimit::Limited(quota),
                        )
                        .await
                        .unwrap()
                        .allowed
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        let rows = SubscriptionAccess::Entity::find()
            .filter(SubscriptionAccess::Column::SubscriptionId.eq(subscription))
            .all(&services.db)
            .await
            .unwrap();
        assert_eq!(rows.len(), quota as usize, "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_failures_create_one_ban() {
    let mut config = test_config();
    config.store.auto_ban.max_attempts = 3;
    let services = services(config).await;
    let attacker = "203.0.113.200";

    let tasks = (0..16)
        .map(|_| {
            let services = services.clone();
            tokio::spawn(async move {
                services
                    .access
                    .record_failed_attempt(ip(attacker), "bad_password")
                    .await
                    .unwrap()
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap();
    }

    let bans = DenyEntry::Entity::find()
        .filter(DenyEntry::Column::IpOrCidr.eq(attacker))
        .count(&services.db)
        .await
        .unwrap();
    assert_eq!(bans, 1);
}
