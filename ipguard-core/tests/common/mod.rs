#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ipguard_common::{IpGuardConfig, IpGuardConfigStore, IpGuardError};
use ipguard_core::geo::{GeoInfo, GeoLookupError, GeoProvider, NoopGeoProvider};
use ipguard_core::{ConfiguredQuotas, PlanQuotaSource, Services};
use ipguard_db_migrations::migrate_database;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use uuid::Uuid;

/// Every in-memory SQLite connection is its own database, so the pool holds exactly one
pub async fn test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migrate_database(&db).await.unwrap();
    db
}

/// A database file opened through its own pool, the way every instance of a
/// horizontally scaled deployment sees the shared store
pub async fn shared_file_db(path: &Path) -> DatabaseConnection {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(4)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migrate_database(&db).await.unwrap();
    db
}

pub fn test_config() -> IpGuardConfig {
    IpGuardConfig {
        store: IpGuardConfigStore::default(),
        paths_relative_to: ".".into(),
    }
}

pub async fn services(config: IpGuardConfig) -> Services {
    Services::with_geo_provider(
        test_db().await,
        config,
        Arc::new(NoopGeoProvider),
        Arc::new(ConfiguredQuotas),
    )
}

pub fn services_on(db: DatabaseConnection, config: IpGuardConfig) -> Services {
    Services::with_geo_provider(db, config, Arc::new(NoopGeoProvider), Arc::new(ConfiguredQuotas))
}

pub async fn services_with_geo(config: IpGuardConfig, geo: Arc<dyn GeoProvider>) -> Services {
    Services::with_geo_provider(test_db().await, config, geo, Arc::new(ConfiguredQuotas))
}

pub fn ip(value: &str) -> IpAddr {
    value.parse().unwrap()
}

/// Fixed answers, counting how often it was asked
#[derive(Default)]
pub struct StaticGeoProvider {
    pub countries: HashMap<IpAddr, String>,
    pub lookups: std::sync::atomic::AtomicUsize,
}

impl StaticGeoProvider {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            countries: entries
                .iter()
                .map(|(addr, country)| (ip(addr), country.to_string()))
                .collect(),
            lookups: Default::default(),
        }
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        self.lookups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.countries.get(&ip) {
            Some(country) => Ok(GeoInfo {
                country: Some(country.clone()),
                city: Some(format!("{country} City")),
                ..Default::default()
            }),
            None => Err(GeoLookupError::Provider("unknown address".into())),
        }
    }
}

/// Plan system stand-in with a per-user quota
pub struct FixedPlanQuotas {
    pub per_user: HashMap<Uuid, u32>,
}

#[async_trait]
impl PlanQuotaSource for FixedPlanQuotas {
    async fn session_limit(&self, user_id: Uuid) -> Result<Option<u32>, IpGuardError> {
        Ok(self.per_user.get(&user_id).copied())
    }

    async fn subscription_limit(
        &self,
        _subscription_id: Uuid,
    ) -> Result<Option<u32>, IpGuardError> {
        Ok(None)
    }
}
