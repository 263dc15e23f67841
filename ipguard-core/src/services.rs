use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ipguard_common::IpGuardConfig;
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::db::connect_to_db;
use crate::geo::{GeoProvider, IpApiGeoProvider, NoopGeoProvider};
use crate::{AccessOrchestrator, ConfiguredQuotas, PlanQuotaSource, SharedConfig};

#[derive(Clone)]
pub struct Services {
    pub db: DatabaseConnection,
    pub config: SharedConfig,
    pub access: AccessOrchestrator,
}

impl Services {
    pub async fn new(config: IpGuardConfig) -> Result<Self> {
        let db = connect_to_db(&config).await?;
        Ok(Self::with_quotas(db, config, Arc::new(ConfiguredQuotas)))
    }

    /// Builds the services on an already migrated connection
    pub fn with_quotas(
        db: DatabaseConnection,
        config: IpGuardConfig,
        quotas: Arc<dyn PlanQuotaSource>,
    ) -> Self {
        let geo_provider: Arc<dyn GeoProvider> = if config.store.geo.enabled {
            info!(url = %config.store.geo.provider_url, "Geolocation enabled");
            Arc::new(IpApiGeoProvider::new(config.store.geo.provider_url.clone()))
        } else {
            Arc::new(NoopGeoProvider)
        };
        Self::with_geo_provider(db, config, geo_provider, quotas)
    }

    pub fn with_geo_provider(
        db: DatabaseConnection,
        config: IpGuardConfig,
        geo_provider: Arc<dyn GeoProvider>,
        quotas: Arc<dyn PlanQuotaSource>,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let access = AccessOrchestrator::new(db.clone(), config.clone(), geo_provider, quotas);
        Self { db, config, access }
    }

    /// Background maintenance loop running [AccessOrchestrator::sweep] every `maintenance.interval`
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let access = self.access.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let period = config.read().await.store.maintenance.interval;
            let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
            loop {
                interval.tick().await;
                match access.sweep().await {
                    Ok(stats) => debug!(?stats, "Maintenance tick"),
                    Err(error) => error!(%error, "Maintenance sweep failed"),
                }
            }
        })
    }
}
