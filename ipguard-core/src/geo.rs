use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipguard_db_entities::GeoCacheEntry;
use poem_openapi::Object;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::consts::LOCAL_NETWORK_COUNTRY;
use crate::db::delete_in_batches;
use crate::SharedConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Object)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub isp: Option<String>,
}

impl GeoInfo {
    pub fn local_network() -> Self {
        Self {
            country: Some(LOCAL_NETWORK_COUNTRY.to_owned()),
            city: Some(LOCAL_NETWORK_COUNTRY.to_owned()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.city.is_none() && self.isp.is_none()
    }
}

impl From<GeoCacheEntry::Model> for GeoInfo {
    fn from(entry: GeoCacheEntry::Model) -> Self {
        Self {
            country: entry.country,
            country_code: entry.country_code,
            region: entry.region,
            city: entry.city,
            lat: entry.lat,
            lon: entry.lon,
            isp: entry.isp,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GeoLookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("provider refused the lookup: {0}")]
    Provider(String),
    #[error("lookup timed out")]
    Timeout,
}

/// Source of geolocation data for a single address
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GeoLookupError>;
}

/// Provider that knows nothing, used when geolocation is disabled
pub struct NoopGeoProvider;

#[async_trait]
impl GeoProvider for NoopGeoProvider {
    async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        Ok(GeoInfo::default())
    }
}

/// Client for ip-api.com compatible JSON endpoints
pub struct IpApiGeoProvider {
    client: reqwest::Client,
    url_template: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
}

impl IpApiGeoProvider {
    pub fn new(url_template: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template,
        }
    }

    fn url_for(&self, ip: IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

#[async_trait]
impl GeoProvider for IpApiGeoProvider {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        let response = self
            .client
            .get(self.url_for(ip))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ip_api_response(&response)
    }
}

fn parse_ip_api_response(body: &str) -> Result<GeoInfo, GeoLookupError> {
    let response: IpApiResponse = serde_json::from_str(body)?;
    if response.status.as_deref() == Some("fail") {
        return Err(GeoLookupError::Provider(
            response.message.unwrap_or_else(|| "unknown error".into()),
        ));
    }
    Ok(GeoInfo {
        country: response.country,
        country_code: response.country_code,
        region: response.region_name,
        city: response.city,
        lat: response.lat,
        lon: response.lon,
        isp: response.isp,
    })
}

pub fn is_non_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Resolves addresses to locations through a TTL cache in the database.
/// Geolocation never gates a request: every failure yields an empty [GeoInfo].
#[derive(Clone)]
pub struct GeoResolver {
    db: DatabaseConnection,
    config: SharedConfig,
    provider: Arc<dyn GeoProvider>,
}

impl GeoResolver {
    pub fn new(db: DatabaseConnection, config: SharedConfig, provider: Arc<dyn GeoProvider>) -> Self {
        Self {
            db,
            config,
            provider,
        }
    }

    pub async fn resolve(&self, ip: IpAddr) -> GeoInfo {
        if is_non_routable(&ip) {
            return GeoInfo::local_network();
        }

        let (cache_ttl, lookup_timeout) = {
            let config = self.config.read().await;
            (config.store.geo.cache_ttl, config.store.geo.lookup_timeout)
        };
        let now = Utc::now();

        match self.cached(ip, cache_ttl, now).await {
            Ok(Some(info)) => return info,
            Ok(None) => (),
            Err(error) => warn!(%ip, %error, "Geo cache read failed"),
        }

        let info = match tokio::time::timeout(lookup_timeout, self.provider.lookup(ip)).await {
            Ok(Ok(info)) => info,
            Ok(Err(error)) => {
                warn!(%ip, %error, "Geo lookup failed");
                return GeoInfo::default();
            }
            Err(_) => {
                warn!(%ip, error = %GeoLookupError::Timeout, "Geo lookup failed");
                return GeoInfo::default();
            }
        };

        if !info.is_empty() {
            if let Err(error) = self.store(ip, &info, now).await {
                warn!(%ip, %error, "Geo cache write failed");
            }
        }
        debug!(%ip, country = ?info.country, city = ?info.city, "Resolved location");
        info
    }

    async fn cached(
        &self,
        ip: IpAddr,
        cache_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<GeoInfo>, DbErr> {
        let Some(entry) = GeoCacheEntry::Entity::find_by_id(ip.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let ttl = chrono::Duration::from_std(cache_ttl).unwrap_or(chrono::Duration::MAX);
        let fresh = entry
            .cached_at
            .checked_add_signed(ttl)
            .map(|expires_at| expires_at >= now)
            .unwrap_or(true);
        if !fresh {
            return Ok(None);
        }
        Ok(Some(entry.into()))
    }

    async fn store(&self, ip: IpAddr, info: &GeoInfo, now: DateTime<Utc>) -> Result<(), DbErr> {
        GeoCacheEntry::Entity::insert(GeoCacheEntry::ActiveModel {
            ip: Set(ip.to_string()),
            country: Set(info.country.clone()),
            country_code: Set(info.country_code.clone()),
            region: Set(info.region.clone()),
            city: Set(info.city.clone()),
            lat: Set(info.lat),
            lon: Set(info.lon),
            isp: Set(info.isp.clone()),
            cached_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(GeoCacheEntry::Column::Ip)
                .update_columns([
                    GeoCacheEntry::Column::Country,
                    GeoCacheEntry::Column::CountryCode,
                    GeoCacheEntry::Column::Region,
                    GeoCacheEntry::Column::City,
                    GeoCacheEntry::Column::Lat,
                    GeoCacheEntry::Column::Lon,
                    GeoCacheEntry::Column::Isp,
                    GeoCacheEntry::Column::CachedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }

    /// Removes cache rows older than the TTL
    pub async fn sweep_expired(&self, batch_size: u64) -> Result<u64, DbErr> {
        let cache_ttl = self.config.read().await.store.geo.cache_ttl;
        let ttl = chrono::Duration::from_std(cache_ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = delete_in_batches!(
            &self.db,
            GeoCacheEntry,
            Ip: String,
            batch_size,
            GeoCacheEntry::Column::CachedAt.lt(cutoff)
        );
        Ok(removed)
    }
}
