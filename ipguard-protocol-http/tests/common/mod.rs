#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ipguard_common::{ConcurrencyLimit, IpGuardConfig, IpGuardConfigStore};
use ipguard_core::geo::{GeoInfo, GeoLookupError, GeoProvider, NoopGeoProvider};
use ipguard_core::{ConfiguredQuotas, Services};
use ipguard_db_entities::AccessType;
use ipguard_db_migrations::migrate_database;
use ipguard_protocol_http::{
    AccessControlMiddleware, AuthFailureMiddleware, RequestIdentity, SubscriptionAccessMiddleware,
    SubscriptionIdentity,
};
use poem::http::StatusCode;
use poem::test::TestResponse;
use poem::{get, handler, post, Endpoint, EndpointExt, Request, Route};
use sea_orm::{ConnectOptions, Database};
use uuid::Uuid;

pub async fn services(configure: impl FnOnce(&mut IpGuardConfigStore)) -> Services {
    services_with_geo(configure, Arc::new(NoopGeoProvider)).await
}

pub async fn services_with_geo(
    configure: impl FnOnce(&mut IpGuardConfigStore),
    geo: Arc<dyn GeoProvider>,
) -> Services {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migrate_database(&db).await.unwrap();

    let mut store = IpGuardConfigStore::default();
    store.http.trust_x_forwarded_headers = true;
    configure(&mut store);

    Services::with_geo_provider(
        db,
        IpGuardConfig {
            store,
            paths_relative_to: ".".into(),
        },
        geo,
        Arc::new(ConfiguredQuotas),
    )
}

/// A provider that never answers
pub struct StalledGeoProvider;

#[async_trait]
impl GeoProvider for StalledGeoProvider {
    async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        std::future::pending().await
    }
}

#[handler]
fn ok() -> &'static str {
    "ok"
}

/// Accepts only `X-Password: right`
#[handler]
fn login(req: &Request) -> StatusCode {
    match req.header("x-password") {
        Some("right") => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

fn header_uuid(req: &Request, name: &str) -> Option<Uuid> {
    req.header(name).and_then(|x| x.parse().ok())
}

fn header_limit(req: &Request, name: &str) -> ConcurrencyLimit {
    req.header(name)
        .and_then(|x| x.parse::<i64>().ok())
        .map(ConcurrencyLimit::from_raw)
        .unwrap_or(ConcurrencyLimit::PlanDefault)
}

/// Stands in for the application's authentication layer, which attaches the
/// identities the access middlewares read
pub fn app(services: &Services) -> impl Endpoint {
    Route::new()
        .at("/api/ping", get(ok).with(AccessControlMiddleware))
        .at("/sub", get(ok).with(SubscriptionAccessMiddleware))
        .at("/login", post(login).with(AuthFailureMiddleware))
        .around(|ep, mut req| async move {
            if let Some(user_id) = header_uuid(&req, "x-user-id") {
                let identity = RequestIdentity {
                    user_id,
                    max_concurrent: header_limit(&req, "x-max-ips"),
                    access_type: AccessType::Api,
                };
                req.extensions_mut().insert(identity);
            }
            if let Some(subscription_id) = header_uuid(&req, "x-subscription-id") {
                let identity = SubscriptionIdentity {
                    subscription_id,
                    owner_id: header_uuid(&req, "x-owner-id"),
                    max_ips: header_limit(&req, "x-max-ips"),
                };
                req.extensions_mut().insert(identity);
            }
            ep.call(req).await
        })
        .data(services.clone())
}

pub async fn body_json(response: TestResponse) -> serde_json::Value {
    response.0.into_body().into_json().await.unwrap()
}
