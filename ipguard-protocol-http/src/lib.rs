mod error;
mod logging;
pub mod middleware;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use ipguard_common::api::AdminToken;
use ipguard_common::IpGuardError;
use ipguard_core::Services;
use poem::listener::TcpListener;
use poem::web::{Data, Json};
use poem::{get, handler, Endpoint, EndpointExt, Response, Route, Server};
use serde::Serialize;
use tracing::*;

pub use error::{denial_response, unavailable_response};
pub use logging::get_client_ip;
pub use middleware::{
    AccessControlMiddleware, AuthFailureMiddleware, RequestIdentity, SubscriptionAccessMiddleware,
    SubscriptionIdentity,
};

pub const ADMIN_API_PREFIX: &str = "/@ipguard/admin/api";
pub const HEALTH_PATH: &str = "/@ipguard/health";

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

#[handler]
async fn health(services: Data<&Services>) -> poem::Result<Json<HealthStatus>> {
    services.db.ping().await.map_err(IpGuardError::from)?;
    Ok(Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Serves the admin API and the health endpoint. The access middlewares are
/// exported for the surrounding application to mount on its own routes.
#[derive(Clone)]
pub struct HttpServer {
    services: Services,
}

impl HttpServer {
    pub fn new(services: &Services) -> Self {
        HttpServer {
            services: services.clone(),
        }
    }

    pub async fn app(&self) -> impl Endpoint<Output = Response> {
        let admin_token = {
            let config = self.services.config.read().await;
            AdminToken(config.store.http.admin_token.clone())
        };

        Route::new()
            .nest(ADMIN_API_PREFIX, ipguard_admin::admin_api_app())
            .at(HEALTH_PATH, get(health))
            .around(logging::log_request)
            .data(self.services.clone())
            .data(admin_token)
    }

    pub async fn run(self, address: SocketAddr) -> Result<()> {
        let app = self.app().await;
        info!(?address, "Listening");
        Server::new(TcpListener::bind(address))
            .run(app)
            .await
            .context("HTTP server error")
    }
}
