use std::time::Duration;

use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::{IpGuardConfigStore, IpGuardError};
use ipguard_core::Services;
use poem::web::Data;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use tracing::*;

pub struct Api;

/// Durations are in seconds
#[derive(Object)]
struct ParameterValues {
    pub activity_window: u64,
    /// 0 means unlimited
    pub default_max_concurrent_ips: u32,
    /// 0 means unlimited
    pub subscription_default_max_ips: u32,
    pub auto_ban_enabled: bool,
    pub auto_ban_max_attempts: u32,
    pub auto_ban_time_window: u64,
    pub auto_ban_duration: u64,
    pub geo_cache_ttl: u64,
}

#[derive(Object)]
struct ParameterUpdate {
    pub activity_window: Option<u64>,
    pub default_max_concurrent_ips: Option<u32>,
    pub subscription_default_max_ips: Option<u32>,
    pub auto_ban_enabled: Option<bool>,
    pub auto_ban_max_attempts: Option<u32>,
    pub auto_ban_time_window: Option<u64>,
    pub auto_ban_duration: Option<u64>,
    pub geo_cache_ttl: Option<u64>,
}

#[derive(ApiResponse)]
enum GetParametersResponse {
    #[oai(status = 200)]
    Ok(Json<ParameterValues>),
}

#[derive(ApiResponse)]
enum UpdateParametersResponse {
    #[oai(status = 200)]
    Ok(Json<ParameterValues>),

    #[oai(status = 400)]
    BadRequest(Json<String>),
}

impl From<&IpGuardConfigStore> for ParameterValues {
    fn from(store: &IpGuardConfigStore) -> Self {
        Self {
            activity_window: store.sessions.activity_window.as_secs(),
            default_max_concurrent_ips: store.sessions.default_max_concurrent_ips,
            subscription_default_max_ips: store.subscriptions.default_max_ips,
            auto_ban_enabled: store.auto_ban.enabled,
            auto_ban_max_attempts: store.auto_ban.max_attempts,
            auto_ban_time_window: store.auto_ban.time_window.as_secs(),
            auto_ban_duration: store.auto_ban.ban_duration.as_secs(),
            geo_cache_ttl: store.geo.cache_ttl.as_secs(),
        }
    }
}

#[OpenApi]
impl Api {
    #[oai(path = "/parameters", method = "get", operation_id = "get_parameters")]
    async fn api_get(
        &self,
        services: Data<&Services>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetParametersResponse, IpGuardError> {
        let config = services.config.read().await;
        Ok(GetParametersResponse::Ok(Json((&config.store).into())))
    }

    /// Applies to the running process only; the config file is not rewritten
    #[oai(path = "/parameters", method = "put", operation_id = "update_parameters")]
    async fn api_update_parameters(
        &self,
        services: Data<&Services>,
        body: Json<ParameterUpdate>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<UpdateParametersResponse, IpGuardError> {
        for (name, value) in [
            ("activity_window", body.activity_window),
            ("auto_ban_time_window", body.auto_ban_time_window),
            ("auto_ban_duration", body.auto_ban_duration),
            ("geo_cache_ttl", body.geo_cache_ttl),
            ("auto_ban_max_attempts", body.auto_ban_max_attempts.map(u64::from)),
        ] {
            if value == Some(0) {
                return Ok(UpdateParametersResponse::BadRequest(Json(format!(
                    "{name} must be greater than zero"
                ))));
            }
        }

        let mut config = services.config.write().await;
        let store = &mut config.store;

        if let Some(value) = body.activity_window {
            store.sessions.activity_window = Duration::from_secs(value);
        }
        if let Some(value) = body.default_max_concurrent_ips {
            store.sessions.default_max_concurrent_ips = value;
        }
        if let Some(value) = body.subscription_default_max_ips {
            store.subscriptions.default_max_ips = value;
        }
        if let Some(value) = body.auto_ban_enabled {
            store.auto_ban.enabled = value;
        }
        if let Some(value) = body.auto_ban_max_attempts {
            store.auto_ban.max_attempts = value;
        }
        if let Some(value) = body.auto_ban_time_window {
            store.auto_ban.time_window = Duration::from_secs(value);
        }
        if let Some(value) = body.auto_ban_duration {
            store.auto_ban.ban_duration = Duration::from_secs(value);
        }
        if let Some(value) = body.geo_cache_ttl {
            store.geo.cache_ttl = Duration::from_secs(value);
        }

        let values = ParameterValues::from(&*store);
        info!(
            activity_window = values.activity_window,
            default_max_concurrent_ips = values.default_max_concurrent_ips,
            auto_ban_max_attempts = values.auto_ban_max_attempts,
            "Runtime parameters updated"
        );
        Ok(UpdateParametersResponse::Ok(Json(values)))
    }
}
