use std::net::IpAddr;

use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::geo::GeoInfo;
use ipguard_core::{SecurityStatus, Services, SweepStats};
use poem::web::Data;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, OpenApi};

pub struct Api;

#[derive(ApiResponse)]
enum SecurityStatusResponse {
    #[oai(status = 200)]
    Ok(Json<SecurityStatus>),
}

#[derive(ApiResponse)]
enum GeoLookupResponse {
    #[oai(status = 200)]
    Ok(Json<GeoInfo>),

    #[oai(status = 400)]
    InvalidIp,
}

#[derive(ApiResponse)]
enum SweepResponse {
    #[oai(status = 200)]
    Ok(Json<SweepStats>),
}

#[OpenApi]
impl Api {
    #[oai(path = "/status", method = "get", operation_id = "get_security_status")]
    async fn api_get_security_status(
        &self,
        services: Data<&Services>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<SecurityStatusResponse, IpGuardError> {
        let status = services.access.security_status().await?;
        Ok(SecurityStatusResponse::Ok(Json(status)))
    }

    /// Cached when possible. An empty result means the lookup failed.
    #[oai(path = "/geo/:ip", method = "get", operation_id = "lookup_geo")]
    async fn api_lookup_geo(
        &self,
        services: Data<&Services>,
        ip: Path<String>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GeoLookupResponse, IpGuardError> {
        let ip: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => return Ok(GeoLookupResponse::InvalidIp),
        };
        Ok(GeoLookupResponse::Ok(Json(services.access.geo.resolve(ip).await)))
    }

    #[oai(path = "/maintenance/sweep", method = "post", operation_id = "run_sweep")]
    async fn api_run_sweep(
        &self,
        services: Data<&Services>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<SweepResponse, IpGuardError> {
        Ok(SweepResponse::Ok(Json(services.access.sweep().await?)))
    }
}
