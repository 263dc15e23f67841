use std::net::IpAddr;

use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::Services;
use ipguard_db_entities::FailedAttempt;
use poem::web::Data;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};

use super::pagination::{PaginatedResponse, PaginationParams};

pub struct Api;

#[derive(Object)]
struct UnbanResult {
    /// Number of automatic deny entries removed
    lifted: u64,
}

#[derive(ApiResponse)]
enum GetFailedAttemptsResponse {
    #[oai(status = 200)]
    Ok(Json<PaginatedResponse<FailedAttempt::Model>>),

    #[oai(status = 400)]
    InvalidIp,
}

#[derive(ApiResponse)]
enum UnbanIpResponse {
    #[oai(status = 200)]
    Ok(Json<UnbanResult>),

    #[oai(status = 400)]
    InvalidIp,
}

#[OpenApi]
impl Api {
    #[oai(
        path = "/failed-attempts",
        method = "get",
        operation_id = "get_failed_attempts"
    )]
    async fn api_get_failed_attempts(
        &self,
        services: Data<&Services>,
        ip: Query<Option<String>>,
        offset: Query<Option<u64>>,
        limit: Query<Option<u64>>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetFailedAttemptsResponse, IpGuardError> {
        let ip: Option<IpAddr> = match ip.0.as_deref().map(str::parse) {
            None => None,
            Some(Ok(ip)) => Some(ip),
            Some(Err(_)) => return Ok(GetFailedAttemptsResponse::InvalidIp),
        };

        Ok(GetFailedAttemptsResponse::Ok(Json(
            PaginatedResponse::new(
                services.access.failures.attempts_query(ip),
                PaginationParams {
                    offset: *offset,
                    limit: *limit,
                },
                &services.db,
                Into::into,
            )
            .await?,
        )))
    }

    /// Lifts automatic bans on the IP and forgets its failed attempts.
    /// Manual deny entries are left alone.
    #[oai(path = "/banned-ips/:ip", method = "delete", operation_id = "unban_ip")]
    async fn api_unban_ip(
        &self,
        services: Data<&Services>,
        ip: Path<String>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<UnbanIpResponse, IpGuardError> {
        let ip: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => return Ok(UnbanIpResponse::InvalidIp),
        };

        let lifted = services.access.unban_ip(ip).await?;
        Ok(UnbanIpResponse::Ok(Json(UnbanResult { lifted })))
    }
}
