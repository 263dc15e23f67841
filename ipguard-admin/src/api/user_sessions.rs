use std::net::IpAddr;

use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::Services;
use ipguard_db_entities::{ActiveSession, ActivityRecord};
use poem::web::Data;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::*;
use uuid::Uuid;

use super::pagination::{PaginatedResponse, PaginationParams};

pub struct Api;

#[derive(Object)]
struct DisconnectResult {
    removed: u64,
}

#[derive(ApiResponse)]
enum GetSessionsResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<ActiveSession::Model>>),
}

#[derive(ApiResponse)]
enum DisconnectResponse {
    #[oai(status = 200)]
    Ok(Json<DisconnectResult>),

    #[oai(status = 400)]
    InvalidIp,
}

#[derive(ApiResponse)]
enum GetActivityResponse {
    #[oai(status = 200)]
    Ok(Json<PaginatedResponse<ActivityRecord::Model>>),
}

#[OpenApi]
impl Api {
    /// IPs currently counted against the user's quota
    #[oai(
        path = "/users/:user_id/sessions",
        method = "get",
        operation_id = "get_user_sessions"
    )]
    async fn api_get_user_sessions(
        &self,
        services: Data<&Services>,
        user_id: Path<Uuid>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetSessionsResponse, IpGuardError> {
        let sessions = services.access.sessions.list_online(user_id.0).await?;
        Ok(GetSessionsResponse::Ok(Json(sessions)))
    }

    /// Frees quota slots: one IP when `ip` is given, otherwise all of them
    #[oai(
        path = "/users/:user_id/sessions",
        method = "delete",
        operation_id = "disconnect_user_sessions"
    )]
    async fn api_disconnect_user_sessions(
        &self,
        services: Data<&Services>,
        user_id: Path<Uuid>,
        ip: Query<Option<String>>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<DisconnectResponse, IpGuardError> {
        let ip: Option<IpAddr> = match ip.0.as_deref().map(str::parse) {
            None => None,
            Some(Ok(ip)) => Some(ip),
            Some(Err(_)) => return Ok(DisconnectResponse::InvalidIp),
        };

        let removed = services.access.sessions.disconnect(user_id.0, ip).await?;
        info!(user_id = %user_id.0, ?ip, removed, "Sessions disconnected by admin");
        Ok(DisconnectResponse::Ok(Json(DisconnectResult { removed })))
    }

    #[oai(
        path = "/users/:user_id/activity",
        method = "get",
        operation_id = "get_user_activity"
    )]
    async fn api_get_user_activity(
        &self,
        services: Data<&Services>,
        user_id: Path<Uuid>,
        offset: Query<Option<u64>>,
        limit: Query<Option<u64>>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetActivityResponse, IpGuardError> {
        let query = ActivityRecord::Entity::find()
            .filter(ActivityRecord::Column::UserId.eq(user_id.0))
            .order_by_desc(ActivityRecord::Column::CreatedAt);

        Ok(GetActivityResponse::Ok(Json(
            PaginatedResponse::new(
                query,
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
}
