use chrono::{DateTime, Utc};
use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::access_lists::NewDenyEntry;
use ipguard_core::Services;
use ipguard_db_entities::{DenyEntry, ListScope};
use poem::web::Data;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use uuid::Uuid;

pub struct ListApi;

#[derive(Object)]
struct CreateDenyEntryRequest {
    ip_or_cidr: String,
    scope: ListScope,
    user_id: Option<Uuid>,
    reason: Option<String>,
    /// Permanent when omitted
    expires_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
}

#[derive(ApiResponse)]
enum GetDenyEntriesResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<DenyEntry::Model>>),
}

#[derive(ApiResponse)]
enum CreateDenyEntryResponse {
    #[oai(status = 201)]
    Created(Json<DenyEntry::Model>),

    #[oai(status = 400)]
    BadRequest(Json<String>),
}

#[OpenApi]
impl ListApi {
    /// Automatic bans are listed too. Expired entries are hidden unless `include_expired` is set.
    #[oai(path = "/deny-entries", method = "get", operation_id = "get_deny_entries")]
    async fn api_get_all_deny_entries(
        &self,
        services: Data<&Services>,
        include_expired: Query<Option<bool>>,
        user_id: Query<Option<Uuid>>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetDenyEntriesResponse, IpGuardError> {
        let entries = services
            .access
            .lists
            .list_deny_entries(include_expired.unwrap_or(false), *user_id)
            .await?;
        Ok(GetDenyEntriesResponse::Ok(Json(entries)))
    }

    #[oai(path = "/deny-entries", method = "post", operation_id = "create_deny_entry")]
    async fn api_create_deny_entry(
        &self,
        services: Data<&Services>,
        body: Json<CreateDenyEntryRequest>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<CreateDenyEntryResponse, IpGuardError> {
        let body = body.0;
        let result = services
            .access
            .lists
            .add_deny_entry(NewDenyEntry {
                ip_or_cidr: body.ip_or_cidr,
                scope: body.scope,
                user_id: body.user_id,
                reason: body.reason.unwrap_or_default(),
                created_by: body.created_by.unwrap_or_else(|| "admin".into()),
                expires_at: body.expires_at,
            })
            .await;

        match result {
            Ok(entry) => Ok(CreateDenyEntryResponse::Created(Json(entry))),
            Err(e @ (IpGuardError::InvalidAddress(_) | IpGuardError::InvalidEntry(_))) => {
                Ok(CreateDenyEntryResponse::BadRequest(Json(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DetailApi;

#[derive(ApiResponse)]
enum DeleteDenyEntryResponse {
    #[oai(status = 204)]
    Deleted,

    #[oai(status = 404)]
    NotFound,
}

#[OpenApi]
impl DetailApi {
    #[oai(
        path = "/deny-entries/:id",
        method = "delete",
        operation_id = "delete_deny_entry"
    )]
    async fn api_delete_deny_entry(
        &self,
        services: Data<&Services>,
        id: Path<Uuid>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<DeleteDenyEntryResponse, IpGuardError> {
        match services.access.lists.remove_deny_entry(id.0).await {
            Ok(()) => Ok(DeleteDenyEntryResponse::Deleted),
            Err(IpGuardError::EntryNotFound(_)) => Ok(DeleteDenyEntryResponse::NotFound),
            Err(e) => Err(e),
        }
    }
}
