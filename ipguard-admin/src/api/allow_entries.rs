use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::access_lists::NewAllowEntry;
use ipguard_core::Services;
use ipguard_db_entities::{AllowEntry, ListScope};
use poem::web::Data;
use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use uuid::Uuid;

pub struct ListApi;

#[derive(Object)]
struct CreateAllowEntryRequest {
    /// Single address or CIDR range
    ip_or_cidr: String,
    scope: ListScope,
    /// Required for `user` scope
    user_id: Option<Uuid>,
    description: Option<String>,
    created_by: Option<String>,
}

#[derive(ApiResponse)]
enum GetAllowEntriesResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<AllowEntry::Model>>),
}

#[derive(ApiResponse)]
enum CreateAllowEntryResponse {
    #[oai(status = 201)]
    Created(Json<AllowEntry::Model>),

    #[oai(status = 400)]
    BadRequest(Json<String>),
}

#[OpenApi]
impl ListApi {
    #[oai(path = "/allow-entries", method = "get", operation_id = "get_allow_entries")]
    async fn api_get_all_allow_entries(
        &self,
        services: Data<&Services>,
        user_id: Query<Option<Uuid>>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetAllowEntriesResponse, IpGuardError> {
        let entries = services.access.lists.list_allow_entries(*user_id).await?;
        Ok(GetAllowEntriesResponse::Ok(Json(entries)))
    }

    #[oai(path = "/allow-entries", method = "post", operation_id = "create_allow_entry")]
    async fn api_create_allow_entry(
        &self,
        services: Data<&Services>,
        body: Json<CreateAllowEntryRequest>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<CreateAllowEntryResponse, IpGuardError> {
        let body = body.0;
        let result = services
            .access
            .lists
            .add_allow_entry(NewAllowEntry {
                ip_or_cidr: body.ip_or_cidr,
                scope: body.scope,
                user_id: body.user_id,
                description: body.description.unwrap_or_default(),
                created_by: body.created_by.unwrap_or_else(|| "admin".into()),
            })
            .await;

        match result {
            Ok(entry) => Ok(CreateAllowEntryResponse::Created(Json(entry))),
            Err(e @ (IpGuardError::InvalidAddress(_) | IpGuardError::InvalidEntry(_))) => {
                Ok(CreateAllowEntryResponse::BadRequest(Json(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DetailApi;

#[derive(ApiResponse)]
enum DeleteAllowEntryResponse {
    #[oai(status = 204)]
    Deleted,

    #[oai(status = 404)]
    NotFound,
}

#[OpenApi]
impl DetailApi {
    #[oai(
        path = "/allow-entries/:id",
        method = "delete",
        operation_id = "delete_allow_entry"
    )]
    async fn api_delete_allow_entry(
        &self,
        services: Data<&Services>,
        id: Path<Uuid>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<DeleteAllowEntryResponse, IpGuardError> {
        match services.access.lists.remove_allow_entry(id.0).await {
            Ok(()) => Ok(DeleteAllowEntryResponse::Deleted),
            Err(IpGuardError::EntryNotFound(_)) => Ok(DeleteAllowEntryResponse::NotFound),
            Err(e) => Err(e),
        }
    }
}
