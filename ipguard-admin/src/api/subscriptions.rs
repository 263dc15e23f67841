use ipguard_common::api::TokenSecurityScheme;
use ipguard_common::IpGuardError;
use ipguard_core::Services;
use ipguard_db_entities::SubscriptionAccess;
use poem::web::Data;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use tracing::*;
use uuid::Uuid;

pub struct Api;

#[derive(Object)]
struct ResetResult {
    removed: u64,
}

#[derive(ApiResponse)]
enum GetAccessesResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<SubscriptionAccess::Model>>),
}

#[derive(ApiResponse)]
enum ResetAccessesResponse {
    #[oai(status = 200)]
    Ok(Json<ResetResult>),
}

#[OpenApi]
impl Api {
    #[oai(
        path = "/subscriptions/:id/accesses",
        method = "get",
        operation_id = "get_subscription_accesses"
    )]
    async fn api_get_subscription_accesses(
        &self,
        services: Data<&Services>,
        id: Path<Uuid>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<GetAccessesResponse, IpGuardError> {
        let accesses = services.access.subscriptions.list_accesses(id.0).await?;
        Ok(GetAccessesResponse::Ok(Json(accesses)))
    }

    /// Forgets every IP seen on the link, freeing all of its slots
    #[oai(
        path = "/subscriptions/:id/accesses",
        method = "delete",
        operation_id = "reset_subscription_accesses"
    )]
    async fn api_reset_subscription_accesses(
        &self,
        services: Data<&Services>,
        id: Path<Uuid>,
        _sec_scheme: TokenSecurityScheme,
    ) -> Result<ResetAccessesResponse, IpGuardError> {
        let removed = services.access.subscriptions.reset(id.0).await?;
        info!(subscription_id = %id.0, removed, "Subscription access history reset");
        Ok(ResetAccessesResponse::Ok(Json(ResetResult { removed })))
    }
}
