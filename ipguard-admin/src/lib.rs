pub mod api;

use poem::{Endpoint, EndpointExt, Route};
use poem_openapi::OpenApiService;

pub const API_TITLE: &str = "ipguard admin";

pub fn admin_api_service() -> OpenApiService<impl poem_openapi::OpenApi, ()> {
    OpenApiService::new(api::get(), API_TITLE, env!("CARGO_PKG_VERSION"))
        .server("/@ipguard/admin/api")
}

/// The admin API plus its OpenAPI document at `/openapi.json`. Expects
/// [ipguard_core::Services] and [ipguard_common::api::AdminToken] in the request data.
pub fn admin_api_app() -> impl Endpoint {
    let api_service = admin_api_service();
    let spec = api_service.spec_endpoint();

    Route::new()
        .nest("/", api_service)
        .at("/openapi.json", spec)
        .map_to_response()
}
