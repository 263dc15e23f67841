use poem_openapi::OpenApi;

pub mod allow_entries;
pub mod deny_entries;
pub mod failed_attempts;
mod pagination;
pub mod parameters;
pub mod status;
pub mod subscriptions;
pub mod user_sessions;

pub use pagination::{PaginatedResponse, PaginationParams};

pub fn get() -> impl OpenApi {
    (
        allow_entries::ListApi,
        allow_entries::DetailApi,
        deny_entries::ListApi,
        deny_entries::DetailApi,
        user_sessions::Api,
        subscriptions::Api,
        failed_attempts::Api,
        status::Api,
        parameters::Api,
    )
}
