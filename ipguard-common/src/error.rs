use poem::error::ResponseError;
use poem::http::StatusCode;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum IpGuardError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("invalid IP address or CIDR range: {0}")]
    InvalidAddress(String),
    #[error("invalid list entry: {0}")]
    InvalidEntry(String),
    #[error("entry {0} not found")]
    EntryNotFound(Uuid),
    #[error("access check timed out")]
    Timeout,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ResponseError for IpGuardError {
    fn status(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidAddress(_) | Self::InvalidEntry(_) => StatusCode::BAD_REQUEST,
            Self::EntryNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl poem_openapi::ApiResponse for IpGuardError {
    fn meta() -> poem_openapi::registry::MetaResponses {
        poem_openapi::registry::MetaResponses {
            responses: Vec::new(),
        }
    }

    fn register(_registry: &mut poem_openapi::registry::Registry) {}
}
