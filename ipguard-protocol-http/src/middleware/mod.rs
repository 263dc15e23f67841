mod access;
mod auth_failure;
mod subscription;

use std::future::Future;
use std::time::Duration;

pub use access::{AccessControlMiddleware, AccessControlMiddlewareEndpoint, RequestIdentity};
pub use auth_failure::{AuthFailureMiddleware, AuthFailureMiddlewareEndpoint};
use ipguard_common::IpGuardError;
use ipguard_core::Services;
use poem::web::Data;
use poem::{FromRequest, Request};
pub use subscription::{
    SubscriptionAccessMiddleware, SubscriptionAccessMiddlewareEndpoint, SubscriptionIdentity,
};

pub(crate) async fn services_from_request(req: &Request) -> poem::Result<Services> {
    let services = <Data<&Services>>::from_request_without_body(req).await?;
    Ok(services.0.clone())
}

pub(crate) async fn admission_timeout(services: &Services) -> Duration {
    services.config.read().await.store.http.admission_timeout
}

/// Runs an admission step under the configured deadline. Expiry is reported
/// as [IpGuardError::Timeout] so that callers fail closed the same way they
/// do for store errors.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, IpGuardError>>,
) -> Result<T, IpGuardError> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| IpGuardError::Timeout)?
}
