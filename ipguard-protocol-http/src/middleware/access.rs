use http::header::USER_AGENT;
use ipguard_common::ConcurrencyLimit;
use ipguard_db_entities::AccessType;
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use tracing::*;
use uuid::Uuid;

use super::{admission_timeout, services_from_request, with_deadline};
use crate::error::{denial_response, unavailable_response};
use crate::logging::get_client_ip;

/// Who is making the request, as established by the application's own
/// authentication. Requests without one pass through unchecked.
#[derive(Clone, Debug)]
pub struct RequestIdentity {
    pub user_id: Uuid,
    pub max_concurrent: ConcurrencyLimit,
    pub access_type: AccessType,
}

pub struct AccessControlMiddleware;

pub struct AccessControlMiddlewareEndpoint<E: Endpoint> {
    inner: E,
}

impl<E: Endpoint> Middleware<E> for AccessControlMiddleware {
    type Output = AccessControlMiddlewareEndpoint<E>;

    fn transform(&self, inner: E) -> Self::Output {
        AccessControlMiddlewareEndpoint { inner }
    }
}

impl<E: Endpoint> Endpoint for AccessControlMiddlewareEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let Some(identity) = req.extensions().get::<RequestIdentity>().cloned() else {
            return self.inner.call(req).await.map(IntoResponse::into_response);
        };

        let services = services_from_request(&req).await?;
        let Some(ip) = get_client_ip(&req).await else {
            warn!(user_id = %identity.user_id, "Cannot determine the client IP, refusing the request");
            return Ok(unavailable_response());
        };
        let user_agent = req.header(USER_AGENT).unwrap_or_default().to_owned();

        let deadline = admission_timeout(&services).await;
        let decision = with_deadline(
            deadline,
            services.access.check_access(
                identity.user_id,
                ip,
                identity.access_type,
                identity.max_concurrent,
            ),
        )
        .await;

        match decision {
            Ok(decision) if decision.allowed => (),
            Ok(decision) => return Ok(denial_response(&decision, true)),
            Err(error) => {
                error!(%error, user_id = %identity.user_id, %ip, "Access check failed");
                return Ok(unavailable_response());
            }
        }

        let response = self.inner.call(req).await.map(IntoResponse::into_response);

        // Geolocation may be slow, the response does not wait for the bookkeeping
        tokio::spawn(async move {
            if let Err(error) = services
                .access
                .record_activity(identity.user_id, ip, &user_agent, identity.access_type)
                .await
            {
                warn!(%error, user_id = %identity.user_id, %ip, "Failed to record activity");
            }
        });

        response
    }
}
