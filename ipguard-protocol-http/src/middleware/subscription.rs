use http::header::USER_AGENT;
use ipguard_common::ConcurrencyLimit;
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use tracing::*;
use uuid::Uuid;

use super::{admission_timeout, services_from_request, with_deadline};
use crate::error::{denial_response, unavailable_response};
use crate::logging::get_client_ip;

#[derive(Clone, Debug)]
pub struct SubscriptionIdentity {
    pub subscription_id: Uuid,
    /// Owner of the link, whose own allow/deny entries then apply
    pub owner_id: Option<Uuid>,
    pub max_ips: ConcurrencyLimit,
}

pub struct SubscriptionAccessMiddleware;

pub struct SubscriptionAccessMiddlewareEndpoint<E: Endpoint> {
    inner: E,
}

impl<E: Endpoint> Middleware<E> for SubscriptionAccessMiddleware {
    type Output = SubscriptionAccessMiddlewareEndpoint<E>;

    fn transform(&self, inner: E) -> Self::Output {
        SubscriptionAccessMiddlewareEndpoint { inner }
    }
}

impl<E: Endpoint> Endpoint for SubscriptionAccessMiddlewareEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let Some(identity) = req.extensions().get::<SubscriptionIdentity>().cloned() else {
            return self.inner.call(req).await.map(IntoResponse::into_response);
        };

        let services = services_from_request(&req).await?;
        let Some(ip) = get_client_ip(&req).await else {
            warn!(subscription_id = %identity.subscription_id, "Cannot determine the client IP, refusing the request");
            return Ok(unavailable_response());
        };
        let user_agent = req.header(USER_AGENT).unwrap_or_default();

        let deadline = admission_timeout(&services).await;
        let decision = with_deadline(
            deadline,
            services.access.check_subscription_access(
                identity.subscription_id,
                identity.owner_id,
                ip,
                user_agent,
                identity.max_ips,
            ),
        )
        .await;

        match decision {
            Ok(decision) if decision.allowed => {
                self.inner.call(req).await.map(IntoResponse::into_response)
            }
            Ok(decision) => {
                info!(subscription_id = %identity.subscription_id, %ip, code = ?decision.code, "Subscription fetch refused");
                Ok(denial_response(&decision, false))
            }
            Err(error) => {
                error!(%error, subscription_id = %identity.subscription_id, %ip, "Subscription access check failed");
                Ok(unavailable_response())
            }
        }
    }
}
