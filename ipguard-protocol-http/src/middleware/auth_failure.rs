use http::StatusCode;
use ipguard_core::{AccessDecision, DenialCode};
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use tracing::*;

use super::{admission_timeout, services_from_request, with_deadline};
use crate::error::{denial_response, unavailable_response};
use crate::logging::get_client_ip;

/// Wraps a login endpoint: refuses auto-banned clients outright and feeds
/// 401/403 answers into the failed-attempt counter
pub struct AuthFailureMiddleware;

pub struct AuthFailureMiddlewareEndpoint<E: Endpoint> {
    inner: E,
}

impl<E: Endpoint> Middleware<E> for AuthFailureMiddleware {
    type Output = AuthFailureMiddlewareEndpoint<E>;

    fn transform(&self, inner: E) -> Self::Output {
        AuthFailureMiddlewareEndpoint { inner }
    }
}

impl<E: Endpoint> Endpoint for AuthFailureMiddlewareEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let services = services_from_request(&req).await?;
        let Some(ip) = get_client_ip(&req).await else {
            return self.inner.call(req).await.map(IntoResponse::into_response);
        };

        let deadline = admission_timeout(&services).await;
        match with_deadline(deadline, services.access.check_auto_blacklist(ip)).await {
            Ok(false) => (),
            Ok(true) => {
                let message = services.config.read().await.banned_message();
                info!(%ip, "Refusing login attempt from auto-banned IP");
                return Ok(denial_response(
                    &AccessDecision::deny(DenialCode::IpAutoBanned, message),
                    false,
                ));
            }
            Err(error) => {
                error!(%error, %ip, "Auto-ban check failed");
                return Ok(unavailable_response());
            }
        }

        let response = self.inner.call(req).await.map(IntoResponse::into_response);
        let status = match &response {
            Ok(response) => response.status(),
            Err(error) => error.status(),
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let reason = format!("http_{}", status.as_u16());
            match services.access.record_failed_attempt(ip, &reason).await {
                Ok(true) => warn!(%ip, "IP auto-banned after repeated authentication failures"),
                Ok(false) => debug!(%ip, %status, "Recorded failed authentication attempt"),
                Err(error) => error!(%error, %ip, "Failed to record failed attempt"),
            }
        } else if status.is_success() {
            if let Err(error) = services.access.record_successful_login(ip).await {
                warn!(%error, %ip, "Failed to clear failed attempts");
            }
        }

        response
    }
}
