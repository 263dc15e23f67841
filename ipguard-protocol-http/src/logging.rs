use std::net::IpAddr;
use std::sync::Arc;

use http::{Method, StatusCode, Uri};
use ipguard_core::Services;
use poem::web::Data;
use poem::{Endpoint, FromRequest, Request, Response};
use tracing::*;

pub(crate) async fn log_request<E: Endpoint>(ep: Arc<E>, req: Request) -> poem::Result<Response> {
    let method = req.method().clone();
    let url = req.original_uri().clone();
    let client_ip = get_client_ip(&req).await;

    let response = ep.get_response(req).await;
    log_request_result(&method, &url, client_ip, &response.status());
    Ok(response)
}

fn log_request_result(method: &Method, url: &Uri, client_ip: Option<IpAddr>, status: &StatusCode) {
    let client_ip = client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "<unknown>".into());
    if status.is_server_error() {
        warn!(%method, %url, %status, %client_ip, "Request failed");
    } else if status.is_client_error() {
        info!(%method, %url, %status, %client_ip, "Request rejected");
    } else {
        debug!(%method, %url, %status, %client_ip, "Request");
    }
}

/// Peer address of the request, or the first `X-Forwarded-For` hop when
/// `http.trust_x_forwarded_headers` is on
pub async fn get_client_ip(req: &Request) -> Option<IpAddr> {
    let services: Option<Data<&Services>> = <Data<&Services>>::from_request_without_body(req).await.ok();
    let trust_x_forwarded_headers = match services {
        Some(services) => services.config.read().await.store.http.trust_x_forwarded_headers,
        None => false,
    };

    let remote_ip = req.remote_addr().as_socket_addr().map(|x| x.ip());

    if trust_x_forwarded_headers {
        if let Some(forwarded) = req
            .header("x-forwarded-for")
            .and_then(|x| x.split(',').next())
            .and_then(|x| x.trim().parse().ok())
        {
            return Some(forwarded);
        }
    }
    remote_ip
}
