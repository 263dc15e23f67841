use http::StatusCode;
use ipguard_core::consts::REASON_SERVICE_UNAVAILABLE;
use ipguard_core::{AccessDecision, DenialCode};
use poem::web::Json;
use poem::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct DenialDetails<'a> {
    remaining_slots: Option<u32>,
    online_ips: &'a [String],
}

#[derive(Serialize)]
struct DenialBody<'a> {
    code: DenialCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<DenialDetails<'a>>,
}

/// 403 carrying the decision's code and reason. Slot details are left out
/// when `with_details` is false so that a subscription denial reveals nothing
/// about the other clients of the link.
pub fn denial_response(decision: &AccessDecision, with_details: bool) -> Response {
    let body = DenialBody {
        code: decision.code.unwrap_or(DenialCode::IpBlacklisted),
        message: decision.reason.as_deref().unwrap_or_default(),
        details: with_details.then(|| DenialDetails {
            remaining_slots: decision.remaining_slots,
            online_ips: &decision.online_ips,
        }),
    };
    Json(body).with_status(StatusCode::FORBIDDEN).into_response()
}

pub fn unavailable_response() -> Response {
    Json(DenialBody {
        code: DenialCode::ServiceUnavailable,
        message: REASON_SERVICE_UNAVAILABLE,
        details: None,
    })
    .with_status(StatusCode::SERVICE_UNAVAILABLE)
    .into_response()
}
