use poem::Request;
use poem_openapi::auth::ApiKey;
use poem_openapi::SecurityScheme;

use crate::Secret;

/// Admin token the server injects into request data for [TokenSecurityScheme]
#[derive(Clone, Debug)]
pub struct AdminToken(pub Option<Secret<String>>);

#[derive(SecurityScheme)]
#[oai(
    ty = "api_key",
    key_name = "X-IpGuard-Token",
    key_in = "header",
    checker = "admin_token_checker"
)]
pub struct TokenSecurityScheme(());

async fn admin_token_checker(req: &Request, api_key: ApiKey) -> Option<()> {
    let AdminToken(Some(expected)) = req.data::<AdminToken>()? else {
        return None;
    };
    expected.matches(&api_key.key).then_some(())
}
