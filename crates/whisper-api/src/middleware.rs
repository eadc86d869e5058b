use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use whisper_types::api::Claims;

use crate::error::ApiError;

/// `Some(claims)` when the request carried a valid bearer token. Anonymous
/// requests are first-class on most routes, so handlers receive this rather
/// than bare `Claims`.
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<Claims>);

fn jwt_secret() -> String {
    std::env::var("WHISPER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into())
}

fn claims_from_request(req: &Request) -> Option<Claims> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Extract and validate the JWT from the Authorization header. Rejects the
/// request when it is missing or invalid.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = claims_from_request(&req).ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Same extraction without the rejection: anonymous callers pass through
/// with `MaybeClaims(None)`.
pub async fn optional_auth(mut req: Request, next: Next) -> Response {
    let claims = claims_from_request(&req);
    req.extensions_mut().insert(MaybeClaims(claims));
    next.run(req).await
}
