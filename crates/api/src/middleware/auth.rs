use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::AuthenticatedUser;

/// Resolve the bearer token to an [`AuthContext`](crate::context::AuthContext)
/// and stash it in the request extensions.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let ctx = services.authenticate(token, Utc::now())?;

    let marker = AuthenticatedUser {
        user_id: ctx.user_id(),
        email: ctx.user().email.clone(),
    };
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    response.extensions_mut().insert(marker);
    Ok(response)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(ApiError::unauthenticated)?;

    let header = header.to_str().map_err(|_| ApiError::unauthenticated())?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or_else(ApiError::unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ApiError::unauthenticated());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&headers).ok(), Some("abc.def.ghi"));
    }
}
