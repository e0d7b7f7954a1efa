use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::server::AppState;

/// Bearer-token guard. A missing header or a scheme other than `Bearer`
/// (case-insensitive) is 401; a bearer token that does not match is 403.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Ok(value) = value.to_str() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    match state.auth_token.as_deref() {
        Some(expected) if token.trim() == expected => Ok(next.run(req).await),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => {
            warn!("Rejected request: no API token configured");
            Err(StatusCode::FORBIDDEN)
        }
    }
}
