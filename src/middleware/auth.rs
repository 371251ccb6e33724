//! Bearer authentication middleware.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ApiError, AppError, TokenError};
use crate::models::User;
use crate::telemetry::{record_auth_attempt, AuthOutcome};
use crate::AppState;

/// The authenticated, active account behind the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn reject(err: AppError) -> Response {
    let (status, body): (StatusCode, Json<ApiError>) = err.into();
    (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
}

/// Extracts the bearer token from an `Authorization` header value.
/// The scheme is matched case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolves the bearer token to a user and stores it in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            record_auth_attempt("verify", AuthOutcome::Token(TokenError::Missing));
            reject(AppError::Unauthorized("Not authenticated".to_string()))
        })?;

    let user = state.credentials.resolve_user(token).map_err(reject)?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
