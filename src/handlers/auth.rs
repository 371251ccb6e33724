//! Authentication handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Registration,
    error::{AppError, ApiResult},
    handlers::{users::UserResponse, Names},
    models::User,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "correct horse battery")]
    pub password: String,
    /// Existing organization to join. Defaults to the default organization.
    #[schema(example = "Acme Corp")]
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "correct horse battery")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Seconds until the access token expires.
    #[schema(example = 1800)]
    pub expires_in: u64,
}

fn auth_response(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let access_token = state.credentials.issue_token(&user)?;
    let user = UserResponse::describe(user, &mut Names::new(state.store.as_ref()))?;
    Ok(AuthResponse {
        user,
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.credentials.tokens().lifetime_secs(),
    })
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError),
        (status = 409, description = "Username or email already taken", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    payload.validate().map_err(AppError::from)?;

    let user = state
        .credentials
        .register(Registration {
            username: payload.username.trim().to_string(),
            email: payload.email.to_lowercase(),
            password: payload.password,
            organization: payload.organization,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(auth_response(&state, user)?)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 403, description = "Account is inactive", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.validate().map_err(AppError::from)?;

    let user = state
        .credentials
        .authenticate(&payload.username, &payload.password)
        .await?;

    Ok(Json(auth_response(&state, user)?))
}
