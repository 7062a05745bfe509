//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::policy,
    error::{AppError, AppResult},
    models::user::{AuthResponse, LoginRequest, Principal, RegisterRequest},
};

use super::CurrentPrincipal;

/// Register a new reader account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = AuthResponse),
        (status = 400, description = "Invalid registration data", body = crate::error::ErrorResponse),
        (status = 409, description = "Username or email already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.services.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let response = state.services.auth.login(request).await?;
    Ok(Json(response))
}

/// Get the authenticated caller
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current principal", body = Principal),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(principal: CurrentPrincipal) -> AppResult<Json<Principal>> {
    match principal.0 {
        Some(principal) => Ok(Json(principal)),
        None => Err(AppError::Authentication(policy::AUTHENTICATION_REQUIRED.to_string())),
    }
}
