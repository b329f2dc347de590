//! Saksflyt API: Account Routes

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use saksflyt_core::error::FieldError;
use saksflyt_core::types::User;
use saksflyt_core::{Error, FieldErrors};

use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};

const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;
const EMAIL_MAX: usize = 255;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

fn validate_signup(request: &SignupRequest) -> Result<(), Error> {
    let mut errors = FieldErrors::new();
    let email = request.email.trim();
    if email.is_empty() || email.len() > EMAIL_MAX || !email.contains('@') {
        errors.push(FieldError {
            field: "email".into(),
            message: "must be a valid email address".into(),
        });
    }
    if request.password.len() < PASSWORD_MIN || request.password.len() > PASSWORD_MAX {
        errors.push(FieldError {
            field: "password".into(),
            message: format!("length must be {PASSWORD_MIN}..={PASSWORD_MAX}"),
        });
    }
    if request.full_name.trim().is_empty() || request.full_name.len() > EMAIL_MAX {
        errors.push(FieldError {
            field: "full_name".into(),
            message: format!("length must be 1..={EMAIL_MAX}"),
        });
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(errors))
    }
}

/// POST /api/v1/users/signup — create an owner account.
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    validate_signup(&request)?;
    let hash = state.auth.hash_password(&request.password)?;
    let user = state
        .store
        .create_user(&request.email, &hash, &request.full_name, false)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/login — exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state
        .store
        .find_user_by_email(&request.email)
        .await?
        .ok_or(Error::Unauthorized)?;
    if !user.is_active || !state.auth.verify_password(&request.password, &user.password_hash) {
        return Err(Error::Unauthorized.into());
    }
    Ok(Json(TokenResponse {
        access_token: state.auth.mint_token(user.id, Utc::now()),
        token_type: "bearer",
    }))
}

/// GET /api/v1/users/me — the authenticated user.
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<User> {
    Json(user.0)
}
