//! Authentication API handlers

use crate::api::extract::Json;
use crate::api::handlers::AppState;
use crate::auth::authenticator::API_KEY_COOKIE;
use crate::auth::models::{
    ApiKeyResponse, LoginRequest, LoginResponse, MessageResponse, Principal, RegisterRequest,
    RegisterResponse, UserInfo,
};
use crate::core::error::{AppError, AuthFailure, Result};
use crate::db::models::{NewUser, ROLE_ADMIN};
use crate::db::repository::PrincipalStore;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

const MAX_EMAIL_LENGTH: usize = 180;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Every violated registration constraint
fn validate_registration(req: &RegisterRequest) -> Vec<String> {
    let mut errors = Vec::new();

    let email = req.email.trim();
    if email.is_empty() {
        errors.push("email is required".to_string());
    } else if email.chars().count() > MAX_EMAIL_LENGTH {
        errors.push(format!("email cannot be longer than {} characters", MAX_EMAIL_LENGTH));
    } else if !EMAIL_REGEX.is_match(email) {
        errors.push("email is not a valid address".to_string());
    }

    let name_len = req.name.trim().chars().count();
    if name_len == 0 {
        errors.push("name is required".to_string());
    } else if !(2..=255).contains(&name_len) {
        errors.push("name must be between 2 and 255 characters".to_string());
    }

    errors
}

/// `Set-Cookie` value carrying the API key
fn api_key_cookie(value: &str, days: i64, secure: bool) -> String {
    let expires = Utc::now() + Duration::days(days);
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; Expires={}; HttpOnly; SameSite=Lax",
        API_KEY_COOKIE,
        value,
        days * 24 * 60 * 60,
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn expired_api_key_cookie() -> String {
    format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax",
        API_KEY_COOKIE
    )
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid cookie value: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// Handler for POST /api/auth/register - create a user and issue its API key
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!(email = %req.email, "User registration attempt");

    let errors = validate_registration(&req);
    if !errors.is_empty() {
        return Err(AppError::ValidationError(errors));
    }

    let email = req.email.trim().to_string();
    if state.user_repo.find_by_email(&email).await?.is_some() {
        return Err(AppError::ValidationError(vec![
            "email is already registered".to_string(),
        ]));
    }

    let roles = if req.roles.iter().any(|role| role == ROLE_ADMIN) {
        vec![ROLE_ADMIN.to_string()]
    } else {
        Vec::new()
    };

    let issued = state.api_keys.issue().await?;
    let user = state
        .user_repo
        .create(NewUser {
            email,
            name: req.name.trim().to_string(),
            roles,
            api_key_digest: issued.digest,
            api_key_hash: issued.hash,
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                AppError::ValidationError(vec!["email is already registered".to_string()])
            } else {
                e
            }
        })?;

    tracing::info!(user_id = user.id, email = %user.email, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user: UserInfo::from(user),
            api_key: issued.plaintext.into_string(),
        }),
    ))
}

/// Handler for POST /api/auth/login - check an email/key pair and set the key cookie
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Email is required".to_string()))?;

    tracing::info!(email = %email, "Login attempt");

    let user = state
        .user_repo
        .find_by_email(email)
        .await?
        .ok_or(AuthFailure::UnknownUser)?;

    let api_key = req
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AuthFailure::MissingCredential)?;

    let principal = state.authenticator.verify_credential(api_key).await?;
    if principal.id != user.id {
        return Err(AuthFailure::InvalidCredential.into());
    }

    tracing::info!(user_id = user.id, "Login successful");

    let security = &state.config.security;
    let cookie = api_key_cookie(api_key, security.api_key_cookie_days, security.cookie_secure);
    let response = Json(LoginResponse {
        message: "Login successful".to_string(),
        user: UserInfo::from(user),
    })
    .into_response();

    with_cookie(response, &cookie)
}

/// Handler for POST /api/auth/logout - expire the key cookie
pub async fn logout() -> Result<Response> {
    let response = Json(MessageResponse {
        message: "Logout successful".to_string(),
    })
    .into_response();

    with_cookie(response, &expired_api_key_cookie())
}

/// Handler for GET /api/auth/me - the authenticated user
pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<impl IntoResponse> {
    let user = state
        .user_repo
        .find_by_id(principal.id)
        .await?
        .ok_or(AuthFailure::InvalidCredential)?;

    Ok(Json(json!({ "user": UserInfo::from(user) })))
}

/// Handler for POST /api/auth/refresh-api-key - rotate the caller's key
pub async fn refresh_api_key(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response> {
    let api_key = state.api_keys.regenerate(principal.id).await?;

    let security = &state.config.security;
    let cookie = api_key_cookie(
        api_key.as_str(),
        security.api_key_cookie_days,
        security.cookie_secure,
    );
    let response = Json(ApiKeyResponse {
        message: "API key regenerated successfully".to_string(),
        api_key: api_key.into_string(),
    })
    .into_response();

    with_cookie(response, &cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            name: name.to_string(),
            roles: vec![],
        }
    }

    #[test]
    fn test_registration_validation() {
        assert!(validate_registration(&request("ana@example.com", "Ana")).is_empty());

        let errors = validate_registration(&request("", ""));
        assert_eq!(errors, vec!["email is required", "name is required"]);

        let errors = validate_registration(&request("not-an-email", "A"));
        assert_eq!(errors.len(), 2);

        let long_email = format!("{}@example.com", "a".repeat(180));
        assert_eq!(validate_registration(&request(&long_email, "Ana")).len(), 1);
    }

    #[test]
    fn test_api_key_cookie_attributes() {
        let cookie = api_key_cookie("abc", 7, true);
        assert!(cookie.starts_with("api_key=abc; Path=/; Max-Age=604800; Expires="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));

        assert!(!api_key_cookie("abc", 7, false).contains("Secure"));
        assert!(expired_api_key_cookie().contains("Max-Age=0"));
    }
}
