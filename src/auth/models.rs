//! Authentication request/response models

use crate::db::models::User;
use serde::{Deserialize, Serialize};

/// Authenticated caller, attached to the request by the auth middleware
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Effective roles, always including `ROLE_USER`
    pub roles: Vec<String>,
    pub active: bool,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Self {
            roles: user.effective_roles(),
            id: user.id,
            email: user.email,
            name: user.name,
            active: user.is_active,
        }
    }
}

/// Register request
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Only `ROLE_ADMIN` is accepted here; `ROLE_USER` is implicit
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Login request
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// User info without key material
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            roles: user.effective_roles(),
            id: user.id,
            email: user.email,
            name: user.name,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Registration response; `api_key` is shown only here
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserInfo,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserInfo,
}

/// Response of key regeneration; the new key is shown only here
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub message: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
