//! Admin subcommands
//!
//! Run against the configured database instead of starting the server.

use crate::auth::{ApiKeyHasher, ApiKeyService};
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::db::models::{NewUser, User, ROLE_ADMIN, ROLE_USER};
use crate::db::repository::{PrincipalStore, UserRepository};
use crate::db::DatabaseManager;
use clap::{ArgAction, Subcommand};
use std::sync::Arc;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a user and print its API key
    CreateUser {
        email: String,
        name: String,
        /// Grant ROLE_ADMIN
        #[arg(long)]
        admin: bool,
    },

    /// Issue a new API key for a user, invalidating the old one
    RegenerateApiKey { email: String },

    /// Replace the granted roles (comma separated); ROLE_USER is always implied
    UpdateRoles {
        email: String,
        #[arg(value_delimiter = ',')]
        roles: Vec<String>,
    },

    /// Activate or deactivate an account
    SetActive {
        email: String,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
}

/// Run `command`; returns the text to print
pub async fn run(command: Command, config: &Config, db: Arc<DatabaseManager>) -> Result<String> {
    let users = Arc::new(UserRepository::new(db));
    let api_keys = ApiKeyService::new(users.clone(), ApiKeyHasher::from_config(&config.security)?);

    match command {
        Command::CreateUser { email, name, admin } => {
            if users.find_by_email(&email).await?.is_some() {
                return Err(AppError::ValidationError(vec![format!(
                    "{} is already registered",
                    email
                )]));
            }

            let issued = api_keys.issue().await?;
            let roles = if admin {
                vec![ROLE_ADMIN.to_string()]
            } else {
                Vec::new()
            };
            let user = users
                .create(NewUser {
                    email,
                    name,
                    roles,
                    api_key_digest: issued.digest,
                    api_key_hash: issued.hash,
                })
                .await?;

            tracing::info!(user_id = user.id, "User created from the command line");
            Ok(format!(
                "Created user {} ({}) with roles {}\nAPI key: {}",
                user.id,
                user.email,
                user.effective_roles().join(","),
                issued.plaintext.as_str()
            ))
        }

        Command::RegenerateApiKey { email } => {
            let user = existing_user(&users, &email).await?;
            let api_key = api_keys.regenerate(user.id).await?;

            tracing::info!(user_id = user.id, "API key regenerated from the command line");
            Ok(format!("New API key for {}: {}", user.email, api_key.as_str()))
        }

        Command::UpdateRoles { email, roles } => {
            let granted = parse_roles(&roles)?;
            let user = existing_user(&users, &email).await?;
            users.update_roles(user.id, granted.clone()).await?;

            tracing::info!(user_id = user.id, roles = ?granted, "Roles updated from the command line");
            Ok(format!(
                "Roles for {}: {}",
                user.email,
                crate::db::models::effective_roles(&granted).join(",")
            ))
        }

        Command::SetActive { email, active } => {
            let user = existing_user(&users, &email).await?;
            users.set_active(user.id, active).await?;

            tracing::info!(user_id = user.id, active, "Account status changed from the command line");
            Ok(format!(
                "{} is now {}",
                user.email,
                if active { "active" } else { "inactive" }
            ))
        }
    }
}

async fn existing_user(users: &UserRepository, email: &str) -> Result<User> {
    users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))
}

/// Grantable roles; `ROLE_USER` is dropped since every account has it
fn parse_roles(raw: &[String]) -> Result<Vec<String>> {
    let mut granted = Vec::new();
    for role in raw.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        match role {
            ROLE_USER => {}
            ROLE_ADMIN => {
                if !granted.iter().any(|r| r == ROLE_ADMIN) {
                    granted.push(ROLE_ADMIN.to_string());
                }
            }
            other => {
                return Err(AppError::InvalidRequest(format!("Unknown role: {}", other)));
            }
        }
    }
    Ok(granted)
}
