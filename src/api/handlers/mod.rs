pub mod restaurants;
pub mod system;

pub use restaurants::*;
pub use system::*;

use crate::auth::{ApiKeyAuthenticator, ApiKeyHasher, ApiKeyService};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::rate_limiter::RateLimiterBank;
use crate::db::repository::{PrincipalStore, RestaurantRepository, UserRepository};
use crate::db::DatabaseManager;
use std::sync::Arc;

/// Shared application state for handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseManager>,
    pub user_repo: Arc<UserRepository>,
    pub restaurant_repo: Arc<RestaurantRepository>,
    pub authenticator: Arc<ApiKeyAuthenticator>,
    pub api_keys: Arc<ApiKeyService>,
    pub rate_limiter: Arc<RateLimiterBank>,
}

impl AppState {
    /// Wire repositories, credential services and the limiter bank
    pub fn new(config: Config, db: Arc<DatabaseManager>) -> Result<Self> {
        let hasher = ApiKeyHasher::from_config(&config.security)?;

        let user_repo = Arc::new(UserRepository::new(db.clone()));
        let restaurant_repo = Arc::new(RestaurantRepository::new(db.clone()));
        let store: Arc<dyn PrincipalStore> = user_repo.clone();

        Ok(Self {
            config: Arc::new(config),
            authenticator: Arc::new(ApiKeyAuthenticator::new(store, hasher.clone())),
            api_keys: Arc::new(ApiKeyService::new(user_repo.clone(), hasher)),
            rate_limiter: Arc::new(RateLimiterBank::new()),
            user_repo,
            restaurant_repo,
            db,
        })
    }
}
