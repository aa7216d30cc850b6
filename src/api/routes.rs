//! API routes

use crate::api::handlers::{
    create_restaurant, delete_restaurant, get_restaurant, health_check, list_restaurants,
    quick_search, replace_restaurant, restaurant_statistics, search_restaurants,
    similar_restaurants, update_restaurant, AppState,
};
use crate::auth::handlers::{login, logout, me, refresh_api_key, register};
use crate::auth::middleware::authenticate;
use crate::core::error::AppError;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Build the route table
///
/// Authentication is optional on the protected routes: the middleware
/// attaches a principal when a credential is present, and handlers that need
/// one extract [`Principal`](crate::auth::Principal). Register, login and
/// logout sit outside it so a stale `api_key` cookie cannot block them.
pub fn build_api_routes(state: AppState) -> Router {
    let public_auth_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout));

    let auth_routes = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh-api-key", post(refresh_api_key));

    let restaurant_routes = Router::new()
        .route("/api/restaurants", get(list_restaurants).post(create_restaurant))
        .route("/api/restaurants/search", get(search_restaurants))
        .route("/api/restaurants/quick-search", get(quick_search))
        .route("/api/restaurants/statistics", get(restaurant_statistics))
        .route(
            "/api/restaurants/:id",
            get(get_restaurant)
                .put(replace_restaurant)
                .patch(update_restaurant)
                .delete(delete_restaurant),
        )
        .route("/api/restaurants/:id/similar", get(similar_restaurants));

    let protected_routes = Router::new()
        .merge(auth_routes)
        .merge(restaurant_routes)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_auth_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
