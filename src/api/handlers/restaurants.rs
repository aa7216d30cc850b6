use super::AppState;
use crate::api::extract::{Json, Path, Query};
use crate::api::models::{
    clamp_limit, clamp_page, parse_date_param, ListQuery, Pagination, QuickSearchQuery,
    QuickSearchResponse, QuickSearchResult, RestaurantListResponse, SearchQuery, SearchResponse,
    SimilarQuery, SimilarResponse, StatisticsResponse,
};
use crate::auth::Principal;
use crate::core::error::{AppError, Result};
use crate::db::models::{NewRestaurant, Restaurant, RestaurantFilters, RestaurantPatch};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

const SEARCH_MAX_LIMIT: u32 = 100;
const SEARCH_DEFAULT_LIMIT: u32 = 10;
const QUICK_SEARCH_MAX_LIMIT: u32 = 50;
const QUICK_SEARCH_DEFAULT_LIMIT: u32 = 10;
const QUICK_SEARCH_MIN_CHARS: usize = 2;
const SIMILAR_MAX_LIMIT: u32 = 20;
const SIMILAR_DEFAULT_LIMIT: u32 = 5;

fn text_filter(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn filters_from_query(query: &SearchQuery) -> Result<RestaurantFilters> {
    let filters = RestaurantFilters {
        search: text_filter(&query.search),
        name: text_filter(&query.name),
        address: text_filter(&query.address),
        phone: text_filter(&query.phone),
        created_from: parse_date_param("created_from", query.created_from.as_deref())?,
        created_to: parse_date_param("created_to", query.created_to.as_deref())?,
        updated_from: parse_date_param("updated_from", query.updated_from.as_deref())?,
        updated_to: parse_date_param("updated_to", query.updated_to.as_deref())?,
        ..Default::default()
    };

    Ok(filters.with_ordering(
        query.order_by.as_deref().filter(|v| !v.is_empty()),
        query.order_direction.as_deref().filter(|v| !v.is_empty()),
    ))
}

async fn load(state: &AppState, id: i64) -> Result<Restaurant> {
    state
        .restaurant_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restaurant {} not found", id)))
}

fn validated(restaurant: NewRestaurant) -> Result<NewRestaurant> {
    let restaurant = NewRestaurant {
        name: restaurant.name.trim().to_string(),
        address: restaurant.address.trim().to_string(),
        phone: restaurant.phone.trim().to_string(),
    };
    restaurant.validate().map_err(AppError::ValidationError)?;
    Ok(restaurant)
}

/// Handler for GET /api/restaurants - paginated listing by name
pub async fn list_restaurants(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let page = clamp_page(query.page);
    let limit = clamp_limit(query.limit, SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT);

    let (results, total) = state
        .restaurant_repo
        .search(RestaurantFilters::default(), page, limit)
        .await?;

    Ok(Json(RestaurantListResponse {
        results,
        pagination: Pagination::new(total, page, limit),
    }))
}

/// Handler for GET /api/restaurants/:id
pub async fn get_restaurant(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(load(&state, id).await?))
}

/// Handler for POST /api/restaurants
pub async fn create_restaurant(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewRestaurant>,
) -> Result<impl IntoResponse> {
    let restaurant = state.restaurant_repo.create(validated(req)?).await?;

    tracing::info!(
        restaurant_id = restaurant.id,
        user_id = principal.id,
        "Restaurant created"
    );
    Ok((StatusCode::CREATED, Json(restaurant)))
}

/// Handler for PUT /api/restaurants/:id - replace every field
pub async fn replace_restaurant(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<NewRestaurant>,
) -> Result<impl IntoResponse> {
    let restaurant = state
        .restaurant_repo
        .update(id, validated(req)?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restaurant {} not found", id)))?;

    tracing::info!(restaurant_id = id, user_id = principal.id, "Restaurant replaced");
    Ok(Json(restaurant))
}

/// Handler for PATCH /api/restaurants/:id - update the given fields
pub async fn update_restaurant(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(patch): Json<RestaurantPatch>,
) -> Result<impl IntoResponse> {
    let current = load(&state, id).await?;
    let restaurant = state
        .restaurant_repo
        .update(id, validated(patch.apply_to(&current))?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Restaurant {} not found", id)))?;

    tracing::info!(restaurant_id = id, user_id = principal.id, "Restaurant updated");
    Ok(Json(restaurant))
}

/// Handler for DELETE /api/restaurants/:id
pub async fn delete_restaurant(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if !state.restaurant_repo.delete(id).await? {
        return Err(AppError::NotFound(format!("Restaurant {} not found", id)));
    }

    tracing::info!(restaurant_id = id, user_id = principal.id, "Restaurant deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/restaurants/search - filtered, ordered and paginated
pub async fn search_restaurants(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let filters = filters_from_query(&query)?;
    let page = clamp_page(query.page);
    let limit = clamp_limit(query.limit, SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT);

    let (results, total) = state.restaurant_repo.search(filters, page, limit).await?;

    Ok(Json(SearchResponse {
        results,
        pagination: Pagination::new(total, page, limit),
        filters_applied: query.applied(),
    }))
}

/// Handler for GET /api/restaurants/quick-search - unpaginated autocompletion
pub async fn quick_search(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<QuickSearchQuery>,
) -> Result<impl IntoResponse> {
    let term = query.q.as_deref().unwrap_or_default().trim().to_string();
    if term.chars().count() < QUICK_SEARCH_MIN_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Search term must be at least {} characters",
            QUICK_SEARCH_MIN_CHARS
        )));
    }
    let limit = clamp_limit(query.limit, QUICK_SEARCH_DEFAULT_LIMIT, QUICK_SEARCH_MAX_LIMIT);

    let results: Vec<QuickSearchResult> = state
        .restaurant_repo
        .quick_search(&term, limit)
        .await?
        .into_iter()
        .map(QuickSearchResult::from)
        .collect();

    Ok(Json(QuickSearchResponse {
        count: results.len(),
        results,
        query: term,
    }))
}

/// Handler for GET /api/restaurants/:id/similar
pub async fn similar_restaurants(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> Result<impl IntoResponse> {
    let reference = load(&state, id).await?;
    let limit = clamp_limit(query.limit, SIMILAR_DEFAULT_LIMIT, SIMILAR_MAX_LIMIT);

    let similar = state.restaurant_repo.find_similar(&reference, limit).await?;

    Ok(Json(SimilarResponse {
        count: similar.len(),
        reference_restaurant: reference,
        similar_restaurants: similar,
    }))
}

/// Handler for GET /api/restaurants/statistics
pub async fn restaurant_statistics(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let statistics = state.restaurant_repo.statistics(now.naive_utc()).await?;

    Ok(Json(StatisticsResponse {
        statistics,
        generated_at: now.to_rfc3339(),
    }))
}
