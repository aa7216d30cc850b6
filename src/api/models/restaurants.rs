use super::common::Pagination;
use crate::db::models::{Restaurant, RestaurantStatistics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query parameters for GET /api/restaurants
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Query parameters for GET /api/restaurants/search
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub updated_from: Option<String>,
    pub updated_to: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl SearchQuery {
    /// The non-empty criteria as received, with ordering defaults filled in
    pub fn applied(&self) -> BTreeMap<&'static str, String> {
        let fields = [
            ("search", &self.search),
            ("name", &self.name),
            ("address", &self.address),
            ("phone", &self.phone),
            ("created_from", &self.created_from),
            ("created_to", &self.created_to),
            ("updated_from", &self.updated_from),
            ("updated_to", &self.updated_to),
        ];

        let mut applied: BTreeMap<&'static str, String> = fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_string()))
            })
            .collect();

        applied.insert(
            "order_by",
            non_empty(&self.order_by).unwrap_or("name").to_string(),
        );
        applied.insert(
            "order_direction",
            non_empty(&self.order_direction).unwrap_or("ASC").to_string(),
        );
        applied
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct QuickSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RestaurantListResponse {
    pub results: Vec<Restaurant>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Restaurant>,
    pub pagination: Pagination,
    pub filters_applied: BTreeMap<&'static str, String>,
}

/// Lightweight row for autocompletion
#[derive(Debug, Serialize)]
pub struct QuickSearchResult {
    pub id: i64,
    pub name: String,
    pub address: String,
}

impl From<Restaurant> for QuickSearchResult {
    fn from(restaurant: Restaurant) -> Self {
        Self {
            id: restaurant.id,
            name: restaurant.name,
            address: restaurant.address,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuickSearchResponse {
    pub results: Vec<QuickSearchResult>,
    pub count: usize,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub reference_restaurant: Restaurant,
    pub similar_restaurants: Vec<Restaurant>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    #[serde(flatten)]
    pub statistics: RestaurantStatistics,
    pub generated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_filters_skip_empty_and_default_ordering() {
        let query = SearchQuery {
            name: Some("Pizza".to_string()),
            phone: Some(String::new()),
            ..Default::default()
        };

        let applied = query.applied();
        assert_eq!(applied.get("name").map(String::as_str), Some("Pizza"));
        assert!(!applied.contains_key("phone"));
        assert_eq!(applied.get("order_by").map(String::as_str), Some("name"));
        assert_eq!(applied.get("order_direction").map(String::as_str), Some("ASC"));
    }
}
