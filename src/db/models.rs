//! Database models
//!
//! Data structures representing database tables

use chrono::{NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Storage format of every timestamp column (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Role every user holds implicitly
pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9\s\-()]+$").unwrap();
}

/// Current UTC time in [`TIMESTAMP_FORMAT`]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now().naive_utc())
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// User record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Explicitly granted roles, stored as a JSON array
    pub roles: Vec<String>,
    /// SHA-256 of the API key, unique lookup index
    #[serde(skip_serializing)]
    pub api_key_digest: String,
    /// Argon2id PHC string of the API key
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Granted roles plus the implicit `ROLE_USER`, deduplicated
    pub fn effective_roles(&self) -> Vec<String> {
        effective_roles(&self.roles)
    }
}

pub fn effective_roles(granted: &[String]) -> Vec<String> {
    let mut roles: Vec<String> = Vec::with_capacity(granted.len() + 1);
    for role in granted.iter().map(String::as_str).chain(std::iter::once(ROLE_USER)) {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }
    roles
}

/// Fields needed to insert a user; key material comes from `auth::api_key`
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub api_key_digest: String,
    pub api_key_hash: String,
}

/// Restaurant record in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRestaurant {
    pub name: String,
    pub address: String,
    pub phone: String,
}

impl NewRestaurant {
    /// Collects every violated constraint instead of stopping at the first one
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let name_len = self.name.trim().chars().count();
        if !(2..=255).contains(&name_len) {
            errors.push("name must be between 2 and 255 characters".to_string());
        }

        let address_len = self.address.trim().chars().count();
        if !(5..=500).contains(&address_len) {
            errors.push("address must be between 5 and 500 characters".to_string());
        }

        let phone_len = self.phone.chars().count();
        if !(9..=20).contains(&phone_len) {
            errors.push("phone must be between 9 and 20 characters".to_string());
        } else if !PHONE_REGEX.is_match(&self.phone) {
            errors.push("phone contains invalid characters".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestaurantPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl RestaurantPatch {
    pub fn apply_to(self, current: &Restaurant) -> NewRestaurant {
        NewRestaurant {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            address: self.address.unwrap_or_else(|| current.address.clone()),
            phone: self.phone.unwrap_or_else(|| current.phone.clone()),
        }
    }
}

/// Column a restaurant search is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Name,
    Address,
    Phone,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// `None` for names that are not sortable
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(SortField::Name),
            "address" => Some(SortField::Address),
            "phone" => Some(SortField::Phone),
            "created_at" | "createdAt" => Some(SortField::CreatedAt),
            "updated_at" | "updatedAt" => Some(SortField::UpdatedAt),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Address => "address",
            SortField::Phone => "phone",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Search criteria; every `Some` narrows the result set
#[derive(Debug, Clone, Default)]
pub struct RestaurantFilters {
    /// Matches name, address or phone
    pub search: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_from: Option<NaiveDate>,
    /// Inclusive through the end of the day
    pub created_to: Option<NaiveDate>,
    pub updated_from: Option<NaiveDate>,
    pub updated_to: Option<NaiveDate>,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl RestaurantFilters {
    /// Resolve `order_by` / `order_direction`; an unknown field sorts by name ascending
    pub fn with_ordering(mut self, order_by: Option<&str>, direction: Option<&str>) -> Self {
        match order_by.map(SortField::parse) {
            Some(None) => {
                self.sort = SortField::Name;
                self.direction = SortDirection::Asc;
            }
            Some(Some(field)) => {
                self.sort = field;
                self.direction = direction.map(SortDirection::parse).unwrap_or_default();
            }
            None => {
                self.sort = SortField::Name;
                self.direction = direction.map(SortDirection::parse).unwrap_or_default();
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantStatistics {
    pub total: i64,
    pub created_today: i64,
    pub created_this_week: i64,
    pub created_this_month: i64,
    pub average_per_day: f64,
}
