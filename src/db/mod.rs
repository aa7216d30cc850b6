//! Database module
//!
//! SQLite storage behind an r2d2 pool, the versioned schema bootstrap and
//! the repositories for users and restaurants.

pub mod manager;
pub mod migrations;
pub mod models;
pub mod repository;

pub use manager::DatabaseManager;
pub use models::{NewRestaurant, NewUser, Restaurant, RestaurantFilters, User};
pub use repository::{PrincipalStore, RestaurantRepository, UserRepository};
