//! Repository pattern implementation for data access layer
//!
//! Repositories own SQL; callers only see models from `db::models`.

use crate::core::error::Result;
use crate::db::manager::DatabaseManager;
use crate::db::models::{
    format_timestamp, now_timestamp, NewRestaurant, NewUser, Restaurant, RestaurantFilters,
    RestaurantStatistics, User,
};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDateTime};
use rusqlite::{OptionalExtension, Row};
use std::sync::Arc;

/// Principal lookups used by authentication
///
/// Every method is a keyed read; implementations must not cache.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Lookup by the SHA-256 digest of an API key
    async fn find_by_credential_digest(&self, digest: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn credential_digest_exists(&self, digest: &str) -> Result<bool>;
}

const USER_COLUMNS: &str = "id, email, name, roles, api_key_digest, api_key_hash, is_active, \
                            created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let roles: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        roles: serde_json::from_str(&roles).unwrap_or_default(),
        api_key_digest: row.get(4)?,
        api_key_hash: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn encode_roles(roles: &[String]) -> String {
    serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string())
}

/// Repository for User entities
pub struct UserRepository {
    db: Arc<DatabaseManager>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Insert a user and return the stored row
    ///
    /// A duplicate email or digest surfaces as a UNIQUE violation
    /// (see `AppError::is_unique_violation`).
    pub async fn create(&self, user: NewUser) -> Result<User> {
        self.db
            .execute(move |conn| {
                let now = now_timestamp();
                conn.execute(
                    "INSERT INTO users (email, name, roles, api_key_digest, api_key_hash, is_active, \
                     created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                    rusqlite::params![
                        user.email,
                        user.name,
                        encode_roles(&user.roles),
                        user.api_key_digest,
                        user.api_key_hash,
                        now
                    ],
                )?;
                let id = conn.last_insert_rowid();

                Ok(conn.query_row(
                    &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                    [id],
                    map_user,
                )?)
            })
            .await
    }

    /// Replace the stored key material and bump `updated_at`
    pub async fn update_api_key(&self, id: i64, digest: String, hash: String) -> Result<bool> {
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET api_key_digest = ?1, api_key_hash = ?2, updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![digest, hash, now_timestamp(), id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn update_roles(&self, id: i64, roles: Vec<String>) -> Result<bool> {
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET roles = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![encode_roles(&roles), now_timestamp(), id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![active, now_timestamp(), id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    async fn find_one(&self, column: &'static str, value: String) -> Result<Option<User>> {
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column),
                        [&value],
                        map_user,
                    )
                    .optional()?)
            })
            .await
    }
}

#[async_trait]
impl PrincipalStore for UserRepository {
    async fn find_by_credential_digest(&self, digest: &str) -> Result<Option<User>> {
        self.find_one("api_key_digest", digest.to_string()).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                        [id],
                        map_user,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email.to_string()).await
    }

    async fn credential_digest_exists(&self, digest: &str) -> Result<bool> {
        let digest = digest.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE api_key_digest = ?)",
                    [&digest],
                    |row| row.get(0),
                )?)
            })
            .await
    }
}

const RESTAURANT_COLUMNS: &str = "id, name, address, phone, created_at, updated_at";

fn map_restaurant(row: &Row<'_>) -> rusqlite::Result<Restaurant> {
    Ok(Restaurant {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// WHERE clause and its positional parameters for a set of filters
fn build_conditions(filters: &RestaurantFilters) -> (String, Vec<String>) {
    let mut params: Vec<String> = Vec::new();
    let mut conditions: Vec<&str> = Vec::new();

    if let Some(search) = &filters.search {
        conditions.push("(name LIKE ? OR address LIKE ? OR phone LIKE ?)");
        let pattern = format!("%{}%", search);
        params.push(pattern.clone());
        params.push(pattern.clone());
        params.push(pattern);
    }

    if let Some(name) = &filters.name {
        conditions.push("name LIKE ?");
        params.push(format!("%{}%", name));
    }

    if let Some(address) = &filters.address {
        conditions.push("address LIKE ?");
        params.push(format!("%{}%", address));
    }

    if let Some(phone) = &filters.phone {
        conditions.push("phone LIKE ?");
        params.push(format!("%{}%", phone));
    }

    if let Some(from) = filters.created_from {
        conditions.push("created_at >= ?");
        params.push(format!("{} 00:00:00", from));
    }

    if let Some(to) = filters.created_to {
        conditions.push("created_at <= ?");
        params.push(format!("{} 23:59:59", to));
    }

    if let Some(from) = filters.updated_from {
        conditions.push("updated_at >= ?");
        params.push(format!("{} 00:00:00", from));
    }

    if let Some(to) = filters.updated_to {
        conditions.push("updated_at <= ?");
        params.push(format!("{} 23:59:59", to));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    (clause, params)
}

/// Repository for Restaurant entities
pub struct RestaurantRepository {
    db: Arc<DatabaseManager>,
}

impl RestaurantRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Restaurant>> {
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM restaurants WHERE id = ?", RESTAURANT_COLUMNS),
                        [id],
                        map_restaurant,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn create(&self, restaurant: NewRestaurant) -> Result<Restaurant> {
        self.db
            .execute(move |conn| {
                let now = now_timestamp();
                conn.execute(
                    "INSERT INTO restaurants (name, address, phone, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    rusqlite::params![restaurant.name, restaurant.address, restaurant.phone, now],
                )?;
                let id = conn.last_insert_rowid();

                Ok(conn.query_row(
                    &format!("SELECT {} FROM restaurants WHERE id = ?", RESTAURANT_COLUMNS),
                    [id],
                    map_restaurant,
                )?)
            })
            .await
    }

    /// Overwrite every writable column; `None` when the id is unknown
    pub async fn update(&self, id: i64, restaurant: NewRestaurant) -> Result<Option<Restaurant>> {
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE restaurants SET name = ?1, address = ?2, phone = ?3, updated_at = ?4 \
                     WHERE id = ?5",
                    rusqlite::params![
                        restaurant.name,
                        restaurant.address,
                        restaurant.phone,
                        now_timestamp(),
                        id
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }

                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM restaurants WHERE id = ?", RESTAURANT_COLUMNS),
                        [id],
                        map_restaurant,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.db
            .execute(move |conn| Ok(conn.execute("DELETE FROM restaurants WHERE id = ?", [id])? > 0))
            .await
    }

    /// One page of matches plus the total number of matches
    pub async fn search(
        &self,
        filters: RestaurantFilters,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Restaurant>, i64)> {
        self.db
            .execute(move |conn| {
                let (clause, params) = build_conditions(&filters);

                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM restaurants{}", clause),
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get(0),
                )?;

                let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);
                let query = format!(
                    "SELECT {} FROM restaurants{} ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
                    RESTAURANT_COLUMNS,
                    clause,
                    filters.sort.column(),
                    filters.direction.as_sql(),
                    limit,
                    offset
                );

                let mut stmt = conn.prepare(&query)?;
                let restaurants = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), map_restaurant)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok((restaurants, total))
            })
            .await
    }

    /// Name, address or phone match in default order, capped at `limit`
    pub async fn quick_search(&self, term: &str, limit: u32) -> Result<Vec<Restaurant>> {
        let filters = RestaurantFilters {
            search: Some(term.to_string()),
            ..Default::default()
        };
        let (restaurants, _) = self.search(filters, 1, limit).await?;
        Ok(restaurants)
    }

    /// Other restaurants whose name or address contains the reference's
    pub async fn find_similar(&self, reference: &Restaurant, limit: u32) -> Result<Vec<Restaurant>> {
        let id = reference.id;
        let name = format!("%{}%", reference.name);
        let address = format!("%{}%", reference.address);

        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM restaurants WHERE id != ?1 AND (name LIKE ?2 OR address LIKE ?3) \
                     ORDER BY name ASC, id ASC LIMIT {}",
                    RESTAURANT_COLUMNS, limit
                ))?;
                let restaurants = stmt
                    .query_map(rusqlite::params![id, name, address], map_restaurant)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(restaurants)
            })
            .await
    }

    /// Creation counts relative to `now` (UTC); weeks start on Monday
    pub async fn statistics(&self, now: NaiveDateTime) -> Result<RestaurantStatistics> {
        self.db
            .execute(move |conn| {
                let today = now.date();
                let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                let month_start = today.with_day(1).unwrap_or(today);

                let count_since = |since: chrono::NaiveDate| -> rusqlite::Result<i64> {
                    conn.query_row(
                        "SELECT COUNT(*) FROM restaurants WHERE created_at >= ?",
                        [format_timestamp(since.and_time(chrono::NaiveTime::MIN))],
                        |row| row.get(0),
                    )
                };

                let total: i64 = conn.query_row("SELECT COUNT(*) FROM restaurants", [], |row| row.get(0))?;
                let created_today = count_since(today)?;
                let created_this_week = count_since(week_start)?;
                let created_this_month = count_since(month_start)?;

                let elapsed_days = (now - month_start.and_time(chrono::NaiveTime::MIN)).num_days();
                let average_per_day = if elapsed_days > 0 {
                    (created_this_month as f64 / elapsed_days as f64 * 100.0).round() / 100.0
                } else {
                    0.0
                };

                Ok(RestaurantStatistics {
                    total,
                    created_today,
                    created_this_week,
                    created_this_month,
                    average_per_day,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{SortDirection, SortField};
    use chrono::NaiveDate;

    fn setup() -> Arc<DatabaseManager> {
        Arc::new(DatabaseManager::new_in_memory().unwrap())
    }

    fn new_user(email: &str, digest: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            roles: vec![],
            api_key_digest: digest.to_string(),
            api_key_hash: "$argon2id$stub".to_string(),
        }
    }

    async fn seed(db: &Arc<DatabaseManager>, rows: &[(&str, &str, &str, &str)]) {
        let rows: Vec<(String, String, String, String)> = rows
            .iter()
            .map(|(n, a, p, c)| (n.to_string(), a.to_string(), p.to_string(), c.to_string()))
            .collect();
        db.transaction(move |tx| {
            for (name, address, phone, created_at) in rows {
                tx.execute(
                    "INSERT INTO restaurants (name, address, phone, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    rusqlite::params![name, address, phone, created_at],
                )?;
            }
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_user_lookup_by_digest_and_email() {
        let repo = UserRepository::new(setup());
        let created = repo.create(new_user("ana@example.com", "digest-a")).await.unwrap();
        assert!(created.is_active);

        let by_digest = repo.find_by_credential_digest("digest-a").await.unwrap().unwrap();
        assert_eq!(by_digest.id, created.id);

        let by_email = repo.find_by_email("ana@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.api_key_hash, "$argon2id$stub");

        assert!(repo.find_by_credential_digest("missing").await.unwrap().is_none());
        assert!(repo.credential_digest_exists("digest-a").await.unwrap());
        assert!(!repo.credential_digest_exists("digest-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let repo = UserRepository::new(setup());
        repo.create(new_user("ana@example.com", "digest-a")).await.unwrap();

        let err = repo.create(new_user("ana@example.com", "digest-b")).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_user_mutations() {
        let repo = UserRepository::new(setup());
        let user = repo.create(new_user("ana@example.com", "digest-a")).await.unwrap();

        assert!(repo
            .update_api_key(user.id, "digest-new".to_string(), "hash-new".to_string())
            .await
            .unwrap());
        assert!(repo.find_by_credential_digest("digest-a").await.unwrap().is_none());

        repo.update_roles(user.id, vec!["ROLE_ADMIN".to_string()]).await.unwrap();
        repo.set_active(user.id, false).await.unwrap();

        let reloaded = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.roles, vec!["ROLE_ADMIN".to_string()]);
        assert!(!reloaded.is_active);
        assert_eq!(reloaded.api_key_digest, "digest-new");

        assert!(!repo.set_active(9999, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_filters_and_pagination() {
        let db = setup();
        seed(
            &db,
            &[
                ("Casa Pepe", "Calle Mayor 1, Madrid", "912345678", "2024-03-01 12:00:00"),
                ("Bar Manolo", "Plaza Sol 3, Madrid", "913334444", "2024-03-05 09:30:00"),
                ("El Faro", "Paseo Maritimo 9, Malaga", "952111222", "2024-03-10 20:00:00"),
            ],
        )
        .await;
        let repo = RestaurantRepository::new(db);

        let filters = RestaurantFilters {
            search: Some("Madrid".to_string()),
            ..Default::default()
        };
        let (results, total) = repo.search(filters, 1, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(results[0].name, "Bar Manolo");

        let filters = RestaurantFilters {
            created_from: NaiveDate::from_ymd_opt(2024, 3, 5),
            created_to: NaiveDate::from_ymd_opt(2024, 3, 10),
            sort: SortField::CreatedAt,
            direction: SortDirection::Desc,
            ..Default::default()
        };
        let (results, total) = repo.search(filters, 1, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(results[0].name, "El Faro");

        let (page_two, total) = repo.search(RestaurantFilters::default(), 2, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].name, "El Faro");
    }

    #[tokio::test]
    async fn test_find_similar_excludes_reference() {
        let db = setup();
        seed(
            &db,
            &[
                ("Pizzeria", "Calle Roma 1", "911111111", "2024-03-01 12:00:00"),
                ("Pizzeria Napoli", "Calle Napoles 2", "922222222", "2024-03-01 12:00:00"),
                ("Sushi Bar", "Calle Roma 1", "933333333", "2024-03-01 12:00:00"),
                ("Asador", "Avenida Norte 5", "944444444", "2024-03-01 12:00:00"),
            ],
        )
        .await;
        let repo = RestaurantRepository::new(db);

        let reference = repo.find_by_id(1).await.unwrap().unwrap();
        let similar = repo.find_similar(&reference, 5).await.unwrap();
        let names: Vec<&str> = similar.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Pizzeria Napoli", "Sushi Bar"]);

        let capped = repo.find_similar(&reference, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_statistics_windows() {
        let db = setup();
        seed(
            &db,
            &[
                ("Today", "Calle Uno 1", "911111111", "2024-05-15 08:00:00"),
                ("Monday", "Calle Dos 2", "922222222", "2024-05-13 10:00:00"),
                ("Early May", "Calle Tres 3", "933333333", "2024-05-02 10:00:00"),
                ("April", "Calle Cuatro 4", "944444444", "2024-04-20 10:00:00"),
            ],
        )
        .await;
        let repo = RestaurantRepository::new(db);

        // Wednesday
        let now = NaiveDate::from_ymd_opt(2024, 5, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let stats = repo.statistics(now).await.unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.created_today, 1);
        assert_eq!(stats.created_this_week, 2);
        assert_eq!(stats.created_this_month, 3);
        // 3 restaurants over 14 full days
        assert_eq!(stats.average_per_day, 0.21);
    }

    #[tokio::test]
    async fn test_statistics_first_day_of_month() {
        let repo = RestaurantRepository::new(setup());
        let now = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let stats = repo.statistics(now).await.unwrap();
        assert_eq!(stats.average_per_day, 0.0);
    }

    #[tokio::test]
    async fn test_restaurant_crud() {
        let repo = RestaurantRepository::new(setup());
        let created = repo
            .create(NewRestaurant {
                name: "Casa Pepe".to_string(),
                address: "Calle Mayor 1".to_string(),
                phone: "912345678".to_string(),
            })
            .await
            .unwrap();

        let updated = repo
            .update(
                created.id,
                NewRestaurant {
                    name: "Casa Pepe II".to_string(),
                    address: "Calle Mayor 1".to_string(),
                    phone: "912345678".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Casa Pepe II");

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
    }
}
