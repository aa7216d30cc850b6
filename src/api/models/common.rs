use crate::core::error::{AppError, Result};
use chrono::NaiveDate;
use serde::Serialize;

/// Page metadata returned with paginated listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: u32, limit: u32) -> Self {
        let limit_i64 = i64::from(limit.max(1));
        Self {
            total,
            page,
            limit,
            pages: (total + limit_i64 - 1) / limit_i64,
        }
    }
}

/// Page number, never below 1
pub fn clamp_page(page: Option<i64>) -> u32 {
    page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32
}

/// Page size within `1..=max`, `default` when absent
pub fn clamp_limit(limit: Option<i64>, default: u32, max: u32) -> u32 {
    limit
        .unwrap_or_else(|| i64::from(default))
        .clamp(1, i64::from(max)) as u32
}

/// Parse an optional `YYYY-MM-DD` query parameter
pub fn parse_date_param(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AppError::InvalidRequest(format!(
                    "{} must be a date in YYYY-MM-DD format, got '{}'",
                    name, raw
                ))
            }),
    }
}
