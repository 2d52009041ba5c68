//! Shared API envelope and query types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// `?limit=` for ledger listings
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_ledger_limit")]
    pub limit: i64,
}

fn default_ledger_limit() -> i64 {
    50
}

/// `?date=YYYY-MM-DD`, today when absent
#[derive(Debug, Deserialize)]
pub struct DueDateQuery {
    pub date: Option<NaiveDate>,
}

/// `?older_than_minutes=` for the stale collection pass
#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default = "default_stale_minutes")]
    pub older_than_minutes: i64,
}

fn default_stale_minutes() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_ok() {
        let json = serde_json::to_value(ApiResponse::ok(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_query_defaults() {
        let q: LedgerQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 50);

        let r: ReconcileQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(r.older_than_minutes, 30);

        let d: DueDateQuery = serde_json::from_str(r#"{"date":"2024-03-01"}"#).unwrap();
        assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
