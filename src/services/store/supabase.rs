use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use super::normalize::booking_from_value;
use super::{BookingBackend, BookingFilter};
use crate::errors::StoreError;
use crate::models::{Booking, BookingPage, PaymentStatus, Slot};

/// SQLSTATE / PostgREST codes for a table that does not exist (yet).
const MISSING_TABLE_CODES: &[&str] = &["42P01", "PGRST205"];
const UNIQUE_VIOLATION: &str = "23505";

/// DDL for the bookings table, written against the default table name.
const SCHEMA: &str = include_str!("../../../migrations/supabase/001_cricket_bookings.sql");
const SCHEMA_TABLE: &str = "cricket_bookings";

/// Bookings in a PostgREST table (Supabase's REST interface).
pub struct SupabaseBackend {
    endpoint: String,
    exec_endpoint: String,
    table: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct BookingRow<'a> {
    id: &'a str,
    full_name: &'a str,
    mobile_number: &'a str,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    payment_status: &'static str,
    payment_screenshot: Option<&'a str>,
    total_amount: i64,
    slots: &'a [Slot],
}

impl<'a> From<&'a Booking> for BookingRow<'a> {
    fn from(b: &'a Booking) -> Self {
        Self {
            id: &b.id,
            full_name: &b.full_name,
            mobile_number: &b.mobile_number,
            date: b.date,
            created_at: b.created_at,
            payment_status: b.payment_status.as_str(),
            payment_screenshot: b.payment_screenshot.as_deref(),
            total_amount: b.total_amount,
            slots: &b.slots,
        }
    }
}

impl SupabaseBackend {
    pub fn new(base_url: &str, api_key: String, table: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            endpoint: format!("{base}/rest/v1/{table}"),
            exec_endpoint: format!("{base}/rest/v1/rpc/exec"),
            table: table.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// The schema with every object renamed after the configured table.
    pub fn schema_sql(&self) -> String {
        SCHEMA.replace(SCHEMA_TABLE, &self.table)
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.authorized(self.client.request(method, &self.endpoint))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(resp: Response) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }

    async fn rows(resp: Response) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<Value> = resp.json().await?;
        Ok(rows
            .iter()
            .filter_map(|row| match booking_from_value(row) {
                Ok(booking) => Some(booking),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable remote booking");
                    None
                }
            })
            .collect())
    }
}

fn classify(status: StatusCode, body: &str) -> StoreError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();

    if MISSING_TABLE_CODES.contains(&code.as_str()) || status == StatusCode::NOT_FOUND {
        StoreError::NotInitialized
    } else if code == UNIQUE_VIOLATION || status == StatusCode::CONFLICT {
        StoreError::SlotConflict(Vec::new())
    } else {
        StoreError::Persistence(format!("remote store returned {status}: {body}"))
    }
}

fn filter_params(filter: &BookingFilter) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(date) = filter.date {
        params.push(("date", format!("eq.{date}")));
    }
    if let Some(mobile) = &filter.mobile_number {
        params.push(("mobile_number", format!("eq.{mobile}")));
    }
    if filter.held_only {
        params.push(("payment_status", "neq.rejected".to_string()));
    }
    params
}

/// Total from a `Content-Range: 0-9/42` (or `*/0`) header.
fn parse_total(content_range: &str) -> Option<usize> {
    content_range.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl BookingBackend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let resp = self
            .request(Method::GET)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Runs the schema through the project's `exec(query)` SQL function.
    async fn initialize(&self) -> Result<(), StoreError> {
        let resp = self
            .authorized(self.client.post(&self.exec_endpoint))
            .json(&json!({ "query": self.schema_sql() }))
            .send()
            .await?;

        match Self::check(resp).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotInitialized) => Err(StoreError::Persistence(
                "exec function is not available on the remote project".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let resp = self
            .request(Method::POST)
            .header("Prefer", "return=minimal")
            .json(&BookingRow::from(booking))
            .send()
            .await?;

        match Self::check(resp).await {
            Ok(_) => Ok(()),
            Err(StoreError::SlotConflict(_)) => Err(StoreError::SlotConflict(
                booking.slot_ids().map(str::to_string).collect(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let resp = self
            .request(Method::GET)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
            .send()
            .await?;
        let rows = Self::rows(Self::check(resp).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(
        &self,
        filter: &BookingFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        params.extend(filter_params(filter));
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let resp = self.request(Method::GET).query(&params).send().await?;
        Self::rows(Self::check(resp).await?).await
    }

    async fn list_page(
        &self,
        filter: &BookingFilter,
        page: usize,
        page_size: usize,
    ) -> Result<BookingPage, StoreError> {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        params.extend(filter_params(filter));

        let resp = self
            .request(Method::GET)
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total);
        let bookings = Self::rows(resp).await?;

        Ok(BookingPage {
            total_count: total.unwrap_or(offset + bookings.len()),
            bookings,
        })
    }

    async fn update_status(&self, id: &str, status: PaymentStatus) -> Result<bool, StoreError> {
        let resp = self
            .request(Method::PATCH)
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "payment_status": status.as_str() }))
            .send()
            .await?;
        let updated: Vec<Value> = Self::check(resp).await?.json().await?;
        Ok(!updated.is_empty())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let resp = self
            .request(Method::DELETE)
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        let deleted: Vec<Value> = Self::check(resp).await?.json().await?;
        Ok(!deleted.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_missing_table() {
        let body = r#"{"code":"42P01","message":"relation \"public.cricket_bookings\" does not exist"}"#;
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, body),
            StoreError::NotInitialized
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, ""),
            StoreError::NotInitialized
        ));
    }

    #[test]
    fn test_classify_conflict_and_other() {
        assert!(matches!(
            classify(StatusCode::CONFLICT, r#"{"code":"23505"}"#),
            StoreError::SlotConflict(_)
        ));
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            StoreError::Persistence(_)
        ));
    }

    #[test]
    fn test_parse_total() {
        assert_eq!(parse_total("0-9/42"), Some(42));
        assert_eq!(parse_total("*/0"), Some(0));
        assert_eq!(parse_total("0-9/*"), None);
    }

    #[test]
    fn test_filter_params() {
        let filter = BookingFilter {
            date: NaiveDate::from_ymd_opt(2025, 6, 1),
            mobile_number: Some("9876543210".to_string()),
            held_only: true,
        };
        assert_eq!(
            filter_params(&filter),
            vec![
                ("date", "eq.2025-06-01".to_string()),
                ("mobile_number", "eq.9876543210".to_string()),
                ("payment_status", "neq.rejected".to_string()),
            ]
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let backend = SupabaseBackend::new("https://example.supabase.co/", "key".into(), "cricket_bookings");
        assert_eq!(
            backend.endpoint,
            "https://example.supabase.co/rest/v1/cricket_bookings"
        );
        assert_eq!(backend.exec_endpoint, "https://example.supabase.co/rest/v1/rpc/exec");
    }

    #[test]
    fn test_schema_guards_slot_claims() {
        let sql = SupabaseBackend::new("https://example.supabase.co", "key".into(), "cricket_bookings")
            .schema_sql();
        assert!(sql.contains("CHECK (payment_status IN ('pending', 'approved', 'rejected'))"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_cricket_bookings_date"));
        assert!(sql.contains("PRIMARY KEY (date, slot_id)"));
        assert!(sql.contains("AFTER INSERT OR UPDATE OF payment_status ON cricket_bookings"));
    }

    #[test]
    fn test_schema_follows_table_name() {
        let sql = SupabaseBackend::new("https://example.supabase.co", "key".into(), "venue_bookings")
            .schema_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS venue_bookings ("));
        assert!(sql.contains("venue_bookings_slot_claims"));
        assert!(!sql.contains("cricket_bookings"));
    }
}
