use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use cricketbox::db;
use cricketbox::errors::{AppError, StoreError};
use cricketbox::models::{BookingForm, PaymentStatus};
use cricketbox::services::lifecycle::BookingManager;
use cricketbox::services::store::{BookingBackend, BookingStore, LocalBackend, SupabaseBackend};

const API_KEY: &str = "anon-key";

// ── Mock PostgREST ──

#[derive(Default)]
struct Table {
    rows: Mutex<Vec<Value>>,
    /// (date, slot id) -> booking id, as kept by the slot claim table.
    claims: Mutex<HashMap<(String, String), String>>,
    missing: AtomicBool,
    executed: Mutex<Vec<String>>,
}

impl Table {
    fn missing() -> Self {
        Self {
            missing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    fn release(&self, booking_id: &str) {
        self.claims
            .lock()
            .unwrap()
            .retain(|_, owner| owner != booking_id);
    }
}

type Params = Query<HashMap<String, String>>;

fn missing_table() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "42P01",
            "message": "relation \"public.cricket_bookings\" does not exist",
        })),
    )
        .into_response()
}

fn guard(table: &Table, headers: &HeaderMap) -> Option<Response> {
    if headers.get("apikey").map_or(true, |k| k != API_KEY) {
        return Some(StatusCode::UNAUTHORIZED.into_response());
    }
    if table.missing.load(Ordering::SeqCst) {
        return Some(missing_table());
    }
    None
}

fn row_matches(row: &Value, params: &HashMap<String, String>) -> bool {
    params.iter().all(|(key, cond)| {
        if matches!(key.as_str(), "select" | "order" | "limit" | "offset") {
            return true;
        }
        let field = row[key.as_str()].as_str().unwrap_or("");
        if let Some(v) = cond.strip_prefix("eq.") {
            field == v
        } else if let Some(v) = cond.strip_prefix("neq.") {
            field != v
        } else {
            true
        }
    })
}

fn slot_ids(row: &Value) -> Vec<String> {
    row["slots"]
        .as_array()
        .map(|slots| {
            slots
                .iter()
                .filter_map(|s| s["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn select(
    State(table): State<Arc<Table>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Response {
    if let Some(res) = guard(&table, &headers) {
        return res;
    }

    let mut matched: Vec<Value> = table
        .rows
        .lock()
        .unwrap()
        .iter()
        .filter(|r| row_matches(r, &params))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b["created_at"].as_str().cmp(&a["created_at"].as_str()));

    let total = matched.len();
    let offset = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(usize::MAX);
    let page: Vec<Value> = matched.into_iter().skip(offset).take(limit).collect();

    let mut res = Json(page).into_response();
    if headers.get("prefer").map_or(false, |v| v == "count=exact") {
        res.headers_mut()
            .insert("content-range", format!("0-0/{total}").parse().unwrap());
    }
    res
}

async fn insert(
    State(table): State<Arc<Table>>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> Response {
    if let Some(res) = guard(&table, &headers) {
        return res;
    }

    let mut rows = table.rows.lock().unwrap();
    let mut claims = table.claims.lock().unwrap();
    let day = row["date"].as_str().unwrap_or("").to_string();
    let booking_id = row["id"].as_str().unwrap_or("").to_string();
    let keys: Vec<(String, String)> = slot_ids(&row)
        .into_iter()
        .map(|id| (day.clone(), id))
        .collect();
    if keys.iter().any(|k| claims.contains_key(k)) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"code": "23505", "message": "duplicate key value violates unique constraint"})),
        )
            .into_response();
    }

    if row["payment_status"] != "rejected" {
        for key in keys {
            claims.insert(key, booking_id.clone());
        }
    }
    rows.push(row);
    StatusCode::CREATED.into_response()
}

async fn update(
    State(table): State<Arc<Table>>,
    headers: HeaderMap,
    Query(params): Params,
    Json(patch): Json<Value>,
) -> Response {
    if let Some(res) = guard(&table, &headers) {
        return res;
    }

    let mut rows = table.rows.lock().unwrap();
    let mut updated = Vec::new();
    for row in rows.iter_mut().filter(|r| row_matches(r, &params)) {
        row["payment_status"] = patch["payment_status"].clone();
        if patch["payment_status"] == "rejected" {
            table.release(row["id"].as_str().unwrap_or(""));
        }
        updated.push(row.clone());
    }
    Json(updated).into_response()
}

async fn remove(
    State(table): State<Arc<Table>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Response {
    if let Some(res) = guard(&table, &headers) {
        return res;
    }

    let mut rows = table.rows.lock().unwrap();
    let (deleted, kept): (Vec<Value>, Vec<Value>) =
        rows.drain(..).partition(|r| row_matches(r, &params));
    *rows = kept;
    for row in &deleted {
        table.release(row["id"].as_str().unwrap_or(""));
    }
    Json(deleted).into_response()
}

async fn exec(
    State(table): State<Arc<Table>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.get("apikey").map_or(true, |k| k != API_KEY) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let query = body["query"].as_str().unwrap_or("").to_string();
    if query.contains("CREATE TABLE IF NOT EXISTS cricket_bookings (") {
        table.missing.store(false, Ordering::SeqCst);
    }
    table.executed.lock().unwrap().push(query);
    Json(Value::Null).into_response()
}

async fn spawn_postgrest(table: Arc<Table>) -> String {
    let app = Router::new()
        .route(
            "/rest/v1/cricket_bookings",
            get(select).post(insert).patch(update).delete(remove),
        )
        .route("/rest/v1/rpc/exec", post(exec))
        .with_state(table);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Helpers ──

fn june_first() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 30, 0).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn local() -> LocalBackend {
    LocalBackend::new(Arc::new(Mutex::new(db::init_db(":memory:").unwrap())))
}

fn remote(base_url: &str) -> SupabaseBackend {
    SupabaseBackend::new(base_url, API_KEY.to_string(), "cricket_bookings")
}

async fn manager_for(base_url: &str) -> BookingManager {
    let store = BookingStore::new(local(), Some(Box::new(remote(base_url)))).unwrap();
    store.probe().await;
    BookingManager::new(store, 14).with_clock(june_first)
}

async fn book(manager: &BookingManager, day: &str, hours: &[&str]) -> Result<String, AppError> {
    let mut form = BookingForm::new(date(day));
    form.full_name = "Priya Nair".to_string();
    form.mobile_number = "9123456780".to_string();
    let ids: Vec<String> = hours.iter().map(|h| format!("{day}-{h}")).collect();
    manager.select_slots(&mut form, &ids).await?;
    Ok(manager.create(&mut form, None).await?.id)
}

// ── Tests ──

#[tokio::test]
async fn test_missing_table_reads_empty_and_refuses_writes() {
    let table = Arc::new(Table::missing());
    let base = spawn_postgrest(table).await;
    let manager = manager_for(&base).await;

    assert!(!manager.store().is_initialized());
    assert_eq!(manager.store().status().backend, "uninitialized");
    assert!(manager.bookings().await.unwrap().is_empty());
    assert_eq!(manager.bookings_page(1, 10, None).await.unwrap().total_count, 0);

    let slots = manager.slots_for_date(date("2025-06-01")).await.unwrap();
    assert_eq!(slots.len(), 24);
    assert!(slots.iter().all(|s| s.is_available));

    let err = book(&manager, "2025-06-01", &["10:00"]).await.unwrap_err();
    assert!(matches!(err, AppError::NotInitialized));
    assert_eq!(err.action(), Some("switch_backend"));
}

#[tokio::test]
async fn test_switch_to_local_after_missing_table() {
    let table = Arc::new(Table::missing());
    let base = spawn_postgrest(table).await;
    let manager = manager_for(&base).await;

    manager.store().set_use_local(true).await.unwrap();
    let id = book(&manager, "2025-06-01", &["10:00"]).await.unwrap();

    let all = manager.bookings().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
}

#[tokio::test]
async fn test_unreachable_remote_is_uninitialized() {
    let manager = manager_for("http://127.0.0.1:1").await;
    assert!(!manager.store().is_initialized());
    assert!(manager.bookings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_lifecycle() {
    let table = Arc::new(Table::default());
    let base = spawn_postgrest(table.clone()).await;
    let manager = manager_for(&base).await;
    assert!(manager.store().is_initialized());
    assert_eq!(manager.store().status().backend, "supabase");

    let id = book(&manager, "2025-06-02", &["09:00", "20:00"]).await.unwrap();
    {
        let rows = table.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["payment_status"], "pending");
        assert_eq!(rows[0]["total_amount"], 1100);
        assert_eq!(rows[0]["date"], "2025-06-02");
    }

    let stored = manager.store().get(&id).await.unwrap().unwrap();
    assert_eq!(stored.full_name, "Priya Nair");
    assert_eq!(stored.slots.len(), 2);

    let err = book(&manager, "2025-06-02", &["20:00"]).await.unwrap_err();
    assert!(matches!(err, AppError::SlotConflict(_)));

    let refreshed = manager.reject(&id).await.unwrap();
    assert!(refreshed.slots[20].is_available);
    assert_eq!(refreshed.bookings[0].payment_status, PaymentStatus::Rejected);

    let second = book(&manager, "2025-06-02", &["20:00"]).await.unwrap();
    let page = manager.bookings_page(1, 1, Some(date("2025-06-02"))).await.unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.bookings.len(), 1);

    manager.remove(&second).await.unwrap();
    manager.remove(&id).await.unwrap();
    assert!(table.rows.lock().unwrap().is_empty());

    let err = manager.approve(&id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_remote_conflict_maps_to_slot_ids() {
    let table = Arc::new(Table::default());
    let base = spawn_postgrest(table).await;
    let manager = manager_for(&base).await;
    let id = book(&manager, "2025-06-03", &["15:00"]).await.unwrap();

    let mut duplicate = manager.store().get(&id).await.unwrap().unwrap();
    duplicate.id = "another".to_string();

    let err = remote(&base).insert(&duplicate).await.unwrap_err();
    match err {
        StoreError::SlotConflict(ids) => assert_eq!(ids, vec!["2025-06-03-15:00".to_string()]),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejects_bad_api_key() {
    let table = Arc::new(Table::default());
    let base = spawn_postgrest(table).await;
    let backend = SupabaseBackend::new(&base, "wrong".to_string(), "cricket_bookings");
    let err = backend.probe().await.unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
}

#[tokio::test]
async fn test_initialize_applies_schema() {
    let table = Arc::new(Table::missing());
    let base = spawn_postgrest(table.clone()).await;
    let manager = manager_for(&base).await;
    assert!(!manager.store().is_initialized());

    assert!(manager.store().initialize().await);
    assert!(manager.store().is_initialized());
    assert_eq!(manager.store().status().backend, "supabase");
    {
        let executed = table.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("cricket_bookings_slot_claims"));
        assert!(executed[0].contains("idx_cricket_bookings_date"));
    }

    book(&manager, "2025-06-02", &["11:00"]).await.unwrap();
    assert_eq!(table.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_initialize_without_exec_stays_uninitialized() {
    let manager = manager_for("http://127.0.0.1:1").await;
    assert!(!manager.store().initialize().await);
    assert!(!manager.store().is_initialized());
}

#[tokio::test]
async fn test_slot_claims_survive_stale_reads() {
    let table = Arc::new(Table::default());
    let base = spawn_postgrest(table.clone()).await;
    let manager = manager_for(&base).await;
    let first = book(&manager, "2025-06-04", &["18:00", "19:00"]).await.unwrap();

    // A second writer that never saw the first booking.
    let mut racing = manager.store().get(&first).await.unwrap().unwrap();
    racing.id = "racing".to_string();
    racing.slots.retain(|s| s.id.ends_with("19:00"));
    let err = remote(&base).insert(&racing).await.unwrap_err();
    assert!(matches!(err, StoreError::SlotConflict(_)));
    assert_eq!(table.rows.lock().unwrap().len(), 1);

    manager.reject(&first).await.unwrap();
    remote(&base).insert(&racing).await.unwrap();
    assert_eq!(table.claims.lock().unwrap().len(), 1);
}
