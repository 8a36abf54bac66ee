//! In-process stand-in for the local terminal server and the cloud.
//!
//! One axum app serves both APIs (their paths don't overlap). Tests seed and
//! inspect [`MockState`] and program failures through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bridge_db::{Database, DbConfig};
use serde_json::{json, Value};

use crate::config::{BridgeConfig, ReferenceSettings};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const CLOUD_TOKEN: &str = "cloud-token";

type Params = Query<HashMap<String, String>>;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
pub struct MockState {
    // local: auth
    pub valid_token: Option<String>,
    pub logins: u32,
    /// Next N authenticated calls answer 400 regardless of token.
    pub stale_responses: u32,
    /// Authenticated requests seen, as "METHOD path".
    pub requests: Vec<String>,

    // local: records
    pub employees: Vec<Value>,
    pub transactions: Vec<Value>,
    pub areas: Vec<Value>,
    pub departments: Vec<Value>,
    pub employee_page_size: usize,
    pub transaction_page_size: usize,
    /// Employee writes touching this emp_code answer 500.
    pub failing_emp_code: Option<i64>,
    /// Employee writes naming an unknown area or department answer 400.
    pub check_references: bool,
    pub transaction_queries: Vec<String>,
    pub deleted_transactions: Vec<i64>,
    next_id: i64,

    // cloud
    pub cloud_users: Vec<Value>,
    pub cloud_page_size: usize,
    pub uploads: Vec<Value>,
    /// Status answered by the attendance upload endpoint.
    pub upload_status: u16,
}

impl MockState {
    fn new() -> Self {
        MockState {
            employee_page_size: 100,
            transaction_page_size: 100,
            cloud_page_size: 100,
            upload_status: 201,
            next_id: 1000,
            ..Default::default()
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub base_url: String,
    state: Shared,
}

impl MockServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::new()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockServer { base_url, state }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Config pointing both clients at this server, with no page delay.
    pub fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.local.base_url = self.base_url.clone();
        config.local.username = USERNAME.into();
        config.local.password = PASSWORD.into();
        config.local.timeout_secs = 5;
        config.cloud.base_url = self.base_url.clone();
        config.cloud.api_token = CLOUD_TOKEN.into();
        config.cloud.page_delay_ms = 0;
        config.cloud.timeout_secs = 5;
        config.reference = ReferenceSettings::default();
        config
    }

    pub fn add_employee(&self, id: i64, emp_code: &str, first_name: &str) {
        self.state().employees.push(json!({
            "id": id, "emp_code": emp_code, "first_name": first_name,
            "card_no": null, "update_time": "2024-01-01 00:00:00"
        }));
    }

    pub fn add_transaction(&self, id: i64, emp_code: i64, punch_time: &str) {
        self.state().transactions.push(json!({
            "id": id, "emp_code": emp_code, "punch_time": punch_time
        }));
    }

    pub fn add_cloud_user(&self, id: i64, unique_id: &str, name: &str) {
        self.state()
            .cloud_users
            .push(json!({ "id": id, "unique_id": unique_id, "name": name }));
    }

    /// Emp codes and names currently on the local side.
    pub fn employee_names(&self) -> Vec<(String, String)> {
        self.state()
            .employees
            .iter()
            .map(|e| {
                (
                    value_str(&e["emp_code"]),
                    e["first_name"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn value_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

// =============================================================================
// Router
// =============================================================================

fn router(state: Shared) -> Router {
    Router::new()
        .route("/jwt-api-token-auth/", post(login))
        .route(
            "/personnel/api/employees/",
            get(list_employees).post(create_employee),
        )
        .route(
            "/personnel/api/employees/{id}/",
            axum::routing::put(update_employee).delete(delete_employee),
        )
        .route("/iclock/api/transactions/", get(list_transactions))
        .route("/iclock/api/transactions/{id}/", delete(delete_transaction))
        .route("/personnel/api/areas/", get(list_areas).post(create_area))
        .route(
            "/personnel/api/departments/",
            get(list_departments).post(create_department),
        )
        .route("/zkteco/sync/bridge/users/", get(cloud_users))
        .route("/zkteco/sync/bridge/attendance_data/", post(cloud_upload))
        .with_state(state)
}

fn page_of(items: &[Value], size: usize, page: usize) -> (Vec<Value>, bool) {
    let start = (page.max(1) - 1) * size;
    let chunk: Vec<Value> = items.iter().skip(start).take(size).cloned().collect();
    let more = start + size < items.len();
    (chunk, more)
}

fn page_param(q: &HashMap<String, String>, key: &str) -> usize {
    q.get(key).and_then(|v| v.parse().ok()).unwrap_or(1)
}

/// Applies the stale-token program and the token check.
fn authorize(s: &mut MockState, headers: &HeaderMap, label: String) -> Result<(), Response> {
    s.requests.push(label);

    if s.stale_responses > 0 {
        s.stale_responses -= 1;
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Signature has expired." })),
        )
            .into_response());
    }

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "));

    match (presented, s.valid_token.as_deref()) {
        (Some(p), Some(valid)) if p == valid => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid token." })),
        )
            .into_response()),
    }
}

// =============================================================================
// Local Handlers
// =============================================================================

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut s = state.lock().unwrap();

    if body["username"] != USERNAME || body["password"] != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "non_field_errors": ["Unable to log in with provided credentials."] })),
        )
            .into_response();
    }

    s.logins += 1;
    let token = format!("jwt-{}", s.logins);
    s.valid_token = Some(token.clone());
    Json(json!({ "token": token })).into_response()
}

async fn list_employees(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(q): Params,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, "GET employees".into()) {
        return resp;
    }

    let size = q
        .get("page_size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(s.employee_page_size)
        .min(s.employee_page_size);
    let page = page_param(&q, "page");
    let (data, more) = page_of(&s.employees, size, page);
    let next = more.then(|| format!("/personnel/api/employees/?page={}", page + 1));

    Json(json!({ "count": s.employees.len(), "next": next, "data": data })).into_response()
}

fn employee_write_fails(s: &MockState, emp_code: Option<i64>) -> bool {
    emp_code.is_some() && s.failing_emp_code == emp_code
}

fn has_id(records: &[Value], id: &Value) -> bool {
    records.iter().any(|r| &r["id"] == id)
}

fn unknown_reference(s: &MockState, body: &Value) -> Option<Response> {
    if !s.check_references {
        return None;
    }

    let areas = body["area"].as_array().cloned().unwrap_or_default();
    if let Some(area) = areas.iter().find(|id| !has_id(&s.areas, id)) {
        let detail = format!("Invalid pk \"{}\" - object does not exist.", area);
        return Some((StatusCode::BAD_REQUEST, Json(json!({ "area": [detail] }))).into_response());
    }
    if !has_id(&s.departments, &body["department"]) {
        let detail = format!(
            "Invalid pk \"{}\" - object does not exist.",
            body["department"]
        );
        return Some(
            (StatusCode::BAD_REQUEST, Json(json!({ "department": [detail] }))).into_response(),
        );
    }
    None
}

async fn create_employee(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, "POST employees".into()) {
        return resp;
    }

    let emp_code = value_i64(&body["emp_code"]);
    if employee_write_fails(&s, emp_code) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "employee write failed").into_response();
    }
    if let Some(resp) = unknown_reference(&s, &body) {
        return resp;
    }

    let id = s.next_id();
    let record = json!({
        "id": id,
        "emp_code": emp_code.map(|c| c.to_string()),
        "first_name": body["first_name"],
        "department": body["department"],
        "area": body["area"],
    });
    s.employees.push(record.clone());
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn update_employee(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, format!("PUT employees/{}", id)) {
        return resp;
    }

    let emp_code = value_i64(&body["emp_code"]);
    if employee_write_fails(&s, emp_code) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "employee write failed").into_response();
    }
    if let Some(resp) = unknown_reference(&s, &body) {
        return resp;
    }

    match s.employees.iter_mut().find(|e| e["id"] == id) {
        Some(employee) => {
            employee["first_name"] = body["first_name"].clone();
            employee["department"] = body["department"].clone();
            employee["area"] = body["area"].clone();
            Json(employee.clone()).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response(),
    }
}

async fn delete_employee(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, format!("DELETE employees/{}", id)) {
        return resp;
    }

    let emp_code = s
        .employees
        .iter()
        .find(|e| e["id"] == id)
        .and_then(|e| value_i64(&e["emp_code"]));
    if employee_write_fails(&s, emp_code) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "employee write failed").into_response();
    }

    s.employees.retain(|e| e["id"] != id);
    StatusCode::NO_CONTENT.into_response()
}

async fn list_transactions(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(q): Params,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, "GET transactions".into()) {
        return resp;
    }

    let start_time = q.get("start_time").cloned().unwrap_or_default();
    s.transaction_queries.push(start_time.clone());

    let matching: Vec<Value> = s
        .transactions
        .iter()
        .filter(|t| t["punch_time"].as_str().map_or(true, |p| p >= start_time.as_str()))
        .cloned()
        .collect();

    let page = page_param(&q, "page");
    let (data, more) = page_of(&matching, s.transaction_page_size, page);
    let next = more.then(|| format!("/iclock/api/transactions/?page={}", page + 1));

    Json(json!({ "count": matching.len(), "next": next, "data": data })).into_response()
}

async fn delete_transaction(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut s = state.lock().unwrap();
    if let Err(resp) = authorize(&mut s, &headers, format!("DELETE transactions/{}", id)) {
        return resp;
    }

    let before = s.transactions.len();
    s.transactions.retain(|t| t["id"] != id);
    if s.transactions.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response();
    }

    s.deleted_transactions.push(id);
    StatusCode::NO_CONTENT.into_response()
}

fn list_reference(s: &mut MockState, headers: &HeaderMap, areas: bool) -> Response {
    let label = if areas { "GET areas" } else { "GET departments" };
    if let Err(resp) = authorize(s, headers, label.into()) {
        return resp;
    }

    let items = if areas { &s.areas } else { &s.departments };
    Json(json!({ "count": items.len(), "next": null, "data": items })).into_response()
}

fn create_reference(s: &mut MockState, headers: &HeaderMap, areas: bool, body: Value) -> Response {
    let label = if areas { "POST areas" } else { "POST departments" };
    if let Err(resp) = authorize(s, headers, label.into()) {
        return resp;
    }

    let id = s.next_id();
    let mut record = body;
    record["id"] = json!(id);

    if areas {
        s.areas.push(record.clone());
    } else {
        s.departments.push(record.clone());
    }
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn list_areas(State(state): State<Shared>, headers: HeaderMap) -> Response {
    list_reference(&mut state.lock().unwrap(), &headers, true)
}

async fn create_area(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    create_reference(&mut state.lock().unwrap(), &headers, true, body)
}

async fn list_departments(State(state): State<Shared>, headers: HeaderMap) -> Response {
    list_reference(&mut state.lock().unwrap(), &headers, false)
}

async fn create_department(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    create_reference(&mut state.lock().unwrap(), &headers, false, body)
}

// =============================================================================
// Cloud Handlers
// =============================================================================

fn cloud_token_ok(q: &HashMap<String, String>) -> bool {
    q.get("token").map(String::as_str) == Some(CLOUD_TOKEN)
}

async fn cloud_users(State(state): State<Shared>, Query(q): Params) -> Response {
    if !cloud_token_ok(&q) {
        return (StatusCode::FORBIDDEN, "bad token").into_response();
    }

    let s = state.lock().unwrap();
    let size = q
        .get("per_page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(s.cloud_page_size)
        .min(s.cloud_page_size);
    let (data, more) = page_of(&s.cloud_users, size, page_param(&q, "page"));

    Json(json!({ "data": data, "has_more": more })).into_response()
}

async fn cloud_upload(
    State(state): State<Shared>,
    Query(q): Params,
    Json(body): Json<Value>,
) -> Response {
    if !cloud_token_ok(&q) {
        return (StatusCode::FORBIDDEN, "bad token").into_response();
    }

    let mut s = state.lock().unwrap();
    let status = StatusCode::from_u16(s.upload_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        return (status, "upload rejected").into_response();
    }

    s.uploads.push(body);
    (status, Json(json!({ "status": "ok" }))).into_response()
}
