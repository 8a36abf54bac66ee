//! # Local Server Client
//!
//! JWT-authenticated access to the on-premise terminal server.
//!
//! ## Authentication State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    LocalClient auth states                              │
//! │                                                                         │
//! │   ┌──────────┐  authenticate()   ┌────────────────┐                    │
//! │   │ NoToken  │ ────────────────► │ Authenticating │                    │
//! │   └──────────┘                   └───────┬────────┘                    │
//! │        ▲                                 │ token stored                 │
//! │        │ reset_authentication()          ▼                              │
//! │        │                          ┌────────────┐                       │
//! │        └───────────────────────── │   Active   │ ◄─────────┐           │
//! │                                   └─────┬──────┘           │           │
//! │                                         │ 400/401 on call  │ renewed   │
//! │                                         ▼                  │           │
//! │                                   ┌─────────────┐          │           │
//! │                                   │ Invalidated │ ─────────┘           │
//! │                                   └─────────────┘  (at most once       │
//! │                                                     per call)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Token Source
//! The token is read from the store on every call, never held in memory, so
//! a renewal by one trigger is seen immediately by every other trigger.
//!
//! ## Stale-Token Rule
//! The server answers an expired JWT with 400 (and sometimes 401). Such an
//! answer invalidates every stored token, re-authenticates, and retries the
//! call once. A second stale answer surfaces as [`SyncError::RemoteCall`].
//! A 400 from the token endpoint itself means the credentials are wrong.

use chrono::NaiveDateTime;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use bridge_core::validation::format_timestamp;
use bridge_core::{AreaDept, EmployeePayload, LocalUser, ReferenceIds, RemotePunch, Token};
use bridge_db::TokenRepository;

use crate::config::{LocalSettings, ReferenceSettings};
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{MoreFlag, PagedFetcher};
use crate::http::{build_client, parse_base_url, parse_json, read_response};

// =============================================================================
// Endpoints
// =============================================================================

const TOKEN_PATH: &str = "jwt-api-token-auth/";
const EMPLOYEES_PATH: &str = "personnel/api/employees/";
const TRANSACTIONS_PATH: &str = "iclock/api/transactions/";
const AREAS_PATH: &str = "personnel/api/areas/";
const DEPARTMENTS_PATH: &str = "personnel/api/departments/";

/// Calls per operation: the original attempt plus one after renewal.
const MAX_TOKEN_RENEWALS: u32 = 1;

// =============================================================================
// Auth State
// =============================================================================

/// Where the client is in its authentication lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token has been obtained or reused yet.
    NoToken,
    /// A login request is in flight.
    Authenticating,
    /// A stored token is in use.
    Active,
    /// The server rejected the token; renewal pending.
    Invalidated,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::NoToken => write!(f, "no_token"),
            AuthState::Authenticating => write!(f, "authenticating"),
            AuthState::Active => write!(f, "active"),
            AuthState::Invalidated => write!(f, "invalidated"),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

// =============================================================================
// Local Client
// =============================================================================

/// Client for the local terminal server's REST API.
pub struct LocalClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    page_size: u32,
    fetcher: PagedFetcher,
    tokens: TokenRepository,
    state: RwLock<AuthState>,
    /// Serializes logins so concurrent triggers don't each request a token.
    login_lock: Mutex<()>,
}

impl LocalClient {
    /// Creates a client. No request is made until the first call.
    pub fn new(settings: &LocalSettings, tokens: TokenRepository) -> SyncResult<Self> {
        Ok(LocalClient {
            http: build_client(settings.timeout())?,
            base_url: parse_base_url(&settings.base_url)?,
            username: settings.username.clone(),
            password: settings.password.clone(),
            page_size: settings.page_size,
            fetcher: PagedFetcher::new(MoreFlag::Next).page_delay(settings.page_delay()),
            tokens,
            state: RwLock::new(AuthState::NoToken),
            login_lock: Mutex::new(()),
        })
    }

    /// Current authentication state.
    pub async fn auth_state(&self) -> AuthState {
        *self.state.read().await
    }

    async fn set_state(&self, next: AuthState) {
        let mut state = self.state.write().await;
        if *state != next {
            debug!(from = %*state, to = %next, "Local auth state change");
            *state = next;
        }
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Returns the active token, logging in if the store has none.
    ///
    /// ## Errors
    /// - `InvalidCredentials` if the token endpoint answers 400
    /// - `Upstream` for any other non-2xx from the token endpoint
    /// - `Transport` if the server is unreachable
    pub async fn authenticate(&self) -> SyncResult<Token> {
        if let Some(token) = self.tokens.get_active().await? {
            self.set_state(AuthState::Active).await;
            return Ok(token);
        }

        let _guard = self.login_lock.lock().await;

        // another trigger may have logged in while we waited
        if let Some(token) = self.tokens.get_active().await? {
            self.set_state(AuthState::Active).await;
            return Ok(token);
        }

        self.set_state(AuthState::Authenticating).await;

        match self.login().await {
            Ok(token) => {
                self.set_state(AuthState::Active).await;
                Ok(token)
            }
            Err(e) => {
                self.set_state(AuthState::NoToken).await;
                Err(e)
            }
        }
    }

    async fn login(&self) -> SyncResult<Token> {
        let url = self.endpoint(TOKEN_PATH)?;
        info!(url = %url, username = %self.username, "Requesting local server token");

        let response = self
            .http
            .post(url.clone())
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(|e| SyncError::transport(url.as_str(), &e))?;

        let (status, body) = read_response(url.as_str(), response).await?;

        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(SyncError::InvalidCredentials {
                username: self.username.clone(),
                body,
            });
        }
        if !status.is_success() {
            return Err(SyncError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| SyncError::decode(url.as_str(), e))?;

        let token = self.tokens.create(&parsed.token).await?;
        info!(token_id = token.id, "Obtained new local server token");
        Ok(token)
    }

    /// Deletes every stored token and logs in from scratch.
    pub async fn reset_authentication(&self) -> SyncResult<Token> {
        let purged = self.tokens.purge_all().await?;
        info!(purged = purged, "Reset local server authentication");

        self.set_state(AuthState::NoToken).await;
        self.authenticate().await
    }

    // =========================================================================
    // Authenticated Calls
    // =========================================================================

    /// Sends an authenticated request and returns the JSON body
    /// (`null` for an empty body).
    ///
    /// ## Retry Policy
    /// A 400 or 401 answer invalidates the stored tokens, re-authenticates,
    /// and retries once. Any other non-2xx, or a second stale answer, is
    /// returned as [`SyncError::RemoteCall`].
    pub async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> SyncResult<Value> {
        let mut renewals = 0;

        loop {
            let token = self.authenticate().await?;

            match self.send_once(&method, url, body, &token.value).await {
                Err(SyncError::TokenExpired { url, status, body })
                    if renewals >= MAX_TOKEN_RENEWALS =>
                {
                    return Err(SyncError::RemoteCall {
                        method: method.to_string(),
                        url,
                        status,
                        body,
                    });
                }
                Err(SyncError::TokenExpired { status, .. }) => {
                    warn!(
                        method = %method,
                        url = %url,
                        status = status,
                        token_id = token.id,
                        "Local server rejected token, renewing"
                    );
                    self.tokens.invalidate_all().await?;
                    self.set_state(AuthState::Invalidated).await;
                    renewals += 1;
                }
                other => return other,
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: &str,
    ) -> SyncResult<Value> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(reqwest::header::AUTHORIZATION, format!("JWT {}", token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport(url, &e))?;
        let (status, text) = read_response(url, response).await?;

        match status.as_u16() {
            400 | 401 => Err(SyncError::TokenExpired {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            }),
            _ if status.is_success() => parse_json(url, &text),
            code => Err(SyncError::RemoteCall {
                method: method.to_string(),
                url: url.to_string(),
                status: code,
                body: text,
            }),
        }
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> SyncResult<T> {
        let value = self.call(method, url.as_str(), body).await?;
        serde_json::from_value(value).map_err(|e| SyncError::decode(url.as_str(), e))
    }

    /// GETs every page of a list endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> SyncResult<Vec<T>> {
        let base = self.endpoint(path)?;
        let this = self;

        self.fetcher
            .fetch_all(base.as_str(), |page| {
                let mut url = base.clone();
                url.query_pairs_mut()
                    .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                    .append_pair("page", &page.to_string());

                async move { this.call(Method::GET, url.as_str(), None).await }
            })
            .await
    }

    // =========================================================================
    // Employees
    // =========================================================================

    /// Lists every employee on the local server.
    pub async fn list_employees(&self) -> SyncResult<Vec<LocalUser>> {
        let users: Vec<LocalUser> = self
            .list_all(
                EMPLOYEES_PATH,
                &[("page_size", self.page_size.to_string())],
            )
            .await?;

        debug!(count = users.len(), "Listed local employees");
        Ok(users)
    }

    /// Creates an employee and returns the server's record.
    pub async fn create_employee(&self, payload: &EmployeePayload) -> SyncResult<LocalUser> {
        let url = self.endpoint(EMPLOYEES_PATH)?;
        let body = serde_json::to_value(payload)?;
        self.call_typed(Method::POST, &url, Some(&body)).await
    }

    /// Replaces an employee's record.
    pub async fn update_employee(
        &self,
        local_id: i64,
        payload: &EmployeePayload,
    ) -> SyncResult<LocalUser> {
        let url = self.endpoint(&format!("{}{}/", EMPLOYEES_PATH, local_id))?;
        let body = serde_json::to_value(payload)?;
        self.call_typed(Method::PUT, &url, Some(&body)).await
    }

    /// Deletes an employee.
    pub async fn delete_employee(&self, local_id: i64) -> SyncResult<()> {
        let url = self.endpoint(&format!("{}{}/", EMPLOYEES_PATH, local_id))?;
        self.call(Method::DELETE, url.as_str(), None).await?;
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Lists punches at or after `since`.
    pub async fn list_transactions(&self, since: NaiveDateTime) -> SyncResult<Vec<RemotePunch>> {
        let punches: Vec<RemotePunch> = self
            .list_all(
                TRANSACTIONS_PATH,
                &[("start_time", format_timestamp(&since))],
            )
            .await?;

        debug!(
            since = %format_timestamp(&since),
            count = punches.len(),
            "Listed local transactions"
        );
        Ok(punches)
    }

    /// Deletes a punch from the local server.
    pub async fn delete_transaction(&self, attn_id: i64) -> SyncResult<()> {
        let url = self.endpoint(&format!("{}{}/", TRANSACTIONS_PATH, attn_id))?;
        self.call(Method::DELETE, url.as_str(), None).await?;
        Ok(())
    }

    // =========================================================================
    // Areas / Departments
    // =========================================================================

    pub async fn list_areas(&self) -> SyncResult<Vec<AreaDept>> {
        self.list_all(AREAS_PATH, &[]).await
    }

    pub async fn list_departments(&self) -> SyncResult<Vec<AreaDept>> {
        self.list_all(DEPARTMENTS_PATH, &[]).await
    }

    pub async fn create_area(&self, code: &str, name: &str) -> SyncResult<AreaDept> {
        let url = self.endpoint(AREAS_PATH)?;
        let body = json!({ "area_code": code, "area_name": name });
        self.call_typed(Method::POST, &url, Some(&body)).await
    }

    pub async fn create_department(&self, code: &str, name: &str) -> SyncResult<AreaDept> {
        let url = self.endpoint(DEPARTMENTS_PATH)?;
        let body = json!({ "dept_code": code, "dept_name": name });
        self.call_typed(Method::POST, &url, Some(&body)).await
    }

    /// Ensures the configured area and department exist and returns their ids.
    ///
    /// Lookup is by code. Missing entries are created. Calling this again
    /// finds what the first call created.
    pub async fn verify_area_and_department(
        &self,
        refs: &ReferenceSettings,
    ) -> SyncResult<ReferenceIds> {
        let area_id = match self
            .list_areas()
            .await?
            .into_iter()
            .find(|a| a.code == refs.area_code)
        {
            Some(area) => area.id,
            None => {
                info!(code = %refs.area_code, "Creating area on local server");
                self.create_area(&refs.area_code, &refs.area_name).await?.id
            }
        };

        let department_id = match self
            .list_departments()
            .await?
            .into_iter()
            .find(|d| d.code == refs.department_code)
        {
            Some(dept) => dept.id,
            None => {
                info!(code = %refs.department_code, "Creating department on local server");
                self.create_department(&refs.department_code, &refs.department_name)
                    .await?
                    .id
            }
        };

        debug!(area_id, department_id, "Resolved reference ids");
        Ok(ReferenceIds {
            area_id,
            department_id,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
