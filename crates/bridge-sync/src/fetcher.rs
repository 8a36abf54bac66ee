//! # Paged Fetcher
//!
//! Both remote systems return lists one page at a time. The envelope is the
//! same, only the "more pages" flag differs.
//!
//! ## Page Walk
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         fetch_all(fetch_page)                           │
//! │                                                                         │
//! │  page = 1                                                              │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  body = fetch_page(page) ─────────── error ───► return error           │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  records += body.data                                                  │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  flag truthy?  local: body.next    cloud: body.has_more                │
//! │    ├── no  ──────────────────────────────────► return records          │
//! │    └── yes ── sleep(page_delay) ── page += 1 ── loop                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Upper bound on pages per list. A server that never clears its flag
/// would otherwise loop forever.
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

/// Which body field says another page exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoreFlag {
    /// `next`: URL of the next page or null (local server).
    Next,
    /// `has_more`: boolean (cloud).
    HasMore,
}

impl MoreFlag {
    pub fn field(&self) -> &'static str {
        match self {
            MoreFlag::Next => "next",
            MoreFlag::HasMore => "has_more",
        }
    }

    /// Whether `body` announces another page.
    pub fn is_set(&self, body: &Value) -> bool {
        is_truthy(body.get(self.field()))
    }
}

/// Truthiness of a JSON flag. Missing, `null`, `false`, `""`, `0`, and
/// empty containers are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Walks a paginated list endpoint until the flag clears.
#[derive(Debug, Clone)]
pub struct PagedFetcher {
    flag: MoreFlag,
    page_delay: Duration,
    max_pages: u32,
}

impl PagedFetcher {
    /// Creates a fetcher with no inter-page delay.
    pub fn new(flag: MoreFlag) -> Self {
        PagedFetcher {
            flag,
            page_delay: Duration::ZERO,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Sets the pause between consecutive page requests.
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Sets the page cap.
    pub fn max_pages(mut self, max: u32) -> Self {
        self.max_pages = max;
        self
    }

    /// Fetches every page and returns the concatenated `data` records.
    ///
    /// ## Arguments
    /// * `url` - Endpoint, used in errors and logs only
    /// * `fetch_page` - Requests page `n` (1-based) and returns its JSON body
    ///
    /// ## Errors
    /// - Whatever `fetch_page` returns, unchanged
    /// - `Decode` if a body has no `data` array or a record does not decode
    /// - `Upstream` if the page cap is reached
    pub async fn fetch_all<T, F, Fut>(&self, url: &str, mut fetch_page: F) -> SyncResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<Value>>,
    {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let mut body = fetch_page(page).await?;
            let more = self.flag.is_set(&body);

            let data = match body.get_mut("data").map(Value::take) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(SyncError::decode(
                        url,
                        format!("page {}: 'data' is not an array: {}", page, other),
                    ))
                }
                None => {
                    return Err(SyncError::decode(
                        url,
                        format!("page {}: missing 'data'", page),
                    ))
                }
            };

            debug!(url = %url, page = page, records = data.len(), more = more, "Fetched page");

            for item in data {
                let record = serde_json::from_value(item)
                    .map_err(|e| SyncError::decode(url, format!("page {}: {}", page, e)))?;
                records.push(record);
            }

            if !more {
                return Ok(records);
            }

            if page >= self.max_pages {
                return Err(SyncError::Upstream {
                    url: url.to_string(),
                    status: 200,
                    body: format!(
                        "'{}' still set after {} pages",
                        self.flag.field(),
                        self.max_pages
                    ),
                });
            }

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            page += 1;
        }
    }
}
