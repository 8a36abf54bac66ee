//! # Cloud Client
//!
//! Token-in-query access to the cloud attendance service.
//!
//! ```text
//! GET  zkteco/sync/bridge/users/?token=..&per_page=N&page=P   → { data, has_more }
//! POST zkteco/sync/bridge/attendance_data/?token=..           ← [{ user_id, timestamp }]
//! ```
//!
//! The token never appears in errors or logs: both carry the endpoint
//! without its query string.

use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use bridge_core::{AttendanceUpload, CloudUser};

use crate::config::CloudSettings;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{MoreFlag, PagedFetcher};
use crate::http::{build_client, parse_base_url, parse_json, read_response};

const USERS_PATH: &str = "zkteco/sync/bridge/users/";
const ATTENDANCE_PATH: &str = "zkteco/sync/bridge/attendance_data/";

/// Client for the cloud attendance service.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: String,
    page_size: u32,
    fetcher: PagedFetcher,
}

impl CloudClient {
    pub fn new(settings: &CloudSettings) -> SyncResult<Self> {
        Ok(CloudClient {
            http: build_client(settings.timeout())?,
            base_url: parse_base_url(&settings.base_url)?,
            api_token: settings.api_token.clone(),
            page_size: settings.page_size,
            fetcher: PagedFetcher::new(MoreFlag::HasMore).page_delay(settings.page_delay()),
        })
    }

    /// Returns `(request url with token, url safe to log)`.
    fn endpoint(&self, path: &str) -> SyncResult<(Url, String)> {
        let bare = self.base_url.join(path)?;
        let mut url = bare.clone();
        url.query_pairs_mut().append_pair("token", &self.api_token);
        Ok((url, bare.to_string()))
    }

    async fn get_json(&self, url: Url, display: &str) -> SyncResult<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::transport(display, &e.without_url()))?;

        let (status, body) = read_response(display, response).await?;
        if !status.is_success() {
            return Err(SyncError::Upstream {
                url: display.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        parse_json(display, &body)
    }

    /// Lists every cloud user.
    ///
    /// Pages are requested `per_page` at a time with the configured delay in
    /// between, until `has_more` is false.
    pub async fn list_users(&self) -> SyncResult<Vec<CloudUser>> {
        let (base, display) = self.endpoint(USERS_PATH)?;
        let per_page = self.page_size.to_string();
        let this = self;
        let display_ref = display.as_str();

        let users: Vec<CloudUser> = self
            .fetcher
            .fetch_all(display_ref, |page| {
                let mut url = base.clone();
                url.query_pairs_mut()
                    .append_pair("per_page", &per_page)
                    .append_pair("page", &page.to_string());

                async move { this.get_json(url, display_ref).await }
            })
            .await?;

        debug!(count = users.len(), "Listed cloud users");
        Ok(users)
    }

    /// Posts a batch of attendance. Any 2xx answer is success.
    ///
    /// ## Errors
    /// - `Upstream` with the status and body for any other answer
    /// - `Transport` if the cloud is unreachable
    pub async fn upload_attendance(&self, batch: &[AttendanceUpload]) -> SyncResult<()> {
        let (url, display) = self.endpoint(ATTENDANCE_PATH)?;

        let response = self
            .http
            .post(url)
            .json(batch)
            .send()
            .await
            .map_err(|e| SyncError::transport(display.as_str(), &e.without_url()))?;

        let (status, body) = read_response(&display, response).await?;
        if !status.is_success() {
            return Err(SyncError::Upstream {
                url: display,
                status: status.as_u16(),
                body,
            });
        }

        if status != StatusCode::CREATED {
            debug!(status = status.as_u16(), "Cloud accepted upload with non-201 status");
        }
        info!(records = batch.len(), "Uploaded attendance to cloud");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> CloudClient {
        CloudClient::new(&server.config().cloud).unwrap()
    }

    #[tokio::test]
    async fn test_list_users_follows_has_more() {
        let server = MockServer::start().await;
        server.state().cloud_page_size = 2;
        for id in 1..=5 {
            server.add_cloud_user(id, &format!("A{}", id), &format!("User {}", id));
        }

        let users = client(&server).list_users().await.unwrap();

        assert_eq!(users.len(), 5);
        assert_eq!(users[0], CloudUser::new(1, "A1", "User 1"));
        assert_eq!(users[4].canonical_first_name(), "A5 User 5");
    }

    #[tokio::test]
    async fn test_list_users_empty() {
        let server = MockServer::start().await;
        assert!(client(&server).list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_token_is_upstream_error_without_token() {
        let server = MockServer::start().await;
        let mut settings = server.config().cloud;
        settings.api_token = "leaked-secret".into();

        let err = CloudClient::new(&settings)
            .unwrap()
            .list_users()
            .await
            .unwrap_err();

        match &err {
            SyncError::Upstream { status, url, .. } => {
                assert_eq!(*status, 403);
                assert!(!url.contains("leaked-secret"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert!(!err.to_string().contains("leaked-secret"));
    }

    #[tokio::test]
    async fn test_upload_posts_batch() {
        let server = MockServer::start().await;
        let batch = vec![AttendanceUpload {
            user_id: 5,
            timestamp: "2024-01-01 08:00:00".into(),
        }];

        client(&server).upload_attendance(&batch).await.unwrap();

        assert_eq!(
            server.state().uploads,
            vec![json!([{ "user_id": 5, "timestamp": "2024-01-01 08:00:00" }])]
        );
    }

    #[tokio::test]
    async fn test_upload_accepts_any_2xx() {
        let server = MockServer::start().await;
        server.state().upload_status = 200;

        client(&server).upload_attendance(&[]).await.unwrap();
        assert_eq!(server.state().uploads.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_carries_status_and_body() {
        let server = MockServer::start().await;
        server.state().upload_status = 500;

        let err = client(&server).upload_attendance(&[]).await.unwrap_err();

        match err {
            SyncError::Upstream { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upload rejected");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert!(server.state().uploads.is_empty());
    }
}
