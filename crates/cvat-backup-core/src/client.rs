//! HTTP session against the CVAT REST API (`/api/v1`).

use std::collections::HashSet;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::unpack_zip;
use crate::config::ClientConfig;
use crate::error::BackupError;
use crate::remote::{ArchiveEntry, RemoteSession, RemoteTask, TaskId};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    key: Option<String>,
}

#[derive(Deserialize)]
struct TaskPage {
    #[serde(default)]
    next: Option<String>,
    results: Vec<RemoteTask>,
}

/// An authenticated CVAT session.
pub struct CvatClient {
    base_url: String,
    export_format: String,
    auth: HeaderValue,
    client: Client,
}

impl CvatClient {
    /// Log in with the configured credentials and return a ready session.
    pub async fn login(config: &ClientConfig) -> Result<Self, BackupError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent(concat!("cvat-backup/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let url = format!("{base_url}/auth/login");
        debug!(%url, user = %config.username, "logging in");

        let resp = client
            .post(&url)
            .json(&LoginRequest {
                username: &config.username,
                email: &config.email,
                password: &config.password,
            })
            .send()
            .await
            .map_err(|e| BackupError::Authentication {
                reason: e.to_string(),
            })?;

        if resp.status() != StatusCode::OK {
            return Err(BackupError::Authentication {
                reason: format!("server answered {}", resp.status()),
            });
        }

        let body = resp.bytes().await?;
        let key = serde_json::from_slice::<LoginResponse>(&body)
            .ok()
            .and_then(|r| r.key)
            .ok_or_else(|| BackupError::Authentication {
                reason: "login response has no key".into(),
            })?;
        let auth = HeaderValue::from_str(&format!("Token {key}")).map_err(|_| {
            BackupError::Authentication {
                reason: "login key is not a valid header value".into(),
            }
        })?;

        Ok(Self {
            base_url,
            export_format: config.export_format.clone(),
            auth,
            client,
        })
    }

    fn annotations_url(&self, task_id: TaskId) -> Result<Url, BackupError> {
        let mut url = Url::parse(&format!("{}/tasks/{}/annotations", self.base_url, task_id))
            .map_err(|e| BackupError::InvalidConfig {
                message: format!("bad base URL {}: {e}", self.base_url),
            })?;
        url.query_pairs_mut()
            .append_pair("format", &self.export_format)
            .append_pair("filename", "output.zip")
            .append_pair("action", "download");
        Ok(url)
    }
}

impl RemoteSession for CvatClient {
    /// Walk every page of `/tasks`. A `next` link pointing at a page that was
    /// already fetched ends the walk.
    async fn list_tasks(&self) -> Result<Vec<RemoteTask>, BackupError> {
        let mut tasks = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(format!("{}/tasks", self.base_url));

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                warn!(%url, pages = visited.len(), "task listing links back to a visited page");
                break;
            }
            debug!(%url, "listing tasks");
            let resp = self
                .client
                .get(&url)
                .header(AUTHORIZATION, self.auth.clone())
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(BackupError::InvalidResponse {
                    message: format!("task listing answered {}", resp.status()),
                });
            }

            let page: TaskPage = serde_json::from_slice(&resp.bytes().await?)?;
            tasks.extend(page.results);
            next = page.next;
        }

        Ok(tasks)
    }

    async fn fetch_annotations(&self, task_id: TaskId) -> Result<Vec<ArchiveEntry>, BackupError> {
        let url = self.annotations_url(task_id)?;
        debug!(%url, task_id, "requesting annotations");

        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth.clone())
            .send()
            .await?;

        // CVAT answers 202/201 while the export is still being prepared.
        if resp.status() != StatusCode::OK {
            return Err(BackupError::TransientDownload {
                task_id,
                reason: format!("server answered {}", resp.status()),
            });
        }

        let bytes = resp.bytes().await?;
        unpack_zip(&bytes)
    }
}
