//! GitLab REST v4 client.
//!
//! Talks to `/api/v4` with a `PRIVATE-TOKEN` header. Listing endpoints are
//! paginated through the `X-Next-Page` response header.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use super::{AccessToken, CiVariable, GitlabApi, TargetKind};
use crate::errors::ApiError;

const PER_PAGE: &str = "20";
const PERSONAL_PATH: &str = "@personal";

#[derive(Debug, Deserialize)]
struct TokenPayload {
    id: u64,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    revoked: bool,
    expires_at: Option<NaiveDate>,
    #[serde(default)]
    token: Option<String>,
}

impl TokenPayload {
    fn into_access_token(self, kind: TargetKind, path: &str) -> AccessToken {
        AccessToken {
            id: self.id,
            name: self.name,
            active: self.active,
            revoked: self.revoked,
            expires_at: self
                .expires_at
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            kind,
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VariablePayload {
    key: String,
    #[serde(default)]
    value: String,
}

/// HTTP implementation of [`GitlabApi`].
pub struct GitlabClient {
    base_url: String,
    token: RwLock<String>,
    http: Client,
}

impl GitlabClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let parsed =
            Url::parse(base_url).map_err(|_| ApiError::InvalidBaseUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("gitlab-token-updater/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token.into()),
            http,
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/api/v4/{}", self.base_url, resource)
    }

    fn current_token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        let resp = req.header("PRIVATE-TOKEN", self.current_token()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(url, status = status.as_u16(), error = %err, "failed to read error response body");
                    format!("<unreadable body: {}>", err)
                }
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(resp)
    }

    async fn list_tokens(
        &self,
        resource: &str,
        kind: TargetKind,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<AccessToken>, ApiError> {
        let url = self.endpoint(resource);
        let mut tokens = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_param = page.to_string();
            let req = self
                .http
                .get(&url)
                .query(&[("page", page_param.as_str()), ("per_page", PER_PAGE)])
                .query(extra_query);
            let resp = self.send(req, &url).await?;

            let next_page = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());

            let batch: Vec<TokenPayload> = resp.json().await?;
            tokens.extend(
                batch
                    .into_iter()
                    .filter(|t| !t.revoked)
                    .map(|t| t.into_access_token(kind, path)),
            );

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        tracing::debug!(resource, total = tokens.len(), "listed access tokens");
        Ok(tokens)
    }

    async fn rotate(&self, resource: &str, expires_at: DateTime<Utc>) -> Result<String, ApiError> {
        let url = self.endpoint(resource);
        let body = serde_json::json!({ "expires_at": expires_at.format("%Y-%m-%d").to_string() });
        let resp = self.send(self.http.post(&url).json(&body), &url).await?;

        let payload: TokenPayload = resp.json().await?;
        payload
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Payload(format!("rotation response of {} has no token", url)))
    }

    async fn get_var(&self, resource: &str, kind: TargetKind) -> Result<CiVariable, ApiError> {
        let url = self.endpoint(resource);
        let resp = self.send(self.http.get(&url), &url).await?;
        let payload: VariablePayload = resp.json().await?;
        Ok(CiVariable {
            key: payload.key,
            value: payload.value,
            kind,
        })
    }

    async fn update_var(&self, resource: &str, value: &str) -> Result<(), ApiError> {
        let url = self.endpoint(resource);
        let body = serde_json::json!({ "value": value });
        self.send(self.http.put(&url).json(&body), &url).await?;
        Ok(())
    }
}

/// Project and group ids are URL-encoded full paths.
fn encode_path(path: &str) -> String {
    urlencoding::encode(path.trim_matches('/')).into_owned()
}

#[async_trait]
impl GitlabApi for GitlabClient {
    async fn auth(&self, token: &str) -> Result<(), ApiError> {
        let mut current = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = token.to_string();
        Ok(())
    }

    async fn connect(&self, base_url: &str, token: &str) -> Result<Arc<dyn GitlabApi>, ApiError> {
        Ok(Arc::new(GitlabClient::new(base_url, token)?))
    }

    async fn list_personal_tokens(&self) -> Result<Vec<AccessToken>, ApiError> {
        self.list_tokens(
            "personal_access_tokens",
            TargetKind::Personal,
            PERSONAL_PATH,
            &[("revoked", "false")],
        )
        .await
    }

    async fn list_repo_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError> {
        let resource = format!("projects/{}/access_tokens", encode_path(path));
        self.list_tokens(&resource, TargetKind::Repository, path, &[])
            .await
    }

    async fn list_group_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError> {
        let resource = format!("groups/{}/access_tokens", encode_path(path));
        self.list_tokens(&resource, TargetKind::Group, path, &[]).await
    }

    async fn rotate_personal_token(
        &self,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        self.rotate(&format!("personal_access_tokens/{}/rotate", id), expires_at)
            .await
    }

    async fn rotate_repo_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let resource = format!("projects/{}/access_tokens/{}/rotate", encode_path(path), id);
        self.rotate(&resource, expires_at).await
    }

    async fn rotate_group_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let resource = format!("groups/{}/access_tokens/{}/rotate", encode_path(path), id);
        self.rotate(&resource, expires_at).await
    }

    async fn get_repo_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError> {
        let resource = format!("projects/{}/variables/{}", encode_path(path), name);
        self.get_var(&resource, TargetKind::Repository).await
    }

    async fn get_group_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError> {
        let resource = format!("groups/{}/variables/{}", encode_path(path), name);
        self.get_var(&resource, TargetKind::Group).await
    }

    async fn update_repo_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError> {
        let resource = format!("projects/{}/variables/{}", encode_path(path), name);
        self.update_var(&resource, value).await
    }

    async fn update_group_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError> {
        let resource = format!("groups/{}/variables/{}", encode_path(path), name);
        self.update_var(&resource, value).await
    }
}

// ── Tests ──────────────────────────────────────────────────────
