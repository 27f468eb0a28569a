pub mod client;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ApiError;

pub use client::GitlabClient;

/// Owner scope of an access token or CI variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Repository,
    Group,
    Personal,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Repository => "repository",
            TargetKind::Group => "group",
            TargetKind::Personal => "personal",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(TargetKind::Repository),
            "group" => Ok(TargetKind::Group),
            "personal" => Ok(TargetKind::Personal),
            _ => Err(()),
        }
    }
}

/// An access token as reported by the GitLab API.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub id: u64,
    pub name: String,
    pub active: bool,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub kind: TargetKind,
    /// Project or group path; `@personal` for personal tokens.
    pub path: String,
}

/// A CI/CD variable of a project or group.
#[derive(Debug, Clone, PartialEq)]
pub struct CiVariable {
    pub key: String,
    pub value: String,
    pub kind: TargetKind,
}

/// The subset of the GitLab API used for token renewal.
#[async_trait]
pub trait GitlabApi: Send + Sync {
    /// Replace the credential used by subsequent calls.
    async fn auth(&self, token: &str) -> Result<(), ApiError>;

    /// Build a separate client bound to another GitLab instance.
    async fn connect(&self, base_url: &str, token: &str) -> Result<Arc<dyn GitlabApi>, ApiError>;

    async fn list_personal_tokens(&self) -> Result<Vec<AccessToken>, ApiError>;
    async fn list_repo_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError>;
    async fn list_group_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError>;

    /// Rotate a token, returning the new secret.
    async fn rotate_personal_token(
        &self,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError>;
    async fn rotate_repo_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError>;
    async fn rotate_group_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError>;

    async fn get_repo_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError>;
    async fn get_group_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError>;
    async fn update_repo_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError>;
    async fn update_group_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError>;
}
