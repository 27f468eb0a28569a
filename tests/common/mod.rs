//! Recording test doubles for the GitLab API and shell capabilities.
//!
//! Every call is appended to a log as a readable signature such as
//! `rotate_repo_token(/path/to/repo,123,2024-07-04)`. Outcomes are scripted
//! per signature; unscripted calls succeed.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use token_updater::errors::{ApiError, ShellError};
use token_updater::gitlab::{AccessToken, CiVariable, GitlabApi, TargetKind};
use token_updater::shell::Shell;

pub const NEW_TOKEN: &str = "glpat-newnew";
pub const REPO_PATH: &str = "/path/to/repo";
pub const GROUP_PATH: &str = "/path/to/group";
pub const CI_VAR: &str = "SOME_VAR";
pub const SCRIPT: &str = "./path/to/script.sh";

pub fn date(value: &str) -> DateTime<Utc> {
    let d = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap();
    Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
}

pub fn token(kind: TargetKind, path: &str, name: &str, expires_at: Option<&str>) -> AccessToken {
    AccessToken {
        id: 123,
        name: name.to_string(),
        active: true,
        revoked: false,
        expires_at: expires_at.map(date),
        kind,
        path: path.to_string(),
    }
}

fn api_error(msg: &str) -> ApiError {
    ApiError::Payload(msg.to_string())
}

#[derive(Default)]
pub struct MockGitlab {
    calls: Mutex<Vec<String>>,
    listings: Mutex<HashMap<String, VecDeque<Result<Vec<AccessToken>, String>>>>,
    outcomes: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    secondary: Mutex<Option<Arc<MockGitlab>>>,
}

impl MockGitlab {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the result of a listing call, e.g. `list_repo_tokens(/path)`.
    pub fn on_list(&self, signature: &str, result: Result<Vec<AccessToken>, &str>) {
        self.listings
            .lock()
            .unwrap()
            .entry(signature.to_string())
            .or_default()
            .push_back(result.map_err(str::to_string));
    }

    /// Script the result of any other call. For rotations the `Ok` value is
    /// the new token.
    pub fn on(&self, signature: &str, result: Result<&str, &str>) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(signature.to_string())
            .or_default()
            .push_back(result.map(str::to_string).map_err(str::to_string));
    }

    /// Client handed out by `connect`. Without one, `connect` fails.
    pub fn set_secondary(&self, client: Arc<MockGitlab>) {
        *self.secondary.lock().unwrap() = Some(client);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, signature: String) -> Result<Option<String>, ApiError> {
        self.calls.lock().unwrap().push(signature.clone());
        match self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&signature)
            .and_then(|q| q.pop_front())
        {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(msg)) => Err(api_error(&msg)),
            None => Ok(None),
        }
    }

    fn listing(&self, signature: String) -> Result<Vec<AccessToken>, ApiError> {
        self.calls.lock().unwrap().push(signature.clone());
        match self
            .listings
            .lock()
            .unwrap()
            .get_mut(&signature)
            .and_then(|q| q.pop_front())
        {
            Some(Ok(tokens)) => Ok(tokens),
            Some(Err(msg)) => Err(api_error(&msg)),
            None => Ok(Vec::new()),
        }
    }

    fn rotation(&self, signature: String) -> Result<String, ApiError> {
        Ok(self
            .record(signature)?
            .unwrap_or_else(|| NEW_TOKEN.to_string()))
    }
}

fn day(expires_at: DateTime<Utc>) -> String {
    expires_at.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl GitlabApi for MockGitlab {
    async fn auth(&self, token: &str) -> Result<(), ApiError> {
        self.record(format!("auth({})", token)).map(|_| ())
    }

    async fn connect(&self, base_url: &str, token: &str) -> Result<Arc<dyn GitlabApi>, ApiError> {
        self.record(format!("connect({},{})", base_url, token))?;
        match self.secondary.lock().unwrap().clone() {
            Some(client) => Ok(client),
            None => Err(ApiError::InvalidBaseUrl(base_url.to_string())),
        }
    }

    async fn list_personal_tokens(&self) -> Result<Vec<AccessToken>, ApiError> {
        self.listing("list_personal_tokens()".to_string())
    }

    async fn list_repo_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError> {
        self.listing(format!("list_repo_tokens({})", path))
    }

    async fn list_group_tokens(&self, path: &str) -> Result<Vec<AccessToken>, ApiError> {
        self.listing(format!("list_group_tokens({})", path))
    }

    async fn rotate_personal_token(
        &self,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        self.rotation(format!("rotate_personal_token({},{})", id, day(expires_at)))
    }

    async fn rotate_repo_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        self.rotation(format!("rotate_repo_token({},{},{})", path, id, day(expires_at)))
    }

    async fn rotate_group_token(
        &self,
        path: &str,
        id: u64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        self.rotation(format!("rotate_group_token({},{},{})", path, id, day(expires_at)))
    }

    async fn get_repo_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError> {
        self.record(format!("get_repo_var({},{})", path, name))?;
        Ok(CiVariable {
            key: name.to_string(),
            value: String::new(),
            kind: TargetKind::Repository,
        })
    }

    async fn get_group_var(&self, path: &str, name: &str) -> Result<CiVariable, ApiError> {
        self.record(format!("get_group_var({},{})", path, name))?;
        Ok(CiVariable {
            key: name.to_string(),
            value: String::new(),
            kind: TargetKind::Group,
        })
    }

    async fn update_repo_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError> {
        self.record(format!("update_repo_var({},{},{})", path, name, value))
            .map(|_| ())
    }

    async fn update_group_var(&self, path: &str, name: &str, value: &str) -> Result<(), ApiError> {
        self.record(format!("update_group_var({},{},{})", path, name, value))
            .map(|_| ())
    }
}

#[derive(Default)]
pub struct MockShell {
    calls: Mutex<Vec<String>>,
    envs: Mutex<Vec<BTreeMap<String, String>>>,
    outcomes: Mutex<HashMap<String, VecDeque<Result<(), String>>>>,
}

impl MockShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, signature: &str, result: Result<(), &str>) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(signature.to_string())
            .or_default()
            .push_back(result.map_err(str::to_string));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Environments passed to `exec`, in call order.
    pub fn envs(&self) -> Vec<BTreeMap<String, String>> {
        self.envs.lock().unwrap().clone()
    }

    fn record(&self, signature: String) -> Result<(), String> {
        self.calls.lock().unwrap().push(signature.clone());
        self.outcomes
            .lock()
            .unwrap()
            .get_mut(&signature)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl Shell for MockShell {
    async fn exec(&self, path: &str, env: &BTreeMap<String, String>) -> Result<Vec<u8>, ShellError> {
        self.envs.lock().unwrap().push(env.clone());
        self.record(format!("exec({})", path))
            .map(|_| b"abc".to_vec())
            .map_err(|stderr| ShellError::NonZeroExit {
                path: path.to_string(),
                code: Some(1),
                stderr,
            })
    }

    async fn file_must_exist(&self, path: &str) -> Result<(), ShellError> {
        self.record(format!("file_must_exist({})", path))
            .map_err(|msg| ShellError::FileNotFound {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, msg),
            })
    }
}
