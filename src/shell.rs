use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::ShellError;

/// Local script execution used by the `exec_cmd` hook.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run `path` with exactly the given environment, returning stdout.
    async fn exec(&self, path: &str, env: &BTreeMap<String, String>) -> Result<Vec<u8>, ShellError>;

    async fn file_must_exist(&self, path: &str) -> Result<(), ShellError>;
}

pub struct ShellExecutor;

#[async_trait]
impl Shell for ShellExecutor {
    async fn exec(&self, path: &str, env: &BTreeMap<String, String>) -> Result<Vec<u8>, ShellError> {
        let output = Command::new(path)
            .env_clear()
            .envs(env)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ShellError::Spawn {
                path: path.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ShellError::NonZeroExit {
                path: path.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn file_must_exist(&self, path: &str) -> Result<(), ShellError> {
        tokio::fs::metadata(path)
            .await
            .map(|_| ())
            .map_err(|source| ShellError::FileNotFound {
                path: path.to_string(),
                source,
            })
    }
}
