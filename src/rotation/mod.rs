//! Token renewal run.
//!
//! One pass over every managed group: list remote tokens, pair them with the
//! configured policies, renew the ones that are due and run their hooks.
//! Groups, pairs, hooks and hook attempts are processed strictly in order.

pub mod eligibility;
mod hooks;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Config, ManagedGroup};
use crate::errors::UpdaterError;
use crate::gitlab::{AccessToken, GitlabApi, TargetKind};
use crate::shell::Shell;
use eligibility::{is_due, match_policies, TokenPair};

/// Environment variable carrying the new token into `exec_cmd` scripts.
pub const NEW_TOKEN_ENV: &str = "GL_NEW_TOKEN";

/// Token handed to hooks in dry-run mode instead of a rotated secret.
pub const DRY_RUN_TOKEN: &str = "glpat-abc";

/// An error collected by a lenient run.
#[derive(Debug)]
pub struct RecordedError {
    pub context: String,
    pub error: UpdaterError,
}

pub struct TokenRotator {
    config: Arc<Config>,
    gitlab: Arc<dyn GitlabApi>,
    shell: Arc<dyn Shell>,
    now: DateTime<Utc>,
    force: bool,
    dry_run: bool,
    strict: bool,
    errors: Vec<RecordedError>,
}

impl TokenRotator {
    pub fn new(config: Config, gitlab: Arc<dyn GitlabApi>, shell: Arc<dyn Shell>) -> Self {
        Self {
            config: Arc::new(config),
            gitlab,
            shell,
            now: Utc::now(),
            force: false,
            dry_run: false,
            strict: false,
            errors: Vec::new(),
        }
    }

    /// Renew every matched token regardless of its expiry date.
    pub fn with_force(mut self, enabled: bool) -> Self {
        self.force = enabled;
        self
    }

    /// Replace every state-changing call with a read-only one.
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Abort on the first error instead of collecting it.
    pub fn with_strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Reference time for eligibility and new expiry dates.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Errors collected by the last lenient run.
    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// Process every managed group once.
    ///
    /// Strict runs return the first error as is. Lenient runs keep going and
    /// return [`UpdaterError::ExecutionFailed`] if anything failed.
    pub async fn run(&mut self) -> Result<(), UpdaterError> {
        self.errors.clear();
        let config = Arc::clone(&self.config);

        for group in &config.managed {
            tracing::info!(path = %group.path, m_type = %group.kind, "processing");

            let remote = match self.list_tokens(group).await {
                Ok(tokens) => tokens,
                Err(err) => {
                    tracing::error!(
                        path = %group.path,
                        m_type = %group.kind,
                        error = %err,
                        "error while listing access token"
                    );
                    self.record(format!("listing {} {}", group.kind, group.path), err)?;
                    continue;
                }
            };

            for pair in match_policies(group, &remote) {
                self.process_pair(group, &pair).await?;
            }
        }

        tracing::info!("done");
        if self.errors.is_empty() {
            return Ok(());
        }

        tracing::warn!("detected following error(s) during execution");
        for (idx, recorded) in self.errors.iter().enumerate() {
            tracing::warn!(
                sequence = idx + 1,
                context = %recorded.context,
                "- {}",
                recorded.error
            );
        }
        Err(UpdaterError::ExecutionFailed)
    }

    async fn list_tokens(&self, group: &ManagedGroup) -> Result<Vec<AccessToken>, UpdaterError> {
        let tokens = match group.kind {
            TargetKind::Repository => self.gitlab.list_repo_tokens(&group.path).await?,
            TargetKind::Group => self.gitlab.list_group_tokens(&group.path).await?,
            TargetKind::Personal => self.gitlab.list_personal_tokens().await?,
        };
        Ok(tokens)
    }

    async fn process_pair(
        &mut self,
        group: &ManagedGroup,
        pair: &TokenPair<'_>,
    ) -> Result<(), UpdaterError> {
        let token_name = pair.policy.name.as_str();
        tracing::info!(path = %group.path, token = token_name, "processing");

        let due = is_due(pair, self.now);
        if due {
            tracing::warn!(
                path = %group.path,
                token = token_name,
                expires_at = ?pair.remote.expires_at,
                renew_before_days = pair.policy.renew_before.num_days(),
                "reach renew time"
            );
        }
        if !(self.force || due) {
            tracing::debug!(path = %group.path, token = token_name, "not identified as need to renew");
            return Ok(());
        }

        tracing::info!(path = %group.path, token = token_name, "processing token renewal");
        let new_token = match self.renew(pair).await {
            Ok(token) => token,
            Err(err) => {
                tracing::error!(path = %group.path, token = token_name, error = %err, "error renew token");
                return self.record(
                    format!("renewing '{}' of {} {}", token_name, group.kind, group.path),
                    err,
                );
            }
        };
        tracing::info!(path = %group.path, token = token_name, "token successfully renewed");

        if pair.policy.hooks.is_empty() {
            tracing::debug!(path = %group.path, token = token_name, "no hook configured");
            return Ok(());
        }
        tracing::info!(path = %group.path, token = token_name, "executing hooks");

        for hook in &pair.policy.hooks {
            if let Err(err) = self.run_hook(hook, &new_token, &group.path, token_name).await {
                self.record(
                    format!(
                        "hook {} ({}) of '{}' in {} {}",
                        hook.action.type_name(),
                        hook.describe_args(),
                        token_name,
                        group.kind,
                        group.path
                    ),
                    err,
                )?;
            }
        }
        Ok(())
    }

    async fn renew(&self, pair: &TokenPair<'_>) -> Result<String, UpdaterError> {
        let remote = &pair.remote;
        let next_expiry = self
            .now
            .checked_add_signed(pair.policy.expiry_after_rotate)
            .ok_or_else(|| UpdaterError::ExpiryOverflow {
                token: pair.policy.name.clone(),
                now: self.now.to_rfc3339(),
                days: pair.policy.expiry_after_rotate.num_days(),
            })?;
        if self.dry_run {
            return Ok(DRY_RUN_TOKEN.to_string());
        }

        let token = match remote.kind {
            TargetKind::Personal => {
                self.gitlab
                    .rotate_personal_token(remote.id, next_expiry)
                    .await?
            }
            TargetKind::Repository => {
                self.gitlab
                    .rotate_repo_token(&remote.path, remote.id, next_expiry)
                    .await?
            }
            TargetKind::Group => {
                self.gitlab
                    .rotate_group_token(&remote.path, remote.id, next_expiry)
                    .await?
            }
        };
        Ok(token)
    }

    /// Strict runs return the error; lenient runs keep it for the summary.
    fn record(&mut self, context: String, error: UpdaterError) -> Result<(), UpdaterError> {
        if self.strict {
            return Err(error);
        }
        self.errors.push(RecordedError { context, error });
        Ok(())
    }
}
