use std::sync::Arc;

use super::{TokenRotator, NEW_TOKEN_ENV};
use crate::config::{Hook, HookAction, UpdateVarArgs};
use crate::errors::UpdaterError;
use crate::gitlab::{GitlabApi, TargetKind};

impl TokenRotator {
    /// Run `hook` up to `retry + 1` times, stopping at the first success.
    /// The error of the last attempt is returned when all of them fail.
    pub(super) async fn run_hook(
        &self,
        hook: &Hook,
        new_token: &str,
        path: &str,
        token_name: &str,
    ) -> Result<(), UpdaterError> {
        let hook_type = hook.action.type_name();
        let args = hook.describe_args();

        // Updates aimed at another instance get their own client for this hook only.
        let client: Arc<dyn GitlabApi> = match &hook.action {
            HookAction::UpdateVar(UpdateVarArgs {
                instance: Some(instance),
                ..
            }) => {
                tracing::debug!(path, token = token_name, hook_type, gitlab = %instance.base_url, "connecting to another gitlab instance");
                self.gitlab
                    .connect(&instance.base_url, &instance.token)
                    .await
                    .map_err(|err| {
                        tracing::error!(path, token = token_name, hook_type, args = %args, error = %err, "failed to initialize gitlab client");
                        err
                    })?
            }
            _ => Arc::clone(&self.gitlab),
        };

        let attempts = u32::from(hook.retry) + 1;
        let mut attempt = 1;
        loop {
            tracing::debug!(path, token = token_name, hook_type, args = %args, attempt, "executing hook");
            match self.exec_hook(hook, client.as_ref(), new_token).await {
                Ok(()) => {
                    tracing::info!(path, token = token_name, hook_type, args = %args, attempt, "hook successfully executed");
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(path, token = token_name, hook_type, args = %args, attempt, error = %err, "error in hook execution");
                    if attempt >= attempts {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn exec_hook(
        &self,
        hook: &Hook,
        client: &dyn GitlabApi,
        new_token: &str,
    ) -> Result<(), UpdaterError> {
        match &hook.action {
            HookAction::UseToken => {
                if !self.dry_run {
                    self.gitlab.auth(new_token).await?;
                }
            }
            HookAction::UpdateVar(args) => match (args.kind, self.dry_run) {
                (TargetKind::Repository, true) => {
                    client.get_repo_var(&args.path, &args.name).await?;
                }
                (TargetKind::Repository, false) => {
                    client
                        .update_repo_var(&args.path, &args.name, new_token)
                        .await?;
                }
                (_, true) => {
                    client.get_group_var(&args.path, &args.name).await?;
                }
                (_, false) => {
                    client
                        .update_group_var(&args.path, &args.name, new_token)
                        .await?;
                }
            },
            HookAction::ExecCmd(args) => {
                if self.dry_run {
                    self.shell.file_must_exist(&args.path).await?;
                } else {
                    let mut env = args.env.clone();
                    env.insert(NEW_TOKEN_ENV.to_string(), new_token.to_string());
                    let output = self.shell.exec(&args.path, &env).await?;
                    tracing::debug!(
                        path = %args.path,
                        "script execution results {}",
                        String::from_utf8_lossy(&output)
                    );
                }
            }
        }
        Ok(())
    }
}
