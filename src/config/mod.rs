//! Configuration model.
//!
//! The YAML document is deserialized into the `*Document` types, then
//! [`ConfigDocument::resolve`] substitutes `${VAR}` placeholders, applies
//! defaults and validates everything into the immutable [`Config`] used for
//! the run.

pub mod duration;
pub mod env;
mod yaml;

use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::gitlab::TargetKind;
use duration::parse_duration;

pub use yaml::{expand_includes, load};

pub const DEFAULT_HOST: &str = "https://gitlab.com/";
pub const DEFAULT_TOKEN: &str = "${GL_RENEWER_TOKEN}";
pub const DEFAULT_RENEW_BEFORE: &str = "14d";
pub const DEFAULT_EXPIRY_AFTER_ROTATE: &str = "3M";

const HOOK_USE_TOKEN: &str = "use_token";
const HOOK_UPDATE_VAR: &str = "update_var";
const HOOK_EXEC_CMD: &str = "exec_cmd";

// ── Raw document ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub host: String,
    pub token: String,
    pub default_hook_retry: u8,
    pub default_renew_before: String,
    pub default_expiry_after_rotate: String,
    #[serde(rename = "manage_tokens")]
    pub managed: Vec<ManagedDocument>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            token: DEFAULT_TOKEN.to_string(),
            default_hook_retry: 0,
            default_renew_before: DEFAULT_RENEW_BEFORE.to_string(),
            default_expiry_after_rotate: DEFAULT_EXPIRY_AFTER_ROTATE.to_string(),
            managed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagedDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub include: String,
    pub access_tokens: Vec<AccessTokenDocument>,
    /// File the entry was read from.
    #[serde(skip)]
    pub source: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessTokenDocument {
    pub name: String,
    pub renew_before: String,
    pub expiry_after_rotate: String,
    pub hooks: Vec<HookDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub retry: Option<u8>,
    pub args: HookArgsDocument,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookArgsDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub name: String,
    pub gitlab: String,
    pub gitlab_token: String,
    pub env: BTreeMap<String, String>,
}

// ── Resolved model ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub token: String,
    pub managed: Vec<ManagedGroup>,
}

/// Tokens owned by one repository, group or the current user.
#[derive(Debug, Clone)]
pub struct ManagedGroup {
    pub kind: TargetKind,
    pub path: String,
    pub source: String,
    pub tokens: Vec<AccessTokenPolicy>,
}

#[derive(Debug, Clone)]
pub struct AccessTokenPolicy {
    pub name: String,
    pub renew_before: Duration,
    pub expiry_after_rotate: Duration,
    pub hooks: Vec<Hook>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hook {
    /// Extra attempts after the first failure.
    pub retry: u8,
    pub action: HookAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookAction {
    UseToken,
    UpdateVar(UpdateVarArgs),
    ExecCmd(ExecCmdArgs),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateVarArgs {
    pub kind: TargetKind,
    pub path: String,
    pub name: String,
    pub instance: Option<GitlabInstance>,
}

/// Another GitLab instance a variable update is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct GitlabInstance {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecCmdArgs {
    pub path: String,
    pub env: BTreeMap<String, String>,
}

impl HookAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            HookAction::UseToken => HOOK_USE_TOKEN,
            HookAction::UpdateVar(_) => HOOK_UPDATE_VAR,
            HookAction::ExecCmd(_) => HOOK_EXEC_CMD,
        }
    }
}

impl Hook {
    /// Arguments rendered for log lines. Secrets are left out.
    pub fn describe_args(&self) -> String {
        match &self.action {
            HookAction::UseToken => String::new(),
            HookAction::UpdateVar(args) => {
                let mut out = format!("type:{},path:{},name:{}", args.kind, args.path, args.name);
                if let Some(instance) = &args.instance {
                    out.push_str(&format!(",gitlab:{}", instance.base_url));
                }
                out
            }
            HookAction::ExecCmd(args) => format!("path:{}", args.path),
        }
    }
}

// ── Resolution and validation ─────────────────────────────────

impl ConfigDocument {
    /// Substitute placeholders, fill defaults and validate.
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let host = env::substitute(&self.host);
        let token = env::substitute(&self.token);

        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.managed.is_empty() {
            return Err(ConfigError::EmptyManagedList);
        }
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if parse_duration(&self.default_renew_before).is_none() {
            return Err(ConfigError::InvalidDefaultRenewBefore(
                self.default_renew_before.clone(),
            ));
        }
        if parse_duration(&self.default_expiry_after_rotate).is_none() {
            return Err(ConfigError::InvalidDefaultExpiryAfterRotate(
                self.default_expiry_after_rotate.clone(),
            ));
        }

        let mut use_token_seen = false;
        let mut seq_per_source: HashMap<&str, usize> = HashMap::new();
        let mut defined_at: HashMap<(&str, &str), &str> = HashMap::new();
        let mut managed = Vec::with_capacity(self.managed.len());

        for doc in &self.managed {
            let mut refs = Vec::new();
            if !doc.source.is_empty() {
                refs.push(format!("reference: {}", doc.source));
            }
            let seq = seq_per_source.entry(doc.source.as_str()).or_insert(0);
            *seq += 1;
            if doc.kind == TargetKind::Personal.as_str() {
                refs.push(format!("managed_token seq num: {} (type: {})", seq, doc.kind));
            } else {
                refs.push(format!(
                    "managed_token seq num: {} (type: {}, path: {})",
                    seq, doc.kind, doc.path
                ));
            }

            if let Some(previous) = defined_at.get(&(doc.kind.as_str(), doc.path.as_str())) {
                let previous = (!previous.is_empty()).then(|| previous.to_string());
                return Err(ConfigError::DuplicatedManaged { previous }.with_references(refs));
            }
            defined_at.insert((doc.kind.as_str(), doc.path.as_str()), doc.source.as_str());

            let kind: TargetKind = doc
                .kind
                .parse()
                .map_err(|_| ConfigError::InvalidManagedType.with_references(refs.clone()))?;
            if doc.path.is_empty() && kind != TargetKind::Personal {
                return Err(ConfigError::EmptyManagedPath.with_references(refs));
            }
            if doc.access_tokens.is_empty() {
                return Err(ConfigError::EmptyTokenList.with_references(refs));
            }

            let mut tokens = Vec::with_capacity(doc.access_tokens.len());
            for (tk_idx, tk) in doc.access_tokens.iter().enumerate() {
                let mut tk_refs = refs.clone();
                tk_refs.push(format!(
                    "access_token seq num: {} (name: {})",
                    tk_idx + 1,
                    tk.name
                ));

                let policy = self
                    .resolve_policy(tk, kind, tk_idx, &mut use_token_seen)
                    .map_err(|e| e.with_references(tk_refs))?;
                tokens.push(policy);
            }

            managed.push(ManagedGroup {
                kind,
                path: doc.path.clone(),
                source: doc.source.clone(),
                tokens,
            });
        }

        Ok(Config {
            host,
            token,
            managed,
        })
    }

    /// `use_token_seen` tracks `use_token` across the whole document; it may
    /// only be the first hook of the first policy of a personal group.
    fn resolve_policy(
        &self,
        tk: &AccessTokenDocument,
        kind: TargetKind,
        tk_idx: usize,
        use_token_seen: &mut bool,
    ) -> Result<AccessTokenPolicy, ConfigError> {
        if tk.name.is_empty() {
            return Err(ConfigError::EmptyTokenName);
        }

        let renew_before = non_empty_or(&tk.renew_before, &self.default_renew_before);
        let renew_before = parse_duration(renew_before).ok_or(ConfigError::InvalidRenewBefore)?;
        let expiry_after_rotate =
            non_empty_or(&tk.expiry_after_rotate, &self.default_expiry_after_rotate);
        let expiry_after_rotate =
            parse_duration(expiry_after_rotate).ok_or(ConfigError::InvalidExpiryAfterRotate)?;

        let mut hooks = Vec::with_capacity(tk.hooks.len());
        for (hk_idx, hook) in tk.hooks.iter().enumerate() {
            let hook_refs = || vec![format!("hook seq num: {}", hk_idx + 1)];
            let resolved = hook
                .resolve(self.default_hook_retry)
                .map_err(|e| e.with_references(hook_refs()))?;

            if resolved.action == HookAction::UseToken {
                let misplaced = if kind != TargetKind::Personal {
                    Some(ConfigError::UseTokenNotPersonal)
                } else if *use_token_seen {
                    Some(ConfigError::UseTokenAlreadyUsed)
                } else if hk_idx != 0 || tk_idx != 0 {
                    Some(ConfigError::UseTokenNotFirst)
                } else {
                    None
                };
                if let Some(err) = misplaced {
                    return Err(err.with_references(hook_refs()));
                }
                *use_token_seen = true;
            }
            hooks.push(resolved);
        }

        Ok(AccessTokenPolicy {
            name: tk.name.clone(),
            renew_before,
            expiry_after_rotate,
            hooks,
        })
    }
}

impl HookDocument {
    fn resolve(&self, default_retry: u8) -> Result<Hook, ConfigError> {
        let args = &self.args;
        let action = match self.kind.as_str() {
            HOOK_USE_TOKEN => HookAction::UseToken,
            HOOK_UPDATE_VAR => {
                let name = env::substitute(&args.name);
                if name.is_empty() {
                    return Err(ConfigError::UpdateVarMissingName);
                }
                let path = env::substitute(&args.path);
                if path.is_empty() {
                    return Err(ConfigError::UpdateVarMissingPath);
                }
                let kind = env::substitute(&args.kind)
                    .parse::<TargetKind>()
                    .ok()
                    .filter(|k| *k != TargetKind::Personal)
                    .ok_or(ConfigError::UpdateVarInvalidType)?;

                let base_url = env::substitute(&args.gitlab);
                let instance = if base_url.is_empty() {
                    None
                } else {
                    let token = env::substitute(&args.gitlab_token);
                    if token.is_empty() {
                        return Err(ConfigError::UpdateVarMissingGitlabToken);
                    }
                    Some(GitlabInstance { base_url, token })
                };

                HookAction::UpdateVar(UpdateVarArgs {
                    kind,
                    path,
                    name,
                    instance,
                })
            }
            HOOK_EXEC_CMD => {
                let path = env::substitute(&args.path);
                if path.is_empty() {
                    return Err(ConfigError::ExecCmdMissingPath);
                }
                let env = args
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), env::substitute(v)))
                    .collect();
                HookAction::ExecCmd(ExecCmdArgs { path, env })
            }
            _ => return Err(ConfigError::InvalidHookType),
        };

        Ok(Hook {
            retry: self.retry.unwrap_or(default_retry),
            action,
        })
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
