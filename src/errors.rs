use thiserror::Error;

/// Message of the aggregate error returned by a lenient run.
pub const EXECUTION_FAILED_MSG: &str = "some error(s) occurred during execution";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("empty host")]
    EmptyHost,

    #[error("empty gitlab token")]
    EmptyToken,

    #[error("empty managed list")]
    EmptyManagedList,

    #[error("invalid default renew before value: {0}")]
    InvalidDefaultRenewBefore(String),

    #[error("invalid default expiry after rotate value: {0}")]
    InvalidDefaultExpiryAfterRotate(String),

    #[error("invalid type, the valid one are personal,group,repository")]
    InvalidManagedType,

    #[error("empty path config in managed token")]
    EmptyManagedPath,

    #[error("empty managed token list")]
    EmptyTokenList,

    #[error("empty token name")]
    EmptyTokenName,

    #[error("invalid renew before value")]
    InvalidRenewBefore,

    #[error("invalid expiry after rotate value")]
    InvalidExpiryAfterRotate,

    #[error("duplicated manage token found{}", previously_defined(.previous))]
    DuplicatedManaged { previous: Option<String> },

    #[error("invalid hook type, the valid one are update_var,exec_cmd,use_token")]
    InvalidHookType,

    #[error("missing arg name in update_var hook")]
    UpdateVarMissingName,

    #[error("missing arg path in update_var hook")]
    UpdateVarMissingPath,

    #[error("invalid arg type in update_var hook, the valid one are group,repository")]
    UpdateVarInvalidType,

    #[error("missing arg gitlab_token in update_var hook that sets gitlab")]
    UpdateVarMissingGitlabToken,

    #[error("missing arg path in exec_cmd hook")]
    ExecCmdMissingPath,

    #[error("can be only use in manage type personal")]
    UseTokenNotPersonal,

    #[error("hook use_token can be only use once")]
    UseTokenAlreadyUsed,

    #[error("hook use_token must be set at the first")]
    UseTokenNotFirst,

    #[error("{source} ({})", .references.join(", "))]
    WithContext {
        #[source]
        source: Box<ConfigError>,
        references: Vec<String>,
    },

    #[error("included file {0} is not exists")]
    IncludeMissing(String),

    #[error("included file ({0}) not contains any of managed token config")]
    IncludeEmpty(String),

    #[error("error in included file {path} as yaml content: {source}")]
    IncludeYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error in unmarshal YAML object: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Attach provenance (include reference, sequence numbers) to a validation error.
    /// Outer references are listed first when an error is wrapped again.
    pub fn with_references(self, mut references: Vec<String>) -> Self {
        match self {
            ConfigError::WithContext {
                source,
                references: inner,
            } => {
                references.extend(inner);
                ConfigError::WithContext { source, references }
            }
            other => ConfigError::WithContext {
                source: Box::new(other),
                references,
            },
        }
    }

    /// The validation error without any attached provenance.
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

fn previously_defined(previous: &Option<String>) -> String {
    previous
        .as_ref()
        .map(|p| format!(", previously defined at {}", p))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("gitlab request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gitlab returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("invalid gitlab base url {0}")]
    InvalidBaseUrl(String),

    #[error("unexpected gitlab payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} exited with {code:?}: {stderr}")]
    NonZeroExit {
        path: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("file {path} is not accessible: {source}")]
    FileNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("expiry date of '{token}' cannot be moved {days} days past {now}")]
    ExpiryOverflow {
        token: String,
        now: String,
        days: i64,
    },

    #[error("{}", EXECUTION_FAILED_MSG)]
    ExecutionFailed,
}
