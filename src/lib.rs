//! GitLab access token renewal.
//!
//! Library crate behind the `gitlab-token-updater` binary, also used by the
//! integration tests in `tests/`.

pub mod cli;
pub mod config;
pub mod errors;
pub mod gitlab;
pub mod rotation;
pub mod shell;
