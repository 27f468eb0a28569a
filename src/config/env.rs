use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ENV_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Replace every `${NAME}` with the value of the environment variable `NAME`.
/// Unset variables become an empty string.
pub fn substitute(input: &str) -> String {
    ENV_PLACEHOLDER_RE
        .replace_all(input, |caps: &Captures| std::env::var(&caps[1]).unwrap_or_default())
        .into_owned()
}
