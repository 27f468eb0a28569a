use std::path::Path;

use super::{Config, ConfigDocument, ManagedDocument};
use crate::errors::ConfigError;

/// Read, expand includes, resolve and validate the configuration file.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut doc: ConfigDocument = serde_yaml::from_str(&content)?;
    expand_includes(&mut doc, path)?;
    doc.resolve()
}

/// Replace every managed entry carrying `include` with the entries listed in
/// the included file, resolved relative to the directory of `config_path`.
/// Every resulting entry records the file it came from.
pub fn expand_includes(doc: &mut ConfigDocument, config_path: &Path) -> Result<(), ConfigError> {
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new(""));
    let mut expanded = Vec::with_capacity(doc.managed.len());

    for (idx, mut managed) in std::mem::take(&mut doc.managed).into_iter().enumerate() {
        if managed.include.is_empty() {
            managed.source = config_path.display().to_string();
            expanded.push(managed);
            continue;
        }
        tracing::debug!(sequence = idx, include = %managed.include, "detected include manage config");

        let include_path = config_dir.join(&managed.include);
        let display = include_path.display().to_string();
        if !include_path.is_file() {
            return Err(ConfigError::IncludeMissing(display));
        }
        let content = std::fs::read_to_string(&include_path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let included: Vec<ManagedDocument> =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::IncludeYaml {
                path: display.clone(),
                source,
            })?;
        if included.is_empty() {
            return Err(ConfigError::IncludeEmpty(display));
        }

        expanded.extend(included.into_iter().map(|mut entry| {
            entry.source = display.clone();
            entry
        }));
    }

    tracing::debug!(total = expanded.len(), "expanded manage token config");
    doc.managed = expanded;
    Ok(())
}
