use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::ExportError;
use crate::types::{PullDescriptor, PushDescriptor};

/// List the YAML files directly inside `dir`, sorted by filename so that
/// everything derived from them comes out in a reproducible order.
///
/// Example:
/// ```rust,no_run
/// use hub_exports::list_yaml_files;
/// let files = list_yaml_files("push_datasets").unwrap();
/// for file in &files {
///     println!("{}", file.display());
/// }
/// ```
pub fn list_yaml_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ExportError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        error!(event = "Load", phase = "List", dir = ?dir, error = %e);
        ExportError::Io(format!("{}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }

    let files: Vec<PathBuf> = files.into_iter().sorted().collect();
    debug!(event = "Load", phase = "List", dir = ?dir, count = files.len());
    Ok(files)
}

/// Read a YAML file into an untyped value.
pub fn load_yaml(path: impl AsRef<Path>) -> Result<serde_yaml::Value, ExportError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        error!(event = "Load", phase = "Read", path = ?path, error = %e);
        ExportError::config_parse(path, e)
    })?;
    serde_yaml::from_str(&text).map_err(|e| {
        error!(event = "Load", phase = "Parse", path = ?path, error = %e);
        ExportError::config_parse(path, e)
    })
}

pub fn load_push_descriptor(path: impl AsRef<Path>) -> Result<PushDescriptor, ExportError> {
    load_descriptor(path.as_ref(), &PushDescriptor::REQUIRED_KEYS)
}

pub fn load_pull_descriptor(path: impl AsRef<Path>) -> Result<PullDescriptor, ExportError> {
    load_descriptor(path.as_ref(), &PullDescriptor::REQUIRED_KEYS)
}

/// Parse one descriptor, reporting the first missing required key by name
/// rather than serde's positional message.
fn load_descriptor<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<T, ExportError> {
    let value = load_yaml(path)?;
    let Some(mapping) = value.as_mapping() else {
        return Err(ExportError::config_parse(path, "expected a mapping at the top level"));
    };

    if let Some(missing) = required
        .iter()
        .find(|key| !mapping.contains_key(**key))
    {
        error!(event = "Load", phase = "Validate", path = ?path, missing_key = *missing);
        return Err(ExportError::config_parse(
            path,
            format!("missing required key '{missing}'"),
        ));
    }

    let descriptor = serde_yaml::from_value(value).map_err(|e| {
        error!(event = "Load", phase = "Validate", path = ?path, error = %e);
        ExportError::config_parse(path, e)
    })?;
    info!(event = "Load", phase = "Descriptor", path = ?path);
    Ok(descriptor)
}
