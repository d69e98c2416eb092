//! Provisioning configuration, scoped to one provisioning run.
//!
//! Everything that used to be fixed when the program started (stack name,
//! region, the role to assume, bucket names) lives in [`ProvisionConfig`] and
//! is passed explicitly into [`crate::provision`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExportError;
use crate::types::{BucketName, Tags};

fn default_project() -> String {
    "hub-exports".to_string()
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_pull_bucket_prefix() -> String {
    "mojap".to_string()
}

fn default_push_dir() -> PathBuf {
    PathBuf::from("push_datasets")
}

fn default_pull_dir() -> PathBuf {
    PathBuf::from("pull_datasets")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default = "default_project")]
    pub project: String,
    pub stack: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Role the provider assumes for every resource, if any.
    #[serde(default)]
    pub assume_role_arn: Option<String>,
    pub export_bucket: BucketName,
    #[serde(default = "default_pull_bucket_prefix")]
    pub pull_bucket_prefix: String,
    #[serde(default = "default_push_dir")]
    pub push_dir: PathBuf,
    #[serde(default = "default_pull_dir")]
    pub pull_dir: PathBuf,
    /// Extra tags on every taggable resource.
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub function: FunctionSettings,
}

impl ProvisionConfig {
    /// Minimal configuration; everything else takes its default.
    pub fn new(stack: impl Into<String>, export_bucket: BucketName) -> Self {
        ProvisionConfig {
            project: default_project(),
            stack: stack.into(),
            region: default_region(),
            assume_role_arn: None,
            export_bucket,
            pull_bucket_prefix: default_pull_bucket_prefix(),
            push_dir: default_push_dir(),
            pull_dir: default_pull_dir(),
            tags: Tags::new(),
            function: FunctionSettings::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ExportError::config_parse(path, e))?;
        let config: ProvisionConfig =
            serde_yaml::from_str(&text).map_err(|e| ExportError::config_parse(path, e))?;
        info!(
            event = "Config",
            phase = "Loaded",
            path = ?path,
            stack = %config.stack,
            export_bucket = %config.export_bucket
        );
        Ok(config)
    }

    pub fn tagger(&self) -> Tagger {
        Tagger::new(&self.stack, self.tags.clone())
    }
}

/// How transfer functions are packaged and sized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSettings {
    /// Directory holding the built `bootstrap` of the transfer handler.
    pub archive: PathBuf,
    pub runtime: String,
    pub handler: String,
    /// Seconds.
    pub timeout: u32,
    /// MB.
    pub memory_size: u32,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        FunctionSettings {
            archive: PathBuf::from("target/lambda/transfer-handler"),
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            timeout: 60,
            memory_size: 128,
        }
    }
}

/// Builds the tag set for a named resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagger {
    environment_name: String,
    base: Tags,
}

impl Tagger {
    pub fn new(environment_name: impl Into<String>, base: Tags) -> Self {
        Tagger {
            environment_name: environment_name.into(),
            base,
        }
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn create_tags(&self, name: &str) -> Tags {
        let mut tags: BTreeMap<String, String> = self.base.clone();
        tags.insert(
            "environment-name".to_string(),
            self.environment_name.clone(),
        );
        tags.insert("is-production".to_string(), self.is_production().to_string());
        tags.insert("Name".to_string(), name.to_string());
        tags
    }

    fn is_production(&self) -> bool {
        matches!(self.environment_name.as_str(), "prod" | "production")
    }
}
