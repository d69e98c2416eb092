//! Dataset descriptors, one per YAML file.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::name::{DatasetName, UserName};

/// A push dataset: objects written under `{name}/` in the export bucket are
/// moved (or copied, with `keep_files`) to `target_bucket`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PushDescriptor {
    pub name: DatasetName,
    /// Checked when the dataset is built, so an empty value reports
    /// the dataset it belongs to.
    pub target_bucket: String,
    pub keep_files: bool,
    pub users: Vec<UserName>,
}

impl PushDescriptor {
    pub const REQUIRED_KEYS: [&'static str; 4] = ["name", "target_bucket", "keep_files", "users"];
}

/// A pull dataset: a dedicated bucket that external principals can read
/// from, and write to when `allow_push` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PullDescriptor {
    pub name: DatasetName,
    pub pull_arns: Vec<String>,
    pub users: Vec<UserName>,
    #[serde(default)]
    pub allow_push: bool,
}

impl PullDescriptor {
    pub const REQUIRED_KEYS: [&'static str; 3] = ["name", "pull_arns", "users"];
}
