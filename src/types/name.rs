//! Validated names for datasets, users and buckets.
//!
//! Each name is checked once, when it enters the crate (from a descriptor
//! file or a constructor), so the rest of the code can build S3 keys, ARNs
//! and resource names from it without re-validating.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ExportError;

// `export_{name}-{move|copy}` names a Lambda function and an IAM role, both
// limited to 64 characters of [A-Za-z0-9_-].
static DATASET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]{0,51}$").expect("valid regex"));

static USER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+=,.@_\-]{1,64}$").expect("valid regex"));

static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9]$").expect("valid regex"));

/// Name of a push or pull dataset. Doubles as the S3 key prefix in the
/// export bucket, so it may not contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetName(String);

impl DatasetName {
    pub fn new(name: impl Into<String>) -> Result<Self, ExportError> {
        let name = name.into();
        if DATASET_NAME.is_match(&name) {
            Ok(DatasetName(name))
        } else {
            Err(ExportError::InvalidName(format!(
                "dataset name '{name}' must be 1-52 characters of [A-Za-z0-9_-] starting with a letter or digit"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key prefix used to filter events in the export bucket.
    pub fn key_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

/// An IAM role name, i.e. an Analytical Platform user such as `alpha_user_jane`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct UserName(String);

impl UserName {
    pub fn new(name: impl Into<String>) -> Result<Self, ExportError> {
        let name = name.into();
        if USER_NAME.is_match(&name) {
            Ok(UserName(name))
        } else {
            Err(ExportError::InvalidName(format!(
                "user name '{name}' is not a valid IAM role name"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An S3 bucket name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    pub fn new(name: impl Into<String>) -> Result<Self, ExportError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ExportError::InvalidName("bucket name is empty".to_string()));
        }
        if BUCKET_NAME.is_match(&name) && !name.contains("..") {
            Ok(BucketName(name))
        } else {
            Err(ExportError::InvalidName(format!(
                "bucket name '{name}' must be 3-63 characters of [a-z0-9.-] starting and ending with a letter or digit"
            )))
        }
    }

    /// Derive a bucket name from a prefix and a dataset name. Dataset names
    /// may hold underscores and capitals, bucket names may not.
    pub fn derived(prefix: &str, dataset: &DatasetName) -> Result<Self, ExportError> {
        let suffix = dataset.as_str().to_lowercase().replace('_', "-");
        BucketName::new(format!("{prefix}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($($ty:ident),*) => {
        $(
            impl Display for $ty {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $ty {
                type Err = ExportError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    $ty::new(s)
                }
            }

            impl TryFrom<String> for $ty {
                type Error = ExportError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    $ty::new(value)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.0
                }
            }

            impl AsRef<str> for $ty {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )*
    };
}

string_newtype_impls!(DatasetName, UserName, BucketName);
