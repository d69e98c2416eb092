//! Cloud resource declarations, in the shape the Pulumi YAML runtime reads.
//!
//! A declaration is `{type, properties, options}` under a logical name.
//! Properties are camelCase; references to other resources use Pulumi
//! interpolation (`${logical.attribute}`) so the provisioning tool orders
//! creation itself.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use strum_macros::AsRefStr;

pub type Tags = BTreeMap<String, String>;

/// `${logical.attribute}`
pub fn output_ref(logical: &str, attribute: &str) -> String {
    format!("${{{logical}.{attribute}}}")
}

/// `${logical}`, the whole resource (used in options).
pub fn resource_ref(logical: &str) -> String {
    format!("${{{logical}}}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(untagged)]
pub enum ResourceKind {
    #[strum(serialize = "pulumi:providers:aws")]
    Provider(ProviderArgs),
    #[strum(serialize = "aws:s3:Bucket")]
    Bucket(BucketArgs),
    #[strum(serialize = "aws:s3:BucketPublicAccessBlock")]
    BucketPublicAccessBlock(PublicAccessBlockArgs),
    #[strum(serialize = "aws:s3:BucketPolicy")]
    BucketPolicy(BucketPolicyArgs),
    #[strum(serialize = "aws:s3:BucketNotification")]
    BucketNotification(BucketNotificationArgs),
    #[strum(serialize = "aws:iam:Role")]
    Role(RoleArgs),
    #[strum(serialize = "aws:iam:RolePolicy")]
    RolePolicy(RolePolicyArgs),
    #[strum(serialize = "aws:iam:RolePolicyAttachment")]
    RolePolicyAttachment(RolePolicyAttachmentArgs),
    #[strum(serialize = "aws:lambda:Function")]
    Function(FunctionArgs),
    #[strum(serialize = "aws:lambda:Permission")]
    Permission(PermissionArgs),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceOptions {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.parent.is_none() && self.depends_on.is_empty()
    }
}

/// One resource under its logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: ResourceKind,
    pub options: ResourceOptions,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Declaration {
            name: name.into(),
            kind,
            options: ResourceOptions::default(),
        }
    }

    pub fn parent(mut self, logical: &str) -> Self {
        self.options.parent = Some(resource_ref(logical));
        self
    }

    pub fn depends_on<'a>(mut self, logicals: impl IntoIterator<Item = &'a str>) -> Self {
        self.options
            .depends_on
            .extend(logicals.into_iter().map(resource_ref));
        self
    }

    pub fn type_token(&self) -> &str {
        self.kind.as_ref()
    }

    pub fn arn(&self) -> String {
        output_ref(&self.name, "arn")
    }

    pub fn id(&self) -> String {
        output_ref(&self.name, "id")
    }
}

impl Serialize for Declaration {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let len = if self.options.is_empty() { 2 } else { 3 };
        let mut map = ser.serialize_map(Some(len))?;
        map.serialize_entry("type", self.type_token())?;
        map.serialize_entry("properties", &self.kind)?;
        if !self.options.is_empty() {
            map.serialize_entry("options", &self.options)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderArgs {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_role: Option<AssumeRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeRole {
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketArgs {
    pub bucket: String,
    pub server_side_encryption_configuration: SseConfiguration,
    pub versioning: Versioning,
    pub tags: Tags,
}

impl BucketArgs {
    /// A private, versioned bucket with AES256 default encryption.
    pub fn encrypted(bucket: impl Into<String>, tags: Tags) -> Self {
        BucketArgs {
            bucket: bucket.into(),
            server_side_encryption_configuration: SseConfiguration {
                rule: SseRule {
                    apply_server_side_encryption_by_default: SseDefault {
                        sse_algorithm: "AES256".to_string(),
                    },
                },
            },
            versioning: Versioning { enabled: true },
            tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SseConfiguration {
    pub rule: SseRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SseRule {
    pub apply_server_side_encryption_by_default: SseDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SseDefault {
    pub sse_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versioning {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccessBlockArgs {
    pub bucket: String,
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockArgs {
    pub fn all_blocked(bucket: impl Into<String>) -> Self {
        PublicAccessBlockArgs {
            bucket: bucket.into(),
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPolicyArgs {
    pub bucket: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketNotificationArgs {
    pub bucket: String,
    pub lambda_functions: Vec<LambdaTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaTrigger {
    pub events: Vec<String>,
    pub filter_prefix: String,
    pub lambda_function_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleArgs {
    pub name: String,
    pub path: String,
    pub assume_role_policy: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicyArgs {
    pub name: String,
    pub role: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicyAttachmentArgs {
    pub role: String,
    pub policy_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionArgs {
    pub name: String,
    pub description: String,
    pub role: String,
    pub runtime: String,
    pub handler: String,
    pub code: FileArchive,
    pub timeout: u32,
    pub memory_size: u32,
    pub environment: FunctionEnvironment,
    pub tags: Tags,
}

/// Serialized as `{"fn::fileArchive": path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArchive(pub PathBuf);

impl Serialize for FileArchive {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(1))?;
        map.serialize_entry("fn::fileArchive", &self.0.display().to_string())?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionEnvironment {
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionArgs {
    pub action: String,
    pub function: String,
    pub principal: String,
    pub source_arn: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references() {
        assert_eq!(output_ref("export-bucket", "arn"), "${export-bucket.arn}");
        assert_eq!(resource_ref("export-bucket"), "${export-bucket}");
    }

    #[test]
    fn test_declaration_serialization() {
        let declaration = Declaration::new(
            "export-policy",
            ResourceKind::BucketPolicy(BucketPolicyArgs {
                bucket: "${export.id}".to_string(),
                policy: "{}".to_string(),
            }),
        )
        .parent("export")
        .depends_on(["other"]);

        assert_eq!(declaration.type_token(), "aws:s3:BucketPolicy");
        assert_eq!(
            serde_json::to_value(&declaration).unwrap(),
            serde_json::json!({
                "type": "aws:s3:BucketPolicy",
                "properties": {"bucket": "${export.id}", "policy": "{}"},
                "options": {"parent": "${export}", "dependsOn": ["${other}"]},
            })
        );
    }

    #[test]
    fn test_declaration_without_options_omits_them() {
        let declaration = Declaration::new(
            "attach",
            ResourceKind::RolePolicyAttachment(RolePolicyAttachmentArgs {
                role: "${role.id}".to_string(),
                policy_arn: "arn:aws:iam::aws:policy/x".to_string(),
            }),
        );
        let value = serde_json::to_value(&declaration).unwrap();
        assert!(value.get("options").is_none());
        assert_eq!(value["properties"]["policyArn"], "arn:aws:iam::aws:policy/x");
    }

    #[test]
    fn test_file_archive_serialization() {
        let archive = FileArchive(PathBuf::from("target/lambda/transfer-handler"));
        assert_eq!(
            serde_json::to_value(&archive).unwrap(),
            serde_json::json!({"fn::fileArchive": "target/lambda/transfer-handler"})
        );
    }
}
