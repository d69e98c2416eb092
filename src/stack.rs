//! The in-memory program handed to the provisioning tool.
//!
//! Declarations are kept in the order they were made. Logical names are
//! unique within a program, and a bucket can carry only one notification
//! configuration, so both are checked here before anything reaches the
//! provider.

use std::collections::{BTreeMap, HashSet};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::ExportError;
use crate::types::{Declaration, ProviderArgs, ResourceKind, resource_ref};

pub const PROVIDER_NAME: &str = "aws-provider";

#[derive(Debug, Clone)]
pub struct Stack {
    project: String,
    provider: Option<String>,
    declarations: Vec<Declaration>,
    names: HashSet<String>,
    notified_buckets: HashSet<String>,
    outputs: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(project: impl Into<String>) -> Self {
        Stack {
            project: project.into(),
            provider: None,
            declarations: Vec::new(),
            names: HashSet::new(),
            notified_buckets: HashSet::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// A stack whose resources are all created through one explicit
    /// provider, declared first.
    pub fn with_provider(
        project: impl Into<String>,
        args: ProviderArgs,
    ) -> Result<Self, ExportError> {
        let mut stack = Stack::new(project);
        stack.declare(Declaration::new(PROVIDER_NAME, ResourceKind::Provider(args)))?;
        stack.provider = Some(resource_ref(PROVIDER_NAME));
        Ok(stack)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Add a declaration and return its logical name.
    ///
    /// Fails with `ResourceConflict` if the logical name is taken, and with
    /// `NotificationAlreadyDeclared` for a second notification on a bucket.
    pub fn declare(&mut self, mut declaration: Declaration) -> Result<String, ExportError> {
        if self.names.contains(&declaration.name) {
            warn!(event = "Declare", phase = "Conflict", name = %declaration.name);
            return Err(ExportError::ResourceConflict(declaration.name));
        }

        if let ResourceKind::BucketNotification(args) = &declaration.kind {
            if !self.notified_buckets.insert(args.bucket.clone()) {
                warn!(event = "Declare", phase = "Conflict", bucket = %args.bucket);
                return Err(ExportError::NotificationAlreadyDeclared(args.bucket.clone()));
            }
        }

        if declaration.options.provider.is_none() {
            declaration.options.provider = self.provider.clone();
        }

        debug!(
            event = "Declare",
            phase = "Resource",
            name = %declaration.name,
            kind = declaration.type_token()
        );
        let name = declaration.name.clone();
        self.names.insert(name.clone());
        self.declarations.push(declaration);
        Ok(name)
    }

    /// Publish a stack output, e.g. a role ARN other stacks need.
    pub fn export(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ExportError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(ExportError::ResourceConflict(format!("output {name}")));
        }
        self.outputs.insert(name, value.into());
        Ok(())
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// Declarations of one type token, e.g. `aws:iam:RolePolicy`.
    pub fn of_type<'a>(
        &'a self,
        type_token: &'a str,
    ) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.declarations
            .iter()
            .filter(move |d| d.type_token() == type_token)
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, ExportError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct Resources<'a>(&'a [Declaration]);

impl Serialize for Resources<'_> {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(self.0.len()))?;
        for declaration in self.0 {
            map.serialize_entry(&declaration.name, declaration)?;
        }
        map.end()
    }
}

/// Rendered as a Pulumi YAML program: `name`, `runtime`, `resources`, `outputs`.
impl Serialize for Stack {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(4))?;
        map.serialize_entry("name", &self.project)?;
        map.serialize_entry("runtime", "yaml")?;
        map.serialize_entry("resources", &Resources(&self.declarations))?;
        map.serialize_entry("outputs", &self.outputs)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BucketArgs, BucketNotificationArgs, LambdaTrigger, Tags};

    fn bucket(name: &str) -> Declaration {
        Declaration::new(name, ResourceKind::Bucket(BucketArgs::encrypted(name, Tags::new())))
    }

    fn notification(name: &str, bucket: &str) -> Declaration {
        Declaration::new(
            name,
            ResourceKind::BucketNotification(BucketNotificationArgs {
                bucket: bucket.to_string(),
                lambda_functions: vec![LambdaTrigger {
                    events: vec!["s3:ObjectCreated:*".to_string()],
                    filter_prefix: "a/".to_string(),
                    lambda_function_arn: "${f.arn}".to_string(),
                }],
            }),
        )
    }

    #[test]
    fn test_duplicate_logical_name_conflicts() {
        let mut stack = Stack::new("test");
        stack.declare(bucket("exports")).unwrap();
        assert_eq!(
            stack.declare(bucket("exports")),
            Err(ExportError::ResourceConflict("exports".to_string()))
        );
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_second_notification_on_bucket_conflicts() {
        let mut stack = Stack::new("test");
        stack.declare(notification("first", "${exports.id}")).unwrap();
        stack.declare(notification("other-bucket", "${pull.id}")).unwrap();

        let result = stack.declare(notification("second", "${exports.id}"));
        assert_eq!(
            result,
            Err(ExportError::NotificationAlreadyDeclared("${exports.id}".to_string()))
        );
        assert!(stack.get("second").is_none());
    }

    #[test]
    fn test_provider_applied_to_every_resource() {
        let mut stack = Stack::with_provider(
            "test",
            ProviderArgs {
                region: "eu-west-1".to_string(),
                assume_role: None,
            },
        )
        .unwrap();
        stack.declare(bucket("exports")).unwrap();

        let provider = stack.get(PROVIDER_NAME).unwrap();
        assert!(provider.options.provider.is_none());
        assert_eq!(
            stack.get("exports").unwrap().options.provider.as_deref(),
            Some("${aws-provider}")
        );
    }

    #[test]
    fn test_program_keeps_declaration_order() {
        let mut stack = Stack::new("test");
        stack.declare(bucket("zeta")).unwrap();
        stack.declare(bucket("alpha")).unwrap();
        stack.export("bucket", "${zeta.arn}").unwrap();

        let yaml = stack.to_yaml().unwrap();
        let zeta = yaml.find("zeta:").unwrap();
        let alpha = yaml.find("alpha:").unwrap();
        assert!(zeta < alpha);
        assert!(yaml.starts_with("name: test\nruntime: yaml\n"));

        let json: serde_json::Value = serde_json::from_str(&stack.to_json().unwrap()).unwrap();
        assert_eq!(json["resources"]["alpha"]["type"], "aws:s3:Bucket");
        assert_eq!(json["outputs"]["bucket"], "${zeta.arn}");
    }

    #[test]
    fn test_duplicate_output_conflicts() {
        let mut stack = Stack::new("test");
        stack.export("role_arn", "a").unwrap();
        assert!(stack.export("role_arn", "b").is_err());
    }
}
