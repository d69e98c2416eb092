//! The Lambda function that moves or copies one dataset's objects out of
//! the export bucket, together with its execution role.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::info;

use crate::bucket::Bucket;
use crate::config::{FunctionSettings, Tagger};
use crate::error::ExportError;
use crate::policy::{build_transfer_policy, lambda_assume_role_policy};
use crate::stack::Stack;
use crate::types::{
    BucketArn, BucketName, DatasetName, Declaration, FileArchive, FunctionArgs,
    FunctionEnvironment, PermissionArgs, PolicyDocument, ResourceKind, RoleArgs,
    RolePolicyArgs, RolePolicyAttachmentArgs,
};

pub const ENV_TARGET_BUCKET: &str = "TARGET_BUCKET";
pub const ENV_TRANSFER_MODE: &str = "TRANSFER_MODE";
pub const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

const BASIC_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
const S3_SERVICE: &str = "s3.amazonaws.com";

/// Whether the source object survives a transfer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferSemantics {
    /// Copy, then delete the source.
    #[default]
    Move,
    /// Copy only.
    Copy,
}

impl TransferSemantics {
    pub fn from_keep_files(keep_files: bool) -> Self {
        if keep_files {
            TransferSemantics::Copy
        } else {
            TransferSemantics::Move
        }
    }

    pub fn deletes_source(&self) -> bool {
        matches!(self, TransferSemantics::Move)
    }
}

/// Role, role policy, basic-execution attachment, function and invoke
/// permission for one dataset. Never changed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFunction {
    name: String,
    dataset: DatasetName,
    semantics: TransferSemantics,
    policy: PolicyDocument,
    role: Declaration,
    role_policy: Declaration,
    attachment: Declaration,
    function: Declaration,
    permission: Declaration,
}

impl TransferFunction {
    /// `export_{dataset}-{move|copy}`, shared by the function and its role.
    pub fn function_name(dataset: &DatasetName, semantics: TransferSemantics) -> String {
        format!("export_{dataset}-{semantics}")
    }

    pub fn new(
        dataset: &DatasetName,
        semantics: TransferSemantics,
        source: &Bucket,
        destination: &BucketName,
        tagger: &Tagger,
        settings: &FunctionSettings,
    ) -> Result<Self, ExportError> {
        let name = Self::function_name(dataset, semantics);
        let policy = build_transfer_policy(
            source.arn(),
            dataset,
            &BucketArn::new(destination),
            semantics,
        );

        let role_logical = format!("{name}-role");
        let role = Declaration::new(
            &role_logical,
            ResourceKind::Role(RoleArgs {
                name: name.clone(),
                path: "/service-role/".to_string(),
                assume_role_policy: lambda_assume_role_policy().to_json()?,
                tags: tagger.create_tags(&name),
            }),
        );
        let role_policy = Declaration::new(
            format!("{name}-role-policy"),
            ResourceKind::RolePolicy(RolePolicyArgs {
                name: name.clone(),
                role: role.id(),
                policy: policy.to_json()?,
            }),
        )
        .parent(&role_logical);
        let attachment = Declaration::new(
            format!("{name}-basic-execution"),
            ResourceKind::RolePolicyAttachment(RolePolicyAttachmentArgs {
                role: role.id(),
                policy_arn: BASIC_EXECUTION_POLICY_ARN.to_string(),
            }),
        )
        .parent(&role_logical);

        let variables = BTreeMap::from([
            (ENV_TARGET_BUCKET.to_string(), destination.to_string()),
            (ENV_TRANSFER_MODE.to_string(), semantics.to_string()),
        ]);
        let function = Declaration::new(
            &name,
            ResourceKind::Function(FunctionArgs {
                name: name.clone(),
                description: format!(
                    "{} objects under {} to {destination}",
                    match semantics {
                        TransferSemantics::Move => "Moves",
                        TransferSemantics::Copy => "Copies",
                    },
                    dataset.key_prefix()
                ),
                role: role.arn(),
                runtime: settings.runtime.clone(),
                handler: settings.handler.clone(),
                code: FileArchive(settings.archive.clone()),
                timeout: settings.timeout,
                memory_size: settings.memory_size,
                environment: FunctionEnvironment { variables },
                tags: tagger.create_tags(&name),
            }),
        )
        .depends_on([role_policy.name.as_str(), attachment.name.as_str()]);
        let permission = Declaration::new(
            format!("{name}-permission"),
            ResourceKind::Permission(PermissionArgs {
                action: "lambda:InvokeFunction".to_string(),
                function: function.arn(),
                principal: S3_SERVICE.to_string(),
                source_arn: source.arn_ref(),
            }),
        )
        .parent(&name);

        info!(
            event = "TransferFunction",
            phase = "Built",
            dataset = %dataset,
            semantics = %semantics,
            destination = %destination
        );
        Ok(TransferFunction {
            name,
            dataset: dataset.clone(),
            semantics,
            policy,
            role,
            role_policy,
            attachment,
            function,
            permission,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset(&self) -> &DatasetName {
        &self.dataset
    }

    pub fn semantics(&self) -> TransferSemantics {
        self.semantics
    }

    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    /// `${export_x-move.arn}`
    pub fn function_arn(&self) -> String {
        self.function.arn()
    }

    pub fn role_arn(&self) -> String {
        self.role.arn()
    }

    pub fn permission_name(&self) -> &str {
        &self.permission.name
    }

    /// The declarations in creation order.
    pub fn declarations(&self) -> [&Declaration; 5] {
        [
            &self.role,
            &self.role_policy,
            &self.attachment,
            &self.function,
            &self.permission,
        ]
    }

    pub fn declare(&self, stack: &mut Stack) -> Result<(), ExportError> {
        for declaration in self.declarations() {
            stack.declare(declaration.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Tags};
    use std::str::FromStr;
    use yare::parameterized;

    fn build(dataset: &str, semantics: TransferSemantics) -> TransferFunction {
        let tagger = Tagger::new("unit-tests", Tags::new());
        TransferFunction::new(
            &DatasetName::new(dataset).unwrap(),
            semantics,
            &Bucket::new(BucketName::new("test-export-bucket").unwrap(), &tagger),
            &BucketName::new("test-bucket").unwrap(),
            &tagger,
            &FunctionSettings::default(),
        )
        .unwrap()
    }

    #[parameterized(
        move_files = { false, TransferSemantics::Move, "move" },
        keep_files = { true, TransferSemantics::Copy, "copy" },
    )]
    fn test_semantics_from_keep_files(keep_files: bool, expected: TransferSemantics, mode: &str) {
        let semantics = TransferSemantics::from_keep_files(keep_files);
        assert_eq!(semantics, expected);
        assert_eq!(semantics.as_ref(), mode);
        assert_eq!(TransferSemantics::from_str(mode).unwrap(), expected);
        assert_eq!(semantics.deletes_source(), !keep_files);
    }

    #[test]
    fn test_move_function_resources() {
        let function = build("test_dataset", TransferSemantics::Move);
        assert_eq!(function.name(), "export_test_dataset-move");

        let names: Vec<&str> = function
            .declarations()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "export_test_dataset-move-role",
                "export_test_dataset-move-role-policy",
                "export_test_dataset-move-basic-execution",
                "export_test_dataset-move",
                "export_test_dataset-move-permission",
            ]
        );

        let statements = function.policy().statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].action,
            vec![Action::GetObjectAny, Action::DeleteObjectAny]
        );
        assert_eq!(
            statements[0].resource,
            vec!["arn:aws:s3:::test-export-bucket/test_dataset/*"]
        );
        assert_eq!(statements[1].action, vec![Action::PutObjectAny]);
        assert_eq!(statements[1].resource, vec!["arn:aws:s3:::test-bucket/*"]);
    }

    #[test]
    fn test_function_environment_and_wiring() {
        let function = build("test_dataset_2", TransferSemantics::Copy);
        let [role, role_policy, _, lambda, permission] = function.declarations();

        let ResourceKind::Function(args) = &lambda.kind else {
            panic!("Expected a function");
        };
        assert_eq!(args.name, "export_test_dataset_2-copy");
        assert_eq!(args.role, "${export_test_dataset_2-copy-role.arn}");
        assert_eq!(args.environment.variables[ENV_TARGET_BUCKET], "test-bucket");
        assert_eq!(args.environment.variables[ENV_TRANSFER_MODE], "copy");
        assert_eq!(args.timeout, 60);

        let ResourceKind::Role(role_args) = &role.kind else {
            panic!("Expected a role");
        };
        assert_eq!(role_args.name, "export_test_dataset_2-copy");
        assert!(role_args.assume_role_policy.contains("lambda.amazonaws.com"));

        let ResourceKind::RolePolicy(policy_args) = &role_policy.kind else {
            panic!("Expected a role policy");
        };
        assert!(!policy_args.policy.contains("s3:DeleteObject"));

        let ResourceKind::Permission(permission_args) = &permission.kind else {
            panic!("Expected a permission");
        };
        assert_eq!(permission_args.principal, "s3.amazonaws.com");
        assert_eq!(permission_args.source_arn, "${test-export-bucket.arn}");
        assert_eq!(permission_args.function, function.function_arn());
    }

    #[parameterized(
        moving = { TransferSemantics::Move },
        copying = { TransferSemantics::Copy },
    )]
    fn test_longest_dataset_name_fits_function_name(semantics: TransferSemantics) {
        let dataset = "a123456789b123456789c123456789d123456789e123456789f1";
        let function = build(dataset, semantics);
        assert_eq!(function.name().len(), 64);
        assert!(
            function
                .name()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        );
    }

    #[test]
    fn test_declare_twice_conflicts() {
        let function = build("test_dataset", TransferSemantics::Move);
        let mut stack = Stack::new("test");
        function.declare(&mut stack).unwrap();
        assert_eq!(stack.len(), 5);
        assert!(matches!(
            function.declare(&mut stack),
            Err(ExportError::ResourceConflict(_))
        ));
    }
}
