//! Data model types: validated names, descriptors, policy documents and
//! resource declarations.
//!
//! Canonical string forms:
//! - Bucket ARN: `arn:aws:s3:::{bucket}`, objects `ARN/*`, prefix `ARN/{name}/*`
//! - Export prefix: `{dataset}/`
//! - Resource reference: `${logical.attribute}`

mod arn;
mod descriptor;
mod name;
mod policy_document;
mod resource;

pub use arn::BucketArn;
pub use descriptor::{PullDescriptor, PushDescriptor};
pub use name::{BucketName, DatasetName, UserName};
pub use policy_document::{
    Action, Condition, Effect, POLICY_VERSION, PolicyDocument, Principal, Statement,
};
pub use resource::{
    AssumeRole, BucketArgs, BucketNotificationArgs, BucketPolicyArgs, Declaration, FileArchive,
    FunctionArgs, FunctionEnvironment, LambdaTrigger, PermissionArgs, ProviderArgs,
    PublicAccessBlockArgs, ResourceKind, ResourceOptions, RoleArgs, RolePolicyArgs,
    RolePolicyAttachmentArgs, Tags, output_ref, resource_ref,
};
