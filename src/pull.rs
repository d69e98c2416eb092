//! Pull datasets: a dedicated bucket per dataset that named external
//! principals read from (and write to, with `allow_push`).
//!
//! Unlike push grants, which are folded into one policy per user, every
//! pull dataset gets its own role policy per user. The same user in two
//! pull datasets therefore ends up with two independent policies.

use std::path::Path;

use tracing::info;

use crate::bucket::Bucket;
use crate::config::Tagger;
use crate::error::ExportError;
use crate::loader::load_pull_descriptor;
use crate::policy::{build_pull_bucket_policy, build_read_write_role_policy};
use crate::stack::Stack;
use crate::types::{
    BucketName, DatasetName, Declaration, PolicyDocument, PullDescriptor, ResourceKind,
    RolePolicyArgs, UserName,
};

#[derive(Debug, Clone)]
pub struct PullExportDataset {
    descriptor: PullDescriptor,
    bucket: Bucket,
}

impl PullExportDataset {
    /// The bucket is named `{bucket_prefix}-{name}`, lowercased with `_`
    /// turned into `-`.
    pub fn new(
        descriptor: PullDescriptor,
        bucket_prefix: &str,
        tagger: &Tagger,
    ) -> Result<Self, ExportError> {
        let bucket_name = BucketName::derived(bucket_prefix, &descriptor.name)?;
        Ok(PullExportDataset {
            bucket: Bucket::new(bucket_name, tagger),
            descriptor,
        })
    }

    pub fn from_filepath(
        path: impl AsRef<Path>,
        bucket_prefix: &str,
        tagger: &Tagger,
    ) -> Result<Self, ExportError> {
        PullExportDataset::new(load_pull_descriptor(path)?, bucket_prefix, tagger)
    }

    pub fn name(&self) -> &DatasetName {
        &self.descriptor.name
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn users(&self) -> &[UserName] {
        &self.descriptor.users
    }

    pub fn bucket_policy(&self) -> PolicyDocument {
        build_pull_bucket_policy(
            self.bucket.arn(),
            &self.descriptor.pull_arns,
            self.descriptor.allow_push,
        )
    }

    /// `hub-exports-pull-{name}`, the inline policy name on each user's role.
    pub fn role_policy_name(&self) -> String {
        format!("hub-exports-pull-{}", self.descriptor.name)
    }

    /// One read/write role policy per user, named `{dataset}-{user}`.
    pub fn role_policies(&self) -> Result<Vec<Declaration>, ExportError> {
        let policy = build_read_write_role_policy(self.bucket.arn()).to_json()?;
        Ok(self
            .descriptor
            .users
            .iter()
            .map(|user| {
                Declaration::new(
                    format!("{}-{user}", self.descriptor.name),
                    ResourceKind::RolePolicy(RolePolicyArgs {
                        name: self.role_policy_name(),
                        role: user.to_string(),
                        policy: policy.clone(),
                    }),
                )
                .depends_on([self.bucket.logical()])
            })
            .collect())
    }

    pub fn declare(&self, stack: &mut Stack) -> Result<(), ExportError> {
        self.bucket.declare(stack, Some(self.bucket_policy()))?;
        for role_policy in self.role_policies()? {
            stack.declare(role_policy)?;
        }

        info!(
            event = "PullDataset",
            phase = "Declared",
            dataset = %self.descriptor.name,
            bucket = %self.bucket.name(),
            principals = self.descriptor.pull_arns.len(),
            users = self.descriptor.users.len(),
            allow_push = self.descriptor.allow_push
        );
        Ok(())
    }
}
