//! A private, encrypted bucket that only accepts TLS 1.2+ requests.

use tracing::info;

use crate::config::Tagger;
use crate::error::ExportError;
use crate::policy::deny_insecure_transport;
use crate::stack::Stack;
use crate::types::{
    BucketArgs, BucketArn, BucketName, BucketPolicyArgs, Declaration, PolicyDocument,
    PublicAccessBlockArgs, ResourceKind, Tags, output_ref,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    logical: String,
    name: BucketName,
    arn: BucketArn,
    tags: Tags,
}

impl Bucket {
    /// The logical name is the bucket name itself.
    pub fn new(name: BucketName, tagger: &Tagger) -> Self {
        Bucket {
            logical: name.to_string(),
            arn: BucketArn::new(&name),
            tags: tagger.create_tags(name.as_str()),
            name,
        }
    }

    pub fn name(&self) -> &BucketName {
        &self.name
    }

    pub fn arn(&self) -> &BucketArn {
        &self.arn
    }

    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// `${bucket.id}`, so dependants wait for the bucket.
    pub fn id_ref(&self) -> String {
        output_ref(&self.logical, "id")
    }

    pub fn arn_ref(&self) -> String {
        output_ref(&self.logical, "arn")
    }

    pub fn policy_name(&self) -> String {
        format!("{}-bucket-policy", self.logical)
    }

    /// Declare the bucket, its public access block and its bucket policy.
    /// `grants` (if any) are followed by the insecure-transport deny.
    pub fn declare(
        &self,
        stack: &mut Stack,
        grants: Option<PolicyDocument>,
    ) -> Result<(), ExportError> {
        let policy = grants
            .unwrap_or_else(|| PolicyDocument::new(Vec::new()))
            .extend([deny_insecure_transport(&self.arn)]);

        stack.declare(Declaration::new(
            &self.logical,
            ResourceKind::Bucket(BucketArgs::encrypted(self.name.as_str(), self.tags.clone())),
        ))?;
        let access_block = format!("{}-public-access-block", self.logical);
        stack.declare(
            Declaration::new(
                &access_block,
                ResourceKind::BucketPublicAccessBlock(PublicAccessBlockArgs::all_blocked(
                    self.id_ref(),
                )),
            )
            .parent(&self.logical),
        )?;
        stack.declare(
            Declaration::new(
                self.policy_name(),
                ResourceKind::BucketPolicy(BucketPolicyArgs {
                    bucket: self.id_ref(),
                    policy: policy.to_json()?,
                }),
            )
            .parent(&self.logical)
            .depends_on([access_block.as_str()]),
        )?;

        info!(event = "Bucket", phase = "Declared", bucket = %self.name);
        Ok(())
    }
}
