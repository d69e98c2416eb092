//! Policy documents for every access pattern the exports need.
//!
//! All builders are pure: the same arguments always give the same document,
//! statement for statement, so re-declaring a stack is a no-op for the
//! provisioning tool and the documents can be snapshot tested.

use crate::transfer::TransferSemantics;
use crate::types::{Action, BucketArn, DatasetName, PolicyDocument, Principal, Statement};

pub(crate) const READ_ACTIONS: [Action; 3] = [
    Action::GetObject,
    Action::GetObjectAcl,
    Action::GetObjectVersion,
];

pub(crate) const WRITE_ACTIONS: [Action; 6] = [
    Action::DeleteObject,
    Action::DeleteObjectVersion,
    Action::PutObject,
    Action::PutObjectAcl,
    Action::PutObjectTagging,
    Action::RestoreObject,
];

pub(crate) const PUSH_ACTIONS: [Action; 3] = [
    Action::PutObject,
    Action::PutObjectAcl,
    Action::PutObjectTagging,
];

pub const LAMBDA_SERVICE: &str = "lambda.amazonaws.com";

/// The access patterns, one variant per kind of grant.
#[derive(Debug, Clone, Copy)]
pub enum PolicyTemplate<'a> {
    /// Bucket policy: external principals may read every object.
    PullReadOnly {
        bucket: &'a BucketArn,
        principals: &'a [String],
    },
    /// Bucket policy: external principals may read, write and delete.
    PullReadWrite {
        bucket: &'a BucketArn,
        principals: &'a [String],
    },
    /// Role policy: a user may write under each of its prefixes in the export bucket.
    PushWrite {
        bucket: &'a BucketArn,
        prefixes: &'a [DatasetName],
    },
    /// Role policy: full object lifecycle on one bucket.
    ReadWrite { bucket: &'a BucketArn },
    /// Role policy for a transfer function.
    Transfer {
        source: &'a BucketArn,
        prefix: &'a DatasetName,
        destination: &'a BucketArn,
        semantics: TransferSemantics,
    },
}

impl PolicyTemplate<'_> {
    pub fn build(&self) -> PolicyDocument {
        match *self {
            PolicyTemplate::PullReadOnly { bucket, principals } => {
                pull_statements(bucket, principals, READ_ACTIONS.to_vec())
            }
            PolicyTemplate::PullReadWrite { bucket, principals } => {
                pull_statements(bucket, principals, read_write_actions())
            }
            PolicyTemplate::PushWrite { bucket, prefixes } => PolicyDocument::new(vec![
                Statement::allow(PUSH_ACTIONS)
                    .on(prefixes.iter().map(|prefix| bucket.prefix_objects(prefix))),
                Statement::allow([Action::ListBucket]).on([bucket.bucket()]),
            ]),
            PolicyTemplate::ReadWrite { bucket } => PolicyDocument::new(vec![
                Statement::allow(read_write_actions()).on([bucket.objects()]),
                Statement::allow([Action::ListBucket]).on([bucket.bucket()]),
            ]),
            PolicyTemplate::Transfer {
                source,
                prefix,
                destination,
                semantics,
            } => {
                let source_statement = match semantics {
                    TransferSemantics::Move => {
                        Statement::allow([Action::GetObjectAny, Action::DeleteObjectAny])
                            .sid("GetDeleteSourceBucket")
                    }
                    TransferSemantics::Copy => {
                        Statement::allow([Action::GetObjectAny]).sid("GetSourceBucket")
                    }
                };
                PolicyDocument::new(vec![
                    source_statement.on([source.prefix_objects(prefix)]),
                    Statement::allow([Action::PutObjectAny])
                        .sid("PutDestinationBucket")
                        .on([destination.objects()]),
                ])
            }
        }
    }
}

fn read_write_actions() -> Vec<Action> {
    READ_ACTIONS.into_iter().chain(WRITE_ACTIONS).collect()
}

fn pull_statements(
    bucket: &BucketArn,
    principals: &[String],
    actions: Vec<Action>,
) -> PolicyDocument {
    let principal = Principal::Aws(principals.to_vec());
    PolicyDocument::new(vec![
        Statement::allow(actions)
            .principal(principal.clone())
            .on([bucket.objects()]),
        Statement::allow([Action::ListBucket])
            .principal(principal)
            .on([bucket.bucket()]),
    ])
}

/// Grant `principals` read access to the whole bucket, escalated to
/// read/write when `allow_push` is set.
pub fn build_pull_bucket_policy(
    bucket: &BucketArn,
    principals: &[String],
    allow_push: bool,
) -> PolicyDocument {
    if allow_push {
        PolicyTemplate::PullReadWrite { bucket, principals }.build()
    } else {
        PolicyTemplate::PullReadOnly { bucket, principals }.build()
    }
}

/// Get, put, delete and restore on one bucket, for a same-account role.
pub fn build_read_write_role_policy(bucket: &BucketArn) -> PolicyDocument {
    PolicyTemplate::ReadWrite { bucket }.build()
}

pub fn build_push_write_policy(bucket: &BucketArn, prefixes: &[DatasetName]) -> PolicyDocument {
    PolicyTemplate::PushWrite { bucket, prefixes }.build()
}

pub fn build_transfer_policy(
    source: &BucketArn,
    prefix: &DatasetName,
    destination: &BucketArn,
    semantics: TransferSemantics,
) -> PolicyDocument {
    PolicyTemplate::Transfer {
        source,
        prefix,
        destination,
        semantics,
    }
    .build()
}

/// Trust policy letting Lambda assume a function's execution role.
pub fn lambda_assume_role_policy() -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow([Action::AssumeRole])
            .principal(Principal::Service(vec![LAMBDA_SERVICE.to_string()])),
    ])
}

/// Refuse any request to the bucket made over TLS older than 1.2.
pub fn deny_insecure_transport(bucket: &BucketArn) -> Statement {
    Statement::deny([Action::S3Any])
        .principal(Principal::Anyone)
        .on([bucket.bucket(), bucket.objects()])
        .condition("NumericLessThan", "s3:TlsVersion", "1.2")
}
