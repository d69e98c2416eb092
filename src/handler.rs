//! The body of the transfer function: copy each newly created object from
//! the export bucket to its dataset's target bucket, then delete the
//! source when moving.
//!
//! Every record of a batch is processed in order. The first failure stops
//! the batch and is returned to the Lambda platform, which owns retries and
//! dead-lettering. Records already transferred are not rolled back. On a
//! retry, or a repeated delivery, a moved record finds no source object and
//! is reported as already transferred; a copied record rewrites the same
//! bytes.

use std::collections::BTreeMap;
use std::env;

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use lambda_runtime::{Error, LambdaEvent};
use serde::Serialize;
use strum_macros::Display;
use tracing::{error, info, warn};

use crate::error::ExportError;
use crate::transfer::{ENV_TARGET_BUCKET, ENV_TRANSFER_MODE, TransferSemantics};

/// S3's answer when `x-amz-copy-source-if-match` no longer matches.
const PRECONDITION_FAILED: &str = "PreconditionFailed";
/// S3's answer when the copy source is gone.
const NO_SUCH_KEY: &str = "NoSuchKey";

/// Where objects go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetBuckets {
    /// `TARGET_BUCKET`: one function per dataset.
    Single(String),
    /// `TARGET_BUCKET_<PREFIX>`: one function serving several datasets,
    /// keyed by the normalized first path segment of the object key.
    ByPrefix(BTreeMap<String, String>),
}

impl TargetBuckets {
    pub fn resolve(&self, key: &str) -> Result<&str, ExportError> {
        match self {
            TargetBuckets::Single(bucket) => Ok(bucket),
            TargetBuckets::ByPrefix(buckets) => {
                let prefix = key.split_once('/').map(|(prefix, _)| prefix).unwrap_or_default();
                buckets
                    .get(&env_suffix(prefix))
                    .map(String::as_str)
                    .ok_or_else(|| {
                        ExportError::MissingEnvironment(format!(
                            "{ENV_TARGET_BUCKET}_{} for key '{key}'",
                            env_suffix(prefix)
                        ))
                    })
            }
        }
    }
}

/// `test_dataset-2` -> `TEST_DATASET_2`
fn env_suffix(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub targets: TargetBuckets,
    pub semantics: TransferSemantics,
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ExportError> {
        Self::from_vars(env::vars())
    }

    /// `TARGET_BUCKET` wins over any `TARGET_BUCKET_<PREFIX>`.
    /// `TRANSFER_MODE` is `move` (default) or `copy`.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, ExportError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut single = None;
        let mut by_prefix = BTreeMap::new();
        let mut semantics = TransferSemantics::default();

        for (key, value) in vars {
            let key = key.as_ref();
            let value: String = value.into();
            if key == ENV_TARGET_BUCKET {
                single = Some(value);
            } else if key == ENV_TRANSFER_MODE {
                semantics = value.parse().map_err(|_| {
                    ExportError::InvalidEnvironment(format!(
                        "{ENV_TRANSFER_MODE} must be 'move' or 'copy', got '{value}'"
                    ))
                })?;
            } else if let Some(prefix) = key
                .strip_prefix(ENV_TARGET_BUCKET)
                .and_then(|k| k.strip_prefix('_'))
            {
                if !prefix.is_empty() && !value.is_empty() {
                    by_prefix.insert(prefix.to_string(), value);
                }
            }
        }

        let targets = match single.filter(|bucket| !bucket.is_empty()) {
            Some(bucket) => TargetBuckets::Single(bucket),
            None if !by_prefix.is_empty() => TargetBuckets::ByPrefix(by_prefix),
            None => return Err(ExportError::MissingEnvironment(ENV_TARGET_BUCKET.to_string())),
        };
        Ok(HandlerConfig { targets, semantics })
    }
}

/// Undo the form encoding S3 applies to keys in event notifications.
pub fn decode_event_key(key: &str) -> Result<String, ExportError> {
    let bytes = key.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let byte = bytes
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| {
                        ExportError::InvalidEvent(format!("bad escape in key '{key}'"))
                    })?;
                decoded.push(byte);
                i += 2;
            }
            other => decoded.push(other),
        }
        i += 1;
    }
    String::from_utf8(decoded)
        .map_err(|_| ExportError::InvalidEvent(format!("key '{key}' is not UTF-8 once decoded")))
}

/// `bucket/key` for `x-amz-copy-source`. Event keys are already encoded,
/// except that spaces arrive as `+`.
fn copy_source(bucket: &str, raw_key: &str) -> String {
    format!("{bucket}/{}", raw_key.replace('+', "%20"))
}

/// Returned to the platform per record, in batch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum TransferOutcome {
    Moved,
    Copied,
    /// A newer upload replaced the object before it was copied.
    Superseded,
    /// Moving, and the source is already gone: an earlier delivery of the
    /// same event moved it.
    AlreadyTransferred,
}

pub async fn function_handler(
    event: LambdaEvent<S3Event>,
    s3_client: &S3Client,
    config: &HandlerConfig,
) -> Result<Vec<TransferOutcome>, Error> {
    let records = event.payload.records;
    if records.is_empty() {
        warn!(event = "Transfer", phase = "Empty", "No records found in S3 event");
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let outcome = transfer_record(s3_client, config, record).await.inspect_err(|e| {
            error!(event = "Transfer", phase = "Failed", record = index, error = %e);
        })?;
        outcomes.push(outcome);
    }
    info!(event = "Transfer", phase = "Complete", records = outcomes.len());
    Ok(outcomes)
}

async fn transfer_record(
    s3_client: &S3Client,
    config: &HandlerConfig,
    record: &S3EventRecord,
) -> Result<TransferOutcome, Error> {
    let source_bucket = record
        .s3
        .bucket
        .name
        .as_deref()
        .ok_or_else(|| ExportError::InvalidEvent("record has no bucket name".to_string()))?;
    let raw_key = record
        .s3
        .object
        .key
        .as_deref()
        .ok_or_else(|| ExportError::InvalidEvent("record has no object key".to_string()))?;
    let key = decode_event_key(raw_key)?;
    let target_bucket = config.targets.resolve(&key)?;

    let mut copy = s3_client
        .copy_object()
        .copy_source(copy_source(source_bucket, raw_key))
        .bucket(target_bucket)
        .key(&key)
        .acl(ObjectCannedAcl::BucketOwnerFullControl)
        .server_side_encryption(ServerSideEncryption::Aes256);
    if let Some(etag) = record.s3.object.e_tag.as_deref() {
        copy = copy.copy_source_if_match(etag);
    }

    if let Err(err) = copy.send().await {
        if err.code() == Some(PRECONDITION_FAILED) {
            warn!(
                event = "Transfer",
                phase = "Superseded",
                bucket = source_bucket,
                key = %key
            );
            return Ok(TransferOutcome::Superseded);
        }
        if err.code() == Some(NO_SUCH_KEY) && config.semantics.deletes_source() {
            warn!(
                event = "Transfer",
                phase = "AlreadyTransferred",
                bucket = source_bucket,
                key = %key
            );
            return Ok(TransferOutcome::AlreadyTransferred);
        }
        return Err(err.into());
    }
    info!(
        event = "Transfer",
        phase = "Copied",
        from = source_bucket,
        to = target_bucket,
        key = %key
    );

    if !config.semantics.deletes_source() {
        return Ok(TransferOutcome::Copied);
    }

    // Deleting the exact version leaves a newer upload to the same key alone.
    s3_client
        .delete_object()
        .bucket(source_bucket)
        .key(&key)
        .set_version_id(record.s3.object.version_id.clone())
        .send()
        .await?;
    info!(event = "Transfer", phase = "Deleted", bucket = source_bucket, key = %key);
    Ok(TransferOutcome::Moved)
}
