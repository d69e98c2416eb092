// src/lib.rs
pub use bucket::Bucket;
pub use config::{FunctionSettings, ProvisionConfig, Tagger};
pub use error::ExportError;
pub use handler::{
    HandlerConfig, TargetBuckets, TransferOutcome, decode_event_key, function_handler,
};
pub use loader::{list_yaml_files, load_pull_descriptor, load_push_descriptor, load_yaml};
pub use policy::{
    PolicyTemplate, build_pull_bucket_policy, build_push_write_policy,
    build_read_write_role_policy, build_transfer_policy, deny_insecure_transport,
    lambda_assume_role_policy,
};
pub use program::provision;
pub use pull::PullExportDataset;
pub use push::{
    PushExportDataset, PushExportDatasets, WriteToExportBucketRolePolicy,
    make_combined_notification,
};
pub use stack::Stack;
pub use transfer::{TransferFunction, TransferSemantics};
pub use types::*;

mod bucket;
mod config;
mod error;
mod handler;
mod loader;
mod policy;
mod program;
mod pull;
mod push;
mod stack;
mod transfer;
mod types;
