//! One provisioning run: configuration in, Pulumi YAML program out.

use tracing::info;

use crate::bucket::Bucket;
use crate::config::ProvisionConfig;
use crate::error::ExportError;
use crate::loader::list_yaml_files;
use crate::pull::PullExportDataset;
use crate::push::PushExportDatasets;
use crate::stack::Stack;
use crate::types::{AssumeRole, ProviderArgs};

/// Build the whole stack for `config`:
///
/// - an explicit AWS provider (region, and the role to assume if any)
/// - the export bucket
/// - every push dataset in `push_dir` with its transfer function, the
///   per-user write grants and the combined notification
/// - every pull dataset in `pull_dir`
///
/// Example:
/// ```rust,no_run
/// use hub_exports::{BucketName, ProvisionConfig, provision};
/// let config = ProvisionConfig::new("dev", BucketName::new("mojap-hub-exports-dev").unwrap());
/// let stack = provision(&config).unwrap();
/// println!("{}", stack.to_yaml().unwrap());
/// ```
pub fn provision(config: &ProvisionConfig) -> Result<Stack, ExportError> {
    let tagger = config.tagger();
    let mut stack = Stack::with_provider(
        &config.project,
        ProviderArgs {
            region: config.region.clone(),
            assume_role: config.assume_role_arn.as_ref().map(|arn| AssumeRole {
                role_arn: arn.clone(),
            }),
        },
    )?;

    let export_bucket = Bucket::new(config.export_bucket.clone(), &tagger);
    export_bucket.declare(&mut stack, None)?;
    stack.export("export_bucket_arn", export_bucket.arn_ref())?;

    let mut push = PushExportDatasets::new(
        list_yaml_files(&config.push_dir)?,
        &export_bucket,
        &tagger,
        &config.function,
    );
    push.load_datasets_and_users()?;
    push.build_transfer_functions()?;
    push.declare(&mut stack)?;

    let pull_files = list_yaml_files(&config.pull_dir)?;
    for path in &pull_files {
        PullExportDataset::from_filepath(path, &config.pull_bucket_prefix, &tagger)?
            .declare(&mut stack)?;
    }

    info!(
        event = "Provision",
        phase = "Complete",
        stack = %config.stack,
        resources = stack.len(),
        pull_datasets = pull_files.len()
    );
    Ok(stack)
}
