//! Push datasets: objects written under `{name}/` in the export bucket are
//! moved or copied to the dataset's own target bucket.
//!
//! [`PushExportDatasets`] is driven in three steps, each a precondition of
//! the next:
//!
//! 1. [`PushExportDatasets::load_datasets_and_users`]
//! 2. [`PushExportDatasets::build_transfer_functions`] and
//!    [`PushExportDatasets::build_role_policies`]
//! 3. [`PushExportDatasets::declare`]
//!
//! A bucket accepts one notification configuration only, so the triggers of
//! every dataset are folded into a single combined notification, and
//! `declare` must run once per export bucket.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::config::{FunctionSettings, Tagger};
use crate::error::ExportError;
use crate::loader::load_push_descriptor;
use crate::policy::build_push_write_policy;
use crate::stack::Stack;
use crate::transfer::{OBJECT_CREATED, TransferFunction, TransferSemantics};
use crate::types::{
    BucketName, BucketNotificationArgs, DatasetName, Declaration, LambdaTrigger, PolicyDocument,
    PushDescriptor, ResourceKind, RolePolicyArgs, UserName,
};

/// Name of the inline policy each pushing user's role receives.
pub const WRITE_POLICY_NAME: &str = "hub-exports";

#[derive(Debug, Clone)]
pub struct PushExportDataset {
    descriptor: PushDescriptor,
    target_bucket: BucketName,
    export_bucket: Bucket,
    tagger: Tagger,
    settings: FunctionSettings,
    transfer_function: Option<TransferFunction>,
}

impl PushExportDataset {
    /// Fails with `EmptyTargetBucket` when the descriptor names no target.
    pub fn new(
        descriptor: PushDescriptor,
        export_bucket: &Bucket,
        tagger: &Tagger,
        settings: &FunctionSettings,
    ) -> Result<Self, ExportError> {
        let target = descriptor.target_bucket.trim();
        if target.is_empty() {
            warn!(event = "PushDataset", phase = "Validate", dataset = %descriptor.name);
            return Err(ExportError::EmptyTargetBucket(descriptor.name.to_string()));
        }
        let target_bucket = BucketName::new(target)?;

        Ok(PushExportDataset {
            descriptor,
            target_bucket,
            export_bucket: export_bucket.clone(),
            tagger: tagger.clone(),
            settings: settings.clone(),
            transfer_function: None,
        })
    }

    pub fn from_filepath(
        path: impl AsRef<Path>,
        export_bucket: &Bucket,
        tagger: &Tagger,
        settings: &FunctionSettings,
    ) -> Result<Self, ExportError> {
        let descriptor = load_push_descriptor(path)?;
        PushExportDataset::new(descriptor, export_bucket, tagger, settings)
    }

    pub fn name(&self) -> &DatasetName {
        &self.descriptor.name
    }

    pub fn users(&self) -> &[UserName] {
        &self.descriptor.users
    }

    pub fn target_bucket(&self) -> &BucketName {
        &self.target_bucket
    }

    pub fn keep_files(&self) -> bool {
        self.descriptor.keep_files
    }

    pub fn semantics(&self) -> TransferSemantics {
        TransferSemantics::from_keep_files(self.descriptor.keep_files)
    }

    pub fn transfer_function(&self) -> Option<&TransferFunction> {
        self.transfer_function.as_ref()
    }

    /// Build the transfer function on the first call; later calls return
    /// the same function and build nothing.
    pub fn build_transfer_function(&mut self) -> Result<&TransferFunction, ExportError> {
        let function = match self.transfer_function.take() {
            Some(existing) => {
                debug!(event = "PushDataset", phase = "AlreadyBuilt", dataset = %self.name());
                existing
            }
            None => TransferFunction::new(
                &self.descriptor.name,
                self.semantics(),
                &self.export_bucket,
                &self.target_bucket,
                &self.tagger,
                &self.settings,
            )?,
        };
        Ok(&*self.transfer_function.insert(function))
    }
}

/// Lets one user's existing role write under each of their dataset
/// prefixes in the export bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteToExportBucketRolePolicy {
    user: UserName,
    prefixes: Vec<DatasetName>,
    policy: PolicyDocument,
}

impl WriteToExportBucketRolePolicy {
    pub fn new(user: UserName, export_bucket: &Bucket, prefixes: Vec<DatasetName>) -> Self {
        let policy = build_push_write_policy(export_bucket.arn(), &prefixes);
        WriteToExportBucketRolePolicy {
            user,
            prefixes,
            policy,
        }
    }

    pub fn user(&self) -> &UserName {
        &self.user
    }

    pub fn prefixes(&self) -> &[DatasetName] {
        &self.prefixes
    }

    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    pub fn logical_name(&self) -> String {
        format!("{}-{WRITE_POLICY_NAME}", self.user)
    }

    pub fn declaration(&self) -> Result<Declaration, ExportError> {
        Ok(Declaration::new(
            self.logical_name(),
            ResourceKind::RolePolicy(RolePolicyArgs {
                name: WRITE_POLICY_NAME.to_string(),
                role: self.user.to_string(),
                policy: self.policy.to_json()?,
            }),
        ))
    }
}

/// One notification for the whole export bucket, with a trigger for every
/// dataset that has a built transfer function. `None` when there is
/// nothing to trigger.
///
/// Call this once per export bucket: a second notification on the same
/// bucket is rejected by [`Stack::declare`].
pub fn make_combined_notification(
    export_bucket: &Bucket,
    datasets: &[PushExportDataset],
) -> Option<Declaration> {
    let functions: Vec<&TransferFunction> = datasets
        .iter()
        .filter_map(PushExportDataset::transfer_function)
        .collect();
    if functions.is_empty() {
        return None;
    }

    let lambda_functions = functions
        .iter()
        .map(|function| LambdaTrigger {
            events: vec![OBJECT_CREATED.to_string()],
            filter_prefix: function.dataset().key_prefix(),
            lambda_function_arn: function.function_arn(),
        })
        .collect();

    Some(
        Declaration::new(
            format!("{}-notification", export_bucket.logical()),
            ResourceKind::BucketNotification(BucketNotificationArgs {
                bucket: export_bucket.id_ref(),
                lambda_functions,
            }),
        )
        .parent(export_bucket.logical())
        .depends_on(functions.iter().map(|f| f.permission_name())),
    )
}

#[derive(Debug, Clone)]
pub struct PushExportDatasets {
    config_paths: Vec<PathBuf>,
    export_bucket: Bucket,
    tagger: Tagger,
    settings: FunctionSettings,
    datasets: Option<Vec<PushExportDataset>>,
    /// User -> prefixes, in load order without repeats.
    users: Option<BTreeMap<UserName, Vec<DatasetName>>>,
}

impl PushExportDatasets {
    pub fn new(
        config_paths: Vec<PathBuf>,
        export_bucket: &Bucket,
        tagger: &Tagger,
        settings: &FunctionSettings,
    ) -> Self {
        PushExportDatasets {
            config_paths,
            export_bucket: export_bucket.clone(),
            tagger: tagger.clone(),
            settings: settings.clone(),
            datasets: None,
            users: None,
        }
    }

    /// Load every descriptor in path order. Nothing is kept on failure.
    pub fn load_datasets_and_users(&mut self) -> Result<(), ExportError> {
        let mut datasets = Vec::with_capacity(self.config_paths.len());
        let mut names = HashSet::new();
        let mut users: BTreeMap<UserName, Vec<DatasetName>> = BTreeMap::new();

        for path in &self.config_paths {
            let dataset = PushExportDataset::from_filepath(
                path,
                &self.export_bucket,
                &self.tagger,
                &self.settings,
            )?;
            if !names.insert(dataset.name().clone()) {
                warn!(
                    event = "PushDatasets",
                    phase = "Load",
                    dataset = %dataset.name(),
                    path = ?path
                );
                return Err(ExportError::DuplicateDataset(dataset.name().to_string()));
            }

            for user in dataset.users() {
                let prefixes = users.entry(user.clone()).or_default();
                if !prefixes.contains(dataset.name()) {
                    prefixes.push(dataset.name().clone());
                }
            }
            datasets.push(dataset);
        }

        info!(
            event = "PushDatasets",
            phase = "Loaded",
            datasets = datasets.len(),
            users = users.len()
        );
        self.datasets = Some(datasets);
        self.users = Some(users);
        Ok(())
    }

    pub fn datasets(&self) -> Result<&[PushExportDataset], ExportError> {
        self.datasets.as_deref().ok_or_else(|| {
            ExportError::DatasetsNotLoaded(
                "run load_datasets_and_users before building transfer functions".to_string(),
            )
        })
    }

    pub fn users(&self) -> Result<&BTreeMap<UserName, Vec<DatasetName>>, ExportError> {
        self.users.as_ref().ok_or_else(|| {
            ExportError::UsersNotLoaded(
                "run load_datasets_and_users before building role policies".to_string(),
            )
        })
    }

    /// Build each dataset's transfer function in load order.
    ///
    /// Idempotent: calling it again returns the functions already built.
    pub fn build_transfer_functions(&mut self) -> Result<Vec<&TransferFunction>, ExportError> {
        let datasets = self.datasets.as_mut().ok_or_else(|| {
            ExportError::DatasetsNotLoaded(
                "run load_datasets_and_users before building transfer functions".to_string(),
            )
        })?;
        datasets
            .iter_mut()
            .map(PushExportDataset::build_transfer_function)
            .collect()
    }

    /// One write grant per distinct user, in user order.
    pub fn build_role_policies(&self) -> Result<Vec<WriteToExportBucketRolePolicy>, ExportError> {
        let users = self.users()?;
        Ok(users
            .iter()
            .map(|(user, prefixes)| {
                WriteToExportBucketRolePolicy::new(
                    user.clone(),
                    &self.export_bucket,
                    prefixes.clone(),
                )
            })
            .collect())
    }

    pub fn make_combined_notification(&self) -> Result<Option<Declaration>, ExportError> {
        Ok(make_combined_notification(&self.export_bucket, self.datasets()?))
    }

    /// Declare every built transfer function, every write grant and the
    /// combined notification, and export each function's role ARN.
    pub fn declare(&self, stack: &mut Stack) -> Result<(), ExportError> {
        let datasets = self.datasets()?;
        for function in datasets.iter().filter_map(PushExportDataset::transfer_function) {
            function.declare(stack)?;
            stack.export(
                format!("{}_export_role_arn", function.dataset()),
                function.role_arn(),
            )?;
        }

        for grant in self.build_role_policies()? {
            stack.declare(grant.declaration()?)?;
        }

        if let Some(notification) = self.make_combined_notification()? {
            stack.declare(notification)?;
        }

        info!(
            event = "PushDatasets",
            phase = "Declared",
            export_bucket = %self.export_bucket.name(),
            datasets = datasets.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tags;
    use std::fs;
    use tempfile::TempDir;

    fn tagger() -> Tagger {
        Tagger::new("unit-tests", Tags::new())
    }

    fn export_bucket() -> Bucket {
        Bucket::new(BucketName::new("test-export-bucket").unwrap(), &tagger())
    }

    fn descriptor(name: &str, target: &str, keep_files: bool, users: &[&str]) -> PushDescriptor {
        PushDescriptor {
            name: DatasetName::new(name).unwrap(),
            target_bucket: target.to_string(),
            keep_files,
            users: users.iter().map(|u| UserName::new(*u).unwrap()).collect(),
        }
    }

    fn dataset(descriptor: PushDescriptor) -> Result<PushExportDataset, ExportError> {
        PushExportDataset::new(
            descriptor,
            &export_bucket(),
            &tagger(),
            &FunctionSettings::default(),
        )
    }

    fn write_configs(dir: &TempDir, configs: &[(&str, &str)]) -> Vec<PathBuf> {
        configs
            .iter()
            .map(|(file, body)| {
                let path = dir.path().join(file);
                fs::write(&path, body).unwrap();
                path
            })
            .collect()
    }

    fn datasets(paths: Vec<PathBuf>) -> PushExportDatasets {
        PushExportDatasets::new(paths, &export_bucket(), &tagger(), &FunctionSettings::default())
    }

    const FIRST: &str = "name: test_dataset\ntarget_bucket: test-bucket\nkeep_files: false\nusers:\n  - alpha_user_test_person\n";
    const SECOND: &str = "name: test_dataset_2\ntarget_bucket: test-bucket-2\nkeep_files: true\nusers:\n  - alpha_user_test_person\n  - alpha_user_other_person\n";

    #[test]
    fn test_empty_target_bucket_fails_at_construction() {
        for target in ["", "   "] {
            let result = dataset(descriptor("test_dataset", target, false, &["alpha_user"]));
            assert_eq!(
                result.unwrap_err(),
                ExportError::EmptyTargetBucket("test_dataset".to_string())
            );
        }
    }

    #[test]
    fn test_build_transfer_function_is_idempotent() {
        let mut dataset =
            dataset(descriptor("test_dataset", "test-bucket", false, &["alpha_user_test_person"]))
                .unwrap();
        assert!(dataset.transfer_function().is_none());

        let first = dataset.build_transfer_function().unwrap().clone();
        let second = dataset.build_transfer_function().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.name(), "export_test_dataset-move");

        let mut stack = Stack::new("test");
        dataset.transfer_function().unwrap().declare(&mut stack).unwrap();
        assert_eq!(stack.len(), 5);
    }

    #[test]
    fn test_keep_files_selects_copy() {
        let mut dataset =
            dataset(descriptor("test_dataset_2", "test-bucket-2", true, &["alpha_user"])).unwrap();
        let function = dataset.build_transfer_function().unwrap();
        assert_eq!(function.semantics(), TransferSemantics::Copy);
        assert_eq!(function.name(), "export_test_dataset_2-copy");
    }

    #[test]
    fn test_build_before_load_fails() {
        let mut push = datasets(Vec::new());
        assert!(matches!(
            push.build_role_policies(),
            Err(ExportError::UsersNotLoaded(_))
        ));
        assert!(matches!(
            push.build_transfer_functions(),
            Err(ExportError::DatasetsNotLoaded(_))
        ));
        assert!(matches!(
            push.declare(&mut Stack::new("test")),
            Err(ExportError::DatasetsNotLoaded(_))
        ));
    }

    #[test]
    fn test_duplicate_dataset_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_configs(&dir, &[("a.yaml", FIRST), ("b.yaml", FIRST)]);
        let mut push = datasets(paths);

        assert_eq!(
            push.load_datasets_and_users(),
            Err(ExportError::DuplicateDataset("test_dataset".to_string()))
        );
        assert!(push.datasets().is_err());
    }

    #[test]
    fn test_one_write_grant_per_distinct_user() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_configs(&dir, &[("a.yaml", FIRST), ("b.yaml", SECOND)]);
        let mut push = datasets(paths);
        push.load_datasets_and_users().unwrap();

        let grants = push.build_role_policies().unwrap();
        assert_eq!(grants.len(), 2);

        let shared = grants
            .iter()
            .find(|g| g.user().as_str() == "alpha_user_test_person")
            .unwrap();
        let prefixes: Vec<&str> = shared.prefixes().iter().map(|p| p.as_str()).collect();
        assert_eq!(prefixes, vec!["test_dataset", "test_dataset_2"]);
        assert_eq!(
            shared.policy().statements()[0].resource,
            vec![
                "arn:aws:s3:::test-export-bucket/test_dataset/*",
                "arn:aws:s3:::test-export-bucket/test_dataset_2/*",
            ]
        );

        let declaration = shared.declaration().unwrap();
        let ResourceKind::RolePolicy(args) = &declaration.kind else {
            panic!("Expected a role policy");
        };
        assert_eq!(args.name, "hub-exports");
        assert_eq!(args.role, "alpha_user_test_person");
    }

    #[test]
    fn test_user_listed_twice_in_one_dataset_gets_prefix_once() {
        let dir = tempfile::tempdir().unwrap();
        let body = "name: test_dataset\ntarget_bucket: test-bucket\nkeep_files: false\nusers:\n  - alpha_user\n  - alpha_user\n";
        let mut push = datasets(write_configs(&dir, &[("a.yaml", body)]));
        push.load_datasets_and_users().unwrap();

        let users = push.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users.values().next().unwrap().len(), 1);
    }

    #[test]
    fn test_combined_notification_has_one_trigger_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_configs(&dir, &[("a.yaml", FIRST), ("b.yaml", SECOND)]);
        let mut push = datasets(paths);
        push.load_datasets_and_users().unwrap();
        assert!(push.make_combined_notification().unwrap().is_none());

        let built = push.build_transfer_functions().unwrap();
        assert_eq!(built.len(), 2);
        // A second build is a no-op.
        assert_eq!(push.build_transfer_functions().unwrap().len(), 2);

        let notification = push.make_combined_notification().unwrap().unwrap();
        let ResourceKind::BucketNotification(args) = &notification.kind else {
            panic!("Expected a bucket notification");
        };
        assert_eq!(args.bucket, "${test-export-bucket.id}");
        assert_eq!(args.lambda_functions.len(), 2);
        assert_eq!(args.lambda_functions[0].filter_prefix, "test_dataset/");
        assert_eq!(args.lambda_functions[1].filter_prefix, "test_dataset_2/");
        assert_eq!(
            args.lambda_functions[1].lambda_function_arn,
            "${export_test_dataset_2-copy.arn}"
        );
        assert!(args
            .lambda_functions
            .iter()
            .all(|t| t.events == vec!["s3:ObjectCreated:*".to_string()]));
        assert_eq!(
            notification.options.depends_on,
            vec![
                "${export_test_dataset-move-permission}",
                "${export_test_dataset_2-copy-permission}",
            ]
        );
    }

    #[test]
    fn test_declare_into_stack() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_configs(&dir, &[("a.yaml", FIRST), ("b.yaml", SECOND)]);
        let mut push = datasets(paths);
        push.load_datasets_and_users().unwrap();
        push.build_transfer_functions().unwrap();

        let mut stack = Stack::new("test");
        push.declare(&mut stack).unwrap();

        assert_eq!(stack.of_type("aws:lambda:Function").count(), 2);
        assert_eq!(stack.of_type("aws:s3:BucketNotification").count(), 1);
        assert_eq!(stack.of_type("aws:iam:RolePolicy").count(), 2 + 2);
        assert_eq!(
            stack.outputs()["test_dataset_export_role_arn"],
            "${export_test_dataset-move-role.arn}"
        );

        // The export bucket carries one notification only.
        assert!(matches!(
            push.declare(&mut stack),
            Err(ExportError::ResourceConflict(_))
        ));
        let notification = push.make_combined_notification().unwrap().unwrap();
        let mut renamed = notification.clone();
        renamed.name = "another-notification".to_string();
        assert!(matches!(
            stack.declare(renamed),
            Err(ExportError::NotificationAlreadyDeclared(_))
        ));
    }
}
