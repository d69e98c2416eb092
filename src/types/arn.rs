//! Fully qualified S3 bucket ARNs.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use super::name::{BucketName, DatasetName};

/// `arn:aws:s3:::{bucket}`.
///
/// Every policy resource in this crate is produced through this type, which
/// keeps bare bucket names out of policy documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketArn(String);

impl BucketArn {
    pub fn new(bucket: &BucketName) -> Self {
        BucketArn(format!("arn:aws:s3:::{bucket}"))
    }

    /// The bucket itself, e.g. for `s3:ListBucket`.
    pub fn bucket(&self) -> String {
        self.0.clone()
    }

    /// Every object in the bucket: `ARN/*`.
    pub fn objects(&self) -> String {
        format!("{}/*", self.0)
    }

    /// Every object under a dataset prefix: `ARN/{prefix}/*`.
    pub fn prefix_objects(&self, prefix: &DatasetName) -> String {
        format!("{}/{}/*", self.0, prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&BucketName> for BucketArn {
    fn from(bucket: &BucketName) -> Self {
        BucketArn::new(bucket)
    }
}

impl Display for BucketArn {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_arn_resources() {
        let arn = BucketArn::new(&BucketName::new("test-export-bucket").unwrap());
        let prefix = DatasetName::new("test_dataset").unwrap();

        assert_eq!(arn.bucket(), "arn:aws:s3:::test-export-bucket");
        assert_eq!(arn.objects(), "arn:aws:s3:::test-export-bucket/*");
        assert_eq!(
            arn.prefix_objects(&prefix),
            "arn:aws:s3:::test-export-bucket/test_dataset/*"
        );
    }
}
