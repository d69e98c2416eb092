//! IAM policy documents as emitted into role and bucket policies.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::ExportError;

pub const POLICY_VERSION: &str = "2012-10-17";

/// The IAM actions this crate grants or denies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
pub enum Action {
    #[strum(serialize = "s3:GetObject")]
    GetObject,
    #[strum(serialize = "s3:GetObjectAcl")]
    GetObjectAcl,
    #[strum(serialize = "s3:GetObjectVersion")]
    GetObjectVersion,
    #[strum(serialize = "s3:GetObject*")]
    GetObjectAny,
    #[strum(serialize = "s3:DeleteObject")]
    DeleteObject,
    #[strum(serialize = "s3:DeleteObjectVersion")]
    DeleteObjectVersion,
    #[strum(serialize = "s3:DeleteObject*")]
    DeleteObjectAny,
    #[strum(serialize = "s3:PutObject")]
    PutObject,
    #[strum(serialize = "s3:PutObjectAcl")]
    PutObjectAcl,
    #[strum(serialize = "s3:PutObjectTagging")]
    PutObjectTagging,
    #[strum(serialize = "s3:PutObject*")]
    PutObjectAny,
    #[strum(serialize = "s3:RestoreObject")]
    RestoreObject,
    #[strum(serialize = "s3:ListBucket")]
    ListBucket,
    #[strum(serialize = "s3:*")]
    S3Any,
    #[strum(serialize = "sts:AssumeRole")]
    AssumeRole,
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a bucket policy statement applies to. Role policies carry no principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// Account or role ARNs, possibly from another account.
    Aws(Vec<String>),
    /// Service principals such as `lambda.amazonaws.com`.
    Service(Vec<String>),
    /// `"*"`
    Anyone,
}

impl Principal {
    pub fn identifiers(&self) -> &[String] {
        match self {
            Principal::Aws(ids) | Principal::Service(ids) => ids,
            Principal::Anyone => &[],
        }
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        match self {
            Principal::Anyone => ser.serialize_str("*"),
            Principal::Aws(ids) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("AWS", ids)?;
                map.end()
            }
            Principal::Service(ids) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("Service", ids)?;
                map.end()
            }
        }
    }
}

/// Condition operator -> condition key -> value, e.g.
/// `{"NumericLessThan": {"s3:TlsVersion": "1.2"}}`.
pub type Condition = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Statement {
    pub fn allow(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::with_effect(Effect::Allow, actions)
    }

    pub fn deny(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::with_effect(Effect::Deny, actions)
    }

    fn with_effect(effect: Effect, actions: impl IntoIterator<Item = Action>) -> Self {
        Statement {
            sid: None,
            effect,
            principal: None,
            action: actions.into_iter().collect(),
            resource: Vec::new(),
            condition: None,
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn on(mut self, resources: impl IntoIterator<Item = String>) -> Self {
        self.resource.extend(resources);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.condition
            .get_or_insert_with(BTreeMap::new)
            .entry(operator.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

/// `{"Version": "2012-10-17", "Statement": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        PolicyDocument {
            version: POLICY_VERSION,
            statement: statements,
        }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statement
    }

    /// Append statements, e.g. a bucket-wide deny on top of a grant.
    pub fn extend(mut self, statements: impl IntoIterator<Item = Statement>) -> Self {
        self.statement.extend(statements);
        self
    }

    /// Every action any statement allows, in first-seen order.
    pub fn allowed_actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = Vec::new();
        for statement in self.statement.iter().filter(|s| s.effect == Effect::Allow) {
            for action in &statement.action {
                if !actions.contains(action) {
                    actions.push(*action);
                }
            }
        }
        actions
    }

    /// Compact JSON, as stored in a role or bucket policy property.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_action_strings_round_trip() {
        for action in Action::iter() {
            assert_eq!(Action::from_str(action.as_ref()).unwrap(), action);
        }
    }

    #[test]
    fn test_statement_serialization_skips_empty_fields() {
        let statement = Statement::allow([Action::ListBucket]).on(["arn:aws:s3:::b".to_string()]);
        let value = serde_json::to_value(&statement).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Effect": "Allow",
                "Action": ["s3:ListBucket"],
                "Resource": ["arn:aws:s3:::b"],
            })
        );
    }

    #[test]
    fn test_principal_forms() {
        assert_eq!(
            serde_json::to_value(Principal::Anyone).unwrap(),
            serde_json::json!("*")
        );
        assert_eq!(
            serde_json::to_value(Principal::Aws(vec![])).unwrap(),
            serde_json::json!({"AWS": []})
        );
        assert_eq!(
            serde_json::to_value(Principal::Service(vec!["lambda.amazonaws.com".into()])).unwrap(),
            serde_json::json!({"Service": ["lambda.amazonaws.com"]})
        );
    }

    #[test]
    fn test_condition_accumulates() {
        let statement = Statement::deny([Action::S3Any])
            .condition("NumericLessThan", "s3:TlsVersion", "1.2")
            .condition("Bool", "aws:SecureTransport", "false");
        let condition = statement.condition.unwrap();
        assert_eq!(condition.len(), 2);
        assert_eq!(condition["NumericLessThan"]["s3:TlsVersion"], "1.2");
    }

    #[test]
    fn test_document_json_is_stable() {
        let doc = PolicyDocument::new(vec![
            Statement::allow([Action::GetObject]).on(["arn:aws:s3:::b/*".to_string()]),
        ]);
        let first = doc.to_json().unwrap();
        let second = doc.clone().to_json().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["s3:GetObject"],"Resource":["arn:aws:s3:::b/*"]}]}"#
        );
    }
}
