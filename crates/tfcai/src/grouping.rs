//! identity grouping of policy-binding changes
//!
//! Several `*_iam_member` / `*_iam_binding` / `*_iam_policy` declarations can target the
//! same object. Each change gets an [IdentityKey] built from its identity-bearing fields:
//!
//! - field names come from the after-state and the fields unknown until apply
//! - the [IDENTITY_DENYLIST] (grant payload, etag, ...) is removed
//! - names are sorted, each field appends `name/value/`, with `/` and `%` in the value
//!   percent-encoded so a value never reads as further pairs
//! - unknown fields append `name/${reference}/`, the reference taken from the field's
//!   declared expression, qualified with the module instance of the change
//!
//! Changes with equal keys land in one [ChangeBucket].
use crate::ancestry::registry::{Registry, ResourceDescriptor};
use crate::expression::ExpressionIndex;
use crate::plan::ResourceChange;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Fields that describe the grant rather than its target
pub const IDENTITY_DENYLIST: &[&str] = &[
    "id",
    "etag",
    "policy_data",
    "role",
    "member",
    "members",
    "condition",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Changes sharing one identity key, ordered by address
#[derive(Debug, Clone)]
pub struct ChangeBucket<'a> {
    pub key: IdentityKey,
    pub descriptor: &'a ResourceDescriptor,
    pub changes: Vec<&'a ResourceChange>,
}

impl ChangeBucket<'_> {
    pub fn addresses(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.address.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct Grouping<'a> {
    pub buckets: BTreeMap<IdentityKey, ChangeBucket<'a>>,
    /// changes that could not be keyed, ordered by address
    pub failures: Vec<(String, GroupingError)>,
}

impl Grouping<'_> {
    /// `key -> addresses`, for reporting
    pub fn addresses(&self) -> BTreeMap<String, Vec<String>> {
        self.buckets
            .iter()
            .map(|(key, bucket)| (key.to_string(), bucket.addresses()))
            .collect()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GroupingError {
    #[error("{address}: cannot identify the target of {field}, its value depends on {}", references.join(", "))]
    AmbiguousIdentity {
        address: String,
        field: String,
        references: Vec<String>,
    },
}

pub struct GroupingResolver<'r> {
    registry: &'r Registry,
    expressions: &'r ExpressionIndex,
}

impl<'r> GroupingResolver<'r> {
    pub fn new(registry: &'r Registry, expressions: &'r ExpressionIndex) -> Self {
        Self {
            registry,
            expressions,
        }
    }

    /// Buckets the policy-binding changes of `changes`, everything else is ignored
    pub fn group<'a>(&self, changes: impl IntoIterator<Item = &'a ResourceChange>) -> Grouping<'a>
    where
        'r: 'a,
    {
        let mut grouping = Grouping::default();

        for change in changes {
            let Some(descriptor) = self
                .registry
                .get(&change.resource_type)
                .filter(|descriptor| descriptor.is_binding())
            else {
                continue;
            };

            match self.identity_key(change, descriptor.family) {
                Ok(key) => {
                    tracing::trace!(address = %change.address, %key, "identity key");
                    grouping
                        .buckets
                        .entry(key.clone())
                        .or_insert_with(|| ChangeBucket {
                            key,
                            descriptor,
                            changes: Vec::new(),
                        })
                        .changes
                        .push(change);
                }
                Err(err) => grouping.failures.push((change.address.clone(), err)),
            }
        }

        for bucket in grouping.buckets.values_mut() {
            bucket.changes.sort_by(|a, b| a.address.cmp(&b.address));
        }
        grouping.failures.sort_by(|a, b| a.0.cmp(&b.0));

        grouping
    }

    pub fn identity_key(
        &self,
        change: &ResourceChange,
        family: &str,
    ) -> Result<IdentityKey, GroupingError> {
        let state = change.state();
        let fields: BTreeSet<&str> = state
            .keys()
            .chain(change.after_unknown.keys())
            .map(String::as_str)
            .filter(|field| !IDENTITY_DENYLIST.contains(field))
            .collect();

        let mut key = format!("{family}/");
        for field in fields {
            if change.is_unknown(field) {
                let symbol = self.symbol(change, field)?;
                push_pair(&mut key, field, &format!("${{{symbol}}}"));
                continue;
            }

            match state.get(field) {
                None | Some(Value::Null) => {}
                // strings raw, anything else as compact JSON
                Some(Value::String(value)) => push_pair(&mut key, field, value),
                Some(value) => push_pair(&mut key, field, &value.to_string()),
            }
        }

        Ok(IdentityKey(key))
    }

    /// Stable name for the value of an unknown field
    ///
    /// The single reference of the field's expression, qualified with the module instance
    /// the change is declared in.
    /// Without any reference the change's own address is used, so the change never merges.
    fn symbol(&self, change: &ResourceChange, field: &str) -> Result<String, GroupingError> {
        let references = self
            .expressions
            .get(change, field)
            .map(|expression| distinct_references(&expression.references))
            .unwrap_or_default();

        match references.as_slice() {
            [] => Ok(change.address.clone()),
            [reference] => Ok(format!("{}{reference}", change.instance_prefix())),
            _ => Err(GroupingError::AmbiguousIdentity {
                address: change.address.clone(),
                field: field.to_string(),
                references,
            }),
        }
    }
}

/// Most specific references, dropping any that prefix another (`a.b` of `a.b.c`)
fn distinct_references(references: &[String]) -> Vec<String> {
    let mut by_length: Vec<&String> = references.iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut kept: Vec<String> = Vec::new();
    for reference in by_length {
        if !kept.iter().any(|longer| is_reference_prefix(reference, longer)) {
            kept.push(reference.clone());
        }
    }
    kept.sort();
    kept
}

/// Appends `field/value/`, with `%` and `/` in the value percent-encoded
fn push_pair(key: &mut String, field: &str, value: &str) {
    key.push_str(field);
    key.push('/');
    for c in value.chars() {
        match c {
            '%' => key.push_str("%25"),
            '/' => key.push_str("%2F"),
            c => key.push(c),
        }
    }
    key.push('/');
}

fn is_reference_prefix(prefix: &str, reference: &str) -> bool {
    match reference.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with(['.', '[']),
        None => false,
    }
}
