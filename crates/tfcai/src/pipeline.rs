//! consolidation of a change set into ancestry-annotated assets
//!
//! 1. changes of unknown resource types are skipped
//! 2. policy-binding changes are bucketed by [GroupingResolver]
//! 3. every other change is its own unit, keyed by its asset type and name fields
//! 4. units are resolved in parallel, each failure stays with its unit
//!
//! Only an unreachable directory stops the run ([PipelineError::Aborted]).
use crate::ancestry::registry::{Registry, ResourceDescriptor};
use crate::ancestry::{Ancestry, AncestryError, AncestryResolver};
use crate::expression::ExpressionIndex;
use crate::grouping::{GroupingError, GroupingResolver};
use crate::plan::{ChangeSet, ResourceChange};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedAsset {
    pub key: String,
    pub asset_type: &'static str,
    pub family: &'static str,
    /// declarations contributing to this asset, ordered by address
    pub addresses: Vec<String>,
    #[serde(flatten)]
    pub ancestry: Ancestry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub addresses: Vec<String>,
    #[serde(serialize_with = "display")]
    pub error: ConversionError,
}

fn display<S: Serializer>(value: &impl std::fmt::Display, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Default, Serialize)]
pub struct Consolidation {
    /// ordered by key
    pub assets: Vec<ConsolidatedAsset>,
    pub failures: Vec<Failure>,
    /// addresses of changes with an unsupported resource type
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error(transparent)]
    Ancestry(#[from] AncestryError),
    #[error(transparent)]
    Grouping(#[from] GroupingError),
    #[error("{address}: duplicate asset {key}, already declared by {existing}")]
    DuplicateCanonicalKey {
        key: String,
        address: String,
        existing: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("conversion aborted")]
    Aborted(#[source] AncestryError),
}

/// Changes converted together
struct Unit<'a> {
    key: String,
    descriptor: &'a ResourceDescriptor,
    changes: Vec<&'a ResourceChange>,
}

impl Unit<'_> {
    fn addresses(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.address.clone()).collect()
    }
}

pub struct Pipeline {
    registry: Registry,
    resolver: AncestryResolver,
}

impl Pipeline {
    pub fn new(registry: Registry, resolver: AncestryResolver) -> Self {
        Self { registry, resolver }
    }

    pub fn resolver(&self) -> &AncestryResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[tracing::instrument(level = "debug", skip_all, fields(changes = changes.len()))]
    pub fn run(
        &self,
        changes: &ChangeSet,
        expressions: &ExpressionIndex,
    ) -> Result<Consolidation, PipelineError> {
        let mut consolidation = Consolidation::default();
        let mut units: BTreeMap<String, Unit> = BTreeMap::new();
        let mut singles = Vec::new();

        for change in &changes.changes {
            match self.registry.get(&change.resource_type) {
                None => {
                    tracing::warn!(address = %change.address, resource_type = %change.resource_type, "resource type not supported, skipping");
                    consolidation.skipped.push(change.address.clone());
                }
                Some(descriptor) if descriptor.is_binding() => {}
                Some(_) if change.is_delete() => {
                    tracing::debug!(address = %change.address, "deleted resource has no asset");
                }
                Some(descriptor) => singles.push((change, descriptor)),
            }
        }

        let grouping = GroupingResolver::new(&self.registry, expressions).group(&changes.changes);
        for (address, err) in grouping.failures {
            consolidation.failures.push(Failure {
                addresses: vec![address],
                error: err.into(),
            });
        }
        for (key, bucket) in grouping.buckets {
            units.insert(
                key.to_string(),
                Unit {
                    key: key.to_string(),
                    descriptor: bucket.descriptor,
                    changes: bucket.changes,
                },
            );
        }

        for (change, descriptor) in singles {
            let key = asset_key(change, descriptor);
            if let Some(existing) = units.get(&key) {
                tracing::warn!(address = %change.address, %key, "duplicate asset");
                consolidation.failures.push(Failure {
                    addresses: vec![change.address.clone()],
                    error: ConversionError::DuplicateCanonicalKey {
                        key,
                        address: change.address.clone(),
                        existing: existing.addresses().join(", "),
                    },
                });
                continue;
            }
            units.insert(
                key.clone(),
                Unit {
                    key,
                    descriptor,
                    changes: vec![change],
                },
            );
        }

        let resolved: Vec<(Unit, Result<Ancestry, AncestryError>)> = units
            .into_values()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|unit| {
                let result = self.resolve(&unit);
                (unit, result)
            })
            .collect();

        for (unit, result) in resolved {
            match result {
                Ok(ancestry) => consolidation.assets.push(ConsolidatedAsset {
                    addresses: unit.addresses(),
                    key: unit.key,
                    asset_type: unit.descriptor.asset_type,
                    family: unit.descriptor.family,
                    ancestry,
                }),
                Err(err) if err.is_fatal() => return Err(PipelineError::Aborted(err)),
                Err(err) => consolidation.failures.push(Failure {
                    addresses: unit.addresses(),
                    error: err.into(),
                }),
            }
        }

        tracing::info!(
            assets = consolidation.assets.len(),
            failures = consolidation.failures.len(),
            skipped = consolidation.skipped.len(),
            "consolidation finished"
        );
        Ok(consolidation)
    }

    /// Members of one unit share their container fields, the first one speaks for all
    fn resolve(&self, unit: &Unit) -> Result<Ancestry, AncestryError> {
        let Some(change) = unit.changes.first() else {
            return Err(AncestryError::Resolution {
                locator: unit.key.clone(),
                reason: "no changes to resolve".to_string(),
            });
        };
        self.resolver
            .ancestors(&change.address, change.state(), unit.descriptor)
    }
}

/// `<asset type>/<name field values>`, unknown names fall back to the address
fn asset_key(change: &ResourceChange, descriptor: &ResourceDescriptor) -> String {
    let state = change.state();
    let names: Vec<String> = descriptor
        .name_fields
        .iter()
        .map(|field| {
            if change.is_unknown(field) {
                return format!("${{{}}}", change.address);
            }
            match state.get(*field) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(value)) => value.clone(),
                Some(value) => value.to_string(),
            }
        })
        .collect();
    format!("{}/{}", descriptor.asset_type, names.join("/"))
}
