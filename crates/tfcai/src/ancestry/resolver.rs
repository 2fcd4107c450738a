use super::registry::{ContainerFields, ResourceDescriptor, Strategy};
use super::{AncestryCache, AncestryError};
use crate::directory::DirectoryAdapter;
use crate::locator::{AncestorChain, Locator, LocatorError, LocatorKind};
use serde_json::{Map, Value};

/// Upper bound on per-node lookups in one walk
pub const MAX_WALK_DEPTH: usize = 32;

/// Prefix of the rendered immediate parent
pub const CONTAINER_PARENT_PREFIX: &str = "//cloudresourcemanager.googleapis.com/";

/// Resolved placement of one resource
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Ancestry {
    pub chain: AncestorChain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Ancestry {
    fn new(chain: AncestorChain, parent: Option<&Locator>) -> Self {
        let parent = parent.map(|locator| format!("{CONTAINER_PARENT_PREFIX}{locator}"));
        Self { chain, parent }
    }

    fn unknown_organization() -> Self {
        let chain = AncestorChain::unknown_organization();
        let parent = chain.first().cloned();
        Self::new(chain, parent.as_ref())
    }
}

pub struct AncestryResolver {
    cache: AncestryCache,
    directory: Option<DirectoryAdapter>,
    default_project: Option<String>,
}

impl AncestryResolver {
    /// Without a directory every cache miss fails with [AncestryError::Offline]
    pub fn new(cache: AncestryCache, directory: Option<DirectoryAdapter>) -> Self {
        Self {
            cache,
            directory,
            default_project: None,
        }
    }

    /// Project assumed for resources that do not name one
    pub fn with_default_project(mut self, project: Option<String>) -> Self {
        self.default_project = project.filter(|project| !project.is_empty());
        self
    }

    pub fn cache(&self) -> &AncestryCache {
        &self.cache
    }

    /// Chain of `locator`, nearest first
    ///
    /// Organizations resolve to themselves, projects use the single-call lookup and
    /// anything else is walked one parent at a time until a cached locator or an
    /// organization is reached.
    #[tracing::instrument(level = "debug", skip(self), fields(locator = %locator))]
    pub fn resolve(&self, locator: &Locator) -> Result<AncestorChain, AncestryError> {
        if let Some(chain) = self.cache.get(locator) {
            return Ok(chain);
        }

        if locator.is_organization() {
            let chain = AncestorChain::new(vec![locator.clone()]);
            self.cache.store(locator, &chain);
            return Ok(chain);
        }

        let directory = self.directory.as_ref().ok_or_else(|| AncestryError::Offline {
            locator: locator.to_string(),
        })?;

        if locator.kind().supports_single_call() {
            let chain = directory.project_ancestry(locator)?;
            self.cache.store(locator, &chain);
            return Ok(chain);
        }

        self.walk(directory, locator)
    }

    fn walk(
        &self,
        directory: &DirectoryAdapter,
        locator: &Locator,
    ) -> Result<AncestorChain, AncestryError> {
        let mut visited = Vec::new();
        let mut current = locator.clone();

        let tail = loop {
            if let Some(cached) = self.cache.get(&current) {
                break cached;
            }
            if current.is_organization() {
                break AncestorChain::new(vec![current]);
            }
            if visited.len() >= MAX_WALK_DEPTH {
                return Err(AncestryError::Resolution {
                    locator: locator.to_string(),
                    reason: format!("no organization reached within {MAX_WALK_DEPTH} lookups"),
                });
            }

            let container = directory.container(&current)?;
            let Some(parent) = container.parent else {
                return Err(AncestryError::Resolution {
                    locator: locator.to_string(),
                    reason: format!("{current} has no parent"),
                });
            };
            visited.push(current);
            current = parent;
        };

        let mut chain = AncestorChain::new(visited);
        chain.extend(&tail);
        self.cache.store(locator, &chain);
        Ok(chain)
    }

    /// Placement of a planned resource described by `descriptor`
    ///
    /// `state` is the resource's after-state (before-state for deletes).
    #[tracing::instrument(level = "debug", skip(self, state, descriptor))]
    pub fn ancestors(
        &self,
        address: &str,
        state: &Map<String, Value>,
        descriptor: &ResourceDescriptor,
    ) -> Result<Ancestry, AncestryError> {
        let refs = ContainerRefs::read(
            state,
            &descriptor.containers,
            self.default_project.as_deref(),
        )?;

        match descriptor.strategy {
            Strategy::Organization => {
                let organization = refs.organization.ok_or_else(|| {
                    AncestryError::MissingOrganization {
                        address: address.to_string(),
                    }
                })?;
                Ok(Ancestry::new(self.resolve(&organization)?, None))
            }
            Strategy::Folder => {
                let Some(key) = refs.folder.or(refs.organization) else {
                    return Ok(Ancestry::unknown_organization());
                };
                let chain = self.resolve(&key)?;
                let parent = chain.locators().get(1).or(chain.first()).cloned();
                Ok(Ancestry::new(chain, parent.as_ref()))
            }
            Strategy::Project => self.project_ancestors(address, refs),
            Strategy::CustomRole => {
                let Some(key) = refs.organization.or(refs.project) else {
                    return Ok(Ancestry::unknown_organization());
                };
                self.nearest(&key)
            }
            Strategy::ProjectOnly => match refs.project {
                Some(project) => self.nearest(&project),
                None => Ok(Ancestry::unknown_organization()),
            },
            Strategy::Generic => {
                let Some(key) = refs.organization.or(refs.folder).or(refs.project) else {
                    return Ok(Ancestry::unknown_organization());
                };
                self.nearest(&key)
            }
        }
    }

    /// Chain of `key`, with `key` itself as the immediate parent
    fn nearest(&self, key: &Locator) -> Result<Ancestry, AncestryError> {
        let chain = self.resolve(key)?;
        let parent = chain.first().cloned();
        Ok(Ancestry::new(chain, parent.as_ref()))
    }

    fn project_ancestors(
        &self,
        address: &str,
        refs: ContainerRefs,
    ) -> Result<Ancestry, AncestryError> {
        let chain = match (refs.organization, refs.folder, refs.project) {
            (Some(_), Some(_), _) => {
                return Err(AncestryError::ConflictingParents {
                    address: address.to_string(),
                })
            }
            (Some(organization), None, project) => {
                let mut chain = AncestorChain::new(project.into_iter().collect());
                chain.push(organization);
                chain
            }
            (None, Some(folder), project) => {
                let mut chain = AncestorChain::new(Vec::new());
                if let Some(project) = project {
                    // warm the cache for other resources in this project, the folder
                    // reference wins for this one
                    if let Err(err) = self.resolve(&project) {
                        tracing::debug!(locator = %project, %err, "project ancestry not available");
                    }
                    chain.push(project);
                }
                chain.extend(&self.resolve(&folder)?);
                chain
            }
            (None, None, Some(project)) => self.resolve(&project)?,
            (None, None, None) => return Ok(Ancestry::unknown_organization()),
        };

        let parent = chain
            .locators()
            .iter()
            .find(|locator| locator.kind() != LocatorKind::Project)
            .cloned();
        Ok(Ancestry::new(chain, parent.as_ref()))
    }
}

/// Container references found in a resource's state
#[derive(Debug, Default)]
struct ContainerRefs {
    organization: Option<Locator>,
    folder: Option<Locator>,
    project: Option<Locator>,
}

impl ContainerRefs {
    fn read(
        state: &Map<String, Value>,
        fields: &ContainerFields,
        default_project: Option<&str>,
    ) -> Result<Self, LocatorError> {
        let mut refs = Self {
            organization: first_field(state, fields.organization, LocatorKind::Organization)?,
            folder: first_field(state, fields.folder, LocatorKind::Folder)?,
            project: first_field(state, fields.project, LocatorKind::Project)?,
        };

        for field in fields.routed {
            let Some(value) = field_value(state, field) else {
                continue;
            };
            let locator: Locator = value.parse()?;
            let slot = match locator.kind() {
                LocatorKind::Organization => &mut refs.organization,
                LocatorKind::Folder => &mut refs.folder,
                LocatorKind::Project => &mut refs.project,
            };
            slot.get_or_insert(locator);
        }

        if refs.project.is_none() && !fields.project.is_empty() {
            if let Some(project) = default_project {
                refs.project = Some(Locator::with_prefix(LocatorKind::Project, project)?);
            }
        }

        Ok(refs)
    }
}

fn first_field(
    state: &Map<String, Value>,
    fields: &[&str],
    kind: LocatorKind,
) -> Result<Option<Locator>, LocatorError> {
    fields
        .iter()
        .find_map(|field| field_value(state, field))
        .map(|value| Locator::with_prefix(kind, &value))
        .transpose()
}

/// Non-empty string (or number) value of `field`
fn field_value(state: &Map<String, Value>, field: &str) -> Option<String> {
    match state.get(field)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
