//! terraform plan JSON reader
//!
//! Reads the `resource_changes` of `terraform show -json` output into typed
//! [ResourceChange]s. Only managed `google_` resources are kept, reads are ignored and
//! no-ops are only kept on request.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const GOOGLE_PREFIX: &str = "google_";
const BETA_PROVIDER_SUFFIX: &str = "google-beta";

/// One entry of a change's `actions` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    NoOp,
    Create,
    Read,
    Update,
    Delete,
    /// anything newer, e.g. `forget`
    #[serde(other)]
    Unknown,
}

/// Classified `actions` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    /// delete and create in either order
    Replace,
    NoOp,
    Read,
}

impl ChangeKind {
    fn classify(actions: &[Action]) -> Option<Self> {
        use Action::*;
        let kind = match actions {
            [Create] => ChangeKind::Create,
            [Update] => ChangeKind::Update,
            [Delete] => ChangeKind::Delete,
            [Delete, Create] | [Create, Delete] => ChangeKind::Replace,
            [NoOp] => ChangeKind::NoOp,
            [Read] => ChangeKind::Read,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    /// full address, unique within one plan (`module.a.google_x.y[0]`)
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_address: Option<String>,
    pub resource_type: String,
    pub name: String,
    pub provider_name: String,
    pub kind: ChangeKind,
    pub before: Map<String, Value>,
    pub after: Map<String, Value>,
    pub after_unknown: Map<String, Value>,
}

impl ResourceChange {
    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }

    /// State describing the resource: before-state for deletes, after-state otherwise
    pub fn state(&self) -> &Map<String, Value> {
        if self.is_delete() {
            &self.before
        } else {
            &self.after
        }
    }

    /// Top-level field whose value is only known after apply
    pub fn is_unknown(&self, field: &str) -> bool {
        !self.is_delete() && self.after_unknown.get(field) == Some(&Value::Bool(true))
    }

    pub fn is_beta(&self) -> bool {
        self.provider_name.ends_with(BETA_PROVIDER_SUFFIX)
    }

    /// Address without module path and instance key (`google_x.y`)
    pub fn config_address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Module call names leading to this resource, outermost first
    pub fn module_path(&self) -> Vec<String> {
        self.module_address
            .as_deref()
            .map(module_names)
            .unwrap_or_default()
    }

    /// Address prefix shared by everything declared in this resource's module
    pub fn module_prefix(&self) -> String {
        self.module_path()
            .iter()
            .map(|name| format!("module.{name}."))
            .collect()
    }

    /// Like [Self::module_prefix] but keeping instance keys (`module.a[0].`), so
    /// references from two instances of one module stay apart
    pub fn instance_prefix(&self) -> String {
        self.module_address
            .as_deref()
            .map(|module| format!("{module}."))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub convert_unchanged: bool,
}

/// Changes read from one plan, plus its `configuration` tree
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changes: Vec<ResourceChange>,
    pub configuration: Option<Value>,
}

impl ChangeSet {
    pub fn from_path(path: &Path, options: ReadOptions) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, options)
    }

    pub fn from_json(content: &str, options: ReadOptions) -> Result<Self, PlanError> {
        let document: PlanDocument = serde_json::from_str(content)?;
        let mut changes = Vec::new();

        for raw in document.resource_changes {
            if raw.mode != "managed" {
                continue;
            }
            if !raw.resource_type.starts_with(GOOGLE_PREFIX) {
                tracing::trace!(address = %raw.address, "ignoring non-google resource");
                continue;
            }

            let Some(kind) = ChangeKind::classify(&raw.change.actions) else {
                tracing::warn!(address = %raw.address, actions = ?raw.change.actions, "unsupported actions, skipping");
                continue;
            };

            match kind {
                ChangeKind::Read => continue,
                ChangeKind::NoOp if !options.convert_unchanged => continue,
                _ => {}
            }

            let change = ResourceChange {
                address: raw.address,
                module_address: raw.module_address.filter(|m| !m.is_empty()),
                resource_type: raw.resource_type,
                name: raw.name,
                provider_name: raw.provider_name,
                kind,
                before: into_object(raw.change.before),
                after: into_object(raw.change.after),
                after_unknown: into_object(raw.change.after_unknown),
            };

            if change.is_beta() {
                tracing::debug!(address = %change.address, "resource uses the beta provider");
            }

            changes.push(change);
        }

        Ok(Self {
            changes,
            configuration: document.configuration,
        })
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid plan JSON")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct PlanDocument {
    #[serde(default)]
    resource_changes: Vec<RawChange>,
    #[serde(default)]
    configuration: Option<Value>,
}

#[derive(Deserialize)]
struct RawChange {
    address: String,
    #[serde(default)]
    module_address: Option<String>,
    #[serde(default = "managed")]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    provider_name: String,
    change: RawChangeBody,
}

#[derive(Deserialize)]
struct RawChangeBody {
    actions: Vec<Action>,
    #[serde(default)]
    before: Value,
    #[serde(default)]
    after: Value,
    #[serde(default)]
    after_unknown: Value,
}

fn managed() -> String {
    "managed".to_string()
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `module.a["x.y"].module.b[0]` -> `["a", "b"]`
fn module_names(module_address: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = module_address;

    while let Some(tail) = rest.strip_prefix("module.") {
        let end = tail.find(['.', '[']).unwrap_or(tail.len());
        names.push(tail[..end].to_string());
        let after_index = skip_index(&tail[end..]);
        rest = after_index.strip_prefix('.').unwrap_or(after_index);
    }

    names
}

/// Skips a leading `[...]` instance key, quoted keys may contain `]`
fn skip_index(value: &str) -> &str {
    if !value.starts_with('[') {
        return value;
    }

    let mut quoted = false;
    let mut escaped = false;
    for (index, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ']' if !quoted => return &value[index + 1..],
            _ => {}
        }
    }
    ""
}
