//! declared field expressions
//!
//! Values unknown until apply are identified by the expression that produces them. The
//! [ExpressionIndex] maps `module-qualified resource address -> field -> expression` and
//! is filled from either
//! - the plan's own `configuration` tree (`constant_value` / `references`)
//! - or the `.tf` sources of the root module, with references found by walking every
//!   traversal of an attribute's expression
use crate::plan::ResourceChange;
use crate::visit::VisitTraversals;
use hcl::{Expression, Traversal, TraversalOperator};
use hcl_edit::structure::{Body, Structure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Roots whose references never name another resource
const NON_RESOURCE_ROOTS: &[&str] = &["var", "local", "each", "count", "path", "self", "terraform"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldExpression {
    #[serde(
        default,
        rename = "constant_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub constant: Option<Value>,
    /// most specific first, as terraform lists them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl FieldExpression {
    pub fn is_empty(&self) -> bool {
        self.constant.is_none() && self.references.is_empty()
    }

    fn from_hcl(expr: &Expression) -> Self {
        let constant = match expr {
            Expression::Null => None,
            Expression::Bool(value) => Some(Value::Bool(*value)),
            Expression::String(value) => Some(Value::String(value.clone())),
            Expression::Number(value) => serde_json::to_value(value).ok(),
            _ => None,
        };

        let mut references = Vec::new();
        expr.visit_traversals(&mut |traversal: &Traversal| {
            for reference in traversal_references(traversal) {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        });

        Self {
            constant,
            references,
        }
    }
}

/// `google_x.y.attr` plus the resource it belongs to
fn traversal_references(traversal: &Traversal) -> Vec<String> {
    let Expression::Variable(root) = &traversal.expr else {
        return Vec::new();
    };

    let mut parts = vec![root.as_str().to_string()];
    for operator in &traversal.operators {
        match operator {
            TraversalOperator::GetAttr(attr) => parts.push(attr.to_string()),
            _ => break,
        }
    }

    let owner_len = match parts[0].as_str() {
        "data" => 3,
        root if NON_RESOURCE_ROOTS.contains(&root) => parts.len(),
        _ => 2,
    };

    let mut references = vec![parts.join(".")];
    if parts.len() > owner_len {
        references.push(parts[..owner_len].join("."));
    }
    references
}

#[derive(Debug, Default)]
pub struct ExpressionIndex {
    resources: HashMap<String, BTreeMap<String, FieldExpression>>,
}

impl ExpressionIndex {
    /// Reads the `configuration` tree of a plan, including child modules
    pub fn from_configuration(configuration: &Value) -> Result<Self, LoadError> {
        let configuration = PlanConfiguration::deserialize(configuration)?;
        let mut index = Self::default();
        index.insert_module("", configuration.root_module);
        Ok(index)
    }

    fn insert_module(&mut self, prefix: &str, module: ConfigModule) {
        for resource in module.resources {
            if resource.mode != "managed" {
                continue;
            }
            let address = format!("{prefix}{}", resource.address);
            for (field, expression) in resource.expressions {
                // nested blocks are lists of objects, only plain fields are indexed
                if !expression.is_object() {
                    continue;
                }
                let Ok(expression) = FieldExpression::deserialize(&expression) else {
                    continue;
                };
                if !expression.is_empty() {
                    self.insert(&address, field, expression);
                }
            }
        }

        for (name, call) in module.module_calls {
            self.insert_module(&format!("{prefix}module.{name}."), call.module);
        }
    }

    /// Indexes the `resource` blocks of one root-module document
    pub fn insert_hcl(&mut self, body: &Body) {
        for structure in body.iter() {
            let Structure::Block(block) = structure else {
                continue;
            };
            if block.ident.value().as_str() != "resource" {
                continue;
            }
            let [resource_type, name] = block.labels.as_slice() else {
                continue;
            };
            let address = format!("{}.{}", resource_type.as_str(), name.as_str());

            for structure in block.body.iter() {
                let Structure::Attribute(attribute) = structure else {
                    continue;
                };
                let expr: Expression = attribute.value.clone().into();
                let expression = FieldExpression::from_hcl(&expr);
                if !expression.is_empty() {
                    let field = attribute.key.value().as_str().to_string();
                    self.insert(&address, field, expression);
                }
            }
        }
    }

    /// Loads every `*.tf` file of `dir_path` (not recursive)
    pub fn load_directory(dir_path: &Path) -> Result<Self, LoadError> {
        let mut index = Self::default();
        let mut any_files_loaded = false;

        let mut paths = Vec::new();
        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let path = dir_entry.path();
            if path.extension().is_some_and(|extension| extension == "tf") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            tracing::info!(path=%path.display(), "loading file");
            let content = std::fs::read_to_string(&path)?;
            let body = hcl_edit::parser::parse_body(&content).map_err(|source| {
                LoadError::HclParseFailed {
                    path: path.clone(),
                    source,
                }
            })?;
            index.insert_hcl(&body);
            any_files_loaded = true;
        }

        if !any_files_loaded {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        Ok(index)
    }

    pub fn insert(&mut self, address: &str, field: String, expression: FieldExpression) {
        self.resources
            .entry(address.to_string())
            .or_default()
            .insert(field, expression);
    }

    /// Expression of `field` as declared for `change`
    pub fn get(&self, change: &ResourceChange, field: &str) -> Option<&FieldExpression> {
        let address = format!("{}{}", change.module_prefix(), change.config_address());
        self.resources.get(&address)?.get(field)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("no .tf files found in {0}")]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("unable to parse hcl file {path}")]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
    #[error("unexpected plan configuration format")]
    Configuration(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct PlanConfiguration {
    #[serde(default)]
    root_module: ConfigModule,
}

#[derive(Deserialize, Default)]
struct ConfigModule {
    #[serde(default)]
    resources: Vec<ConfigResource>,
    #[serde(default)]
    module_calls: BTreeMap<String, ModuleCall>,
}

#[derive(Deserialize)]
struct ModuleCall {
    #[serde(default)]
    module: ConfigModule,
}

#[derive(Deserialize)]
struct ConfigResource {
    address: String,
    #[serde(default = "managed")]
    mode: String,
    #[serde(default)]
    expressions: serde_json::Map<String, Value>,
}

fn managed() -> String {
    "managed".to_string()
}
