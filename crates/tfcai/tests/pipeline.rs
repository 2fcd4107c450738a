//! Conversion through the public API, against an in-memory resource manager

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tfcai::ancestry::registry::Registry;
use tfcai::ancestry::{AncestryCache, AncestryError, AncestryResolver};
use tfcai::directory::retry::RetryPolicy;
use tfcai::directory::{Container, DirectoryAdapter, DirectoryClient, DirectoryError};
use tfcai::expression::ExpressionIndex;
use tfcai::locator::{AncestorChain, Locator};
use tfcai::pipeline::{Pipeline, PipelineError};
use tfcai::plan::{ChangeSet, ReadOptions};

/// `folders/3 -> folders/2 -> organizations/1`, `projects/existing` in `folders/3`
#[derive(Default)]
struct Directory {
    unreachable: bool,
    container_calls: AtomicUsize,
    ancestry_calls: AtomicUsize,
}

impl Directory {
    fn parents() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("folders/3", "folders/2"),
            ("folders/2", "organizations/1"),
            ("folders/9", "organizations/1"),
        ])
    }
}

impl DirectoryClient for Directory {
    fn project_ancestry(&self, project: &Locator) -> Result<AncestorChain, DirectoryError> {
        self.ancestry_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(DirectoryError::Unreachable("connection refused".to_string()));
        }
        match project.to_string().as_str() {
            "projects/existing" => Ok(AncestorChain::new(vec![
                project.clone(),
                "folders/3".parse().unwrap(),
                "folders/2".parse().unwrap(),
                "organizations/1".parse().unwrap(),
            ])),
            "projects/locked" => Err(DirectoryError::PermissionDenied),
            _ => Err(DirectoryError::NotFound),
        }
    }

    fn container(&self, locator: &Locator) -> Result<Container, DirectoryError> {
        self.container_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(DirectoryError::Unreachable("connection refused".to_string()));
        }
        let parent: Locator = Self::parents()
            .get(locator.to_string().as_str())
            .ok_or(DirectoryError::NotFound)?
            .parse()
            .unwrap();
        Ok(Container::new(locator.clone(), Some(parent)))
    }
}

struct Shared(Arc<Directory>);

impl DirectoryClient for Shared {
    fn project_ancestry(&self, project: &Locator) -> Result<AncestorChain, DirectoryError> {
        self.0.project_ancestry(project)
    }

    fn container(&self, locator: &Locator) -> Result<Container, DirectoryError> {
        self.0.container(locator)
    }
}

fn resolver(directory: &Arc<Directory>) -> AncestryResolver {
    let adapter = DirectoryAdapter::with_retry(
        Box::new(Shared(directory.clone())),
        RetryPolicy::new(
            Duration::from_secs(1),
            Duration::from_millis(1),
            Duration::from_millis(2),
        ),
    );
    AncestryResolver::new(AncestryCache::new(), Some(adapter))
}

fn plan(changes: serde_json::Value) -> ChangeSet {
    let plan = json!({ "resource_changes": changes });
    ChangeSet::from_json(&plan.to_string(), ReadOptions::default()).unwrap()
}

fn create(address: &str, resource_type: &str, after: serde_json::Value) -> serde_json::Value {
    json!({
        "address": address,
        "type": resource_type,
        "name": address.rsplit('.').next().unwrap(),
        "change": {"actions": ["create"], "after": after, "after_unknown": {}}
    })
}

#[test]
fn folder_walk_reuses_cached_ancestors() {
    let directory = Arc::new(Directory::default());
    let resolver = resolver(&directory);

    let chain = resolver.resolve(&"folders/3".parse().unwrap()).unwrap();
    assert_eq!(
        chain.to_strings(),
        vec!["folders/3", "folders/2", "organizations/1"]
    );
    assert_eq!(directory.container_calls.load(Ordering::SeqCst), 2);

    let chain = resolver.resolve(&"folders/2".parse().unwrap()).unwrap();
    assert_eq!(chain.to_strings(), vec!["folders/2", "organizations/1"]);
    assert_eq!(directory.container_calls.load(Ordering::SeqCst), 2);
    assert_eq!(directory.ancestry_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn project_chain_is_fetched_once() {
    let directory = Arc::new(Directory::default());
    let pipeline = Pipeline::new(Registry::builtin(), resolver(&directory));

    let changes = plan(json!([
        create(
            "google_project_iam_member.a",
            "google_project_iam_member",
            json!({"project": "existing", "role": "roles/viewer", "member": "user:a@example.com"})
        ),
    ]));
    let consolidation = pipeline.run(&changes, &ExpressionIndex::default()).unwrap();

    assert_eq!(consolidation.assets.len(), 1);
    assert_eq!(
        consolidation.assets[0].ancestry.chain.to_strings(),
        vec!["projects/existing", "folders/3", "folders/2", "organizations/1"]
    );
    assert_eq!(
        consolidation.assets[0].ancestry.parent.as_deref(),
        Some("//cloudresourcemanager.googleapis.com/folders/3")
    );
    assert_eq!(directory.ancestry_calls.load(Ordering::SeqCst), 1);
    assert_eq!(directory.container_calls.load(Ordering::SeqCst), 0);

    let cached = pipeline
        .resolver()
        .cache()
        .get(&"folders/2".parse().unwrap())
        .unwrap();
    assert_eq!(cached.to_strings(), vec!["folders/2", "organizations/1"]);
}

#[test]
fn new_project_in_folder() {
    let directory = Arc::new(Directory::default());
    let pipeline = Pipeline::new(Registry::builtin(), resolver(&directory));

    let changes = plan(json!([
        create(
            "google_project.new",
            "google_project",
            json!({"project_id": "new", "folder_id": "3", "name": "new"})
        ),
    ]));
    let consolidation = pipeline.run(&changes, &ExpressionIndex::default()).unwrap();

    assert!(consolidation.failures.is_empty());
    let asset = &consolidation.assets[0];
    assert_eq!(asset.key, "cloudresourcemanager.googleapis.com/Project/new");
    assert_eq!(
        asset.ancestry.chain.to_strings(),
        vec!["projects/new", "folders/3", "folders/2", "organizations/1"]
    );
    assert_eq!(
        asset.ancestry.parent.as_deref(),
        Some("//cloudresourcemanager.googleapis.com/folders/3")
    );
}

#[test]
fn permission_denied_stays_with_its_asset() {
    let directory = Arc::new(Directory::default());
    let pipeline = Pipeline::new(Registry::builtin(), resolver(&directory));

    let changes = plan(json!([
        create(
            "google_pubsub_topic.locked",
            "google_pubsub_topic",
            json!({"project": "locked", "name": "t"})
        ),
        create(
            "google_pubsub_topic.open",
            "google_pubsub_topic",
            json!({"folder": "9", "name": "t"})
        ),
    ]));
    let consolidation = pipeline.run(&changes, &ExpressionIndex::default()).unwrap();

    assert_eq!(consolidation.assets.len(), 1);
    assert_eq!(
        consolidation.assets[0].addresses,
        vec!["google_pubsub_topic.open"]
    );
    assert_eq!(consolidation.failures.len(), 1);
    let failure = &consolidation.failures[0];
    assert_eq!(failure.addresses, vec!["google_pubsub_topic.locked"]);
    assert!(failure.error.to_string().contains("projects/locked"));
    assert!(failure
        .error
        .to_string()
        .contains("troubleshooting#ProjectCallerForbidden"));
}

#[test]
fn unreachable_directory_aborts() {
    let directory = Arc::new(Directory {
        unreachable: true,
        ..Default::default()
    });
    let pipeline = Pipeline::new(Registry::builtin(), resolver(&directory));

    let changes = plan(json!([
        create(
            "google_pubsub_topic.t",
            "google_pubsub_topic",
            json!({"project": "existing", "name": "t"})
        ),
    ]));
    let result = pipeline.run(&changes, &ExpressionIndex::default());

    assert!(matches!(
        result,
        Err(PipelineError::Aborted(AncestryError::Unreachable { .. }))
    ));
    assert_eq!(directory.ancestry_calls.load(Ordering::SeqCst), 1);
}
