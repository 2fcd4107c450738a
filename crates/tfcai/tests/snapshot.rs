//! Snapshot tests
//!
//! Converts the plans in /tests/fixtures/ offline, against a seeded ancestry cache, and
//! compares if the rendered consolidation changes.

use std::path::PathBuf;
use tfcai::ancestry::registry::Registry;
use tfcai::config::Config;
use tfcai::expression::ExpressionIndex;
use tfcai::pipeline::Pipeline;
use tfcai::plan::{ChangeSet, ReadOptions};

const CONFIG: &str = r#"
project: my-project
offline: true
ancestry_cache:
  my-project: organizations/123/folders/456
"#;

fn render(fixture: &str) -> String {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFCAI_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture);
    let config = Config::from_yaml(CONFIG).expect("valid config");
    let changes = ChangeSet::from_path(&path, ReadOptions::default()).expect("valid plan");
    let expressions = ExpressionIndex::from_configuration(
        changes.configuration.as_ref().expect("plan has a configuration"),
    )
    .expect("valid configuration");

    let consolidation = Pipeline::new(Registry::builtin(), config.resolver())
        .run(&changes, &expressions)
        .expect("offline runs never abort");

    serde_json::to_string_pretty(&consolidation).expect("serializable")
}

#[test]
fn basic() {
    let rendered = render("basic.tfplan.json");
    insta::assert_snapshot!("basic", rendered);
}
