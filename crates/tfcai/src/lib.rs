//! # tfcai - terraform plan to cloud asset inventory
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfcai` works internally.
//!
//! ### Terms
//!
//! - a `locator` names a container of the resource hierarchy: `projects/<id>`,
//!   `folders/<id>` or `organizations/<id>` ([locator::Locator])
//! - an `ancestor chain` lists the containers of something, nearest first, organization
//!   last ([locator::AncestorChain])
//! - a `change` is one entry of the plan's `resource_changes` ([plan::ResourceChange])
//! - a `binding family` is the trio `<x>_iam_member`, `<x>_iam_binding` and
//!   `<x>_iam_policy`, three ways of declaring grants on the same object
//!
//! ### Reading the plan
//!
//! `terraform show -json plan.out` output is read by [plan::ChangeSet]. Reads are dropped,
//! no-ops too unless asked for. What a field will be set to after apply is not always known,
//! in that case its declared expression is looked up in an [expression::ExpressionIndex],
//! built from the plan's `configuration` tree or from the `.tf` sources.
//!
//! ### Resolving ancestry
//!
//! [ancestry::registry::Registry] maps each supported resource type to a descriptor: its
//! asset type, the fields holding container references and the strategy that turns those
//! references into a chain.
//!
//! [ancestry::AncestryResolver] then resolves the chosen locator:
//!
//! 1. cache hit: done
//! 2. organization: the chain is the organization itself
//! 3. project: one single-call lookup returns the full chain
//! 4. anything else: one per-node lookup per hop until a cached locator or an
//!    organization is reached
//!
//! Each answer is stored for every locator on the chain, so the ancestors of a resolved
//! project never cost another call. Remote calls go through a
//! [directory::DirectoryAdapter] which retries throttling and availability errors.
//!
//! **Example**
//!
//! | **seed / call**                             | **cache after**                                    |
//! |---------------------------------------------|----------------------------------------------------|
//! | seed `my-project = organization/1/folder/2` | `projects/my-project`, `folders/2`, `organizations/1` |
//! | per-node lookup `folders/3 -> folders/2`    | `+ folders/3 = [folders/3, folders/2, organizations/1]` |
//!
//! ### Grouping
//!
//! [grouping::GroupingResolver] keys every binding-family change by its target: sorted
//! `name/value/` pairs of the identity-bearing fields. Declarations with equal keys end up
//! in one bucket and become one asset.
//!
//! ### Consolidation
//!
//! [pipeline::Pipeline] ties it together. Buckets and single resources are resolved in
//! parallel. A unit that fails keeps its error next to its addresses, the rest of the run
//! carries on. Only an unreachable directory aborts.
//!
pub mod ancestry;
pub mod config;
pub mod directory;
pub mod expression;
pub mod grouping;
pub mod locator;
pub mod pipeline;
pub mod plan;
mod visit;
