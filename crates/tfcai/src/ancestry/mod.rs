//! ancestry resolution
//!
//! [AncestryResolver] answers "which containers is this in?" for a locator or for a
//! planned resource. Answers are memoized in an [AncestryCache] that lives for one run.
pub mod cache;
pub mod registry;
mod resolver;

pub use cache::AncestryCache;
pub use resolver::{Ancestry, AncestryResolver, CONTAINER_PARENT_PREFIX, MAX_WALK_DEPTH};

use crate::locator::LocatorError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AncestryError {
    #[error("invalid locator: {0}")]
    InvalidLocator(#[from] LocatorError),
    #[error("user does not have the correct permissions for {locator}. For more info: https://cloud.google.com/docs/terraform/policy-validation/troubleshooting#ProjectCallerForbidden")]
    PermissionDenied { locator: String },
    #[error("failed to resolve ancestry for {locator}: {reason}")]
    Resolution { locator: String, reason: String },
    #[error("directory client required to fetch ancestry for {locator} from the API")]
    Offline { locator: String },
    #[error("directory service unreachable while resolving {locator}: {reason}")]
    Unreachable { locator: String, reason: String },
    #[error("{address}: only one of organization or folder may be set")]
    ConflictingParents { address: String },
    #[error("{address}: organization id not found in resource data")]
    MissingOrganization { address: String },
}

impl AncestryError {
    /// Errors that make every further lookup pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, AncestryError::Unreachable { .. })
    }
}
