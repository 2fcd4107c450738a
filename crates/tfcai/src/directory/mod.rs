//! resource-manager directory lookups
//!
//! Two API generations are hidden behind [DirectoryClient]:
//! - the single-call ancestry lookup, which returns a project's whole chain
//! - the per-node lookup, which returns one container and its immediate parent
//!
//! [DirectoryAdapter] wraps a client with bounded retry and turns raw
//! [DirectoryError]s into [AncestryError]s naming the locator that failed.
pub mod http;
pub mod retry;

use crate::ancestry::AncestryError;
use crate::locator::{AncestorChain, Locator};
use retry::RetryPolicy;

/// One container as reported by the per-node lookup
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Container {
    pub name: Locator,
    pub parent: Option<Locator>,
}

pub trait DirectoryClient: Send + Sync {
    /// Full chain of a project, nearest first, in a single round trip
    fn project_ancestry(&self, project: &Locator) -> Result<AncestorChain, DirectoryError>;

    /// The container itself and its immediate parent
    fn container(&self, locator: &Locator) -> Result<Container, DirectoryError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("request throttled or service unavailable: {0}")]
    Transient(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("directory service unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("request failed with HTTP {0}")]
    Status(u16),
}

impl DirectoryError {
    /// Rate-limit and availability errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Transient(_))
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            403 => DirectoryError::PermissionDenied,
            404 => DirectoryError::NotFound,
            429 | 500 | 502 | 503 | 504 => DirectoryError::Transient(format!("HTTP {status}")),
            _ => DirectoryError::Status(status),
        }
    }
}

/// Retrying, error-translating front of a [DirectoryClient]
pub struct DirectoryAdapter {
    client: Box<dyn DirectoryClient>,
    retry: RetryPolicy,
}

impl DirectoryAdapter {
    pub fn new(client: Box<dyn DirectoryClient>) -> Self {
        Self::with_retry(client, RetryPolicy::default())
    }

    pub fn with_retry(client: Box<dyn DirectoryClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(locator = %project))]
    pub fn project_ancestry(&self, project: &Locator) -> Result<AncestorChain, AncestryError> {
        tracing::debug!("requesting project ancestry");
        let chain = self
            .retry
            .run(|| self.client.project_ancestry(project))
            .map_err(|err| translate(project, err))?;

        if chain.is_empty() {
            return Err(AncestryError::Resolution {
                locator: project.to_string(),
                reason: "ancestry response was empty".to_string(),
            });
        }

        Ok(chain)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(locator = %locator))]
    pub fn container(&self, locator: &Locator) -> Result<Container, AncestryError> {
        tracing::debug!("requesting container");
        self.retry
            .run(|| self.client.container(locator))
            .map_err(|err| translate(locator, err))
    }
}

fn translate(locator: &Locator, err: DirectoryError) -> AncestryError {
    let locator = locator.to_string();
    match err {
        DirectoryError::PermissionDenied => AncestryError::PermissionDenied { locator },
        DirectoryError::Unreachable(reason) => AncestryError::Unreachable { locator, reason },
        other => AncestryError::Resolution {
            locator,
            reason: other.to_string(),
        },
    }
}


#[cfg(test)]
mod test {
    use super::fake::{FakeDirectory, Shared};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(fake: &Arc<FakeDirectory>) -> DirectoryAdapter {
        DirectoryAdapter::with_retry(
            Box::new(Shared(fake.clone())),
            RetryPolicy::new(
                Duration::from_secs(5),
                Duration::from_millis(1),
                Duration::from_millis(2),
            ),
        )
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            DirectoryError::from_status(403),
            DirectoryError::PermissionDenied
        );
        assert_eq!(DirectoryError::from_status(404), DirectoryError::NotFound);
        assert!(DirectoryError::from_status(429).is_retryable());
        assert!(DirectoryError::from_status(503).is_retryable());
        assert!(!DirectoryError::from_status(400).is_retryable());
    }

    #[test]
    fn transient_errors_are_retried() {
        let fake = Arc::new(
            FakeDirectory::default()
                .with_container("folders/123", Some("organizations/456"))
                .failing_with([DirectoryError::from_status(500)]),
        );

        let container = adapter(&fake)
            .container(&"folders/123".parse().unwrap())
            .unwrap();

        assert_eq!(container.parent.unwrap().to_string(), "organizations/456");
        assert_eq!(fake.calls(), (0, 2));
    }

    #[test]
    fn permission_denied_names_the_locator() {
        let fake = Arc::new(
            FakeDirectory::default().failing_with([DirectoryError::PermissionDenied]),
        );

        let err = adapter(&fake)
            .project_ancestry(&"projects/secret".parse().unwrap())
            .unwrap_err();

        assert!(matches!(err, AncestryError::PermissionDenied { .. }));
        let message = err.to_string();
        assert!(message.contains("projects/secret"));
        assert!(message.contains("troubleshooting"));
        assert_eq!(fake.calls(), (1, 0));
    }

    #[test]
    fn exhausted_retries_become_resolution_errors() {
        let fake = Arc::new(
            FakeDirectory::default()
                .with_ancestry("projects/p", &["projects/p", "organizations/1"])
                .failing_with(std::iter::repeat(DirectoryError::from_status(503)).take(10_000)),
        );
        let adapter = DirectoryAdapter::with_retry(
            Box::new(Shared(fake.clone())),
            RetryPolicy::new(
                Duration::from_millis(20),
                Duration::from_millis(1),
                Duration::from_millis(2),
            ),
        );

        let err = adapter
            .project_ancestry(&"projects/p".parse().unwrap())
            .unwrap_err();

        match err {
            AncestryError::Resolution { locator, reason } => {
                assert_eq!(locator, "projects/p");
                assert!(reason.contains("HTTP 503"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(fake.calls().0 > 1);
    }

    #[test]
    fn empty_ancestry_is_an_error() {
        let fake = Arc::new(FakeDirectory::default().with_ancestry("projects/p", &[]));
        let err = adapter(&fake)
            .project_ancestry(&"projects/p".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, AncestryError::Resolution { .. }));
    }
}
