//! blocking HTTP client for the resource-manager APIs
//!
//! - v1 `projects/<id>:getAncestry` serves the single-call lookup
//! - v3 `GET <locator>` serves the per-node lookup
use super::{Container, DirectoryClient, DirectoryError};
use crate::locator::{normalize_ancestry, AncestorChain, Locator};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_V1_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com/v1/";
pub const DEFAULT_V3_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com/v3/";

/// Upper bound for a single HTTP exchange; retries get their own budget
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpDirectory {
    agent: ureq::Agent,
    v1_endpoint: String,
    v3_endpoint: String,
    access_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(
        v1_endpoint: impl Into<String>,
        v3_endpoint: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();

        Self {
            agent,
            v1_endpoint: with_trailing_slash(v1_endpoint.into()),
            v3_endpoint: with_trailing_slash(v3_endpoint.into()),
            access_token,
        }
    }

    fn authorization(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
    }
}

impl Default for HttpDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_V1_ENDPOINT, DEFAULT_V3_ENDPOINT, None)
    }
}

impl DirectoryClient for HttpDirectory {
    fn project_ancestry(&self, project: &Locator) -> Result<AncestorChain, DirectoryError> {
        let url = format!("{}projects/{}:getAncestry", self.v1_endpoint, project.id());
        tracing::trace!(%url, "POST");

        let mut request = self
            .agent
            .post(&url)
            .header("User-Agent", user_agent());
        if let Some(authorization) = self.authorization() {
            request = request.header("Authorization", authorization);
        }

        let response: AncestryResponse = request
            .send_json(serde_json::json!({}))
            .map_err(classify)?
            .body_mut()
            .read_json()
            .map_err(|err| DirectoryError::InvalidResponse(err.to_string()))?;

        response.into_chain()
    }

    fn container(&self, locator: &Locator) -> Result<Container, DirectoryError> {
        let url = format!("{}{}", self.v3_endpoint, locator);
        tracing::trace!(%url, "GET");

        let mut request = self.agent.get(&url).header("User-Agent", user_agent());
        if let Some(authorization) = self.authorization() {
            request = request.header("Authorization", authorization);
        }

        let response: ContainerResponse = request
            .call()
            .map_err(classify)?
            .body_mut()
            .read_json()
            .map_err(|err| DirectoryError::InvalidResponse(err.to_string()))?;

        response.into_container()
    }
}

#[derive(Deserialize, Debug)]
struct AncestryResponse {
    #[serde(default)]
    ancestor: Vec<Ancestor>,
}

#[derive(Deserialize, Debug)]
struct Ancestor {
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
}

#[derive(Deserialize, Debug)]
struct ResourceId {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

impl AncestryResponse {
    fn into_chain(self) -> Result<AncestorChain, DirectoryError> {
        self.ancestor
            .into_iter()
            .map(|ancestor| {
                let ResourceId { kind, id } = ancestor.resource_id;
                normalize_ancestry(&format!("{kind}/{id}"))
                    .parse::<Locator>()
                    .map_err(|err| DirectoryError::InvalidResponse(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AncestorChain::new)
    }
}

#[derive(Deserialize, Debug)]
struct ContainerResponse {
    name: String,
    #[serde(default)]
    parent: String,
}

impl ContainerResponse {
    fn into_container(self) -> Result<Container, DirectoryError> {
        let invalid = |err: crate::locator::LocatorError| {
            DirectoryError::InvalidResponse(err.to_string())
        };

        let name = self.name.parse::<Locator>().map_err(invalid)?;
        let parent = if self.parent.is_empty() {
            None
        } else {
            Some(self.parent.parse::<Locator>().map_err(invalid)?)
        };

        Ok(Container::new(name, parent))
    }
}

fn classify(err: ureq::Error) -> DirectoryError {
    match err {
        ureq::Error::StatusCode(status) => DirectoryError::from_status(status),
        ureq::Error::Timeout(_) => DirectoryError::Transient(err.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            DirectoryError::Unreachable(err.to_string())
        }
        other => DirectoryError::InvalidResponse(other.to_string()),
    }
}

fn user_agent() -> String {
    format!("tfcai/{}", env!("CARGO_PKG_VERSION"))
}

fn with_trailing_slash(mut endpoint: String) -> String {
    if !endpoint.ends_with('/') {
        endpoint.push('/');
    }
    endpoint
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ancestry_response_normalizes_types() {
        let response: AncestryResponse = serde_json::from_str(
            r#"{"ancestor": [
                {"resourceId": {"type": "project", "id": "foo"}},
                {"resourceId": {"type": "folder", "id": "bar"}},
                {"resourceId": {"type": "organization", "id": "qux"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            response.into_chain().unwrap().to_strings(),
            vec!["projects/foo", "folders/bar", "organizations/qux"]
        );
    }

    #[test]
    fn container_response_without_parent() {
        let response: ContainerResponse =
            serde_json::from_str(r#"{"name": "organizations/qux"}"#).unwrap();
        let container = response.into_container().unwrap();
        assert_eq!(container.parent, None);
    }

    #[test]
    fn container_response_with_parent() {
        let response: ContainerResponse =
            serde_json::from_str(r#"{"name": "folders/bar", "parent": "organizations/qux"}"#)
                .unwrap();
        let container = response.into_container().unwrap();
        assert_eq!(container.parent.unwrap().to_string(), "organizations/qux");
    }

    #[test]
    fn endpoints_get_trailing_slash() {
        let directory = HttpDirectory::new("http://localhost:1/v1", "http://localhost:1/v3/", None);
        assert_eq!(directory.v1_endpoint, "http://localhost:1/v1/");
        assert_eq!(directory.v3_endpoint, "http://localhost:1/v3/");
    }
}
