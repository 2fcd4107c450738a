//! resource-manager container identifiers
//!
//! A [Locator] names one container in the resource hierarchy (`projects/<id>`,
//! `folders/<id>` or `organizations/<id>`). An [AncestorChain] is an ordered list of
//! locators starting at the nearest container and ending at the organization.
//!
//! Singular spellings (`project/`, `folder/`, `organization/`) are accepted everywhere
//! and normalized to the plural prefix.
use std::fmt::Formatter;
use std::str::FromStr;

/// Id used for the "unknown organization" sentinel
pub const UNKNOWN_ORGANIZATION_ID: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocatorKind {
    Project,
    Folder,
    Organization,
}

impl LocatorKind {
    pub fn prefix(self) -> &'static str {
        match self {
            LocatorKind::Project => "projects",
            LocatorKind::Folder => "folders",
            LocatorKind::Organization => "organizations",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "projects" | "project" => Some(LocatorKind::Project),
            "folders" | "folder" => Some(LocatorKind::Folder),
            "organizations" | "organization" => Some(LocatorKind::Organization),
            _ => None,
        }
    }

    /// Only projects can be resolved with one ancestry call
    pub fn supports_single_call(self) -> bool {
        matches!(self, LocatorKind::Project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    kind: LocatorKind,
    id: String,
}

impl Locator {
    pub fn new(kind: LocatorKind, id: impl Into<String>) -> Result<Self, LocatorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(LocatorError::EmptyId(format!("{}/", kind.prefix())));
        }
        if id.contains('/') {
            return Err(LocatorError::Malformed(format!("{}/{id}", kind.prefix())));
        }
        Ok(Self { kind, id })
    }

    /// Builds a locator from a bare id or an already prefixed value
    ///
    /// `"123"` and `"folders/123"` both become `folders/123` for [LocatorKind::Folder].
    pub fn with_prefix(kind: LocatorKind, value: &str) -> Result<Self, LocatorError> {
        let id = match value.split_once('/') {
            Some((prefix, id)) if LocatorKind::from_prefix(prefix) == Some(kind) => id,
            _ => value,
        };
        Self::new(kind, id)
    }

    pub fn unknown_organization() -> Self {
        Self {
            kind: LocatorKind::Organization,
            id: UNKNOWN_ORGANIZATION_ID.to_string(),
        }
    }

    /// Parses a seed key
    ///
    /// Unlike [FromStr] a key without any prefix is treated as a project id.
    pub fn from_seed_key(value: &str) -> Result<Self, LocatorError> {
        if value.is_empty() {
            return Err(LocatorError::Empty);
        }
        if !value.contains('/') {
            return Self::new(LocatorKind::Project, value);
        }
        value.parse()
    }

    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_organization(&self) -> bool {
        self.kind == LocatorKind::Organization
    }

    pub fn is_unknown_organization(&self) -> bool {
        self.is_organization() && self.id == UNKNOWN_ORGANIZATION_ID
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(LocatorError::Empty);
        }

        let Some((prefix, id)) = value.split_once('/') else {
            return Err(LocatorError::UnknownPrefix(value.to_string()));
        };

        let Some(kind) = LocatorKind::from_prefix(prefix) else {
            return Err(LocatorError::UnknownPrefix(value.to_string()));
        };

        if id.is_empty() {
            return Err(LocatorError::EmptyId(value.to_string()));
        }

        if id.contains('/') {
            return Err(LocatorError::Malformed(value.to_string()));
        }

        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.prefix(), self.id)
    }
}

impl serde::Serialize for Locator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Ordered containers, nearest first, organization (or the sentinel) last
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct AncestorChain(Vec<Locator>);

impl AncestorChain {
    pub fn new(locators: Vec<Locator>) -> Self {
        Self(locators)
    }

    pub fn unknown_organization() -> Self {
        Self(vec![Locator::unknown_organization()])
    }

    /// Parses a slash delimited path such as `organization/1/folder/2/project/3`
    ///
    /// Paths are written root first, the resulting chain is nearest first.
    pub fn parse_path(path: &str) -> Result<Self, LocatorError> {
        let normalized = normalize_ancestry(path);
        let segments: Vec<&str> = normalized.split('/').collect();
        if segments.len() % 2 != 0 {
            return Err(LocatorError::MalformedPath(path.to_string()));
        }

        let mut locators = segments
            .chunks(2)
            .map(|pair| {
                let kind = LocatorKind::from_prefix(pair[0])
                    .ok_or_else(|| LocatorError::MalformedPath(path.to_string()))?;
                Locator::new(kind, pair[1])
            })
            .collect::<Result<Vec<_>, _>>()?;

        locators.reverse();
        Ok(Self(locators))
    }

    pub fn locators(&self) -> &[Locator] {
        &self.0
    }

    pub fn first(&self) -> Option<&Locator> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Chain starting at `index`
    pub fn suffix(&self, index: usize) -> Self {
        Self(self.0[index.min(self.0.len())..].to_vec())
    }

    pub fn prepend(&mut self, locator: Locator) {
        self.0.insert(0, locator);
    }

    pub fn extend(&mut self, other: &AncestorChain) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn push(&mut self, locator: Locator) {
        self.0.push(locator);
    }

    /// Last element is an organization (or the sentinel)
    pub fn is_rooted(&self) -> bool {
        self.0.last().is_some_and(Locator::is_organization)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl IntoIterator for AncestorChain {
    type Item = Locator;
    type IntoIter = std::vec::IntoIter<Locator>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<Locator>> for AncestorChain {
    fn from(value: Vec<Locator>) -> Self {
        Self(value)
    }
}

/// Rewrites singular container prefixes to their plural form
///
/// Only prefix positions (every other segment, starting with the first) are rewritten.
pub fn normalize_ancestry(value: &str) -> String {
    value
        .split('/')
        .enumerate()
        .map(|(index, segment)| match LocatorKind::from_prefix(segment) {
            Some(kind) if index % 2 == 0 => kind.prefix(),
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("locator is empty")]
    Empty,
    #[error("locator {0:?} has an empty id")]
    EmptyId(String),
    #[error("locator {0:?} must start with projects/, folders/, or organizations/")]
    UnknownPrefix(String),
    #[error("locator {0:?} has more than one id segment")]
    Malformed(String),
    #[error("unexpected format of ancestry path {0:?}")]
    MalformedPath(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chain(values: &[&str]) -> AncestorChain {
        AncestorChain::new(values.iter().map(|v| v.parse().unwrap()).collect())
    }

    #[test]
    fn parse_normalizes_singular_prefixes() {
        for (input, expected) in [
            ("project/1", "projects/1"),
            ("folder/1", "folders/1"),
            ("organization/1", "organizations/1"),
            ("projects/my-project", "projects/my-project"),
        ] {
            let locator: Locator = input.parse().unwrap();
            assert_eq!(locator.to_string(), expected);
        }
    }

    #[test]
    fn display_parse_round_trip() {
        for kind in [
            LocatorKind::Project,
            LocatorKind::Folder,
            LocatorKind::Organization,
        ] {
            let locator = Locator::new(kind, "42").unwrap();
            assert_eq!(locator.to_string().parse::<Locator>().unwrap(), locator);
        }
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("".parse::<Locator>(), Err(LocatorError::Empty));
        assert!(matches!(
            "org/1".parse::<Locator>(),
            Err(LocatorError::UnknownPrefix(_))
        ));
        assert!(matches!(
            "folders/".parse::<Locator>(),
            Err(LocatorError::EmptyId(_))
        ));
        assert!(matches!(
            "folders/123/folders/456".parse::<Locator>(),
            Err(LocatorError::Malformed(_))
        ));
    }

    #[test]
    fn empty_id_is_invalid() {
        assert!(Locator::new(LocatorKind::Project, "").is_err());
        assert!(Locator::with_prefix(LocatorKind::Folder, "folders/").is_err());
    }

    #[test]
    fn with_prefix_accepts_bare_and_prefixed_ids() {
        let bare = Locator::with_prefix(LocatorKind::Folder, "123").unwrap();
        let prefixed = Locator::with_prefix(LocatorKind::Folder, "folders/123").unwrap();
        let singular = Locator::with_prefix(LocatorKind::Folder, "folder/123").unwrap();
        assert_eq!(bare, prefixed);
        assert_eq!(bare, singular);
    }

    #[test]
    fn seed_key_defaults_to_project() {
        assert_eq!(
            Locator::from_seed_key("proj").unwrap().to_string(),
            "projects/proj"
        );
        assert_eq!(
            Locator::from_seed_key("organization/1").unwrap().to_string(),
            "organizations/1"
        );
        assert!(Locator::from_seed_key("foldres/def").is_err());
        assert!(Locator::from_seed_key("").is_err());
    }

    #[test]
    fn parse_path_reverses_into_chain() {
        assert_eq!(
            AncestorChain::parse_path("organizations/123/folders/456/projects/789").unwrap(),
            chain(&["projects/789", "folders/456", "organizations/123"])
        );
        assert_eq!(
            AncestorChain::parse_path("organization/123/folder/456/folder/789").unwrap(),
            chain(&["folders/789", "folders/456", "organizations/123"])
        );
    }

    #[test]
    fn parse_path_rejects_malformed() {
        for path in ["organizations", "organizations/123/folders", "org/123/folders/123"] {
            assert!(
                matches!(
                    AncestorChain::parse_path(path),
                    Err(LocatorError::MalformedPath(_))
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn normalize_only_touches_whole_segments() {
        assert_eq!(
            normalize_ancestry("organization/1/folder/project"),
            "organizations/1/folders/project"
        );
        assert_eq!(normalize_ancestry("myproject/1"), "myproject/1");
    }

    #[test]
    fn suffix_and_rooted() {
        let c = chain(&["projects/a", "folders/b", "organizations/c"]);
        assert!(c.is_rooted());
        assert_eq!(c.suffix(1), chain(&["folders/b", "organizations/c"]));
        assert!(!chain(&["projects/a"]).is_rooted());
        assert!(AncestorChain::unknown_organization().locators()[0].is_unknown_organization());
    }
}
