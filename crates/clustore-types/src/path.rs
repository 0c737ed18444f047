use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Path separator inside a [`ClusterPath`].
pub const SEPARATOR: char = '/';

/// Top-level category of a cluster path.
///
/// The cluster type is the first segment of every path. It decides which
/// backends may serve the path and how many segments follow it before the
/// path names a leaf object rather than a directory level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterType {
    /// The item root. Only used for enumerating which clusters exist.
    Root,
    Property,
    Lifecycle,
    /// Append-only, integer-indexed event sequence.
    History,
    /// Append-only, integer-indexed job sequence.
    Job,
    Collection,
    Viewpoint,
    Outcome,
    Attachment,
}

impl ClusterType {
    /// Every storable cluster type (everything except [`ClusterType::Root`]).
    pub const ALL: [ClusterType; 8] = [
        ClusterType::Property,
        ClusterType::Lifecycle,
        ClusterType::History,
        ClusterType::Job,
        ClusterType::Collection,
        ClusterType::Viewpoint,
        ClusterType::Outcome,
        ClusterType::Attachment,
    ];

    /// The name used as the first path segment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "",
            Self::Property => "Property",
            Self::Lifecycle => "LifeCycle",
            Self::History => "AuditTrail",
            Self::Job => "Job",
            Self::Collection => "Collection",
            Self::Viewpoint => "ViewPoint",
            Self::Outcome => "Outcome",
            Self::Attachment => "Attachment",
        }
    }

    /// Resolve a first path segment.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.is_empty() {
            return Some(Self::Root);
        }
        Self::ALL.into_iter().find(|ct| ct.name() == name)
    }

    /// Number of segments after the type name at which a path is a leaf.
    pub fn leaf_depth(&self) -> usize {
        match self {
            Self::Root => 0,
            Self::Property | Self::Lifecycle | Self::History | Self::Job => 1,
            Self::Collection | Self::Viewpoint => 2,
            Self::Outcome | Self::Attachment => 3,
        }
    }

    /// History and Job are integer-indexed sequences, materialized on demand.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::History | Self::Job)
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "<root>"),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl FromStr for ClusterType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| TypeError::UnknownClusterType(s.to_string()))
    }
}

/// Normalized address of an object (or directory level) inside an item.
///
/// Stored without a leading separator; empty segments are rejected. The
/// empty path is the item root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterPath {
    path: String,
    cluster_type: ClusterType,
}

impl ClusterPath {
    /// Parse and normalize a path such as `/Property/Name`.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.strip_prefix(SEPARATOR).unwrap_or(raw);
        let trimmed = trimmed.strip_suffix(SEPARATOR).unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        if trimmed.split(SEPARATOR).any(str::is_empty) {
            return Err(TypeError::InvalidPath {
                path: raw.to_string(),
                reason: "empty path segment".into(),
            });
        }

        if trimmed.split(SEPARATOR).any(|seg| seg == "." || seg == "..") {
            return Err(TypeError::InvalidPath {
                path: raw.to_string(),
                reason: "relative path segment".into(),
            });
        }

        let first = trimmed.split(SEPARATOR).next().unwrap_or_default();
        let cluster_type = ClusterType::from_name(first)
            .ok_or_else(|| TypeError::UnknownClusterType(first.to_string()))?;

        Ok(Self {
            path: trimmed.to_string(),
            cluster_type,
        })
    }

    /// The item root.
    pub fn root() -> Self {
        Self {
            path: String::new(),
            cluster_type: ClusterType::Root,
        }
    }

    /// The top-level path of a cluster type, e.g. `Property`.
    pub fn of_type(cluster_type: ClusterType) -> Self {
        Self {
            path: cluster_type.name().to_string(),
            cluster_type,
        }
    }

    /// The first segment, resolved.
    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether this is the empty path.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// All segments, including the type name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Number of segments below the type name.
    pub fn depth(&self) -> usize {
        self.segments().count().saturating_sub(1)
    }

    /// Whether this path addresses a leaf object for its cluster type.
    pub fn is_leaf(&self) -> bool {
        !self.is_root() && self.depth() == self.cluster_type.leaf_depth()
    }

    /// Last segment (the object's own name). Empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Append one segment. Appending to the root selects a cluster type.
    pub fn child(&self, segment: &str) -> Result<Self, TypeError> {
        if self.is_root() {
            Self::parse(segment)
        } else {
            Self::parse(&format!("{}{SEPARATOR}{segment}", self.path))
        }
    }

    /// The enclosing level, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.path.rfind(SEPARATOR) {
            Some(idx) => Some(Self {
                path: self.path[..idx].to_string(),
                cluster_type: self.cluster_type,
            }),
            None => Some(Self::root()),
        }
    }

    /// Segment-boundary prefix match: `Outcome/a` covers `Outcome/a/1` but
    /// not `Outcome/ab`. The root covers everything.
    pub fn starts_with(&self, prefix: &ClusterPath) -> bool {
        if prefix.is_root() || self.path == prefix.path {
            return true;
        }
        self.path
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }
}

impl fmt::Debug for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterPath({:?})", self.path)
    }
}

impl fmt::Display for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl FromStr for ClusterPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClusterPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClusterPath> for String {
    fn from(path: ClusterPath) -> Self {
        path.path
    }
}

impl From<ClusterType> for ClusterPath {
    fn from(cluster_type: ClusterType) -> Self {
        Self::of_type(cluster_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cluster_type_names_roundtrip() {
        for ct in ClusterType::ALL {
            assert_eq!(ClusterType::from_name(ct.name()), Some(ct));
        }
        assert_eq!(ClusterType::from_name(""), Some(ClusterType::Root));
        assert_eq!(ClusterType::from_name("Nope"), None);
    }

    #[test]
    fn leaf_depths() {
        assert_eq!(ClusterType::Property.leaf_depth(), 1);
        assert_eq!(ClusterType::Collection.leaf_depth(), 2);
        assert_eq!(ClusterType::Viewpoint.leaf_depth(), 2);
        assert_eq!(ClusterType::Outcome.leaf_depth(), 3);
        assert_eq!(ClusterType::Attachment.leaf_depth(), 3);
        assert!(ClusterType::History.is_sequence());
        assert!(ClusterType::Job.is_sequence());
        assert!(!ClusterType::Property.is_sequence());
    }

    #[test]
    fn parse_strips_leading_separator() {
        let p = ClusterPath::parse("/Property/Name").unwrap();
        assert_eq!(p.as_str(), "Property/Name");
        assert_eq!(p.cluster_type(), ClusterType::Property);
        assert_eq!(p.name(), "Name");
        assert!(p.is_leaf());
    }

    #[test]
    fn parse_root() {
        assert!(ClusterPath::parse("").unwrap().is_root());
        assert!(ClusterPath::parse("/").unwrap().is_root());
        assert_eq!(ClusterPath::root().cluster_type(), ClusterType::Root);
    }

    #[test]
    fn parse_rejects_unknown_type_and_empty_segments() {
        assert_eq!(
            ClusterPath::parse("Bogus/x").unwrap_err(),
            TypeError::UnknownClusterType("Bogus".into())
        );
        assert!(matches!(
            ClusterPath::parse("Property//x"),
            Err(TypeError::InvalidPath { .. })
        ));
    }

    #[test]
    fn parse_rejects_relative_segments() {
        for raw in ["Property/..", "Property/../../etc", "Outcome/./S/0/1", "Job/1/.."] {
            assert!(
                matches!(ClusterPath::parse(raw), Err(TypeError::InvalidPath { .. })),
                "{raw} should be rejected"
            );
        }
        assert!(ClusterPath::parse("Property/...").is_ok());
        assert!(ClusterPath::root().child("..").is_err());
    }

    #[test]
    fn depth_and_leaf() {
        let outcome = ClusterPath::parse("Outcome/Schema/0").unwrap();
        assert_eq!(outcome.depth(), 2);
        assert!(!outcome.is_leaf());
        let leaf = outcome.child("12").unwrap();
        assert_eq!(leaf.as_str(), "Outcome/Schema/0/12");
        assert!(leaf.is_leaf());
        assert!(!ClusterPath::of_type(ClusterType::Outcome).is_leaf());
    }

    #[test]
    fn child_of_root_selects_type() {
        let p = ClusterPath::root().child("AuditTrail").unwrap();
        assert_eq!(p.cluster_type(), ClusterType::History);
        assert!(ClusterPath::root().child("Nope").is_err());
    }

    #[test]
    fn parent_chain() {
        let p = ClusterPath::parse("ViewPoint/Schema/last").unwrap();
        let parent = p.parent().unwrap();
        assert_eq!(parent.as_str(), "ViewPoint/Schema");
        let top = parent.parent().unwrap();
        assert_eq!(top, ClusterPath::of_type(ClusterType::Viewpoint));
        assert!(top.parent().unwrap().is_root());
        assert!(ClusterPath::root().parent().is_none());
    }

    #[test]
    fn prefix_match_respects_segment_boundary() {
        let prefix = ClusterPath::parse("Outcome/a").unwrap();
        assert!(ClusterPath::parse("Outcome/a").unwrap().starts_with(&prefix));
        assert!(ClusterPath::parse("Outcome/a/1/2").unwrap().starts_with(&prefix));
        assert!(!ClusterPath::parse("Outcome/ab/1/2").unwrap().starts_with(&prefix));
        assert!(prefix.starts_with(&ClusterPath::root()));
    }

    #[test]
    fn serde_as_plain_string() {
        let p = ClusterPath::parse("Property/Name").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"Property/Name\"");
        let back: ClusterPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<ClusterPath>("\"Bogus/1\"").is_err());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(segs in proptest::collection::vec("[a-zA-Z0-9_]{1,8}", 0..4)) {
            let raw = format!("/Outcome/{}", segs.join("/"));
            let once = ClusterPath::parse(&raw).unwrap();
            let twice = ClusterPath::parse(once.as_str()).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once.depth(), segs.len());
            prop_assert!(!once.as_str().starts_with('/'));
        }

        #[test]
        fn every_path_starts_with_its_parents(segs in proptest::collection::vec("[a-z0-9]{1,6}", 1..4)) {
            let path = ClusterPath::parse(&format!("Attachment/{}", segs.join("/"))).unwrap();
            let mut cursor = path.parent();
            while let Some(parent) = cursor {
                prop_assert!(path.starts_with(&parent));
                cursor = parent.parent();
            }
        }
    }
}
