use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use clustore_types::{ClusterPath, ItemId};

use crate::error::{FabricError, FabricResult};

/// Stand-in for the item part of a message that concerns no single item.
const NO_ITEM: &str = "tree";

/// Whether the announced path was written or removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Deleted,
}

/// One `(item, path)` change announcement.
///
/// Wire form is `<uuid>:<path>` for an addition and `<uuid>:-<path>` for a
/// deletion. An absent item is written as `tree`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvalidationMessage {
    pub item: Option<ItemId>,
    /// Raw path text. Usually a cluster path, but server-level messages may
    /// carry other words.
    pub path: String,
    pub kind: ChangeKind,
}

impl InvalidationMessage {
    /// `path` of `item` was written.
    pub fn added(item: ItemId, path: &ClusterPath) -> Self {
        Self {
            item: Some(item),
            path: path.to_string(),
            kind: ChangeKind::Added,
        }
    }

    /// `path` of `item` was removed, along with anything below it.
    pub fn deleted(item: ItemId, path: &ClusterPath) -> Self {
        Self {
            item: Some(item),
            path: path.to_string(),
            kind: ChangeKind::Deleted,
        }
    }

    /// Parse the path part as a cluster path.
    pub fn cluster_path(&self) -> FabricResult<ClusterPath> {
        Ok(ClusterPath::parse(&self.path)?)
    }

    /// Whether the path was removed rather than written.
    pub fn is_deletion(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }
}

impl fmt::Display for InvalidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "{item}:")?,
            None => write!(f, "{NO_ITEM}:")?,
        }
        if self.is_deletion() {
            write!(f, "-")?;
        }
        write!(f, "{}", self.path)
    }
}

impl FromStr for InvalidationMessage {
    type Err = FabricError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line.trim().is_empty() {
            return Err(FabricError::Malformed {
                line: line.to_string(),
                reason: "blank message".into(),
            });
        }
        let (item_part, path_part) = line.split_once(':').ok_or_else(|| FabricError::Malformed {
            line: line.to_string(),
            reason: "missing ':' separator".into(),
        })?;

        let item = if item_part.is_empty() || item_part == NO_ITEM {
            None
        } else {
            Some(item_part.parse::<ItemId>()?)
        };

        let (path, kind) = match path_part.strip_prefix('-') {
            Some(rest) => (rest, ChangeKind::Deleted),
            None => (path_part, ChangeKind::Added),
        };

        Ok(Self {
            item,
            path: path.to_string(),
            kind,
        })
    }
}

/// What travels on the channel: one message, or a batch flushed by one
/// commit. Encoded as a JSON string or a JSON array of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Single(String),
    Batch(Vec<String>),
}

impl Envelope {
    /// One message travels alone; more travel as a batch.
    pub fn from_messages(messages: &[InvalidationMessage]) -> Self {
        match messages {
            [one] => Self::Single(one.to_string()),
            many => Self::Batch(many.iter().map(ToString::to_string).collect()),
        }
    }

    /// Decode every message. Fails on the first malformed one.
    pub fn messages(&self) -> FabricResult<Vec<InvalidationMessage>> {
        match self {
            Self::Single(line) => Ok(vec![line.parse()?]),
            Self::Batch(lines) => lines.iter().map(|line| line.parse()).collect(),
        }
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> FabricResult<String> {
        serde_json::to_string(self).map_err(|e| FabricError::Serialization(e.to_string()))
    }

    /// Decode from JSON.
    pub fn from_json(text: &str) -> FabricResult<Self> {
        serde_json::from_str(text).map_err(|e| FabricError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_wire_form() {
        let item = ItemId::new();
        let msg = InvalidationMessage::added(item, &ClusterPath::parse("Property/Name").unwrap());
        assert_eq!(msg.to_string(), format!("{item}:Property/Name"));
        assert_eq!(msg.to_string().parse::<InvalidationMessage>().unwrap(), msg);
    }

    #[test]
    fn deleted_wire_form() {
        let item = ItemId::new();
        let msg = InvalidationMessage::deleted(item, &ClusterPath::parse("Job/3").unwrap());
        assert_eq!(msg.to_string(), format!("{item}:-Job/3"));
        let parsed: InvalidationMessage = msg.to_string().parse().unwrap();
        assert!(parsed.is_deletion());
        assert_eq!(parsed.cluster_path().unwrap().as_str(), "Job/3");
    }

    #[test]
    fn tree_means_no_item() {
        let parsed: InvalidationMessage = "tree:ping".parse().unwrap();
        assert_eq!(parsed.item, None);
        assert_eq!(parsed.path, "ping");
        assert_eq!(parsed.to_string(), "tree:ping");
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(matches!(
            "".parse::<InvalidationMessage>(),
            Err(FabricError::Malformed { .. })
        ));
        assert!(matches!(
            "no-separator".parse::<InvalidationMessage>(),
            Err(FabricError::Malformed { .. })
        ));
        assert!(matches!(
            "not-a-uuid:Property/x".parse::<InvalidationMessage>(),
            Err(FabricError::Invalid(_))
        ));
    }

    #[test]
    fn path_may_contain_colons() {
        let item = ItemId::new();
        let parsed: InvalidationMessage = format!("{item}:Outcome/a:b").parse().unwrap();
        assert_eq!(parsed.path, "Outcome/a:b");
    }

    #[test]
    fn envelope_json_shapes() {
        let item = ItemId::new();
        let a = InvalidationMessage::added(item, &ClusterPath::parse("Property/a").unwrap());
        let b = InvalidationMessage::deleted(item, &ClusterPath::parse("Property/b").unwrap());

        let single = Envelope::from_messages(std::slice::from_ref(&a));
        assert_eq!(single.to_json().unwrap(), format!("\"{item}:Property/a\""));

        let batch = Envelope::from_messages(&[a.clone(), b.clone()]);
        let json = batch.to_json().unwrap();
        assert!(json.starts_with('['));
        let decoded = Envelope::from_json(&json).unwrap();
        assert_eq!(decoded.messages().unwrap(), vec![a, b]);
    }

    #[test]
    fn envelope_rejects_other_json() {
        assert!(Envelope::from_json("{\"a\":1}").is_err());
        let bad = Envelope::Batch(vec!["garbage".into()]);
        assert!(bad.messages().is_err());
    }
}
