use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Globally unique, time-ordered node identifier.
///
/// Backed by a ULID rather than the table-scoped row ids of a conventional
/// storage engine: nodes are referenced across the whole graph (properties,
/// owner links, supertag assignments), so identity must be stable and
/// sortable independent of any single table's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn nil() -> Self {
        Self(Ulid::nil())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

impl From<Ulid> for NodeId {
    fn from(u: Ulid) -> Self {
        Self(u)
    }
}

/// Either a `systemId` (e.g. `"field:status"`) or a raw [`NodeId`]. Most
/// lookup operations accept either form so callers never need to resolve a
/// system id themselves before calling into the node service.
#[derive(Debug, Clone)]
pub enum NodeRef {
    SystemId(String),
    Id(NodeId),
}

impl From<&str> for NodeRef {
    fn from(s: &str) -> Self {
        match NodeId::from_str(s) {
            Ok(id) => NodeRef::Id(id),
            Err(_) => NodeRef::SystemId(s.to_string()),
        }
    }
}

impl From<String> for NodeRef {
    fn from(s: String) -> Self {
        NodeRef::from(s.as_str())
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_lexicographically_sortable_by_creation_order() {
        let a = NodeId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = NodeId::new();
        assert!(a < b);
    }

    #[test]
    fn node_id_round_trips_through_display_and_from_str() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_ref_from_plain_string_is_a_system_id() {
        match NodeRef::from("field:status") {
            NodeRef::SystemId(s) => assert_eq!(s, "field:status"),
            NodeRef::Id(_) => panic!("expected system id"),
        }
    }
}
