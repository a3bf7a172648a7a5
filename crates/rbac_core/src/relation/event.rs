//! Replication event model shipped to the relation graph transport.
//!
//! # Invariants
//! - One event is one atomic batch: `add` and `remove` travel together.
//! - Events are built by the operation that owns the enclosing transaction and
//!   are discarded once handed to the replicator.

use crate::relation::tuple::Relationship;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationEventType {
    BootstrapTenant,
    ExternalUserUpdate,
    CreateWorkspace,
    UpdateWorkspace,
    DeleteWorkspace,
}

impl ReplicationEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BootstrapTenant => "BOOTSTRAP_TENANT",
            Self::ExternalUserUpdate => "EXTERNAL_USER_UPDATE",
            Self::CreateWorkspace => "CREATE_WORKSPACE",
            Self::UpdateWorkspace => "UPDATE_WORKSPACE",
            Self::DeleteWorkspace => "DELETE_WORKSPACE",
        }
    }
}

impl Display for ReplicationEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    #[serde(rename = "type")]
    pub event_type: ReplicationEventType,
    /// Free-form metadata such as `org_id` or a workspace uuid.
    pub info: BTreeMap<String, String>,
    /// Ordering domain for the transport.
    pub partition_key: String,
    pub add: Vec<Relationship>,
    pub remove: Vec<Relationship>,
}

impl ReplicationEvent {
    pub fn new(event_type: ReplicationEventType, partition_key: impl Into<String>) -> Self {
        Self {
            event_type,
            info: BTreeMap::new(),
            partition_key: partition_key.into(),
            add: Vec::new(),
            remove: Vec::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn with_add(mut self, tuples: Vec<Relationship>) -> Self {
        self.add = tuples;
        self
    }

    pub fn with_remove(mut self, tuples: Vec<Relationship>) -> Self {
        self.remove = tuples;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ReplicationEvent, ReplicationEventType};
    use crate::relation::tuple::create_relationship;

    #[test]
    fn serializes_with_wire_field_names() {
        let event = ReplicationEvent::new(ReplicationEventType::ExternalUserUpdate, "rbactodo")
            .with_info("principal_id", "redhat:1")
            .with_remove(vec![create_relationship(
                ("rbac", "group"),
                "g",
                ("rbac", "principal"),
                "redhat:1",
                "member",
            )]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EXTERNAL_USER_UPDATE");
        assert_eq!(json["partition_key"], "rbactodo");
        assert_eq!(json["info"]["principal_id"], "redhat:1");
        assert_eq!(json["add"].as_array().map(Vec::len), Some(0));
        assert_eq!(json["remove"].as_array().map(Vec::len), Some(1));
        assert!(!event.is_empty());
    }

    #[test]
    fn wire_name_matches_display_name() {
        for event_type in [
            ReplicationEventType::CreateWorkspace,
            ReplicationEventType::UpdateWorkspace,
            ReplicationEventType::DeleteWorkspace,
        ] {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, event_type.as_str());
        }
    }
}
