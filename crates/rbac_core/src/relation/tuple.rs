//! Relationship tuple values and their single construction path.
//!
//! # Invariants
//! - Tuples are immutable values; every call site builds them through
//!   [`create_relationship`] or [`create_relationship_with_subrelation`].
//! - Built-in object types live in the `rbac` namespace.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const RBAC_NAMESPACE: &str = "rbac";

/// `(namespace, name)` pair naming an object type in the relation graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectType {
    pub namespace: String,
    pub name: String,
}

impl ObjectType {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn rbac(name: &str) -> Self {
        Self::new(RBAC_NAMESPACE, name)
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<(&str, &str)> for ObjectType {
    fn from((namespace, name): (&str, &str)) -> Self {
        Self::new(namespace, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectReference {
    pub subject: ObjectReference,
    /// Subrelation, e.g. `member` for "members of this group".
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relation: Option<String>,
}

/// One edge `resource #relation subject` of the authorization graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub resource: ObjectReference,
    pub relation: String,
    pub subject: SubjectReference,
}

impl Display for Relationship {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.resource.object_type,
            self.resource.id,
            self.relation,
            self.subject.subject.object_type,
            self.subject.subject.id
        )?;
        if let Some(subrelation) = &self.subject.relation {
            write!(f, "#{subrelation}")?;
        }
        Ok(())
    }
}

/// Builds `resource_type:resource_id #relation subject_type:subject_id`.
pub fn create_relationship(
    resource_type: impl Into<ObjectType>,
    resource_id: impl Into<String>,
    subject_type: impl Into<ObjectType>,
    subject_id: impl Into<String>,
    relation: impl Into<String>,
) -> Relationship {
    build(
        resource_type.into(),
        resource_id.into(),
        subject_type.into(),
        subject_id.into(),
        relation.into(),
        None,
    )
}

/// Same as [`create_relationship`] with a subject subrelation
/// (`subject_type:subject_id#subrelation`).
pub fn create_relationship_with_subrelation(
    resource_type: impl Into<ObjectType>,
    resource_id: impl Into<String>,
    subject_type: impl Into<ObjectType>,
    subject_id: impl Into<String>,
    relation: impl Into<String>,
    subrelation: impl Into<String>,
) -> Relationship {
    build(
        resource_type.into(),
        resource_id.into(),
        subject_type.into(),
        subject_id.into(),
        relation.into(),
        Some(subrelation.into()),
    )
}

fn build(
    resource_type: ObjectType,
    resource_id: String,
    subject_type: ObjectType,
    subject_id: String,
    relation: String,
    subrelation: Option<String>,
) -> Relationship {
    Relationship {
        resource: ObjectReference {
            object_type: resource_type,
            id: resource_id,
        },
        relation,
        subject: SubjectReference {
            subject: ObjectReference {
                object_type: subject_type,
                id: subject_id,
            },
            relation: subrelation,
        },
    }
}
