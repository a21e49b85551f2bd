/// Problem attribution
///
/// A `PropertyTrace` says where a problem came from. Traces are built once,
/// at the monitor boundary, from a closed `TraceSource`.
use serde::Serialize;
use std::fmt;

use crate::graph::{PropertyKind, WorkItem};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyTrace {
    /// Source could not be attributed to a work item
    Unknown,
    WorkItem {
        /// Declared type, generated wrapper suffix removed
        type_name: String,
        path: String,
    },
    Property {
        property_kind: PropertyKind,
        name: String,
        owner: Box<PropertyTrace>,
    },
}

impl PropertyTrace {
    pub fn work_item(item: &WorkItem) -> Self {
        Self::WorkItem {
            type_name: item.declared_type().to_string(),
            path: item.path.to_string(),
        }
    }

    pub fn property(kind: PropertyKind, name: impl Into<String>, owner: PropertyTrace) -> Self {
        Self::Property {
            property_kind: kind,
            name: name.into(),
            owner: Box::new(owner),
        }
    }

    /// Path of the work item the trace ends at, if any
    pub fn work_item_path(&self) -> Option<&str> {
        match self {
            Self::Unknown => None,
            Self::WorkItem { path, .. } => Some(path),
            Self::Property { owner, .. } => owner.work_item_path(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for PropertyTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown location"),
            Self::WorkItem { type_name, path } => {
                write!(f, "task `{}` of type `{}`", path, type_name)
            }
            Self::Property {
                property_kind,
                name,
                owner,
            } => write!(f, "{} property `{}` of {}", property_kind, name, owner),
        }
    }
}

/// The object a capability access was made by
#[derive(Debug, Clone, Copy)]
pub enum TraceSource<'a> {
    WorkItem(&'a WorkItem),
    /// Anything else; the string describes the object for the causal error
    Unknown(&'a str),
}

impl TraceSource<'_> {
    pub fn trace(&self) -> PropertyTrace {
        match self {
            Self::WorkItem(item) => PropertyTrace::work_item(item),
            Self::Unknown(_) => PropertyTrace::Unknown,
        }
    }
}

impl fmt::Display for TraceSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkItem(item) => write!(f, "task '{}'", item.path),
            Self::Unknown(description) => f.write_str(description),
        }
    }
}
