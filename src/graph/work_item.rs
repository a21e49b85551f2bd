/// Work items: the nodes of the execution plan
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::value::CapturedValue;

/// Suffix appended to the declared type name of generated wrapper types
pub const GENERATED_TYPE_SUFFIX: &str = "_Decorated";

/// Unique, path-like identity of a work item (e.g. ":app:compileJava")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemPath(String);

impl WorkItemPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for WorkItemPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Input,
    Output,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// A declared property whose value was captured at configuration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub kind: PropertyKind,
    pub name: String,
    pub value: Arc<CapturedValue>,
}

/// What the execution engine runs for a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionSpec {
    Exec { program: String, args: Vec<String> },
    /// Reaches into configuration-time build state while executing
    Inspect { capability: Capability },
}

/// Configuration-only build state an action can reach for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Project,
    LiveDependencies,
    BuildListener { listener: String },
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "dependencies" => Ok(Self::LiveDependencies),
            other => Err(format!(
                "Unknown capability: {}. Must be one of: project, dependencies",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: WorkItemPath,
    /// Type name as registered, possibly a generated wrapper
    pub type_name: String,
    /// Script or plugin that registered the item
    pub origin: Option<String>,
    pub dependencies: Vec<WorkItemPath>,
    pub properties: Vec<Property>,
    pub action: Option<ActionSpec>,
}

impl WorkItem {
    pub fn new(path: impl Into<WorkItemPath>, type_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            type_name: type_name.into(),
            origin: None,
            dependencies: Vec::new(),
            properties: Vec::new(),
            action: None,
        }
    }

    /// Add a dependency, keeping declaration order and ignoring duplicates
    pub fn depends_on(mut self, path: impl Into<WorkItemPath>) -> Self {
        self.add_dependency(path.into());
        self
    }

    pub fn add_dependency(&mut self, path: WorkItemPath) {
        if !self.dependencies.contains(&path) {
            self.dependencies.push(path);
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: Arc<CapturedValue>) -> Self {
        self.properties.push(Property {
            kind: PropertyKind::Input,
            name: name.into(),
            value,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, value: Arc<CapturedValue>) -> Self {
        self.properties.push(Property {
            kind: PropertyKind::Output,
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.action = Some(action);
        self
    }

    /// The user-declared type, with any generated wrapper suffix removed
    pub fn declared_type(&self) -> &str {
        unpack_type(&self.type_name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Strip generated wrapper suffixes (possibly nested) from a type name
pub fn unpack_type(type_name: &str) -> &str {
    let mut name = type_name;
    while let Some(stripped) = name.strip_suffix(GENERATED_TYPE_SUFFIX) {
        name = stripped;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_type() {
        assert_eq!(unpack_type("JavaCompile_Decorated"), "JavaCompile");
        assert_eq!(unpack_type("Copy_Decorated_Decorated"), "Copy");
        assert_eq!(unpack_type("DefaultTask"), "DefaultTask");
    }

    #[test]
    fn test_dependencies_are_an_ordered_set() {
        let item = WorkItem::new(":app:jar", "Jar")
            .depends_on(":app:compile")
            .depends_on(":app:resources")
            .depends_on(":app:compile");

        assert_eq!(
            item.dependencies,
            vec![
                WorkItemPath::new(":app:compile"),
                WorkItemPath::new(":app:resources")
            ]
        );
    }

    #[test]
    fn test_declared_type() {
        let item = WorkItem::new(":compile", "JavaCompile_Decorated");
        assert_eq!(item.declared_type(), "JavaCompile");
        assert_eq!(item.type_name, "JavaCompile_Decorated");
    }
}
