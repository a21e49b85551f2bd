/// Work item graph
///
/// The graph owns every work item of a build plan. Edges are stored on the
/// items themselves as dependency paths; the graph validates that they
/// resolve and form a DAG before the plan is persisted or executed.
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

mod value;
mod work_item;

pub use value::CapturedValue;
pub use work_item::{
    unpack_type, ActionSpec, Capability, Property, PropertyKind, WorkItem, WorkItemPath,
    GENERATED_TYPE_SUFFIX,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Work item registered twice: {0}")]
    DuplicateItem(WorkItemPath),

    #[error("Work item {item} depends on unknown work item {dependency}")]
    MissingDependency {
        item: WorkItemPath,
        dependency: WorkItemPath,
    },

    #[error("Cyclic dependency detected: {}", format_cycle(.0))]
    Cycle(Vec<WorkItemPath>),
}

fn format_cycle(cycle: &[WorkItemPath]) -> String {
    cycle
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    items: BTreeMap<WorkItemPath, WorkItem>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: WorkItem) -> Result<(), GraphError> {
        if self.items.contains_key(&item.path) {
            return Err(GraphError::DuplicateItem(item.path));
        }
        self.items.insert(item.path.clone(), item);
        Ok(())
    }

    pub fn get(&self, path: &WorkItemPath) -> Option<&WorkItem> {
        self.items.get(path)
    }

    pub fn contains(&self, path: &WorkItemPath) -> bool {
        self.items.contains_key(path)
    }

    /// Items in path order
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &WorkItemPath> {
        self.items.keys()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.items.values().map(|i| i.dependencies.len()).sum()
    }

    /// Reverse edges: for each item, the items that depend on it
    pub fn dependents(&self) -> BTreeMap<&WorkItemPath, Vec<&WorkItemPath>> {
        let mut dependents: BTreeMap<&WorkItemPath, Vec<&WorkItemPath>> =
            self.items.keys().map(|p| (p, Vec::new())).collect();

        for item in self.items.values() {
            for dep in &item.dependencies {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(&item.path);
                }
            }
        }

        dependents
    }

    /// Check that every dependency resolves and that there are no cycles
    pub fn validate(&self) -> Result<(), GraphError> {
        for item in self.items.values() {
            for dep in &item.dependencies {
                if !self.items.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        item: item.path.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Dependencies-first ordering, ties broken by path
    pub fn topological_order(&self) -> Result<Vec<&WorkItemPath>, GraphError> {
        let mut visited = BTreeSet::new();
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.items.len());

        for path in self.items.keys() {
            self.visit(path, &mut visited, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        path: &'a WorkItemPath,
        visited: &mut BTreeSet<&'a WorkItemPath>,
        stack: &mut Vec<&'a WorkItemPath>,
        order: &mut Vec<&'a WorkItemPath>,
    ) -> Result<(), GraphError> {
        if visited.contains(path) {
            return Ok(());
        }

        // Cycle detection
        if let Some(start) = stack.iter().position(|p| *p == path) {
            let mut cycle: Vec<WorkItemPath> = stack[start..].iter().map(|p| (*p).clone()).collect();
            cycle.push(path.clone());
            return Err(GraphError::Cycle(cycle));
        }

        let Some(item) = self.items.get(path) else {
            // Dangling references are reported by validate()
            return Ok(());
        };

        stack.push(path);
        for dep in &item.dependencies {
            self.visit(dep, visited, stack, order)?;
        }
        stack.pop();

        visited.insert(path);
        order.push(path);
        Ok(())
    }
}

impl FromIterator<WorkItem> for Graph {
    /// Later items with a duplicate path replace earlier ones
    fn from_iter<T: IntoIterator<Item = WorkItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|i| (i.path.clone(), i)).collect(),
        }
    }
}
