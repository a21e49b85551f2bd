/// KDL plan manifest
///
/// The manifest (`plan.kdl` in the project root) is the build script of a
/// planstore project. Configuring the build means parsing it and resolving
/// the requested work items into a graph; that is the work a cache hit skips.
///
/// ```kdl
/// env "PROFILE"
///
/// task ":app:compile" type="JavaCompile_Decorated" {
///     depends-on ":app:generate"
///     input "src/**/*.java"
///     output "build/classes"
///     property "options" ref="compile-opts"
///     property "profile" env="PROFILE"
///     exec "javac" "-d" "build/classes"
/// }
///
/// value "compile-opts" {
///     entry "debug" #true
///     entry "level" 2
/// }
/// ```
///
/// `exec` runs a program. `inspect "project"`, `inspect "dependencies"` and
/// `listener "name"` are actions that reach back into configuration-time state
/// while executing; the capability monitor reports them.
///
/// Values declared with `value` are resolved once; every `ref=` to the same
/// name gets the same shared instance.
use anyhow::{anyhow, bail, Context, Result};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::controller::Configurator;
use crate::fingerprint::FingerprintInputs;
use crate::graph::{
    ActionSpec, Capability, CapturedValue, Graph, GraphError, WorkItem, WorkItemPath,
};
use crate::logging::operations;
use crate::start_parameter::StartParameter;

pub const MANIFEST_FILE: &str = "plan.kdl";

const DEFAULT_TASK_TYPE: &str = "DefaultTask";

/// Unresolved value as written in the manifest
#[derive(Debug, Clone, PartialEq)]
enum ValueExpr {
    Scalar(CapturedValue),
    Ref(String),
    Env(String),
    List(Vec<ValueExpr>),
    Map(Vec<(String, ValueExpr)>),
}

impl ValueExpr {
    fn collect_env<'a>(&'a self, vars: &mut Vec<&'a str>) {
        match self {
            Self::Env(var) => vars.push(var),
            Self::List(items) => items.iter().for_each(|i| i.collect_env(vars)),
            Self::Map(entries) => entries.iter().for_each(|(_, v)| v.collect_env(vars)),
            Self::Scalar(_) | Self::Ref(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
struct TaskDecl {
    path: WorkItemPath,
    type_name: String,
    origin: Option<String>,
    depends_on: Vec<WorkItemPath>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    properties: Vec<(String, ValueExpr)>,
    action: Option<ActionSpec>,
}

/// Parsed manifest
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    env: Vec<String>,
    tasks: BTreeMap<WorkItemPath, TaskDecl>,
    values: BTreeMap<String, ValueExpr>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e| anyhow!("Invalid KDL syntax: {}", e))?;

        let mut manifest = Manifest::default();

        for node in doc.nodes() {
            match node.name().value() {
                "env" => {
                    for value in positional(node) {
                        let var = value
                            .as_string()
                            .ok_or_else(|| anyhow!("env expects variable names"))?;
                        manifest.env.push(var.to_string());
                    }
                }
                "task" => {
                    let task = parse_task(node).with_context(|| {
                        format!("Failed to parse task: {}", describe(node))
                    })?;
                    if manifest.tasks.contains_key(&task.path) {
                        return Err(GraphError::DuplicateItem(task.path).into());
                    }
                    manifest.tasks.insert(task.path.clone(), task);
                }
                "value" => {
                    let name = positional_string(node, 0)
                        .ok_or_else(|| anyhow!("value requires a name"))?;
                    let expr = parse_value(node, 1)
                        .with_context(|| format!("Failed to parse value: {}", name))?;
                    if manifest.values.insert(name.clone(), expr).is_some() {
                        bail!("Value declared twice: {}", name);
                    }
                }
                other => bail!("Unknown directive: {}", other),
            }
        }

        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan manifest: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid plan manifest: {}", path.display()))
    }

    pub fn task_paths(&self) -> impl Iterator<Item = &WorkItemPath> {
        self.tasks.keys()
    }

    /// Declared environment variables plus every `env=` reference
    pub fn env_vars(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.env.iter().map(String::as_str).collect();
        for task in self.tasks.values() {
            for (_, expr) in &task.properties {
                expr.collect_env(&mut vars);
            }
        }
        for expr in self.values.values() {
            expr.collect_env(&mut vars);
        }

        let mut seen = BTreeSet::new();
        vars.retain(|v| seen.insert(*v));
        vars
    }

    /// Input globs of every task
    pub fn input_globs(&self) -> Vec<&str> {
        self.tasks
            .values()
            .flat_map(|t| t.inputs.iter().map(String::as_str))
            .collect()
    }

    /// Tasks reachable from the requested ones (all tasks when none are
    /// requested), not descending into excluded tasks
    fn closure(&self, start_parameter: &StartParameter) -> Result<BTreeSet<&WorkItemPath>> {
        let roots: Vec<&WorkItemPath> = if start_parameter.requested.is_empty() {
            self.tasks.keys().collect()
        } else {
            start_parameter
                .requested
                .iter()
                .map(|path| {
                    self.tasks
                        .get_key_value(path)
                        .map(|(k, _)| k)
                        .ok_or_else(|| anyhow!("Work item not found: {}", path))
                })
                .collect::<Result<_>>()?
        };

        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<&WorkItemPath> = roots
            .into_iter()
            .filter(|p| !start_parameter.is_excluded(p))
            .collect();

        while let Some(path) = queue.pop_front() {
            if !closure.insert(path) {
                continue;
            }
            let Some(task) = self.tasks.get(path) else {
                // Dangling reference; reported by graph validation
                continue;
            };
            for dependency in &task.depends_on {
                if !start_parameter.is_excluded(dependency) {
                    queue.push_back(dependency);
                }
            }
        }

        Ok(closure)
    }

    /// Resolve the requested part of the manifest into a graph
    pub fn build_graph(&self, start_parameter: &StartParameter, origin: &str) -> Result<Graph> {
        let closure = self.closure(start_parameter)?;
        let mut resolver = ValueResolver::new(&self.values);
        let mut graph = Graph::new();

        for path in closure {
            let Some(task) = self.tasks.get(path) else {
                continue;
            };

            let mut item = WorkItem::new(task.path.clone(), task.type_name.clone())
                .with_origin(task.origin.as_deref().unwrap_or(origin));

            for dependency in &task.depends_on {
                if !start_parameter.is_excluded(dependency) {
                    item.add_dependency(dependency.clone());
                }
            }

            if !task.inputs.is_empty() {
                item = item.input(
                    "inputs",
                    CapturedValue::list(task.inputs.iter().map(CapturedValue::str)),
                );
            }
            for (name, expr) in &task.properties {
                let value = resolver.resolve(expr).with_context(|| {
                    format!("Failed to resolve property '{}' of {}", name, task.path)
                })?;
                item = item.input(name.clone(), value);
            }
            if !task.outputs.is_empty() {
                item = item.output(
                    "outputs",
                    CapturedValue::list(task.outputs.iter().map(CapturedValue::path)),
                );
            }
            if let Some(action) = &task.action {
                item = item.with_action(action.clone());
            }

            graph.insert(item)?;
        }

        graph.validate()?;
        Ok(graph)
    }
}

/// Resolves named values once, so every reference shares one instance
struct ValueResolver<'m> {
    declared: &'m BTreeMap<String, ValueExpr>,
    resolved: HashMap<&'m str, Arc<CapturedValue>>,
    resolving: Vec<&'m str>,
}

impl<'m> ValueResolver<'m> {
    fn new(declared: &'m BTreeMap<String, ValueExpr>) -> Self {
        Self {
            declared,
            resolved: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    fn resolve(&mut self, expr: &ValueExpr) -> Result<Arc<CapturedValue>> {
        Ok(match expr {
            ValueExpr::Scalar(value) => Arc::new(value.clone()),
            ValueExpr::Env(var) => match env::var(var) {
                Ok(value) => CapturedValue::str(value),
                Err(_) => Arc::new(CapturedValue::Null),
            },
            ValueExpr::Ref(name) => self.named(name)?,
            ValueExpr::List(items) => Arc::new(CapturedValue::List(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_>>()?,
            )),
            ValueExpr::Map(entries) => Arc::new(CapturedValue::Map(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.resolve(value)?)))
                    .collect::<Result<_>>()?,
            )),
        })
    }

    fn named(&mut self, name: &str) -> Result<Arc<CapturedValue>> {
        let (name, expr) = self
            .declared
            .get_key_value(name)
            .ok_or_else(|| anyhow!("Unknown value: {}", name))?;

        if let Some(value) = self.resolved.get(name.as_str()) {
            return Ok(Arc::clone(value));
        }
        if self.resolving.contains(&name.as_str()) {
            bail!("Value '{}' references itself", name);
        }

        self.resolving.push(name);
        let value = self.resolve(expr)?;
        self.resolving.pop();

        self.resolved.insert(name, Arc::clone(&value));
        Ok(value)
    }
}

fn describe(node: &KdlNode) -> String {
    positional_string(node, 0).unwrap_or_else(|| node.name().value().to_string())
}

/// Positional (unnamed) arguments of a node
fn positional(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn positional_string(node: &KdlNode, index: usize) -> Option<String> {
    positional(node)
        .nth(index)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn parse_task(node: &KdlNode) -> Result<TaskDecl> {
    let path = positional_string(node, 0).ok_or_else(|| anyhow!("task requires a path"))?;
    let type_name = node
        .get("type")
        .and_then(|v| v.as_string())
        .unwrap_or(DEFAULT_TASK_TYPE)
        .to_string();

    let mut task = TaskDecl {
        path: WorkItemPath::new(path),
        type_name,
        origin: None,
        depends_on: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        properties: Vec::new(),
        action: None,
    };

    let Some(children) = node.children() else {
        return Ok(task);
    };

    for child in children.nodes() {
        match child.name().value() {
            "depends-on" => {
                for value in positional(child) {
                    let dependency = value
                        .as_string()
                        .ok_or_else(|| anyhow!("depends-on expects work item paths"))?;
                    let dependency = WorkItemPath::new(dependency);
                    if !task.depends_on.contains(&dependency) {
                        task.depends_on.push(dependency);
                    }
                }
            }
            "input" => {
                let glob = positional_string(child, 0)
                    .ok_or_else(|| anyhow!("input requires a path or glob"))?;
                task.inputs.push(glob);
            }
            "output" => {
                let path =
                    positional_string(child, 0).ok_or_else(|| anyhow!("output requires a path"))?;
                task.outputs.push(path);
            }
            "property" => {
                let name = positional_string(child, 0)
                    .ok_or_else(|| anyhow!("property requires a name"))?;
                let expr = parse_value(child, 1)
                    .with_context(|| format!("Failed to parse property: {}", name))?;
                task.properties.push((name, expr));
            }
            "exec" => {
                let mut args = positional(child).map(|v| {
                    v.as_string()
                        .map(|s| s.to_string())
                        .ok_or_else(|| anyhow!("exec arguments must be strings"))
                });
                let program = args
                    .next()
                    .ok_or_else(|| anyhow!("exec requires a program"))??;
                let args = args.collect::<Result<Vec<_>>>()?;
                task.action = Some(ActionSpec::Exec { program, args });
            }
            "inspect" => {
                let capability = positional_string(child, 0)
                    .ok_or_else(|| anyhow!("inspect requires a capability"))?
                    .parse::<Capability>()
                    .map_err(|e| anyhow!(e))?;
                task.action = Some(ActionSpec::Inspect { capability });
            }
            "listener" => {
                let listener = positional_string(child, 0)
                    .ok_or_else(|| anyhow!("listener requires a name"))?;
                task.action = Some(ActionSpec::Inspect {
                    capability: Capability::BuildListener { listener },
                });
            }
            "origin" => {
                task.origin = Some(
                    positional_string(child, 0).ok_or_else(|| anyhow!("origin requires a name"))?,
                );
            }
            other => bail!("Unknown task directive: {}", other),
        }
    }

    Ok(task)
}

/// Parse the value carried by `node`: an attribute (`ref=`, `env=`, `path=`,
/// `opaque=`), the positional argument at `index`, or a children block of
/// `entry`/`item` nodes.
fn parse_value(node: &KdlNode, index: usize) -> Result<ValueExpr> {
    if let Some(name) = node.get("ref").and_then(|v| v.as_string()) {
        return Ok(ValueExpr::Ref(name.to_string()));
    }
    if let Some(var) = node.get("env").and_then(|v| v.as_string()) {
        return Ok(ValueExpr::Env(var.to_string()));
    }
    if let Some(path) = node.get("path").and_then(|v| v.as_string()) {
        return Ok(ValueExpr::Scalar(CapturedValue::Path(PathBuf::from(path))));
    }
    if let Some(type_name) = node.get("opaque").and_then(|v| v.as_string()) {
        return Ok(ValueExpr::Scalar(CapturedValue::Opaque {
            type_name: type_name.to_string(),
        }));
    }

    if let Some(value) = positional(node).nth(index) {
        return scalar(value).map(ValueExpr::Scalar);
    }

    let Some(children) = node.children() else {
        bail!("{} requires a value", node.name().value());
    };

    let mut items = Vec::new();
    let mut entries = Vec::new();
    for child in children.nodes() {
        match child.name().value() {
            "item" => items.push(parse_value(child, 0)?),
            "entry" => {
                let key = positional_string(child, 0)
                    .ok_or_else(|| anyhow!("entry requires a key"))?;
                entries.push((key, parse_value(child, 1)?));
            }
            other => bail!("Unknown value directive: {}", other),
        }
    }

    match (items.is_empty(), entries.is_empty()) {
        (_, true) => Ok(ValueExpr::List(items)),
        (true, false) => Ok(ValueExpr::Map(entries)),
        (false, false) => bail!("A value cannot mix item and entry"),
    }
}

fn scalar(value: &KdlValue) -> Result<CapturedValue> {
    if let Some(s) = value.as_string() {
        return Ok(CapturedValue::Str(s.to_string()));
    }
    if let Some(b) = value.as_bool() {
        return Ok(CapturedValue::Bool(b));
    }
    if let Some(i) = value.as_integer() {
        let i = i64::try_from(i).map_err(|_| anyhow!("Integer out of range: {}", i))?;
        return Ok(CapturedValue::Int(i));
    }
    if value.is_null() {
        return Ok(CapturedValue::Null);
    }
    bail!("Unsupported value: {}", value)
}

/// Configurator backed by a manifest file
#[derive(Debug, Clone)]
pub struct PlanManifest {
    project_dir: PathBuf,
    path: PathBuf,
}

impl PlanManifest {
    /// `manifest` defaults to `plan.kdl`; relative paths resolve against the
    /// project directory
    pub fn new(project_dir: impl Into<PathBuf>, manifest: Option<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let path = match manifest {
            Some(path) if path.is_absolute() => path,
            Some(path) => project_dir.join(path),
            None => project_dir.join(MANIFEST_FILE),
        };
        Self { project_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn origin(&self) -> String {
        self.path
            .strip_prefix(&self.project_dir)
            .unwrap_or(&self.path)
            .to_string_lossy()
            .to_string()
    }
}

impl Configurator for PlanManifest {
    fn fingerprint_inputs(&self, _start_parameter: &StartParameter) -> Result<FingerprintInputs> {
        let manifest = Manifest::load(&self.path)?;

        let mut inputs = FingerprintInputs::new(&self.project_dir).script(&self.path);
        for var in manifest.env_vars() {
            inputs = inputs.env_var(var);
        }
        for glob in manifest.input_globs() {
            inputs = inputs.input_glob(glob);
        }

        Ok(inputs)
    }

    fn configure(&self, start_parameter: &StartParameter) -> Result<Graph> {
        let manifest = Manifest::load(&self.path)?;
        let graph = manifest.build_graph(start_parameter, &self.origin())?;

        debug!(
            operation = operations::CONFIGURE,
            manifest = %self.path.display(),
            items = graph.len(),
            edges = graph.edge_count(),
            "Configured graph from manifest"
        );

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PropertyKind;
    use crate::problems::Tolerance;
    use serial_test::serial;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
        env "PROFILE"

        task ":app:generate" type="Generate" {
            output "build/gen"
        }

        task ":app:compile" type="JavaCompile_Decorated" {
            depends-on ":app:generate"
            input "src/**/*.java"
            property "options" ref="compile-opts"
            property "release" 17
            exec "javac" "-d" "build/classes"
        }

        task ":app:test" type="Test" {
            depends-on ":app:compile"
            property "options" ref="compile-opts"
            property "reports" path="build/reports"
        }

        task ":docs" {
            origin "plugins/docs.kdl"
        }

        value "compile-opts" {
            entry "debug" #true
            entry "flags" ref="flags"
        }

        value "flags" {
            item "-Xlint"
            item "-g"
        }
    "#;

    fn start(requested: &[&str], excluded: &[&str]) -> StartParameter {
        StartParameter::new(true, Tolerance::Warn)
            .with_requested(requested.iter().copied())
            .with_excluded(excluded.iter().copied())
    }

    fn paths(graph: &Graph) -> Vec<&str> {
        graph.paths().map(|p| p.as_str()).collect()
    }

    #[test]
    fn test_parse_and_build_everything() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let graph = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap();

        assert_eq!(
            paths(&graph),
            vec![":app:compile", ":app:generate", ":app:test", ":docs"]
        );

        let compile = graph.get(&":app:compile".into()).unwrap();
        assert_eq!(compile.declared_type(), "JavaCompile");
        assert_eq!(compile.origin.as_deref(), Some("plan.kdl"));
        assert_eq!(compile.dependencies, vec![WorkItemPath::new(":app:generate")]);
        assert_eq!(*compile.property("release").unwrap().value, CapturedValue::Int(17));
        assert_eq!(
            compile.action,
            Some(ActionSpec::Exec {
                program: "javac".to_string(),
                args: vec!["-d".to_string(), "build/classes".to_string()],
            })
        );

        let generate = graph.get(&":app:generate".into()).unwrap();
        assert_eq!(generate.properties[0].kind, PropertyKind::Output);

        let docs = graph.get(&":docs".into()).unwrap();
        assert_eq!(docs.type_name, "DefaultTask");
        assert_eq!(docs.origin.as_deref(), Some("plugins/docs.kdl"));
    }

    #[test]
    fn test_named_values_are_shared() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let graph = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap();

        let compile = graph.get(&":app:compile".into()).unwrap();
        let test = graph.get(&":app:test".into()).unwrap();
        let a = &compile.property("options").unwrap().value;
        let b = &test.property("options").unwrap().value;
        assert!(Arc::ptr_eq(a, b));

        let CapturedValue::Map(entries) = a.as_ref() else {
            panic!("expected map");
        };
        assert_eq!(*entries["debug"], CapturedValue::Bool(true));
        assert_eq!(
            *entries["flags"],
            CapturedValue::List(vec![CapturedValue::str("-Xlint"), CapturedValue::str("-g")])
        );
    }

    #[test]
    fn test_requested_closure() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let graph = manifest
            .build_graph(&start(&[":app:compile"], &[]), "plan.kdl")
            .unwrap();

        assert_eq!(paths(&graph), vec![":app:compile", ":app:generate"]);
    }

    #[test]
    fn test_excluded_items_are_dropped_with_their_edges() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let graph = manifest
            .build_graph(&start(&[":app:test"], &[":app:compile"]), "plan.kdl")
            .unwrap();

        assert_eq!(paths(&graph), vec![":app:test"]);
        assert!(graph.get(&":app:test".into()).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_unknown_requested_item() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let err = manifest
            .build_graph(&start(&[":nope"], &[]), "plan.kdl")
            .unwrap_err();
        assert_eq!(err.to_string(), "Work item not found: :nope");
    }

    #[test]
    fn test_cycle_is_rejected() {
        let manifest = Manifest::parse(
            r#"
            task ":a" { depends-on ":b"; }
            task ":b" { depends-on ":a"; }
            "#,
        )
        .unwrap();

        let err = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap_err();
        assert!(err.to_string().starts_with("Cyclic dependency detected"));
    }

    #[test]
    fn test_dangling_dependency_is_rejected() {
        let manifest = Manifest::parse(r#"task ":a" { depends-on ":missing"; }"#).unwrap();
        let err = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Work item :a depends on unknown work item :missing"
        );
    }

    #[test]
    fn test_self_referencing_value() {
        let manifest = Manifest::parse(
            r#"
            task ":a" { property "x" ref="loop"; }
            value "loop" { item ref="loop"; }
            "#,
        )
        .unwrap();

        let err = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap_err();
        assert!(format!("{:#}", err).contains("Value 'loop' references itself"));
    }

    #[test]
    fn test_inspect_actions() {
        let manifest = Manifest::parse(
            r#"
            task ":a" { inspect "project"; }
            task ":b" { inspect "dependencies"; }
            task ":c" { listener "BuildScanListener"; }
            "#,
        )
        .unwrap();
        let graph = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap();

        let action = |path: &str| graph.get(&path.into()).unwrap().action.clone();
        assert_eq!(
            action(":a"),
            Some(ActionSpec::Inspect {
                capability: Capability::Project
            })
        );
        assert_eq!(
            action(":b"),
            Some(ActionSpec::Inspect {
                capability: Capability::LiveDependencies
            })
        );
        assert_eq!(
            action(":c"),
            Some(ActionSpec::Inspect {
                capability: Capability::BuildListener {
                    listener: "BuildScanListener".to_string()
                }
            })
        );

        assert!(Manifest::parse(r#"task ":a" { inspect "gradle"; }"#).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Manifest::parse("task").is_err());
        assert!(Manifest::parse("bogus \"x\"").is_err());
        assert!(Manifest::parse("task \":a\"\ntask \":a\"").is_err());
        assert!(Manifest::parse("value \"v\" { item 1; entry \"k\" 2; }").is_err());
        assert!(Manifest::parse("task \":a\" { property \"p\"; }").is_err());
    }

    #[test]
    fn test_opaque_values_parse() {
        let manifest =
            Manifest::parse(r#"task ":a" { property "project" opaque="DefaultProject"; }"#).unwrap();
        let graph = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap();
        let item = graph.get(&":a".into()).unwrap();
        assert!(matches!(
            &*item.property("project").unwrap().value,
            CapturedValue::Opaque { type_name } if type_name == "DefaultProject"
        ));
    }

    #[test]
    #[serial]
    fn test_env_values_are_captured_and_fingerprinted() {
        let var = "PLANSTORE_TEST_MANIFEST_ENV";
        let manifest = Manifest::parse(&format!(
            r#"
            env "PROFILE"
            task ":a" {{ property "level" env="{}"; }}
            "#,
            var
        ))
        .unwrap();

        assert_eq!(manifest.env_vars(), vec!["PROFILE", var]);

        env::set_var(var, "3");
        let graph = manifest.build_graph(&start(&[], &[]), "plan.kdl").unwrap();
        env::remove_var(var);

        let item = graph.get(&":a".into()).unwrap();
        assert_eq!(*item.property("level").unwrap().value, CapturedValue::Str("3".into()));
    }

    #[test]
    fn test_configurator_reads_manifest_from_project() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), MANIFEST).unwrap();

        let configurator = PlanManifest::new(temp.path(), None);
        let inputs = configurator
            .fingerprint_inputs(&StartParameter::default())
            .unwrap();
        assert_eq!(inputs.scripts, vec![temp.path().join(MANIFEST_FILE)]);
        assert_eq!(inputs.input_globs, vec!["src/**/*.java".to_string()]);
        assert_eq!(inputs.env_vars, vec!["PROFILE".to_string()]);

        let graph = configurator.configure(&StartParameter::default()).unwrap();
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let configurator = PlanManifest::new(temp.path(), None);
        let err = configurator
            .configure(&StartParameter::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to read plan manifest"));
    }
}
