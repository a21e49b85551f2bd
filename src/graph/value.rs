/// Captured property values
///
/// Values captured from work item properties during configuration. Composite
/// values hold their children behind `Arc` so that the same instance can be
/// shared by several properties (and several work items) of one graph.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<Arc<CapturedValue>>),
    Map(BTreeMap<String, Arc<CapturedValue>>),
    /// A live object that only exists while the build scripts are loaded
    /// (project handles, script closures, ...). Cannot be persisted.
    Opaque { type_name: String },
}

impl CapturedValue {
    pub fn str(value: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::Str(value.into()))
    }

    pub fn path(value: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self::Path(value.into()))
    }

    pub fn list(values: impl IntoIterator<Item = Arc<CapturedValue>>) -> Arc<Self> {
        Arc::new(Self::List(values.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(
        entries: impl IntoIterator<Item = (K, Arc<CapturedValue>)>,
    ) -> Arc<Self> {
        Arc::new(Self::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn opaque(type_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::Opaque {
            type_name: type_name.into(),
        })
    }
}

impl fmt::Display for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Self::Opaque { type_name } => write!(f, "<{}>", type_name),
        }
    }
}
