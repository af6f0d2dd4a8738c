//! Task definitions and loading.
//!
//! A task is a declarative acceptance-test plan for one generated artifact:
//! either an HTTP endpoint exercised with synthesized requests, or a UI
//! component rendered once per case. Tasks are stored as JSON files and
//! discovered recursively under a tasks directory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that can occur while loading or checking task definitions
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Failed to read task file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse task JSON in {path}: {source}")]
    ParseError {
        path: String,
        source: serde_json::Error,
    },

    #[error("Task '{0}' declares kind {1} but carries no matching spec")]
    SpecMismatch(String, TaskKind),

    #[error("Task '{0}' has no cases")]
    EmptyCases(String),

    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),

    #[error("No task files found under {0}")]
    EmptyTaskSet(String),
}

/// The two supported artifact shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Request/response service (an exported Express app)
    Service,
    /// Render-once UI component (an exported React component)
    Component,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Component => write!(f, "component"),
        }
    }
}

/// Difficulty tier, derived from the task id suffix convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Basic,
    Hard,
    ExtraHard,
}

impl Difficulty {
    /// Derive the tier from an id: `_extra_hard` and `_hard` suffixes mark
    /// the harder tiers, everything else is basic.
    #[must_use]
    pub fn from_task_id(id: &str) -> Self {
        if id.ends_with("_extra_hard") {
            Self::ExtraHard
        } else if id.ends_with("_hard") {
            Self::Hard
        } else {
            Self::Basic
        }
    }

    /// Strip the difficulty suffix from an id, yielding the task family.
    #[must_use]
    pub fn family_of(id: &str) -> &str {
        id.strip_suffix("_extra_hard")
            .or_else(|| id.strip_suffix("_hard"))
            .unwrap_or(id)
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Hard => write!(f, "hard"),
            Self::ExtraHard => write!(f, "extra_hard"),
        }
    }
}

/// Expected response checks for one endpoint case.
///
/// Checkers are evaluated in declaration order (equals, contains, `has_props`)
/// and short-circuit on the first failure. All present checkers must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Expectation {
    /// Full deep equality against the response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    /// Per-key equality against the response body (subset match)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<BTreeMap<String, Value>>,
    /// Keys that must be present in the response body
    #[serde(default, rename = "hasProps", skip_serializing_if = "Option::is_none")]
    pub has_props: Option<Vec<String>>,
}

/// One declarative input/expected-output pair for an endpoint task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointCase {
    /// Query parameters appended to the request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Value>>,
    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Required response status (exact match, checked first)
    pub status: u16,
    /// Body checks applied after the status matches
    #[serde(default)]
    pub expect: Expectation,
}

/// Endpoint test plan: one route, many cases
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSpec {
    /// HTTP method (get, post, ...)
    pub method: String,
    /// Route path, e.g. `/sum`
    pub path: String,
    /// Declarative cases, validated in order
    pub cases: Vec<EndpointCase>,
}

/// Expected markup checks for one component case
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentExpectation {
    /// Exact rendered-markup equality
    #[serde(default, rename = "equalsHtml", skip_serializing_if = "Option::is_none")]
    pub equals_html: Option<String>,
    /// Substrings that must all appear in the markup
    #[serde(default, rename = "htmlContains", skip_serializing_if = "Option::is_none")]
    pub html_contains: Option<Vec<String>>,
    /// Identifiers expected as `data-testid` attributes in the markup
    #[serde(default, rename = "hasDataTestIds", skip_serializing_if = "Option::is_none")]
    pub has_data_test_ids: Option<Vec<String>>,
}

/// One render case for a component task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentCase {
    /// Props passed to the component
    #[serde(default)]
    pub props: Value,
    /// Markup checks applied to the rendered output
    #[serde(default)]
    pub expect: ComponentExpectation,
}

/// Component test plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentSpec {
    /// Declarative cases, rendered in order
    pub cases: Vec<ComponentCase>,
}

/// One benchmark task: identity, prompt material, and exactly one test plan
/// matching its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, stable across attempts
    pub id: String,
    /// Artifact kind this task expects
    #[serde(default = "default_kind")]
    pub kind: TaskKind,
    /// Free-text task statement, opaque to the core
    #[serde(default)]
    pub description: String,
    /// Free-text input/output contract, opaque to the core
    #[serde(default)]
    pub contract: String,
    /// Endpoint test plan (service tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointSpec>,
    /// Component test plan (component tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentSpec>,
}

const fn default_kind() -> TaskKind {
    TaskKind::Service
}

impl Task {
    /// Difficulty tier derived from the id suffix
    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        Difficulty::from_task_id(&self.id)
    }

    /// Task family: the id with its difficulty suffix stripped
    #[must_use]
    pub fn family(&self) -> &str {
        Difficulty::family_of(&self.id)
    }

    /// Check the invariant that the task carries exactly the spec its kind
    /// requires, with a non-empty case list.
    ///
    /// # Errors
    ///
    /// Returns `SpecMismatch` or `EmptyCases` when the invariant is violated.
    pub fn check(&self) -> Result<(), TaskError> {
        match self.kind {
            TaskKind::Service => {
                let spec = self
                    .endpoint
                    .as_ref()
                    .ok_or_else(|| TaskError::SpecMismatch(self.id.clone(), self.kind))?;
                if spec.cases.is_empty() {
                    return Err(TaskError::EmptyCases(self.id.clone()));
                }
            }
            TaskKind::Component => {
                let spec = self
                    .component
                    .as_ref()
                    .ok_or_else(|| TaskError::SpecMismatch(self.id.clone(), self.kind))?;
                if spec.cases.is_empty() {
                    return Err(TaskError::EmptyCases(self.id.clone()));
                }
            }
        }
        Ok(())
    }
}

/// An ordered, read-only task suite loaded once before a run
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    /// Wrap an already-built task list, checking every task's invariant.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation or duplicate id found.
    pub fn new(tasks: Vec<Task>) -> Result<Self, TaskError> {
        let mut seen = std::collections::BTreeSet::new();
        for task in &tasks {
            task.check()?;
            if !seen.insert(task.id.clone()) {
                return Err(TaskError::DuplicateId(task.id.clone()));
            }
        }
        Ok(Self { tasks })
    }

    /// Load every `*.json` task file under `dir`, recursively, in path order.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable or malformed files, invariant
    /// violations, duplicate ids, or an empty result.
    pub fn load_dir(dir: &Path) -> Result<Self, TaskError> {
        let mut entries: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().is_some_and(|ext| ext == "json")
            })
            .map(|e| e.into_path())
            .collect();
        entries.sort();

        let mut tasks = Vec::with_capacity(entries.len());
        for path in entries {
            let content = std::fs::read_to_string(&path)?;
            let task: Task =
                serde_json::from_str(&content).map_err(|source| TaskError::ParseError {
                    path: path.display().to_string(),
                    source,
                })?;
            tracing::debug!(id = %task.id, kind = %task.kind, path = %path.display(), "loaded task");
            tasks.push(task);
        }

        if tasks.is_empty() {
            return Err(TaskError::EmptyTaskSet(dir.display().to_string()));
        }
        Self::new(tasks)
    }

    /// Iterate tasks in load order
    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Number of tasks in the suite
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the suite is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            kind: TaskKind::Service,
            description: String::new(),
            contract: String::new(),
            endpoint: Some(EndpointSpec {
                method: "get".to_string(),
                path: "/sum".to_string(),
                cases: vec![EndpointCase {
                    query: None,
                    body: None,
                    headers: None,
                    status: 200,
                    expect: Expectation::default(),
                }],
            }),
            component: None,
        }
    }

    #[test]
    fn test_difficulty_from_id_suffix() {
        assert_eq!(Difficulty::from_task_id("sum"), Difficulty::Basic);
        assert_eq!(Difficulty::from_task_id("sum_hard"), Difficulty::Hard);
        assert_eq!(
            Difficulty::from_task_id("sum_extra_hard"),
            Difficulty::ExtraHard
        );
    }

    #[test]
    fn test_family_strips_suffix() {
        assert_eq!(Difficulty::family_of("sum"), "sum");
        assert_eq!(Difficulty::family_of("sum_hard"), "sum");
        assert_eq!(Difficulty::family_of("sum_extra_hard"), "sum");
        assert_eq!(Difficulty::family_of("create_user_hard"), "create_user");
    }

    #[test]
    fn test_task_check_spec_mismatch() {
        let mut task = service_task("sum");
        task.endpoint = None;
        let err = task.check().unwrap_err();
        assert!(matches!(err, TaskError::SpecMismatch(_, TaskKind::Service)));
    }

    #[test]
    fn test_task_check_empty_cases() {
        let mut task = service_task("sum");
        task.endpoint.as_mut().unwrap().cases.clear();
        assert!(matches!(task.check(), Err(TaskError::EmptyCases(_))));
    }

    #[test]
    fn test_task_set_rejects_duplicate_ids() {
        let err = TaskSet::new(vec![service_task("sum"), service_task("sum")]).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateId(_)));
    }

    #[test]
    fn test_endpoint_task_deserializes_from_json() {
        let raw = json!({
            "id": "sum",
            "kind": "service",
            "description": "GET /sum adds a and b",
            "contract": "GET /sum?a=3&b=4 -> 200 { result: 7 }",
            "endpoint": {
                "method": "get",
                "path": "/sum",
                "cases": [
                    { "query": { "a": 3, "b": 4 }, "status": 200,
                      "expect": { "equals": { "result": 7 } } },
                    { "query": { "a": "x", "b": 1 }, "status": 400,
                      "expect": { "equals": { "error": "invalid_input" } } }
                ]
            }
        });
        let task: Task = serde_json::from_value(raw).unwrap();
        assert!(task.check().is_ok());
        assert_eq!(task.kind, TaskKind::Service);
        let spec = task.endpoint.unwrap();
        assert_eq!(spec.cases.len(), 2);
        assert_eq!(spec.cases[0].status, 200);
        assert_eq!(spec.cases[0].expect.equals, Some(json!({ "result": 7 })));
    }

    #[test]
    fn test_component_task_deserializes_from_json() {
        let raw = json!({
            "id": "badge",
            "kind": "component",
            "component": {
                "cases": [
                    { "props": { "label": "OK" },
                      "expect": { "htmlContains": [">OK<"],
                                  "hasDataTestIds": ["badge"] } }
                ]
            }
        });
        let task: Task = serde_json::from_value(raw).unwrap();
        assert!(task.check().is_ok());
        let spec = task.component.unwrap();
        assert_eq!(
            spec.cases[0].expect.has_data_test_ids,
            Some(vec!["badge".to_string()])
        );
    }

    #[test]
    fn test_task_set_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("endpoint");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(
            sub.join("task_sum.json"),
            serde_json::to_string(&service_task("sum")).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("task_sum_hard.json"),
            serde_json::to_string(&service_task("sum_hard")).unwrap(),
        )
        .unwrap();
        // Non-JSON files are ignored
        std::fs::write(dir.path().join("README.md"), "notes").unwrap();

        let set = TaskSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_task_set_load_dir_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TaskSet::load_dir(dir.path()),
            Err(TaskError::EmptyTaskSet(_))
        ));
    }

    #[test]
    fn test_task_set_load_dir_malformed_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task_bad.json"), "{ not json").unwrap();
        assert!(matches!(
            TaskSet::load_dir(dir.path()),
            Err(TaskError::ParseError { .. })
        ));
    }
}
