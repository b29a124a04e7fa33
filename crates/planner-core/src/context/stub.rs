//! Deterministic context driver backed by an in-memory lookup table.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ContextDriver, ContextError};
use crate::models::{EMPTY_ARTIFACT, ProjectContext, RepositoryCoordinate};

/// Artifacts for one repository in a fixture table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixtureEntry {
    #[serde(default)]
    pub tree: Option<Value>,
    #[serde(default)]
    pub dependencies: Option<Value>,
    #[serde(default)]
    pub summary: Option<Value>,
}

/// Lookup table keyed by `owner/name`, with a fallback entry.
///
/// ```json
/// {
///   "repositories": { "acme/widgets": { "tree": {...}, "summary": {...} } },
///   "default": { "summary": {...} }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixtureTable {
    #[serde(default)]
    pub repositories: BTreeMap<String, FixtureEntry>,
    #[serde(default)]
    pub default: FixtureEntry,
}

impl FixtureTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        let mut repositories = BTreeMap::new();
        repositories.insert(
            "acme/widgets".to_string(),
            FixtureEntry {
                tree: Some(json!({
                    "paths": ["Cargo.toml", "src/lib.rs", "src/widget.rs", "tests/widget_test.rs"]
                })),
                dependencies: Some(json!({
                    "cargo": {"serde": "1", "tokio": "1"}
                })),
                summary: Some(json!({
                    "description": "Widget catalogue service",
                    "languages": ["Rust"],
                    "default_branch": "main"
                })),
            },
        );

        Self {
            repositories,
            default: FixtureEntry {
                tree: Some(json!({"paths": ["README.md"]})),
                dependencies: None,
                summary: Some(json!({
                    "description": "Mock repository context",
                    "languages": [],
                    "default_branch": "main"
                })),
            },
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ContextError> {
        serde_json::from_str(text).map_err(|e| ContextError::InvalidFixture(e.to_string()))
    }

    /// Entry for `slug`, or the default entry. The flag is `true` on fallback.
    fn lookup(&self, slug: &str) -> (&FixtureEntry, bool) {
        match self.repositories.get(slug) {
            Some(entry) => (entry, false),
            None => (&self.default, true),
        }
    }
}

fn artifact(value: Option<&Value>) -> String {
    value.map_or_else(|| EMPTY_ARTIFACT.to_string(), Value::to_string)
}

/// Context driver that resolves coordinates from a [`FixtureTable`].
///
/// Never fails: unknown repositories get the table's default entry. The
/// table is read-only after construction, so concurrent use needs no locking.
#[derive(Debug, Clone)]
pub struct StubContextDriver {
    label: &'static str,
    table: FixtureTable,
}

impl Default for StubContextDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StubContextDriver {
    /// Driver over the built-in table.
    pub fn new() -> Self {
        Self::with_table(FixtureTable::builtin())
    }

    pub fn with_table(table: FixtureTable) -> Self {
        Self {
            label: "stub",
            table,
        }
    }

    /// Load a fixture table from a JSON file on disk.
    pub fn from_fixture_file(path: &Path) -> Result<Self, ContextError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "fixture_file_missing");
            ContextError::FixtureNotFound {
                path: path.display().to_string(),
            }
        })?;
        let table = FixtureTable::from_json(&text)?;
        Ok(Self {
            label: "fixtures",
            table,
        })
    }

    /// Synchronous lookup shared by the trait method and tests.
    pub fn resolve(&self, repo: &RepositoryCoordinate) -> ProjectContext {
        let slug = repo.slug();
        let (entry, fallback) = self.table.lookup(&slug);
        if fallback {
            tracing::debug!(repository = %slug, "using_default_mock_context");
        }

        ProjectContext {
            repo_owner: repo.owner.clone(),
            repo_name: repo.name.clone(),
            git_ref: repo.git_ref.clone(),
            tree_json: artifact(entry.tree.as_ref()),
            dependency_json: artifact(entry.dependencies.as_ref()),
            summary_json: artifact(entry.summary.as_ref()),
        }
    }
}

#[async_trait]
impl ContextDriver for StubContextDriver {
    fn name(&self) -> &str {
        self.label
    }

    async fn fetch_context(
        &self,
        repo: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError> {
        Ok(self.resolve(repo))
    }
}
