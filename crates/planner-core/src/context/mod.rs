//! Context retrieval: resolving a repository coordinate into the artifacts
//! (tree, dependencies, summary) that a prompt engine plans against.
//!
//! ```text
//! Orchestrator --fetch_context(coordinate)--> &dyn ContextDriver
//!                                                 |
//!                                                 v
//!                                           ProjectContext
//! ```

pub mod stub;

use async_trait::async_trait;

use crate::models::{ProjectContext, RepositoryCoordinate};
use crate::orchestrator::CONTEXT_DRIVER_ERROR;

pub use stub::{FixtureEntry, FixtureTable, StubContextDriver};

/// Error code for a missing fixture table on the debug context route.
pub const FIXTURE_NOT_FOUND: &str = "FIXTURE_NOT_FOUND";

/// Errors raised while retrieving repository context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context fixture file not found: {path}")]
    FixtureNotFound { path: String },

    #[error("invalid context fixture: {0}")]
    InvalidFixture(String),

    #[error("{0}")]
    Backend(String),
}

impl ContextError {
    /// Code reported when the error surfaces directly, outside a plan
    /// request. Plan requests always report [`CONTEXT_DRIVER_ERROR`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::FixtureNotFound { .. } => FIXTURE_NOT_FOUND,
            Self::InvalidFixture(_) | Self::Backend(_) => CONTEXT_DRIVER_ERROR,
        }
    }
}

/// Source of repository context for a single coordinate.
///
/// Implementations must be safe to call concurrently from many requests.
#[async_trait]
pub trait ContextDriver: Send + Sync {
    /// Short name for logs (e.g. "stub").
    fn name(&self) -> &str;

    /// Fetch the context artifacts for `repo`.
    ///
    /// The returned context carries the requested owner, name and ref.
    async fn fetch_context(
        &self,
        repo: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ContextDriver) {}
};
