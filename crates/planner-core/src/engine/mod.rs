//! Plan generation: turning a [`PlanningContext`] into a candidate payload.
//!
//! The output of a prompt engine is untrusted. The orchestrator passes it to
//! a [`crate::validator::PlanValidator`] before anything reaches a client.

pub mod stub;

use async_trait::async_trait;

use crate::models::{CandidatePayload, PlanningContext};

pub use stub::{STUB_PLAN_VERSION, StubPromptEngine};

/// Opaque failure inside a prompt engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Generates plan output from a planning context.
#[async_trait]
pub trait PromptEngine: Send + Sync {
    /// Short name for logs (e.g. "stub").
    fn name(&self) -> &str;

    /// Produce a candidate payload. No shape is guaranteed.
    async fn run(&self, ctx: &PlanningContext) -> Result<CandidatePayload, GenerationError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PromptEngine) {}
};
