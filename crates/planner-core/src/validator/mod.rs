//! Plan validation: the gate between prompt engine output and the client.

pub mod strict;
pub mod stub;

use async_trait::async_trait;

use crate::models::{CandidatePayload, PlanningContext, ValidatedPayload};

pub use strict::StrictPlanValidator;
pub use stub::StubPlanValidator;

/// A candidate payload that failed structural validation.
///
/// `code` and `message` are surfaced to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PlanValidationFailure {
    pub code: String,
    pub message: String,
}

impl PlanValidationFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Validates prompt engine output before it is serialized to a client.
///
/// The full [`PlanningContext`] is passed so implementations can
/// cross-check echoed fields against what was actually requested.
#[async_trait]
pub trait PlanValidator: Send + Sync {
    /// Short name for logs (e.g. "stub").
    fn name(&self) -> &str;

    /// Return the payload unchanged if it is acceptable.
    async fn validate(
        &self,
        ctx: &PlanningContext,
        candidate: CandidatePayload,
    ) -> Result<ValidatedPayload, PlanValidationFailure>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanValidator) {}
};
