//! Pipeline orchestrator: runs one plan request through context retrieval,
//! generation and validation, and maps the outcome to a response or a
//! structured failure.
//!
//! Each capability is called at most once per request. The first failure
//! ends the request; nothing is retried.

pub mod state;

use serde_json::Value;
use uuid::Uuid;

use crate::auth::CallerContext;
use crate::backends::Backends;
use crate::context::ContextError;
use crate::engine::GenerationError;
use crate::models::{
    ErrorResponse, PlanRequest, PlanResponse, PlanStatus, PlanningContext, ProjectContext,
    RejectedRequest, RepositoryCoordinate, SchemaError,
};
use crate::validator::PlanValidationFailure;

pub use state::PipelineState;
use state::PipelineRun;

/// Error code for any context driver failure.
pub const CONTEXT_DRIVER_ERROR: &str = "CONTEXT_DRIVER_ERROR";
/// Error code for any prompt engine failure.
pub const PROMPT_ENGINE_ERROR: &str = "PROMPT_ENGINE_ERROR";

/// Category of a failed request. The HTTP layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request body did not match the schema.
    Schema,
    /// The generated plan failed validation.
    Validation,
    Context,
    Generation,
}

impl FailureKind {
    /// Whether the failure is attributable to the request rather than the
    /// service (422 rather than 500).
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::Schema | Self::Validation)
    }
}

/// Everything that can end a plan request early.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Context driver error: {0}")]
    Context(#[from] ContextError),

    #[error("Prompt engine error: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Validation(#[from] PlanValidationFailure),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Schema(_) => FailureKind::Schema,
            Self::Context(_) => FailureKind::Context,
            Self::Generation(_) => FailureKind::Generation,
            Self::Validation(_) => FailureKind::Validation,
        }
    }

    /// Machine-readable code. Validation failures keep the validator's own.
    pub fn code(&self) -> &str {
        match self {
            Self::Schema(e) => e.code(),
            Self::Context(_) => CONTEXT_DRIVER_ERROR,
            Self::Generation(_) => PROMPT_ENGINE_ERROR,
            Self::Validation(f) => &f.code,
        }
    }

    /// Terminal pipeline state for this error. Schema errors are raised
    /// before the pipeline starts and have none.
    pub fn failure_state(&self) -> Option<PipelineState> {
        match self {
            Self::Schema(_) => None,
            Self::Context(_) => Some(PipelineState::ContextFailed),
            Self::Generation(_) => Some(PipelineState::GenerationFailed),
            Self::Validation(_) => Some(PipelineState::ValidationFailed),
        }
    }
}

/// A failed plan request, with the `request_id` to report.
#[derive(Debug, thiserror::Error)]
#[error("plan request {request_id} failed: {error}")]
pub struct PlanFailure {
    pub request_id: Uuid,
    pub error: PipelineError,
}

impl PlanFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }

    pub fn state(&self) -> Option<PipelineState> {
        self.error.failure_state()
    }

    /// Client-facing error body. Carries no `run_id`.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.request_id, self.error.code(), self.error.to_string())
    }
}

impl From<RejectedRequest> for PlanFailure {
    fn from(rejected: RejectedRequest) -> Self {
        Self {
            request_id: rejected.request_id,
            error: PipelineError::Schema(rejected.error),
        }
    }
}

fn fail(run: &mut PipelineRun, error: PipelineError) -> PlanFailure {
    if let Some(state) = error.failure_state() {
        run.advance(state);
    }
    tracing::warn!(
        request_id = %run.request_id(),
        state = %run.state(),
        code = error.code(),
        error = %error,
        "plan_request_failed"
    );
    PlanFailure {
        request_id: run.request_id(),
        error,
    }
}

/// Runs plan requests against a fixed set of backends.
///
/// Holds no per-request state, so one instance can serve concurrent
/// requests.
#[derive(Clone)]
pub struct Orchestrator {
    backends: Backends,
}

impl Orchestrator {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Run one request end to end.
    ///
    /// Dropping the returned future aborts whichever capability call is in
    /// flight.
    pub async fn process(
        &self,
        request: PlanRequest,
        caller: &CallerContext,
    ) -> Result<PlanResponse, PlanFailure> {
        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        let mut run = PipelineRun::start(request_id);

        tracing::info!(
            request_id = %request_id,
            user_id = %caller.user_id,
            repository = %request.repository.slug(),
            git_ref = %request.repository.git_ref,
            "plan_request_received"
        );

        let mut projects = Vec::with_capacity(request.repositories().len());
        for repo in request.repositories() {
            match self.backends.context.fetch_context(repo).await {
                Ok(project) => projects.push(project),
                Err(e) => return Err(fail(&mut run, e.into())),
            }
        }
        run.advance(PipelineState::ContextFetched);

        let ctx = PlanningContext {
            request_id,
            user_input: request.user_input,
            projects,
        };

        let candidate = match self.backends.engine.run(&ctx).await {
            Ok(candidate) => candidate,
            Err(e) => return Err(fail(&mut run, e.into())),
        };
        run.advance(PipelineState::Generated);

        let payload = match self.backends.validator.validate(&ctx, candidate).await {
            Ok(payload) => payload,
            Err(e) => return Err(fail(&mut run, e.into())),
        };
        run.advance(PipelineState::Validated);

        let run_id = Uuid::new_v4();
        run.advance(PipelineState::Completed);
        let plan_version = payload
            .get("plan_version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::info!(
            request_id = %request_id,
            run_id = %run_id,
            plan_version,
            "plan_completed"
        );

        Ok(PlanResponse {
            request_id,
            run_id,
            status: PlanStatus::Ok,
            payload,
        })
    }

    /// Fetch context for a single coordinate, bypassing the rest of the
    /// pipeline. Backs the debug context route.
    pub async fn debug_fetch(
        &self,
        coordinate: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError> {
        tracing::info!(
            repository = %coordinate.slug(),
            git_ref = %coordinate.git_ref,
            driver = self.backends.context.name(),
            "debug_context_fetch"
        );
        self.backends.context.fetch_context(coordinate).await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backends", &self.backends)
            .finish()
    }
}
