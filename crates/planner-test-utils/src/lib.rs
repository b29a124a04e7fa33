//! Shared fakes and request builders for planner tests.
//!
//! The fakes implement the capability traits with fixed behavior so tests
//! can drive the orchestrator down each failure path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use planner_core::Backends;
use planner_core::context::{ContextDriver, ContextError, StubContextDriver};
use planner_core::engine::{GenerationError, PromptEngine, StubPromptEngine};
use planner_core::models::{
    CandidatePayload, PlanRequest, PlanningContext, ProjectContext, RepositoryCoordinate,
    UserInput, ValidatedPayload,
};
use planner_core::validator::{PlanValidationFailure, PlanValidator};

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

pub fn sample_user_input() -> UserInput {
    UserInput {
        purpose: "p".to_string(),
        vision: "v".to_string(),
        must: vec!["m1".to_string()],
        dont: vec![],
        nice: vec![],
    }
}

/// The `acme/widgets` request on `refs/heads/main`.
pub fn sample_request(request_id: Option<Uuid>) -> PlanRequest {
    PlanRequest {
        repository: RepositoryCoordinate::new("acme", "widgets"),
        user_input: sample_user_input(),
        request_id,
    }
}

/// JSON body equivalent to [`sample_request`] without a `request_id`.
pub fn sample_body() -> Value {
    json!({
        "repository": {"owner": "acme", "name": "widgets", "ref": "refs/heads/main"},
        "user_input": {
            "purpose": "p",
            "vision": "v",
            "must": ["m1"],
            "dont": [],
            "nice": []
        }
    })
}

// ---------------------------------------------------------------------------
// Fake backends
// ---------------------------------------------------------------------------

/// Context driver that always fails.
#[derive(Debug, Clone)]
pub struct FailingContextDriver {
    pub message: String,
}

impl FailingContextDriver {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ContextDriver for FailingContextDriver {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_context(
        &self,
        _repo: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError> {
        Err(ContextError::Backend(self.message.clone()))
    }
}

/// Context driver whose fixture table is missing.
#[derive(Debug, Clone)]
pub struct MissingFixtureContextDriver {
    pub path: String,
}

impl MissingFixtureContextDriver {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl ContextDriver for MissingFixtureContextDriver {
    fn name(&self) -> &str {
        "missing-fixture"
    }

    async fn fetch_context(
        &self,
        _repo: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError> {
        Err(ContextError::FixtureNotFound {
            path: self.path.clone(),
        })
    }
}

/// Stub context driver that counts its calls.
#[derive(Debug, Default)]
pub struct CountingContextDriver {
    inner: StubContextDriver,
    calls: AtomicUsize,
}

impl CountingContextDriver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextDriver for CountingContextDriver {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch_context(
        &self,
        repo: &RepositoryCoordinate,
    ) -> Result<ProjectContext, ContextError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_context(repo).await
    }
}

/// Prompt engine that always fails.
#[derive(Debug, Clone)]
pub struct FailingPromptEngine {
    pub message: String,
}

impl FailingPromptEngine {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PromptEngine for FailingPromptEngine {
    fn name(&self) -> &str {
        "failing"
    }

    async fn run(&self, _ctx: &PlanningContext) -> Result<CandidatePayload, GenerationError> {
        Err(GenerationError::new(self.message.clone()))
    }
}

/// Stub prompt engine that sleeps before answering.
#[derive(Debug, Clone)]
pub struct SlowPromptEngine {
    pub delay: Duration,
}

impl SlowPromptEngine {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PromptEngine for SlowPromptEngine {
    fn name(&self) -> &str {
        "slow"
    }

    async fn run(&self, ctx: &PlanningContext) -> Result<CandidatePayload, GenerationError> {
        tokio::time::sleep(self.delay).await;
        StubPromptEngine::new().run(ctx).await
    }
}

/// Prompt engine that returns the same payload for every request.
#[derive(Debug, Clone)]
pub struct FixedPayloadEngine {
    pub payload: Value,
}

impl FixedPayloadEngine {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl PromptEngine for FixedPayloadEngine {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn run(&self, _ctx: &PlanningContext) -> Result<CandidatePayload, GenerationError> {
        Ok(self.payload.clone())
    }
}

/// Validator that rejects everything with a fixed failure and records the
/// planning context it was handed.
#[derive(Debug, Default)]
pub struct RecordingValidator {
    seen: std::sync::Mutex<Vec<PlanningContext>>,
}

impl RecordingValidator {
    pub fn seen(&self) -> Vec<PlanningContext> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PlanValidator for RecordingValidator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn validate(
        &self,
        ctx: &PlanningContext,
        _candidate: CandidatePayload,
    ) -> Result<ValidatedPayload, PlanValidationFailure> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(ctx.clone());
        }
        Err(PlanValidationFailure::new("RECORDED", "recording validator rejects all"))
    }
}

// ---------------------------------------------------------------------------
// Backend sets
// ---------------------------------------------------------------------------

pub fn failing_context_backends(message: &str) -> Backends {
    Backends::stub().with_context(Arc::new(FailingContextDriver::new(message)))
}

pub fn failing_engine_backends(message: &str) -> Backends {
    Backends::stub().with_engine(Arc::new(FailingPromptEngine::new(message)))
}

/// Stub context and validator with an engine that returns `payload`.
pub fn fixed_payload_backends(payload: Value) -> Backends {
    Backends::stub().with_engine(Arc::new(FixedPayloadEngine::new(payload)))
}

pub fn missing_fixture_backends(path: &str) -> Backends {
    Backends::stub().with_context(Arc::new(MissingFixtureContextDriver::new(path)))
}

pub fn slow_engine_backends(delay: Duration) -> Backends {
    Backends::stub().with_engine(Arc::new(SlowPromptEngine::new(delay)))
}
