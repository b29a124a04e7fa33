//! Deterministic prompt engine used when no real backend is configured.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{GenerationError, PromptEngine};
use crate::models::{CandidatePayload, PlanningContext};

/// `plan_version` emitted by [`StubPromptEngine`].
pub const STUB_PLAN_VERSION: &str = "af/1.1-stub";

/// Characters of `purpose` kept in the prompt preview.
const PREVIEW_PURPOSE_CHARS: usize = 50;

/// Prompt engine that echoes its input back as a plan payload.
///
/// The payload mirrors `request_id`, `user_input` and every project context
/// so a validator can cross-check them. Only `projects[0]` feeds the
/// `repository` and `prompt_preview` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPromptEngine;

impl StubPromptEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build the payload without going through the async trait.
    pub fn generate(&self, ctx: &PlanningContext) -> Value {
        let request_id = ctx.request_id.to_string();

        let (repository, repo_str) = match ctx.projects.first() {
            Some(p) => (
                json!({"owner": p.repo_owner, "name": p.repo_name, "ref": p.git_ref}),
                format!("{}/{}", p.repo_owner, p.repo_name),
            ),
            None => (
                json!({"owner": "", "name": "", "ref": ""}),
                "unknown/unknown".to_string(),
            ),
        };

        tracing::info!(
            request_id = %request_id,
            repository = %repo_str,
            "stub_prompt_engine_run"
        );

        json!({
            "request_id": request_id,
            "plan_version": STUB_PLAN_VERSION,
            "repository": repository,
            "user_input": ctx.user_input,
            "context": ctx.projects,
            "status": "success",
            "prompt_preview": prompt_preview(&repo_str, &ctx.user_input.purpose),
        })
    }
}

fn prompt_preview(repo: &str, purpose: &str) -> String {
    let mut preview = format!("[STUB] Planning request for {repo}: ");
    if purpose.chars().count() > PREVIEW_PURPOSE_CHARS {
        preview.extend(purpose.chars().take(PREVIEW_PURPOSE_CHARS));
        preview.push_str("...");
    } else {
        preview.push_str(purpose);
    }
    preview
}

#[async_trait]
impl PromptEngine for StubPromptEngine {
    fn name(&self) -> &str {
        "stub"
    }

    async fn run(&self, ctx: &PlanningContext) -> Result<CandidatePayload, GenerationError> {
        Ok(self.generate(ctx))
    }
}
