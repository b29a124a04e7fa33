//! Validator that cross-checks the payload against its planning context.

use async_trait::async_trait;
use serde_json::Value;

use super::stub::StubPlanValidator;
use super::{PlanValidationFailure, PlanValidator};
use crate::models::{CandidatePayload, PlanningContext, ValidatedPayload};

/// Baseline checks, then `request_id` must echo `ctx.request_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPlanValidator {
    baseline: StubPlanValidator,
}

impl StrictPlanValidator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanValidator for StrictPlanValidator {
    fn name(&self) -> &str {
        "strict"
    }

    async fn validate(
        &self,
        ctx: &PlanningContext,
        candidate: CandidatePayload,
    ) -> Result<ValidatedPayload, PlanValidationFailure> {
        let validated = self.baseline.check(candidate)?;

        let expected = ctx.request_id.to_string();
        let echoed = validated
            .get("request_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if echoed != expected {
            return Err(PlanValidationFailure::new(
                "REQUEST_ID_MISMATCH",
                format!("Payload request_id {echoed} does not match request {expected}"),
            ));
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserInput;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> PlanningContext {
        PlanningContext {
            request_id: Uuid::new_v4(),
            user_input: UserInput {
                purpose: "p".to_string(),
                vision: "v".to_string(),
                must: vec![],
                dont: vec![],
                nice: vec![],
            },
            projects: vec![],
        }
    }

    #[tokio::test]
    async fn matching_request_id_is_accepted() {
        let ctx = ctx();
        let candidate = json!({"request_id": ctx.request_id.to_string(), "plan_version": "v"});
        assert!(StrictPlanValidator::new().validate(&ctx, candidate).await.is_ok());
    }

    #[tokio::test]
    async fn mismatched_request_id_is_rejected() {
        let ctx = ctx();
        let candidate = json!({"request_id": Uuid::new_v4().to_string(), "plan_version": "v"});
        let failure = StrictPlanValidator::new()
            .validate(&ctx, candidate)
            .await
            .unwrap_err();
        assert_eq!(failure.code, "REQUEST_ID_MISMATCH");
    }

    #[tokio::test]
    async fn baseline_failures_come_first() {
        let failure = StrictPlanValidator::new()
            .validate(&ctx(), json!("nope"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, "INVALID_PAYLOAD_TYPE");
    }
}
