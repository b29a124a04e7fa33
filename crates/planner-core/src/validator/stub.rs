//! Baseline structural validator.

use async_trait::async_trait;
use serde_json::Value;

use super::{PlanValidationFailure, PlanValidator};
use crate::models::{CandidatePayload, PlanningContext, ValidatedPayload};

/// Requires an object with string `request_id` and `plan_version` keys.
///
/// Checks run in a fixed order and the first failure wins:
///
/// 1. payload is an object (`INVALID_PAYLOAD_TYPE`)
/// 2. `request_id` present (`MISSING_REQUEST_ID`)
/// 3. `plan_version` present (`MISSING_PLAN_VERSION`)
/// 4. `request_id` is a string (`INVALID_REQUEST_ID_TYPE`)
/// 5. `plan_version` is a string (`INVALID_PLAN_VERSION_TYPE`)
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPlanValidator;

impl StubPlanValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run the structural checks. Does not consult the planning context.
    pub fn check(
        &self,
        candidate: CandidatePayload,
    ) -> Result<ValidatedPayload, PlanValidationFailure> {
        let map = match candidate {
            Value::Object(map) => map,
            other => {
                return Err(PlanValidationFailure::new(
                    "INVALID_PAYLOAD_TYPE",
                    format!("Expected object payload, got {}", json_type(&other)),
                ));
            }
        };

        let Some(request_id) = map.get("request_id") else {
            return Err(PlanValidationFailure::new(
                "MISSING_REQUEST_ID",
                "Payload missing required key: request_id",
            ));
        };
        let Some(plan_version) = map.get("plan_version") else {
            return Err(PlanValidationFailure::new(
                "MISSING_PLAN_VERSION",
                "Payload missing required key: plan_version",
            ));
        };
        if !request_id.is_string() {
            return Err(PlanValidationFailure::new(
                "INVALID_REQUEST_ID_TYPE",
                format!("request_id must be a string, got {}", json_type(request_id)),
            ));
        }
        if !plan_version.is_string() {
            return Err(PlanValidationFailure::new(
                "INVALID_PLAN_VERSION_TYPE",
                format!(
                    "plan_version must be a string, got {}",
                    json_type(plan_version)
                ),
            ));
        }

        Ok(ValidatedPayload::accept(map))
    }
}

/// JSON type name used in failure messages.
fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl PlanValidator for StubPlanValidator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn validate(
        &self,
        _ctx: &PlanningContext,
        candidate: CandidatePayload,
    ) -> Result<ValidatedPayload, PlanValidationFailure> {
        self.check(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_of(candidate: Value) -> String {
        StubPlanValidator.check(candidate).unwrap_err().code
    }

    #[test]
    fn accepts_minimal_payload_unchanged() {
        let candidate = json!({"request_id": "abc", "plan_version": "v1", "extra": [1, 2]});
        let validated = StubPlanValidator.check(candidate.clone()).unwrap();
        assert_eq!(serde_json::to_value(&validated).unwrap(), candidate);
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        for candidate in [json!(null), json!("text"), json!([1]), json!(3), json!(true)] {
            assert_eq!(code_of(candidate), "INVALID_PAYLOAD_TYPE");
        }
    }

    #[test]
    fn non_object_wins_over_missing_request_id() {
        // An array has no request_id either, but the type check runs first.
        let failure = StubPlanValidator.check(json!(["plan_version"])).unwrap_err();
        assert_eq!(failure.code, "INVALID_PAYLOAD_TYPE");
        assert_eq!(failure.message, "Expected object payload, got array");
    }

    #[test]
    fn missing_request_id() {
        assert_eq!(code_of(json!({"plan_version": "v1"})), "MISSING_REQUEST_ID");
        // Missing both: request_id is checked first.
        assert_eq!(code_of(json!({})), "MISSING_REQUEST_ID");
    }

    #[test]
    fn missing_plan_version_wins_over_bad_request_id_type() {
        assert_eq!(code_of(json!({"request_id": 7})), "MISSING_PLAN_VERSION");
    }

    #[test]
    fn request_id_type_checked_before_plan_version_type() {
        assert_eq!(
            code_of(json!({"request_id": 7, "plan_version": 1})),
            "INVALID_REQUEST_ID_TYPE"
        );
    }

    #[test]
    fn invalid_plan_version_type() {
        let failure = StubPlanValidator
            .check(json!({"request_id": "abc", "plan_version": null}))
            .unwrap_err();
        assert_eq!(failure.code, "INVALID_PLAN_VERSION_TYPE");
        assert_eq!(failure.message, "plan_version must be a string, got null");
    }
}
