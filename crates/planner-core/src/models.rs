//! Value types for the planning pipeline and their boundary validation.
//!
//! Inbound JSON is parsed with [`parse_plan_request`], which resolves a
//! `request_id` even when the body is rejected so that every error response
//! can carry one.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Git ref used when a coordinate omits one.
pub const DEFAULT_REF: &str = "refs/heads/main";

/// Placeholder for a context artifact with no data.
pub const EMPTY_ARTIFACT: &str = "{}";

// -----------------------------------------------------------------------
// Schema errors
// -----------------------------------------------------------------------

/// A request body that does not match the [`PlanRequest`] schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {detail}")]
    InvalidType { field: String, detail: String },

    #[error("{0} must not be empty or whitespace")]
    EmptyValue(String),
}

impl SchemaError {
    /// Machine-readable code for the error response.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedJson(_) => "MALFORMED_REQUEST",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::InvalidType { .. } => "INVALID_FIELD_TYPE",
            Self::EmptyValue(_) => "EMPTY_FIELD",
        }
    }

    /// Translate a serde error raised while decoding the object at `path`.
    ///
    /// Relies on serde's derive messages "missing field `x`" and
    /// "unknown field `x`, expected one of ...". Anything else is reported as
    /// an invalid type.
    fn from_serde(path: &str, err: serde_json::Error) -> Self {
        let text = err.to_string();
        if let Some(field) = backticked(&text, "missing field ") {
            Self::MissingField(format!("{path}.{field}"))
        } else if let Some(field) = backticked(&text, "unknown field ") {
            Self::UnknownField(format!("{path}.{field}"))
        } else {
            Self::InvalidType {
                field: path.to_string(),
                detail: text,
            }
        }
    }
}

/// Extract the first backtick-quoted name following `prefix`, as serde
/// formats its missing/unknown field messages.
fn backticked<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?.strip_prefix('`')?;
    rest.split('`').next()
}

fn require_text(field: &str, value: &str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        return Err(SchemaError::EmptyValue(field.to_string()));
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Inbound types
// -----------------------------------------------------------------------

/// A repository snapshot: `(owner, name, ref)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryCoordinate {
    pub owner: String,
    pub name: String,
    #[serde(
        rename = "ref",
        default = "default_ref",
        deserialize_with = "ref_or_default"
    )]
    pub git_ref: String,
}

fn default_ref() -> String {
    DEFAULT_REF.to_string()
}

fn ref_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_ref))
}

impl RepositoryCoordinate {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            git_ref: default_ref(),
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    /// The `owner/name` key used by context lookup tables.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_text("repository.owner", &self.owner)?;
        require_text("repository.name", &self.name)?;
        require_text("repository.ref", &self.git_ref)
    }
}

/// Client-supplied planning intent. Exactly these five keys are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    pub purpose: String,
    pub vision: String,
    pub must: Vec<String>,
    pub dont: Vec<String>,
    pub nice: Vec<String>,
}

impl UserInput {
    pub fn validate(&self) -> Result<(), SchemaError> {
        require_text("user_input.purpose", &self.purpose)?;
        require_text("user_input.vision", &self.vision)?;
        for (list, items) in [("must", &self.must), ("dont", &self.dont), ("nice", &self.nice)] {
            for (i, item) in items.iter().enumerate() {
                require_text(&format!("user_input.{list}[{i}]"), item)?;
            }
        }
        Ok(())
    }
}

/// Inbound request for `POST /v1/plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub repository: RepositoryCoordinate,
    pub user_input: UserInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl PlanRequest {
    /// Repositories contributing to this plan. The API carries exactly one.
    pub fn repositories(&self) -> &[RepositoryCoordinate] {
        std::slice::from_ref(&self.repository)
    }
}

/// A request body rejected at the boundary, with the `request_id` to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
    pub request_id: Uuid,
    pub error: SchemaError,
}

/// Parse and validate a raw `POST /v1/plan` body.
///
/// The client's `request_id` is echoed on rejection when it parses as a
/// UUID; otherwise a fresh one is generated.
pub fn parse_plan_request(body: &[u8]) -> Result<PlanRequest, RejectedRequest> {
    let value: Value = serde_json::from_slice(body).map_err(|e| RejectedRequest {
        request_id: Uuid::new_v4(),
        error: SchemaError::MalformedJson(e.to_string()),
    })?;
    plan_request_from_value(value)
}

/// Same as [`parse_plan_request`] for an already-decoded JSON value.
pub fn plan_request_from_value(value: Value) -> Result<PlanRequest, RejectedRequest> {
    let Value::Object(mut fields) = value else {
        return Err(RejectedRequest {
            request_id: Uuid::new_v4(),
            error: SchemaError::InvalidType {
                field: "body".to_string(),
                detail: "request body must be a JSON object".to_string(),
            },
        });
    };

    let (client_request_id, request_id_error) = match fields.remove("request_id") {
        None | Some(Value::Null) => (None, None),
        Some(Value::String(s)) => match Uuid::parse_str(&s) {
            Ok(id) => (Some(id), None),
            Err(e) => (None, Some(e.to_string())),
        },
        Some(other) => (None, Some(format!("expected a UUID string, got {other}"))),
    };
    let reject = |error| RejectedRequest {
        request_id: client_request_id.unwrap_or_else(Uuid::new_v4),
        error,
    };

    if let Some(detail) = request_id_error {
        return Err(reject(SchemaError::InvalidType {
            field: "request_id".to_string(),
            detail,
        }));
    }

    let repository: RepositoryCoordinate = take_section(&mut fields, "repository").map_err(reject)?;
    let user_input: UserInput = take_section(&mut fields, "user_input").map_err(reject)?;
    repository.validate().map_err(reject)?;
    user_input.validate().map_err(reject)?;

    Ok(PlanRequest {
        repository,
        user_input,
        request_id: client_request_id,
    })
}

/// Parse a bare coordinate body, as sent to the debug context route.
pub fn parse_coordinate(body: &[u8]) -> Result<RepositoryCoordinate, SchemaError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| SchemaError::MalformedJson(e.to_string()))?;
    let coordinate: RepositoryCoordinate = serde_json::from_value(value)
        .map_err(|e| SchemaError::from_serde("repository", e))?;
    coordinate.validate()?;
    Ok(coordinate)
}

fn take_section<T: serde::de::DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<T, SchemaError> {
    let value = fields
        .remove(key)
        .ok_or_else(|| SchemaError::MissingField(key.to_string()))?;
    serde_json::from_value(value).map_err(|e| SchemaError::from_serde(key, e))
}

// -----------------------------------------------------------------------
// Internal artifacts
// -----------------------------------------------------------------------

/// Context artifacts for one repository. Produced only by a context driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub tree_json: String,
    pub dependency_json: String,
    pub summary_json: String,
}

impl ProjectContext {
    /// A context for `repo` with every artifact set to `"{}"`.
    pub fn empty(repo: &RepositoryCoordinate) -> Self {
        Self {
            repo_owner: repo.owner.clone(),
            repo_name: repo.name.clone(),
            git_ref: repo.git_ref.clone(),
            tree_json: EMPTY_ARTIFACT.to_string(),
            dependency_json: EMPTY_ARTIFACT.to_string(),
            summary_json: EMPTY_ARTIFACT.to_string(),
        }
    }
}

/// Everything generation and validation see for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanningContext {
    pub request_id: Uuid,
    pub user_input: UserInput,
    pub projects: Vec<ProjectContext>,
}

/// Raw prompt engine output. Untrusted until validated.
pub type CandidatePayload = Value;

/// A candidate that passed structural validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPayload(Map<String, Value>);

impl ValidatedPayload {
    /// Wrap a map that a validator has accepted.
    pub fn accept(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

// -----------------------------------------------------------------------
// Outbound types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Ok,
}

/// Successful response for `POST /v1/plan`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanResponse {
    pub request_id: Uuid,
    pub run_id: Uuid,
    pub status: PlanStatus,
    pub payload: ValidatedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Failure response. Never carries a `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub request_id: Uuid,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
            request_id,
        }
    }
}
