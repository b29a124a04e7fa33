//! Core of the planner service: the request pipeline that turns a
//! [`models::PlanRequest`] into a validated [`models::PlanResponse`].
//!
//! ```text
//! PlanRequest
//!     |
//!     v
//! ContextDriver::fetch_context (per repository)
//!     |
//!     v
//! PlanningContext --> PromptEngine::run --> PlanValidator::validate
//!                                                 |
//!                                                 v
//!                                   PlanResponse | PlanFailure
//! ```
//!
//! Capabilities are trait objects selected at startup through
//! [`backends::BackendRegistry`] and injected into
//! [`orchestrator::Orchestrator`].

pub mod auth;
pub mod backends;
pub mod context;
pub mod engine;
pub mod models;
pub mod orchestrator;
pub mod validator;

pub use backends::{BackendRegistry, BackendSelection, Backends};
pub use orchestrator::{FailureKind, Orchestrator, PipelineError, PlanFailure};
