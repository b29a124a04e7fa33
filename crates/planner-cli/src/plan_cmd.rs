//! One-shot pipeline commands: `planner plan <file>` and `planner context`.
//!
//! Both run against the same backends the server would use and print JSON
//! to stdout.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use planner_core::auth::CallerContext;
use planner_core::models::{RepositoryCoordinate, parse_plan_request};
use planner_core::{Orchestrator, PlanFailure};

/// Run the pipeline on the request in `path`.
///
/// Returns the JSON body the HTTP route would have returned, and whether the
/// request succeeded. Only I/O errors are returned as `Err`.
pub async fn run_plan_file(orchestrator: &Orchestrator, path: &Path) -> Result<(bool, Value)> {
    let body = std::fs::read(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;

    let outcome = match parse_plan_request(&body) {
        Ok(request) => {
            orchestrator
                .process(request, &CallerContext::anonymous())
                .await
        }
        Err(rejected) => Err(PlanFailure::from(rejected)),
    };

    let rendered = match outcome {
        Ok(response) => (true, serde_json::to_value(response)?),
        Err(failure) => (false, serde_json::to_value(failure.to_response())?),
    };
    Ok(rendered)
}

/// Execute `planner plan <file>`. Returns `false` when the request failed.
pub async fn cmd_plan(orchestrator: &Orchestrator, path: &Path) -> Result<bool> {
    let (ok, body) = run_plan_file(orchestrator, path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(ok)
}

/// Execute `planner context --owner --name [--ref]`.
pub async fn cmd_context(
    orchestrator: &Orchestrator,
    owner: &str,
    name: &str,
    git_ref: Option<&str>,
) -> Result<()> {
    let mut coordinate = RepositoryCoordinate::new(owner, name);
    if let Some(git_ref) = git_ref {
        coordinate = coordinate.with_ref(git_ref);
    }
    coordinate.validate()?;

    let context = orchestrator
        .debug_fetch(&coordinate)
        .await
        .with_context(|| format!("context fetch failed for {}", coordinate.slug()))?;
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}
