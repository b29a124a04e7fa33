//! Per-request pipeline states.

use std::fmt;

use uuid::Uuid;

/// State of a single plan request.
///
/// ```text
/// received        -> context_fetched
/// received        -> context_failed
/// context_fetched -> generated
/// context_fetched -> generation_failed
/// generated       -> validated
/// generated       -> validation_failed
/// validated       -> completed
/// ```
///
/// `completed` and every `*_failed` state are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Received,
    ContextFetched,
    Generated,
    Validated,
    Completed,
    ContextFailed,
    GenerationFailed,
    ValidationFailed,
}

impl PipelineState {
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Received, Self::ContextFetched)
                | (Self::Received, Self::ContextFailed)
                | (Self::ContextFetched, Self::Generated)
                | (Self::ContextFetched, Self::GenerationFailed)
                | (Self::Generated, Self::Validated)
                | (Self::Generated, Self::ValidationFailed)
                | (Self::Validated, Self::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::ContextFailed | Self::GenerationFailed | Self::ValidationFailed
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::ContextFetched => "context_fetched",
            Self::Generated => "generated",
            Self::Validated => "validated",
            Self::Completed => "completed",
            Self::ContextFailed => "context_failed",
            Self::GenerationFailed => "generation_failed",
            Self::ValidationFailed => "validation_failed",
        };
        f.write_str(s)
    }
}

/// Tracks the state of one request as it moves through the pipeline.
#[derive(Debug)]
pub(crate) struct PipelineRun {
    request_id: Uuid,
    state: PipelineState,
}

impl PipelineRun {
    pub(crate) fn start(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: PipelineState::Received,
        }
    }

    pub(crate) fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: PipelineState) {
        debug_assert!(
            PipelineState::is_valid_transition(self.state, to),
            "invalid pipeline transition: {} -> {}",
            self.state,
            to
        );
        tracing::debug!(
            request_id = %self.request_id,
            from = %self.state,
            to = %to,
            "pipeline_transition"
        );
        self.state = to;
    }
}
