use crate::llm::{GenerationTask, LlmError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    /// Nothing usable came back from the document
    #[error("no key events extracted: {reason}")]
    Empty { reason: String },

    /// The capability kept failing until the retry budget ran out
    #[error("{task} unavailable after {attempts} attempt(s): {reason}")]
    Unavailable {
        task: GenerationTask,
        attempts: usize,
        reason: String,
    },

    /// The capability answered, but the answer cannot be used
    #[error("{task} returned an unusable response: {reason}")]
    InvalidResponse { task: GenerationTask, reason: String },

    #[error("run cancelled before {task}")]
    Cancelled { task: GenerationTask },
}

impl ExtractError {
    pub fn from_llm(task: GenerationTask, attempts: usize, error: LlmError) -> Self {
        match &error {
            LlmError::Cancelled => ExtractError::Cancelled { task },
            // The backend answered, but not usably
            LlmError::Rejected(_) | LlmError::Malformed(_) => ExtractError::InvalidResponse {
                task,
                reason: format!("{error} (after {attempts} attempt(s))"),
            },
            other => ExtractError::Unavailable {
                task,
                attempts,
                reason: other.to_string(),
            },
        }
    }

    pub fn task(&self) -> Option<GenerationTask> {
        match self {
            ExtractError::Empty { .. } => Some(GenerationTask::Events),
            ExtractError::Unavailable { task, .. }
            | ExtractError::InvalidResponse { task, .. }
            | ExtractError::Cancelled { task } => Some(*task),
        }
    }
}
