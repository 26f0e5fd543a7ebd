use async_trait::async_trait;
use extract::prompt::build_score_prompt;
use extract::{CancellationToken, GenerationTask, LanguageModel, RetryPolicy, generate_structured};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::{EvidenceScorer, Score, ScoreError, ScoreRequest};

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    strength_score: f64,
    #[serde(default)]
    justification: String,
}

/// Asks the language model to grade each excerpt.
pub struct ModelScorer {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    min_strength: f64,
}

impl ModelScorer {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self {
            model,
            retry,
            min_strength: 0.2,
        }
    }

    /// Scores below this are treated as unsupported.
    pub fn with_min_strength(mut self, min_strength: f64) -> Self {
        self.min_strength = min_strength;
        self
    }
}

#[async_trait]
impl EvidenceScorer for ModelScorer {
    async fn score(
        &self,
        request: &ScoreRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Score>, ScoreError> {
        let prompt = build_score_prompt(&request.source_label, &request.target_label, &request.excerpt);
        let response: ScoreResponse = generate_structured(
            self.model.as_ref(),
            GenerationTask::Score,
            &prompt,
            &self.retry,
            cancel,
        )
        .await?;

        let value = response.strength_score;
        if !(0.0..=1.0).contains(&value) {
            return Err(ScoreError::OutOfRange { value });
        }
        if value < self.min_strength {
            debug!(strength = value, "Model judged the excerpt unsupported");
            return Ok(None);
        }

        Ok(Some(Score {
            strength: value,
            justification: response.justification.trim().to_string(),
        }))
    }

    fn name(&self) -> &str {
        "model"
    }
}
