use extract::{EventId, ExtractError, RejectedRelationship};
use pathway::{DropReason, DroppedRelationship, NoPathway};
use score::ScoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage, used to say where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Topic,
    Events,
    Relationships,
    Scoring,
    Assembly,
    Selection,
    Report,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Topic => "topic extraction",
            Stage::Events => "event extraction",
            Stage::Relationships => "relationship extraction",
            Stage::Scoring => "evidence scoring",
            Stage::Assembly => "graph assembly",
            Stage::Selection => "pathway selection",
            Stage::Report => "report rendering",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal run errors. A run that fails produces no report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} produced nothing: {reason}")]
    ExtractionEmpty { stage: Stage, reason: String },

    #[error("{stage} unavailable after {attempts} attempt(s): {reason}")]
    ExtractionUnavailable {
        stage: Stage,
        attempts: usize,
        reason: String,
    },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("{stage} returned an unusable response: {reason}")]
    InvalidResponse { stage: Stage, reason: String },
}

impl PipelineError {
    pub fn from_extract(stage: Stage, error: ExtractError) -> Self {
        match error {
            ExtractError::Empty { reason } => PipelineError::ExtractionEmpty { stage, reason },
            ExtractError::Unavailable { attempts, reason, .. } => PipelineError::ExtractionUnavailable {
                stage,
                attempts,
                reason,
            },
            ExtractError::InvalidResponse { reason, .. } => PipelineError::InvalidResponse { stage, reason },
            ExtractError::Cancelled { .. } => PipelineError::Cancelled { stage },
        }
    }

    pub fn from_score(error: ScoreError) -> Self {
        match error {
            ScoreError::Capability(inner) => Self::from_extract(Stage::Scoring, inner),
            other @ ScoreError::OutOfRange { .. } => PipelineError::InvalidResponse {
                stage: Stage::Scoring,
                reason: other.to_string(),
            },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ExtractionEmpty { stage, .. }
            | PipelineError::ExtractionUnavailable { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::InvalidResponse { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedEdge {
    pub source: EventId,
    pub target: EventId,
    pub strength: f64,
}

/// Problems that did not stop the run, carried on its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    CycleDetected { dropped: Vec<DroppedEdge> },
    NoPathwayFound { reason: String },
    InvalidRelationship { source: String, target: String, reason: String },
    UnsupportedRelationship { source: EventId, target: EventId },
}

impl RunWarning {
    pub fn no_pathway(reason: NoPathway) -> Self {
        RunWarning::NoPathwayFound {
            reason: reason.to_string(),
        }
    }

    pub fn rejected(rejected: &RejectedRelationship) -> Self {
        RunWarning::InvalidRelationship {
            source: rejected.source.clone(),
            target: rejected.target.clone(),
            reason: rejected.reason.clone(),
        }
    }

    /// Assembly drops, with every cycle break folded into one warning.
    pub fn from_drops(drops: &[DroppedRelationship]) -> Vec<Self> {
        let mut warnings = Vec::new();
        let mut cycle = Vec::new();

        for drop in drops {
            match drop.reason {
                DropReason::Unsupported => warnings.push(RunWarning::UnsupportedRelationship {
                    source: drop.source_id,
                    target: drop.target_id,
                }),
                DropReason::UnknownEndpoint => warnings.push(RunWarning::InvalidRelationship {
                    source: drop.source_id.to_string(),
                    target: drop.target_id.to_string(),
                    reason: "endpoint is not a retained event".to_string(),
                }),
                DropReason::SelfLoop => warnings.push(RunWarning::InvalidRelationship {
                    source: drop.source_id.to_string(),
                    target: drop.target_id.to_string(),
                    reason: "endpoints merged into one event".to_string(),
                }),
                DropReason::Cycle { strength } => cycle.push(DroppedEdge {
                    source: drop.source_id,
                    target: drop.target_id,
                    strength,
                }),
            }
        }

        if !cycle.is_empty() {
            warnings.push(RunWarning::CycleDetected { dropped: cycle });
        }
        warnings
    }
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::CycleDetected { dropped } => {
                write!(f, "Cycle detected; dropped ")?;
                for (i, edge) in dropped.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} → {} ({:.2})", edge.source, edge.target, edge.strength)?;
                }
                Ok(())
            }
            RunWarning::NoPathwayFound { reason } => write!(f, "No pathway found: {reason}"),
            RunWarning::InvalidRelationship { source, target, reason } => {
                write!(f, "Invalid relationship {source} → {target}: {reason}")
            }
            RunWarning::UnsupportedRelationship { source, target } => {
                write!(f, "Unsupported relationship {source} → {target}: excerpt does not support it")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::GenerationTask;

    #[test]
    fn extract_errors_keep_their_meaning() {
        let err = PipelineError::from_extract(
            Stage::Events,
            ExtractError::Unavailable {
                task: GenerationTask::Events,
                attempts: 4,
                reason: "status 503".to_string(),
            },
        );
        assert!(matches!(
            err,
            PipelineError::ExtractionUnavailable { stage: Stage::Events, attempts: 4, .. }
        ));
        assert_eq!(err.to_string(), "event extraction unavailable after 4 attempt(s): status 503");
    }

    #[test]
    fn cycle_breaks_fold_into_one_warning() {
        let drops = vec![
            DroppedRelationship {
                source_id: EventId(3),
                target_id: EventId(1),
                reason: DropReason::Cycle { strength: 0.4 },
            },
            DroppedRelationship {
                source_id: EventId(1),
                target_id: EventId(4),
                reason: DropReason::Unsupported,
            },
            DroppedRelationship {
                source_id: EventId(5),
                target_id: EventId(2),
                reason: DropReason::Cycle { strength: 0.3 },
            },
        ];

        let warnings = RunWarning::from_drops(&drops);
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[1].to_string(),
            "Cycle detected; dropped E3 → E1 (0.40), E5 → E2 (0.30)"
        );
    }
}
