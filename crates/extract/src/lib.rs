pub mod cancel;
pub mod error;
pub mod events;
pub mod excerpt;
pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod relationships;
pub mod retry;
pub mod schema;

pub use cancel::CancellationToken;
pub use error::ExtractError;
pub use events::EventExtractor;
pub use llm::{
    GenerationRequest, GenerationTask, LanguageModel, LlmError, OllamaClient, generate_structured,
    generate_text,
};
pub use normalizer::{LabelNormalizer, NormalizedLabel};
pub use relationships::{RelationshipConfig, RelationshipExtractor};
pub use retry::{RetryFailure, RetryPolicy, Transient};
pub use schema::{
    BiologicalLevel, EventEvidence, EventExtraction, EventId, EventType, KeyEvent,
    ProposedRelationship, RejectedRelationship, RelationshipExtraction,
};
