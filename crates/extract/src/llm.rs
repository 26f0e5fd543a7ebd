use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::ExtractError;
use crate::prompt;
use crate::retry::{RetryPolicy, Transient};

/// What a capability call is for. Doubles as the schema hint handed to the
/// backend and as the stage name in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    Topic,
    Events,
    Relationships,
    Score,
}

impl GenerationTask {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationTask::Topic => "topic extraction",
            GenerationTask::Events => "event extraction",
            GenerationTask::Relationships => "relationship extraction",
            GenerationTask::Score => "evidence scoring",
        }
    }

    /// Whether the backend should be asked for JSON output.
    pub fn expects_json(self) -> bool {
        !matches!(self, GenerationTask::Topic)
    }
}

impl fmt::Display for GenerationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    pub prompt: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("cancelled")]
    Cancelled,
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Malformed(_) => true,
            LlmError::Status(code) => *code == 429 || *code >= 500,
            LlmError::Rejected(_) | LlmError::Cancelled => false,
        }
    }
}

/// Remote text extraction / classification capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    fn name(&self) -> &str {
        "language-model"
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(120))
    }

    pub fn with_timeout(base_url: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.1,
            client,
        }
    }

    pub fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }

    /// Reachability check used by `GET /health`.
    pub async fn ping(&self) -> Result<(), LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format: request.task.expects_json().then_some("json"), // Force JSON output
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() && status.as_u16() != 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Rejected(format!("{status}: {detail}")));
        }
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(ollama_response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Strip markdown code fences some models wrap around JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Call the model and decode its answer into `T`, retrying transient failures.
/// An answer that does not decode gets one repair round-trip before the attempt
/// counts as failed.
pub async fn generate_structured<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    task: GenerationTask,
    prompt: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, ExtractError> {
    let request = GenerationRequest {
        task,
        prompt: prompt.to_string(),
    };

    policy
        .retry(task.as_str(), || async {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            let response = model.generate(&request).await?;
            let first_error = match serde_json::from_str::<T>(strip_code_fences(&response)) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => e,
            };

            debug!(task = %task, error = %first_error, "Response did not decode, asking for a repair");
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let repair = GenerationRequest {
                task,
                prompt: prompt::build_retry_prompt(&response),
            };
            let corrected = model.generate(&repair).await?;
            serde_json::from_str::<T>(strip_code_fences(&corrected))
                .map_err(|e| LlmError::Malformed(e.to_string()))
        })
        .await
        .map_err(|failure| ExtractError::from_llm(task, failure.attempts, failure.error))
}

/// Plain-text variant for prompts that do not ask for JSON.
pub async fn generate_text(
    model: &dyn LanguageModel,
    task: GenerationTask,
    prompt: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, ExtractError> {
    let request = GenerationRequest {
        task,
        prompt: prompt.to_string(),
    };

    policy
        .retry(task.as_str(), || async {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let text = model.generate(&request).await?;
            if text.trim().is_empty() {
                warn!(task = %task, "Empty completion");
                return Err(LlmError::Malformed("empty completion".to_string()));
            }
            Ok(text)
        })
        .await
        .map_err(|failure| ExtractError::from_llm(task, failure.attempts, failure.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(request.prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Rejected("script exhausted".to_string())))
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(LlmError::Status(503).is_transient());
        assert!(LlmError::Status(429).is_transient());
        assert!(!LlmError::Rejected("400".into()).is_transient());
        assert!(!LlmError::Cancelled.is_transient());
    }

    #[tokio::test]
    async fn invalid_json_gets_a_repair_round_trip() {
        let model = Scripted::new(vec![
            Ok("{value: 1".to_string()),
            Ok("{\"value\": 1}".to_string()),
        ]);
        let policy = RetryPolicy::immediate(2);
        let parsed: Payload = generate_structured(
            &model,
            GenerationTask::Events,
            "prompt",
            &policy,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(parsed, Payload { value: 1 });
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("Fix this JSON"));
    }

    #[tokio::test]
    async fn transient_failures_exhaust_into_unavailable() {
        let model = Scripted::new(vec![
            Err(LlmError::Transport("connection reset".into())),
            Err(LlmError::Status(502)),
            Err(LlmError::Transport("connection reset".into())),
        ]);
        let policy = RetryPolicy::immediate(2);
        let err = generate_structured::<Payload>(
            &model,
            GenerationTask::Score,
            "prompt",
            &policy,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            ExtractError::Unavailable { task, attempts, .. } => {
                assert_eq!(task, GenerationTask::Score);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn persistent_garbage_is_an_invalid_response() {
        let model = Scripted::new(vec![
            Ok("not json".to_string()),
            Ok("still not json".to_string()),
            Ok("nope".to_string()),
            Ok("nope".to_string()),
        ]);
        let err = generate_structured::<Payload>(
            &model,
            GenerationTask::Relationships,
            "prompt",
            &RetryPolicy::immediate(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            ExtractError::InvalidResponse { task, reason } => {
                assert_eq!(task, GenerationTask::Relationships);
                assert!(reason.contains("after 2 attempt(s)"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(model.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let model = Scripted::new(vec![Err(LlmError::Rejected("400 Bad Request: unknown model".into()))]);
        let err = generate_text(
            &model,
            GenerationTask::Topic,
            "prompt",
            &RetryPolicy::immediate(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::InvalidResponse { task: GenerationTask::Topic, .. }));
        assert_eq!(model.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_runs_issue_no_calls() {
        let model = Scripted::new(vec![Ok("{\"value\": 1}".to_string())]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = generate_structured::<Payload>(
            &model,
            GenerationTask::Events,
            "prompt",
            &RetryPolicy::immediate(3),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::Cancelled { .. }));
        assert!(model.calls.lock().unwrap().is_empty());
    }
}
