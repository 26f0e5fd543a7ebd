use extract::prompt::build_topic_prompt;
use extract::{CancellationToken, ExtractError, GenerationTask, LanguageModel, RetryPolicy, generate_text};
use tracing::{debug, warn};

pub const DEFAULT_TOPIC: &str = "unspecified stressor";

/// Pick the report topic: an explicit topic, else one extracted from the
/// user query, else the document title, else [`DEFAULT_TOPIC`].
///
/// A failed extraction falls back to the title. Cancellation does not.
pub async fn resolve_topic(
    model: &dyn LanguageModel,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    topic: Option<&str>,
    query: Option<&str>,
    title: Option<&str>,
) -> Result<String, ExtractError> {
    if let Some(topic) = non_blank(topic) {
        return Ok(topic.to_string());
    }

    if let Some(query) = non_blank(query) {
        match generate_text(model, GenerationTask::Topic, &build_topic_prompt(query), policy, cancel).await {
            Ok(raw) => {
                if let Some(topic) = clean_topic(&raw) {
                    debug!(%topic, "Topic extracted from query");
                    return Ok(topic);
                }
            }
            Err(e @ ExtractError::Cancelled { .. }) => return Err(e),
            Err(e) => warn!(error = %e, "Topic extraction failed, falling back"),
        }
    }

    Ok(non_blank(title).unwrap_or(DEFAULT_TOPIC).to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// First line of the answer with surrounding quotes removed.
fn clean_topic(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("Topic:").unwrap_or(line);
    let topic = line.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”')).trim();
    (!topic.is_empty()).then(|| topic.to_string())
}
