pub fn build_event_prompt(topic: &str, chunk_text: &str) -> String {
    format!(
        r#"Extract chemical-agnostic key events of an adverse outcome pathway related to {topic} from the following text.

INSTRUCTIONS:
1. Identify discrete, measurable biological events described in the text
2. Start from the biologically active form interacting with its molecular target; skip exposure and metabolism steps
3. Classify each event and assign its level of biological organisation
4. Output ONLY valid JSON, nothing else
5. Use the exact schema below

SCHEMA:
{{
  "events": [
    {{"name": "Increased CYP1A1 expression in hepatocytes", "description": "brief canonical description", "event_type": "MIE|KE|AO", "biological_level": "molecular|cellular|tissue|organ|organism|population", "organ": "liver", "evidence": ["direct quote from text"]}}
  ]
}}

RULES:
- Names follow "[Direction] of [Entity] in [Location]", e.g. "Activation of aryl hydrocarbon receptor", "Apoptosis of granulosa cells"
- Never mention specific chemicals, doses or species in names or descriptions
- MIE: the first molecular interaction, always molecular level
- KE: intermediate measurable change at any level
- AO: the final harmful outcome, usually organism or population level
- Hormone levels in blood are molecular; hormone secretion is organ level; behaviour and disease are organism level
- Evidence entries must be direct quotes from the text
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{chunk_text}

JSON OUTPUT:"#
    )
}

pub fn build_relationship_prompt(chunk_text: &str, events_json: &str) -> String {
    format!(
        r#"Identify "leads_to" relationships between the key events below, using only what the text states.

INSTRUCTIONS:
1. Propose an edge only when the text supports that the upstream event causes or precedes the downstream event
2. Every edge needs an excerpt: a direct quote from the text that substantiates it
3. Use the event ids exactly as given
4. Output ONLY valid JSON, nothing else

SCHEMA:
{{
  "relationships": [
    {{"source_event_id": "E1", "target_event_id": "E2", "excerpt": "quote from text"}}
  ]
}}

RULES:
- Build the causal chain from the MIE through intermediate KEs to the AO
- Relationships go from a lower or equal level of biological organisation to a higher one
- Prefer gradual progression (molecular -> cellular -> tissue -> organ -> organism) when intermediate events exist
- No self-references; no edges without an excerpt
- Output ONLY the JSON object, no markdown, no explanations

EVENTS:
{events_json}

TEXT:
{chunk_text}

JSON OUTPUT:"#
    )
}

pub fn build_score_prompt(source_label: &str, target_label: &str, excerpt: &str) -> String {
    format!(
        r#"Score the evidence strength (0-1) that the excerpt supports a causal relationship from the upstream event to the downstream event.

SCORING:
0.9-1.0: strong causal evidence (dose-response, temporal sequence, mechanism explained, quantitative)
0.6-0.8: strong association (mechanistic plausibility, consistent observations)
0.3-0.5: suggestive evidence (correlation, non-significant trends, limited mechanistic data)
0.0-0.2: weak or speculative (indirect connection, hypothetical)

Consider the strength of causal language ("causes" > "associated with" > "correlated with"), dose-response, temporal sequence, mechanism and quantitative measurements.

SCHEMA:
{{"strength_score": 0.0, "justification": "one or two sentences"}}

UPSTREAM: {source_label}
DOWNSTREAM: {target_label}
EXCERPT: {excerpt}

JSON OUTPUT:"#
    )
}

pub fn build_topic_prompt(user_query: &str) -> String {
    format!(
        r#"Extract only the topic name from the following query. Return ONLY the topic name, nothing else, no explanation.

Query: {user_query}

Topic:"#
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
