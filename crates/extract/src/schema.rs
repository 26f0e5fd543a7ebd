use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Run-scoped key event identifier, rendered as `E{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl EventId {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = String;

    /// Accepts `E3`, `e3` and `3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('E')
            .or_else(|| trimmed.strip_prefix('e'))
            .unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(EventId)
            .ok_or_else(|| format!("not an event id: {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Molecular initiating event
    MIE,
    /// Intermediate key event
    KE,
    /// Adverse outcome
    AO,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::MIE, EventType::KE, EventType::AO];

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "MIE" | "MOLECULAR INITIATING EVENT" => Some(EventType::MIE),
            "KE" | "KEY EVENT" => Some(EventType::KE),
            "AO" | "ADVERSE OUTCOME" => Some(EventType::AO),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::MIE => "MIE",
            EventType::KE => "KE",
            EventType::AO => "AO",
        }
    }

    pub fn plural_name(self) -> &'static str {
        match self {
            EventType::MIE => "Molecular Initiating Events",
            EventType::KE => "Key Events",
            EventType::AO => "Adverse Outcomes",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of biological organisation, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiologicalLevel {
    Molecular,
    Cellular,
    Tissue,
    Organ,
    Organism,
    Population,
}

impl BiologicalLevel {
    pub const ALL: [BiologicalLevel; 6] = [
        BiologicalLevel::Molecular,
        BiologicalLevel::Cellular,
        BiologicalLevel::Tissue,
        BiologicalLevel::Organ,
        BiologicalLevel::Organism,
        BiologicalLevel::Population,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BiologicalLevel::Molecular => "molecular",
            BiologicalLevel::Cellular => "cellular",
            BiologicalLevel::Tissue => "tissue",
            BiologicalLevel::Organ => "organ",
            BiologicalLevel::Organism => "organism",
            BiologicalLevel::Population => "population",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BiologicalLevel::Molecular => "Molecular",
            BiologicalLevel::Cellular => "Cellular",
            BiologicalLevel::Tissue => "Tissue",
            BiologicalLevel::Organ => "Organ",
            BiologicalLevel::Organism => "Organism",
            BiologicalLevel::Population => "Population",
        }
    }

    /// Map free text onto a level by keyword. Order matters: "subcellular"
    /// must resolve before "cellular", "organism" before "organ".
    fn match_keywords(text: &str) -> Option<Self> {
        const KEYWORDS: &[(&str, BiologicalLevel)] = &[
            ("population", BiologicalLevel::Population),
            ("subcellular", BiologicalLevel::Molecular),
            ("sub-cellular", BiologicalLevel::Molecular),
            ("molecul", BiologicalLevel::Molecular),
            ("gene", BiologicalLevel::Molecular),
            ("protein", BiologicalLevel::Molecular),
            ("receptor", BiologicalLevel::Molecular),
            ("enzyme", BiologicalLevel::Molecular),
            ("organism", BiologicalLevel::Organism),
            ("individual", BiologicalLevel::Organism),
            ("systemic", BiologicalLevel::Organism),
            ("whole body", BiologicalLevel::Organism),
            ("cell", BiologicalLevel::Cellular),
            ("tissue", BiologicalLevel::Tissue),
            ("organ", BiologicalLevel::Organ),
        ];

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        KEYWORDS
            .iter()
            .find(|(keyword, _)| {
                if keyword.contains([' ', '-']) {
                    lower.contains(keyword)
                } else {
                    words.iter().any(|w| w.starts_with(keyword))
                }
            })
            .map(|(_, level)| *level)
    }

    /// Resolve the level reported by extraction. Unknown or missing values
    /// fall back to the closest applicable level instead of failing.
    pub fn resolve(raw: Option<&str>, label: &str, event_type: EventType) -> Self {
        if let Some(raw) = raw {
            let trimmed = raw.trim().to_lowercase();
            if let Some(level) = Self::ALL.iter().find(|l| l.as_str() == trimmed) {
                return *level;
            }
            if let Some(level) = Self::match_keywords(&trimmed) {
                return level;
            }
        }

        match event_type {
            EventType::MIE => BiologicalLevel::Molecular,
            EventType::AO => BiologicalLevel::Organism,
            EventType::KE => Self::match_keywords(label).unwrap_or(BiologicalLevel::Cellular),
        }
    }
}

impl fmt::Display for BiologicalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub id: EventId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organ: Option<String>,
    pub event_type: EventType,
    pub biological_level: BiologicalLevel,
    /// Filled in by graph assembly; zero on fresh candidates
    #[serde(default)]
    pub evidence_count: usize,
}

/// A supporting quote attached directly to a candidate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEvidence {
    pub event_id: EventId,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Output of the event extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventExtraction {
    pub events: Vec<KeyEvent>,
    pub evidence: Vec<EventEvidence>,
}

impl EventExtraction {
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.events.iter().filter(|e| e.event_type == event_type).count()
    }
}

/// A directed edge the text supports, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedRelationship {
    pub source_id: EventId,
    pub target_id: EventId,
    /// The most informative of the supporting excerpts
    pub excerpt: String,
    /// Every distinct excerpt that supports the pair, `excerpt` included
    pub supporting_excerpts: Vec<String>,
}

/// An edge dropped during extraction, kept for the run's warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRelationship {
    pub source: String,
    pub target: String,
    pub reason: String,
}

/// Output of the relationship extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipExtraction {
    /// Sorted by `(source_id, target_id)`
    pub relationships: Vec<ProposedRelationship>,
    pub rejected: Vec<RejectedRelationship>,
}

// Shapes returned by the language model

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(alias = "label")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub biological_level: Option<String>,
    #[serde(default)]
    pub organ: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEventList {
    Wrapped { events: Vec<RawEvent> },
    Bare(Vec<RawEvent>),
}

impl RawEventList {
    pub fn into_events(self) -> Vec<RawEvent> {
        match self {
            RawEventList::Wrapped { events } => events,
            RawEventList::Bare(events) => events,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRelationship {
    #[serde(alias = "source", alias = "source_id")]
    pub source_event_id: String,
    #[serde(alias = "target", alias = "target_id")]
    pub target_event_id: String,
    #[serde(default, alias = "evidence", alias = "evidence_excerpt")]
    pub excerpt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRelationshipList {
    Wrapped { relationships: Vec<RawRelationship> },
    Bare(Vec<RawRelationship>),
}

impl RawRelationshipList {
    pub fn into_relationships(self) -> Vec<RawRelationship> {
        match self {
            RawRelationshipList::Wrapped { relationships } => relationships,
            RawRelationshipList::Bare(relationships) => relationships,
        }
    }
}
