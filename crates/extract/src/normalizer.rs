use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::schema::{EventId, EventType, KeyEvent};

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("punctuation pattern is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "due", "for", "from", "in", "into", "of", "on", "the",
    "to", "via", "with", "within",
];

const UP_TERMS: &[&str] = &[
    "increase", "increased", "increases", "elevated", "elevation", "enhanced", "enhancement",
    "activation", "activated", "induction", "induced", "upregulation", "upregulated",
    "stimulation", "stimulated", "higher", "gain",
];

const DOWN_TERMS: &[&str] = &[
    "decrease", "decreased", "decreases", "reduced", "reduction", "inhibition", "inhibited",
    "suppression", "suppressed", "downregulation", "downregulated", "impaired", "impairment",
    "loss", "lower", "depletion", "depleted", "diminished", "deficiency",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Token view of an event label used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLabel {
    tokens: BTreeSet<String>,
    direction: Option<Direction>,
}

impl NormalizedLabel {
    /// Lowercase, strip punctuation, drop stop words, strip simple plurals.
    pub fn new(label: &str) -> Self {
        let lowered = label.to_lowercase();
        let cleaned = PUNCTUATION.replace_all(&lowered, " ");

        let words: Vec<&str> = cleaned.split_whitespace().collect();
        let has_up = words.iter().any(|w| UP_TERMS.contains(w));
        let has_down = words.iter().any(|w| DOWN_TERMS.contains(w));
        let direction = match (has_up, has_down) {
            (true, false) => Some(Direction::Up),
            (false, true) => Some(Direction::Down),
            _ => None,
        };

        let tokens = words
            .into_iter()
            .filter(|w| !STOP_WORDS.contains(w))
            .map(singular)
            .collect();

        Self { tokens, direction }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Same underlying event: one token set contains the other (at least two
    /// tokens), or they share more than 70% of the larger set. Labels with
    /// opposite direction terms never match.
    pub fn is_duplicate_of(&self, other: &NormalizedLabel) -> bool {
        if self.tokens.is_empty() || other.tokens.is_empty() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.direction, other.direction) {
            if a != b {
                return false;
            }
        }
        if self.tokens == other.tokens {
            return true;
        }

        let (smaller, larger) = if self.tokens.len() <= other.tokens.len() {
            (&self.tokens, &other.tokens)
        } else {
            (&other.tokens, &self.tokens)
        };

        if smaller.len() >= 2 && smaller.is_subset(larger) {
            return true;
        }

        if smaller.len() > 1 {
            let common = smaller.intersection(larger).count();
            return common as f64 / larger.len() as f64 > 0.7; // 70% overlap
        }

        false
    }
}

fn singular(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("is") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

struct Cluster {
    canonical: EventId,
    event_type: EventType,
    members: Vec<NormalizedLabel>,
}

/// Resolves events to the canonical event of their duplicate cluster.
/// Feed events in id order: the first event of a cluster becomes canonical.
pub struct LabelNormalizer {
    clusters: Vec<Cluster>,
}

impl LabelNormalizer {
    pub fn new() -> Self {
        Self {
            clusters: Vec::new(),
        }
    }

    /// Return the canonical id for `event`, registering it as a new canonical
    /// event when it matches no earlier cluster of the same type.
    pub fn canonicalize(&mut self, event: &KeyEvent) -> EventId {
        let label = NormalizedLabel::new(&event.label);

        let found = self.clusters.iter_mut().find(|cluster| {
            cluster.event_type == event.event_type
                && cluster.members.iter().any(|member| member.is_duplicate_of(&label))
        });

        match found {
            Some(cluster) => {
                cluster.members.push(label);
                cluster.canonical
            }
            None => {
                self.clusters.push(Cluster {
                    canonical: event.id,
                    event_type: event.event_type,
                    members: vec![label],
                });
                event.id
            }
        }
    }
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
