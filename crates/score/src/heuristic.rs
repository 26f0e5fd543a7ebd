use async_trait::async_trait;
use extract::CancellationToken;
use regex::Regex;
use std::sync::LazyLock;

use crate::{EvidenceScorer, Score, ScoreError, ScoreRequest};

/// Explicit causal connectives. Change-of-state verbs alone are not enough.
static CONNECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(caus(e|es|ed|ing)|lead(s|ing)? to|led to|result(s|ed|ing)? in|induc(e|es|ed|ing)|trigger(s|ed|ing)?|mediat(e|es|ed|ing)|elicit(s|ed|ing)?|provok(e|es|ed|ing)|gives? rise to|gave rise to|responsible for|because of|due to)\b",
    )
    .expect("causal connective pattern is valid")
});

/// Change-of-state verbs. Causal only with a subject and an object in the
/// same clause ("exposure reduced fertility"), otherwise an observation.
static CHANGE_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(reduc(es|ed)|increas(es|ed)|decreas(es|ed)|lower(s|ed)|elevat(es|ed)|rais(es|ed)|inhibit(s|ed)|activat(es|ed)|suppress(es|ed)|block(s|ed)|disrupt(s|ed)|impair(s|ed)|stimulat(es|ed)|enhanc(es|ed)|prevent(s|ed)|abolish(es|ed)|attenuat(es|ed)|diminish(es|ed)|alter(s|ed))$",
    )
    .expect("change verb pattern is valid")
});

static MECHANISM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(via|through|mechanisms?|mechanistic(ally)?|binding|binds|bound|signal(l)?ing|receptors?|dose[- ]dependent(ly)?|dose[- ]response|pathway)\b",
    )
    .expect("mechanism cue pattern is valid")
});

static HEDGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(may|might|could|suggest(s|ed|ive|ing)?|possibl(e|y)|potential(ly)?|putative|appear(s|ed)? to|trend(s|ed)?|tendency|associated with|associations?|correlat(e|es|ed|ion)|linked to|consistent|not (statistically )?significant(ly)?|no (statistically )?significant|did not reach (statistical )?significance|non-?significant|insignificant|preliminary|hypothes(is|ized|ised))\b",
    )
    .expect("hedge pattern is valid")
});

static P_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bp\s*(<=|>=|=|<|>|≤|≥)\s*(0?\.\d+|1(\.0+)?)\b").expect("p-value pattern is valid")
});

static CLAUSE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;:.()\[\]]").expect("clause break pattern is valid"));

const SIGNIFICANCE: f64 = 0.05;

/// Words that cannot be the subject right before a change verb.
const NOT_A_SUBJECT: &[&str] = &[
    "a", "an", "and", "are", "be", "been", "being", "but", "by", "for", "had", "has", "have",
    "in", "is", "no", "nor", "not", "of", "or", "the", "to", "was", "were", "with",
];

/// Words that cannot start the object right after a change verb.
const NOT_AN_OBJECT: &[&str] = &[
    "across", "after", "among", "and", "are", "as", "at", "between", "but", "by", "compared",
    "during", "following", "for", "from", "in", "is", "of", "on", "or", "over", "relative",
    "than", "throughout", "to", "versus", "vs", "was", "were", "when", "within",
];

const PASSIVE_AUX: &[&str] = &["is", "are", "was", "were", "been", "be"];

/// Deterministic scorer driven by lexical cues in the excerpt.
///
/// Tiers, highest first:
/// - causal connective plus mechanism, no hedging: 0.80 to 1.00
/// - causal connective alone, no hedging: 0.60 to 0.75
/// - any hedge or a non-significant p-value: 0.30 to 0.50
/// - no causal connective and no hedged support: rejected
///
/// Change-of-state words that are not used causally only nudge the strength
/// within a tier.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cues {
    causal: usize,
    changes: usize,
    mechanism: usize,
    hedges: usize,
    non_significant: bool,
}

impl Cues {
    fn read(excerpt: &str) -> Self {
        let non_significant = P_VALUE.captures_iter(excerpt).any(|c| {
            let op = c.get(1).map_or("", |m| m.as_str());
            let value = c.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            matches!(op, ">" | ">=" | "≥") || value.is_some_and(|p| p > SIGNIFICANCE)
        });

        let (transitive, changes) = change_verbs(excerpt);
        Self {
            causal: CONNECTIVE.find_iter(excerpt).count() + transitive,
            changes: changes - transitive,
            mechanism: MECHANISM.find_iter(excerpt).count(),
            hedges: HEDGE.find_iter(excerpt).count(),
            non_significant,
        }
    }

    fn is_hedged(&self) -> bool {
        self.hedges > 0 || self.non_significant
    }
}

/// Counts change verbs, and how many of them are used transitively: a
/// subject before and an object after within one clause, or a passive
/// followed by "by".
fn change_verbs(excerpt: &str) -> (usize, usize) {
    let mut transitive = 0;
    let mut changes = 0;

    for clause in CLAUSE_BREAK.split(excerpt) {
        let words: Vec<String> = clause
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-').to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        for (i, word) in words.iter().enumerate() {
            if !CHANGE_VERB.is_match(word) {
                continue;
            }
            changes += 1;

            let before = words[..i].iter().rev().find(|w| !is_adverb(w));
            let after = words[i + 1..].iter().find(|w| !is_adverb(w));

            let passive = words[..i].last().is_some_and(|w| PASSIVE_AUX.contains(&w.as_str()))
                && after.is_some_and(|w| w == "by");
            let active = before.is_some_and(|w| !NOT_A_SUBJECT.contains(&w.as_str()))
                && after.is_some_and(|w| !NOT_AN_OBJECT.contains(&w.as_str()));

            if passive || active {
                transitive += 1;
            }
        }
    }

    (transitive, changes)
}

fn is_adverb(word: &str) -> bool {
    word.len() > 4 && word.ends_with("ly")
}

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_excerpt(&self, excerpt: &str) -> Option<Score> {
        let cues = Cues::read(excerpt);

        if cues.is_hedged() {
            let support = cues.causal + cues.mechanism + cues.hedges + usize::from(cues.non_significant);
            let strength = (0.3 + 0.05 * support.min(4) as f64).min(0.5);
            let reason = if cues.non_significant {
                "statistically non-significant support"
            } else {
                "hedged or associative language"
            };
            return Some(Score {
                strength: round2(strength),
                justification: format!("Suggestive evidence: {reason}."),
            });
        }

        if cues.causal == 0 {
            return None;
        }

        let nudge = cues.changes.min(1);
        if cues.mechanism > 0 {
            let extra = (cues.causal - 1 + cues.mechanism - 1 + nudge).min(4);
            Some(Score {
                strength: round2((0.8 + 0.05 * extra as f64).min(1.0)),
                justification: format!(
                    "Direct causal statement with a described mechanism ({} mechanistic cue(s)).",
                    cues.mechanism
                ),
            })
        } else {
            let extra = (cues.causal - 1 + nudge).min(3);
            Some(Score {
                strength: round2(0.6 + 0.05 * extra as f64),
                justification: "Causal assertion without a described mechanism.".to_string(),
            })
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl EvidenceScorer for HeuristicScorer {
    async fn score(
        &self,
        request: &ScoreRequest,
        _cancel: &CancellationToken,
    ) -> Result<Option<Score>, ScoreError> {
        Ok(self.score_excerpt(&request.excerpt))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
