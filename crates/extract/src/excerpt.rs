//! Excerpt handling shared by relationship extraction and scoring.

use regex::Regex;
use std::sync::LazyLock;

/// Words and phrases that describe a mechanism or direct causation.
static MECHANISTIC_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(via|through|mediated|mediates|mechanism|mechanistic|pathway|binding|binds|bound|signal(l)?ing|receptor|dose[- ]dependent(ly)?|dose[- ]response|caus(e|es|ed|ing)|induc(e|es|ed|ing)|lead(s)? to|led to|result(s|ed)? in|trigger(s|ed)?|activat(es|ed)|inhibit(s|ed)|block(s|ed)|because)\b",
    )
    .expect("mechanistic cue pattern is valid")
});

pub fn mechanistic_cue_count(text: &str) -> usize {
    MECHANISTIC_CUES.find_iter(text).count()
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Pick the most informative excerpt: most mechanistic cues, then longest,
/// then lexicographically smallest so the choice is stable for a given set.
pub fn most_informative<'a, I>(excerpts: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    excerpts.into_iter().max_by(|a, b| {
        mechanistic_cue_count(a)
            .cmp(&mechanistic_cue_count(b))
            .then_with(|| a.chars().count().cmp(&b.chars().count()))
            .then_with(|| b.cmp(a))
    })
}

/// Finds quotes in a document regardless of case and whitespace layout.
pub struct ExcerptLocator<'a> {
    text: &'a str,
    normalized: String,
    /// For every byte of `normalized`, the byte span of the source char
    spans: Vec<(usize, usize)>,
}

impl<'a> ExcerptLocator<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut normalized = String::with_capacity(text.len());
        let mut spans = Vec::with_capacity(text.len());
        let mut in_whitespace = false;

        for (start, c) in text.char_indices() {
            let end = start + c.len_utf8();
            if c.is_whitespace() {
                if !in_whitespace && !normalized.is_empty() {
                    normalized.push(' ');
                    spans.push((start, end));
                }
                in_whitespace = true;
                continue;
            }
            in_whitespace = false;
            for lower in c.to_lowercase() {
                let before = normalized.len();
                normalized.push(lower);
                for _ in before..normalized.len() {
                    spans.push((start, end));
                }
            }
        }

        Self { text, normalized, spans }
    }

    fn normalize(needle: &str) -> String {
        needle
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn find_span(&self, needle: &str, from: usize) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let found = self.normalized[from..].find(needle)? + from;
        let last = found + needle.len() - 1;
        Some((found, last))
    }

    /// Locate `excerpt` and return the document's own text for it. Quotes the
    /// model elided with "..." match when every fragment appears in order and
    /// close together; the covering span of the document is returned.
    pub fn locate(&self, excerpt: &str) -> Option<&'a str> {
        let cleaned = excerpt.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'));
        let needle = Self::normalize(cleaned);

        if let Some((first, last)) = self.find_span(&needle, 0) {
            let start = self.spans[first].0;
            let end = self.spans[last].1;
            return Some(&self.text[start..end]);
        }

        let fragments: Vec<String> = cleaned
            .split("...")
            .flat_map(|part| part.split('…'))
            .map(Self::normalize)
            .filter(|f| !f.is_empty())
            .collect();
        if fragments.len() < 2 {
            return None;
        }

        let mut cursor = 0;
        let mut first_start = None;
        let mut last_end = 0;
        for fragment in &fragments {
            let (first, last) = self.find_span(fragment, cursor)?;
            first_start.get_or_insert(first);
            last_end = last;
            cursor = last + 1;
        }

        // Fragments scattered across the document are not one quote
        let first = first_start?;
        if last_end + 1 - first > cleaned.len() * 4 {
            return None;
        }
        Some(&self.text[self.spans[first].0..self.spans[last_end].1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str =
        "Exposure decreased serum estradiol.\nThis decrease   led to\nfollicular atresia in the ovary (p=0.03).";

    #[test]
    fn locates_quotes_across_whitespace_and_case() {
        let locator = ExcerptLocator::new(DOC);
        let found = locator.locate("this decrease led to follicular atresia").unwrap();
        assert_eq!(found, "This decrease   led to\nfollicular atresia");
    }

    #[test]
    fn strips_surrounding_quotes() {
        let locator = ExcerptLocator::new(DOC);
        assert_eq!(
            locator.locate("\"decreased serum estradiol\""),
            Some("decreased serum estradiol")
        );
    }

    #[test]
    fn missing_quotes_are_not_found() {
        let locator = ExcerptLocator::new(DOC);
        assert_eq!(locator.locate("increased ovarian weight"), None);
        assert_eq!(locator.locate("   "), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
        assert_eq!(truncate_chars("short", 50), "short");
    }

    #[test]
    fn informative_excerpts_prefer_mechanism_then_length() {
        let picked = most_informative([
            "Estradiol fell and atresia rose in treated animals over the study.",
            "Atresia was mediated via loss of estradiol signaling.",
        ]);
        assert_eq!(picked, Some("Atresia was mediated via loss of estradiol signaling."));

        let tie = most_informative(["bbb", "aaa"]);
        assert_eq!(tie, Some("aaa"));
    }
}
