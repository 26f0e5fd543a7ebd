use anyhow::{Context, Result};
use extract::excerpt::truncate_chars;
use extract::{BiologicalLevel, EventType, KeyEvent};
use pathway::{AssembledGraph, Pathway};
use serde::Serialize;
use std::fmt::{self, Display, Write as _};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Excerpts longer than this are cut and marked `[truncated]`
    pub excerpt_display_chars: usize,
    /// Rows shown in the evidence table; `None` shows every event
    pub evidence_row_limit: Option<usize>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            excerpt_display_chars: 200,
            evidence_row_limit: None,
        }
    }
}

/// Renders an assembled graph and its pathway as a markdown report.
/// Presentation only: nothing upstream is recomputed.
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn render<W: Display>(
        &self,
        topic: &str,
        graph: &AssembledGraph,
        pathway: &Pathway,
        warnings: &[W],
    ) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_report(&mut out, topic, graph, pathway, warnings);
        out
    }

    fn write_report<W: Display>(
        &self,
        out: &mut String,
        topic: &str,
        graph: &AssembledGraph,
        pathway: &Pathway,
        warnings: &[W],
    ) -> fmt::Result {
        writeln!(out, "# Key Event Extraction Report: {topic}")?;
        writeln!(out)?;

        writeln!(out, "## Summary Statistics")?;
        writeln!(out)?;
        writeln!(out, "- **Total Key Events**: {}", graph.events.len())?;
        for event_type in EventType::ALL {
            writeln!(
                out,
                "  - {} ({}): {}",
                event_type.as_str(),
                event_type.plural_name(),
                graph.events_of(event_type).count()
            )?;
        }
        writeln!(out)?;
        writeln!(out, "- **Total Relationships**: {}", graph.relationships.len())?;
        writeln!(out)?;
        writeln!(out, "- **Total Evidence Records**: {}", graph.evidence.len())?;
        writeln!(out)?;

        writeln!(out, "## Events by Biological Level")?;
        writeln!(out)?;
        for level in BiologicalLevel::ALL {
            let count = graph.events.iter().filter(|e| e.biological_level == level).count();
            if count > 0 {
                writeln!(out, "- **{}**: {count}", level.display_name())?;
            }
        }
        writeln!(out)?;

        writeln!(out, "## Evidence Count per Key Event")?;
        writeln!(out)?;
        self.write_evidence_counts(out, &graph.events)?;
        writeln!(out)?;

        writeln!(out, "## Example AOP Pathway")?;
        writeln!(out)?;
        self.write_pathway(out, pathway)?;

        if !warnings.is_empty() {
            writeln!(out)?;
            writeln!(out, "## Run Warnings")?;
            writeln!(out)?;
            for warning in warnings {
                writeln!(out, "- {warning}")?;
            }
        }
        Ok(())
    }

    fn write_evidence_counts(&self, out: &mut String, events: &[KeyEvent]) -> fmt::Result {
        if events.is_empty() {
            return writeln!(out, "- No evidence records found");
        }

        let mut rows: Vec<&KeyEvent> = events.iter().collect();
        rows.sort_by(|a, b| {
            b.evidence_count
                .cmp(&a.evidence_count)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = self.config.evidence_row_limit.unwrap_or(rows.len());
        for event in rows.iter().take(limit) {
            writeln!(out, "- **{}**: {} evidence record(s)", event.label, event.evidence_count)?;
        }
        if rows.len() > limit {
            writeln!(out, "- ... and {} more event(s)", rows.len() - limit)?;
        }
        Ok(())
    }

    fn write_pathway(&self, out: &mut String, pathway: &Pathway) -> fmt::Result {
        if pathway.is_empty() {
            return writeln!(out, "No complete pathway found in the extracted data.");
        }

        writeln!(out, "The following is an example pathway extracted from the document:")?;
        writeln!(out)?;
        let last = pathway.events.len() - 1;
        for (i, event) in pathway.events.iter().enumerate() {
            let arrow = if i < last { " →" } else { "" };
            writeln!(
                out,
                "{}. **{}** [{}] ({}){arrow}",
                i + 1,
                event.label,
                event.event_type.as_str(),
                event.biological_level.as_str()
            )?;
        }

        writeln!(out)?;
        writeln!(out, "**Pathway Details:**")?;
        for (i, link) in pathway.links.iter().enumerate() {
            writeln!(
                out,
                "- Step {} → {}: Evidence strength = {:.2}",
                i + 1,
                i + 2,
                link.evidence_strength
            )?;
            writeln!(out, "  *{}*", self.display_excerpt(&link.evidence_excerpt))?;
            if !link.justification.is_empty() {
                writeln!(out, "  Justification: {}", link.justification)?;
            }
        }
        Ok(())
    }

    fn display_excerpt(&self, excerpt: &str) -> String {
        let shown = truncate_chars(excerpt, self.config.excerpt_display_chars);
        if shown.len() < excerpt.len() {
            format!("{}... [truncated]", shown.trim_end())
        } else {
            excerpt.to_string()
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new(ReportConfig::default())
    }
}

/// Pretty JSON rendering of the structured result.
pub fn export_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialise run output")
}

/// Write `{stem}.md` and `{stem}.json` into `dir`, creating it if needed.
pub async fn write_outputs(dir: &Path, stem: &str, markdown: &str, json: &str) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let report_path = dir.join(format!("{stem}.md"));
    let json_path = dir.join(format!("{stem}.json"));
    tokio::fs::write(&report_path, markdown)
        .await
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    tokio::fs::write(&json_path, json)
        .await
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    info!(report = %report_path.display(), json = %json_path.display(), "Outputs written");
    Ok((report_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::EventId;
    use pathway::{Relationship, RelationshipType};

    fn event(id: u32, label: &str, event_type: EventType, level: BiologicalLevel, evidence: usize) -> KeyEvent {
        KeyEvent {
            id: EventId(id),
            label: label.to_string(),
            description: None,
            organ: None,
            event_type,
            biological_level: level,
            evidence_count: evidence,
        }
    }

    fn link(source: u32, target: u32, strength: f64, excerpt: &str) -> Relationship {
        Relationship {
            source_id: EventId(source),
            target_id: EventId(target),
            evidence_strength: strength,
            evidence_excerpt: excerpt.to_string(),
            justification: String::new(),
            relationship_type: RelationshipType::LeadsTo,
        }
    }

    fn fixture() -> (AssembledGraph, Pathway) {
        let events = vec![
            event(1, "Inhibition of aromatase", EventType::MIE, BiologicalLevel::Molecular, 2),
            event(2, "Decreased estradiol", EventType::KE, BiologicalLevel::Molecular, 3),
            event(3, "Reduced fertility", EventType::AO, BiologicalLevel::Organism, 1),
            event(4, "Altered liver weight", EventType::KE, BiologicalLevel::Organ, 1),
        ];
        let links = vec![
            link(1, 2, 0.7, "Aromatase inhibition lowered estradiol."),
            link(2, 3, 0.4, &"estradiol ".repeat(40)),
        ];
        let graph = AssembledGraph {
            events: events.clone(),
            relationships: links.clone(),
            ..AssembledGraph::default()
        };
        let pathway = Pathway {
            events: vec![events[0].clone(), events[1].clone(), events[2].clone()],
            links,
            bottleneck: Some(0.4),
        };
        (graph, pathway)
    }

    #[test]
    fn report_layout() {
        let (graph, pathway) = fixture();
        let report = ReportGenerator::default().render("aromatase inhibition", &graph, &pathway, &[] as &[String]);

        assert!(report.starts_with("# Key Event Extraction Report: aromatase inhibition\n"));
        assert!(report.contains("- **Total Key Events**: 4\n  - MIE (Molecular Initiating Events): 1\n  - KE (Key Events): 2\n"));
        assert!(report.contains("- **Molecular**: 2\n- **Organ**: 1\n- **Organism**: 1\n"));
        assert!(report.contains("1. **Inhibition of aromatase** [MIE] (molecular) →\n"));
        assert!(report.contains("3. **Reduced fertility** [AO] (organism)\n"));
        assert!(report.contains("- Step 1 → 2: Evidence strength = 0.70\n"));
        assert!(report.contains("- Step 2 → 3: Evidence strength = 0.40\n"));
        assert!(report.contains("... [truncated]*"));
        assert!(!report.contains("## Run Warnings"));
    }

    #[test]
    fn evidence_rows_sort_by_count_then_label() {
        let (graph, pathway) = fixture();
        let report = ReportGenerator::default().render("x", &graph, &pathway, &[] as &[String]);

        let rows: Vec<&str> = report.lines().filter(|l| l.ends_with("evidence record(s)")).collect();
        assert_eq!(
            rows,
            vec![
                "- **Decreased estradiol**: 3 evidence record(s)",
                "- **Inhibition of aromatase**: 2 evidence record(s)",
                "- **Altered liver weight**: 1 evidence record(s)",
                "- **Reduced fertility**: 1 evidence record(s)",
            ]
        );
    }

    #[test]
    fn row_limit_and_warnings() {
        let (graph, pathway) = fixture();
        let generator = ReportGenerator::new(ReportConfig {
            evidence_row_limit: Some(2),
            ..ReportConfig::default()
        });
        let report = generator.render("x", &graph, &pathway, &["cycle broken between E2 and E1"]);

        assert!(report.contains("- ... and 2 more event(s)\n"));
        assert!(report.ends_with("## Run Warnings\n\n- cycle broken between E2 and E1\n"));
    }

    #[test]
    fn empty_pathway_is_reported_plainly() {
        let (graph, _) = fixture();
        let report = ReportGenerator::default().render("x", &graph, &Pathway::default(), &[] as &[String]);
        assert!(report.contains("No complete pathway found in the extracted data."));
        assert!(!report.contains("**Pathway Details:**"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let (graph, pathway) = fixture();
        let generator = ReportGenerator::default();
        let first = generator.render("x", &graph, &pathway, &["w"]);
        let second = generator.render("x", &graph, &pathway, &["w"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn outputs_land_next_to_each_other() {
        let dir = std::env::temp_dir().join(format!("aop-report-{}", std::process::id()));
        let (md, json) = write_outputs(&dir, "run", "# report\n", "{}").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&md).await.unwrap(), "# report\n");
        assert_eq!(tokio::fs::read_to_string(&json).await.unwrap(), "{}");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
