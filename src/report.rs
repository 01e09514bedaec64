//! Human-readable rendering of a verdict.

use std::fmt::{self, Write};

use crate::opinion::ScoreRange;
use crate::verdict::Verdict;

/// Renders `verdict` as a Markdown report.
///
/// Sections: summary, overall score, per-criterion breakdown, remediation
/// plan, flags and errors. Empty sections are omitted except the breakdown.
#[must_use]
pub fn render_text(verdict: &Verdict, scale: ScoreRange) -> String {
    let mut md = String::new();
    write_report(&mut md, verdict, scale).expect("formatting into a String is infallible");
    md
}

/// Writes the Markdown report for `verdict` into `md`.
pub fn write_report(md: &mut impl Write, verdict: &Verdict, scale: ScoreRange) -> fmt::Result {
    let max = scale.max;
    let outcome = if verdict.passed { "PASSED" } else { "FAILED" };

    writeln!(md, "# Audit Report: {}\n", verdict.subject_url)?;
    writeln!(md, "## Executive Summary\n{}\n", verdict.summary)?;
    writeln!(md, "## Overall Score: {:.2} / {max} ({outcome})\n", verdict.overall_score)?;

    writeln!(md, "## Criterion Breakdown")?;
    if verdict.per_dimension.is_empty() {
        writeln!(md, "No dimensions were scored.\n")?;
    }
    for result in &verdict.per_dimension {
        write!(md, "### {} - Score: {}/{max}", result.dimension_name, result.final_score)?;
        if result.low_confidence {
            md.write_str(" (low confidence)")?;
        }
        md.write_char('\n')?;
        if let Some(dissent) = &result.dissent_note {
            writeln!(md, "> [!IMPORTANT]\n> Dissent: {dissent}\n")?;
        }
        for note in &result.notes {
            writeln!(md, "> {note}")?;
        }
        for opinion in &result.contributing_opinions {
            write!(md, "- **{}**: {} (Score: {}", opinion.voter_role, opinion.rationale, opinion.score)?;
            if let Some(overrule) = &opinion.overrule {
                write!(md, ", overruled from {}", overrule.original_score)?;
            }
            md.write_str(")\n")?;
        }
        writeln!(md, "- **Remediation**: {}\n", result.remediation)?;
    }

    if !verdict.remediation_plan.is_empty() {
        writeln!(md, "## Remediation Plan")?;
        for item in &verdict.remediation_plan {
            writeln!(
                md,
                "- {} ({}/{max}): {}",
                item.dimension_id.display_name(),
                item.final_score,
                item.action
            )?;
        }
        md.write_char('\n')?;
    }

    if !verdict.flags.is_empty() {
        writeln!(md, "## Flags")?;
        for flag in &verdict.flags {
            writeln!(md, "- {flag}")?;
        }
        md.write_char('\n')?;
    }

    if !verdict.errors.is_empty() {
        writeln!(md, "## Errors")?;
        for error in &verdict.errors {
            writeln!(md, "- {error}")?;
        }
        md.write_char('\n')?;
    }

    writeln!(md, "Digest: {}", verdict.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionId;
    use crate::graph::NodeId;
    use crate::opinion::{Opinion, VoterRole};
    use crate::state::{ErrorKind, RunError};
    use crate::verdict::{CriterionResult, Flag, FlagKind, RemediationItem};

    fn verdict() -> Verdict {
        let mut v = Verdict::invalid_configuration("https://github.com/acme/repo", Vec::new(), Vec::new());
        v.overall_score = 2.0;
        v.summary = "Two out of five.".to_string();
        v.per_dimension.push(CriterionResult {
            dimension_id: DimensionId::new("safe_tool_engineering"),
            dimension_name: "Safe Tool Engineering".to_string(),
            final_score: 2,
            contributing_opinions: vec![
                Opinion::new("safe_tool_engineering", VoterRole::Defense, 5, "tried hard").overruled(2, "missing"),
                Opinion::new("safe_tool_engineering", VoterRole::Prosecutor, 1, "uses os.system"),
            ],
            dissent_note: Some("Prosecutor scored 1 while Defense scored 5.".to_string()),
            remediation: "uses os.system".to_string(),
            notes: vec!["Fact supremacy applied".to_string()],
            low_confidence: false,
        });
        v.remediation_plan.push(RemediationItem {
            dimension_id: DimensionId::new("safe_tool_engineering"),
            final_score: 2,
            action: "uses os.system".to_string(),
        });
        v.flags.push(Flag::new(FlagKind::Complexity, "Complexity warning: too big"));
        v.errors
            .push(RunError::new(Some(NodeId::DocAnalyst), ErrorKind::Timeout, "Node timed out after 10ms"));
        v
    }

    #[test]
    fn report_has_every_section() {
        let text = render_text(&verdict(), ScoreRange::default());
        for heading in [
            "# Audit Report: https://github.com/acme/repo",
            "## Executive Summary",
            "## Overall Score: 2.00 / 5 (FAILED)",
            "### Safe Tool Engineering - Score: 2/5",
            "> Dissent: Prosecutor scored 1",
            "- **Defense**: tried hard (Score: 2, overruled from 5)",
            "## Remediation Plan",
            "- Safe Tool Engineering (2/5): uses os.system",
            "## Flags",
            "## Errors",
            "- [doc_analyst] timeout: Node timed out after 10ms",
        ] {
            assert!(text.contains(heading), "missing {heading:?} in\n{text}");
        }
    }

    #[test]
    fn write_report_matches_render_text() {
        let v = verdict();
        let mut buffer = String::new();
        write_report(&mut buffer, &v, ScoreRange::default()).unwrap();
        assert_eq!(buffer, render_text(&v, ScoreRange::default()));
        assert!(buffer.ends_with(&format!("Digest: {}\n", v.digest())));
    }

    #[test]
    fn empty_verdict_says_nothing_was_scored() {
        let v = Verdict::invalid_configuration("ftp://x", Vec::new(), Vec::new());
        let text = render_text(&v, ScoreRange::default());
        assert!(text.contains("No dimensions were scored."));
        assert!(!text.contains("## Remediation Plan"));
    }
}
