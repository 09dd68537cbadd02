//! Markdown rendering of a `FinalReport`.

use std::fmt::Write;

use tribunal_common::{FinalReport, RemediationItem};

pub fn render_markdown(report: &FinalReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &FinalReport) -> std::fmt::Result {
    writeln!(out, "# Audit Report: {}", report.repo_url)?;
    writeln!(out)?;
    writeln!(out, "- **Run:** `{}`", report.run_id)?;
    writeln!(out, "- **Generated:** {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    match report.overall_score {
        Some(score) => writeln!(out, "- **Overall score:** {score:.2} / 5 ({})", report.tier.label())?,
        None => writeln!(out, "- **Overall score:** n/a ({})", report.tier.label())?,
    }
    writeln!(out)?;
    writeln!(out, "## Executive Summary")?;
    writeln!(out)?;
    writeln!(out, "{}", report.executive_summary)?;
    writeln!(out)?;

    if let Some(reason) = &report.abort_reason {
        writeln!(out, "> Run stopped before review: {reason}")?;
        writeln!(out)?;
    }

    if !report.criterion_results.is_empty() {
        writeln!(out, "## Criterion Breakdown")?;
        writeln!(out)?;
        writeln!(out, "| Criterion | Score | Rule | Dissent |")?;
        writeln!(out, "|---|---|---|---|")?;
        for result in &report.criterion_results {
            writeln!(
                out,
                "| {} | {}/5 | `{}` | {} |",
                result.criterion_name,
                result.final_score,
                result.resolution_rule,
                if result.dissent.is_some() { "yes" } else { "" }
            )?;
        }
        writeln!(out)?;

        for result in &report.criterion_results {
            writeln!(out, "### {} ({}/5)", result.criterion_name, result.final_score)?;
            writeln!(out)?;
            writeln!(out, "{}", result.rationale)?;
            writeln!(out)?;
            for opinion in &result.opinions {
                writeln!(
                    out,
                    "- **{}** ({}/5): {}",
                    opinion.reviewer_role().title(),
                    opinion.score(),
                    opinion.argument()
                )?;
            }
            if let Some(dissent) = &result.dissent {
                writeln!(out)?;
                writeln!(out, "<details><summary>Dissent (spread {})</summary>", dissent.variance)?;
                writeln!(out)?;
                for position in &dissent.positions {
                    writeln!(
                        out,
                        "- {} scored {}: {}",
                        position.role.title(),
                        position.score,
                        position.excerpt
                    )?;
                }
                writeln!(out)?;
                writeln!(out, "Resolved by `{}`.", dissent.resolved_by)?;
                writeln!(out)?;
                writeln!(out, "</details>")?;
            }
            writeln!(out)?;
        }
    }

    if !report.remediation_plan.is_empty() {
        writeln!(out, "## Remediation Plan")?;
        writeln!(out)?;
        let groups: [(&str, fn(u8) -> bool); 3] = [
            ("Critical", |s| s <= 2),
            ("Needs Work", |s| s == 3),
            ("Passing", |s| s >= 4),
        ];
        for (title, belongs) in groups {
            let items: Vec<&RemediationItem> = report
                .remediation_plan
                .iter()
                .filter(|i| belongs(i.final_score.value()))
                .collect();
            if items.is_empty() {
                continue;
            }
            writeln!(out, "### {title}")?;
            writeln!(out)?;
            for item in items {
                writeln!(out, "1. **{}** ({}/5): {}", item.criterion_name, item.final_score, item.action)?;
            }
            writeln!(out)?;
        }
    }

    if !report.unevaluated_criteria.is_empty() {
        writeln!(out, "## Not Evaluated")?;
        writeln!(out)?;
        for id in &report.unevaluated_criteria {
            writeln!(out, "- `{id}`")?;
        }
    }
    Ok(())
}
