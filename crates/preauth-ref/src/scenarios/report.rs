//! Console rendering of an adjudication result.

use preauth_contracts::{result::AdjudicationResult, screening::HdOutcome};

pub fn print_result(result: &AdjudicationResult) {
    println!("  Request:        {} (patient {})", result.request_id, result.patient_id);
    println!("  Adjudication:   {}", result.adjudication_id);
    println!("  HD screening:   {}", result.hd_report.outcome.label());
    if result.hd_report.outcome != HdOutcome::NotRequired {
        println!("                  {}", result.hd_report.reason);
        for flag in &result.hd_report.data_quality_flags {
            println!("                  data quality: {flag}");
        }
    }
    if let Some(rules) = &result.rule_outcome {
        let verdict = rules.auto_decision.map(|d| d.label()).unwrap_or("UNCERTAIN");
        println!("  Rules engine:   {} ({})", verdict, rules.ruleset_version);
        if !rules.risk_flags.is_empty() {
            println!("                  risk flags: {}", rules.risk_flags.join(", "));
        }
    }
    println!("  Deciding layer: {}", result.deciding_layer);
    println!(
        "  Decision:       {} at {:.2} ({:?})",
        result.overall_decision.label(),
        result.overall_confidence,
        result.overall_confidence_level
    );
    println!(
        "  Totals:         requested {:.2} | approved {:.2} | denied {:.2}",
        result.total_requested, result.total_approved, result.total_denied
    );
    if result.flagged_for_review {
        let lines: Vec<String> = result.flagged_sequences.iter().map(u32::to_string).collect();
        println!("  Review queue:   line(s) {}", lines.join(", "));
    }
    for report in &result.validation_reports {
        if !report.is_clean() {
            println!("  {:<15} {} [{}]", format!("{}:", report.validator.name()), report.verdict(), report.flags.join(", "));
        }
    }
    println!();

    for line in &result.service_decisions {
        println!(
            "  Line {} [{}] {}: {} ({:.2})",
            line.sequence,
            line.service_code,
            line.service_description,
            line.decision.label(),
            line.confidence
        );
        println!("    {}", line.explanation);
        if let Some(assessment) = result.assessment_for(line.sequence) {
            if assessment.requires_review {
                println!(
                    "    Review: {:?} priority, {} ({})",
                    assessment.priority, assessment.recommended_reviewer, assessment.estimated_review_time
                );
                println!("    Reasons: {}", assessment.reason_summary());
            } else {
                println!("    Final action: {:?}", assessment.final_action);
            }
        }
    }
    println!();

    println!("  Trace ({} steps, terminal {}):", result.trace.entries.len(), short_hash(&result.trace.terminal_hash));
    for step in result.trace.steps() {
        println!(
            "    {} {:<36} {:<12} {:.2}",
            if step.is_final { "*" } else { " " },
            step.layer.name(),
            step.verdict,
            step.confidence
        );
    }
    println!();
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
