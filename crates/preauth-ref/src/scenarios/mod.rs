//! Demo scenarios.
//!
//! Each scenario is a fixed request against the reference runtime that
//! exercises one path through the pipeline:
//!
//!   knee-replacement    HD proceeds → rules uncertain → policy-guided approval, high-cost review
//!   multi-line          consultation approved, experimental line denied by exclusion policy → PARTIAL
//!   physical-therapy    no authoritative policy → reasoning-only approval, routed to review
//!   routine-consult     low-cost consultation → rules auto-approve, no review
//!   cosmetic            excluded category → rules deny, collaborators never called
//!   no-coverage         coverage id "unknown" → rules deny
//!   undeclared-diabetes E11 not in member's declaration → HD hold for underwriting
//!   pre-existing        declared E11 inside the waiting period → HD denial

pub mod report;

use std::fmt;

use tracing::info;

use preauth_contracts::{
    claim::ClinicalRequest,
    decision::DecisionKind,
    error::PreauthResult,
    result::AdjudicationResult,
};

use crate::mock_data::{request, service};
use crate::runtime::Runtime;

pub struct Scenario {
    pub name: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    pub request: ClinicalRequest,
    /// Policy start as days before today; `None` uses the configured default.
    pub policy_age_days: Option<i64>,
    pub expected: DecisionKind,
}

/// What a scenario produced next to what it was expected to produce.
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub expected: DecisionKind,
    pub result: AdjudicationResult,
}

impl ScenarioOutcome {
    pub fn matched(&self) -> bool {
        self.result.overall_decision == self.expected
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} expected {:<8} got {:<8} [{}]",
            self.name,
            self.expected.label(),
            self.result.overall_decision.label(),
            if self.matched() { "OK" } else { "MISMATCH" }
        )
    }
}

pub fn catalog() -> Vec<Scenario> {
    let mut no_coverage = request(
        "REQ-NOCOV-001",
        "PAT005",
        41,
        &[("K35.80", "Acute appendicitis")],
        vec![service(1, "44970", "Laparoscopic appendectomy operation", 12_000.0)],
    );
    no_coverage.coverage_id = Some("unknown".to_string());

    vec![
        Scenario {
            name: "knee-replacement",
            title: "Policy-guided surgical approval",
            summary: "Declared diabetic member, knee arthroplasty above the high-cost review line",
            request: request(
                "REQ-KNEE-001",
                "PAT001",
                62,
                &[("E11.9", "Type 2 diabetes mellitus"), ("M17.11", "Primary osteoarthritis, right knee")],
                vec![service(1, "27447", "Total knee replacement surgery", 45_000.0)],
            ),
            policy_age_days: Some(400),
            expected: DecisionKind::Approved,
        },
        Scenario {
            name: "multi-line",
            title: "Mixed verdicts across service lines",
            summary: "Routine consultation plus an experimental therapy the exclusion policy names",
            request: request(
                "REQ-MULTI-001",
                "PAT006",
                48,
                &[("M54.5", "Low back pain")],
                vec![
                    service(1, "99214", "Office consultation", 300.0),
                    service(2, "0263T", "Experimental stem cell therapy", 8_000.0),
                ],
            ),
            policy_age_days: None,
            expected: DecisionKind::Partial,
        },
        Scenario {
            name: "physical-therapy",
            title: "Reasoning without authoritative policy",
            summary: "Only advisory guidance matches, so the reasoning verdict stands alone",
            request: request(
                "REQ-PT-001",
                "PAT007",
                35,
                &[("M54.5", "Low back pain")],
                vec![service(1, "97110", "Physical therapy session", 1_200.0)],
            ),
            policy_age_days: None,
            expected: DecisionKind::Approved,
        },
        Scenario {
            name: "routine-consult",
            title: "Rules auto-approval",
            summary: "Low-cost consultation inside the auto-approve ceiling",
            request: request(
                "REQ-CONSULT-001",
                "PAT004",
                29,
                &[("J06.9", "Acute upper respiratory infection")],
                vec![service(1, "99213", "Office visit consultation", 500.0)],
            ),
            policy_age_days: None,
            expected: DecisionKind::Approved,
        },
        Scenario {
            name: "cosmetic",
            title: "Excluded service category",
            summary: "Cosmetic surgery is denied by rules before any collaborator is called",
            request: request(
                "REQ-COSM-001",
                "PAT008",
                33,
                &[("Z41.1", "Encounter for cosmetic surgery")],
                vec![service(1, "30400", "Cosmetic rhinoplasty surgery", 9_500.0)],
            ),
            policy_age_days: None,
            expected: DecisionKind::Denied,
        },
        Scenario {
            name: "no-coverage",
            title: "No active coverage",
            summary: "Coverage lookup returned 'unknown'",
            request: no_coverage,
            policy_age_days: None,
            expected: DecisionKind::Denied,
        },
        Scenario {
            name: "undeclared-diabetes",
            title: "Undeclared HD condition",
            summary: "E11 on the request but never declared; held for the underwriter",
            request: request(
                "REQ-HD-001",
                "PAT003",
                54,
                &[("E11.9", "Type 2 diabetes mellitus")],
                vec![service(1, "99213", "Diabetes management consultation", 250.0)],
            ),
            policy_age_days: Some(0),
            expected: DecisionKind::Pending,
        },
        Scenario {
            name: "pre-existing",
            title: "Pre-existing condition in waiting period",
            summary: "Declared E11 diagnosed before a policy that started 30 days ago",
            request: request(
                "REQ-HD-002",
                "PAT001",
                62,
                &[("E11.9", "Type 2 diabetes mellitus")],
                vec![service(1, "99213", "Diabetes management consultation", 250.0)],
            ),
            policy_age_days: Some(30),
            expected: DecisionKind::Denied,
        },
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    catalog().into_iter().find(|s| s.name == name)
}

/// Adjudicate one scenario without printing.
pub fn execute(runtime: &Runtime, scenario: &Scenario) -> PreauthResult<ScenarioOutcome> {
    let policy_start = scenario.policy_age_days.map(|d| runtime.policy_start_days_ago(d));
    let result = runtime.adjudicate(&scenario.request, policy_start)?;
    info!(
        scenario = %scenario.name,
        decision = %result.overall_decision.label(),
        deciding_layer = %result.deciding_layer,
        "scenario adjudicated"
    );
    Ok(ScenarioOutcome {
        name: scenario.name,
        expected: scenario.expected,
        result,
    })
}

/// Adjudicate and print one scenario.
pub fn run(runtime: &Runtime, scenario: &Scenario) -> PreauthResult<ScenarioOutcome> {
    println!("=== {}: {} ===", scenario.name, scenario.title);
    println!();
    println!("  {}", scenario.summary);
    println!();
    let outcome = execute(runtime, scenario)?;
    report::print_result(&outcome.result);
    if !outcome.matched() {
        println!(
            "  UNEXPECTED: expected {}, got {}",
            outcome.expected.label(),
            outcome.result.overall_decision.label()
        );
        println!();
    }
    Ok(outcome)
}

/// Run the whole catalog against one runtime, in order.
pub fn run_all(runtime: &Runtime) -> PreauthResult<Vec<ScenarioOutcome>> {
    let mut outcomes = Vec::new();
    for scenario in catalog() {
        outcomes.push(run(runtime, &scenario)?);
    }

    println!("=== Summary ===");
    println!();
    for outcome in &outcomes {
        println!("  {outcome}");
    }
    println!();
    Ok(outcomes)
}
