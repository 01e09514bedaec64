use tribunal::adjudicator::{MAINTAIN, NO_DATA};
use tribunal::config::AdjudicationConfig;
use tribunal::reducer::{collapse_evidence, override_union};
use tribunal::{Adjudicator, Evidence, Opinion, RunInput, RunState, ScoreRange, VoterRole};

fn adjudicator() -> Adjudicator {
    Adjudicator::new(AdjudicationConfig::default(), ScoreRange::default())
}

fn evidence(dimension: &str) -> Evidence {
    Evidence::new(dimension, "repo", "scan", "artifact present")
}

fn resolve_with(adj: &Adjudicator, ev: &Evidence, opinions: &[Opinion]) -> tribunal::CriterionResult {
    let refs: Vec<&Opinion> = opinions.iter().collect();
    adj.resolve_dimension(ev, &refs).result
}

#[test]
fn weighted_vote_matches_hand_arithmetic() {
    // Tech lead carries weight 2: round((1*2 + 5 + 5) / 4) = round(3.0) = 3.
    let result = resolve_with(
        &adjudicator(),
        &evidence("d"),
        &[
            Opinion::new("d", VoterRole::TechLead, 1, "does not run"),
            Opinion::new("d", VoterRole::Prosecutor, 5, "no gaps found"),
            Opinion::new("d", VoterRole::Defense, 5, "excellent"),
        ],
    );
    assert_eq!(result.final_score, 3);
    assert_eq!(result.contributing_opinions.len(), 3);
}

#[test]
fn weight_table_is_configuration() {
    let mut config = AdjudicationConfig::default();
    config.weights.prosecutor = 3;
    config.weights.tech_lead = 1;
    let adj = Adjudicator::new(config, ScoreRange::default());

    // round((1*3 + 5 + 5) / 5) = round(2.6) = 3
    let result = resolve_with(
        &adj,
        &evidence("d"),
        &[
            Opinion::new("d", VoterRole::Prosecutor, 1, "missing tests"),
            Opinion::new("d", VoterRole::Defense, 5, "excellent"),
            Opinion::new("d", VoterRole::TechLead, 5, "runs"),
        ],
    );
    assert_eq!(result.final_score, 3);
}

#[test]
fn dissent_appears_exactly_at_the_threshold() {
    let adj = adjudicator();
    let ev = evidence("d");
    let pair = |prosecutor: u8, defense: u8| {
        resolve_with(
            &adj,
            &ev,
            &[
                Opinion::new("d", VoterRole::Prosecutor, prosecutor, "sloppy"),
                Opinion::new("d", VoterRole::Defense, defense, "ambitious"),
            ],
        )
    };

    let at = pair(3, 5);
    let Some(note) = at.dissent_note else {
        panic!("dissent expected at the threshold");
    };
    assert!(note.contains("Prosecutor") && note.contains("Defense"));
    assert!(note.contains("sloppy") && note.contains("ambitious"));

    assert!(pair(4, 5).dissent_note.is_none());
    assert!(pair(5, 4).dissent_note.is_none());
    assert!(pair(5, 3).dissent_note.is_some());
}

#[test]
fn dissent_does_not_change_the_score() {
    let adj = adjudicator();
    let ev = evidence("d");
    let with_gap = resolve_with(
        &adj,
        &ev,
        &[
            Opinion::new("d", VoterRole::Prosecutor, 2, "weak"),
            Opinion::new("d", VoterRole::Defense, 4, "good"),
        ],
    );
    assert!(with_gap.dissent_note.is_some());
    assert_eq!(with_gap.final_score, 3);
}

#[test]
fn dissent_uses_raw_scores_after_fact_supremacy() {
    let ev = evidence("d").with_found(false);
    let result = resolve_with(
        &adjudicator(),
        &ev,
        &[
            Opinion::new("d", VoterRole::Prosecutor, 1, "absent"),
            Opinion::new("d", VoterRole::Defense, 5, "trust me"),
        ],
    );
    // Copies score 1 and 2 but the voters disagreed by 4.
    assert!(result.dissent_note.is_some());
    assert!(result.final_score <= 2);
}

#[test]
fn missing_artifact_never_scores_above_neutral_low() {
    let adj = adjudicator();
    let ev = evidence("d").with_found(false);
    for prosecutor in 1..=5 {
        for defense in 1..=5 {
            for tech_lead in [1, 5] {
                let result = resolve_with(
                    &adj,
                    &ev,
                    &[
                        Opinion::new("d", VoterRole::Prosecutor, prosecutor, "p"),
                        Opinion::new("d", VoterRole::Defense, defense, "d"),
                        Opinion::new("d", VoterRole::TechLead, tech_lead, "t"),
                    ],
                );
                assert!(result.final_score <= 2, "{prosecutor}/{defense}/{tech_lead} -> {}", result.final_score);
            }
        }
    }
}

#[test]
fn security_override_dominates_optimistic_votes() {
    let result = resolve_with(
        &adjudicator(),
        &evidence("safe_tool_engineering"),
        &[
            Opinion::new("safe_tool_engineering", VoterRole::Prosecutor, 1, "Raw os.system call is a security vulnerability"),
            Opinion::new("safe_tool_engineering", VoterRole::Defense, 5, "clever"),
            Opinion::new("safe_tool_engineering", VoterRole::TechLead, 5, "works"),
        ],
    );
    // Weighted round((1 + 5 + 10) / 4) = 4, capped at 3.
    assert_eq!(result.final_score, 3);
    assert_eq!(result.remediation, "Raw os.system call is a security vulnerability");
}

#[test]
fn dimension_without_opinions_is_failing_with_no_data_note() {
    let mut state = RunState::new(RunInput::new("https://github.com/acme/agent"));
    state.evidence = collapse_evidence(vec![evidence("judged"), evidence("ignored_by_voters")]);
    state.opinions = vec![Opinion::new("judged", VoterRole::TechLead, 4, "solid")];

    let verdict = adjudicator().synthesize(&state).verdict;
    let Some(empty) = verdict.criterion("ignored_by_voters") else {
        panic!("dimension without opinions must still appear");
    };
    assert_eq!(empty.final_score, 1);
    assert_eq!(empty.remediation, NO_DATA);
    assert!(empty.low_confidence);

    let Some(judged) = verdict.criterion("judged") else {
        panic!("judged dimension missing");
    };
    assert_eq!(judged.remediation, MAINTAIN);
    assert_eq!(verdict.remediation_plan.len(), 1);
    assert!(!verdict.passed);
}

#[test]
fn dimension_without_evidence_is_never_reported() {
    let mut state = RunState::new(RunInput::new("https://github.com/acme/agent"));
    state.evidence = collapse_evidence(vec![evidence("a")]);
    state.opinions = vec![
        Opinion::new("a", VoterRole::TechLead, 4, "ok"),
        Opinion::new("phantom", VoterRole::TechLead, 5, "no evidence"),
    ];
    let verdict = adjudicator().synthesize(&state).verdict;
    assert_eq!(verdict.per_dimension.len(), 1);
    assert!(verdict.criterion("phantom").is_none());
}

#[test]
fn pass_gate_uses_the_configured_threshold() {
    let mut state = RunState::new(RunInput::new("https://github.com/acme/agent"));
    state.evidence = collapse_evidence(vec![evidence("a"), evidence("b")]);
    state.opinions = vec![
        Opinion::new("a", VoterRole::TechLead, 3, "ok"),
        Opinion::new("b", VoterRole::TechLead, 4, "good"),
    ];

    let verdict = adjudicator().synthesize(&state).verdict;
    assert!((verdict.overall_score - 3.5).abs() < f64::EPSILON);
    assert!(verdict.passed);

    let mut strict = AdjudicationConfig::default();
    strict.pass_threshold = 3.75;
    let verdict = Adjudicator::new(strict, ScoreRange::default()).synthesize(&state).verdict;
    assert!(!verdict.passed);
}

#[test]
fn override_union_is_idempotent() {
    let map = collapse_evidence(vec![evidence("a"), evidence("b")]);
    assert_eq!(override_union(map.clone(), map.clone()), map);
}
