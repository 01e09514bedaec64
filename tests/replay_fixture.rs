use std::path::PathBuf;

use tribunal::report::render_text;
use tribunal::{ErrorKind, Fixture, NodeId, PipelineBuilder, RunInput, TribunalConfig, TribunalError};

const RECORDED_RUN: &str = r#"{
    "collectors": {
        "repository": {
            "evidence": [
                { "dimension_id": "git_forensic_analysis", "kind": "git_log",
                  "content": "37 commits with descriptive messages",
                  "metadata": { "found": true, "location": "git log", "file_count": 1 } },
                { "dimension_id": "state_management_rigor", "kind": "ast_scan",
                  "content": "TypedDict AgentState with reducers",
                  "metadata": { "found": true, "location": "src/state.py", "line_count": 120 } },
                { "dimension_id": "safe_tool_engineering", "kind": "ast_scan",
                  "content": "os.system used for cloning",
                  "metadata": { "found": true, "location": "src/tools/repo.py" } },
                { "dimension_id": "structured_output", "kind": "ast_scan",
                  "content": "unreachable" }
            ],
            "fail_after": 3,
            "error": "AST parser crashed on src/nodes/judges.py"
        },
        "documents": {
            "evidence": [
                { "dimension_id": "theoretical_depth", "kind": "rag_search",
                  "content": "Dialectical synthesis section missing from report",
                  "metadata": { "found": false, "location": "report.pdf" } }
            ]
        }
    },
    "scorers": {
        "prosecutor": {
            "opinions": [
                { "dimension_id": "git_forensic_analysis", "score": 3, "rationale": "history squashed near the deadline" },
                { "dimension_id": "state_management_rigor", "score": 4, "rationale": "reducers present" },
                { "dimension_id": "safe_tool_engineering", "score": 1, "rationale": "shell injection via os.system is a security vulnerability" },
                { "dimension_id": "theoretical_depth", "score": 2, "rationale": "buzzwords only" }
            ]
        },
        "defense": {
            "opinions": [
                { "dimension_id": "git_forensic_analysis", "score": 5, "rationale": "iterative progress" },
                { "dimension_id": "state_management_rigor", "score": 5, "rationale": "careful design" },
                { "dimension_id": "safe_tool_engineering", "score": 4, "rationale": "works in practice" },
                { "dimension_id": "theoretical_depth", "score": 5, "rationale": "deep understanding", "cited_evidence": ["report.pdf p.3"] }
            ]
        },
        "tech_lead": {
            "opinions": [
                { "dimension_id": "git_forensic_analysis", "score": 4, "rationale": "fine" },
                { "dimension_id": "state_management_rigor", "score": 5, "rationale": "solid" },
                { "dimension_id": "safe_tool_engineering", "score": 5, "rationale": "functional" },
                { "dimension_id": "theoretical_depth", "score": 4, "rationale": "adequate" }
            ],
            "error": "quota exhausted after last opinion"
        }
    }
}"#;

fn write_fixture(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("run.json");
    std::fs::write(&path, text).unwrap();
    path
}

fn replay(fixture: &Fixture) -> tribunal::RunOutcome {
    let pipeline = fixture
        .register(PipelineBuilder::new().with_config(TribunalConfig::default()))
        .build()
        .unwrap();
    pipeline.run(RunInput::new("https://github.com/acme/agent").with_document("report.pdf"))
}

#[test]
fn recorded_run_reproduces_the_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::load(&write_fixture(&dir, RECORDED_RUN)).unwrap();

    let first = replay(&fixture);
    let second = replay(&fixture);
    assert_eq!(first.verdict.digest(), second.verdict.digest());

    let verdict = first.verdict;
    let ids: Vec<&str> = verdict.per_dimension.iter().map(|r| r.dimension_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "git_forensic_analysis",
            "safe_tool_engineering",
            "state_management_rigor",
            "theoretical_depth"
        ]
    );

    // (3 + 5 + 2*4) / 4 = 4, dissent 2.
    let Some(git) = verdict.criterion("git_forensic_analysis") else {
        panic!("git dimension missing");
    };
    assert_eq!(git.final_score, 4);
    assert!(git.dissent_note.is_some());

    // Security override: (1 + 4 + 10) / 4 = 3.75 -> 4, capped at 3.
    let Some(tools) = verdict.criterion("safe_tool_engineering") else {
        panic!("tools dimension missing");
    };
    assert_eq!(tools.final_score, 3);
    assert!(tools.remediation.contains("security vulnerability"));

    // Fact supremacy on the missing document section.
    let Some(theory) = verdict.criterion("theoretical_depth") else {
        panic!("theory dimension missing");
    };
    assert_eq!(theory.final_score, 2);
    assert_eq!(theory.remediation, "buzzwords only");

    // The collector fault after three items and the voter fault are both reported.
    assert!(verdict
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Collector && e.node == Some(NodeId::RepoInvestigator)));
    assert!(verdict
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Scorer && e.node == Some(NodeId::TechLead)));
    assert!(verdict.criterion("structured_output").is_none());

    // Lowest first.
    let plan: Vec<&str> = verdict.remediation_plan.iter().map(|i| i.dimension_id.as_str()).collect();
    assert_eq!(plan, vec!["theoretical_depth", "safe_tool_engineering"]);

    // (4 + 3 + 5 + 2) / 4 = 3.5 with no anomalies.
    assert!((verdict.overall_score - 3.5).abs() < f64::EPSILON);
    assert!(verdict.flags.is_empty());
    assert!(verdict.passed);
}

#[test]
fn text_report_lists_scores_dissent_and_errors() {
    let fixture = Fixture::from_json_str(RECORDED_RUN).unwrap();
    let outcome = replay(&fixture);
    let text = render_text(&outcome.verdict, TribunalConfig::default().score);

    assert!(text.contains("### Safe Tool Engineering - Score: 3/5"));
    assert!(text.contains("> [!IMPORTANT]"));
    assert!(text.contains("overruled from 5"));
    assert!(text.contains("## Remediation Plan"));
    assert!(text.contains("## Errors"));
    assert!(text.contains("AST parser crashed"));
}

#[test]
fn fixture_without_documents_skips_the_doc_analyst() {
    let fixture = Fixture::from_json_str(RECORDED_RUN).unwrap();
    let pipeline = fixture.register(PipelineBuilder::new()).build().unwrap();
    let outcome = pipeline.run(RunInput::new("https://github.com/acme/agent"));

    assert!(outcome.verdict.criterion("theoretical_depth").is_none());
    assert_eq!(outcome.verdict.per_dimension.len(), 3);
}

#[test]
fn malformed_fixture_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, r#"{ "collectors": { "repository": { "evidence": [ { "kind": 1 } ] } } }"#);

    let Err(TribunalError::Validation(err)) = Fixture::load(&path) else {
        panic!("expected a validation error");
    };
    assert!(err.to_string().contains("run.json"));
}

#[test]
fn missing_fixture_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Fixture::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, TribunalError::Io { .. }));
}

#[test]
fn rewritten_fixture_replays_to_the_same_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let original = Fixture::from_json_str(RECORDED_RUN).unwrap();
    let rewritten = Fixture::load(&write_fixture(&dir, &original.to_json_string().unwrap())).unwrap();

    assert_eq!(rewritten, original);
    assert_eq!(replay(&rewritten).verdict.digest(), replay(&original).verdict.digest());
}
