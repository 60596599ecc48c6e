//! End-to-end runs against a scripted model and shell-script solvers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dpacheck_core::{
    CancelToken, Completeness, CompletenessReport, DpaError, Evidence, RequirementSelector,
    SolverStatus, Strategy, REPORT_FILE_NAME, SUMMARY_FILE_NAME,
};
use dpacheck_eval::{EvalError, Pipeline, RunConfig};
use llm_gateway::fakes::ScriptedBackend;
use llm_gateway::GatewayError;

const REQUIREMENTS: &str = r#"{
    "8": {
        "text": "The processor shall not engage another processor without prior specific or general written authorisation of the controller.",
        "symbolic": "&forbidden{engage_sub_processor} :- role(processor), not prior_authorisation.",
        "atoms": ["role(processor)", "engage_sub_processor", "prior_authorisation"]
    },
    "5": {
        "text": "The processor shall process the personal data only on documented instructions from the controller.",
        "symbolic": "&obligatory{process_on_documented_instructions} :- role(processor).",
        "atoms": ["role(processor)", "process_on_documented_instructions"]
    },
    "7": {
        "text": "The processor shall take all measures required pursuant to Article 32.",
        "symbolic": "&obligatory{ensure_security_of_processing} :- role(processor).",
        "atoms": ["role(processor)", "ensure_security_of_processing"]
    },
    "6": {
        "text": "The processor shall ensure that persons authorised to process the personal data have committed themselves to confidentiality.",
        "symbolic": "&obligatory{ensure_confidentiality_commitment} :- role(processor).",
        "atoms": ["role(processor)", "ensure_confidentiality_commitment"]
    }
}"#;

const DOCUMENT: &str = "This Agreement is entered into between Customer and Provider.

Provider shall ensure that all personnel authorised to process Customer Data are bound by
confidentiality obligations and that appropriate security measures are in place.

Provider may engage subprocessors at its discretion.
";

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let requirements = dir.join("requirements.json");
    let document = dir.join("online_1.txt");
    std::fs::write(&requirements, REQUIREMENTS).unwrap();
    std::fs::write(&document, DOCUMENT).unwrap();
    (requirements, document)
}

fn config(dir: &Path, strategy: Strategy) -> RunConfig {
    let (requirements_path, document_path) = write_inputs(dir);
    let mut config = RunConfig {
        strategy,
        requirements_path,
        document_path,
        output_directory: dir.join("out"),
        ..RunConfig::default()
    };
    config.llm.readiness_attempts = 2;
    config.llm.readiness_delay_ms = 1;
    config.llm.backoff_base_ms = 1;
    config
}

fn ids_and_labels(report: &CompletenessReport) -> Vec<(String, Completeness)> {
    report
        .verdicts
        .iter()
        .map(|v| (v.requirement_id.clone(), v.completeness))
        .collect()
}

fn expected(pairs: &[(&str, Completeness)]) -> Vec<(String, Completeness)> {
    pairs.iter().map(|(id, c)| (id.to_string(), *c)).collect()
}

#[tokio::test]
async fn pairwise_threshold_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|req| {
        let requirement_6 = req.prompt.contains("committed themselves to confidentiality");
        let segment_2 = req.prompt.contains("personnel authorised");
        if requirement_6 && segment_2 {
            Ok(r#"{"coverage": 0.9, "rationale": "Personnel are bound by confidentiality."}"#.into())
        } else {
            Ok(r#"{"coverage": 0.3, "rationale": "Not addressed."}"#.into())
        }
    }));

    let mut cfg = config(dir.path(), Strategy::Pairwise);
    cfg.coverage_threshold = 0.7;
    let outcome = Pipeline::new(cfg, backend.clone()).run().await.unwrap();
    let report = outcome.report;

    assert_eq!(
        ids_and_labels(&report),
        expected(&[
            ("5", Completeness::Incomplete),
            ("6", Completeness::Complete),
            ("7", Completeness::Incomplete),
            ("8", Completeness::Incomplete),
        ])
    );
    assert!(report.verdicts[1].justification.contains("best segment 2"));
    assert_eq!(report.segment_count, 3);
    assert_eq!(report.target_document, "online_1");
    assert!(!report.cancelled);
    assert_eq!(backend.calls(), 12);
    assert_eq!(report.statistics.llm_calls, 12);

    let out = dir.path().join("out");
    assert_eq!(outcome.report_path, out.join(REPORT_FILE_NAME));
    assert!(out.join(SUMMARY_FILE_NAME).exists());
    let written: CompletenessReport =
        serde_json::from_str(&std::fs::read_to_string(&outcome.report_path).unwrap()).unwrap();
    assert_eq!(written.verdicts.len(), 4);
    assert_eq!(written.summary.complete, 1);
}

#[cfg(unix)]
fn write_solver(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake_deolingo.sh");
    let script = r#"#!/bin/sh
if grep -q '^% requirement 8$' "$1"; then sleep 5; fi
if grep -q '^-ensure_security_of_processing\.$' "$1"; then
  echo 'Answer: 1'
  echo 'status(violated)'
  echo SATISFIABLE
  exit 10
fi
echo 'Answer: 1'
echo 'status(satisfied)'
echo SATISFIABLE
exit 10
"#;
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn classify_extract_verify_with_solver_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let solver = write_solver(dir.path());

    let backend = Arc::new(ScriptedBackend::new(|req| {
        let classifying = req
            .system
            .as_deref()
            .is_some_and(|s| s.contains("Requirements:"));
        if classifying {
            return Ok(if req.prompt.contains("personnel authorised") {
                "6 7".into()
            } else if req.prompt.contains("subprocessors") {
                "R8".into()
            } else {
                "NONE".into()
            });
        }
        if req.prompt.contains("ensure_confidentiality_commitment") {
            Ok("role(processor); ensure_confidentiality_commitment".into())
        } else if req.prompt.contains("ensure_security_of_processing") {
            Ok("role(processor); -ensure_security_of_processing".into())
        } else {
            Ok("role(processor); engage_sub_processor".into())
        }
    }));

    let mut cfg = config(dir.path(), Strategy::ClassifyExtractVerify);
    cfg.solver.program = solver.to_string_lossy().into_owned();
    cfg.solver.timeout_ms = 300;
    cfg.solver.keep_programs = true;
    let report = Pipeline::new(cfg, backend.clone()).run().await.unwrap().report;

    assert_eq!(
        ids_and_labels(&report),
        expected(&[
            ("5", Completeness::Unclear),
            ("6", Completeness::Complete),
            ("7", Completeness::Incomplete),
            ("8", Completeness::Unclear),
        ])
    );

    let solver_evidence = report.verdicts[3].evidence.iter().find_map(|e| match e {
        Evidence::Solver(result) => Some(result.clone()),
        _ => None,
    });
    let result = solver_evidence.expect("requirement 8 carries its solver result");
    assert_eq!(result.status, SolverStatus::Undetermined);
    assert!(result.raw_solver_output.contains("timed out"));

    assert!(report.verdicts[1]
        .evidence
        .contains(&Evidence::Segment { segment_id: "2".into() }));

    // 3 classifications + 3 extractions
    assert_eq!(backend.calls(), 6);
    assert_eq!(report.statistics.solver_invocations, 3);
    assert_eq!(report.statistics.extraction_failures, 0);
    assert!(dir.path().join("out/programs/req_6.lp").exists());
    assert!(!dir.path().join("out/programs/req_5.lp").exists());
}

#[tokio::test]
async fn deadline_marks_unfinished_requirements_unclear() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        ScriptedBackend::constant("COMPLETE\nAll segments agree.").with_latency(|req| {
            if req.prompt.contains("Article 32") || req.prompt.contains("prior specific") {
                Duration::from_secs(10)
            } else {
                Duration::ZERO
            }
        }),
    );

    let mut cfg = config(dir.path(), Strategy::Direct);
    cfg.deadline_ms = Some(300);
    let started = Instant::now();
    let report = Pipeline::new(cfg, backend).run().await.unwrap().report;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.cancelled);
    assert_eq!(
        ids_and_labels(&report),
        expected(&[
            ("5", Completeness::Complete),
            ("6", Completeness::Complete),
            ("7", Completeness::Unclear),
            ("8", Completeness::Unclear),
        ])
    );
    assert_eq!(report.verdicts[0].evidence.len(), 3);
}

#[tokio::test]
async fn cancelled_before_start_still_reports_every_requirement() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::constant(r#"{"coverage": 1.0}"#));
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = Pipeline::new(config(dir.path(), Strategy::Pairwise), backend.clone())
        .with_cancel(cancel)
        .run()
        .await
        .unwrap()
        .report;

    assert!(report.cancelled);
    assert_eq!(report.verdicts.len(), 4);
    assert!(report
        .verdicts
        .iter()
        .all(|v| v.completeness == Completeness::Unclear));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn direct_backend_error_is_local_to_requirement() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|req| {
        if req.prompt.contains("documented instructions") {
            Err(GatewayError::InvalidRequest("prompt exceeds context window".into()))
        } else {
            Ok("INCOMPLETE - nothing on this".into())
        }
    }));

    let report = Pipeline::new(config(dir.path(), Strategy::Direct), backend)
        .run()
        .await
        .unwrap()
        .report;

    assert_eq!(report.verdicts[0].completeness, Completeness::Unclear);
    assert!(report.verdicts[0].justification.contains("context window"));
    assert!(report.verdicts[1..]
        .iter()
        .all(|v| v.completeness == Completeness::Incomplete));
}

#[tokio::test]
async fn unknown_requirement_aborts_before_model_calls() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::constant("NONE"));
    let mut cfg = config(dir.path(), Strategy::Direct);
    cfg.requirement_ids = RequirementSelector::Ids(vec!["6".into(), "42".into()]);

    let err = Pipeline::new(cfg, backend.clone()).run().await.unwrap_err();
    assert!(matches!(err, EvalError::Dpa(DpaError::UnknownRequirement(ref id)) if id == "42"));
    assert!(err.is_configuration());
    assert_eq!(backend.calls(), 0);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn unreachable_backend_aborts_after_probe() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::constant("COMPLETE").unhealthy_for(5));

    let err = Pipeline::new(config(dir.path(), Strategy::Direct), backend.clone())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EvalError::Gateway(GatewayError::BackendUnavailable { attempts: 2, .. })
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn cancel_interrupts_readiness_probe() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::constant("COMPLETE").unhealthy_for(u32::MAX));
    let mut cfg = config(dir.path(), Strategy::Direct);
    cfg.llm.readiness_attempts = 5;
    cfg.llm.readiness_delay_ms = 10_000;

    let pipeline = Pipeline::new(cfg, backend.clone());
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let report = pipeline.run().await.unwrap().report;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.cancelled);
    assert_eq!(report.verdicts.len(), 4);
    assert!(report
        .verdicts
        .iter()
        .all(|v| v.completeness == Completeness::Unclear));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn selection_and_segment_limits_narrow_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::constant("UNCLEAR"));
    let mut cfg = config(dir.path(), Strategy::Direct);
    cfg.requirement_ids = "7,5".parse().unwrap();
    cfg.max_segments = 2;
    cfg.segment_ids = Some(vec!["2".into()]);

    let report = Pipeline::new(cfg, backend.clone()).run().await.unwrap().report;

    // registry order, not selection order
    let ids: Vec<&str> = report.verdicts.iter().map(|v| v.requirement_id.as_str()).collect();
    assert_eq!(ids, vec!["5", "7"]);
    assert_eq!(report.segment_count, 1);
    let prompts = backend.prompts();
    assert!(prompts.iter().all(|p| p.contains("[2] Provider shall ensure")));
    assert!(prompts.iter().all(|p| !p.contains("[1]")));
}
