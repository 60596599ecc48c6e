//! The three evaluation strategies.
//!
//! Each strategy produces one [`StrategyOutcome`] per targeted requirement;
//! the aggregator turns those into verdicts. Work fans out over two worker
//! pools, one bounding concurrent LLM calls and one bounding concurrent
//! solver processes.

use std::collections::HashMap;
use std::sync::Arc;

use deontic_solver::SolverAdapter;
use dpacheck_core::{
    CancelToken, ExtractedFact, Metrics, PairScore, Requirement, RequirementId, Segment, Strategy,
    StrategyOutcome,
};
use llm_gateway::{Gateway, GatewayError, GenerateOptions};
use tracing::{debug, info};

use crate::direct::DirectEvaluator;
use crate::extractor::{merge_facts, FactExtractor};
use crate::pairwise::PairwiseComparator;
use crate::pool::WorkerPool;

pub type Outcomes = HashMap<RequirementId, StrategyOutcome>;

pub const CANCELLED_REASON: &str = "run cancelled before evaluation finished";
pub const NOT_CLASSIFIED_REASON: &str = "no segment classified as relevant";
pub const NO_FACTS_REASON: &str = "no facts extracted";

fn failure_reason(stage: &str, err: &GatewayError) -> String {
    match err {
        GatewayError::Cancelled => CANCELLED_REASON.to_string(),
        other => format!("{stage} failed: {other}"),
    }
}

fn all_missing(requirements: &[Requirement], reason: &str) -> Outcomes {
    requirements
        .iter()
        .map(|r| (r.id.clone(), StrategyOutcome::missing(reason)))
        .collect()
}

/// Evidence gathered for one requirement across segments.
struct Collected<T> {
    items: Vec<T>,
    failure: Option<String>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failure: None,
        }
    }
}

impl<T> Collected<T> {
    fn fail(&mut self, reason: String) {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }
}

/// Runs a strategy over a fixed set of requirements and segments.
pub struct StrategyRunner {
    gateway: Arc<Gateway>,
    options: GenerateOptions,
    solver: Arc<SolverAdapter>,
    llm_pool: WorkerPool,
    solver_pool: WorkerPool,
    metrics: Arc<Metrics>,
    cancel: CancelToken,
    require_actor_fact: bool,
}

impl StrategyRunner {
    pub fn new(
        gateway: Arc<Gateway>,
        options: GenerateOptions,
        cancel: CancelToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            options,
            solver: Arc::new(SolverAdapter::default().with_cancel(cancel.clone())),
            llm_pool: WorkerPool::new(4, cancel.clone()),
            solver_pool: WorkerPool::new(2, cancel.clone()),
            metrics,
            cancel,
            require_actor_fact: false,
        }
    }

    pub fn with_solver(mut self, solver: SolverAdapter) -> Self {
        self.solver = Arc::new(solver.with_cancel(self.cancel.clone()));
        self
    }

    pub fn with_workers(mut self, llm_workers: usize, solver_workers: usize) -> Self {
        self.llm_pool = WorkerPool::new(llm_workers, self.cancel.clone());
        self.solver_pool = WorkerPool::new(solver_workers, self.cancel.clone());
        self
    }

    pub fn with_require_actor_fact(mut self, require: bool) -> Self {
        self.require_actor_fact = require;
        self
    }

    pub async fn run(
        &self,
        strategy: Strategy,
        requirements: &[Requirement],
        segments: &[Segment],
    ) -> Outcomes {
        match strategy {
            Strategy::ClassifyExtractVerify => {
                self.classify_extract_verify(requirements, segments).await
            }
            Strategy::Pairwise => self.pairwise(requirements, segments).await,
            Strategy::Direct => self.direct(requirements, segments).await,
        }
    }

    async fn classify_extract_verify(
        &self,
        requirements: &[Requirement],
        segments: &[Segment],
    ) -> Outcomes {
        let extractor = Arc::new(
            FactExtractor::new(
                Arc::clone(&self.gateway),
                self.options.clone(),
                Arc::clone(&self.metrics),
            )
            .with_require_actor_fact(self.require_actor_fact),
        );
        let targeted: Arc<Vec<Requirement>> = Arc::new(requirements.to_vec());

        // classify every segment against the whole targeted set
        let ex = Arc::clone(&extractor);
        let reqs = Arc::clone(&targeted);
        let classified = self
            .llm_pool
            .run(segments.to_vec(), move |segment| {
                let (ex, reqs) = (Arc::clone(&ex), Arc::clone(&reqs));
                async move {
                    let ids = ex.classify_segment(&segment, &reqs).await;
                    (segment, ids)
                }
            })
            .await;
        if self.cancel.is_cancelled() {
            return all_missing(requirements, CANCELLED_REASON);
        }

        let by_id: HashMap<&str, &Requirement> =
            requirements.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut pairs: Vec<(Segment, Requirement)> = Vec::new();
        for (segment, ids) in classified.into_iter().flatten() {
            for id in ids {
                if let Some(req) = by_id.get(id.as_str()) {
                    pairs.push((segment.clone(), (*req).clone()));
                }
            }
        }
        info!(
            segments = segments.len(),
            pairs = pairs.len(),
            "classification finished"
        );

        // extract facts for every (segment, candidate requirement) pair
        let owners: Vec<RequirementId> = pairs.iter().map(|(_, r)| r.id.clone()).collect();
        let ex = Arc::clone(&extractor);
        let extracted = self
            .llm_pool
            .run(pairs, move |(segment, requirement)| {
                let ex = Arc::clone(&ex);
                async move { ex.extract(&segment, &requirement).await }
            })
            .await;

        let mut collected: HashMap<RequirementId, Collected<ExtractedFact>> = HashMap::new();
        for (owner, result) in owners.into_iter().zip(extracted) {
            let entry = collected.entry(owner).or_default();
            match result {
                Some(Ok(facts)) => entry.items.extend(facts),
                Some(Err(err)) => entry.fail(failure_reason("fact extraction", &err)),
                None => entry.fail(CANCELLED_REASON.to_string()),
            }
        }

        let mut outcomes = Outcomes::new();
        let mut to_solve: Vec<(Requirement, Vec<ExtractedFact>)> = Vec::new();
        for requirement in requirements {
            let outcome = match collected.remove(&requirement.id) {
                None => StrategyOutcome::missing(NOT_CLASSIFIED_REASON),
                Some(Collected {
                    failure: Some(reason),
                    ..
                }) => StrategyOutcome::missing(reason),
                Some(Collected { items, .. }) if items.is_empty() => {
                    StrategyOutcome::missing(NO_FACTS_REASON)
                }
                Some(Collected { items, .. }) => {
                    to_solve.push((requirement.clone(), merge_facts(items)));
                    continue;
                }
            };
            debug!(requirement_id = %requirement.id, ?outcome, "requirement not sent to solver");
            outcomes.insert(requirement.id.clone(), outcome);
        }

        // at most one solver run per requirement
        let owners: Vec<RequirementId> = to_solve.iter().map(|(r, _)| r.id.clone()).collect();
        let solver = Arc::clone(&self.solver);
        let metrics = Arc::clone(&self.metrics);
        let solved = self
            .solver_pool
            .run(to_solve, move |(requirement, facts)| {
                let (solver, metrics) = (Arc::clone(&solver), Arc::clone(&metrics));
                async move {
                    metrics.inc_solver_invocations();
                    solver.solve(&requirement, facts).await
                }
            })
            .await;
        for (owner, result) in owners.into_iter().zip(solved) {
            let outcome = match result {
                Some(result) => StrategyOutcome::Solver(result),
                None => StrategyOutcome::missing(CANCELLED_REASON),
            };
            outcomes.insert(owner, outcome);
        }
        outcomes
    }

    async fn pairwise(&self, requirements: &[Requirement], segments: &[Segment]) -> Outcomes {
        let comparator = Arc::new(PairwiseComparator::new(
            Arc::clone(&self.gateway),
            self.options.clone(),
        ));

        let pairs: Vec<(Segment, Requirement)> = requirements
            .iter()
            .flat_map(|r| segments.iter().map(move |s| (s.clone(), r.clone())))
            .collect();
        info!(
            requirements = requirements.len(),
            segments = segments.len(),
            pairs = pairs.len(),
            "scoring pairs"
        );
        let owners: Vec<RequirementId> = pairs.iter().map(|(_, r)| r.id.clone()).collect();
        let scored = self
            .llm_pool
            .run(pairs, move |(segment, requirement)| {
                let comparator = Arc::clone(&comparator);
                async move { comparator.score(&segment, &requirement).await }
            })
            .await;

        let mut collected: HashMap<RequirementId, Collected<PairScore>> = requirements
            .iter()
            .map(|r| (r.id.clone(), Collected::default()))
            .collect();
        for (owner, result) in owners.into_iter().zip(scored) {
            let entry = collected.entry(owner).or_default();
            match result {
                Some(Ok(Some(score))) => entry.items.push(score),
                Some(Ok(None)) => {}
                Some(Err(err)) => entry.fail(failure_reason("pair scoring", &err)),
                None => entry.fail(CANCELLED_REASON.to_string()),
            }
        }

        collected
            .into_iter()
            .map(|(id, c)| {
                let outcome = match c.failure {
                    Some(reason) => StrategyOutcome::missing(reason),
                    None => StrategyOutcome::Pairwise { scores: c.items },
                };
                (id, outcome)
            })
            .collect()
    }

    async fn direct(&self, requirements: &[Requirement], segments: &[Segment]) -> Outcomes {
        let evaluator = Arc::new(DirectEvaluator::new(
            Arc::clone(&self.gateway),
            self.options.clone(),
        ));
        let segments: Arc<Vec<Segment>> = Arc::new(segments.to_vec());

        let evaluated = self
            .llm_pool
            .run(requirements.to_vec(), move |requirement| {
                let (evaluator, segments) = (Arc::clone(&evaluator), Arc::clone(&segments));
                async move { evaluator.evaluate(&requirement, &segments).await }
            })
            .await;

        requirements
            .iter()
            .zip(evaluated)
            .map(|(requirement, result)| {
                let outcome = match result {
                    Some(Ok(verdict)) => StrategyOutcome::Direct(verdict),
                    Some(Err(err)) => {
                        StrategyOutcome::missing(failure_reason("direct evaluation", &err))
                    }
                    None => StrategyOutcome::missing(CANCELLED_REASON),
                };
                (requirement.id.clone(), outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpacheck_core::DeonticEncoding;
    use llm_gateway::fakes::ScriptedBackend;
    use llm_gateway::{GatewayConfig, RetryPolicy};

    fn requirement(id: &str, predicate: &str) -> Requirement {
        let encoding =
            DeonticEncoding::parse(&format!("&obligatory{{{predicate}}} :- role(processor)."))
                .unwrap();
        Requirement {
            id: id.into(),
            text: format!("Requirement about {predicate}."),
            actor: "processor".into(),
            modality: encoding.modality,
            condition: None,
            atoms: vec!["role(processor)".into(), predicate.into()],
            encoding,
        }
    }

    fn segments(n: usize) -> Vec<Segment> {
        (1..=n)
            .map(|i| Segment::new(i.to_string(), i - 1, format!("Clause number {i}."), "dpa"))
            .collect()
    }

    fn runner(backend: ScriptedBackend) -> StrategyRunner {
        let gateway = Gateway::new(
            Arc::new(backend),
            GatewayConfig {
                retry: RetryPolicy {
                    max_retries: 0,
                    backoff_base_ms: 1,
                },
                cache: false,
            },
        );
        StrategyRunner::new(
            Arc::new(gateway),
            GenerateOptions::default(),
            CancelToken::new(),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn pairwise_gateway_failure_marks_only_that_requirement() {
        let backend = ScriptedBackend::new(|req| {
            if req.prompt.contains("about b") && req.prompt.contains("Clause number 2") {
                Err(GatewayError::InvalidRequest("context too long".into()))
            } else if req.prompt.contains("about a") {
                Ok("not a score".into())
            } else {
                Ok(r#"{"coverage": 0.3}"#.into())
            }
        });
        let reqs = vec![requirement("1", "a"), requirement("2", "b"), requirement("3", "c")];
        let outcomes = runner(backend).run(Strategy::Pairwise, &reqs, &segments(2)).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes["1"], StrategyOutcome::Pairwise { scores: vec![] });
        assert!(matches!(
            &outcomes["2"],
            StrategyOutcome::Missing { reason } if reason.contains("context too long")
        ));
        match &outcomes["3"] {
            StrategyOutcome::Pairwise { scores } => assert_eq!(scores.len(), 2),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn direct_produces_verdict_per_requirement() {
        let backend = ScriptedBackend::new(|req| {
            if req.prompt.contains("about a") {
                Ok("COMPLETE\n[1] states it".into())
            } else {
                Ok("INCOMPLETE".into())
            }
        });
        let reqs = vec![requirement("1", "a"), requirement("2", "b")];
        let outcomes = runner(backend).run(Strategy::Direct, &reqs, &segments(3)).await;
        match &outcomes["1"] {
            StrategyOutcome::Direct(v) => {
                assert_eq!(v.completeness, dpacheck_core::Completeness::Complete);
                assert_eq!(v.evidence.len(), 3);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(&outcomes["2"], StrategyOutcome::Direct(_)));
    }

    #[tokio::test]
    async fn unclassified_requirements_are_missing() {
        let backend = ScriptedBackend::new(|req| {
            let system = req.system.as_deref().unwrap_or_default();
            if system.contains("Requirements:") {
                Ok("NONE".into())
            } else {
                Ok("NO_FACTS".into())
            }
        });
        let reqs = vec![requirement("1", "a")];
        let outcomes = runner(backend)
            .run(Strategy::ClassifyExtractVerify, &reqs, &segments(2))
            .await;
        assert_eq!(outcomes["1"], StrategyOutcome::missing(NOT_CLASSIFIED_REASON));
    }

    #[tokio::test]
    async fn classified_without_facts_is_missing() {
        let backend = ScriptedBackend::new(|req| {
            let system = req.system.as_deref().unwrap_or_default();
            if system.contains("Requirements:") {
                Ok("1".into())
            } else {
                Ok("NO_FACTS".into())
            }
        });
        let reqs = vec![requirement("1", "a")];
        let outcomes = runner(backend)
            .run(Strategy::ClassifyExtractVerify, &reqs, &segments(2))
            .await;
        assert_eq!(outcomes["1"], StrategyOutcome::missing(NO_FACTS_REASON));
    }
}
