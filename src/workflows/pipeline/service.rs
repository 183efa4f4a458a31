use std::sync::Arc;

use super::gateway::EvaluationGateway;
use super::ledger::ApplicationStageLedger;
use super::orchestrator::EvaluationRunOrchestrator;
use super::registry::StageRegistry;
use super::repository::PipelineRepository;
use super::scoring::ScoreAggregator;

/// Wires the registry, ledger, orchestrator and aggregator over one repository.
pub struct HiringPipeline<R, G> {
    repository: Arc<R>,
    registry: StageRegistry<R>,
    ledger: Arc<ApplicationStageLedger<R>>,
    aggregator: Arc<ScoreAggregator<R>>,
    orchestrator: EvaluationRunOrchestrator<R, G>,
}

impl<R, G> HiringPipeline<R, G>
where
    R: PipelineRepository + 'static,
    G: EvaluationGateway + 'static,
{
    pub fn new(repository: Arc<R>, gateway: Arc<G>, ranking_limit: usize) -> Self {
        let registry = StageRegistry::new(repository.clone());
        let ledger = Arc::new(ApplicationStageLedger::new(repository.clone()));
        let aggregator = Arc::new(ScoreAggregator::new(repository.clone(), ranking_limit));
        let orchestrator = EvaluationRunOrchestrator::new(
            repository.clone(),
            ledger.clone(),
            aggregator.clone(),
            gateway,
        );

        Self {
            repository,
            registry,
            ledger,
            aggregator,
            orchestrator,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn registry(&self) -> &StageRegistry<R> {
        &self.registry
    }

    pub fn ledger(&self) -> &ApplicationStageLedger<R> {
        &self.ledger
    }

    pub fn scores(&self) -> &ScoreAggregator<R> {
        &self.aggregator
    }

    pub fn evaluations(&self) -> &EvaluationRunOrchestrator<R, G> {
        &self.orchestrator
    }
}
