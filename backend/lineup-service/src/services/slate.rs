use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{MetricsAggregate, Recommendation, Slate, SlateConfig, SlateExperiment};
use crate::rankers::Sampler;
use crate::services::{CandidateSetStore, MetricsStore};

/// Builds the recommendations of one slate from its experiment.
pub struct SlateAssembler {
    candidate_sets: Arc<CandidateSetStore>,
    metrics: Arc<MetricsStore>,
    sampler: Arc<Sampler>,
    recommendation_source: String,
}

impl SlateAssembler {
    pub fn new(
        candidate_sets: Arc<CandidateSetStore>,
        metrics: Arc<MetricsStore>,
        sampler: Arc<Sampler>,
        recommendation_source: impl Into<String>,
    ) -> Self {
        Self {
            candidate_sets,
            metrics,
            sampler,
            recommendation_source: recommendation_source.into(),
        }
    }

    /// Assemble `config` with an experiment picked by weight
    pub async fn assemble_config(&self, config: &SlateConfig, user_id: &str) -> Result<Slate> {
        let experiment = config.choose_experiment(&self.sampler)?;
        self.assemble(config, experiment, user_id).await
    }

    /// Fetch the experiment's candidate sets, flatten them in order and run
    /// the rankers.
    ///
    /// A missing candidate set fails the slate. Missing metrics do not.
    pub async fn assemble(
        &self,
        config: &SlateConfig,
        experiment: &SlateExperiment,
        user_id: &str,
    ) -> Result<Slate> {
        let sets = try_join_all(
            experiment
                .candidate_set_ids
                .iter()
                .map(|id| self.candidate_sets.get(id)),
        )
        .await?;

        let mut recs: Vec<Recommendation> = sets
            .iter()
            .flat_map(|set| set.candidates.iter())
            .map(|candidate| Recommendation::from_candidate(&self.recommendation_source, candidate))
            .collect();

        for ranker in &experiment.rankers {
            let metrics = if ranker.needs_metrics() {
                self.fetch_metrics(&config.id, &recs).await
            } else {
                HashMap::new()
            };
            recs = self
                .sampler
                .with_rng(|rng| ranker.rank(recs, &metrics, rng));
        }

        debug!(
            slate_id = %config.id,
            experiment_id = %experiment.id,
            user_id = %user_id,
            recommendations = recs.len(),
            "Assembled slate"
        );

        Ok(Slate {
            id: config.id.clone(),
            experiment_id: experiment.id.clone(),
            display_name: config.display_name.clone(),
            description: config.description.clone(),
            recommendations: recs,
        })
    }

    async fn fetch_metrics(
        &self,
        slate_id: &str,
        recs: &[Recommendation],
    ) -> HashMap<String, MetricsAggregate> {
        let item_ids: Vec<String> = recs.iter().map(|r| r.item_id().to_string()).collect();

        match self.metrics.get(slate_id, &item_ids).await {
            Ok(metrics) => {
                if metrics.is_empty() && !item_ids.is_empty() {
                    warn!(
                        slate_id = %slate_id,
                        items = item_ids.len(),
                        "No metrics found for slate, ranking with default priors"
                    );
                }
                metrics
            }
            Err(e) => {
                warn!(
                    slate_id = %slate_id,
                    error = %e,
                    "Metrics unavailable, ranking with default priors"
                );
                HashMap::new()
            }
        }
    }
}
