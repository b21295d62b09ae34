use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Lineup, LineupExperiment, MetricsAggregate, Recommendation, Slate, SlateConfig, TopicProfile,
};
use crate::rankers::{LineupRanker, Sampler};
use crate::services::{ExperimentCatalog, MetricsStore, QaOverrides, SlateAssembler, TopicProfileProvider};

/// Builds lineups: resolves slate configs, orders them, assembles every
/// slate concurrently and removes items repeated across slates.
pub struct LineupAssembler {
    catalog: Arc<ExperimentCatalog>,
    slates: Arc<SlateAssembler>,
    slate_metrics: Arc<MetricsStore>,
    topic_profiles: Arc<dyn TopicProfileProvider>,
    qa: QaOverrides,
    sampler: Arc<Sampler>,
}

impl LineupAssembler {
    pub fn new(
        catalog: Arc<ExperimentCatalog>,
        slates: Arc<SlateAssembler>,
        slate_metrics: Arc<MetricsStore>,
        topic_profiles: Arc<dyn TopicProfileProvider>,
        qa: QaOverrides,
        sampler: Arc<Sampler>,
    ) -> Self {
        Self {
            catalog,
            slates,
            slate_metrics,
            topic_profiles,
            qa,
            sampler,
        }
    }

    pub async fn assemble(
        &self,
        lineup_id: &str,
        experiment: &LineupExperiment,
        user_id: &str,
        slate_count: Option<usize>,
        recommendation_count: Option<usize>,
    ) -> Result<Lineup> {
        let mut configs = self.resolve_slate_configs(experiment, user_id)?;

        for ranker in &experiment.rankers {
            configs = self.rank_slate_configs(lineup_id, ranker, configs, user_id).await?;
        }

        if let Some(count) = slate_count {
            configs.truncate(count);
        }

        let mut slates = try_join_all(
            configs
                .iter()
                .map(|config| self.slates.assemble_config(config, user_id)),
        )
        .await?;

        dedupe_recommendations(&mut slates);

        if let Some(count) = recommendation_count {
            for slate in &mut slates {
                slate.recommendations.truncate(count);
            }
        }

        let lineup = Lineup {
            id: lineup_id.to_string(),
            request_id: Uuid::new_v4(),
            experiment_id: experiment.id.clone(),
            slates,
        };

        info!(
            lineup_id = %lineup.id,
            experiment_id = %lineup.experiment_id,
            request_id = %lineup.request_id,
            slates = lineup.slates.len(),
            recommendations = lineup.slates.iter().map(|s| s.recommendations.len()).sum::<usize>(),
            "Assembled lineup"
        );

        Ok(lineup)
    }

    /// Slate configs named by the experiment, with QA substitutions applied
    fn resolve_slate_configs(
        &self,
        experiment: &LineupExperiment,
        user_id: &str,
    ) -> Result<Vec<SlateConfig>> {
        experiment
            .slate_config_ids
            .iter()
            .map(|id| {
                let resolved = self.qa.resolve(user_id, id);
                self.catalog.slate_config(resolved).cloned()
            })
            .collect()
    }

    async fn rank_slate_configs(
        &self,
        lineup_id: &str,
        ranker: &LineupRanker,
        configs: Vec<SlateConfig>,
        user_id: &str,
    ) -> Result<Vec<SlateConfig>> {
        let metrics = if ranker.needs_metrics() {
            self.fetch_slate_metrics(lineup_id, &configs).await
        } else {
            HashMap::new()
        };

        let profile: Option<TopicProfile> = if ranker.needs_topic_profile() {
            Some(self.topic_profiles.topic_profile(user_id).await?)
        } else {
            None
        };

        self.sampler
            .with_rng(|rng| ranker.rank(configs, &metrics, profile.as_ref(), rng))
    }

    async fn fetch_slate_metrics(
        &self,
        lineup_id: &str,
        configs: &[SlateConfig],
    ) -> HashMap<String, MetricsAggregate> {
        let slate_ids: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();

        match self.slate_metrics.get(lineup_id, &slate_ids).await {
            Ok(metrics) => {
                if metrics.is_empty() && !slate_ids.is_empty() {
                    warn!(lineup_id = %lineup_id, "No slate metrics found, ranking with default priors");
                }
                metrics
            }
            Err(e) => {
                warn!(lineup_id = %lineup_id, error = %e, "Slate metrics unavailable, ranking with default priors");
                HashMap::new()
            }
        }
    }
}

/// Keep each item only in the first slate that recommends it.
pub fn dedupe_recommendations(slates: &mut [Slate]) {
    let mut seen: HashSet<String> = HashSet::new();
    for slate in slates.iter_mut() {
        let recs = std::mem::take(&mut slate.recommendations);
        let (kept, dropped): (Vec<Recommendation>, Vec<Recommendation>) = recs
            .into_iter()
            .partition(|rec| !seen.contains(rec.item_id()));

        if !dropped.is_empty() {
            debug!(slate_id = %slate.id, dropped = dropped.len(), "Removed duplicate recommendations");
        }
        seen.extend(kept.iter().map(|rec| rec.item_id().to_string()));
        slate.recommendations = kept;
    }
}

/// Request-level entry point: picks experiments and delegates to the assemblers.
pub struct LineupService {
    catalog: Arc<ExperimentCatalog>,
    lineups: LineupAssembler,
    slates: Arc<SlateAssembler>,
    qa: QaOverrides,
    sampler: Arc<Sampler>,
}

impl LineupService {
    pub fn new(
        catalog: Arc<ExperimentCatalog>,
        slates: Arc<SlateAssembler>,
        slate_metrics: Arc<MetricsStore>,
        topic_profiles: Arc<dyn TopicProfileProvider>,
        qa: QaOverrides,
        sampler: Arc<Sampler>,
    ) -> Self {
        let lineups = LineupAssembler::new(
            Arc::clone(&catalog),
            Arc::clone(&slates),
            slate_metrics,
            topic_profiles,
            qa.clone(),
            Arc::clone(&sampler),
        );
        Self {
            catalog,
            lineups,
            slates,
            qa,
            sampler,
        }
    }

    /// Resolve lineup `lineup_id` for `user_id`
    pub async fn lineup(
        &self,
        lineup_id: &str,
        user_id: &str,
        slate_count: Option<usize>,
        recommendation_count: Option<usize>,
    ) -> Result<Lineup> {
        let config = self.catalog.lineup_config(lineup_id)?;
        let experiment = config.choose_experiment(&self.sampler)?;
        self.lineups
            .assemble(lineup_id, experiment, user_id, slate_count, recommendation_count)
            .await
    }

    /// Resolve a single slate outside any lineup. No cross-slate dedup applies.
    pub async fn slate(
        &self,
        slate_id: &str,
        user_id: &str,
        recommendation_count: Option<usize>,
    ) -> Result<Slate> {
        let config = self.catalog.slate_config(self.qa.resolve(user_id, slate_id))?;
        let mut slate = self.slates.assemble_config(config, user_id).await?;
        if let Some(count) = recommendation_count {
            slate.recommendations.truncate(count);
        }
        Ok(slate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;
    use serde_json::json;

    fn slate(id: &str, item_ids: &[&str]) -> Slate {
        Slate {
            id: id.to_string(),
            experiment_id: format!("{}-exp", id),
            display_name: None,
            description: None,
            recommendations: item_ids
                .iter()
                .map(|item_id| {
                    let candidate: Candidate =
                        serde_json::from_value(json!({ "item_id": item_id })).unwrap();
                    Recommendation::from_candidate("RecommendationAPI", &candidate)
                })
                .collect(),
        }
    }

    fn item_ids(slate: &Slate) -> Vec<&str> {
        slate.recommendations.iter().map(|r| r.item_id()).collect()
    }

    #[test]
    fn test_first_slate_keeps_duplicate() {
        let mut slates = vec![
            slate("s1", &["10", "11"]),
            slate("s2", &["11", "12"]),
            slate("s3", &["10", "12", "13"]),
        ];

        dedupe_recommendations(&mut slates);

        assert_eq!(item_ids(&slates[0]), vec!["10", "11"]);
        assert_eq!(item_ids(&slates[1]), vec!["12"]);
        assert_eq!(item_ids(&slates[2]), vec!["13"]);
    }

    #[test]
    fn test_duplicates_within_one_slate_untouched() {
        let mut slates = vec![slate("s1", &["10", "10"]), slate("s2", &["10"])];

        dedupe_recommendations(&mut slates);

        assert_eq!(item_ids(&slates[0]), vec!["10", "10"]);
        assert!(slates[1].recommendations.is_empty());
    }
}
