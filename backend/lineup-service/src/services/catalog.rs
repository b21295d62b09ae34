use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::error::{LineupError, Result};
use crate::models::{LineupConfig, LineupExperiment, SlateConfig, SlateExperiment};
use crate::rankers::Sampler;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    slate_configs: Vec<SlateConfig>,
    #[serde(default)]
    lineup_configs: Vec<LineupConfig>,
}

/// Slate and lineup configurations with their experiments, validated on load.
#[derive(Debug, Default)]
pub struct ExperimentCatalog {
    slates: HashMap<String, SlateConfig>,
    lineups: HashMap<String, LineupConfig>,
}

impl ExperimentCatalog {
    pub fn new(slate_configs: Vec<SlateConfig>, lineup_configs: Vec<LineupConfig>) -> Result<Self> {
        let mut slates = HashMap::with_capacity(slate_configs.len());
        for config in slate_configs {
            validate_weights(&config.id, config.experiments.iter().map(|e| (&e.id, e.weight)))?;
            if slates.contains_key(&config.id) {
                return Err(LineupError::Validation(format!(
                    "duplicate slate config {}",
                    config.id
                )));
            }
            slates.insert(config.id.clone(), config);
        }

        let mut lineups = HashMap::with_capacity(lineup_configs.len());
        for config in lineup_configs {
            validate_weights(&config.id, config.experiments.iter().map(|e| (&e.id, e.weight)))?;
            for experiment in &config.experiments {
                if let Some(missing) = experiment
                    .slate_config_ids
                    .iter()
                    .find(|id| !slates.contains_key(*id))
                {
                    return Err(LineupError::NotFound(format!(
                        "slate config {} referenced by lineup experiment {}",
                        missing, experiment.id
                    )));
                }
            }
            if lineups.contains_key(&config.id) {
                return Err(LineupError::Validation(format!(
                    "duplicate lineup config {}",
                    config.id
                )));
            }
            lineups.insert(config.id.clone(), config);
        }

        Ok(Self { slates, lineups })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| LineupError::Validation(format!("invalid experiment catalog: {}", e)))?;
        Self::new(file.slate_configs, file.lineup_configs)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LineupError::Internal(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            slates = catalog.slates.len(),
            lineups = catalog.lineups.len(),
            "Loaded experiment catalog"
        );
        Ok(catalog)
    }

    pub fn slate_config(&self, id: &str) -> Result<&SlateConfig> {
        self.slates
            .get(id)
            .ok_or_else(|| LineupError::NotFound(format!("slate config {}", id)))
    }

    pub fn lineup_config(&self, id: &str) -> Result<&LineupConfig> {
        self.lineups
            .get(id)
            .ok_or_else(|| LineupError::NotFound(format!("lineup config {}", id)))
    }
}

fn validate_weights<'a>(
    config_id: &str,
    experiments: impl Iterator<Item = (&'a String, f64)>,
) -> Result<()> {
    let mut seen = HashSet::new();
    let mut count = 0;
    for (id, weight) in experiments {
        count += 1;
        if !weight.is_finite() || weight < 0.0 {
            return Err(LineupError::Validation(format!(
                "experiment {} of {} has invalid weight {}",
                id, config_id, weight
            )));
        }
        if !seen.insert(id) {
            return Err(LineupError::Validation(format!(
                "duplicate experiment {} in {}",
                id, config_id
            )));
        }
    }
    if count == 0 {
        return Err(LineupError::Validation(format!(
            "{} has no experiments",
            config_id
        )));
    }
    Ok(())
}

impl SlateConfig {
    /// Pick the experiment serving this request
    pub fn choose_experiment(&self, sampler: &Sampler) -> Result<&SlateExperiment> {
        sampler
            .choose_weighted(&self.experiments, |e| e.weight)
            .ok_or_else(|| LineupError::Validation(format!("{} has no experiments", self.id)))
    }
}

impl LineupConfig {
    pub fn choose_experiment(&self, sampler: &Sampler) -> Result<&LineupExperiment> {
        sampler
            .choose_weighted(&self.experiments, |e| e.weight)
            .ok_or_else(|| LineupError::Validation(format!("{} has no experiments", self.id)))
    }
}
