use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::rankers::{LineupRanker, SlateRanker};

/// Ranker reference as written in the experiment catalog.
///
/// Either a bare name (`"top15"`) or `{"name": "spread-publishers", "params": [3]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankerSpec {
    pub name: String,
    pub params: Vec<Value>,
}

impl RankerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }
}

impl<'de> Deserialize<'de> for RankerSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Name(String),
            Full {
                name: String,
                #[serde(default)]
                params: Vec<Value>,
            },
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Name(name) => RankerSpec::new(name),
            Wire::Full { name, params } => RankerSpec { name, params },
        })
    }
}

fn default_weight() -> f64 {
    1.0
}

/// One way of producing a slate: where candidates come from and how they are ordered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlateExperiment {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "candidate_sets")]
    pub candidate_set_ids: Vec<String>,
    #[serde(default)]
    pub rankers: Vec<SlateRanker>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// One way of producing a lineup: which slate configs it draws from and how
/// they are ordered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineupExperiment {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "slates")]
    pub slate_config_ids: Vec<String>,
    #[serde(default)]
    pub rankers: Vec<LineupRanker>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlateConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Topic this slate covers; only such slates can be personalized
    #[serde(default)]
    pub curator_topic_label: Option<String>,
    pub experiments: Vec<SlateExperiment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineupConfig {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub experiments: Vec<LineupExperiment>,
}
