use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DataIntegrityWarning;
use crate::utils::{lenient_i64, lenient_opt_i64, string_or_number};

mod experiment;

pub use experiment::{LineupConfig, LineupExperiment, RankerSpec, SlateConfig, SlateExperiment};

/// Content item attached to a recommendation.
///
/// Only `item_id` is interpreted; everything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(deserialize_with = "string_or_number")]
    pub item_id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Entry of a candidate set as written by the candidate generation jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(deserialize_with = "string_or_number")]
    pub item_id: String,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub feed_id: Option<i64>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A versioned, precomputed list of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub version: Option<i64>,
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// A single recommended item inside a slate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    id: String,
    item_id: String,
    feed_item_id: String,
    feed_id: Option<i64>,
    publisher: Option<String>,
    item: Item,
}

impl Recommendation {
    /// Build a recommendation from a candidate.
    ///
    /// The id is `"{source}/{item_id}"` and doubles as the feed item id.
    pub fn from_candidate(source: &str, candidate: &Candidate) -> Self {
        let id = format!("{}/{}", source, candidate.item_id);
        Self {
            feed_item_id: id.clone(),
            id,
            item_id: candidate.item_id.clone(),
            feed_id: candidate.feed_id,
            publisher: candidate.publisher.clone(),
            item: Item {
                item_id: candidate.item_id.clone(),
                attributes: candidate.attributes.clone(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn feed_item_id(&self) -> &str {
        &self.feed_item_id
    }

    pub fn feed_id(&self) -> Option<i64> {
        self.feed_id
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn item(&self) -> &Item {
        &self.item
    }
}

/// Engagement counters over trailing windows, keyed by
/// `"{item_id}/{slate_id}"` or `"{slate_id}/{lineup_id}"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsAggregate {
    #[serde(default)]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_1_day_opens: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_1_day_impressions: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_7_day_opens: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_7_day_impressions: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_14_day_opens: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_14_day_impressions: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_28_day_opens: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trailing_28_day_impressions: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub expires_at: i64,
}

impl MetricsAggregate {
    /// Flag counters the sampler cannot turn into a posterior.
    pub fn check_integrity(&self) -> Result<(), DataIntegrityWarning> {
        if self.trailing_28_day_impressions < 0 {
            return Err(DataIntegrityWarning::NegativeImpressions {
                key: self.key.clone(),
                impressions: self.trailing_28_day_impressions,
            });
        }
        if self.trailing_28_day_opens < 0 {
            return Err(DataIntegrityWarning::NegativeOpens {
                key: self.key.clone(),
                opens: self.trailing_28_day_opens,
            });
        }
        Ok(())
    }
}

/// Ordered recommendations for one slate config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slate {
    pub id: String,
    pub experiment_id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub recommendations: Vec<Recommendation>,
}

/// Ordered slates for one lineup request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineup {
    pub id: String,
    pub request_id: Uuid,
    pub experiment_id: String,
    pub slates: Vec<Slate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub curator_topics: Vec<TopicScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScore {
    pub curator_topic_label: String,
    pub score: f64,
}
