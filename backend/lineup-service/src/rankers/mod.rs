//! Ranking steps applied to slates and lineups
//!
//! Rankers are referenced by name in the experiment catalog and resolved into
//! [`SlateRanker`] / [`LineupRanker`] while the catalog is parsed, so an
//! unknown name or a bad parameter fails the load instead of a request.

pub mod algorithms;
mod sampler;

pub use algorithms::{
    blocklist, personalize_topic_slates, spread_publishers, thompson_sampling, top_n,
    MetricsKeyed, DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR, DEFAULT_BLOCKLIST,
};
pub use sampler::Sampler;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{LineupError, Result};
use crate::models::{MetricsAggregate, RankerSpec, Recommendation, SlateConfig, TopicProfile};

/// Minimum distance between two items of the same publisher when unset
pub const DEFAULT_PUBLISHER_SPREAD: usize = 3;

/// Number of slates `personalize-topic-slates` keeps when unset
pub const DEFAULT_PERSONALIZE_LIMIT: usize = 1;

/// Ranker applied to the recommendations of one slate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RankerSpec")]
pub enum SlateRanker {
    Top(usize),
    Blocklist(HashSet<String>),
    SpreadPublishers(usize),
    ThompsonSampling,
}

impl SlateRanker {
    /// Whether ranking needs engagement metrics for the slate's items
    pub fn needs_metrics(&self) -> bool {
        matches!(self, SlateRanker::ThompsonSampling)
    }

    pub fn rank<R: Rng + ?Sized>(
        &self,
        recs: Vec<Recommendation>,
        metrics: &HashMap<String, MetricsAggregate>,
        rng: &mut R,
    ) -> Vec<Recommendation> {
        match self {
            SlateRanker::Top(n) => top_n(recs, *n),
            SlateRanker::Blocklist(blocked) => blocklist(recs, blocked),
            SlateRanker::SpreadPublishers(spread) => spread_publishers(recs, *spread),
            SlateRanker::ThompsonSampling => thompson_sampling(recs, metrics, rng),
        }
    }
}

impl fmt::Display for SlateRanker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlateRanker::Top(n) => write!(f, "top{}", n),
            SlateRanker::Blocklist(_) => f.write_str("blocklist"),
            SlateRanker::SpreadPublishers(spread) => write!(f, "spread-publishers({})", spread),
            SlateRanker::ThompsonSampling => f.write_str("thompson-sampling"),
        }
    }
}

impl TryFrom<RankerSpec> for SlateRanker {
    type Error = LineupError;

    fn try_from(spec: RankerSpec) -> Result<Self> {
        match RankerKind::parse(&spec)? {
            RankerKind::Top(n) => Ok(SlateRanker::Top(n)),
            RankerKind::Blocklist(ids) => Ok(SlateRanker::Blocklist(ids)),
            RankerKind::SpreadPublishers(spread) => Ok(SlateRanker::SpreadPublishers(spread)),
            RankerKind::ThompsonSampling => Ok(SlateRanker::ThompsonSampling),
            RankerKind::PersonalizeTopicSlates(_) => Err(LineupError::Validation(format!(
                "ranker '{}' only applies to lineups",
                spec.name
            ))),
        }
    }
}

/// Ranker applied to the slate configs of one lineup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RankerSpec")]
pub enum LineupRanker {
    Top(usize),
    ThompsonSampling,
    PersonalizeTopicSlates { limit: usize },
}

impl LineupRanker {
    pub fn needs_metrics(&self) -> bool {
        matches!(self, LineupRanker::ThompsonSampling)
    }

    pub fn needs_topic_profile(&self) -> bool {
        matches!(self, LineupRanker::PersonalizeTopicSlates { .. })
    }

    /// `profile` must be present for `PersonalizeTopicSlates`.
    pub fn rank<R: Rng + ?Sized>(
        &self,
        configs: Vec<SlateConfig>,
        metrics: &HashMap<String, MetricsAggregate>,
        profile: Option<&TopicProfile>,
        rng: &mut R,
    ) -> Result<Vec<SlateConfig>> {
        match self {
            LineupRanker::Top(n) => Ok(top_n(configs, *n)),
            LineupRanker::ThompsonSampling => Ok(thompson_sampling(configs, metrics, rng)),
            LineupRanker::PersonalizeTopicSlates { limit } => {
                let profile = profile.ok_or_else(|| {
                    LineupError::Validation("topic personalization requires a profile".to_string())
                })?;
                personalize_topic_slates(configs, profile, *limit)
            }
        }
    }
}

impl fmt::Display for LineupRanker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineupRanker::Top(n) => write!(f, "top{}", n),
            LineupRanker::ThompsonSampling => f.write_str("thompson-sampling"),
            LineupRanker::PersonalizeTopicSlates { limit } => {
                write!(f, "personalize-topic-slates({})", limit)
            }
        }
    }
}

impl TryFrom<RankerSpec> for LineupRanker {
    type Error = LineupError;

    fn try_from(spec: RankerSpec) -> Result<Self> {
        match RankerKind::parse(&spec)? {
            RankerKind::Top(n) => Ok(LineupRanker::Top(n)),
            RankerKind::ThompsonSampling => Ok(LineupRanker::ThompsonSampling),
            RankerKind::PersonalizeTopicSlates(limit) => {
                Ok(LineupRanker::PersonalizeTopicSlates { limit })
            }
            RankerKind::Blocklist(_) | RankerKind::SpreadPublishers(_) => Err(
                LineupError::Validation(format!("ranker '{}' only applies to slates", spec.name)),
            ),
        }
    }
}

/// Every known ranker, before checking which stage it is used in.
enum RankerKind {
    Top(usize),
    Blocklist(HashSet<String>),
    SpreadPublishers(usize),
    ThompsonSampling,
    PersonalizeTopicSlates(usize),
}

impl RankerKind {
    fn parse(spec: &RankerSpec) -> Result<Self> {
        let name = spec.name.trim().to_ascii_lowercase().replace('_', "-");

        let kind = match name.as_str() {
            "blocklist" => {
                if spec.params.is_empty() {
                    RankerKind::Blocklist(DEFAULT_BLOCKLIST.iter().map(|id| id.to_string()).collect())
                } else {
                    let ids = spec
                        .params
                        .iter()
                        .map(|param| scalar_string(spec, param))
                        .collect::<Result<HashSet<_>>>()?;
                    RankerKind::Blocklist(ids)
                }
            }
            "spread-publishers" => RankerKind::SpreadPublishers(
                count_param(spec)?.unwrap_or(DEFAULT_PUBLISHER_SPREAD),
            ),
            "thompson-sampling" => RankerKind::ThompsonSampling,
            "personalize-topic-slates" => RankerKind::PersonalizeTopicSlates(
                count_param(spec)?.unwrap_or(DEFAULT_PERSONALIZE_LIMIT),
            ),
            "top" | "topn" => match count_param(spec)? {
                Some(n) => RankerKind::Top(n),
                None => {
                    return Err(LineupError::Validation(format!(
                        "ranker '{}' needs a count",
                        spec.name
                    )))
                }
            },
            other => match other.strip_prefix("top").map(str::parse::<usize>) {
                Some(Ok(n)) => RankerKind::Top(n),
                _ => {
                    return Err(LineupError::Validation(format!(
                        "unknown ranker '{}'",
                        spec.name
                    )))
                }
            },
        };

        Ok(kind)
    }
}

fn scalar_string(spec: &RankerSpec, param: &Value) -> Result<String> {
    match param {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(LineupError::Validation(format!(
            "ranker '{}' takes scalar parameters, got {}",
            spec.name, param
        ))),
    }
}

/// First parameter as a non-negative count, if any
fn count_param(spec: &RankerSpec) -> Result<Option<usize>> {
    let Some(param) = spec.params.first() else {
        return Ok(None);
    };

    let count = match param {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };

    count.map(Some).ok_or_else(|| {
        LineupError::Validation(format!(
            "ranker '{}' expects a non-negative integer, got {}",
            spec.name, param
        ))
    })
}
