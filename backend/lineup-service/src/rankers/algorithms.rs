// Ranking algorithms.
//
// All of them are pure: they take an ordered list and return a reordered or
// filtered list. Sampling takes its RNG from the caller.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::error::{LineupError, Result};
use crate::models::{MetricsAggregate, Recommendation, SlateConfig, TopicProfile};

/// Prior successes for items without engagement data.
///
/// Small so that unseen items rank low on average but still get explored.
pub const DEFAULT_ALPHA_PRIOR: f64 = 0.02;

/// Prior failures for items without engagement data
pub const DEFAULT_BETA_PRIOR: f64 = 1.0;

/// Items removed by `blocklist` when no ids are configured
pub const DEFAULT_BLOCKLIST: &[&str] = &["3203292423"];

/// Anything that can be looked up in a metrics mapping.
pub trait MetricsKeyed {
    fn metrics_key(&self) -> &str;
}

impl MetricsKeyed for Recommendation {
    fn metrics_key(&self) -> &str {
        self.item_id()
    }
}

impl MetricsKeyed for SlateConfig {
    fn metrics_key(&self) -> &str {
        &self.id
    }
}

/// Keep the first `n` entries
pub fn top_n<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    items.truncate(n);
    items
}

/// Drop recommendations whose item id is blocked, preserving order
pub fn blocklist(recs: Vec<Recommendation>, blocked: &HashSet<String>) -> Vec<Recommendation> {
    recs.into_iter()
        .filter(|rec| !blocked.contains(rec.item_id()))
        .collect()
}

/// Reorder so that no publisher appears twice within `spread` consecutive
/// positions, when achievable.
///
/// Greedy: the next item is the earliest remaining one whose publisher is not
/// among the last `spread` placed items. When no such item exists, or only
/// `spread` items are left, the remainder is appended in its current order.
pub fn spread_publishers(recs: Vec<Recommendation>, spread: usize) -> Vec<Recommendation> {
    let mut remaining = recs;
    if remaining.is_empty() {
        return remaining;
    }

    let mut reordered = Vec::with_capacity(remaining.len());
    reordered.push(remaining.remove(0));

    let mut cursor = 0;
    while !remaining.is_empty() {
        if remaining.len() <= spread || cursor >= remaining.len() {
            reordered.append(&mut remaining);
            break;
        }

        let window = &reordered[reordered.len().saturating_sub(spread)..];
        let candidate_publisher = remaining[cursor].publisher();
        if window
            .iter()
            .any(|placed: &Recommendation| placed.publisher() == candidate_publisher)
        {
            cursor += 1;
        } else {
            reordered.push(remaining.remove(cursor));
            cursor = 0;
        }
    }

    reordered
}

/// Beta posterior parameters for one entry.
///
/// Uses trailing 28 day counts. Missing or malformed metrics give the prior.
pub fn posterior(metrics: Option<&MetricsAggregate>) -> (f64, f64) {
    let Some(metrics) = metrics else {
        return (DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR);
    };

    if let Err(warning) = metrics.check_integrity() {
        warn!(key = %metrics.key, %warning, "Malformed metrics, using default prior");
        return (DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR);
    }

    let opens = metrics.trailing_28_day_opens;
    let impressions = metrics.trailing_28_day_impressions;
    let failures = (impressions - opens).max(0);

    (
        DEFAULT_ALPHA_PRIOR + opens as f64,
        DEFAULT_BETA_PRIOR + failures as f64,
    )
}

/// Order entries by one draw from each entry's Beta posterior, highest first.
pub fn thompson_sampling<T, R>(
    items: Vec<T>,
    metrics: &HashMap<String, MetricsAggregate>,
    rng: &mut R,
) -> Vec<T>
where
    T: MetricsKeyed,
    R: Rng + ?Sized,
{
    let mut scored: Vec<(f64, T)> = items
        .into_iter()
        .map(|item| {
            let (alpha, beta) = posterior(metrics.get(item.metrics_key()));
            let score = sample_beta(alpha, beta, rng);
            (score, item)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, item)| item).collect()
}

fn sample_beta<R: Rng + ?Sized>(alpha: f64, beta: f64, rng: &mut R) -> f64 {
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.sample(rng),
        Err(e) => {
            warn!(alpha, beta, error = %e, "Invalid posterior, using default prior");
            match Beta::new(DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR) {
                Ok(dist) => dist.sample(rng),
                Err(_) => 0.0,
            }
        }
    }
}

/// Replace the topic slates of a lineup with the user's best `limit` topics.
///
/// Slates whose topic label appears in the profile are pulled out, ordered by
/// profile score and truncated to `limit`, then inserted where the first of
/// them was. Other slates keep their relative order.
pub fn personalize_topic_slates(
    configs: Vec<SlateConfig>,
    profile: &TopicProfile,
    limit: usize,
) -> Result<Vec<SlateConfig>> {
    let scores: HashMap<&str, f64> = profile
        .curator_topics
        .iter()
        .map(|topic| (topic.curator_topic_label.as_str(), topic.score))
        .collect();

    let mut output = Vec::with_capacity(configs.len());
    let mut personalizable: Vec<(f64, SlateConfig)> = Vec::new();
    let mut insert_at = None;

    for config in configs {
        let score = config
            .curator_topic_label
            .as_deref()
            .and_then(|label| scores.get(label).copied());

        match score {
            Some(score) => {
                insert_at.get_or_insert(output.len());
                personalizable.push((score, config));
            }
            None => output.push(config),
        }
    }

    let Some(insert_at) = insert_at else {
        return Err(LineupError::Validation(format!(
            "no slate matches the topic profile of user {}",
            profile.user_id
        )));
    };

    personalizable.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    let selected = personalizable
        .into_iter()
        .take(limit)
        .map(|(_, config)| config);

    output.splice(insert_at..insert_at, selected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, TopicScore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rec(item_id: &str, publisher: &str) -> Recommendation {
        let candidate: Candidate = serde_json::from_value(json!({
            "item_id": item_id,
            "publisher": publisher,
        }))
        .unwrap();
        Recommendation::from_candidate("RecommendationAPI", &candidate)
    }

    fn recs(entries: &[(&str, &str)]) -> Vec<Recommendation> {
        entries.iter().map(|(id, publisher)| rec(id, publisher)).collect()
    }

    fn ids(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.item_id()).collect()
    }

    fn metrics(key: &str, opens: i64, impressions: i64) -> MetricsAggregate {
        MetricsAggregate {
            key: key.to_string(),
            trailing_28_day_opens: opens,
            trailing_28_day_impressions: impressions,
            ..Default::default()
        }
    }

    fn config(id: &str, topic: Option<&str>) -> SlateConfig {
        SlateConfig {
            id: id.to_string(),
            display_name: None,
            description: None,
            curator_topic_label: topic.map(str::to_string),
            experiments: Vec::new(),
        }
    }

    #[test]
    fn test_top_n() {
        let items: Vec<Recommendation> = (0..40).map(|i| rec(&i.to_string(), "p")).collect();

        assert_eq!(top_n(items.clone(), 5).len(), 5);
        assert_eq!(top_n(items.clone(), 15).len(), 15);
        assert_eq!(top_n(items.clone(), 30).len(), 30);
        assert_eq!(ids(&top_n(items.clone(), 3)), vec!["0", "1", "2"]);
        assert_eq!(top_n(items[..4].to_vec(), 30).len(), 4);
    }

    #[test]
    fn test_blocklist_removes_blocked_items() {
        let blocked: HashSet<String> = DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect();
        let input = recs(&[
            ("3208490410", "hbr.org"),
            ("3203292423", "example.com"),
            ("3208490411", "nytimes.com"),
        ]);

        let result = blocklist(input, &blocked);

        assert_eq!(ids(&result), vec!["3208490410", "3208490411"]);
    }

    #[test]
    fn test_blocklist_custom_ids() {
        let blocked: HashSet<String> = ["2", "99"].iter().map(|s| s.to_string()).collect();
        let input = recs(&[
            ("1", "a"),
            ("2", "b"),
            ("33", "c"),
            ("66", "d"),
            ("99", "e"),
            ("999", "f"),
        ]);

        assert_eq!(ids(&blocklist(input, &blocked)), vec!["1", "33", "66", "999"]);
    }

    #[test]
    fn test_spread_publishers_single_reorder() {
        let input = recs(&[
            ("1", "a"),
            ("2", "b"),
            ("3", "c"),
            ("4", "a"),
            ("5", "d"),
            ("6", "e"),
            ("7", "b"),
            ("8", "f"),
        ]);

        let result = spread_publishers(input, 3);

        let publishers: Vec<&str> = result.iter().filter_map(|r| r.publisher()).collect();
        assert_eq!(publishers, vec!["a", "b", "c", "d", "a", "e", "b", "f"]);
        assert_eq!(ids(&result), vec!["1", "2", "3", "5", "4", "6", "7", "8"]);
    }

    #[test]
    fn test_spread_publishers_multiple_reorder() {
        let input = recs(&[
            ("1", "a"),
            ("2", "b"),
            ("3", "b"),
            ("4", "a"),
            ("5", "c"),
            ("6", "a"),
            ("7", "d"),
            ("8", "e"),
        ]);

        let result = spread_publishers(input, 3);

        assert_eq!(ids(&result), vec!["1", "2", "5", "7", "4", "3", "6", "8"]);
    }

    #[test]
    fn test_spread_publishers_gives_up_at_the_end() {
        let input = recs(&[
            ("1", "a"),
            ("2", "b"),
            ("3", "c"),
            ("4", "d"),
            ("5", "d"),
            ("6", "e"),
            ("7", "d"),
            ("8", "e"),
        ]);

        let result = spread_publishers(input, 3);

        assert_eq!(ids(&result), vec!["1", "2", "3", "4", "6", "5", "7", "8"]);
    }

    #[test]
    fn test_spread_publishers_cannot_spread() {
        let input = recs(&[
            ("1", "a"),
            ("2", "b"),
            ("3", "c"),
            ("4", "c"),
            ("5", "a"),
            ("6", "a"),
            ("7", "b"),
            ("8", "c"),
        ]);

        let result = spread_publishers(input, 3);

        assert_eq!(ids(&result), vec!["1", "2", "3", "4", "5", "6", "7", "8"]);
    }

    #[test]
    fn test_spread_publishers_empty_and_zero_spread() {
        assert!(spread_publishers(Vec::new(), 3).is_empty());

        let input = recs(&[("1", "a"), ("2", "a"), ("3", "a")]);
        assert_eq!(ids(&spread_publishers(input, 0)), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_posterior() {
        assert_eq!(posterior(None), (DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR));

        let (alpha, beta) = posterior(Some(&metrics("a", 66, 1000)));
        assert!((alpha - 66.02).abs() < 1e-9);
        assert!((beta - 935.0).abs() < 1e-9);

        // opens above impressions never gives a negative beta
        let (_, beta) = posterior(Some(&metrics("b", 10, 5)));
        assert!((beta - DEFAULT_BETA_PRIOR).abs() < 1e-9);

        assert_eq!(
            posterior(Some(&metrics("c", 3, -14))),
            (DEFAULT_ALPHA_PRIOR, DEFAULT_BETA_PRIOR)
        );
    }

    #[test]
    fn test_thompson_sampling_orders_by_engagement() {
        let mut data = HashMap::new();
        data.insert("999999".to_string(), metrics("999999", 99, 999));
        data.insert("666666".to_string(), metrics("666666", 66, 999));
        data.insert("333333".to_string(), metrics("333333", 33, 999));

        let input = recs(&[
            ("333333", "a"),
            ("222222", "b"),
            ("666666", "c"),
            ("999999", "d"),
        ]);

        let mut rng = StdRng::seed_from_u64(7);
        let trials = 99;
        let mut rank_sums: HashMap<String, usize> = HashMap::new();
        let mut orderings = HashSet::new();

        for _ in 0..trials {
            let ranked = thompson_sampling(input.clone(), &data, &mut rng);
            let order: Vec<String> = ranked.iter().map(|r| r.item_id().to_string()).collect();
            for (rank, item_id) in order.iter().enumerate() {
                *rank_sums.entry(item_id.clone()).or_default() += rank + 1;
            }
            orderings.insert(order);
        }

        let avg = |id: &str| rank_sums[id] as f64 / trials as f64;
        assert!(avg("999999") < avg("666666"));
        assert!(avg("666666") < avg("333333"));
        assert!(avg("333333") < avg("222222"));

        // sampling, not sorting: the ranking is not the same every time
        assert!(orderings.len() > 1);
    }

    #[test]
    fn test_thompson_sampling_negative_impressions_use_prior() {
        let mut data = HashMap::new();
        data.insert("333333".to_string(), metrics("333333", 3, -14));

        let input = recs(&[("333333", "a"), ("444444", "b")]);
        let mut rng = StdRng::seed_from_u64(1);

        let ranked = thompson_sampling(input, &data, &mut rng);

        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_thompson_sampling_is_reproducible_with_seed() {
        let input = recs(&[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")]);
        let data = HashMap::new();

        let first = thompson_sampling(input.clone(), &data, &mut StdRng::seed_from_u64(3));
        let second = thompson_sampling(input, &data, &mut StdRng::seed_from_u64(3));

        assert_eq!(first, second);
    }

    fn profile(topics: &[(&str, f64)]) -> TopicProfile {
        TopicProfile {
            user_id: "user-1".to_string(),
            curator_topics: topics
                .iter()
                .map(|(label, score)| TopicScore {
                    curator_topic_label: label.to_string(),
                    score: *score,
                })
                .collect(),
        }
    }

    #[test]
    fn test_personalize_limit() {
        let configs = vec![
            config("tech", Some("Technology")),
            config("food", Some("Food")),
            config("travel", Some("Travel")),
            config("science", Some("Science")),
        ];
        let profile = profile(&[("Science", 0.9), ("Food", 0.7), ("Technology", 0.4)]);

        let result = personalize_topic_slates(configs, &profile, 2).unwrap();

        let ids: Vec<&str> = result.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["science", "food"]);
    }

    #[test]
    fn test_personalize_keeps_other_slates_in_place() {
        let configs = vec![
            config("for-you", None),
            config("tech", Some("Technology")),
            config("food", Some("Food")),
            config("collections", None),
            config("travel", Some("Travel")),
            config("must-reads", None),
        ];
        let profile = profile(&[("Travel", 0.8), ("Technology", 0.5), ("Food", 0.1)]);

        let result = personalize_topic_slates(configs, &profile, 2).unwrap();

        let ids: Vec<&str> = result.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["for-you", "travel", "tech", "collections", "must-reads"]
        );
    }

    #[test]
    fn test_personalize_without_matches_fails() {
        let configs = vec![config("for-you", None), config("tech", Some("Technology"))];
        let profile = profile(&[("Gardening", 1.0)]);

        let err = personalize_topic_slates(configs, &profile, 1).unwrap_err();

        assert!(matches!(err, LineupError::Validation(_)));
    }
}
