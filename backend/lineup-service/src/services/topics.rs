use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{LineupError, Result};
use crate::models::TopicProfile;
use crate::store::StoreReader;

/// Source of per-user topic preferences for personalized lineups.
#[async_trait]
pub trait TopicProfileProvider: Send + Sync {
    async fn topic_profile(&self, user_id: &str) -> Result<TopicProfile>;
}

/// Reads profiles from a store table keyed by user id.
///
/// A user without a stored profile gets an empty one.
pub struct StoreTopicProfiles {
    store: Arc<dyn StoreReader>,
    table: String,
}

impl StoreTopicProfiles {
    pub fn new(store: Arc<dyn StoreReader>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

#[async_trait]
impl TopicProfileProvider for StoreTopicProfiles {
    async fn topic_profile(&self, user_id: &str) -> Result<TopicProfile> {
        let Some(record) = self.store.get_item(&self.table, user_id, None).await? else {
            debug!(user_id = %user_id, "No topic profile");
            return Ok(TopicProfile {
                user_id: user_id.to_string(),
                curator_topics: Vec::new(),
            });
        };

        let mut profile: TopicProfile = serde_json::from_value(record).map_err(|e| {
            LineupError::Internal(format!("malformed topic profile for {}: {}", user_id, e))
        })?;
        profile.user_id = user_id.to_string();
        Ok(profile)
    }
}
