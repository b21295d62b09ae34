use std::collections::{HashMap, HashSet};

/// Lets QA accounts see slates that are not live yet.
///
/// For a listed user, every slate config id found in `slate_map` is replaced
/// by its mapped id. Everyone else gets the configured slates.
#[derive(Debug, Clone, Default)]
pub struct QaOverrides {
    user_ids: HashSet<String>,
    slate_map: HashMap<String, String>,
}

impl QaOverrides {
    pub fn new(
        user_ids: impl IntoIterator<Item = String>,
        slate_map: HashMap<String, String>,
    ) -> Self {
        Self {
            user_ids: user_ids.into_iter().collect(),
            slate_map,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() || self.slate_map.is_empty()
    }

    /// Slate config id to serve `user_id` in place of `slate_config_id`
    pub fn resolve<'a>(&'a self, user_id: &str, slate_config_id: &'a str) -> &'a str {
        if !self.user_ids.contains(user_id) {
            return slate_config_id;
        }
        self.slate_map
            .get(slate_config_id)
            .map(String::as_str)
            .unwrap_or(slate_config_id)
    }
}
