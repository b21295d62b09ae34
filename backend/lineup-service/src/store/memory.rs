use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::{Record, StoreError, StoreReader};

/// Key layout of a table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableSchema {
    pub partition_key: String,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(default)]
    pub indexes: HashMap<String, IndexSchema>,
}

impl TableSchema {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
            indexes: HashMap::new(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn with_index(mut self, name: impl Into<String>, index: IndexSchema) -> Self {
        self.indexes.insert(name.into(), index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexSchema {
    pub partition_key: String,
    #[serde(default)]
    pub sort_key: Option<String>,
}

impl IndexSchema {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    tables: HashMap<String, FixtureTable>,
}

#[derive(Debug, Deserialize)]
struct FixtureTable {
    #[serde(flatten)]
    schema: TableSchema,
    #[serde(default)]
    items: Vec<Record>,
}

#[derive(Debug)]
struct Table {
    schema: TableSchema,
    items: Vec<Record>,
}

/// Process-local store for development and tests.
///
/// Seeded from a JSON fixture or populated with [`MemoryStore::put_item`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: impl Into<String>, schema: TableSchema) -> Self {
        self.create_table(name, schema);
        self
    }

    /// Create an empty table, replacing any table of the same name
    pub fn create_table(&self, name: impl Into<String>, schema: TableSchema) {
        self.tables.write().insert(
            name.into(),
            Table {
                schema,
                items: Vec::new(),
            },
        );
    }

    pub fn from_fixture_str(json: &str) -> Result<Self, StoreError> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| StoreError::Malformed(format!("invalid store fixture: {}", e)))?;

        let store = Self::new();
        for (name, table) in fixture.tables {
            store.create_table(name.clone(), table.schema);
            for item in table.items {
                store.put_item(&name, item)?;
            }
        }
        Ok(store)
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let store = Self::from_fixture_str(&json)?;
        info!(path = %path.display(), "Loaded store fixture");
        Ok(store)
    }

    /// Insert a record, replacing the record with the same primary key
    pub fn put_item(&self, table: &str, record: Record) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let table_data = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let partition_key = &table_data.schema.partition_key;
        let sort_key = table_data.schema.sort_key.as_deref();

        let pk = key_attribute(&record, partition_key).ok_or_else(|| {
            StoreError::Malformed(format!("record in {} is missing key {}", table, partition_key))
        })?;
        let sk = match sort_key {
            Some(attr) => Some(key_attribute(&record, attr).ok_or_else(|| {
                StoreError::Malformed(format!("record in {} is missing key {}", table, attr))
            })?),
            None => None,
        };

        let existing = table_data.items.iter().position(|item| {
            let same_sort = match sort_key {
                Some(attr) => key_attribute(item, attr) == sk,
                None => true,
            };
            same_sort && key_attribute(item, partition_key).as_ref() == Some(&pk)
        });

        match existing {
            Some(idx) => table_data.items[idx] = record,
            None => table_data.items.push(record),
        }
        Ok(())
    }
}

#[async_trait]
impl StoreReader for MemoryStore {
    async fn get_item(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: Option<&str>,
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read();
        let table_data = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let schema = &table_data.schema;

        let found = table_data.items.iter().find(|item| {
            key_attribute(item, &schema.partition_key).as_deref() == Some(partition_key)
                && match (sort_key, schema.sort_key.as_deref()) {
                    (Some(expected), Some(attr)) => {
                        key_attribute(item, attr).as_deref() == Some(expected)
                    }
                    _ => true,
                }
        });

        Ok(found.cloned())
    }

    async fn query(
        &self,
        table: &str,
        index: &str,
        partition_key: &str,
        limit: usize,
        scan_forward: bool,
    ) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read();
        let table_data = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let index_schema =
            table_data
                .schema
                .indexes
                .get(index)
                .ok_or_else(|| StoreError::UnknownIndex {
                    table: table.to_string(),
                    index: index.to_string(),
                })?;

        let mut matches: Vec<&Record> = table_data
            .items
            .iter()
            .filter(|item| {
                key_attribute(item, &index_schema.partition_key).as_deref() == Some(partition_key)
            })
            .collect();

        if let Some(sort_attr) = &index_schema.sort_key {
            matches.sort_by(|a, b| compare_attribute(a.get(sort_attr), b.get(sort_attr)));
        }
        if !scan_forward {
            matches.reverse();
        }

        Ok(matches.into_iter().take(limit).cloned().collect())
    }
}

/// Key attributes may be strings or numbers; both compare as their string form
fn key_attribute(record: &Record, attr: &str) -> Option<String> {
    match record.get(attr)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn compare_attribute(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates_store() -> MemoryStore {
        MemoryStore::new().with_table(
            "candidate_sets",
            TableSchema::new("id")
                .with_sort_key("version")
                .with_index("id-version", IndexSchema::new("id", "version")),
        )
    }

    #[tokio::test]
    async fn test_query_orders_by_sort_key() {
        let store = candidates_store();
        for version in [2, 10, 1] {
            store
                .put_item("candidate_sets", json!({"id": "set-a", "version": version}))
                .unwrap();
        }
        store
            .put_item("candidate_sets", json!({"id": "set-b", "version": 99}))
            .unwrap();

        let latest = store
            .query("candidate_sets", "id-version", "set-a", 1, false)
            .await
            .unwrap();
        assert_eq!(latest, vec![json!({"id": "set-a", "version": 10})]);

        let oldest_first = store
            .query("candidate_sets", "id-version", "set-a", 10, true)
            .await
            .unwrap();
        let versions: Vec<i64> = oldest_first
            .iter()
            .map(|r| r["version"].as_i64().unwrap())
            .collect();
        assert_eq!(versions, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn test_put_item_replaces_same_key() {
        let store = MemoryStore::new().with_table("metrics", TableSchema::new("id"));
        store
            .put_item("metrics", json!({"id": "1/home", "opens": 1}))
            .unwrap();
        store
            .put_item("metrics", json!({"id": "1/home", "opens": 2}))
            .unwrap();

        let record = store.get_item("metrics", "1/home", None).await.unwrap();
        assert_eq!(record, Some(json!({"id": "1/home", "opens": 2})));
    }

    #[tokio::test]
    async fn test_get_items_omits_missing() {
        let store = MemoryStore::new().with_table("metrics", TableSchema::new("id"));
        store.put_item("metrics", json!({"id": "a"})).unwrap();

        let found = store
            .get_items("metrics", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found.contains_key("a"));
    }

    #[tokio::test]
    async fn test_unknown_table_and_index() {
        let store = candidates_store();

        assert_eq!(
            store.get_item("nope", "x", None).await,
            Err(StoreError::UnknownTable("nope".to_string()))
        );
        assert!(matches!(
            store.query("candidate_sets", "by-date", "x", 1, true).await,
            Err(StoreError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_fixture_loading() {
        let store = MemoryStore::from_fixture_str(
            r#"{
                "tables": {
                    "metrics": {
                        "partition_key": "id",
                        "items": [{"id": "666666/home", "trailing_28_day_opens": "66"}]
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(store.tables.read().contains_key("metrics"));

        let missing_key =
            r#"{"tables": {"t": {"partition_key": "id", "items": [{"x": 1}]}}}"#;
        assert!(MemoryStore::from_fixture_str(missing_key).is_err());
    }
}
