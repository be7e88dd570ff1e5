//! In-memory Store. Not persistent.
//!
//! Semantic search uses in-memory vector store (see 16-memory-design §5.2.1).
//! This implementation does key/list and optional query filter only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::memory::store::{
    Item, ListNamespacesOptions, MatchCondition, Namespace, NamespaceMatchType, SearchItem,
    SearchOptions, Store, StoreError, StoreOp, StoreOpResult, StoreSearchHit,
};

/// Stored entry with value and metadata.
#[derive(Debug, Clone)]
struct StoredItem {
    value: serde_json::Value,
    namespace: Namespace,
    key: String,
    created_at: SystemTime,
    updated_at: SystemTime,
}

impl StoredItem {
    fn new(namespace: Namespace, key: String, value: serde_json::Value) -> Self {
        let now = SystemTime::now();
        Self {
            value,
            namespace,
            key,
            created_at: now,
            updated_at: now,
        }
    }

    fn update(&mut self, value: serde_json::Value) {
        self.value = value;
        self.updated_at = SystemTime::now();
    }

    fn to_item(&self) -> Item {
        Item::with_timestamps(
            self.namespace.clone(),
            self.key.clone(),
            self.value.clone(),
            self.created_at,
            self.updated_at,
        )
    }
}

/// Key for the inner map: namespace joined by "\0", then key. Enables list by namespace prefix.
fn map_key(namespace: &Namespace, key: &str) -> String {
    let ns = namespace.join("\0");
    format!("{}\0{}", ns, key)
}

/// In-memory Store. Not persistent.
///
/// **Interaction**: Used as `Arc<dyn Store>` when graph is compiled with store;
/// nodes use it for cross-thread memory.
///
/// ## Example
///
/// ```rust,ignore
/// use conclave::memory::{InMemoryStore, Store};
///
/// let store = InMemoryStore::new();
/// store.put(&vec!["user".into()], "key1", &json!({"data": 1})).await?;
/// ```
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, StoredItem>>>,
}

impl InMemoryStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn namespace_prefix(namespace: &Namespace) -> String {
        if namespace.is_empty() {
            String::new()
        } else {
            format!("{}\0", namespace.join("\0"))
        }
    }

    /// Checks if a namespace matches a condition.
    fn matches_condition(namespace: &Namespace, condition: &MatchCondition) -> bool {
        let path = &condition.path;

        match condition.match_type {
            NamespaceMatchType::Prefix => {
                if namespace.len() < path.len() {
                    return false;
                }
                for (i, p) in path.iter().enumerate() {
                    if p != "*" && namespace.get(i) != Some(p) {
                        return false;
                    }
                }
                true
            }
            NamespaceMatchType::Suffix => {
                if namespace.len() < path.len() {
                    return false;
                }
                let start = namespace.len() - path.len();
                for (i, p) in path.iter().enumerate() {
                    if p != "*" && namespace.get(start + i) != Some(p) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let k = map_key(namespace, key);
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get_mut(&k) {
            existing.update(value.clone());
        } else {
            let item = StoredItem::new(namespace.clone(), key.to_string(), value.clone());
            guard.insert(k, item);
        }
        Ok(())
    }

    async fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let k = map_key(namespace, key);
        Ok(self.inner.read().await.get(&k).map(|s| s.value.clone()))
    }

    async fn get_item(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>, StoreError> {
        let k = map_key(namespace, key);
        Ok(self.inner.read().await.get(&k).map(|s| s.to_item()))
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError> {
        let k = map_key(namespace, key);
        self.inner.write().await.remove(&k);
        Ok(())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let prefix = Self::namespace_prefix(namespace);
        let guard = self.inner.read().await;
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, item)| item.key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn search(
        &self,
        namespace_prefix: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError> {
        let prefix = Self::namespace_prefix(namespace_prefix);
        let guard = self.inner.read().await;

        let mut hits: Vec<SearchItem> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, stored)| SearchItem::from_item(stored.to_item()))
            .collect();

        // Apply query filter if provided
        if let Some(ref q) = options.query {
            if !q.is_empty() {
                hits.retain(|h| {
                    h.item.key.contains(q)
                        || h.item
                            .value
                            .to_string()
                            .to_lowercase()
                            .contains(&q.to_lowercase())
                });
            }
        }

        // Apply filter operators if provided
        if let Some(ref filter) = options.filter {
            for (field, op) in filter {
                hits.retain(|h| {
                    let field_value = h.item.value.get(field);
                    match (field_value, op) {
                        (Some(v), crate::memory::store::FilterOp::Eq(expected)) => v == expected,
                        (Some(v), crate::memory::store::FilterOp::Ne(expected)) => v != expected,
                        (Some(v), crate::memory::store::FilterOp::Gt(expected)) => {
                            compare_json(v, expected) == Some(std::cmp::Ordering::Greater)
                        }
                        (Some(v), crate::memory::store::FilterOp::Gte(expected)) => {
                            matches!(
                                compare_json(v, expected),
                                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                            )
                        }
                        (Some(v), crate::memory::store::FilterOp::Lt(expected)) => {
                            compare_json(v, expected) == Some(std::cmp::Ordering::Less)
                        }
                        (Some(v), crate::memory::store::FilterOp::Lte(expected)) => {
                            matches!(
                                compare_json(v, expected),
                                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                            )
                        }
                        _ => false,
                    }
                });
            }
        }

        // Apply offset and limit
        let offset = options.offset;
        let limit = options.limit;
        if offset > 0 {
            if offset >= hits.len() {
                hits.clear();
            } else {
                hits = hits.into_iter().skip(offset).collect();
            }
        }
        hits.truncate(limit);

        Ok(hits)
    }

    async fn list_namespaces(
        &self,
        options: ListNamespacesOptions,
    ) -> Result<Vec<Namespace>, StoreError> {
        let guard = self.inner.read().await;

        // Collect unique namespaces
        let mut namespaces: HashSet<Namespace> =
            guard.values().map(|item| item.namespace.clone()).collect();

        // Apply match conditions
        if !options.match_conditions.is_empty() {
            namespaces.retain(|ns| {
                options
                    .match_conditions
                    .iter()
                    .all(|cond| Self::matches_condition(ns, cond))
            });
        }

        // Apply max_depth: truncate namespaces to max_depth
        let mut result: Vec<Namespace> = if let Some(max_depth) = options.max_depth {
            namespaces
                .into_iter()
                .map(|ns| {
                    if ns.len() > max_depth {
                        ns.into_iter().take(max_depth).collect()
                    } else {
                        ns
                    }
                })
                .collect::<HashSet<_>>()
                .into_iter()
                .collect()
        } else {
            namespaces.into_iter().collect()
        };

        // Sort for deterministic output
        result.sort();

        // Apply offset and limit
        if options.offset > 0 {
            if options.offset >= result.len() {
                result.clear();
            } else {
                result = result.into_iter().skip(options.offset).collect();
            }
        }
        result.truncate(options.limit);

        Ok(result)
    }

    async fn batch(&self, ops: Vec<StoreOp>) -> Result<Vec<StoreOpResult>, StoreError> {
        let mut results = Vec::with_capacity(ops.len());

        for op in ops {
            let result = match op {
                StoreOp::Get { namespace, key } => {
                    let item = self.get_item(&namespace, &key).await?;
                    StoreOpResult::Get(item)
                }
                StoreOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    if let Some(v) = value {
                        self.put(&namespace, &key, &v).await?;
                    } else {
                        self.delete(&namespace, &key).await?;
                    }
                    StoreOpResult::Put
                }
                StoreOp::Search {
                    namespace_prefix,
                    options,
                } => {
                    let items = self.search(&namespace_prefix, options).await?;
                    StoreOpResult::Search(items)
                }
                StoreOp::ListNamespaces { options } => {
                    let ns = self.list_namespaces(options).await?;
                    StoreOpResult::ListNamespaces(ns)
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    async fn search_simple(
        &self,
        namespace: &Namespace,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<StoreSearchHit>, StoreError> {
        let options = SearchOptions {
            query: query.map(String::from),
            filter: None,
            limit: limit.unwrap_or(10),
            offset: 0,
        };
        let results = self.search(namespace, options).await?;
        Ok(results
            .into_iter()
            .map(|si| StoreSearchHit {
                key: si.item.key,
                value: si.item.value,
                score: si.score,
            })
            .collect())
    }
}

/// Compare two JSON values for ordering (only works for numbers and strings).
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
