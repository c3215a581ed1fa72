use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{ObjectStore, StoreOutcome};
use crate::common::ObjectSummary;

/// 🪣 A bucket made of a `BTreeMap`. Sorted keys, same as the real thing. No bill.
///
/// `put_log` records every successful upload key in arrival order, so tests can check
/// that chunks land strictly in sequence. `with_failing_put` makes every upload whose
/// key contains the pattern come back `Fatal`.
#[derive(Debug, Clone)]
pub(crate) struct InMemoryObjectStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    put_log: Arc<Mutex<Vec<String>>>,
    failing_put_pattern: Option<String>,
}

impl InMemoryObjectStore {
    pub(crate) fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            put_log: Arc::new(Mutex::new(Vec::new())),
            failing_put_pattern: None,
        }
    }

    pub(crate) fn with_failing_put(mut self, key_pattern: &str) -> Self {
        self.failing_put_pattern = Some(key_pattern.to_string());
        self
    }

    /// 🧪 Plant an object directly, e.g. a stale chunk from "a previous run".
    pub(crate) async fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().await.insert(key.to_string(), body);
    }

    pub(crate) async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub(crate) async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(key).cloned()
    }

    pub(crate) async fn put_log(&self) -> Vec<String> {
        self.put_log.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn delete(&self, key: &str) -> StoreOutcome<bool> {
        StoreOutcome::Success(self.objects.lock().await.remove(key).is_some())
    }

    async fn put(&self, key: &str, body: &Path) -> StoreOutcome<String> {
        if let Some(pattern) = &self.failing_put_pattern {
            if key.contains(pattern.as_str()) {
                return StoreOutcome::Fatal(format!("injected failure for {key}"));
            }
        }

        let the_body = match tokio::fs::read(body).await {
            Ok(bytes) => bytes,
            Err(err) => return StoreOutcome::Fatal(format!("could not read {}: {err}", body.display())),
        };

        let mut the_log = self.put_log.lock().await;
        the_log.push(key.to_string());
        let the_etag = format!("\"mem-{}\"", the_log.len());
        self.objects.lock().await.insert(key.to_string(), the_body);
        StoreOutcome::Success(the_etag)
    }

    async fn list(&self, prefix: Option<&str>, max_keys: i32) -> Result<Vec<ObjectSummary>> {
        let the_prefix = prefix.unwrap_or("");
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(the_prefix))
            .take(max_keys.max(0) as usize)
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as i64,
            })
            .collect())
    }
}
