// Attribute dictionary cache
//
// Maps attribute codes to attribute ids. Loaded lazily, at most once per
// process, from the target database of the first request that needs it.

use crate::errors::TargetError;
use crate::target::{Row, TargetConnection};
use crate::telemetry;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Immutable view of the dictionary handed to token replacers
pub type DictionarySnapshot = Arc<HashMap<String, String>>;

/// Anything able to produce `(code, id)` dictionary entries
#[async_trait]
pub trait DictionarySource: Send {
    async fn load_entries(&mut self) -> Result<Vec<(String, String)>, TargetError>;
}

/// Reads dictionary entries through an open target connection
pub struct ConnectionDictionarySource<'a> {
    conn: &'a mut dyn TargetConnection,
    query: &'a str,
}

impl<'a> ConnectionDictionarySource<'a> {
    pub fn new(conn: &'a mut dyn TargetConnection, query: &'a str) -> Self {
        Self { conn, query }
    }
}

#[async_trait]
impl<'a> DictionarySource for ConnectionDictionarySource<'a> {
    async fn load_entries(&mut self) -> Result<Vec<(String, String)>, TargetError> {
        let rows = self.conn.fetch_rows(self.query, &[]).await?;
        Ok(rows.iter().filter_map(entry_from_row).collect())
    }
}

/// `code`/`sid` columns when present, otherwise the first two columns
fn entry_from_row(row: &Row) -> Option<(String, String)> {
    let named = row.get("code").zip(row.get("sid"));
    let (code, id) = match named {
        Some(pair) => pair,
        None => {
            let mut values = row.values();
            (values.next()?, values.next()?)
        }
    };
    Some((text_of(code)?, text_of(id)?))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Process-wide, load-once attribute dictionary
#[derive(Debug, Default)]
pub struct AttributeDictionary {
    current: RwLock<Option<DictionarySnapshot>>,
    load_gate: Mutex<()>,
}

impl AttributeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary pre-populated with known entries
    pub fn preloaded(entries: HashMap<String, String>) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(entries))),
            load_gate: Mutex::new(()),
        }
    }

    /// The loaded dictionary, if a load has happened
    pub fn snapshot(&self) -> Option<DictionarySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, entries: HashMap<String, String>) -> DictionarySnapshot {
        let snapshot = Arc::new(entries);
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Load the dictionary unless a previous call already did.
    ///
    /// Concurrent callers wait for the single in-flight load. A failed load
    /// is logged and leaves an empty dictionary in place, so attribute
    /// lookups fail individually instead of failing every request.
    #[tracing::instrument(skip(self, source))]
    pub async fn ensure_loaded(&self, source: &mut dyn DictionarySource) -> DictionarySnapshot {
        if let Some(snapshot) = self.snapshot() {
            return snapshot;
        }

        let _gate = self.load_gate.lock().await;
        if let Some(snapshot) = self.snapshot() {
            return snapshot;
        }

        let entries = match source.load_entries().await {
            Ok(entries) => {
                tracing::info!(entries = entries.len(), "Attribute dictionary loaded");
                telemetry::record_dictionary_load(true);
                entries.into_iter().collect()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load attribute dictionary");
                telemetry::record_dictionary_load(false);
                HashMap::new()
            }
        };

        self.store(entries)
    }

    /// Reload unconditionally; the previous dictionary survives a failed load
    #[tracing::instrument(skip(self, source))]
    pub async fn refresh(&self, source: &mut dyn DictionarySource) -> Result<usize, TargetError> {
        let _gate = self.load_gate.lock().await;
        let entries: HashMap<String, String> = source.load_entries().await?.into_iter().collect();
        let count = entries.len();
        self.store(entries);
        tracing::info!(entries = count, "Attribute dictionary refreshed");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl DictionarySource for CountingSource {
        async fn load_entries(&mut self) -> Result<Vec<(String, String)>, TargetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(TargetError::QueryFailed("table missing".to_string()));
            }
            Ok(vec![("color".to_string(), "sid-1".to_string())])
        }
    }

    fn counting_source(calls: &Arc<AtomicUsize>, fail: bool) -> CountingSource {
        CountingSource {
            calls: Arc::clone(calls),
            fail,
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_load_once() {
        let dictionary = Arc::new(AttributeDictionary::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dictionary = Arc::clone(&dictionary);
            let mut source = counting_source(&calls, false);
            handles.push(tokio::spawn(async move {
                dictionary.ensure_loaded(&mut source).await
            }));
        }

        for handle in handles {
            let snapshot = handle.await.unwrap();
            assert_eq!(snapshot.get("color").map(String::as_str), Some("sid-1"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_empty_and_final() {
        let dictionary = AttributeDictionary::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let snapshot = dictionary.ensure_loaded(&mut counting_source(&calls, true)).await;
        assert!(snapshot.is_empty());

        let again = dictionary.ensure_loaded(&mut counting_source(&calls, false)).await;
        assert!(again.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_on_failure() {
        let dictionary =
            AttributeDictionary::preloaded(HashMap::from([("size".to_string(), "sid-7".to_string())]));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(dictionary.refresh(&mut counting_source(&calls, true)).await.is_err());
        assert!(dictionary.snapshot().unwrap().contains_key("size"));

        assert_eq!(dictionary.refresh(&mut counting_source(&calls, false)).await.unwrap(), 1);
        assert!(dictionary.snapshot().unwrap().contains_key("color"));
    }

    #[test]
    fn test_entry_from_row() {
        let named: Row = serde_json::from_value(json!({"sid": "s1", "code": "color", "x": 1})).unwrap();
        assert_eq!(
            entry_from_row(&named),
            Some(("color".to_string(), "s1".to_string()))
        );

        let positional: Row = serde_json::from_value(json!({"c": "weight", "id": 42})).unwrap();
        assert_eq!(
            entry_from_row(&positional),
            Some(("weight".to_string(), "42".to_string()))
        );

        let short: Row = serde_json::from_value(json!({"c": "weight"})).unwrap();
        assert_eq!(entry_from_row(&short), None);
    }
}
