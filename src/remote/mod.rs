pub mod firestore;

use crate::config::Config;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One completion as stored in the shared activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteActivity {
    pub name: String,
    pub title: String,
    pub points: u64,
    pub category: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

/// Shared activity log. Implementations swallow their own failures: a
/// write that fails is dropped, a query that fails returns nothing.
pub trait ActivitySink: Send + Sync {
    fn write(&self, record: &RemoteActivity);

    fn query_since(&self, start: NaiveDate) -> Vec<RemoteActivity>;

    fn describe(&self) -> String;
}

pub struct LocalOnly;

impl ActivitySink for LocalOnly {
    fn write(&self, record: &RemoteActivity) {
        debug!(name = %record.name, title = %record.title, "remote log disabled. activity kept locally");
    }

    fn query_since(&self, _start: NaiveDate) -> Vec<RemoteActivity> {
        Vec::new()
    }

    fn describe(&self) -> String {
        "local-only".to_string()
    }
}

/// Picks the backend once from config. A remote that cannot be built
/// degrades to local-only.
pub fn connect(config: &Config) -> Arc<dyn ActivitySink> {
    if !config.remote_configured() {
        info!("remote activity log not configured. running local-only");
        return Arc::new(LocalOnly);
    }

    match firestore::FirestoreSink::from_config(config) {
        Ok(sink) => {
            info!(backend = %sink.describe(), "remote activity log enabled");
            Arc::new(sink)
        }
        Err(error) => {
            warn!(error = %error, "remote activity log init failed. running local-only");
            Arc::new(LocalOnly)
        }
    }
}

/// In-memory activity log for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySink {
    records: std::sync::Mutex<Vec<RemoteActivity>>,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn with(records: Vec<RemoteActivity>) -> Self {
        Self {
            records: std::sync::Mutex::new(records),
        }
    }
}

#[cfg(test)]
impl ActivitySink for MemorySink {
    fn write(&self, record: &RemoteActivity) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }

    fn query_since(&self, start: NaiveDate) -> Vec<RemoteActivity> {
        let start = start.format("%Y-%m-%d").to_string();
        self.records
            .lock()
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.date >= start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivitySink, LocalOnly, RemoteActivity, connect};
    use crate::config::Config;
    use chrono::NaiveDate;

    #[test]
    fn local_only_is_a_no_op() {
        let sink = LocalOnly;
        sink.write(&RemoteActivity {
            name: "ana".to_string(),
            title: "Close a deal".to_string(),
            points: 75,
            category: "Sales".to_string(),
            date: "2024-01-01".to_string(),
        });

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        assert!(sink.query_since(start).is_empty());
    }

    #[test]
    fn missing_project_selects_local_only() {
        let config = Config {
            remote_project_id: None,
            ..Config::default()
        };

        assert_eq!(connect(&config).describe(), "local-only");
    }
}
