use crate::tracker::Tracker;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

/// Names the uplink currently carrying traffic. Injected so tests can
/// script a sequence of values without touching the filesystem.
#[async_trait]
pub trait UplinkOracle: Send + Sync {
    async fn active_uplink(&self) -> Result<String>;
}

/// Production oracle: the status document maintained by the
/// path-steering daemon, a JSON object with an `active_uplink` field.
pub struct FileOracle {
    path: PathBuf,
}

impl FileOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UplinkOracle for FileOracle {
    async fn active_uplink(&self) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let doc: serde_json::Value = serde_json::from_str(&raw)?;
        doc.get("active_uplink")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("status document has no active_uplink field"))
    }
}

/// Watches the oracle for a change of active uplink and credits the
/// surviving sessions when one happens.
pub struct FailoverWatcher {
    oracle: Box<dyn UplinkOracle>,
    prev: Option<String>,
}

impl FailoverWatcher {
    pub fn new(oracle: Box<dyn UplinkOracle>) -> Self {
        Self { oracle, prev: None }
    }

    /// One poll cycle. An unreadable or incomplete status document means
    /// "no change": a failover is never fabricated, and the last known
    /// uplink is kept for the next comparison.
    pub async fn check(&mut self, tracker: &Tracker, now: f64) {
        let active = match self.oracle.active_uplink().await {
            Ok(v) => v,
            Err(e) => {
                debug!("uplink status unavailable: {}", e);
                return;
            }
        };
        if let Some(prev) = self.prev.as_deref() {
            if prev != active {
                info!("active uplink changed: {} -> {}", prev, active);
                tracker.mark_failover(now);
            }
        }
        self.prev = Some(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of oracle readings.
    struct ScriptedOracle {
        script: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Result<String>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl UplinkOracle for ScriptedOracle {
        async fn active_uplink(&self) -> Result<String> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn failover_count(tracker: &Tracker) -> u64 {
        tracker.capture().failover_count
    }

    #[tokio::test]
    async fn first_reading_never_counts_as_failover() {
        let tracker = Tracker::new(TrackerConfig::default());
        let oracle = ScriptedOracle::new(vec![Ok("wg-a".to_string())]);
        let mut watcher = FailoverWatcher::new(Box::new(oracle));
        watcher.check(&tracker, 1000.0).await;
        assert_eq!(failover_count(&tracker), 0);
    }

    #[tokio::test]
    async fn change_of_uplink_marks_failover() {
        let tracker = Tracker::new(TrackerConfig::default());
        let oracle = ScriptedOracle::new(vec![
            Ok("wg-a".to_string()),
            Ok("wg-a".to_string()),
            Ok("wg-b".to_string()),
        ]);
        let mut watcher = FailoverWatcher::new(Box::new(oracle));
        watcher.check(&tracker, 1000.0).await;
        watcher.check(&tracker, 1002.0).await;
        assert_eq!(failover_count(&tracker), 0);
        watcher.check(&tracker, 1004.0).await;
        assert_eq!(failover_count(&tracker), 1);
    }

    #[tokio::test]
    async fn oracle_error_is_no_change() {
        let tracker = Tracker::new(TrackerConfig::default());
        let oracle = ScriptedOracle::new(vec![
            Ok("wg-a".to_string()),
            Err(anyhow!("status file missing")),
            Ok("wg-b".to_string()),
        ]);
        let mut watcher = FailoverWatcher::new(Box::new(oracle));
        watcher.check(&tracker, 1000.0).await;
        watcher.check(&tracker, 1002.0).await;
        assert_eq!(failover_count(&tracker), 0);
        // The pre-error value is still the comparison point.
        watcher.check(&tracker, 1004.0).await;
        assert_eq!(failover_count(&tracker), 1);
    }

    #[tokio::test]
    async fn file_oracle_reads_active_uplink_field() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("status.json");

        let oracle = FileOracle::new(&path);
        assert!(oracle.active_uplink().await.is_err());

        tokio::fs::write(&path, r#"{"active_uplink": "wg-ca", "rtt_ms": 38}"#)
            .await
            .unwrap();
        assert_eq!(oracle.active_uplink().await.unwrap(), "wg-ca");

        tokio::fs::write(&path, r#"{"mode": "training"}"#).await.unwrap();
        assert!(oracle.active_uplink().await.is_err());

        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(oracle.active_uplink().await.is_err());
    }
}
