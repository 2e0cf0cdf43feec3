use anyhow::Error;
use serde::Deserialize;

/// Daemon configuration, loaded from a TOML file. Every field has a
/// default so a partial file (or none at all) is enough to run.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    /// Published flow snapshot path.
    pub flows_path: String,
    /// Published call-only compatibility snapshot path.
    pub sip_path: String,
    /// Uplink status document maintained by the path-steering daemon.
    pub status_path: String,
    /// Snapshot publish period in seconds.
    pub publish_interval_secs: u64,
    pub tracker: TrackerConfig,
    pub capture: CaptureConfig,
}

/// Session table thresholds, all in seconds.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TrackerConfig {
    /// A flow with no packets for this long is marked inactive.
    pub inactive_after_secs: f64,
    /// An inactive flow idle this long is deleted.
    pub reap_flow_after_secs: f64,
    /// A terminal call is deleted this long after ending.
    pub reap_call_after_secs: f64,
    /// Only sessions seen within this window of a path switch are
    /// credited with surviving it.
    pub failover_window_secs: f64,
}

/// External capture commands whose stdout supplies the event streams.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub flow_cmd: Vec<String>,
    pub sip_cmd: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            flows_path: "/run/flowmon/flows.json".to_string(),
            sip_path: "/run/flowmon/sip.json".to_string(),
            status_path: "/run/flowmon/status.json".to_string(),
            publish_interval_secs: 2,
            tracker: TrackerConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            inactive_after_secs: 30.0,
            reap_flow_after_secs: 300.0,
            reap_call_after_secs: 120.0,
            failover_window_secs: 10.0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            flow_cmd: vec![
                "tcpdump", "-i", "any", "-l", "-n", "-q", "-s", "1500", "not", "icmp",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sip_cmd: vec![
                "tcpdump",
                "-i",
                "any",
                "-l",
                "-A",
                "-s",
                "0",
                "udp port 5060 or tcp port 5060",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.publish_interval_secs, 2);
        assert_eq!(config.tracker.inactive_after_secs, 30.0);
        assert_eq!(config.tracker.reap_flow_after_secs, 300.0);
        assert_eq!(config.tracker.reap_call_after_secs, 120.0);
        assert_eq!(config.tracker.failover_window_secs, 10.0);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            flows_path = "/tmp/flows.json"

            [tracker]
            failover_window_secs = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.flows_path, "/tmp/flows.json");
        assert_eq!(config.sip_path, "/run/flowmon/sip.json");
        assert_eq!(config.tracker.failover_window_secs, 5.0);
        assert_eq!(config.tracker.inactive_after_secs, 30.0);
    }
}
