use crate::capture::{self, SipAssembler};
use crate::config::Config;
use crate::now_secs;
use crate::sip;
use crate::snapshot::{Publisher, Snapshot};
use crate::tracker::Tracker;
use crate::uplink::{FailoverWatcher, FileOracle, UplinkOracle};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct App {
    pub config: Arc<Config>,
    pub tracker: Arc<Tracker>,
    token: CancellationToken,
    oracle: Box<dyn UplinkOracle>,
}

pub struct AppBuilder {
    config: Option<Config>,
    oracle: Option<Box<dyn UplinkOracle>>,
    token: Option<CancellationToken>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            oracle: None,
            token: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Substitute the uplink oracle; production falls back to the
    /// file-backed one at the configured status path.
    pub fn oracle(mut self, oracle: Box<dyn UplinkOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn build(self) -> Result<App> {
        let config = Arc::new(self.config.unwrap_or_default());
        let tracker = Arc::new(Tracker::new(config.tracker));
        let oracle = self
            .oracle
            .unwrap_or_else(|| Box::new(FileOracle::new(&config.status_path)));
        Ok(App {
            config,
            tracker,
            token: self.token.unwrap_or_default(),
            oracle,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Run the three workers until one of them stops or the token is
    /// cancelled: the packet consumer, the SIP consumer, and the
    /// periodic correlate-prune-publish loop.
    pub async fn run(self) -> Result<()> {
        let App {
            config,
            tracker,
            token,
            oracle,
        } = self;

        for path in [&config.flows_path, &config.sip_path] {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!("failed to create {}: {}", parent.display(), e);
                }
            }
        }

        let publisher = Publisher::new(&config.flows_path, &config.sip_path);
        // Publish an empty snapshot up front so readers never see a
        // missing file.
        publisher
            .publish(&Snapshot::build(tracker.capture(), now_secs()))
            .await;

        let (pkt_tx, mut pkt_rx) = mpsc::channel::<String>(4096);
        let (sip_tx, mut sip_rx) = mpsc::channel::<String>(1024);

        let flow_cmd = config.capture.flow_cmd.clone();
        let flow_token = token.child_token();
        tokio::spawn(async move {
            if let Err(e) = capture::run_capture("flow", flow_cmd, pkt_tx, flow_token).await {
                warn!("flow capture failed: {}", e);
            }
        });
        let sip_cmd = config.capture.sip_cmd.clone();
        let sip_token = token.child_token();
        tokio::spawn(async move {
            if let Err(e) = capture::run_capture("sip", sip_cmd, sip_tx, sip_token).await {
                warn!("sip capture failed: {}", e);
            }
        });

        let pkt_tracker = tracker.clone();
        let packet_consumer = async move {
            while let Some(line) = pkt_rx.recv().await {
                if let Some(ev) = capture::parse_packet_line(&line) {
                    pkt_tracker.record_packet(&ev, now_secs());
                }
            }
        };

        let sip_tracker = tracker.clone();
        let sip_consumer = async move {
            let mut assembler = SipAssembler::new();
            while let Some(line) = sip_rx.recv().await {
                if let Some(text) = assembler.push_line(&line) {
                    let msg = sip::parse_sip(&text);
                    if msg.is_signal() {
                        sip_tracker.apply_sip(&msg, now_secs());
                    }
                }
            }
        };

        let mut watcher = FailoverWatcher::new(oracle);
        let periodic_tracker = tracker.clone();
        let period = Duration::from_secs(config.publish_interval_secs.max(1));
        let periodic = async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = now_secs();
                watcher.check(&periodic_tracker, now).await;
                periodic_tracker.prune(now);
                let snapshot = Snapshot::build(periodic_tracker.capture(), now);
                publisher.publish(&snapshot).await;
            }
        };

        select! {
            _ = packet_consumer => warn!("packet stream ended"),
            _ = sip_consumer => warn!("SIP stream ended"),
            _ = periodic => {}
            _ = token.cancelled() => info!("tracker shutting down"),
        }
        token.cancel();
        Ok(())
    }
}
