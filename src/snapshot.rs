use crate::tracker::{FlowRecord, Registration, SipCall, TrackerView};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The flow view lists at most this many flows, most recently active
/// first.
pub const MAX_SNAPSHOT_FLOWS: usize = 20;
/// The call list is capped at this many entries, most recently updated
/// first.
pub const MAX_SNAPSHOT_CALLS: usize = 10;

/// Point-in-time projection of the session tables, published wholesale.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub active_flows: usize,
    pub total_flows: usize,
    pub active_sip_calls: usize,
    pub registrations: usize,
    pub failover_count: u64,
    pub flows: Vec<FlowRecord>,
    pub sip_calls: Vec<SipCall>,
    pub sip_regs: Vec<Registration>,
    pub updated: f64,
}

/// Reduced view for consumers that only need SIP state.
#[derive(Debug, Serialize)]
pub struct SipSnapshot {
    pub active_calls: usize,
    pub calls: Vec<SipCall>,
    pub regs: Vec<Registration>,
}

impl Snapshot {
    /// Order, filter and cap a captured table view into the published
    /// shape. Runs outside the tracker lock.
    pub fn build(view: TrackerView, now: f64) -> Self {
        let mut flows: Vec<FlowRecord> = view.flows.into_iter().filter(|f| f.active).collect();
        flows.sort_by(|a, b| b.last_seen.total_cmp(&a.last_seen));
        flows.truncate(MAX_SNAPSHOT_FLOWS);

        let mut calls = view.calls;
        calls.sort_by(|a, b| b.updated.total_cmp(&a.updated));
        calls.truncate(MAX_SNAPSHOT_CALLS);

        let mut regs = view.registrations;
        regs.sort_by(|a, b| a.user.cmp(&b.user));

        Self {
            active_flows: view.active_flows,
            total_flows: view.total_flows,
            active_sip_calls: view.active_calls,
            registrations: regs.len(),
            failover_count: view.failover_count,
            flows,
            sip_calls: calls,
            sip_regs: regs,
            updated: now,
        }
    }

    pub fn sip_view(&self) -> SipSnapshot {
        SipSnapshot {
            active_calls: self.active_sip_calls,
            calls: self.sip_calls.clone(),
            regs: self.sip_regs.clone(),
        }
    }
}

/// Writes the published snapshot files. Each write goes to a temporary
/// sibling first and is renamed over the destination, so a reader
/// polling at any moment sees either the old file or the new one, whole.
pub struct Publisher {
    flows_path: PathBuf,
    sip_path: PathBuf,
}

impl Publisher {
    pub fn new(flows_path: impl Into<PathBuf>, sip_path: impl Into<PathBuf>) -> Self {
        Self {
            flows_path: flows_path.into(),
            sip_path: sip_path.into(),
        }
    }

    /// Publish both views. A failed write leaves the previously
    /// published file in place and is logged, never propagated.
    pub async fn publish(&self, snapshot: &Snapshot) {
        if let Err(e) = write_atomic(&self.flows_path, snapshot).await {
            warn!("failed to publish {}: {}", self.flows_path.display(), e);
        }
        if let Err(e) = write_atomic(&self.sip_path, &snapshot.sip_view()).await {
            warn!("failed to publish {}: {}", self.sip_path.display(), e);
        }
    }
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("snapshot path has no file name: {}", path.display()))?;
    let tmp = path.with_file_name(format!("{}.tmp", name.to_string_lossy()));
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
