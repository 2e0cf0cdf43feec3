mod call;
mod flow;

pub use call::{CallState, Registration, SipCall, CALL_ID_DISPLAY_LEN};
pub use flow::{FlowKey, FlowRecord};

use crate::capture::PacketEvent;
use crate::config::TrackerConfig;
use crate::sip::{SipMessage, SipMethod};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct TrackerState {
    flows: HashMap<FlowKey, FlowRecord>,
    calls: HashMap<String, SipCall>,
    registrations: HashMap<String, Registration>,
    failover_count: u64,
}

/// Point-in-time copy of the tables, taken under the lock and handed to
/// the snapshot publisher for serialization outside of it.
#[derive(Debug, Clone)]
pub struct TrackerView {
    pub flows: Vec<FlowRecord>,
    pub calls: Vec<SipCall>,
    pub registrations: Vec<Registration>,
    pub active_flows: usize,
    pub total_flows: usize,
    pub active_calls: usize,
    pub failover_count: u64,
}

/// The session tables: generic flows, SIP calls and registrations, plus
/// the process-wide failover counter. All mutation happens under one
/// coarse lock; no operation does I/O while holding it.
pub struct Tracker {
    inner: Mutex<TrackerState>,
    cfg: TrackerConfig,
}

impl Tracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            inner: Mutex::new(TrackerState::default()),
            cfg,
        }
    }

    /// Account one captured packet, opening a flow record on first sight
    /// of its normalized identity.
    pub fn record_packet(&self, ev: &PacketEvent, now: f64) {
        let key = FlowKey::normalized(ev.proto, ev.src_addr, ev.src_port, ev.dst_addr, ev.dst_port);
        let mut guard = self.inner.lock().unwrap();
        let record = guard
            .flows
            .entry(key)
            .or_insert_with(|| FlowRecord::open(ev, now));
        record.touch(ev.length, now);
    }

    /// Apply one parsed SIP message to the call and registration tables.
    /// Messages without a Call-ID are ignored; so is anything referencing
    /// an unknown dialog, except INVITE which always creates one.
    pub fn apply_sip(&self, msg: &SipMessage, now: f64) {
        let Some(call_id) = msg.call_id.as_deref() else {
            return;
        };
        let mut guard = self.inner.lock().unwrap();
        match msg.method {
            Some(SipMethod::Invite) => {
                debug!("call {} ringing", call_id);
                guard.calls.insert(
                    call_id.to_string(),
                    SipCall::ringing(call_id, msg.from_uri.as_deref(), msg.to_uri.as_deref(), now),
                );
            }
            Some(SipMethod::Bye) => {
                if let Some(call) = guard.calls.get_mut(call_id) {
                    if !call.state.is_terminal() {
                        call.state = CallState::Ended;
                        call.updated = now;
                    }
                }
            }
            Some(SipMethod::Cancel) => {
                if let Some(call) = guard.calls.get_mut(call_id) {
                    if call.state == CallState::Ringing {
                        call.state = CallState::Cancelled;
                        call.updated = now;
                    }
                }
            }
            Some(SipMethod::Register) => {
                if let Some(user) = msg.from_uri.as_deref() {
                    guard.registrations.insert(
                        user.to_string(),
                        Registration {
                            user: user.to_string(),
                            contact: msg.contact.clone().unwrap_or_else(|| "?".to_string()),
                            updated: now,
                        },
                    );
                }
            }
            // ACK, OPTIONS, INFO, UPDATE, REFER refresh a known live
            // dialog without changing its state.
            Some(_) => {
                if let Some(call) = guard.calls.get_mut(call_id) {
                    if !call.state.is_terminal() {
                        call.updated = now;
                    }
                }
            }
            None => {}
        }
        // A 200 answers the INVITE only while the dialog is still
        // ringing; retransmissions and out-of-dialog 200s are ignored.
        if msg.status == Some(200) {
            if let Some(call) = guard.calls.get_mut(call_id) {
                if call.state == CallState::Ringing {
                    call.state = CallState::Active;
                    call.updated = now;
                }
            }
        }
    }

    /// The active uplink changed: credit every session demonstrably
    /// alive at the moment of the switch with surviving one more
    /// failover. Credit is never taken back.
    pub fn mark_failover(&self, now: f64) {
        let window = self.cfg.failover_window_secs;
        let mut guard = self.inner.lock().unwrap();
        guard.failover_count += 1;
        let count = guard.failover_count;
        let mut survivors = 0usize;
        for flow in guard.flows.values_mut() {
            if flow.active && now - flow.last_seen < window {
                flow.failovers_survived += 1;
                survivors += 1;
            }
        }
        for call in guard.calls.values_mut() {
            if call.state == CallState::Active {
                call.failovers_survived += 1;
                survivors += 1;
            }
        }
        info!("failover #{}: {} sessions survived", count, survivors);
    }

    /// Recompute activity flags and drop what is past its reap
    /// threshold. Active flows are never deleted; registrations never
    /// expire.
    pub fn prune(&self, now: f64) {
        let cfg = self.cfg;
        let mut guard = self.inner.lock().unwrap();
        for flow in guard.flows.values_mut() {
            if now - flow.last_seen > cfg.inactive_after_secs {
                flow.active = false;
            }
        }
        guard
            .flows
            .retain(|_, f| f.active || now - f.last_seen <= cfg.reap_flow_after_secs);
        guard
            .calls
            .retain(|_, c| !c.state.is_terminal() || now - c.updated <= cfg.reap_call_after_secs);
    }

    /// Copy the tables and aggregate counters out from under the lock.
    pub fn capture(&self) -> TrackerView {
        let guard = self.inner.lock().unwrap();
        TrackerView {
            active_flows: guard.flows.values().filter(|f| f.active).count(),
            total_flows: guard.flows.len(),
            active_calls: guard
                .calls
                .values()
                .filter(|c| c.state == CallState::Active)
                .count(),
            failover_count: guard.failover_count,
            flows: guard.flows.values().cloned().collect(),
            calls: guard.calls.values().cloned().collect(),
            registrations: guard.registrations.values().cloned().collect(),
        }
    }
}
