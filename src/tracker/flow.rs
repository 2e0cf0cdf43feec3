use crate::capture::PacketEvent;
use crate::classifier::{classify, Protocol, ServiceLabel};
use serde::Serialize;
use std::net::IpAddr;

/// Direction-independent flow identity: protocol plus the endpoint pair
/// ordered so that packets seen in either direction map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    proto: Protocol,
    lo: (IpAddr, u16),
    hi: (IpAddr, u16),
}

impl FlowKey {
    pub fn normalized(
        proto: Protocol,
        src_addr: IpAddr,
        src_port: u16,
        dst_addr: IpAddr,
        dst_port: u16,
    ) -> Self {
        let a = (src_addr, src_port);
        let b = (dst_addr, dst_port);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self { proto, lo, hi }
    }
}

/// One bidirectional network session.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    pub proto: Protocol,
    /// Endpoints in the orientation of the first-seen packet.
    pub src: String,
    pub dst: String,
    pub service: ServiceLabel,
    pub packets: u64,
    pub bytes: u64,
    pub start: f64,
    pub last_seen: f64,
    pub failovers_survived: u32,
    pub active: bool,
}

impl FlowRecord {
    /// Open a record from the first packet of a flow. Counters start at
    /// zero; the caller applies the packet itself via [`touch`].
    ///
    /// [`touch`]: FlowRecord::touch
    pub fn open(ev: &PacketEvent, now: f64) -> Self {
        Self {
            proto: ev.proto,
            src: format!("{}:{}", ev.src_addr, ev.src_port),
            dst: format!("{}:{}", ev.dst_addr, ev.dst_port),
            service: classify(ev.dst_port, ev.proto, ev.dst_addr),
            packets: 0,
            bytes: 0,
            start: now,
            last_seen: now,
            failovers_survived: 0,
            active: true,
        }
    }

    /// Account one packet on this flow.
    pub fn touch(&mut self, length: u64, now: f64) {
        self.packets += 1;
        self.bytes += length;
        self.last_seen = now;
        self.active = true;
    }
}
