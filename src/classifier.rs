use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

/// Transport protocol of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Parse the protocol tag as it appears in capture records
    /// (lowercase `tcp`, uppercase `UDP`).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "tcp" => Some(Protocol::Tcp),
            "udp" | "UDP" => Some(Protocol::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort service classification of a flow's destination.
///
/// Closed set of known services plus a provider-tagged variant for
/// recognized cloud address ranges and a generic fallback carrying the
/// raw protocol and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceLabel {
    HttpsWss,
    Sip,
    SipTcp,
    SipTls,
    WebRtcSig,
    Rtp,
    Rtcp,
    UdpMedia,
    Provider { name: &'static str, port: u16 },
    Other { proto: Protocol, port: u16 },
}

impl fmt::Display for ServiceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceLabel::HttpsWss => f.write_str("HTTPS/WSS"),
            ServiceLabel::Sip => f.write_str("SIP"),
            ServiceLabel::SipTcp => f.write_str("SIP-TCP"),
            ServiceLabel::SipTls => f.write_str("SIP-TLS"),
            ServiceLabel::WebRtcSig => f.write_str("WebRTC-Sig"),
            ServiceLabel::Rtp => f.write_str("RTP/SRTP"),
            ServiceLabel::Rtcp => f.write_str("RTCP"),
            ServiceLabel::UdpMedia => f.write_str("UDP-Media"),
            ServiceLabel::Provider { name, port } => write!(f, "{}:{}", name, port),
            ServiceLabel::Other { proto, port } => {
                write!(f, "{}:{}", proto.as_str().to_uppercase(), port)
            }
        }
    }
}

impl Serialize for ServiceLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Classify a flow by its destination port, protocol and address.
///
/// Total: always yields a label. The match order is significant; the
/// static port table wins over the range heuristics, which win over the
/// provider ranges, which win over the generic fallback.
pub fn classify(dst_port: u16, proto: Protocol, dst_addr: IpAddr) -> ServiceLabel {
    match (dst_port, proto) {
        (443, Protocol::Tcp) => return ServiceLabel::HttpsWss,
        (5060, Protocol::Udp) => return ServiceLabel::Sip,
        (5060, Protocol::Tcp) => return ServiceLabel::SipTcp,
        (5061, Protocol::Tcp) => return ServiceLabel::SipTls,
        (8443, Protocol::Tcp) => return ServiceLabel::WebRtcSig,
        _ => {}
    }
    if proto == Protocol::Udp {
        // RTP sits on even ports in the conventional media range, RTCP on
        // the odd port right above its RTP stream.
        if (16384..=32767).contains(&dst_port) {
            return if dst_port % 2 == 0 {
                ServiceLabel::Rtp
            } else {
                ServiceLabel::Rtcp
            };
        }
        if dst_port > 10000 {
            return ServiceLabel::UdpMedia;
        }
    }
    if let Some(name) = provider_for(dst_addr) {
        return ServiceLabel::Provider {
            name,
            port: dst_port,
        };
    }
    ServiceLabel::Other {
        proto,
        port: dst_port,
    }
}

fn provider_for(addr: IpAddr) -> Option<&'static str> {
    let IpAddr::V4(v4) = addr else {
        return None;
    };
    match v4.octets()[0] {
        3 | 52 | 54 => Some("AWS"),
        170 | 173 => Some("Webex"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn static_table_wins_over_heuristics() {
        assert_eq!(
            classify(443, Protocol::Tcp, addr("52.1.2.3")).to_string(),
            "HTTPS/WSS"
        );
        assert_eq!(classify(5060, Protocol::Udp, addr("1.2.3.4")).to_string(), "SIP");
        assert_eq!(
            classify(5060, Protocol::Tcp, addr("1.2.3.4")).to_string(),
            "SIP-TCP"
        );
        assert_eq!(
            classify(5061, Protocol::Tcp, addr("1.2.3.4")).to_string(),
            "SIP-TLS"
        );
        assert_eq!(
            classify(8443, Protocol::Tcp, addr("1.2.3.4")).to_string(),
            "WebRTC-Sig"
        );
    }

    #[test]
    fn rtp_rtcp_parity_in_media_range() {
        assert_eq!(
            classify(16384, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::Rtp
        );
        assert_eq!(
            classify(16385, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::Rtcp
        );
        assert_eq!(
            classify(32767, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::Rtcp
        );
        // One past the range falls through to the high-port heuristic.
        assert_eq!(
            classify(32768, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::UdpMedia
        );
    }

    #[test]
    fn high_udp_is_media_tcp_is_not() {
        assert_eq!(
            classify(12345, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::UdpMedia
        );
        assert_eq!(
            classify(10000, Protocol::Udp, addr("1.2.3.4")),
            ServiceLabel::Other {
                proto: Protocol::Udp,
                port: 10000
            }
        );
        assert_eq!(
            classify(12345, Protocol::Tcp, addr("1.2.3.4")).to_string(),
            "TCP:12345"
        );
    }

    #[test]
    fn provider_ranges_tag_the_port() {
        assert_eq!(
            classify(9999, Protocol::Tcp, addr("52.94.0.1")).to_string(),
            "AWS:9999"
        );
        assert_eq!(
            classify(8080, Protocol::Tcp, addr("170.72.0.9")).to_string(),
            "Webex:8080"
        );
        // Provider match only applies after the UDP heuristics.
        assert_eq!(
            classify(20000, Protocol::Udp, addr("52.94.0.1")),
            ServiceLabel::Rtp
        );
    }

    #[test]
    fn fallback_carries_protocol_and_port() {
        assert_eq!(
            classify(8080, Protocol::Tcp, addr("192.168.1.1")).to_string(),
            "TCP:8080"
        );
        assert_eq!(
            classify(53, Protocol::Udp, addr("192.168.1.1")).to_string(),
            "UDP:53"
        );
    }
}
