use crate::classifier::Protocol;
use anyhow::{anyhow, Result};
use std::net::IpAddr;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One parsed packet-header record from the capture stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEvent {
    pub proto: Protocol,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub length: u64,
}

/// Tokenize one line of the packet capture stream.
///
/// Expected shape: `<timestamp> IP <src>.<sport> > <dst>.<dport>: <proto>`
/// with an optional trailing `length N`. Anything else yields `None`;
/// capture noise is expected and silently dropped.
pub fn parse_packet_line(line: &str) -> Option<PacketEvent> {
    let mut tokens = line.split_whitespace();

    let ts = tokens.next()?;
    if ts.is_empty() || !ts.chars().all(|c| c.is_ascii_digit() || c == ':' || c == '.') {
        return None;
    }
    if tokens.next()? != "IP" {
        return None;
    }
    let (src_addr, src_port) = split_endpoint(tokens.next()?)?;
    if tokens.next()? != ">" {
        return None;
    }
    let (dst_addr, dst_port) = split_endpoint(tokens.next()?.strip_suffix(':')?)?;
    let proto = Protocol::parse(tokens.next()?.trim_end_matches(','))?;

    let mut length = 0u64;
    let rest: Vec<&str> = tokens.collect();
    if let Some(pos) = rest.iter().position(|t| *t == "length") {
        if let Some(n) = rest.get(pos + 1) {
            length = n.trim_end_matches(',').parse().unwrap_or(0);
        }
    }

    Some(PacketEvent {
        proto,
        src_addr,
        src_port,
        dst_addr,
        dst_port,
        length,
    })
}

/// Split `a.b.c.d.port` into address and port. The port is the part after
/// the last dot.
fn split_endpoint(token: &str) -> Option<(IpAddr, u16)> {
    let (addr, port) = token.rsplit_once('.')?;
    Some((addr.parse().ok()?, port.parse().ok()?))
}

const SIP_START_MARKERS: &[&str] = &[
    "INVITE sip:",
    "BYE sip:",
    "REGISTER sip:",
    "ACK sip:",
    "CANCEL sip:",
    "OPTIONS sip:",
    "INFO sip:",
    "UPDATE sip:",
    "REFER sip:",
    "SIP/2.0 ",
];

fn is_sip_start_line(line: &str) -> bool {
    SIP_START_MARKERS.iter().any(|m| line.contains(m))
}

/// Reassembles SIP messages from the line-oriented payload capture.
///
/// A message begins at a recognized request/response start line and ends
/// at the next blank line or start line. Lines arriving before any start
/// line are discarded.
#[derive(Debug, Default)]
pub struct SipAssembler {
    buf: Vec<String>,
}

impl SipAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one captured line; returns a complete message when this line
    /// closes one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches('\r');
        if is_sip_start_line(line) {
            let done = self.flush();
            self.buf.push(line.to_string());
            return done;
        }
        if self.buf.is_empty() {
            return None;
        }
        if line.trim().is_empty() {
            return self.flush();
        }
        self.buf.push(line.to_string());
        None
    }

    /// Drain the current buffer as one message, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf).join("\n"))
        }
    }
}

/// Spawn the configured external capture command and stream its stdout
/// into `tx`, one line per message. Returns when the command exits, the
/// receiver is gone, or the token is cancelled.
pub async fn run_capture(
    name: &str,
    argv: Vec<String>,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("{} capture command is empty", name))?;
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow!("failed to spawn {} capture {}: {}", name, program, e))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{} capture has no stdout", name))?;
    let mut lines = BufReader::new(stdout).lines();

    info!("{} capture started: {}", name, argv.join(" "));
    loop {
        select! {
            _ = token.cancelled() => {
                child.start_kill().ok();
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(l)) => {
                    if tx.send(l).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    warn!("{} capture stream closed", name);
                    break;
                }
                Err(e) => {
                    warn!("{} capture read error: {}", name, e);
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Protocol;

    #[test]
    fn parses_udp_record_with_length() {
        let line = "11:33:58.015510 IP 104.204.136.50.41641 > 176.58.93.248.3478: UDP, length 40";
        let ev = parse_packet_line(line).unwrap();
        assert_eq!(ev.proto, Protocol::Udp);
        assert_eq!(ev.src_addr, "104.204.136.50".parse::<IpAddr>().unwrap());
        assert_eq!(ev.src_port, 41641);
        assert_eq!(ev.dst_addr, "176.58.93.248".parse::<IpAddr>().unwrap());
        assert_eq!(ev.dst_port, 3478);
        assert_eq!(ev.length, 40);
    }

    #[test]
    fn parses_tcp_record_without_length() {
        let line = "11:33:56.283713 IP 104.204.136.50.49654 > 192.73.248.83.443: tcp 0";
        let ev = parse_packet_line(line).unwrap();
        assert_eq!(ev.proto, Protocol::Tcp);
        assert_eq!(ev.dst_port, 443);
        assert_eq!(ev.length, 0);
    }

    #[test]
    fn rejects_noise_lines() {
        assert!(parse_packet_line("").is_none());
        assert!(parse_packet_line("listening on any, link-type LINUX_SLL").is_none());
        assert!(parse_packet_line("11:33:56.283713 IP6 fe80::1.5000 > fe80::2.6000: UDP, length 8").is_none());
        assert!(parse_packet_line("11:33:56.283713 IP 1.2.3.4.80 >").is_none());
        assert!(parse_packet_line("11:33:56 IP 1.2.3.4.80 > 5.6.7.8.90: icmp").is_none());
    }

    #[test]
    fn assembler_yields_message_on_blank_line() {
        let mut asm = SipAssembler::new();
        assert!(asm.push_line("garbage before any start line").is_none());
        assert!(asm.push_line("INVITE sip:bob@example.com SIP/2.0").is_none());
        assert!(asm.push_line("Call-ID: abc123").is_none());
        let msg = asm.push_line("").unwrap();
        assert!(msg.starts_with("INVITE sip:"));
        assert!(msg.contains("Call-ID: abc123"));
        assert!(asm.flush().is_none());
    }

    #[test]
    fn assembler_new_start_line_closes_previous() {
        let mut asm = SipAssembler::new();
        assert!(asm.push_line("INVITE sip:bob@example.com SIP/2.0").is_none());
        assert!(asm.push_line("Call-ID: first").is_none());
        let first = asm.push_line("SIP/2.0 100 Trying").unwrap();
        assert!(first.contains("Call-ID: first"));
        assert!(asm.push_line("Call-ID: second").is_none());
        let second = asm.flush().unwrap();
        assert!(second.starts_with("SIP/2.0 100"));
        assert!(second.contains("Call-ID: second"));
    }
}
