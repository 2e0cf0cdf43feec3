use std::fmt;

/// SIP request methods the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipMethod {
    Invite,
    Bye,
    Register,
    Ack,
    Cancel,
    Options,
    Info,
    Update,
    Refer,
}

impl SipMethod {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "INVITE" => Some(SipMethod::Invite),
            "BYE" => Some(SipMethod::Bye),
            "REGISTER" => Some(SipMethod::Register),
            "ACK" => Some(SipMethod::Ack),
            "CANCEL" => Some(SipMethod::Cancel),
            "OPTIONS" => Some(SipMethod::Options),
            "INFO" => Some(SipMethod::Info),
            "UPDATE" => Some(SipMethod::Update),
            "REFER" => Some(SipMethod::Refer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Bye => "BYE",
            SipMethod::Register => "REGISTER",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Refer => "REFER",
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields extracted from one captured SIP message. Every field is
/// optional; unparseable input yields the all-absent default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SipMessage {
    pub method: Option<SipMethod>,
    pub status: Option<u16>,
    pub call_id: Option<String>,
    pub from_uri: Option<String>,
    pub to_uri: Option<String>,
    pub contact: Option<String>,
}

impl SipMessage {
    /// True when the message carries something the tracker can act on.
    pub fn is_signal(&self) -> bool {
        self.method.is_some() || self.status.is_some()
    }
}

/// Extract the tracker-relevant fields from raw SIP text.
///
/// Tolerant by construction: each field is taken from the first line that
/// matches its shape and the rest of the message is ignored. Never fails.
pub fn parse_sip(text: &str) -> SipMessage {
    let mut msg = SipMessage::default();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if msg.method.is_none() {
            if let Some((token, _)) = line.split_once(' ') {
                msg.method = SipMethod::parse(token);
            }
        }
        if msg.status.is_none() {
            msg.status = parse_status_line(line);
        }
        if let Some(value) = header_value(line, "call-id") {
            msg.call_id.get_or_insert_with(|| value.trim().to_string());
        } else if let Some(value) = header_value(line, "from") {
            if msg.from_uri.is_none() {
                msg.from_uri = sip_user_part(value);
            }
        } else if let Some(value) = header_value(line, "to") {
            if msg.to_uri.is_none() {
                msg.to_uri = sip_user_part(value);
            }
        } else if let Some(value) = header_value(line, "contact") {
            if msg.contact.is_none() {
                msg.contact = sip_contact_uri(value);
            }
        }
    }
    msg
}

/// `SIP/2.0 <3-digit code> ...` at the start of a line.
fn parse_status_line(line: &str) -> Option<u16> {
    let rest = line.strip_prefix("SIP/2.0 ")?;
    let code: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if code.len() == 3 {
        code.parse().ok()
    } else {
        None
    }
}

/// Value of `<name>: ...` if this line is that header (case-insensitive).
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (header, value) = line.split_once(':')?;
    if header.trim().eq_ignore_ascii_case(name) {
        Some(value)
    } else {
        None
    }
}

/// User part of the first `sip:` URI in a From/To header value:
/// everything after `sip:` up to `@`, `>`, `;` or whitespace.
fn sip_user_part(value: &str) -> Option<String> {
    let rest = find_sip_uri(value)?;
    let user: String = rest
        .chars()
        .take_while(|c| !matches!(c, '@' | '>' | ';') && !c.is_whitespace())
        .collect();
    if user.is_empty() {
        None
    } else {
        Some(user)
    }
}

/// Full `user@host` of the first `sip:` URI in a Contact header value,
/// up to `>` or `;`.
fn sip_contact_uri(value: &str) -> Option<String> {
    let rest = find_sip_uri(value)?;
    let uri: String = rest
        .chars()
        .take_while(|c| !matches!(c, '>' | ';'))
        .collect();
    let uri = uri.trim();
    if uri.is_empty() {
        None
    } else {
        Some(uri.to_string())
    }
}

fn find_sip_uri(value: &str) -> Option<&str> {
    let lower = value.to_ascii_lowercase();
    let pos = lower.find("sip:")?;
    Some(&value[pos + 4..])
}
