use serde::Serialize;

/// Call-IDs are stored in full as map keys but truncated for display.
pub const CALL_ID_DISPLAY_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Ringing,
    Active,
    Ended,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Cancelled)
    }
}

/// One SIP signaling dialog.
#[derive(Debug, Clone, Serialize)]
pub struct SipCall {
    pub call_id: String,
    pub calling: String,
    pub called: String,
    pub state: CallState,
    pub start: f64,
    pub updated: f64,
    pub failovers_survived: u32,
}

impl SipCall {
    /// A freshly-seen INVITE: the dialog starts out ringing.
    pub fn ringing(call_id: &str, calling: Option<&str>, called: Option<&str>, now: f64) -> Self {
        Self {
            call_id: call_id.chars().take(CALL_ID_DISPLAY_LEN).collect(),
            calling: calling.unwrap_or("?").to_string(),
            called: called.unwrap_or("?").to_string(),
            state: CallState::Ringing,
            start: now,
            updated: now,
            failovers_survived: 0,
        }
    }
}

/// Last known REGISTER for a URI. Overwritten on every REGISTER from the
/// same user, never expired while the process runs.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: String,
    pub contact: String,
    pub updated: f64,
}
