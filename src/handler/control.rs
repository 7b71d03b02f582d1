//! In-band control channel carried in request headers
//!
//! Headers named `Replay_<command>` steer the capture pipeline. They are split
//! off before an event is buffered and never reach rendered output, whether or
//! not the command is understood.

use crate::event::Header;

/// Reserved header name prefix, matched ASCII case-insensitively
pub const CONTROL_PREFIX: &str = "Replay_";

/// Keyword of the batch size directive
pub const BATCH_KEYWORD: &str = "batch";

/// Directive extracted from a control header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `Replay_batch: <value>`; the raw value is parsed when applied
    SetBatchSize(String),
    /// Any other `Replay_*` header
    Unknown {
        /// Text after the prefix
        keyword: String,
        /// Header value
        value: String,
    },
}

/// What a batch directive asks the handler to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDirective {
    /// Flush, then go back to the default size
    Reset,
    /// Flush, then use this size for subsequent events
    Resize(usize),
}

impl BatchDirective {
    /// Interpret a raw directive value; `None` if it is not a usable size
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>().ok()? {
            0 => Some(Self::Reset),
            n => usize::try_from(n).ok().map(Self::Resize),
        }
    }
}

/// Split `headers` into data headers and control commands, both in order
pub fn extract_control_headers(headers: Vec<Header>) -> (Vec<Header>, Vec<ControlCommand>) {
    let mut kept = Vec::with_capacity(headers.len());
    let mut commands = Vec::new();

    for header in headers {
        match control_keyword(&header.name) {
            Some(keyword) if keyword.eq_ignore_ascii_case(BATCH_KEYWORD) => {
                commands.push(ControlCommand::SetBatchSize(header.value));
            }
            Some(keyword) => commands.push(ControlCommand::Unknown {
                keyword: keyword.to_string(),
                value: header.value,
            }),
            None => kept.push(header),
        }
    }

    (kept, commands)
}

/// Whether `name` belongs to the control namespace
pub fn is_control_header(name: &str) -> bool {
    control_keyword(name).is_some()
}

fn control_keyword(name: &str) -> Option<&str> {
    let prefix = name.get(..CONTROL_PREFIX.len())?;
    prefix
        .eq_ignore_ascii_case(CONTROL_PREFIX)
        .then(|| &name[CONTROL_PREFIX.len()..])
}
