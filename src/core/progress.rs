//! Progress message decoding
//!
//! The imaging library reports apply/capture progress as `(message id,
//! wParam, lParam)` triples whose word meanings depend on the message kind
//! and, in practice, on the library build. [`ProgressDecoder`] keeps a
//! running `(current, total)` pair for a single operation and turns each
//! raw message into a [`DecodedProgressEvent`] with a percentage, a short
//! summary and a noise flag for per-file chatter.
//!
//! One decoder belongs to exactly one apply or capture call.

use log::{info, trace, warn};
use serde::Serialize;
use std::fmt;

/// `WM_APP`
const WM_APP: u32 = 0x8000;

/// Base of the imaging library's message id range
pub const MESSAGE_BASE: u32 = WM_APP + 0x1476;

pub const MSG_TEXT: u32 = MESSAGE_BASE + 1;
pub const MSG_PROGRESS: u32 = MESSAGE_BASE + 2;
pub const MSG_PROCESS: u32 = MESSAGE_BASE + 3;
pub const MSG_SCANNING: u32 = MESSAGE_BASE + 4;
/// Total number of items to capture/apply
pub const MSG_SET_RANGE: u32 = MESSAGE_BASE + 5;
/// Number of items captured/applied so far
pub const MSG_SET_POS: u32 = MESSAGE_BASE + 6;
/// One item was captured/applied
pub const MSG_STEP_IT: u32 = MESSAGE_BASE + 7;
pub const MSG_COMPRESS: u32 = MESSAGE_BASE + 8;
pub const MSG_ERROR: u32 = MESSAGE_BASE + 9;
pub const MSG_ALIGN: u32 = MESSAGE_BASE + 10;
pub const MSG_RETRY: u32 = MESSAGE_BASE + 11;
pub const MSG_SPLIT: u32 = MESSAGE_BASE + 12;
pub const MSG_FILE_INFO: u32 = MESSAGE_BASE + 13;
pub const MSG_INFO: u32 = MESSAGE_BASE + 14;
pub const MSG_WARNING: u32 = MESSAGE_BASE + 15;
pub const MSG_CHK_PROCESS: u32 = MESSAGE_BASE + 16;

/// End of operation; outside the sequential range above
pub const MSG_DONE: u32 = 0xFFFF_FFF0;

/// Kind of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Progress,
    Process,
    Scanning,
    SetRange,
    SetPos,
    StepIt,
    Compress,
    Error,
    Align,
    Retry,
    Split,
    FileInfo,
    Info,
    Warning,
    ChkProcess,
    Done,
    /// Any id this crate does not know about
    Unknown(u32),
}

impl MessageKind {
    /// Classify a raw message id
    pub fn from_id(id: u32) -> Self {
        match id {
            MSG_TEXT => MessageKind::Text,
            MSG_PROGRESS => MessageKind::Progress,
            MSG_PROCESS => MessageKind::Process,
            MSG_SCANNING => MessageKind::Scanning,
            MSG_SET_RANGE => MessageKind::SetRange,
            MSG_SET_POS => MessageKind::SetPos,
            MSG_STEP_IT => MessageKind::StepIt,
            MSG_COMPRESS => MessageKind::Compress,
            MSG_ERROR => MessageKind::Error,
            MSG_ALIGN => MessageKind::Align,
            MSG_RETRY => MessageKind::Retry,
            MSG_SPLIT => MessageKind::Split,
            MSG_FILE_INFO => MessageKind::FileInfo,
            MSG_INFO => MessageKind::Info,
            MSG_WARNING => MessageKind::Warning,
            MSG_CHK_PROCESS => MessageKind::ChkProcess,
            MSG_DONE => MessageKind::Done,
            other => MessageKind::Unknown(other),
        }
    }

    /// The raw message id for this kind
    pub fn id(&self) -> u32 {
        match self {
            MessageKind::Text => MSG_TEXT,
            MessageKind::Progress => MSG_PROGRESS,
            MessageKind::Process => MSG_PROCESS,
            MessageKind::Scanning => MSG_SCANNING,
            MessageKind::SetRange => MSG_SET_RANGE,
            MessageKind::SetPos => MSG_SET_POS,
            MessageKind::StepIt => MSG_STEP_IT,
            MessageKind::Compress => MSG_COMPRESS,
            MessageKind::Error => MSG_ERROR,
            MessageKind::Align => MSG_ALIGN,
            MessageKind::Retry => MSG_RETRY,
            MessageKind::Split => MSG_SPLIT,
            MessageKind::FileInfo => MSG_FILE_INFO,
            MessageKind::Info => MSG_INFO,
            MessageKind::Warning => MSG_WARNING,
            MessageKind::ChkProcess => MSG_CHK_PROCESS,
            MessageKind::Done => MSG_DONE,
            MessageKind::Unknown(id) => *id,
        }
    }

    /// Upper-case display name, `UNKNOWN(0x..)` for unrecognised ids
    pub fn name(&self) -> String {
        let name = match self {
            MessageKind::Text => "TEXT",
            MessageKind::Progress => "PROGRESS",
            MessageKind::Process => "PROCESS",
            MessageKind::Scanning => "SCANNING",
            MessageKind::SetRange => "SET_RANGE",
            MessageKind::SetPos => "SET_POS",
            MessageKind::StepIt => "STEP_IT",
            MessageKind::Compress => "COMPRESS",
            MessageKind::Error => "ERROR",
            MessageKind::Align => "ALIGN",
            MessageKind::Retry => "RETRY",
            MessageKind::Split => "SPLIT",
            MessageKind::FileInfo => "FILE_INFO",
            MessageKind::Info => "INFO",
            MessageKind::Warning => "WARNING",
            MessageKind::ChkProcess => "CHK_PROCESS",
            MessageKind::Done => "DONE",
            MessageKind::Unknown(id) => return format!("UNKNOWN(0x{:X})", id),
        };
        name.to_string()
    }

    /// Messages that move the running position
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            MessageKind::SetRange
                | MessageKind::SetPos
                | MessageKind::StepIt
                | MessageKind::Progress
        )
    }

    /// High-frequency per-item messages, and anything unrecognised
    pub fn is_noisy(&self) -> bool {
        matches!(
            self,
            MessageKind::Process
                | MessageKind::FileInfo
                | MessageKind::ChkProcess
                | MessageKind::Unknown(_)
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One message exactly as the native layer delivered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub message_id: u32,
    pub wparam: usize,
    pub lparam: usize,
}

impl ProgressEvent {
    pub fn new(message_id: u32, wparam: usize, lparam: usize) -> Self {
        Self {
            message_id,
            wparam,
            lparam,
        }
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_id(self.message_id)
    }

    /// The definitive end-of-operation signal
    pub fn is_done(&self) -> bool {
        self.message_id == MSG_DONE
    }
}

/// A raw message interpreted against the running state of its operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedProgressEvent {
    pub message_id: u32,
    pub name: String,
    pub wparam: usize,
    pub lparam: usize,
    pub current: u64,
    pub total: u64,
    /// 0 when the total is still unknown
    pub percent: f64,
    /// Set for `ERROR` and `WARNING`, from the first word
    pub error_code: u32,
    pub summary: String,
    pub noisy: bool,
}

impl DecodedProgressEvent {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_id(self.message_id)
    }
}

/// Running position of one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub current: u64,
    pub total: u64,
}

impl ProgressState {
    /// Completion percentage, guarded against an unknown total
    pub fn percent(&self) -> f64 {
        if self.total > 0 {
            (self.current as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Apply one message to the running state.
pub fn transition(state: ProgressState, event: &ProgressEvent) -> ProgressState {
    let ProgressState {
        mut current,
        mut total,
    } = state;
    let (wparam, lparam) = (event.wparam as u64, event.lparam as u64);

    match event.kind() {
        MessageKind::SetRange => {
            // Most builds put the range in lParam; some only fill wParam.
            total = if lparam != 0 { lparam } else { wparam };
            current = current.min(total);
        }
        MessageKind::SetPos => {
            if wparam != 0 {
                current = wparam;
            }
            if lparam != 0 {
                if total == 0 || lparam > total {
                    total = lparam;
                }
                // A trailing SetPos with lParam == total marks completion.
                if lparam == total {
                    current = total;
                }
            }
        }
        MessageKind::StepIt => current += 1,
        _ => {}
    }

    ProgressState { current, total }
}

/// Per-operation progress state machine
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    state: ProgressState,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current running position
    pub fn state(&self) -> ProgressState {
        self.state
    }

    /// Fold one raw message into the running state and describe it
    pub fn decode(&mut self, event: &ProgressEvent) -> DecodedProgressEvent {
        self.state = transition(self.state, event);

        let kind = event.kind();
        let error_code = match kind {
            MessageKind::Error | MessageKind::Warning => event.wparam as u32,
            _ => 0,
        };

        let mut decoded = DecodedProgressEvent {
            message_id: event.message_id,
            name: kind.name(),
            wparam: event.wparam,
            lparam: event.lparam,
            current: self.state.current,
            total: self.state.total,
            percent: self.state.percent(),
            error_code,
            summary: String::new(),
            noisy: kind.is_noisy(),
        };
        decoded.summary = summarize(&decoded);
        decoded
    }
}

fn summarize(event: &DecodedProgressEvent) -> String {
    let kind = event.kind();
    match kind {
        k if k.is_progress() => {
            if event.total > 0 {
                format!(
                    "{}: {}/{} ({:.1}%)",
                    event.name, event.current, event.total, event.percent
                )
            } else {
                format!("{}: current={}", event.name, event.current)
            }
        }
        MessageKind::Error | MessageKind::Warning => {
            format!("{}: code={}", event.name, event.error_code)
        }
        MessageKind::Done => "DONE".to_string(),
        _ => format!(
            "{}: wParam={} lParam={}",
            event.name, event.wparam, event.lparam
        ),
    }
}

/// Caller-supplied handler for raw messages; returning `true` aborts the operation
pub type ProgressHandler = Box<dyn FnMut(&ProgressEvent) -> bool + Send + 'static>;

/// Wrap a handler of decoded events with a fresh decoder for one operation
pub fn decoded_handler<F>(mut handler: F) -> ProgressHandler
where
    F: FnMut(&DecodedProgressEvent) -> bool + Send + 'static,
{
    let mut decoder = ProgressDecoder::new();
    Box::new(move |event: &ProgressEvent| handler(&decoder.decode(event)))
}

/// A decoded-event handler that writes progress to the log and never aborts.
///
/// Noisy per-item messages go to trace level unless `show_noisy` is set.
pub fn log_progress(
    label: impl Into<String>,
    show_noisy: bool,
) -> impl FnMut(&DecodedProgressEvent) -> bool + Send + 'static {
    let label = label.into();
    move |event: &DecodedProgressEvent| {
        match event.kind() {
            MessageKind::Error | MessageKind::Warning => {
                warn!("[{}] {}", label, event.summary)
            }
            MessageKind::Done => info!("[{}] {}", label, event.summary),
            k if k.is_progress() => info!("[{}] {}", label, event.summary),
            _ if event.noisy && !show_noisy => trace!("[{}] {}", label, event.summary),
            _ => info!("[{}] {}", label, event.summary),
        }
        false
    }
}
