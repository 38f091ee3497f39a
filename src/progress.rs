use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Bytes,
    Entries,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Free-form status line. Lines of the form `phase=<Name>; text` mark a phase change.
    Message(String),
    /// Cumulative units processed so far; `total` is `None` when unknown.
    Advance {
        unit: ProgressUnit,
        done: u64,
        total: Option<u64>,
    },
}

impl ProgressEvent {
    pub fn phase(phase: &str, message: impl AsRef<str>) -> Self {
        ProgressEvent::Message(format!("phase={phase}; {}", message.as_ref()))
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Yes/no question put to an operator before an oversized download starts.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every confirmation with the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Asks on stderr and reads one line from stdin; only `y`/`Y` confirms.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{prompt} (y/n): ").and_then(|_| stderr.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}
