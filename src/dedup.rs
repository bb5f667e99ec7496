use crate::error::RelayError;

/// Remembers the last error that was reported so a failure that repeats on
/// every poll is only notified once.
///
/// Errors are compared by their rendered message. The memory is not cleared
/// by successful cycles.
#[derive(Debug, Default)]
pub struct ErrorDeduplicator {
    last: Option<String>,
}

impl ErrorDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` and report whether it differs from the previous one.
    pub fn should_notify(&mut self, error: &RelayError) -> bool {
        let rendered = error.to_string();
        if self.last.as_deref() == Some(rendered.as_str()) {
            return false;
        }
        self.last = Some(rendered);
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
