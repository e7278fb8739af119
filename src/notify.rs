//! Transient notices shown to the student after each operation.

use crate::error::AccessError;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Warning,
    Info,
}

impl Level {
    pub fn default_title(&self) -> &'static str {
        match self {
            Level::Success => "Verification Passed",
            Level::Error => "Access Denied",
            Level::Warning => "Security Warning",
            Level::Info => "System Notification",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Level::Success => "OK",
            Level::Error => "ERROR",
            Level::Warning => "WARN",
            Level::Info => "INFO",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn show(&self, level: Level, title: &str, message: &str);

    fn success(&self, message: &str) {
        self.show(Level::Success, Level::Success.default_title(), message);
    }

    fn error(&self, message: &str) {
        self.show(Level::Error, Level::Error.default_title(), message);
    }

    fn warning(&self, message: &str) {
        self.show(Level::Warning, Level::Warning.default_title(), message);
    }

    fn info(&self, message: &str) {
        self.show(Level::Info, Level::Info.default_title(), message);
    }

    /// Report a failed operation. Validation problems are warnings.
    fn failure(&self, err: &AccessError) {
        match err {
            AccessError::Validation(msg) => self.warning(msg),
            other => self.error(&other.to_string()),
        }
    }
}

/// Prints notices to stderr
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show(&self, level: Level, title: &str, message: &str) {
        tracing::debug!(level = level.tag(), title, message, "notice");
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "[{}] {}: {}", level.tag(), title, message);
    }
}

/// Keeps notices in memory
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: std::sync::Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn take(&self) -> Vec<(Level, String)> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn show(&self, level: Level, _title: &str, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_levels() {
        let notifier = RecordingNotifier::default();
        notifier.failure(&AccessError::Validation("fill in".to_string()));
        notifier.failure(&AccessError::NotFound("no match".to_string()));
        assert_eq!(
            notifier.take(),
            vec![
                (Level::Warning, "fill in".to_string()),
                (Level::Error, "no match".to_string()),
            ]
        );
        assert!(notifier.take().is_empty());
    }

    #[test]
    fn test_default_titles() {
        assert_eq!(Level::Success.default_title(), "Verification Passed");
        assert_eq!(Level::Error.default_title(), "Access Denied");
    }
}
