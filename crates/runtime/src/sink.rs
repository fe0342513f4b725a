//! The error sink: xsl:message output and recoverable evaluation failures
//! both funnel through it.

use std::cell::RefCell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: None,
            severity,
            message: message.into(),
            location: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

pub trait ErrorSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Routes diagnostics to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let code = diagnostic.code.as_deref().unwrap_or("-");
        match diagnostic.severity {
            Severity::Info => log::info!("[{}] {}", code, diagnostic.message),
            Severity::Warning => log::warn!("[{}] {}", code, diagnostic.message),
            Severity::Error | Severity::Fatal => {
                log::error!("[{}] {}", code, diagnostic.message)
            }
        }
    }
}

/// Collects diagnostics for inspection; used by tests and embedding hosts.
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.collected.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.borrow().is_empty()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.collected.borrow_mut().push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_accumulates() {
        let sink = CollectingSink::new();
        sink.report(&Diagnostic::new(Severity::Warning, "first"));
        sink.report(&Diagnostic::new(Severity::Error, "second").with_code("XTDE0640"));
        let collected = sink.diagnostics();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].code.as_deref(), Some("XTDE0640"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Fatal);
    }
}
