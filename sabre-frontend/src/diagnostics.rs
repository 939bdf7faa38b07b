use crate::span::SpanLoc;
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DiagnosticKind {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Info => write!(f, "info"),
            DiagnosticKind::Warning => write!(f, "warning"),
            DiagnosticKind::Error => write!(f, "error"),
        }
    }
}

/// A message anchored at a source range, ready to be shown to the user.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub locus: SpanLoc,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, locus: SpanLoc, message: String) -> Diagnostic {
        Diagnostic {
            kind,
            locus,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.locus, self.kind, self.message)
    }
}
