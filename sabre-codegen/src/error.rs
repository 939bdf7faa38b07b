use sabre_frontend::diagnostics::{Diagnostic, DiagnosticKind};
use sabre_frontend::span::SpanLoc;
use thiserror::Error;

/// Failures the user can act upon. Anything else the code generator cannot
/// handle is a bug upstream and panics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("expression nesting exceeds the limit of {limit}")]
    ExpressionTooDeep { loc: SpanLoc, limit: usize },
    #[error("stack too deep, try removing local variables")]
    StackTooDeep { loc: SpanLoc },
    #[error("generated code of {size} items exceeds the limit of {limit}")]
    CodeTooLarge {
        loc: SpanLoc,
        size: usize,
        limit: usize,
    },
}

impl CodegenError {
    pub fn loc(&self) -> SpanLoc {
        match self {
            CodegenError::ExpressionTooDeep { loc, .. }
            | CodegenError::StackTooDeep { loc }
            | CodegenError::CodeTooLarge { loc, .. } => *loc,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Error, self.loc(), self.to_string())
    }
}

impl From<CodegenError> for Diagnostic {
    fn from(e: CodegenError) -> Diagnostic {
        e.to_diagnostic()
    }
}

pub type Result<T> = std::result::Result<T, CodegenError>;
