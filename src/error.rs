//! Error types for code execution.

use thiserror::Error;

use crate::language::Language;

/// Failure of a single run request.
///
/// Every variant is reported to the caller as a plain message; [`RunError::kind`]
/// gives a stable classification for logs.
#[derive(Debug, Error)]
pub enum RunError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The compiler or interpreter could not be spawned.
    #[error("{tool} not found for language {language}")]
    ToolNotFound { language: Language, tool: String },

    #[error("Code execution timed out ({0}s limit)")]
    TimedOut(u64),

    /// Compiler exited non-zero; carries its diagnostics.
    #[error("{0}")]
    CompileFailed(String),

    /// Program exited non-zero; carries stderr or an exit description.
    #[error("{0}")]
    RuntimeFailed(String),

    #[error("Execution setup failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedLanguage(_) => "unsupported_language",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::TimedOut(_) => "timed_out",
            Self::CompileFailed(_) => "compile_failed",
            Self::RuntimeFailed(_) => "runtime_failed",
            Self::Io(_) => "io",
        }
    }
}

/// Failure reported by an [`ExecutionBackend`](crate::backend::ExecutionBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The program to spawn does not exist.
    #[error("program not found: {0}")]
    ToolNotFound(String),

    /// The deadline passed; the process group has been killed.
    #[error("deadline exceeded")]
    TimedOut,

    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = RunError::ToolNotFound {
            language: Language::Cpp,
            tool: "g++".into(),
        };
        assert_eq!(err.to_string(), "g++ not found for language cpp");
        assert_eq!(RunError::TimedOut(10).to_string(), "Code execution timed out (10s limit)");
        assert_eq!(RunError::RuntimeFailed("boom".into()).to_string(), "boom");
    }

    #[test]
    fn kinds_are_distinct_for_timeout_and_crash() {
        assert_ne!(
            RunError::TimedOut(1).kind(),
            RunError::RuntimeFailed(String::new()).kind()
        );
    }
}
