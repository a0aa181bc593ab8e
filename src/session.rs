//! Ephemeral execution sessions.
//!
//! A session owns a private directory under the temp root, named after a
//! freshly minted UUID. Source, class files and binaries all live inside it,
//! so concurrent requests never share a path. Dropping the session removes
//! the directory; cleanup errors are logged, never returned.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::language::Language;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FileWritten,
    Compiling,
    Running,
    TimedOut,
    Completed,
    Errored,
    CleanedUp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FileWritten => "file_written",
            Self::Compiling => "compiling",
            Self::Running => "running",
            Self::TimedOut => "timed_out",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::CleanedUp => "cleaned_up",
        };
        f.write_str(name)
    }
}

/// Per-request scratch space and artifact paths.
#[derive(Debug)]
pub struct ExecutionSession {
    id: String,
    language: Language,
    dir: PathBuf,
    source_path: PathBuf,
    binary_path: Option<PathBuf>,
    entry_class: Option<String>,
    phase: Phase,
    /// Set once the directory exists on disk.
    materialized: bool,
}

impl ExecutionSession {
    /// Mint a session id and compute its paths. Touches no files.
    pub fn new(root: &Path, language: Language) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let dir = root.join(format!("run_{id}"));

        let entry_class = language.needs_entry_class().then(|| format!("Solution_{id}"));
        let file_stem = entry_class
            .clone()
            .unwrap_or_else(|| format!("code_{id}"));
        let source_path = dir.join(format!("{file_stem}.{}", language.extension()));
        let binary_path = language
            .produces_binary()
            .then(|| dir.join(format!("code_{id}")));

        Self {
            id,
            language,
            dir,
            source_path,
            binary_path,
            entry_class,
            phase: Phase::Idle,
            materialized: false,
        }
    }

    /// Create the session directory and write the source file.
    pub async fn write_source(&mut self, source: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.dir.parent().unwrap_or(&self.dir)).await?;
        tokio::fs::create_dir(&self.dir).await?;
        self.materialized = true;
        tokio::fs::write(&self.source_path, source).await?;
        self.advance(Phase::FileWritten);
        Ok(())
    }

    /// Record a lifecycle transition.
    pub fn advance(&mut self, next: Phase) {
        debug!(session = %self.id, language = %self.language, from = %self.phase, to = %next, "Session phase");
        self.phase = next;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn language(&self) -> Language {
        self.language
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Compiled binary location (C and C++ only).
    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    /// Session-unique public class name (Java only).
    pub fn entry_class(&self) -> Option<&str> {
        self.entry_class.as_deref()
    }

    // Runs from Drop, so it stays synchronous; a session dir holds only a
    // source file and its build outputs.
    fn cleanup(&mut self) {
        if self.materialized {
            match std::fs::remove_dir_all(&self.dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(session = %self.id, path = %self.dir.display(), error = %e, "Cleanup warning");
                }
            }
            self.materialized = false;
        }
        self.advance(Phase::CleanedUp);
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn test_new_touches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let session = ExecutionSession::new(root.path(), Language::Python);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.dir().exists());
        drop(session);
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn test_paths_are_namespaced_by_id() {
        let root = tempfile::tempdir().unwrap();
        let session = ExecutionSession::new(root.path(), Language::Cpp);
        let id = session.id().to_string();

        assert!(session.dir().ends_with(format!("run_{id}")));
        assert_eq!(
            session.source_path().file_name().unwrap().to_string_lossy(),
            format!("code_{id}.cpp")
        );
        assert!(session.binary_path().unwrap().starts_with(session.dir()));
        assert!(session.entry_class().is_none());
    }

    #[test]
    fn test_java_session_uses_entry_class_file_name() {
        let root = tempfile::tempdir().unwrap();
        let session = ExecutionSession::new(root.path(), Language::Java);
        let class = session.entry_class().unwrap().to_string();

        assert!(class.starts_with("Solution_"));
        assert!(class.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(
            session.source_path().file_name().unwrap().to_string_lossy(),
            format!("{class}.java")
        );
        assert!(session.binary_path().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = ExecutionSession::new(root.path(), Language::C);
        let b = ExecutionSession::new(root.path(), Language::C);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.dir(), b.dir());
    }

    #[tokio::test]
    async fn test_drop_removes_all_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let mut session = ExecutionSession::new(root.path(), Language::C);
        session.write_source("int main(void) { return 0; }").await.unwrap();
        assert_eq!(session.phase(), Phase::FileWritten);
        assert!(session.source_path().exists());

        // Simulate compiler output next to the source
        std::fs::write(session.binary_path().unwrap(), b"\x7fELF").unwrap();

        drop(session);
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_external_removal() {
        let root = tempfile::tempdir().unwrap();
        let mut session = ExecutionSession::new(root.path(), Language::Python);
        session.write_source("print(1)").await.unwrap();
        std::fs::remove_dir_all(session.dir()).unwrap();
        drop(session);
    }

    #[tokio::test]
    async fn test_write_source_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let mut session = ExecutionSession::new(&nested, Language::JavaScript);
        session.write_source("console.log(1)").await.unwrap();
        assert_eq!(std::fs::read_to_string(session.source_path()).unwrap(), "console.log(1)");
    }
}
