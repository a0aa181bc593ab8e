//! Ephemeral code runner.
//!
//! One call to [`CodeRunner::run`] creates a session, writes the source,
//! runs the language's compile/run chain under a single deadline, classifies
//! the outcome and removes every artifact before returning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::backend::{ExecutionBackend, ExecutionLimits, ProcessOutput};
use crate::config::{Config, ToolchainConfig};
use crate::error::{BackendError, RunError};
use crate::language::{render_source, BuildPlan, Language};
use crate::session::{ExecutionSession, Phase};

/// Returned when a successful run printed nothing at all.
pub const NO_OUTPUT: &str = "Code executed successfully (no output)";

/// A validated execution request.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub stdin: String,
}

impl ExecutionRequest {
    /// Validate raw request fields.
    ///
    /// `code` and `language` must be present and non-empty; the language must
    /// be supported. `stdin` defaults to empty.
    pub fn new(
        code: Option<String>,
        language: Option<String>,
        stdin: Option<String>,
    ) -> Result<Self, RunError> {
        let (Some(code), Some(language)) = (
            code.filter(|c| !c.is_empty()),
            language.filter(|l| !l.trim().is_empty()),
        ) else {
            return Err(RunError::InvalidRequest(
                "Code and language are required".to_string(),
            ));
        };

        Ok(Self {
            code,
            language: language.parse()?,
            stdin: stdin.unwrap_or_default(),
        })
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub output: String,
    /// The output ceiling was hit and the program was stopped early.
    pub truncated: bool,
}

/// Runs untrusted submissions through an [`ExecutionBackend`].
pub struct CodeRunner<B> {
    backend: B,
    temp_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
    toolchains: ToolchainConfig,
    permits: Option<Semaphore>,
}

impl<B: ExecutionBackend> CodeRunner<B> {
    pub fn new(config: &Config, backend: B) -> Self {
        Self {
            backend,
            temp_dir: absolute_root(&config.temp_dir),
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
            toolchains: config.toolchains.clone(),
            permits: config
                .max_concurrent
                .filter(|&limit| limit > 0)
                .map(|limit| Semaphore::new(limit.min(Semaphore::MAX_PERMITS))),
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one request end to end.
    #[instrument(skip(self, request), fields(language = %request.language, code_len = request.code.len()))]
    pub async fn run(&self, request: &ExecutionRequest) -> Result<RunOutput, RunError> {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|_| RunError::Io(std::io::Error::other("runner is shutting down")))?,
            ),
            None => None,
        };

        let language = request.language;
        let mut session = ExecutionSession::new(&self.temp_dir, language);
        let source = render_source(language, &request.code, session.entry_class())?;
        session.write_source(&source).await?;

        let plan = language.plan(&session, &self.toolchains);
        let limits = ExecutionLimits {
            deadline: Instant::now() + self.timeout,
            max_output_bytes: self.max_output_bytes,
        };

        let result = self
            .run_plan(&mut session, &plan, request.stdin.as_bytes(), &limits)
            .await;

        match &result {
            Ok(out) => {
                session.advance(Phase::Completed);
                info!(
                    session = %session.id(),
                    output_len = out.output.len(),
                    truncated = out.truncated,
                    "Execution completed"
                );
            }
            Err(e) => {
                session.advance(if matches!(e, RunError::TimedOut(_)) {
                    Phase::TimedOut
                } else {
                    Phase::Errored
                });
                warn!(session = %session.id(), kind = e.kind(), error = %e, "Execution failed");
            }
        }

        result
    }

    async fn run_plan(
        &self,
        session: &mut ExecutionSession,
        plan: &BuildPlan,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<RunOutput, RunError> {
        let language = session.language();

        if let Some(compile) = &plan.compile {
            session.advance(Phase::Compiling);
            let out = self
                .backend
                .execute(compile, b"", limits)
                .await
                .map_err(|e| self.classify(language, e))?;
            if !out.success() {
                return Err(RunError::CompileFailed(failure_detail(&out)));
            }
        }

        session.advance(Phase::Running);
        let out = self
            .backend
            .execute(&plan.run, stdin, limits)
            .await
            .map_err(|e| self.classify(language, e))?;

        if out.truncated || out.success() {
            return Ok(RunOutput {
                output: success_output(&out),
                truncated: out.truncated,
            });
        }

        Err(RunError::RuntimeFailed(failure_detail(&out)))
    }

    fn classify(&self, language: Language, err: BackendError) -> RunError {
        match err {
            BackendError::ToolNotFound(tool) => RunError::ToolNotFound { language, tool },
            BackendError::TimedOut => RunError::TimedOut(self.timeout.as_secs()),
            BackendError::Io(e) => RunError::Io(e),
        }
    }
}

/// Session paths are handed to children running inside the session dir,
/// so the root must not be relative to the daemon's cwd.
fn absolute_root(root: &Path) -> PathBuf {
    match std::path::absolute(root) {
        Ok(path) => path,
        Err(e) => {
            warn!(path = %root.display(), error = %e, "Failed to resolve temp dir");
            root.to_path_buf()
        }
    }
}

/// Stdout, else stderr, else a placeholder; trailing whitespace trimmed.
fn success_output(out: &ProcessOutput) -> String {
    let stdout = out.stdout.trim_end();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    let stderr = out.stderr.trim_end();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    NO_OUTPUT.to_string()
}

fn failure_detail(out: &ProcessOutput) -> String {
    if out.stderr.trim().is_empty() {
        out.describe_exit()
    } else {
        out.stderr.clone()
    }
}
