//! Daemon configuration.
//!
//! Defaults can be overridden by a JSON file (`--config`), by inline JSON in the
//! `RUN_CODE_CONFIG` environment variable, and finally by individual env vars.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::language::Language;

/// Top-level configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Root directory under which per-request session directories are created.
    #[serde(default = "std::env::temp_dir")]
    pub temp_dir: PathBuf,

    /// Wall-clock limit for the whole compile + run pipeline.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Per-stream ceiling on captured output.
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,

    /// Optional cap on simultaneous executions. Unbounded when absent.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Program names for each toolchain.
    #[serde(default)]
    pub toolchains: ToolchainConfig,
}

/// Host programs used to build and run submissions.
///
/// Plain names are resolved through `PATH`; absolute paths are used as-is.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub python: String,
    pub node: String,
    pub javac: String,
    pub java: String,
    pub cxx: String,
    pub cc: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            node: "node".into(),
            javac: "javac".into(),
            java: "java".into(),
            cxx: "g++".into(),
            cc: "gcc".into(),
        }
    }
}

impl ToolchainConfig {
    /// Programs a language needs, in the order they are invoked.
    pub fn programs_for(&self, language: Language) -> Vec<&str> {
        match language {
            Language::Python => vec![self.python.as_str()],
            Language::JavaScript => vec![self.node.as_str()],
            Language::Java => vec![self.javac.as_str(), self.java.as_str()],
            Language::Cpp => vec![self.cxx.as_str()],
            Language::C => vec![self.cc.as_str()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            temp_dir: std::env::temp_dir(),
            timeout_seconds: default_timeout(),
            max_output_bytes: default_max_output(),
            max_concurrent: None,
            toolchains: ToolchainConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional JSON file, then `RUN_CODE_CONFIG`,
    /// then apply individual environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse inline JSON from `RUN_CODE_CONFIG`, or fall back to defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var("RUN_CODE_CONFIG") {
            Ok(json) => Self::from_json(&json).context("Failed to parse RUN_CODE_CONFIG"),
            Err(_) => {
                debug!("RUN_CODE_CONFIG not set, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Create a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    /// Apply single-value overrides looked up by name.
    ///
    /// Recognises `PORT`, `RUN_CODE_TEMP_DIR`, `RUN_CODE_TIMEOUT`,
    /// `RUN_CODE_MAX_OUTPUT` and `RUN_CODE_MAX_CONCURRENT`. Unparseable values
    /// are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var::<u16, _>(&lookup, "PORT") {
            self.bind_addr.set_port(port);
        }
        if let Some(dir) = lookup("RUN_CODE_TEMP_DIR") {
            self.temp_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var(&lookup, "RUN_CODE_TIMEOUT") {
            self.timeout_seconds = secs;
        }
        if let Some(bytes) = parse_var(&lookup, "RUN_CODE_MAX_OUTPUT") {
            self.max_output_bytes = bytes;
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, "RUN_CODE_MAX_CONCURRENT") {
            self.max_concurrent = (limit > 0).then_some(limit);
        }
    }

    /// The execution deadline as a `Duration`.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Configured programs that cannot be found on this host.
    ///
    /// Returned as `(language, program)` pairs; used for startup diagnostics only.
    pub fn missing_toolchains(&self) -> Vec<(Language, String)> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        let mut missing = Vec::new();
        for language in Language::ALL {
            for program in self.toolchains.programs_for(language) {
                if !program_exists(program, &path_var) {
                    missing.push((language, program.to_string()));
                }
            }
        }
        missing
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn program_exists(program: &str, path_var: &std::ffi::OsStr) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    std::env::split_paths(path_var).any(|dir| dir.join(program).is_file())
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3001))
}

const fn default_timeout() -> u64 {
    10
}

const fn default_max_output() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert!(config.max_concurrent.is_none());
        assert_eq!(config.toolchains.python, "python3");
    }

    #[test]
    fn parse_partial_json() {
        let json = r#"{
            "timeout_seconds": 5,
            "toolchains": { "node": "/usr/local/bin/bun" }
        }"#;

        let config = Config::from_json(json).unwrap();
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert_eq!(config.toolchains.node, "/usr/local/bin/bun");
        // Unspecified toolchains keep their defaults
        assert_eq!(config.toolchains.cxx, "g++");
    }

    #[test]
    fn parse_empty_json_is_default() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.bind_addr, Config::default().bind_addr);
        assert_eq!(config.toolchains, ToolchainConfig::default());
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(Config::from_json("{ timeout_seconds: }").is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runcode.json");
        std::fs::write(&path, r#"{"bind_addr": "0.0.0.0:8080", "max_concurrent": 4}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_concurrent, Some(4));
    }

    #[test]
    fn from_file_missing() {
        assert!(Config::from_file(Path::new("/nonexistent/runcode.json")).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars = HashMap::from([
            ("PORT", "4000"),
            ("RUN_CODE_TIMEOUT", "3"),
            ("RUN_CODE_MAX_OUTPUT", "2048"),
            ("RUN_CODE_MAX_CONCURRENT", "8"),
            ("RUN_CODE_TEMP_DIR", "/var/tmp/runcode"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.timeout_seconds, 3);
        assert_eq!(config.max_output_bytes, 2048);
        assert_eq!(config.max_concurrent, Some(8));
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/runcode"));
    }

    #[test]
    fn env_overrides_ignore_garbage() {
        let vars = HashMap::from([("PORT", "not-a-port"), ("RUN_CODE_TIMEOUT", "-1")]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.timeout_seconds, 10);
    }

    #[test]
    fn zero_max_concurrent_means_unbounded() {
        let mut config = Config::default();
        config.max_concurrent = Some(2);
        config.apply_overrides(|key| (key == "RUN_CODE_MAX_CONCURRENT").then(|| "0".to_string()));
        assert!(config.max_concurrent.is_none());
    }

    #[test]
    fn missing_toolchains_reports_unknown_programs() {
        let mut config = Config::default();
        config.toolchains.python = "/nonexistent/python-for-tests".into();

        let missing = config.missing_toolchains();
        assert!(missing
            .iter()
            .any(|(lang, prog)| *lang == Language::Python && prog == "/nonexistent/python-for-tests"));
    }

    #[test]
    fn programs_for_java_needs_compiler_and_runtime() {
        let toolchains = ToolchainConfig::default();
        assert_eq!(toolchains.programs_for(Language::Java), vec!["javac", "java"]);
        assert_eq!(toolchains.programs_for(Language::C), vec!["gcc"]);
    }
}
