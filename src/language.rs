//! Supported languages and their build/run command tables.
//!
//! Adding a language means adding a variant here and a row to
//! [`Language::plan`]; nothing else in the runner is language-specific.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::CommandSpec;
use crate::config::ToolchainConfig;
use crate::error::RunError;
use crate::session::ExecutionSession;

/// Token a Java submission uses in place of its public class name.
pub const JAVA_CLASS_PLACEHOLDER: &str = "__CLASS__";

/// Declaration accepted when a Java submission has no placeholder.
const LEGACY_JAVA_DECLARATION: &str = "public class Solution";

/// A language the runner can build and execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
    C,
}

/// Commands to execute for one session, in order.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Compile step, for compiled languages.
    pub compile: Option<CommandSpec>,
    /// The step that receives the request's stdin.
    pub run: CommandSpec,
}

impl Language {
    pub const ALL: [Self; 5] = [Self::Python, Self::JavaScript, Self::Java, Self::Cpp, Self::C];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
        }
    }

    /// Source file extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
        }
    }

    /// Whether a native binary is produced by the build step.
    pub const fn produces_binary(self) -> bool {
        matches!(self, Self::Cpp | Self::C)
    }

    /// Whether the source must be rewritten to a session-unique class name.
    pub const fn needs_entry_class(self) -> bool {
        matches!(self, Self::Java)
    }

    /// Build the command chain for a session.
    pub fn plan(self, session: &ExecutionSession, toolchains: &ToolchainConfig) -> BuildPlan {
        let dir = session.dir();
        let source = session.source_path().to_string_lossy().into_owned();

        match self {
            Self::Python => BuildPlan {
                compile: None,
                run: CommandSpec::new(&toolchains.python, dir).arg(source),
            },
            Self::JavaScript => BuildPlan {
                compile: None,
                run: CommandSpec::new(&toolchains.node, dir).arg(source),
            },
            Self::Java => {
                let class_dir = dir.to_string_lossy().into_owned();
                let class_name = session.entry_class().unwrap_or_default();
                BuildPlan {
                    compile: Some(
                        CommandSpec::new(&toolchains.javac, dir)
                            .arg("-d")
                            .arg(class_dir.clone())
                            .arg(source),
                    ),
                    run: CommandSpec::new(&toolchains.java, dir)
                        .arg("-cp")
                        .arg(class_dir)
                        .arg(class_name),
                }
            }
            Self::Cpp | Self::C => {
                let compiler = if self == Self::Cpp {
                    &toolchains.cxx
                } else {
                    &toolchains.cc
                };
                let binary = session
                    .binary_path()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                BuildPlan {
                    compile: Some(
                        CommandSpec::new(compiler, dir)
                            .arg("-o")
                            .arg(binary.clone())
                            .arg(source),
                    ),
                    run: CommandSpec::new(binary, dir),
                }
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| RunError::UnsupportedLanguage(s.to_string()))
    }
}

/// Produce the exact source text to write for a session.
///
/// Java sources get their public class renamed to `entry_class`: every
/// [`JAVA_CLASS_PLACEHOLDER`] is substituted, or, when the placeholder is
/// absent, each `public class Solution` declaration. Other languages pass
/// through unchanged.
pub fn render_source<'a>(
    language: Language,
    code: &'a str,
    entry_class: Option<&str>,
) -> Result<Cow<'a, str>, RunError> {
    let Some(class_name) = entry_class.filter(|_| language.needs_entry_class()) else {
        return Ok(Cow::Borrowed(code));
    };

    if code.contains(JAVA_CLASS_PLACEHOLDER) {
        return Ok(Cow::Owned(code.replace(JAVA_CLASS_PLACEHOLDER, class_name)));
    }

    let replacement = format!("public class {class_name}");
    let rendered = replace_declaration(code, LEGACY_JAVA_DECLARATION, &replacement);
    if rendered == code {
        return Err(RunError::InvalidRequest(format!(
            "Java source must declare `public class {JAVA_CLASS_PLACEHOLDER}` or `{LEGACY_JAVA_DECLARATION}`"
        )));
    }
    Ok(Cow::Owned(rendered))
}

/// Replace `needle` only where it is not followed by another identifier character.
fn replace_declaration(haystack: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        let after = &rest[pos + needle.len()..];
        let boundary = after
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '$'));
        out.push_str(&rest[..pos]);
        out.push_str(if boundary { replacement } else { needle });
        rest = after;
    }
    out.push_str(rest);
    out
}
