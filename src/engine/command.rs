//! External-process engine: delegate conversion to any executable that
//! speaks a small JSON protocol.
//!
//! The executable is invoked once per document as
//!
//! ```text
//! <program> [args…] --max-pages 10 --langs zh,en --batch-multiplier 1 --start-page 0 <document>
//! ```
//!
//! and must print a single JSON object on stdout:
//!
//! ```json
//! { "text": "# Title\n…", "images": { "fig_0": "<base64 png>" }, "metadata": { … } }
//! ```
//!
//! A non-zero exit status is an engine failure; anything on stdout that is
//! not that object is malformed output. This is how converters written in
//! other ecosystems plug into the batch pipeline without linking them.

use super::{ConversionEngine, EngineOutput};
use crate::config::EngineSettings;
use crate::error::{BatchError, EngineError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT_CHARS: usize = 400;

/// Runs an external converter executable per document.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandEngine {
    /// Create an engine for `program`, checking that it can be located.
    ///
    /// Bare names (`marker-json`) are looked up on `PATH`; anything with a
    /// path separator must exist as given.
    pub fn new(program: impl Into<PathBuf>) -> Result<Self, BatchError> {
        let program = program.into();
        if !program_exists(&program) {
            return Err(BatchError::EngineUnavailable {
                engine: "command".into(),
                hint: format!(
                    "Converter executable '{}' was not found.\n\
                     Pass an absolute path or make sure it is on PATH.",
                    program.display()
                ),
            });
        }
        Ok(Self {
            program,
            args: Vec::new(),
        })
    }

    /// Extra arguments placed before the generated ones.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one document.
    fn command_args(&self, path: &Path, settings: &EngineSettings) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push("--max-pages".into());
        args.push(settings.max_pages.to_string().into());
        args.push("--langs".into());
        args.push(settings.langs.join(",").into());
        args.push("--batch-multiplier".into());
        args.push(settings.batch_multiplier.to_string().into());
        args.push("--start-page".into());
        args.push(settings.start_page.to_string().into());
        args.push(path.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl ConversionEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn convert(
        &self,
        path: &Path,
        settings: &EngineSettings,
    ) -> Result<EngineOutput, EngineError> {
        let args = self.command_args(path, settings);
        debug!("Running {} for {}", self.program.display(), path.display());

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                EngineError::Invocation(format!(
                    "could not run '{}': {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Invocation(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                output.status,
                excerpt(stderr.trim())
            )));
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::MalformedOutput(format!("stdout is not JSON: {e}")))?;

        EngineOutput::from_json(value)
    }
}

fn excerpt(s: &str) -> String {
    if s.chars().count() <= STDERR_EXCERPT_CHARS {
        return s.to_string();
    }
    let tail: String = s
        .chars()
        .rev()
        .take(STDERR_EXCERPT_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("\u{2026}{tail}")
}

fn program_exists(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(program);
                candidate.is_file() || candidate.with_extension("exe").is_file()
            })
        })
        .unwrap_or(false)
}
