//! Build pipeline: the only place the external compiler is run.
//!
//! A build turns a page's source, properties, and resources into one of two
//! files in the workspace output directory:
//!
//! ```text
//! nifki-out/<page>.jar   playable artifact (build succeeded)
//! nifki-out/<page>.err   UTF-8 diagnostics (build failed)
//! ```
//!
//! After [`BuildPipeline::trigger`] returns, exactly one of the two exists.
//! The compiler is a black box behind the [`Compiler`] trait, so whatever it
//! actually leaves behind is reconciled afterwards:
//!
//! | Compiler outcome | Artifact | Diagnostics |
//! |---|---|---|
//! | success, artifact written | kept | removed |
//! | success, no artifact | removed | generic message |
//! | failure, diagnostics written | removed | kept |
//! | failure, no diagnostics (crash) | removed | generic message |
//! | timed out | removed | timeout message |
//!
//! A failed rebuild therefore invalidates the previous artifact: a page
//! never plays a build that no longer matches its saved source.
//!
//! Stale diagnostics are removed before the compiler starts, so a crash can't
//! resurface the previous run's errors. The artifact stays in place until the
//! new verdict is known.

use crate::pages::PageStore;
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{self, Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running compiler is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest stretch of compiler stderr carried into a crash diagnostic.
const MAX_STDERR_CHARS: usize = 4000;

/// Environment variable carrying the absolute output directory to the
/// compiler subprocess.
pub const OUTPUT_DIR_ENV: &str = "NIFKI_OUTPUT_DIR";

pub const ARTIFACT_EXTENSION: &str = "jar";
pub const DIAGNOSTICS_EXTENSION: &str = "err";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("No such page: '{0}'")]
    PageNotFound(String),
    #[error("Page '{0}' has no build artifact")]
    NoArtifact(String),
}

/// What the compiler is asked to build.
#[derive(Debug, Clone, Copy)]
pub struct CompileJob<'a> {
    /// Workspace root; pages live directly beneath it.
    pub workspace: &'a Path,
    pub page: &'a str,
    /// Where the compiler is expected to leave `<page>.jar` or `<page>.err`.
    pub output_dir: &'a Path,
}

/// The process-level verdict of one compiler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Succeeded,
    /// Non-zero exit or failure to start. `detail` is whatever the process
    /// said on stderr (or why it couldn't be started); may be empty.
    Failed { detail: String },
    TimedOut { after: Duration },
}

/// The external compiler.
///
/// Implementations must not fail: anything that goes wrong is reported as a
/// [`CompileOutcome`], and the pipeline turns it into a build status.
pub trait Compiler: Send + Sync {
    fn compile(&self, job: &CompileJob<'_>) -> CompileOutcome;
}

/// Runs the compiler as a subprocess.
///
/// The configured argv gets the workspace path and the page name appended,
/// and the process runs with the workspace root as its working directory:
///
/// ```text
/// java -jar compiler.jar /srv/nifki/wiki MyGame
/// ```
///
/// The output directory is passed in [`OUTPUT_DIR_ENV`], since it is
/// configurable per workspace.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandCompiler {
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }

    /// Build from `[compiler]` config; `timeout_secs = 0` means no limit.
    pub fn from_config(config: &crate::config::CompilerConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(config.command.clone(), timeout)
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, job: &CompileJob<'_>) -> CompileOutcome {
        let Some((program, args)) = self.command.split_first() else {
            return CompileOutcome::Failed {
                detail: "no compiler command configured".into(),
            };
        };

        // The child runs inside the workspace, so relative paths would
        // resolve against the wrong directory.
        let (workspace, output_dir) =
            match (path::absolute(job.workspace), path::absolute(job.output_dir)) {
                (Ok(w), Ok(o)) => (w, o),
                (Err(e), _) | (_, Err(e)) => {
                    return CompileOutcome::Failed {
                        detail: format!("could not resolve workspace paths: {e}"),
                    };
                }
            };

        let spawned = Command::new(program)
            .args(args)
            .arg(&workspace)
            .arg(job.page)
            .current_dir(&workspace)
            .env(OUTPUT_DIR_ENV, &output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return CompileOutcome::Failed {
                    detail: format!("could not start `{program}`: {e}"),
                };
            }
        };

        // Drain stderr on a separate thread so a chatty compiler can't fill
        // the pipe and stall.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => break Err(format!("lost track of compiler process: {e}")),
            }
            if let Some(limit) = self.timeout
                && started.elapsed() >= limit
            {
                // The stderr reader is left detached: a grandchild may still
                // hold the pipe open.
                let _ = child.kill();
                let _ = child.wait();
                return CompileOutcome::TimedOut { after: limit };
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr_text = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match status {
            Ok(status) if status.success() => CompileOutcome::Succeeded,
            Ok(status) => CompileOutcome::Failed {
                detail: tail(&format!("{status}\n{stderr_text}"), MAX_STDERR_CHARS),
            },
            Err(detail) => CompileOutcome::Failed { detail },
        }
    }
}

/// Last `max` characters of `text`, trimmed.
fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}

/// Derived build state of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildStatus {
    NotBuilt,
    Built { artifact: PathBuf },
    Failed { diagnostics: String },
}

impl BuildStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BuildStatus::NotBuilt => "not built",
            BuildStatus::Built { .. } => "built",
            BuildStatus::Failed { .. } => "failed",
        }
    }
}

/// Runs builds and answers questions about their results.
pub struct BuildPipeline {
    pages: PageStore,
    compiler: Box<dyn Compiler>,
}

impl BuildPipeline {
    pub fn new(pages: PageStore, compiler: impl Compiler + 'static) -> Self {
        Self {
            pages,
            compiler: Box::new(compiler),
        }
    }

    pub fn artifact_path(&self, page: &str) -> PathBuf {
        self.output_file(page, ARTIFACT_EXTENSION)
    }

    pub fn diagnostics_path(&self, page: &str) -> PathBuf {
        self.output_file(page, DIAGNOSTICS_EXTENSION)
    }

    /// Compile `page` and record the result. Blocks for as long as the
    /// compiler runs (bounded by its timeout, if any).
    pub fn trigger(&self, page: &str) -> Result<BuildStatus, BuildError> {
        if !self.pages.exists(page) {
            return Err(BuildError::PageNotFound(page.to_string()));
        }
        let output_dir = self.pages.output_dir();
        fs::create_dir_all(&output_dir)?;
        let artifact = self.artifact_path(page);
        let diagnostics = self.diagnostics_path(page);
        remove_if_present(&diagnostics)?;

        info!("building {page}");
        let started = Instant::now();
        let outcome = self.compiler.compile(&CompileJob {
            workspace: self.pages.root(),
            page,
            output_dir: &output_dir,
        });
        debug!("compiler for {page} finished in {:?}: {outcome:?}", started.elapsed());

        let status = match outcome {
            CompileOutcome::Succeeded if artifact.is_file() => {
                remove_if_present(&diagnostics)?;
                BuildStatus::Built { artifact }
            }
            CompileOutcome::Succeeded => {
                let message = "The compiler reported success but produced no game file.";
                self.record_failure(&artifact, &diagnostics, Some(message.to_string()))?
            }
            CompileOutcome::Failed { detail } => {
                let generic = if detail.is_empty() {
                    "The compiler stopped without producing any diagnostics.".to_string()
                } else {
                    format!("The compiler stopped without producing any diagnostics.\n\n{detail}")
                };
                let fallback = if diagnostics.is_file() {
                    None
                } else {
                    Some(generic)
                };
                self.record_failure(&artifact, &diagnostics, fallback)?
            }
            CompileOutcome::TimedOut { after } => {
                let message = format!(
                    "The build took longer than {} seconds and was stopped.",
                    after.as_secs_f32()
                );
                self.record_failure(&artifact, &diagnostics, Some(message))?
            }
        };

        match &status {
            BuildStatus::Built { .. } => info!("built {page}"),
            _ => warn!("build of {page} failed"),
        }
        Ok(status)
    }

    /// Current build state, read-only.
    pub fn status(&self, page: &str) -> Result<BuildStatus, BuildError> {
        let artifact = self.artifact_path(page);
        if artifact.is_file() {
            return Ok(BuildStatus::Built { artifact });
        }
        match fs::read(self.diagnostics_path(page)) {
            Ok(bytes) => Ok(BuildStatus::Failed {
                diagnostics: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BuildStatus::NotBuilt),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes of the playable artifact.
    pub fn artifact(&self, page: &str) -> Result<Vec<u8>, BuildError> {
        match fs::read(self.artifact_path(page)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BuildError::NoArtifact(page.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// SHA-256 of the artifact as hex. Changes exactly when the artifact
    /// does, which makes it a cache-busting token for artifact URLs.
    pub fn artifact_fingerprint(&self, page: &str) -> Result<String, BuildError> {
        let bytes = self.artifact(page)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Remove both build outputs of a page.
    pub fn discard(&self, page: &str) -> Result<(), BuildError> {
        remove_if_present(&self.artifact_path(page))?;
        remove_if_present(&self.diagnostics_path(page))?;
        Ok(())
    }

    fn output_file(&self, page: &str, extension: &str) -> PathBuf {
        self.pages.output_dir().join(format!("{page}.{extension}"))
    }

    fn record_failure(
        &self,
        artifact: &Path,
        diagnostics: &Path,
        fallback: Option<String>,
    ) -> Result<BuildStatus, BuildError> {
        remove_if_present(artifact)?;
        if let Some(message) = fallback {
            fs::write(diagnostics, message)?;
        }
        let bytes = fs::read(diagnostics)?;
        Ok(BuildStatus::Failed {
            diagnostics: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
