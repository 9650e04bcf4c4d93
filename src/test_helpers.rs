//! Shared test utilities for the nifki test suite.
//!
//! Provides throwaway workspaces, minimal image payloads that pass magic
//! sniffing, directory snapshots for "nothing changed" assertions, and a
//! scripted [`MockCompiler`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (tmp, pages) = temp_store();
//! pages.create("MyGame").unwrap();
//! let before = snapshot_dir(tmp.path());
//! // ... exercise a failing operation ...
//! assert_eq!(snapshot_dir(tmp.path()), before);
//! ```

use crate::pages::PageStore;
use crate::pipeline::{CompileJob, CompileOutcome, Compiler};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// A page store over a fresh temp directory, using the stock output dir.
pub fn temp_store() -> (TempDir, PageStore) {
    let tmp = TempDir::new().unwrap();
    let store = PageStore::new(tmp.path(), "nifki-out");
    (tmp, store)
}

/// `len` bytes that sniff as PNG.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(len.max(4), 0);
    bytes
}

/// `len` bytes that sniff as JPEG.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0);
    bytes
}

/// Every file under `dir` keyed by relative path, with its contents.
pub fn snapshot_dir(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

// =========================================================================
// Mock compiler
// =========================================================================

/// Scripted behaviour for one [`MockCompiler`] run.
#[derive(Debug, Clone)]
pub enum MockBuild {
    /// Write `<page>.jar` and exit successfully.
    Succeed,
    /// Exit successfully without writing anything.
    SucceedEmpty,
    /// Write `<page>.err` with the given text and exit with failure.
    Fail(String),
    /// Exit with failure without writing anything.
    Crash,
    /// Behave as if the timeout fired.
    Timeout,
}

/// Compiler that writes outputs according to a script and records every job.
///
/// Clones share state, so a test can keep one handle while the pipeline owns
/// another. Runs past the end of the script succeed.
#[derive(Clone, Default)]
pub struct MockCompiler {
    script: Arc<Mutex<VecDeque<MockBuild>>>,
    jobs: Arc<Mutex<Vec<String>>>,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(builds: Vec<MockBuild>) -> Self {
        Self {
            script: Arc::new(Mutex::new(builds.into())),
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Page names compiled so far, in order.
    pub fn jobs(&self) -> Vec<String> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Compiler for MockCompiler {
    fn compile(&self, job: &CompileJob<'_>) -> CompileOutcome {
        self.jobs.lock().unwrap().push(job.page.to_string());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockBuild::Succeed);

        let jar = job.output_dir.join(format!("{}.jar", job.page));
        let err = job.output_dir.join(format!("{}.err", job.page));
        match next {
            MockBuild::Succeed => {
                std::fs::write(jar, format!("jar for {}", job.page)).unwrap();
                CompileOutcome::Succeeded
            }
            MockBuild::SucceedEmpty => CompileOutcome::Succeeded,
            MockBuild::Fail(text) => {
                std::fs::write(err, text).unwrap();
                CompileOutcome::Failed {
                    detail: String::new(),
                }
            }
            MockBuild::Crash => CompileOutcome::Failed {
                detail: String::new(),
            },
            MockBuild::Timeout => CompileOutcome::TimedOut {
                after: Duration::from_secs(60),
            },
        }
    }
}
