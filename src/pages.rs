//! Persisted page state.
//!
//! Every page lives in its own directory under an explicit workspace root:
//!
//! ```text
//! <root>/
//! ├── nifki.toml                 # Workspace config (optional)
//! ├── MyGame/
//! │   ├── source.sss             # UTF-8 script source
//! │   ├── properties.txt         # key: value lines
//! │   └── res/                   # Uploaded images
//! │       ├── cat
//! │       └── cat1
//! └── nifki-out/                 # Build outputs (see `pipeline`)
//!     ├── MyGame.jar
//!     └── OtherGame.err
//! ```
//!
//! A page exists exactly when its directory exists. Page names are validated
//! on every entry point, which also keeps names from escaping the root.
//!
//! New and copied pages are assembled in a dot-prefixed staging directory and
//! renamed into place, so a half-written page is never visible under its
//! real name. Property and source writes go through a temp file and rename
//! for the same reason.

use crate::naming::is_valid_page_name;
use crate::properties::{self, Properties, PropertyError};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const SOURCE_FILENAME: &str = "source.sss";
pub const PROPERTIES_FILENAME: &str = "properties.txt";
pub const RESOURCES_DIRNAME: &str = "res";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("'{0}' is not allowed as a page name")]
    InvalidName(String),
    #[error("A page called '{0}' already exists")]
    AlreadyExists(String),
    #[error("No such page: '{0}'")]
    NotFound(String),
    #[error("Invalid properties: {0}")]
    InvalidProperties(PropertyError),
    #[error("Malformed properties.txt in page '{page}': {source}")]
    Malformed {
        page: String,
        #[source]
        source: PropertyError,
    },
}

/// File-backed store for page source, properties, and resource directories.
#[derive(Debug, Clone)]
pub struct PageStore {
    root: PathBuf,
    output_dir: String,
}

impl PageStore {
    /// Open a store over `root`. `output_dir` is the build-output directory
    /// name, which is never reported as a page.
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the build-output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output_dir)
    }

    pub fn page_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn resources_dir(&self, name: &str) -> PathBuf {
        self.page_dir(name).join(RESOURCES_DIRNAME)
    }

    pub fn exists(&self, name: &str) -> bool {
        is_valid_page_name(name) && self.page_dir(name).is_dir()
    }

    /// All pages in the workspace, sorted by name.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n != &self.output_dir && is_valid_page_name(n))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Initialize a brand-new page: empty source, stock properties, no
    /// resources.
    pub fn create(&self, name: &str) -> Result<(), StoreError> {
        self.check_name(name)?;
        if self.page_dir(name).exists() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let staging = self.staging_dir(name);
        reset_dir(&staging)?;
        fs::create_dir_all(staging.join(RESOURCES_DIRNAME))?;
        fs::write(staging.join(SOURCE_FILENAME), "")?;
        fs::write(
            staging.join(PROPERTIES_FILENAME),
            properties::serialize(&Properties::default()),
        )?;
        self.publish(&staging, name)?;
        debug!("created page {name}");
        Ok(())
    }

    /// Duplicate the full state of `from` under the name `to`.
    ///
    /// `from` is only read. Fails with `AlreadyExists` if `to` has state and
    /// `NotFound` if `from` has none.
    pub fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check_name(from)?;
        self.check_name(to)?;
        if !self.exists(from) {
            return Err(StoreError::NotFound(from.to_string()));
        }
        if self.page_dir(to).exists() {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }

        let src = self.page_dir(from);
        let staging = self.staging_dir(to);
        reset_dir(&staging)?;
        for entry in WalkDir::new(&src).min_depth(1) {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(&src)
                .map_err(|e| io::Error::other(e.to_string()))?;
            let dst = staging.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dst)?;
            } else {
                fs::copy(entry.path(), &dst)?;
            }
        }
        self.publish(&staging, to)?;
        debug!("copied page {from} -> {to}");
        Ok(())
    }

    /// Delete a page and everything under its directory.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.check_name(name)?;
        if !self.exists(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        fs::remove_dir_all(self.page_dir(name))?;
        debug!("removed page {name}");
        Ok(())
    }

    /// The page's script source. A page without a source file reads as empty.
    pub fn read_source(&self, name: &str) -> Result<String, StoreError> {
        self.require(name)?;
        match fs::read_to_string(self.page_dir(name).join(SOURCE_FILENAME)) {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_source(&self, name: &str, source: &str) -> Result<(), StoreError> {
        self.require(name)?;
        write_atomic(&self.page_dir(name).join(SOURCE_FILENAME), source.as_bytes())?;
        Ok(())
    }

    /// The page's properties, with stock defaults for anything not stored.
    pub fn read_properties(&self, name: &str) -> Result<Properties, StoreError> {
        self.require(name)?;
        let text = match fs::read_to_string(self.page_dir(name).join(PROPERTIES_FILENAME)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        properties::parse(&text).map_err(|source| StoreError::Malformed {
            page: name.to_string(),
            source,
        })
    }

    /// Replace the page's properties.
    ///
    /// Numeric keys are checked before anything touches disk; a rejected set
    /// leaves the previous file exactly as it was.
    pub fn write_properties(&self, name: &str, props: &Properties) -> Result<(), StoreError> {
        self.require(name)?;
        props
            .validate_numeric()
            .map_err(StoreError::InvalidProperties)?;
        write_atomic(
            &self.page_dir(name).join(PROPERTIES_FILENAME),
            properties::serialize(props).as_bytes(),
        )?;
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), StoreError> {
        if is_valid_page_name(name) && name != self.output_dir {
            Ok(())
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }

    fn require(&self, name: &str) -> Result<(), StoreError> {
        self.check_name(name)?;
        if self.exists(name) {
            Ok(())
        } else {
            Err(StoreError::NotFound(name.to_string()))
        }
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.staging"))
    }

    fn publish(&self, staging: &Path, name: &str) -> Result<(), StoreError> {
        let target = self.page_dir(name);
        if target.exists() {
            fs::remove_dir_all(staging)?;
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        fs::rename(staging, &target)?;
        Ok(())
    }
}

/// Remove any leftover from an interrupted run and create an empty directory.
fn reset_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
