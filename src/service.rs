//! The two write transactions: save and upload.
//!
//! The front end hands over a [`PageRequest`]. Each variant carries only the
//! fields its action needs. The service validates, mutates the page store,
//! and (for saves) runs a build.
//!
//! # Save
//!
//! ```text
//! Validate ──▶ Copy/rename (only if the name changed) ──▶ Write source
//!          ──▶ Write properties ──▶ Build ──▶ Done
//! ```
//!
//! Every check runs before anything is written, and a rejected save leaves
//! the workspace untouched. When several checks fail, the reported error
//! follows a fixed priority:
//!
//! 1. `InvalidNumericProperty` or `NumericOutOfRange` (width, height, msPerFrame)
//! 2. `InvalidName` (the requested new name)
//! 3. `NameCollision` (the new name is taken)
//! 4. `NotFound` (renaming a page that doesn't exist)
//!
//! Saving under a name that has no page yet, with the name unchanged,
//! creates the page. Saving under a different name copies the page first;
//! with `pages.on_rename = "move"` the original and its build outputs are
//! removed afterwards.
//!
//! # Concurrency
//!
//! Each page name has its own lock. A save holds the locks of both names it
//! touches (taken in sorted order) from the copy through the end of the build,
//! so nobody observes a renamed page with stale properties or a running build
//! as "not built". Different pages never wait on each other.

use crate::config::{self, ConfigError, RenameMode, WorkspaceConfig};
use crate::naming::{INVALID_NAME_HELP, is_valid_page_name};
use crate::pages::{PageStore, StoreError};
use crate::pipeline::{BuildError, BuildPipeline, BuildStatus, CommandCompiler, Compiler};
use crate::properties::{GameSettings, Properties, PropertyError};
use crate::resources::{ResourceError, ResourceStore};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(
        "Your changes have not been saved because '{name}' is not allowed as a page name. {help}",
        help = INVALID_NAME_HELP
    )]
    InvalidName { name: String },
    #[error("Your changes have not been saved because a page called '{name}' already exists.")]
    NameCollision { name: String },
    #[error("The width, height and frame rate must all be integers ({field} was '{value}').")]
    InvalidNumericProperty { field: String, value: String },
    #[error("The {field} value '{value}' is out of range.")]
    NumericOutOfRange { field: String, value: String },
    #[error("Image file not found.")]
    EmptyUpload,
    #[error("Images must be in PNG or JPEG format.")]
    UnsupportedFormat,
    #[error("Image files must be no larger than {max} bytes.")]
    TooLarge { max: usize },
    #[error("Malformed properties in page '{page}': colon missing from '{line}'")]
    FormatError { page: String, line: String },
    #[error("No such page: '{0}'")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// True for errors caused by the request itself. The caller should
    /// re-render the editor with its in-flight input and this message.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ServiceError::Storage(_) | ServiceError::Config(_))
    }
}

impl From<PropertyError> for ServiceError {
    fn from(e: PropertyError) -> Self {
        match e {
            PropertyError::InvalidNumber { key, value } => {
                ServiceError::InvalidNumericProperty { field: key, value }
            }
            PropertyError::OutOfRange { key, value } => {
                ServiceError::NumericOutOfRange { field: key, value }
            }
            PropertyError::Format { line } => ServiceError::FormatError {
                page: String::new(),
                line,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => ServiceError::Storage(e),
            StoreError::Walk(e) => ServiceError::Storage(e.into()),
            StoreError::InvalidName(name) => ServiceError::InvalidName { name },
            StoreError::AlreadyExists(name) => ServiceError::NameCollision { name },
            StoreError::NotFound(name) => ServiceError::NotFound(name),
            StoreError::InvalidProperties(e) => e.into(),
            StoreError::Malformed { page, source } => match source {
                PropertyError::Format { line } => ServiceError::FormatError { page, line },
                other => other.into(),
            },
        }
    }
}

impl From<ResourceError> for ServiceError {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::Io(e) => ServiceError::Storage(e),
            ResourceError::EmptyUpload => ServiceError::EmptyUpload,
            ResourceError::UnsupportedFormat => ServiceError::UnsupportedFormat,
            ResourceError::TooLarge { max } => ServiceError::TooLarge { max },
            ResourceError::PageNotFound(page) => ServiceError::NotFound(page),
            ResourceError::NotFound { page, resource } => {
                ServiceError::NotFound(format!("{page}/{resource}"))
            }
        }
    }
}

impl From<BuildError> for ServiceError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Io(e) => ServiceError::Storage(e),
            BuildError::PageNotFound(page) | BuildError::NoArtifact(page) => {
                ServiceError::NotFound(page)
            }
        }
    }
}

/// Everything the editor submits when the user presses "save".
///
/// Numeric fields arrive as raw text and are validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Page being edited.
    pub page: String,
    pub source: String,
    pub width: String,
    pub height: String,
    pub ms_per_frame: String,
    /// Display title stored as the `name` property.
    pub title: String,
    /// Name to save under; equal to `page` unless renaming.
    pub new_name: String,
    pub debug: bool,
}

impl SaveRequest {
    pub fn is_rename(&self) -> bool {
        self.new_name != self.page
    }
}

/// An image attached to a page from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub page: String,
    /// Client-side filename; only used to derive the resource identity.
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Save(SaveRequest),
    Upload(UploadRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// The page that was written (the new name after a rename).
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
    pub status: BuildStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageOutcome {
    Saved(SaveOutcome),
    Uploaded { page: String, resource: String },
}

/// What the editor needs to render a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditState {
    pub page: String,
    pub source: String,
    pub properties: Properties,
    pub resources: Vec<String>,
    pub status: BuildStatus,
}

/// Per-page mutual exclusion.
#[derive(Default)]
struct PageLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PageLocks {
    fn handle(&self, page: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(page.to_string()).or_default().clone()
    }

    /// Run `f` while holding the locks of every page in `names`.
    fn with_locked<R>(&self, names: &[&str], f: impl FnOnce() -> R) -> R {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();
        let handles: Vec<Arc<Mutex<()>>> = names.iter().map(|n| self.handle(n)).collect();
        let guards: Vec<MutexGuard<'_, ()>> = handles
            .iter()
            .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();
        debug!("locked {names:?}");
        let result = f();
        drop(guards);
        self.release(&names, handles);
        result
    }

    /// Drop table entries nobody else holds a handle to.
    fn release(&self, names: &[&str], handles: Vec<Arc<Mutex<()>>>) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, handle) in names.iter().zip(handles) {
            // One reference in the table, one in `handle`.
            if Arc::strong_count(&handle) == 2 {
                table.remove(*name);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct PageService {
    config: WorkspaceConfig,
    pages: PageStore,
    resources: ResourceStore,
    pipeline: BuildPipeline,
    locks: PageLocks,
}

impl PageService {
    /// Open the workspace at `root`, reading `nifki.toml` if present and
    /// compiling with the configured external command.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        let compiler = CommandCompiler::from_config(&config.compiler);
        Ok(Self::with_compiler(root, config, compiler))
    }

    /// Assemble a service around an explicit config and compiler.
    pub fn with_compiler(
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        compiler: impl Compiler + 'static,
    ) -> Self {
        let pages = PageStore::new(root, config.output_dir.clone());
        let resources = ResourceStore::new(pages.clone(), config.resources.max_bytes);
        let pipeline = BuildPipeline::new(pages.clone(), compiler);
        Self {
            config,
            pages,
            resources,
            pipeline,
            locks: PageLocks::default(),
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn pages(&self) -> &PageStore {
        &self.pages
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn pipeline(&self) -> &BuildPipeline {
        &self.pipeline
    }

    pub fn handle(&self, request: &PageRequest) -> Result<PageOutcome, ServiceError> {
        match request {
            PageRequest::Save(req) => self.save(req).map(PageOutcome::Saved),
            PageRequest::Upload(req) => {
                let resource = self.upload(req)?;
                Ok(PageOutcome::Uploaded {
                    page: req.page.clone(),
                    resource,
                })
            }
        }
    }

    /// Validate, persist, and build.
    pub fn save(&self, req: &SaveRequest) -> Result<SaveOutcome, ServiceError> {
        let settings = self.check_save(req)?;
        let target = req.new_name.as_str();

        self.locks.with_locked(&[&req.page, target], || {
            if req.is_rename() {
                // Re-checked under the lock: another save may have claimed
                // the name since validation.
                if self.pages.exists(target) {
                    return Err(ServiceError::NameCollision {
                        name: target.to_string(),
                    });
                }
                self.pages.copy(&req.page, target)?;
                if self.config.pages.on_rename == RenameMode::Move {
                    self.pages.remove(&req.page)?;
                    self.pipeline.discard(&req.page)?;
                }
                info!("renamed {} -> {target} ({:?})", req.page, self.config.pages.on_rename);
            } else if !self.pages.exists(target) {
                self.pages.create(target)?;
                info!("created page {target}");
            }

            // A malformed file is replaced wholesale by this save.
            let mut props = match self.pages.read_properties(target) {
                Ok(props) => props,
                Err(StoreError::Malformed { page, source }) => {
                    warn!("discarding malformed properties of {page}: {source}");
                    Properties::default()
                }
                Err(e) => return Err(e.into()),
            };
            settings.apply_to(&mut props);

            self.pages.write_source(target, &req.source)?;
            self.pages.write_properties(target, &props)?;
            info!("saved {target}");

            let status = self.pipeline.trigger(target)?;
            Ok(SaveOutcome {
                page: target.to_string(),
                renamed_from: req.is_rename().then(|| req.page.clone()),
                status,
            })
        })
    }

    /// Attach an image to an existing page. Returns its identity.
    pub fn upload(&self, req: &UploadRequest) -> Result<String, ServiceError> {
        if !is_valid_page_name(&req.page) {
            return Err(ServiceError::InvalidName {
                name: req.page.clone(),
            });
        }
        if !self.pages.exists(&req.page) {
            return Err(ServiceError::NotFound(req.page.clone()));
        }
        self.locks.with_locked(&[&req.page], || {
            Ok(self.resources.store(&req.page, &req.filename, &req.bytes)?)
        })
    }

    /// Create an empty page without building it.
    pub fn create(&self, page: &str) -> Result<(), ServiceError> {
        self.locks
            .with_locked(&[page], || Ok(self.pages.create(page)?))
    }

    /// Rebuild a page from its stored state.
    pub fn rebuild(&self, page: &str) -> Result<BuildStatus, ServiceError> {
        self.require(page)?;
        self.locks
            .with_locked(&[page], || Ok(self.pipeline.trigger(page)?))
    }

    /// Build state of a page. Waits for a running save or build of the same
    /// page to finish first.
    pub fn status(&self, page: &str) -> Result<BuildStatus, ServiceError> {
        self.require(page)?;
        self.locks
            .with_locked(&[page], || Ok(self.pipeline.status(page)?))
    }

    /// Source, properties, resources, and build state of a page.
    pub fn edit_state(&self, page: &str) -> Result<EditState, ServiceError> {
        self.require(page)?;
        self.locks.with_locked(&[page], || {
            Ok(EditState {
                page: page.to_string(),
                source: self.pages.read_source(page)?,
                properties: self.pages.read_properties(page)?,
                resources: self.resources.list(page)?,
                status: self.pipeline.status(page)?,
            })
        })
    }

    /// Run every save check without touching the workspace and report the
    /// highest-priority failure.
    fn check_save(&self, req: &SaveRequest) -> Result<GameSettings, ServiceError> {
        let numeric = GameSettings::from_raw(
            &req.title,
            &req.width,
            &req.height,
            &req.ms_per_frame,
            req.debug,
        );

        let name_problem = if !is_valid_page_name(&req.page) {
            Some(ServiceError::InvalidName {
                name: req.page.clone(),
            })
        } else if !req.is_rename() {
            None
        } else if !is_valid_page_name(&req.new_name) {
            Some(ServiceError::InvalidName {
                name: req.new_name.clone(),
            })
        } else if self.pages.exists(&req.new_name) {
            Some(ServiceError::NameCollision {
                name: req.new_name.clone(),
            })
        } else if !self.pages.exists(&req.page) {
            Some(ServiceError::NotFound(req.page.clone()))
        } else {
            None
        };

        let settings = numeric?;
        match name_problem {
            Some(e) => {
                debug!("save of {} rejected: {e}", req.page);
                Err(e)
            }
            None => Ok(settings),
        }
    }

    fn require(&self, page: &str) -> Result<(), ServiceError> {
        if !is_valid_page_name(page) {
            return Err(ServiceError::InvalidName {
                name: page.to_string(),
            });
        }
        if !self.pages.exists(page) {
            return Err(ServiceError::NotFound(page.to_string()));
        }
        Ok(())
    }
}
