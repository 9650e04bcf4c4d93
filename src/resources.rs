//! Binary attachments (images) belonging to a page.
//!
//! Uploads are classified by their leading bytes, not by filename:
//!
//! | Magic | Format |
//! |---|---|
//! | bytes `1..4` are `PNG` | PNG |
//! | bytes `0..2` are `FF D8` | JPEG |
//!
//! Anything else is refused. The stored identity is derived from the client
//! filename (see [`resource_base_name`]) and made unique within the page by a
//! numeric suffix: uploading `cat.png` three times yields `cat`, `cat1`,
//! `cat2`. Resources are written with create-new semantics and never
//! overwritten afterwards.

use crate::naming::resource_base_name;
use crate::pages::PageStore;
use image::ImageFormat;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Image file not found.")]
    EmptyUpload,
    #[error("Images must be in PNG or JPEG format.")]
    UnsupportedFormat,
    #[error("Image files must be no larger than {max} bytes.")]
    TooLarge { max: usize },
    #[error("No such page: '{0}'")]
    PageNotFound(String),
    #[error("No resource '{resource}' in page '{page}'")]
    NotFound { page: String, resource: String },
}

/// Classify an upload by its magic bytes.
pub fn sniff(bytes: &[u8]) -> Result<ImageFormat, ResourceError> {
    if bytes.is_empty() {
        return Err(ResourceError::EmptyUpload);
    }
    if bytes.get(1..4) == Some(b"PNG".as_slice()) {
        Ok(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        Ok(ImageFormat::Jpeg)
    } else {
        Err(ResourceError::UnsupportedFormat)
    }
}

/// Pick the identity for a new resource: `base` if free, otherwise `base`
/// followed by the smallest unused positive integer.
pub fn resolve_collision(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Write `data` into a freshly created resource file. On failure the file
/// is removed, so a partial payload never holds on to the identity.
fn fill_or_discard(mut out: impl Write, path: &Path, data: &[u8]) -> io::Result<()> {
    let written = out.write_all(data).and_then(|()| out.flush());
    if let Err(e) = written {
        drop(out);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!("could not remove partial resource {}: {cleanup}", path.display());
        }
        return Err(e);
    }
    Ok(())
}

/// Upload-side view of a page's `res/` directory.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    pages: PageStore,
    max_bytes: usize,
}

impl ResourceStore {
    pub fn new(pages: PageStore, max_bytes: usize) -> Self {
        Self { pages, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store an in-memory upload. Returns the resolved identity.
    pub fn store(&self, page: &str, filename: &str, bytes: &[u8]) -> Result<String, ResourceError> {
        self.store_from_reader(page, filename, bytes)
    }

    /// Store an upload read from a stream.
    ///
    /// Reads at most one byte past the size cap, so an oversized body is
    /// rejected without buffering all of it. Nothing is written unless the
    /// upload is accepted in full.
    pub fn store_from_reader(
        &self,
        page: &str,
        filename: &str,
        reader: impl Read,
    ) -> Result<String, ResourceError> {
        if !self.pages.exists(page) {
            return Err(ResourceError::PageNotFound(page.to_string()));
        }

        let mut data = Vec::new();
        reader
            .take(self.max_bytes as u64 + 1)
            .read_to_end(&mut data)?;
        let format = sniff(&data)?;
        if data.len() > self.max_bytes {
            return Err(ResourceError::TooLarge {
                max: self.max_bytes,
            });
        }

        let dir = self.pages.resources_dir(page);
        fs::create_dir_all(&dir)?;
        let base = resource_base_name(filename);
        let mut taken: HashSet<String> = self.list(page)?.into_iter().collect();

        loop {
            let id = resolve_collision(&base, &taken);
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&id));
            match file {
                Ok(file) => {
                    fill_or_discard(file, &dir.join(&id), &data)?;
                    info!(
                        "stored resource {page}/{id} ({}, {} bytes)",
                        format.to_mime_type(),
                        data.len()
                    );
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("resource name {id} taken concurrently, trying next suffix");
                    taken.insert(id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resource identities of a page, sorted.
    pub fn list(&self, page: &str) -> Result<Vec<String>, ResourceError> {
        if !self.pages.exists(page) {
            return Err(ResourceError::PageNotFound(page.to_string()));
        }
        let dir = self.pages.resources_dir(page);
        fs::create_dir_all(&dir)?;
        let mut names: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Bytes and sniffed format of a stored resource.
    ///
    /// Only plain alphanumeric identities are looked up, so a request can't
    /// reach outside the page's `res/` directory.
    pub fn read(&self, page: &str, resource: &str) -> Result<(Vec<u8>, ImageFormat), ResourceError> {
        let not_found = || ResourceError::NotFound {
            page: page.to_string(),
            resource: resource.to_string(),
        };
        if !self.pages.exists(page) {
            return Err(ResourceError::PageNotFound(page.to_string()));
        }
        if resource.is_empty() || !resource.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(not_found());
        }
        let bytes = match fs::read(self.pages.resources_dir(page).join(resource)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let format = sniff(&bytes)?;
        Ok((bytes, format))
    }
}
