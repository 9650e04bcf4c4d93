//! # Nifki
//!
//! The page lifecycle and build-artifact core of a wiki where every page is a
//! small game. A page holds a game script, a few properties, and the images
//! it uses. Saving a page stores it and compiles it into a playable artifact,
//! or into the compiler's diagnostics when the script doesn't build.
//!
//! # Architecture: Save Transaction
//!
//! ```text
//! request ─▶ validate ─▶ copy/rename ─▶ write source ─▶ write properties ─▶ build
//!   │           │                                                           │
//!   │           └── rejected: nothing written, error shown next to input    │
//!   │                                                                       ▼
//!   └── upload ─▶ sniff + size check ─▶ res/<name>          <page>.jar  or  <page>.err
//! ```
//!
//! The filesystem is the only database. A workspace is a directory with one
//! subdirectory per page plus an output directory for build results:
//!
//! ```text
//! wiki/
//! ├── nifki.toml
//! ├── MyGame/
//! │   ├── source.sss
//! │   ├── properties.txt
//! │   └── res/
//! └── nifki-out/
//!     ├── MyGame.jar
//!     └── Broken.err
//! ```
//!
//! Build state is never stored separately. It is derived from which of the
//! two output files exists, so it cannot drift from what is on disk.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Page-name rules and resource base names derived from upload filenames |
//! | [`properties`] | The `properties.txt` codec and the typed game settings |
//! | [`pages`] | File-backed page store: create, copy, remove, read and write page files |
//! | [`resources`] | Image uploads: magic-byte sniffing, size cap, collision-free naming |
//! | [`pipeline`] | Compiler invocation with timeout and the derived build status |
//! | [`service`] | Save and upload transactions, error priority, per-page locking |
//! | [`config`] | `nifki.toml` loading, stock defaults, and validation |
//! | [`output`] | CLI output formatting for page commands |
//!
//! # Design Decisions
//!
//! ## Validate Everything, Then Write
//!
//! A save either lands completely or leaves no trace. All request checks run
//! against the current workspace before the first byte is written, and the
//! reported error follows a fixed priority (numeric fields, then names, then
//! existence) so the same bad request always produces the same message.
//!
//! ## The Compiler Is a Black Box
//!
//! The build pipeline knows only the [`pipeline::Compiler`] trait: it hands
//! over a page and an output directory and reconciles whatever files appear.
//! Production runs an external command with a timeout; tests use a scripted
//! mock that writes outputs directly.
//!
//! ## Per-Page Locks
//!
//! Different pages never block each other. Two requests touching the same page
//! are serialized, and a rename holds both names.

pub mod config;
pub mod naming;
pub mod output;
pub mod pages;
pub mod pipeline;
pub mod properties;
pub mod resources;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;
