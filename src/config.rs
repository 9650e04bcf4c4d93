//! Workspace configuration.
//!
//! Loads an optional `nifki.toml` from the workspace root and merges it over
//! the stock defaults. Only the keys a deployment wants to change need to be
//! present:
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_dir = "nifki-out"      # Build outputs, relative to the workspace root
//!
//! [compiler]
//! command = ["java", "-jar", "compiler.jar"]
//! timeout_secs = 60             # 0 disables the timeout
//!
//! [resources]
//! max_bytes = 102400            # Upload size cap per resource
//!
//! [pages]
//! on_rename = "copy"            # "copy" keeps the old page, "move" removes it
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the workspace root.
pub const CONFIG_FILENAME: &str = "nifki.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Workspace configuration loaded from `nifki.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Directory (relative to the workspace root) holding `.jar`/`.err` outputs.
    pub output_dir: String,
    /// External compiler invocation.
    pub compiler: CompilerConfig,
    /// Upload limits.
    pub resources: ResourcesConfig,
    /// Page lifecycle policy.
    pub pages: PagesConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            output_dir: "nifki-out".to_string(),
            compiler: CompilerConfig::default(),
            resources: ResourcesConfig::default(),
            pages: PagesConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compiler.command.is_empty() {
            return Err(ConfigError::Validation(
                "compiler.command must not be empty".into(),
            ));
        }
        if self.resources.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "resources.max_bytes must be non-zero".into(),
            ));
        }
        let out = Path::new(&self.output_dir);
        if self.output_dir.is_empty()
            || out.is_absolute()
            || out.components().count() != 1
            || self.output_dir == ".."
            || self.output_dir == "."
        {
            return Err(ConfigError::Validation(
                "output_dir must be a single directory name inside the workspace".into(),
            ));
        }
        if crate::naming::is_valid_page_name(&self.output_dir) {
            return Err(ConfigError::Validation(format!(
                "output_dir '{}' could be mistaken for a page name",
                self.output_dir
            )));
        }
        Ok(())
    }
}

/// External compiler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Program and leading arguments. The workspace path and page name are
    /// appended on every run, and `NIFKI_OUTPUT_DIR` names the output dir.
    pub command: Vec<String>,
    /// Seconds before a running build is killed and recorded as failed.
    /// `0` waits forever.
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec!["java".into(), "-jar".into(), "compiler.jar".into()],
            timeout_secs: 60,
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Largest accepted resource, in bytes.
    pub max_bytes: usize,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self { max_bytes: 102_400 }
    }
}

/// What happens to the original page when a save renames it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameMode {
    /// Copy the page to the new name and leave the original untouched.
    #[default]
    Copy,
    /// Copy, then delete the original page and its build outputs.
    Move,
}

/// Page lifecycle policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagesConfig {
    pub on_rename: RenameMode,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(WorkspaceConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `nifki.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<WorkspaceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WorkspaceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the workspace config, falling back to stock defaults when the
/// workspace has no `nifki.toml`.
pub fn load_config(root: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `nifki.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Nifki Workspace Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# Directory for build outputs (<page>.jar / <page>.err), relative to the
# workspace root. Must not be a valid page name.
output_dir = "nifki-out"

# ---------------------------------------------------------------------------
# External compiler
# ---------------------------------------------------------------------------
[compiler]
# Program and leading arguments. The workspace path and the page name are
# appended, and the command runs with the workspace root as its directory.
# The absolute output directory is passed in the NIFKI_OUTPUT_DIR environment
# variable; the compiler must write <page>.jar or <page>.err there.
command = ["java", "-jar", "compiler.jar"]

# Seconds before a build is killed and recorded as failed. 0 = no limit.
timeout_secs = 60

# ---------------------------------------------------------------------------
# Resources (uploaded images)
# ---------------------------------------------------------------------------
[resources]
# Largest accepted upload, in bytes.
max_bytes = 102400

# ---------------------------------------------------------------------------
# Pages
# ---------------------------------------------------------------------------
[pages]
# Saving under a new name: "copy" keeps the original page,
# "move" deletes it (and its build outputs) after the copy.
on_rename = "copy"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.output_dir, "nifki-out");
        assert_eq!(config.compiler.command, vec!["java", "-jar", "compiler.jar"]);
        assert_eq!(config.compiler.timeout_secs, 60);
        assert_eq!(config.resources.max_bytes, 102_400);
        assert_eq!(config.pages.on_rename, RenameMode::Copy);
    }

    #[test]
    fn default_config_is_valid() {
        WorkspaceConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let config: WorkspaceConfig = toml::from_str(
            r#"
[compiler]
timeout_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(config.compiler.timeout_secs, 5);
        assert_eq!(config.compiler.command, vec!["java", "-jar", "compiler.jar"]);
        assert_eq!(config.output_dir, "nifki-out");
    }

    #[test]
    fn parse_rename_mode() {
        let config: WorkspaceConfig = toml::from_str("[pages]\non_rename = \"move\"\n").unwrap();
        assert_eq!(config.pages.on_rename, RenameMode::Move);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<WorkspaceConfig, _> = toml::from_str("[compiler]\ntimeout = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "nifki-out");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
output_dir = "build-out"

[resources]
max_bytes = 2048
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "build-out");
        assert_eq!(config.resources.max_bytes, 2048);
        assert_eq!(config.compiler.timeout_secs, 60);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn empty_command_fails_validation() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[compiler]\ncommand = []\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn output_dir_must_not_look_like_a_page() {
        let mut config = WorkspaceConfig::default();
        config.output_dir = "builds".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn output_dir_must_stay_inside_workspace() {
        let mut config = WorkspaceConfig::default();
        config.output_dir = "../elsewhere".into();
        assert!(config.validate().is_err());
        config.output_dir = "/tmp/out".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_overlay_keeps_base_keys() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[compiler]\ntimeout_secs = 1\n").unwrap();
        let merged = merge_toml(base, overlay);
        let config: WorkspaceConfig = merged.try_into().unwrap();
        assert_eq!(config.compiler.timeout_secs, 1);
        assert_eq!(config.compiler.command.len(), 3);
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let config: WorkspaceConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = WorkspaceConfig::default();
        assert_eq!(config.output_dir, defaults.output_dir);
        assert_eq!(config.compiler.command, defaults.compiler.command);
        assert_eq!(config.resources.max_bytes, defaults.resources.max_bytes);
        assert_eq!(config.pages.on_rename, defaults.pages.on_rename);
    }
}
