//! CLI output formatting for page commands.
//!
//! Output is **page-centric**. Every entity is shown by its page name first,
//! with build state and paths as indented context lines underneath:
//!
//! ## List
//!
//! ```text
//! Pages
//! 001 Asteroids (built)
//! 002 MyGame (failed)
//! 003 SpaceRace (not built)
//! ```
//!
//! ## Save
//!
//! ```text
//! Saved MyGame (renamed from OldGame)
//!     Build: failed
//!         Line 3: Unknown identifier 'foo'
//! ```
//!
//! ## Show
//!
//! ```text
//! MyGame
//!     Title: Space Race
//!     Size: 320x240 @ 40ms/frame
//!     Resources: cat, cat1
//!     Source: 12 lines
//!     Build: built
//!         Artifact: nifki-out/MyGame.jar
//! ```
//!
//! Compiler diagnostics are word-wrapped to [`DIAGNOSTICS_WIDTH`] columns,
//! with blank lines dropped.
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::pipeline::BuildStatus;
use crate::properties::{KEY_HEIGHT, KEY_MS_PER_FRAME, KEY_NAME, KEY_WIDTH};
use crate::service::{EditState, SaveOutcome};

/// Column at which compiler diagnostics are wrapped.
pub const DIAGNOSTICS_WIDTH: usize = 80;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based position as a zero-padded 3-digit string.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Word-wrap `text` to at most `width` characters per line.
///
/// Each input line is wrapped on its own and blank lines are dropped. Words
/// longer than `width` are split across lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(width) {
                if current_len > 0 && current_len + 1 + piece.len() > width {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(piece);
                current_len += piece.len();
            }
        }
        if current_len > 0 {
            lines.push(current);
        }
    }
    lines
}

/// Build-state lines at `depth`: the label, then artifact path or wrapped
/// diagnostics one level deeper.
fn status_lines(status: &BuildStatus, depth: usize) -> Vec<String> {
    let mut lines = vec![format!("{}Build: {}", indent(depth), status.label())];
    let detail = indent(depth + 1);
    match status {
        BuildStatus::NotBuilt => {}
        BuildStatus::Built { artifact } => {
            lines.push(format!("{detail}Artifact: {}", artifact.display()));
        }
        BuildStatus::Failed { diagnostics } => {
            let width = DIAGNOSTICS_WIDTH.saturating_sub(detail.len()).max(1);
            for line in wrap_text(diagnostics, width) {
                lines.push(format!("{detail}{line}").trim_end().to_string());
            }
        }
    }
    lines
}

// ============================================================================
// List
// ============================================================================

/// Format the page inventory, each page tagged with its build state.
pub fn format_page_list(pages: &[(String, BuildStatus)]) -> Vec<String> {
    if pages.is_empty() {
        return vec!["No pages".to_string()];
    }
    let mut lines = vec!["Pages".to_string()];
    for (i, (name, status)) in pages.iter().enumerate() {
        lines.push(format!("{} {} ({})", format_index(i + 1), name, status.label()));
    }
    lines
}

pub fn print_page_list(pages: &[(String, BuildStatus)]) {
    for line in format_page_list(pages) {
        println!("{}", line);
    }
}

// ============================================================================
// Save / build / status
// ============================================================================

pub fn format_save_outcome(outcome: &SaveOutcome) -> Vec<String> {
    let header = match &outcome.renamed_from {
        Some(from) => format!("Saved {} (renamed from {})", outcome.page, from),
        None => format!("Saved {}", outcome.page),
    };
    let mut lines = vec![header];
    lines.extend(status_lines(&outcome.status, 1));
    lines
}

pub fn print_save_outcome(outcome: &SaveOutcome) {
    for line in format_save_outcome(outcome) {
        println!("{}", line);
    }
}

pub fn format_status(page: &str, status: &BuildStatus) -> Vec<String> {
    let mut lines = vec![page.to_string()];
    lines.extend(status_lines(status, 1));
    lines
}

pub fn print_status(page: &str, status: &BuildStatus) {
    for line in format_status(page, status) {
        println!("{}", line);
    }
}

// ============================================================================
// Upload
// ============================================================================

pub fn format_upload(page: &str, resource: &str) -> Vec<String> {
    vec![format!("Stored {page}/{resource}")]
}

pub fn print_upload(page: &str, resource: &str) {
    for line in format_upload(page, resource) {
        println!("{}", line);
    }
}

// ============================================================================
// Show
// ============================================================================

pub fn format_edit_state(state: &EditState) -> Vec<String> {
    let props = &state.properties;
    let get = |key: &str| props.get(key).unwrap_or_default();
    let mut lines = vec![state.page.clone()];

    let title = get(KEY_NAME);
    if !title.is_empty() {
        lines.push(format!("{}Title: {}", indent(1), title));
    }
    lines.push(format!(
        "{}Size: {}x{} @ {}ms/frame",
        indent(1),
        get(KEY_WIDTH),
        get(KEY_HEIGHT),
        get(KEY_MS_PER_FRAME)
    ));
    if state.resources.is_empty() {
        lines.push(format!("{}Resources: none", indent(1)));
    } else {
        lines.push(format!("{}Resources: {}", indent(1), state.resources.join(", ")));
    }
    lines.push(format!(
        "{}Source: {} lines",
        indent(1),
        state.source.lines().count()
    ));
    lines.extend(status_lines(&state.status, 1));
    lines
}

pub fn print_edit_state(state: &EditState) {
    for line in format_edit_state(state) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{GameSettings, Properties};
    use std::path::PathBuf;

    fn built(path: &str) -> BuildStatus {
        BuildStatus::Built {
            artifact: PathBuf::from(path),
        }
    }

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn wrap_text_breaks_at_width() {
        let lines = wrap_text("aaa bbb ccc ddd", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn wrap_text_splits_overlong_words() {
        let lines = wrap_text("short averyveryverylongword end", 10);
        assert_eq!(lines, vec!["short", "averyveryv", "erylongwor", "d end"]);
    }

    #[test]
    fn wrap_text_drops_blank_lines() {
        let lines = wrap_text("first line\n\n   \nthird line\n", 80);
        assert_eq!(lines, vec!["first line", "third line"]);
    }

    #[test]
    fn wrap_text_counts_characters_not_bytes() {
        let lines = wrap_text("ééééé ééééé", 11);
        assert_eq!(lines, vec!["ééééé ééééé"]);
        assert!(wrap_text(&"ü".repeat(30), 10).iter().all(|l| l.chars().count() == 10));
    }

    #[test]
    fn page_list_shows_index_and_state() {
        let pages = vec![
            ("Asteroids".to_string(), built("nifki-out/Asteroids.jar")),
            (
                "MyGame".to_string(),
                BuildStatus::Failed {
                    diagnostics: "bad".into(),
                },
            ),
            ("SpaceRace".to_string(), BuildStatus::NotBuilt),
        ];
        assert_eq!(
            format_page_list(&pages),
            vec![
                "Pages",
                "001 Asteroids (built)",
                "002 MyGame (failed)",
                "003 SpaceRace (not built)",
            ]
        );
    }

    #[test]
    fn empty_page_list() {
        assert_eq!(format_page_list(&[]), vec!["No pages"]);
    }

    #[test]
    fn save_outcome_with_rename_and_failure() {
        let outcome = SaveOutcome {
            page: "MyGame".into(),
            renamed_from: Some("OldGame".into()),
            status: BuildStatus::Failed {
                diagnostics: "Line 3: Unknown identifier 'foo'".into(),
            },
        };
        assert_eq!(
            format_save_outcome(&outcome),
            vec![
                "Saved MyGame (renamed from OldGame)",
                "    Build: failed",
                "        Line 3: Unknown identifier 'foo'",
            ]
        );
    }

    #[test]
    fn diagnostics_wrap_within_eighty_columns() {
        let diagnostics = format!("{} {}", "word ".repeat(40), "x".repeat(150));
        let lines = format_status("MyGame", &BuildStatus::Failed { diagnostics });
        assert!(lines.len() > 3);
        assert!(lines.iter().all(|l| l.chars().count() <= DIAGNOSTICS_WIDTH));
    }

    #[test]
    fn status_built_shows_artifact() {
        let lines = format_status("MyGame", &built("nifki-out/MyGame.jar"));
        assert_eq!(
            lines,
            vec!["MyGame", "    Build: built", "        Artifact: nifki-out/MyGame.jar"]
        );
    }

    #[test]
    fn upload_line() {
        assert_eq!(format_upload("MyGame", "cat1"), vec!["Stored MyGame/cat1"]);
    }

    #[test]
    fn edit_state_summary() {
        let mut properties = Properties::default();
        GameSettings::from_raw("Space Race", "320", "240", "40", false)
            .unwrap()
            .apply_to(&mut properties);
        let state = EditState {
            page: "MyGame".into(),
            source: "a\nb\n".into(),
            properties,
            resources: vec!["cat".into(), "cat1".into()],
            status: BuildStatus::NotBuilt,
        };
        assert_eq!(
            format_edit_state(&state),
            vec![
                "MyGame",
                "    Title: Space Race",
                "    Size: 320x240 @ 40ms/frame",
                "    Resources: cat, cat1",
                "    Source: 2 lines",
                "    Build: not built",
            ]
        );
    }

    #[test]
    fn edit_state_without_title_or_resources() {
        let state = EditState {
            page: "Blank".into(),
            source: String::new(),
            properties: Properties::default(),
            resources: Vec::new(),
            status: BuildStatus::NotBuilt,
        };
        let lines = format_edit_state(&state);
        assert_eq!(lines[1], "    Size: 256x256 @ 40ms/frame");
        assert_eq!(lines[2], "    Resources: none");
    }
}
