//! Page and resource naming rules.
//!
//! Page names double as directory names and URL segments, so they are kept to
//! a deliberately small alphabet:
//!
//! - between 3 and 20 characters long
//! - the first character is an ASCII letter
//! - every character is an ASCII letter or digit
//! - not made up entirely of capital letters (`ABC` is rejected, `ABC1` is not)
//!
//! Uploaded resources reuse the same rule for their base names. A filename
//! like `../sprites/Hero Ship.PNG` becomes `HeroShip`; anything that cannot be
//! salvaged falls back to [`FALLBACK_RESOURCE_NAME`].

/// Shortest allowed page name.
pub const MIN_NAME_LEN: usize = 3;

/// Longest allowed page name.
pub const MAX_NAME_LEN: usize = 20;

/// Identity given to uploads whose filename yields no valid base name.
pub const FALLBACK_RESOURCE_NAME: &str = "image";

/// Human-readable statement of the page-name rules, suitable for showing next
/// to a rejected name in the editor.
pub const INVALID_NAME_HELP: &str = "Page names must start with a letter, must contain only \
letters and digits, must not be entirely capital letters, and must have at least three \
characters and at most twenty.";

/// Extensions stripped from uploaded filenames, compared case-insensitively.
const RESOURCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Check whether `candidate` is an acceptable page name.
///
/// ```text
/// "lvl"    → true
/// "Level1" → true
/// "ab"     → false (too short)
/// "ABCDE"  → false (all capitals)
/// "12abc"  → false (starts with a digit)
/// ```
pub fn is_valid_page_name(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return false;
    }
    if !candidate.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return false;
    }
    if !candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    !candidate.chars().all(|c| c.is_ascii_uppercase())
}

/// Derive the base identity for an uploaded resource from its client filename.
///
/// Path components are dropped (both separators, since browsers on Windows
/// send full paths), a trailing image extension is removed, and every
/// character that isn't an ASCII letter or digit is discarded. The result
/// must itself pass [`is_valid_page_name`], otherwise the fallback name is
/// used. Collision suffixes are applied later by the resource store.
pub fn resource_base_name(filename: &str) -> String {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let stem = match basename.rfind('.') {
        Some(dot)
            if RESOURCE_EXTENSIONS
                .iter()
                .any(|ext| basename[dot + 1..].eq_ignore_ascii_case(ext)) =>
        {
            &basename[..dot]
        }
        _ => basename,
    };

    let cleaned: String = stem.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if is_valid_page_name(&cleaned) {
        cleaned
    } else {
        FALLBACK_RESOURCE_NAME.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_case_names() {
        assert!(is_valid_page_name("Level1"));
        assert!(is_valid_page_name("lvl"));
        assert!(is_valid_page_name("MyGame"));
    }

    #[test]
    fn rejects_short_and_long_names() {
        assert!(!is_valid_page_name("ab"));
        assert!(!is_valid_page_name(""));
        assert!(is_valid_page_name("abcdefghijklmnopqrst"));
        assert!(!is_valid_page_name("abcdefghijklmnopqrstu"));
    }

    #[test]
    fn rejects_all_capitals() {
        assert!(!is_valid_page_name("ABCDE"));
        assert!(!is_valid_page_name("ABC"));
    }

    #[test]
    fn capitals_with_digits_are_not_all_capitals() {
        assert!(is_valid_page_name("ABC1"));
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(!is_valid_page_name("12abc"));
    }

    #[test]
    fn rejects_punctuation_and_non_ascii() {
        assert!(!is_valid_page_name("my-game"));
        assert!(!is_valid_page_name("my game"));
        assert!(!is_valid_page_name("café"));
        assert!(!is_valid_page_name("../etc"));
    }

    #[test]
    fn base_name_strips_extension() {
        assert_eq!(resource_base_name("cat.png"), "cat");
        assert_eq!(resource_base_name("Sprite.JPEG"), "Sprite");
        assert_eq!(resource_base_name("tiles.Jpg"), "tiles");
    }

    #[test]
    fn base_name_keeps_unknown_extension_text() {
        // ".gif" is not stripped, only its dot is dropped
        assert_eq!(resource_base_name("anim.gif"), "animgif");
    }

    #[test]
    fn base_name_strips_path_components() {
        assert_eq!(resource_base_name("/home/me/art/hero.png"), "hero");
        assert_eq!(resource_base_name(r"C:\Users\me\hero.png"), "hero");
    }

    #[test]
    fn base_name_drops_punctuation() {
        assert_eq!(resource_base_name("Hero Ship_2.png"), "HeroShip2");
    }

    #[test]
    fn base_name_falls_back_when_invalid() {
        assert_eq!(resource_base_name("a.png"), FALLBACK_RESOURCE_NAME);
        assert_eq!(resource_base_name("123.png"), FALLBACK_RESOURCE_NAME);
        assert_eq!(resource_base_name("LOGO.png"), FALLBACK_RESOURCE_NAME);
        assert_eq!(resource_base_name(""), FALLBACK_RESOURCE_NAME);
    }
}
