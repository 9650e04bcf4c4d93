//! The `properties.txt` format.
//!
//! Each page carries a tiny property file that the compiler and the player
//! both read:
//!
//! ```text
//! # comments run to the end of the line
//! name: Space Race
//! width: 320
//! height: 240
//! msPerFrame: 40
//! debug: false
//! ```
//!
//! Parsing starts from the stock defaults (`name=""`, `width=256`,
//! `height=256`, `msPerFrame=40`, `debug=false`) and overrides them line by
//! line. Unknown keys are kept, so a compiler that grows new properties does
//! not lose them on a round trip through the editor. Entry order is preserved
//! in both directions.

use indexmap::IndexMap;
use serde::Serialize;
use std::num::IntErrorKind;
use thiserror::Error;

pub const KEY_NAME: &str = "name";
pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_MS_PER_FRAME: &str = "msPerFrame";
pub const KEY_DEBUG: &str = "debug";

/// Keys that must hold an integer before a property set may be written.
///
/// Values are stored as `i64`; larger magnitudes are rejected with
/// [`PropertyError::OutOfRange`].
pub const NUMERIC_KEYS: &[&str] = &[KEY_WIDTH, KEY_HEIGHT, KEY_MS_PER_FRAME];

const DEFAULTS: &[(&str, &str)] = &[
    (KEY_NAME, ""),
    (KEY_WIDTH, "256"),
    (KEY_HEIGHT, "256"),
    (KEY_MS_PER_FRAME, "40"),
    (KEY_DEBUG, "false"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Colon missing from '{line}'")]
    Format { line: String },
    #[error("Property '{key}' must be an integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
    #[error("Property '{key}' is out of range: '{value}'")]
    OutOfRange { key: String, value: String },
}

/// An ordered `key → value` property set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Properties {
    entries: IndexMap<String, String>,
}

impl Default for Properties {
    /// The stock property set, used for brand-new pages and as the base layer
    /// of [`parse`].
    fn default() -> Self {
        Self {
            entries: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Properties {
    /// A property set with no entries at all, not even the defaults.
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set `key` to `value`. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every numeric key present holds an integer.
    pub fn validate_numeric(&self) -> Result<(), PropertyError> {
        for key in NUMERIC_KEYS {
            if let Some(value) = self.get(key) {
                parse_int(key, value)?;
            }
        }
        Ok(())
    }

    /// Typed view over the well-known keys.
    pub fn settings(&self) -> Result<GameSettings, PropertyError> {
        let int = |key: &str| parse_int(key, self.get(key).unwrap_or_default());
        Ok(GameSettings {
            name: self.get(KEY_NAME).unwrap_or_default().to_string(),
            width: int(KEY_WIDTH)?,
            height: int(KEY_HEIGHT)?,
            ms_per_frame: int(KEY_MS_PER_FRAME)?,
            debug: self.get(KEY_DEBUG).is_some_and(|v| v != "false"),
        })
    }
}

/// Parse a `properties.txt` body.
///
/// Stock defaults come first; stored values override them in place and
/// unknown keys are appended in file order. A non-blank line without a colon
/// is a [`PropertyError::Format`].
pub fn parse(text: &str) -> Result<Properties, PropertyError> {
    let mut props = Properties::default();
    for raw in text.lines() {
        let line = match raw.find('#') {
            Some(hash) => &raw[..hash],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| PropertyError::Format {
            line: line.to_string(),
        })?;
        props.set(key.trim(), value.trim());
    }
    Ok(props)
}

/// Render a property set as `key: value` lines, one per entry.
pub fn serialize(props: &Properties) -> String {
    props.iter().map(|(k, v)| format!("{k}: {v}\n")).collect()
}

fn parse_int(key: &str, value: &str) -> Result<i64, PropertyError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| {
            let (key, value) = (key.to_string(), value.to_string());
            match e.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                    PropertyError::OutOfRange { key, value }
                }
                _ => PropertyError::InvalidNumber { key, value },
            }
        })
}

/// The well-known properties in typed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSettings {
    /// Display title of the game (free text, may be empty).
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub ms_per_frame: i64,
    pub debug: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Properties::default()
            .settings()
            .unwrap_or(Self {
                name: String::new(),
                width: 256,
                height: 256,
                ms_per_frame: 40,
                debug: false,
            })
    }
}

impl GameSettings {
    /// Build settings from raw editor fields.
    ///
    /// All three numeric fields are checked; the first one that isn't an
    /// integer is reported.
    pub fn from_raw(
        name: &str,
        width: &str,
        height: &str,
        ms_per_frame: &str,
        debug: bool,
    ) -> Result<Self, PropertyError> {
        Ok(Self {
            name: name.to_string(),
            width: parse_int(KEY_WIDTH, width)?,
            height: parse_int(KEY_HEIGHT, height)?,
            ms_per_frame: parse_int(KEY_MS_PER_FRAME, ms_per_frame)?,
            debug,
        })
    }

    /// Canonical property set for these settings, in the stock key order.
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::empty();
        self.apply_to(&mut props);
        props
    }

    /// Overwrite the well-known keys of `props`, leaving any other keys (and
    /// their positions) alone.
    pub fn apply_to(&self, props: &mut Properties) {
        props.set(KEY_NAME, self.name.as_str());
        props.set(KEY_WIDTH, self.width.to_string());
        props.set(KEY_HEIGHT, self.height.to_string());
        props.set(KEY_MS_PER_FRAME, self.ms_per_frame.to_string());
        props.set(KEY_DEBUG, if self.debug { "true" } else { "false" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let props = parse("").unwrap();
        assert_eq!(props, Properties::default());
        assert_eq!(props.get(KEY_WIDTH), Some("256"));
        assert_eq!(props.get(KEY_MS_PER_FRAME), Some("40"));
    }

    #[test]
    fn stored_values_override_defaults_in_place() {
        let props = parse("height: 100\nwidth: 50\n").unwrap();
        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "width", "height", "msPerFrame", "debug"]);
        assert_eq!(props.get(KEY_WIDTH), Some("50"));
        assert_eq!(props.get(KEY_HEIGHT), Some("100"));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "# header\n\n  width: 64 # trailing note\n   \n";
        let props = parse(text).unwrap();
        assert_eq!(props.get(KEY_WIDTH), Some("64"));
        assert_eq!(props.len(), 5);
    }

    #[test]
    fn value_keeps_later_colons() {
        let props = parse("name: Level: The Return").unwrap();
        assert_eq!(props.get(KEY_NAME), Some("Level: The Return"));
    }

    #[test]
    fn unknown_keys_pass_through_in_order() {
        let props = parse("gravity: 9\nfriction: 2\n").unwrap();
        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[5..], ["gravity", "friction"]);
    }

    #[test]
    fn missing_colon_is_format_error() {
        let err = parse("width: 10\nbogus line\n").unwrap_err();
        assert_eq!(
            err,
            PropertyError::Format {
                line: "bogus line".into()
            }
        );
    }

    #[test]
    fn serialize_preserves_order() {
        let mut props = Properties::empty();
        props.set("zeta", "1");
        props.set("alpha", "2");
        assert_eq!(serialize(&props), "zeta: 1\nalpha: 2\n");
    }

    #[test]
    fn parse_serialize_roundtrip() {
        let mut props = Properties::default();
        props.set(KEY_NAME, "Space Race");
        props.set(KEY_WIDTH, "320");
        props.set(KEY_DEBUG, "true");
        props.set("extra", "a value: with colon");
        assert_eq!(parse(&serialize(&props)).unwrap(), props);
    }

    #[test]
    fn settings_reads_typed_values() {
        let props = parse("name: Pong\nwidth: 100\nheight: 50\nmsPerFrame: 20\ndebug: true").unwrap();
        let settings = props.settings().unwrap();
        assert_eq!(
            settings,
            GameSettings {
                name: "Pong".into(),
                width: 100,
                height: 50,
                ms_per_frame: 20,
                debug: true,
            }
        );
    }

    #[test]
    fn settings_debug_is_true_unless_false() {
        let props = parse("debug: yes").unwrap();
        assert!(props.settings().unwrap().debug);
    }

    #[test]
    fn settings_rejects_non_integer() {
        let props = parse("msPerFrame: fast").unwrap();
        assert_eq!(
            props.settings().unwrap_err(),
            PropertyError::InvalidNumber {
                key: KEY_MS_PER_FRAME.into(),
                value: "fast".into()
            }
        );
        assert!(props.validate_numeric().is_err());
    }

    #[test]
    fn from_raw_accepts_padded_and_signed_integers() {
        let settings = GameSettings::from_raw("", " 007 ", "-3", "+40", false).unwrap();
        assert_eq!(settings.width, 7);
        assert_eq!(settings.height, -3);
        assert_eq!(settings.ms_per_frame, 40);
    }

    #[test]
    fn from_raw_reports_first_bad_field() {
        let err = GameSettings::from_raw("", "abc", "x", "1", false).unwrap_err();
        assert!(matches!(err, PropertyError::InvalidNumber { key, .. } if key == KEY_WIDTH));
    }

    #[test]
    fn from_raw_reports_overflow_as_out_of_range() {
        let err = GameSettings::from_raw("", "99999999999999999999", "1", "1", false).unwrap_err();
        assert_eq!(
            err,
            PropertyError::OutOfRange {
                key: KEY_WIDTH.into(),
                value: "99999999999999999999".into()
            }
        );
        assert!(err.to_string().contains("out of range"));
        assert!(GameSettings::from_raw("", "1", "-99999999999999999999", "1", false).is_err());
    }

    #[test]
    fn to_properties_uses_stock_key_order() {
        let settings = GameSettings::from_raw("Pong", "100", "50", "20", true).unwrap();
        assert_eq!(
            serialize(&settings.to_properties()),
            "name: Pong\nwidth: 100\nheight: 50\nmsPerFrame: 20\ndebug: true\n"
        );
    }

    #[test]
    fn apply_to_keeps_unknown_keys() {
        let mut props = parse("gravity: 9\nwidth: 10").unwrap();
        GameSettings::from_raw("Pong", "100", "50", "20", false)
            .unwrap()
            .apply_to(&mut props);
        assert_eq!(props.get("gravity"), Some("9"));
        assert_eq!(props.get(KEY_WIDTH), Some("100"));
        assert_eq!(props.get(KEY_NAME), Some("Pong"));
    }

    #[test]
    fn default_settings_match_default_properties() {
        let settings = GameSettings::default();
        assert_eq!(settings.width, 256);
        assert_eq!(settings.height, 256);
        assert_eq!(settings.ms_per_frame, 40);
        assert!(!settings.debug);
    }
}
