//! Behaviour switches for typed access and for the text writer.
//!
//! Options are plain data. They can be built in code or loaded from a TOML
//! file, where every key is optional:
//!
//! ```toml
//! auto_convert = true
//! tab_width = 4
//! default_format = "hex"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::value::SettingFormat;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Allow Int <-> Float conversion in typed reads and writes.
    pub auto_convert: bool,
    /// Format given to newly created Int settings.
    pub default_format: SettingFormat,
    /// Spaces per indentation level in written output.
    pub tab_width: u8,
    /// Write `name : { ... }` instead of `name = { ... }` for groups.
    pub colon_assignment_for_groups: bool,
    /// Write `name : value` instead of `name = value` for everything else.
    pub colon_assignment_for_non_groups: bool,
    /// Terminate each written setting with `;`.
    pub semicolon_separators: bool,
    /// Put the opening brace of a group on its own line.
    pub open_brace_on_separate_line: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_convert: false,
            default_format: SettingFormat::Default,
            tab_width: 2,
            colon_assignment_for_groups: true,
            colon_assignment_for_non_groups: false,
            semicolon_separators: true,
            open_brace_on_separate_line: true,
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let options = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?options, "loaded options");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(Options::from_toml_str("").unwrap(), Options::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let options =
            Options::from_toml_str("auto_convert = true\ndefault_format = \"hex\"\ntab_width = 4\n")
                .unwrap();
        assert!(options.auto_convert);
        assert_eq!(options.default_format, SettingFormat::Hex);
        assert_eq!(options.tab_width, 4);
        assert!(options.semicolon_separators);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Options::from_toml_str("autoconvert = true"),
            Err(Error::Options(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Options::load(&missing), Err(Error::FileIo { .. })));
    }
}
