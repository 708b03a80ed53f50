//! Utility functions for naming export artifacts.

/// Replacement for characters that cannot appear in a file name.
const REPLACEMENT: char = '_';

/// Stem used when a display name sanitizes to nothing.
const FALLBACK_STEM: &str = "layer";

/// Derives a file-system safe base name from a layer display name.
///
/// Path separators and NUL become `_`, as do leading dots (so the result is
/// never hidden or a relative path component). Everything else, including
/// non-ASCII text, is kept as is.
///
/// # Examples
///
/// ```
/// use geoexport_core::utils::file_stem_for;
///
/// assert_eq!(file_stem_for("Roads"), "Roads");
/// assert_eq!(file_stem_for("Карта"), "Карта");
/// assert_eq!(file_stem_for("a/b\\c"), "a_b_c");
/// assert_eq!(file_stem_for(".."), "__");
/// ```
#[must_use]
pub fn file_stem_for(display_name: &str) -> String {
    let trimmed = display_name.trim();
    let mut leading = true;

    let stem: String = trimmed
        .chars()
        .map(|c| {
            let replace = matches!(c, '/' | '\\' | '\0') || (leading && c == '.');
            leading = leading && c == '.';
            if replace { REPLACEMENT } else { c }
        })
        .collect();

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

/// Download file name for an export, `{display name}.{format}.zip`.
///
/// ```
/// use geoexport_core::utils::archive_file_name;
///
/// assert_eq!(archive_file_name("Roads", "shp"), "Roads.shp.zip");
/// ```
#[must_use]
pub fn archive_file_name(display_name: &str, format: &str) -> String {
    format!("{display_name}.{format}.zip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_kept() {
        assert_eq!(file_stem_for("Roads"), "Roads");
        assert_eq!(file_stem_for("  Rivers 2024 "), "Rivers 2024");
        assert_eq!(file_stem_for("v1.2"), "v1.2");
    }

    #[test]
    fn test_separators_are_replaced() {
        assert_eq!(file_stem_for("../etc/passwd"), "___etc_passwd");
        assert_eq!(file_stem_for("C:\\data"), "C:_data");
        assert_eq!(file_stem_for("nul\0byte"), "nul_byte");
    }

    #[test]
    fn test_empty_name_falls_back() {
        assert_eq!(file_stem_for(""), "layer");
        assert_eq!(file_stem_for("   "), "layer");
    }

    #[test]
    fn test_archive_file_name_keeps_display_name() {
        assert_eq!(archive_file_name("Карта", "tab"), "Карта.tab.zip");
    }
}
