//! Filename generation and sanitization.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Collapse every run of non-word characters into a single space and trim
/// punctuation and spaces from both ends.
pub fn escape_path(name: &str) -> String {
    NON_WORD
        .replace_all(name, " ")
        .trim_matches(|c: char| c.is_ascii_punctuation() || c == ' ')
        .to_string()
}

/// Capitalize the first letter of every alphabetic run and lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(c);
            previous_alpha = false;
        }
    }
    out
}

/// Repair UTF-8 text that was decoded as Latin-1 somewhere upstream.
///
/// Returns the input unchanged when it is not such mojibake.
pub fn fix_mojibake(text: &str) -> String {
    if text.is_ascii() || text.chars().any(|c| u32::from(c) > 0xff) {
        return text.to_string();
    }
    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// Validate a path component, replacing characters that are invalid on
/// common filesystems.
///
/// Returns an error for traversal patterns or names that end up empty.
pub fn sanitize_path_component(name: &str) -> Result<String> {
    if name == "." || name == ".." || name.contains("../") || name.contains("..\\") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed: '{}'",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Path component cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Directory name for a title: escaped and title-cased, with a fallback for
/// names that escape to nothing.
pub fn title_dir_name(title_name: &str) -> String {
    let escaped = title_case(&escape_path(&fix_mojibake(title_name)));
    if escaped.is_empty() {
        "Untitled".to_string()
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("One Piece"), "One Piece");
        assert_eq!(escape_path("  Dr. STONE!! "), "Dr STONE");
        assert_eq!(escape_path("a/b\\c:d"), "a b c d");
        assert_eq!(escape_path("__init__"), "init");
        assert_eq!(escape_path("Ésprit de Corps"), "Ésprit de Corps");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("one piece"), "One Piece");
        assert_eq!(title_case("SPY x FAMILY"), "Spy X Family");
        assert_eq!(title_case("chainsaw man 2"), "Chainsaw Man 2");
        assert_eq!(title_case("kaiju no 8"), "Kaiju No 8");
    }

    #[test]
    fn test_fix_mojibake() {
        assert_eq!(fix_mojibake("PokÃ©mon"), "Pokémon");
        assert_eq!(fix_mojibake("Pokémon"), "Pokémon");
        assert_eq!(fix_mojibake("plain"), "plain");
        assert_eq!(fix_mojibake("呪術廻戦"), "呪術廻戦");
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(
            sanitize_path_component("chapter: 1").unwrap(),
            "chapter_ 1"
        );
        assert_eq!(sanitize_path_component("a/b").unwrap(), "a_b");
        assert!(sanitize_path_component("..").is_err());
        assert!(sanitize_path_component("../evil").is_err());
        assert!(sanitize_path_component("file\0name").is_err());
        assert!(sanitize_path_component("   ").is_err());
    }

    #[test]
    fn test_title_dir_name() {
        assert_eq!(title_dir_name("ONE PIECE"), "One Piece");
        assert_eq!(title_dir_name("!!!"), "Untitled");
    }
}
