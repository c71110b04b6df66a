use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // A capitalized word following any character: `maxTokens` -> `max_Tokens`
    static ref WORD_START: Regex = Regex::new(r"(.)([A-Z][a-z]+)").unwrap();
    // Remaining lower/digit to upper boundaries: `topP` -> `top_P`
    static ref CASE_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

/// Convert a camelCase runtime key to snake_case.
///
/// Keys that already contain `_` or `-` are returned unchanged.
pub fn to_snake_case(name: &str) -> String {
    if name.contains(['_', '-']) {
        return name.to_string();
    }
    let spaced = WORD_START.replace_all(name, "${1}_${2}");
    CASE_BOUNDARY
        .replace_all(&spaced, "${1}_${2}")
        .to_lowercase()
}
