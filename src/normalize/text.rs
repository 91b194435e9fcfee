//! Encoding repair for free-text cells
//!
//! The published sheet sometimes carries UTF-8 text that was decoded as
//! Windows-1252 somewhere upstream, so "Atención" arrives as "AtenciÃ³n"
//! and "≥" arrives as "â‰¥". The table below maps those sequences back.

/// Specific two-character sequences come first. The broad fallbacks (a bare
/// "Ã" and a stray "Â") come last so they never clobber a character an
/// earlier rule produced.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã\u{AD}", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã\u{8D}", "Í"),
    ("Ã“", "Ó"),
    ("Ã\u{81}", "Á"),
    ("Ã‰", "É"),
    ("Ãš", "Ú"),
    ("Ã‘", "Ñ"),
    ("Ã¼", "ü"),
    ("â‰¥", "≥"),
    ("â‰¤", "≤"),
    ("Ã", "í"),
    ("Â", ""),
];

/// Apply the replacement table, in order, to `value`.
///
/// Text without any of the known sequences is returned unchanged.
pub fn fix_encoding(value: &str) -> String {
    // Fast path: every sequence starts with one of these three characters
    if !value.contains(['Ã', 'â', 'Â']) {
        return value.to_string();
    }

    REPLACEMENTS
        .iter()
        .fold(value.to_string(), |acc, (from, to)| acc.replace(from, to))
}
