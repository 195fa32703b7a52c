//! ILIKE pattern helpers shared by the search fallback path and
//! autocomplete.

/// Escapes `\`, `%`, and `_` so a raw user string is safe to embed in an
/// ILIKE pattern as a literal substring match.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds a `%escaped%` contains-pattern for a free-text fallback search.
pub fn contains_pattern(raw: &str) -> String {
    format!("%{}%", escape_like(raw))
}

/// Builds an `escaped%` prefix-pattern for autocomplete.
pub fn prefix_pattern(raw: &str) -> String {
    format!("{}%", escape_like(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_percent_and_underscore_and_backslash() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(escape_like("deadlock"), "deadlock");
    }

    #[test]
    fn contains_pattern_wraps_with_percent_signs() {
        assert_eq!(contains_pattern("ab%c"), "%ab\\%c%");
    }
}
