//! Text normalization for attribute values
//!
//! Commerce attribute values arrive with HTML entities, stray whitespace
//! and inconsistent casing. Every resolver path funnels through these
//! helpers so the ledger and the event signatures see one spelling.

/// HTML entities observed in commerce attribute exports
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#034;", "\""),
    ("&#039;", "'"),
    ("&apos;", "'"),
    ("&#8217;", "'"),
    ("&#8216;", "'"),
    ("&nbsp;", " "),
    ("&#038;", "&"),
];

/// Decode the HTML entities that appear in commerce attribute values
pub fn decode_entities(raw: &str) -> String {
    let mut out = raw.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Trim and entity-decode a raw attribute value; `None` when nothing remains
pub fn clean(raw: &str) -> Option<String> {
    let cleaned = decode_entities(raw).trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Lowercase, trimmed, whitespace-collapsed form used for comparisons
/// and signature canonicalization
pub fn canonical(raw: &str) -> String {
    decode_entities(raw)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize the first letter of every word ("summer camp" -> "Summer Camp")
pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_entities() {
        assert_eq!(decode_entities("Girls&#039; Only"), "Girls' Only");
        assert_eq!(decode_entities("Mini &amp; Junior"), "Mini & Junior");
    }

    #[test]
    fn clean_rejects_whitespace_only() {
        assert_eq!(clean("   "), None);
        assert_eq!(clean(" &nbsp; "), None);
        assert_eq!(clean("  North Park "), Some("North Park".to_string()));
    }

    #[test]
    fn canonical_collapses_case_and_spaces() {
        assert_eq!(canonical("  North   PARK "), "north park");
        assert_eq!(canonical("Girls&#039; Only"), "girls' only");
    }

    #[test]
    fn title_case_capitalizes_words() {
        assert_eq!(title_case("summer camp"), "Summer Camp");
        assert_eq!(title_case("girls' only"), "Girls' Only");
    }
}
