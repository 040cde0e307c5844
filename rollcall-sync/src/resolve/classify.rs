//! Activity type classification
//!
//! Pure function over the raw activity-type text plus structural fallback
//! signals. The precedence is load-bearing: an explicit girls-only token
//! always wins (a camp that is also girls-only classifies as Girls Only),
//! and any textual signal beats every structural fallback.

use rollcall_common::db::models::ActivityType;
use rollcall_common::text;

/// Textual spellings of the girls-only category seen in source data
const GIRLS_ONLY_SYNONYMS: &[&str] = &[
    "girls only",
    "girls' only",
    "girls-only",
    "girl's only",
    "girls only camp",
];

/// Variant ids of legacy girls-only sessions published before the
/// activity-type attribute existed
const GIRLS_ONLY_VARIANT_IDS: &[i64] = &[1184, 1187, 2216];

/// Structural fallback signals used when no activity-type text resolves
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifySignals {
    /// A course-day attribute resolved for the item
    pub has_course_day: bool,
    /// A camp-terms attribute resolved for the item
    pub has_camp_terms: bool,
    /// The item's variant is on the girls-only allowlist
    pub girls_only_variant: bool,
}

impl ClassifySignals {
    pub fn for_variant(variant_id: i64, has_course_day: bool, has_camp_terms: bool) -> Self {
        Self {
            has_course_day,
            has_camp_terms,
            girls_only_variant: is_girls_only_variant(variant_id),
        }
    }
}

pub fn is_girls_only_variant(variant_id: i64) -> bool {
    GIRLS_ONLY_VARIANT_IDS.contains(&variant_id)
}

/// Classify raw activity-type text into a category
pub fn classify(raw_text: Option<&str>, signals: &ClassifySignals) -> ActivityType {
    let tokens: Vec<String> = raw_text
        .map(|raw| {
            text::canonical(raw)
                .split(',')
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect()
        })
        .unwrap_or_default();

    // 1. Explicit girls-only token wins over everything else
    if tokens
        .iter()
        .any(|token| GIRLS_ONLY_SYNONYMS.contains(&token.as_str()))
    {
        return ActivityType::GirlsOnly;
    }

    // 2. Any other textual signal becomes the category label
    if !tokens.is_empty() {
        let label = text::title_case(&tokens.join(" "));
        return ActivityType::from(label);
    }

    // 3. Structural fallbacks, only when no text resolved at all
    if signals.has_course_day {
        return ActivityType::Course;
    }
    if signals.has_camp_terms {
        return ActivityType::Camp;
    }
    if signals.girls_only_variant {
        return ActivityType::GirlsOnly;
    }

    ActivityType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn girls_only_beats_camp_token() {
        let signals = ClassifySignals::default();
        assert_eq!(
            classify(Some("Camp, Girls' Only"), &signals),
            ActivityType::GirlsOnly
        );
        assert_eq!(
            classify(Some("girls&#039; only, camp"), &signals),
            ActivityType::GirlsOnly
        );
    }

    #[test]
    fn plain_tokens_map_to_canonical_categories() {
        let signals = ClassifySignals::default();
        assert_eq!(classify(Some("CAMP"), &signals), ActivityType::Camp);
        assert_eq!(classify(Some(" course "), &signals), ActivityType::Course);
        assert_eq!(classify(Some("Event"), &signals), ActivityType::Event);
    }

    #[test]
    fn multi_word_text_becomes_custom_category() {
        let signals = ClassifySignals::default();
        assert_eq!(
            classify(Some("holiday clinic"), &signals),
            ActivityType::Custom("Holiday Clinic".to_string())
        );
    }

    #[test]
    fn text_beats_structural_signals() {
        // Course-day attribute present, but the text says camp
        let signals = ClassifySignals {
            has_course_day: true,
            ..Default::default()
        };
        assert_eq!(classify(Some("Camp"), &signals), ActivityType::Camp);
    }

    #[test]
    fn structural_fallback_order() {
        assert_eq!(
            classify(
                None,
                &ClassifySignals {
                    has_course_day: true,
                    has_camp_terms: true,
                    girls_only_variant: true,
                }
            ),
            ActivityType::Course
        );
        assert_eq!(
            classify(
                None,
                &ClassifySignals {
                    has_camp_terms: true,
                    girls_only_variant: true,
                    ..Default::default()
                }
            ),
            ActivityType::Camp
        );
        assert_eq!(
            classify(
                None,
                &ClassifySignals {
                    girls_only_variant: true,
                    ..Default::default()
                }
            ),
            ActivityType::GirlsOnly
        );
    }

    #[test]
    fn nothing_resolves_to_unknown() {
        assert_eq!(
            classify(None, &ClassifySignals::default()),
            ActivityType::Unknown
        );
        assert_eq!(
            classify(Some("  "), &ClassifySignals::default()),
            ActivityType::Unknown
        );
    }
}
