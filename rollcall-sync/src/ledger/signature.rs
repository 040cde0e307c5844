//! Event content signature
//!
//! Placeholders and real bookings for the same event occurrence must agree
//! on one identity key. The signature is a SHA-256 over the event-defining
//! attributes in a fixed field order, each field canonicalized (entity
//! decoding, lowercasing, whitespace collapse) so that spelling drift in
//! the source data cannot split an event into two identities.

use rollcall_common::text;
use sha2::{Digest, Sha256};

/// Compute the event signature.
///
/// Field order is fixed: venue, term-or-day, age group, season, booking
/// type. Changing it would orphan every stored placeholder.
pub fn event_signature(
    venue: &str,
    term_or_day: &str,
    age_group: &str,
    season: &str,
    booking_type: &str,
) -> String {
    let canonical = [venue, term_or_day, age_group, season, booking_type]
        .map(text::canonical)
        .join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable() {
        let a = event_signature("North Park", "summer-week-1", "U10", "Summer 2025", "full week");
        let b = event_signature("North Park", "summer-week-1", "U10", "Summer 2025", "full week");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn signature_ignores_case_and_spacing() {
        let a = event_signature("North Park", "summer-week-1", "U10", "Summer 2025", "Full Week");
        let b = event_signature("  north   PARK ", "Summer-Week-1", "u10", "summer 2025", "full week");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_decodes_entities() {
        let a = event_signature("Queen's Field", "t", "U8", "s", "b");
        let b = event_signature("Queen&#039;s Field", "t", "U8", "s", "b");
        assert_eq!(a, b);
    }

    #[test]
    fn any_field_change_changes_identity() {
        let base = event_signature("v", "t", "a", "s", "b");
        assert_ne!(base, event_signature("v2", "t", "a", "s", "b"));
        assert_ne!(base, event_signature("v", "t2", "a", "s", "b"));
        assert_ne!(base, event_signature("v", "t", "a2", "s", "b"));
        assert_ne!(base, event_signature("v", "t", "a", "s2", "b"));
        assert_ne!(base, event_signature("v", "t", "a", "s", "b2"));
    }
}
