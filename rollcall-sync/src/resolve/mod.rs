//! Attribute resolution
//!
//! Booking attributes are scattered across the line item, its variant and
//! the parent product, under inconsistently spelled keys. Every lookup in
//! the pipeline goes through one ordered-source resolver so that no two
//! call sites can disagree about precedence.

pub mod classify;
pub mod dates;

pub use classify::{classify, ClassifySignals};
pub use dates::{resolve_dates, DateInputs, DateResolution, ResolvedDates};

use crate::commerce::AttributeBag;
use rollcall_common::db::models::UNKNOWN;

/// Alternate key spellings per logical attribute, tried in order within
/// each source
pub mod keys {
    pub const VENUE: &[&str] = &["venue", "location"];
    pub const REGION: &[&str] = &["region", "venue-region"];
    pub const ACTIVITY_TYPE: &[&str] = &["activity-type", "activity"];
    pub const CAMP_TERMS: &[&str] = &["camp-terms", "camp-term", "term"];
    pub const COURSE_DAY: &[&str] = &["course-day", "day"];
    pub const AGE_GROUP: &[&str] = &["age-group", "ages"];
    pub const SEASON: &[&str] = &["season", "camp-season"];
    pub const BOOKING_TYPE: &[&str] = &["booking-type", "booking"];
    pub const SELECTED_DAYS: &[&str] = &["selected-days", "days-selected"];
    pub const PLAYER_NAME: &[&str] = &["player-name", "child-name", "participant-name"];
    pub const PLAYER_AGE: &[&str] = &["player-age", "child-age"];
    pub const PLAYER_GENDER: &[&str] = &["player-gender", "child-gender", "gender"];
    pub const START_DATE: &[&str] = &["start-date", "event-start-date"];
    pub const END_DATE: &[&str] = &["end-date", "event-end-date"];
    /// Stored metadata fallbacks for event dates (resolver strategy 3)
    pub const META_START_DATE: &[&str] = &["event-start", "meta-start-date"];
    pub const META_END_DATE: &[&str] = &["event-end", "meta-end-date"];
    pub const REIMBURSEMENT: &[&str] = &["reimbursement", "refund-amount"];
}

/// Ordered attribute sources for one booked item:
/// item-level override, then variant attribute, then parent-product
/// attribute. Missing sources are simply skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeChain<'a> {
    item: Option<&'a AttributeBag>,
    variant: Option<&'a AttributeBag>,
    product: Option<&'a AttributeBag>,
}

impl<'a> AttributeChain<'a> {
    pub fn new(
        item: Option<&'a AttributeBag>,
        variant: Option<&'a AttributeBag>,
        product: Option<&'a AttributeBag>,
    ) -> Self {
        Self {
            item,
            variant,
            product,
        }
    }

    fn sources(&self) -> impl Iterator<Item = &'a AttributeBag> {
        [self.item, self.variant, self.product]
            .into_iter()
            .flatten()
    }

    /// First non-empty value across the source chain
    pub fn resolve(&self, keys: &[&str]) -> Option<String> {
        self.sources().find_map(|bag| bag.get_any(keys))
    }

    /// Resolve or fall back to the `Unknown` sentinel; attribute gaps are
    /// never fatal because downstream reporting must still list the record
    pub fn resolve_or_unknown(&self, keys: &[&str]) -> String {
        self.resolve(keys).unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn has(&self, keys: &[&str]) -> bool {
        self.resolve(keys).is_some()
    }

    /// Resolve from the catalog sources only (variant, then product),
    /// ignoring any item-level override
    pub fn resolve_from_catalog(&self, keys: &[&str]) -> Option<String> {
        [self.variant, self.product]
            .into_iter()
            .flatten()
            .find_map(|bag| bag.get_any(keys))
    }
}
