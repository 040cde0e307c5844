//! Tiered discount attribution
//!
//! Discounts are computed per co-booking group (one checkout order), never
//! per item in isolation, because the tier position of an item depends on
//! the other items booked with it. The rates are fixed business constants;
//! they exist as named constants so the historical totals are testable.

use std::collections::HashMap;

use rollcall_common::db::models::{ActivityType, DiscountAllocation, DiscountKind};
use serde::{Deserialize, Serialize};

use crate::commerce::CouponLine;

/// Camp sibling tiers: most expensive camp pays full price, the second
/// child's camp gets 20%, every further child 25%
pub const CAMP_SIBLING_RATES: [f64; 3] = [0.0, 0.20, 0.25];

/// Course multi-child tiers within one player's courses, by price rank
pub const COURSE_MULTI_CHILD_RATES: [f64; 3] = [0.10, 0.15, 0.20];

/// Same-season flat rate by a player's total item count
pub fn same_season_rate(item_count: usize) -> f64 {
    match item_count {
        0 | 1 => 0.0,
        2 => 0.05,
        3 => 0.10,
        _ => 0.15,
    }
}

/// One item of a co-booking group as the engine sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupItem {
    pub order_item_id: i64,
    /// Stable player key within the group (normalized player name)
    pub player: String,
    pub activity: ActivityType,
    /// Undiscounted line subtotal
    pub price: f64,
}

/// Round a currency amount to cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Sum of a breakdown, rounded to cents
pub fn total(allocations: &[DiscountAllocation]) -> f64 {
    round_cents(allocations.iter().map(|a| a.amount).sum())
}

/// Attribute discounts across one co-booking group.
///
/// Returns a breakdown per `order_item_id`; zero-amount allocations are
/// omitted, so items without any discount map to an empty list.
pub fn attribute(
    items: &[GroupItem],
    coupons: &[CouponLine],
) -> HashMap<i64, Vec<DiscountAllocation>> {
    let mut breakdowns: HashMap<i64, Vec<DiscountAllocation>> =
        items.iter().map(|item| (item.order_item_id, Vec::new())).collect();

    apply_camp_sibling(items, &mut breakdowns);
    apply_course_multi_child(items, &mut breakdowns);
    apply_same_season(items, &mut breakdowns);
    apply_coupons(items, coupons, &mut breakdowns);

    breakdowns
}

/// Camp sibling discount: camp items sorted by price descending; the tier
/// position advances on the first item of each distinct player, so a
/// player's further camps reuse that player's tier rate.
fn apply_camp_sibling(items: &[GroupItem], breakdowns: &mut HashMap<i64, Vec<DiscountAllocation>>) {
    let mut camps: Vec<&GroupItem> = items
        .iter()
        .filter(|item| item.activity.is_camp_like() && !item.player.is_empty())
        .collect();
    camps.sort_by(|a, b| {
        b.price
            .partial_cmp(&a.price)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.order_item_id.cmp(&b.order_item_id))
    });

    let mut player_tiers: HashMap<&str, usize> = HashMap::new();
    for camp in camps {
        let next_tier = player_tiers.len();
        let tier = *player_tiers.entry(camp.player.as_str()).or_insert(next_tier);
        let rate = CAMP_SIBLING_RATES[tier.min(CAMP_SIBLING_RATES.len() - 1)];
        push_allocation(
            breakdowns,
            camp.order_item_id,
            DiscountAllocation {
                name: "Camp sibling discount".to_string(),
                kind: DiscountKind::Sibling,
                amount: round_cents(camp.price * rate),
                applied_to: camp.player.clone(),
            },
        );
    }
}

/// Course multi-child discount: each player's courses by price rank
fn apply_course_multi_child(
    items: &[GroupItem],
    breakdowns: &mut HashMap<i64, Vec<DiscountAllocation>>,
) {
    let mut by_player: HashMap<&str, Vec<&GroupItem>> = HashMap::new();
    for item in items {
        if item.activity == ActivityType::Course && !item.player.is_empty() {
            by_player.entry(item.player.as_str()).or_default().push(item);
        }
    }

    for (player, mut courses) in by_player {
        courses.sort_by(|a, b| {
            b.price
                .partial_cmp(&a.price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.order_item_id.cmp(&b.order_item_id))
        });
        for (position, course) in courses.iter().enumerate() {
            let rate = COURSE_MULTI_CHILD_RATES[position.min(COURSE_MULTI_CHILD_RATES.len() - 1)];
            push_allocation(
                breakdowns,
                course.order_item_id,
                DiscountAllocation {
                    name: "Course multi-child discount".to_string(),
                    kind: DiscountKind::MultiChild,
                    amount: round_cents(course.price * rate),
                    applied_to: player.to_string(),
                },
            );
        }
    }
}

/// Same-season discount: a flat rate on each of a player's items once the
/// player has two or more items in the group
fn apply_same_season(items: &[GroupItem], breakdowns: &mut HashMap<i64, Vec<DiscountAllocation>>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        if !item.player.is_empty() {
            *counts.entry(item.player.as_str()).or_insert(0) += 1;
        }
    }

    for item in items {
        if item.player.is_empty() {
            continue;
        }
        let rate = same_season_rate(counts[item.player.as_str()]);
        push_allocation(
            breakdowns,
            item.order_item_id,
            DiscountAllocation {
                name: "Same season discount".to_string(),
                kind: DiscountKind::SameSeason,
                amount: round_cents(item.price * rate),
                applied_to: item.player.clone(),
            },
        );
    }
}

/// Order-level coupons distributed proportionally by subtotal share; the
/// final item absorbs the rounding remainder so the coupon total is exact
fn apply_coupons(
    items: &[GroupItem],
    coupons: &[CouponLine],
    breakdowns: &mut HashMap<i64, Vec<DiscountAllocation>>,
) {
    let group_subtotal: f64 = items.iter().map(|item| item.price).sum();
    if group_subtotal <= 0.0 {
        return;
    }

    for coupon in coupons {
        let mut allocated = 0.0;
        for (position, item) in items.iter().enumerate() {
            let amount = if position + 1 == items.len() {
                round_cents(coupon.amount - allocated)
            } else {
                round_cents(coupon.amount * item.price / group_subtotal)
            };
            allocated = round_cents(allocated + amount);
            push_allocation(
                breakdowns,
                item.order_item_id,
                DiscountAllocation {
                    name: coupon.name.clone(),
                    kind: DiscountKind::Coupon,
                    amount,
                    applied_to: item.player.clone(),
                },
            );
        }
    }
}

fn push_allocation(
    breakdowns: &mut HashMap<i64, Vec<DiscountAllocation>>,
    order_item_id: i64,
    allocation: DiscountAllocation,
) {
    // Zero-amount allocations are omitted from breakdowns
    if allocation.amount == 0.0 {
        return;
    }
    breakdowns.entry(order_item_id).or_default().push(allocation);
}
