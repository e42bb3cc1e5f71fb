//! Quotation pricing.
//!
//! Everything here is pure: a [`Catalog`] snapshot of one tenant's rate card
//! plus the caller's line requests go in, priced lines and totals come out.
//! [`QuoteDraft`] holds the in-progress list for one session and enforces
//! that a discount never outlives the line set it was computed against.

use std::collections::HashMap;

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{
    errors::AppError,
    structs::{RateCardItem, Role},
};

pub const USER_MAX_DISCOUNT: f64 = 10.0;
pub const ADMIN_MAX_DISCOUNT: f64 = 100.0;

/// Reads an `f64` as the decimal it prints as, so `1.005` is exactly 1.005
/// and not the nearest binary fraction below it.
fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    value.to_string().parse().ok()
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn to_money(value: Decimal) -> f64 {
    cents(value).to_f64().unwrap_or_default()
}

/// Half-up rounding to two decimal places, decided on the decimal value.
/// Values outside the decimal range come back unchanged.
pub fn round2(value: f64) -> f64 {
    to_decimal(value).map_or(value, to_money)
}

/// `length × height × rate` in exact decimal arithmetic, rounded once.
/// `None` when the product leaves the representable range.
pub fn line_total(length: f64, height: f64, unit_rate: f64) -> Option<f64> {
    let product = to_decimal(length)?
        .checked_mul(to_decimal(height)?)?
        .checked_mul(to_decimal(unit_rate)?)?;
    Some(to_money(product)).filter(|total| total.is_finite())
}

pub fn max_discount(role: Role) -> f64 {
    match role {
        Role::User => USER_MAX_DISCOUNT,
        Role::Admin => ADMIN_MAX_DISCOUNT,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CatalogEntry {
    unit_rate: f64,
    description: String,
    image: Option<String>,
}

/// Snapshot of a single tenant's rate card, keyed by item name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from stored items. On duplicate names the first item wins.
    pub fn from_items(items: &[RateCardItem]) -> Self {
        let mut entries = HashMap::with_capacity(items.len());
        for item in items {
            entries
                .entry(item.item_name.clone())
                .or_insert_with(|| CatalogEntry {
                    unit_rate: item.unit_rate,
                    description: item.description.clone(),
                    image: item.image.clone(),
                });
        }
        Catalog { entries }
    }

}

impl<S: Into<String>> FromIterator<(S, f64)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut entries = HashMap::new();
        for (name, unit_rate) in iter {
            entries.entry(name.into()).or_insert(CatalogEntry {
                unit_rate,
                description: String::new(),
                image: None,
            });
        }
        Catalog { entries }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    #[serde(alias = "item", alias = "name")]
    pub item_name: String,
    pub length: f64,
    pub height: f64,
}

impl LineRequest {
    pub fn new(item_name: impl Into<String>, length: f64, height: f64) -> Self {
        LineRequest {
            item_name: item_name.into(),
            length,
            height,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLine {
    pub name: String,
    pub length: f64,
    pub height: f64,
    pub unit_rate: f64,
    pub line_total: f64,
    pub description: String,
    pub image: Option<String>,
}

/// Prices one line against the catalog.
///
/// Items missing from the catalog price at a unit rate of zero rather than
/// being rejected. Dimensions whose product leaves the representable range
/// are invalid too.
pub fn add_line(catalog: &Catalog, request: &LineRequest) -> Result<QuoteLine, AppError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(request.length) || !valid(request.height) {
        return Err(AppError::InvalidDimensions);
    }
    let entry = catalog.entries.get(&request.item_name);
    let unit_rate = entry.map_or(0.0, |e| e.unit_rate);
    let line_total = line_total(request.length, request.height, unit_rate).ok_or(AppError::InvalidDimensions)?;
    Ok(QuoteLine {
        name: request.item_name.clone(),
        length: request.length,
        height: request.height,
        unit_rate,
        line_total,
        description: entry.map(|e| e.description.clone()).unwrap_or_default(),
        image: entry.and_then(|e| e.image.clone()),
    })
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: f64,
    pub discount_percent: f64,
    pub discount_amount: f64,
    pub grand_total: f64,
}

fn price(lines: &[QuoteLine], discount_percent: f64) -> Totals {
    let subtotal = lines
        .iter()
        .filter_map(|l| to_decimal(l.line_total))
        .fold(Decimal::ZERO, |acc, total| acc.saturating_add(total));
    let percent = to_decimal(discount_percent).unwrap_or(Decimal::ZERO);
    let discount_amount = cents(subtotal.saturating_mul(percent) / Decimal::ONE_HUNDRED);
    Totals {
        subtotal: to_money(subtotal),
        discount_percent,
        discount_amount: to_money(discount_amount),
        grand_total: to_money((subtotal - discount_amount).max(Decimal::ZERO)),
    }
}

/// Totals for `lines` with a discount bounded by the actor's role:
/// users may give up to 10%, admins up to 100%.
pub fn compute_totals(lines: &[QuoteLine], discount_percent: f64, role: Role) -> Result<Totals, AppError> {
    let max = max_discount(role);
    if !(0.0..=max).contains(&discount_percent) {
        return Err(AppError::DiscountOutOfRange { max });
    }
    Ok(price(lines, discount_percent))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Empty,
    HasLines,
    Discounted,
}

/// A session-local quote under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteDraft {
    lines: Vec<QuoteLine>,
    discount_percent: f64,
}

impl QuoteDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[QuoteLine] {
        &self.lines
    }

    pub fn discount_percent(&self) -> f64 {
        self.discount_percent
    }

    pub fn state(&self) -> DraftState {
        if self.lines.is_empty() {
            DraftState::Empty
        } else if self.discount_percent > 0.0 {
            DraftState::Discounted
        } else {
            DraftState::HasLines
        }
    }

    /// Adds a priced line. Any applied discount is cleared: it was computed
    /// against a subtotal that no longer exists.
    pub fn add_line(&mut self, catalog: &Catalog, request: &LineRequest) -> Result<&QuoteLine, AppError> {
        let line = add_line(catalog, request)?;
        self.discount_percent = 0.0;
        self.lines.push(line);
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Applies a discount to the current lines. On failure the previously
    /// applied discount stays in place.
    pub fn apply_discount(&mut self, percent: f64, role: Role) -> Result<Totals, AppError> {
        if self.lines.is_empty() {
            return Err(AppError::validation("add a line before applying a discount"));
        }
        let totals = compute_totals(&self.lines, percent, role)?;
        self.discount_percent = percent;
        Ok(totals)
    }

    pub fn reset(&mut self) {
        self.lines.clear();
        self.discount_percent = 0.0;
    }

    pub fn totals(&self) -> Totals {
        price(&self.lines, self.discount_percent)
    }

    pub fn receipt(&self) -> Receipt {
        Receipt {
            lines: self.lines.clone(),
            totals: self.totals(),
        }
    }
}

/// Everything a document renderer needs to lay out a receipt.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub lines: Vec<QuoteLine>,
    #[serde(flatten)]
    pub totals: Totals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles() -> Catalog {
        Catalog::from_iter([("Tile", 50.0)])
    }

    #[test]
    fn prices_area_times_rate() {
        let line = add_line(&tiles(), &LineRequest::new("Tile", 2.0, 3.0)).unwrap();
        assert_eq!(line.unit_rate, 50.0);
        assert_eq!(line.line_total, 300.0);
    }

    #[test]
    fn unknown_item_prices_at_zero() {
        let line = add_line(&tiles(), &LineRequest::new("Glass", 1.0, 1.0)).unwrap();
        assert_eq!(line.unit_rate, 0.0);
        assert_eq!(line.line_total, 0.0);
    }

    #[test]
    fn add_line_is_deterministic() {
        let catalog = Catalog::from_iter([("Marble", 12.345)]);
        let req = LineRequest::new("Marble", 1.5, 2.25);
        let a = add_line(&catalog, &req).unwrap();
        let b = add_line(&catalog, &req).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.line_total, 41.66);
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        for (l, h) in [(0.0, 1.0), (1.0, 0.0), (-2.0, 3.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert!(matches!(
                add_line(&tiles(), &LineRequest::new("Tile", l, h)),
                Err(AppError::InvalidDimensions)
            ));
        }
    }

    #[test]
    fn rounds_half_up_once() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(-1.005), -1.01);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        let line = add_line(&Catalog::from_iter([("Strip", 0.5)]), &LineRequest::new("Strip", 0.5, 0.5)).unwrap();
        assert_eq!(line.line_total, 0.13);
    }

    #[test]
    fn decimal_midpoints_round_up_in_line_totals() {
        let catalog = Catalog::from_iter([("Trim", 1.005), ("Panel", 1.1)]);
        let trim = add_line(&catalog, &LineRequest::new("Trim", 1.0, 1.0)).unwrap();
        assert_eq!(trim.line_total, 1.01);
        // 2.5 × 3.3 × 1.1 is 9.075 exactly, which binary floats store below the midpoint.
        let panel = add_line(&catalog, &LineRequest::new("Panel", 2.5, 3.3)).unwrap();
        assert_eq!(panel.line_total, 9.08);
    }

    #[test]
    fn discount_midpoints_round_up() {
        let lines = vec![add_line(&Catalog::from_iter([("Tile", 10.05)]), &LineRequest::new("Tile", 1.0, 1.0)).unwrap()];
        let totals = compute_totals(&lines, 50.0, Role::Admin).unwrap();
        assert_eq!(totals.subtotal, 10.05);
        assert_eq!(totals.discount_amount, 5.03);
        assert_eq!(totals.grand_total, 5.02);
    }

    #[test]
    fn overflowing_line_total_is_invalid() {
        let catalog = Catalog::from_iter([("Slab", f64::MAX)]);
        assert!(matches!(
            add_line(&catalog, &LineRequest::new("Slab", 1e300, 1e300)),
            Err(AppError::InvalidDimensions)
        ));
        assert!(matches!(
            add_line(&tiles(), &LineRequest::new("Tile", f64::MAX, f64::MAX)),
            Err(AppError::InvalidDimensions)
        ));
        assert!(matches!(
            add_line(&tiles(), &LineRequest::new("Tile", 1e200, 1e200)),
            Err(AppError::InvalidDimensions)
        ));
    }

    #[test]
    fn discount_bounds_follow_role() {
        let lines = vec![add_line(&tiles(), &LineRequest::new("Tile", 4.0, 5.0)).unwrap()];
        assert!(compute_totals(&lines, 10.0, Role::User).is_ok());
        assert!(matches!(
            compute_totals(&lines, 10.0001, Role::User),
            Err(AppError::DiscountOutOfRange { .. })
        ));
        assert!(compute_totals(&lines, 11.0, Role::User).is_err());
        assert!(compute_totals(&lines, 100.0, Role::Admin).is_ok());
        assert!(compute_totals(&lines, 101.0, Role::Admin).is_err());
        assert!(compute_totals(&lines, -1.0, Role::Admin).is_err());
        assert!(compute_totals(&lines, f64::NAN, Role::Admin).is_err());
    }

    #[test]
    fn full_admin_discount_floors_at_zero() {
        let lines = vec![add_line(&tiles(), &LineRequest::new("Tile", 1.0, 1.0)).unwrap()];
        let totals = compute_totals(&lines, 100.0, Role::Admin).unwrap();
        assert_eq!(totals.discount_amount, 50.0);
        assert_eq!(totals.grand_total, 0.0);
    }

    #[test]
    fn reapplying_a_discount_is_stable() {
        let mut draft = QuoteDraft::new();
        draft.add_line(&tiles(), &LineRequest::new("Tile", 3.0, 7.0)).unwrap();
        let first = draft.apply_discount(7.5, Role::User).unwrap();
        let second = draft.apply_discount(7.5, Role::User).unwrap();
        assert_eq!(first.grand_total, second.grand_total);
        assert_eq!(draft.totals(), second);
    }

    #[test]
    fn discount_clears_when_lines_change() {
        let mut draft = QuoteDraft::new();
        draft.add_line(&tiles(), &LineRequest::new("Tile", 4.0, 5.0)).unwrap();
        assert_eq!(draft.state(), DraftState::HasLines);
        let totals = draft.apply_discount(10.0, Role::User).unwrap();
        assert_eq!(totals.subtotal, 1000.0);
        assert_eq!(totals.discount_amount, 100.0);
        assert_eq!(totals.grand_total, 900.0);
        assert_eq!(draft.state(), DraftState::Discounted);

        draft.add_line(&tiles(), &LineRequest::new("Tile", 2.0, 2.0)).unwrap();
        assert_eq!(draft.state(), DraftState::HasLines);
        let totals = draft.totals();
        assert_eq!(totals.discount_amount, 0.0);
        assert_eq!(totals.grand_total, 1200.0);
    }

    #[test]
    fn rejected_discount_keeps_previous_one() {
        let mut draft = QuoteDraft::new();
        draft.add_line(&tiles(), &LineRequest::new("Tile", 4.0, 5.0)).unwrap();
        draft.apply_discount(5.0, Role::User).unwrap();
        assert!(draft.apply_discount(50.0, Role::User).is_err());
        assert_eq!(draft.discount_percent(), 5.0);
        assert_eq!(draft.totals().grand_total, 950.0);
    }

    #[test]
    fn invalid_line_leaves_draft_untouched() {
        let mut draft = QuoteDraft::new();
        draft.add_line(&tiles(), &LineRequest::new("Tile", 4.0, 5.0)).unwrap();
        draft.apply_discount(5.0, Role::User).unwrap();
        let before = draft.clone();
        assert!(draft.add_line(&tiles(), &LineRequest::new("Tile", 0.0, 5.0)).is_err());
        assert_eq!(draft, before);
    }

    #[test]
    fn discount_needs_lines() {
        let mut draft = QuoteDraft::new();
        assert!(matches!(draft.apply_discount(5.0, Role::User), Err(AppError::Validation(_))));
        assert_eq!(draft.state(), DraftState::Empty);
    }

    #[test]
    fn reset_then_add_matches_fresh_draft() {
        let req = LineRequest::new("Tile", 2.0, 3.0);
        let mut used = QuoteDraft::new();
        used.add_line(&tiles(), &LineRequest::new("Tile", 9.0, 9.0)).unwrap();
        used.apply_discount(10.0, Role::User).unwrap();
        used.reset();
        assert_eq!(used.state(), DraftState::Empty);
        used.add_line(&tiles(), &req).unwrap();

        let mut fresh = QuoteDraft::new();
        fresh.add_line(&tiles(), &req).unwrap();
        assert_eq!(used, fresh);
        assert_eq!(used.discount_percent(), 0.0);
    }

    #[test]
    fn catalog_from_items_keeps_first_duplicate() {
        let item = |id: i64, rate: f64| RateCardItem {
            id,
            tenant_id: 1,
            item_name: "Tile".to_owned(),
            unit_rate: rate,
            description: String::new(),
            image: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let catalog = Catalog::from_items(&[item(1, 50.0), item(2, 70.0)]);
        let line = add_line(&catalog, &LineRequest::new("Tile", 1.0, 1.0)).unwrap();
        assert_eq!(line.unit_rate, 50.0);
        assert_eq!(line.line_total, 50.0);
    }

    #[test]
    fn receipt_serializes_flat_totals() {
        let mut draft = QuoteDraft::new();
        draft.add_line(&tiles(), &LineRequest::new("Tile", 2.0, 3.0)).unwrap();
        draft.add_line(&tiles(), &LineRequest::new("Glass", 1.0, 1.0)).unwrap();

        let receipt = draft.receipt();
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["subtotal"], 300.0);
        assert_eq!(json["lines"][1]["unitRate"], 0.0);
    }
}
