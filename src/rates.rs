//! Per-tenant rate cards.

use serde::Deserialize;

use crate::{
    db::{self, NewRate, RateChanges},
    errors::AppError,
    policy::{self, Operation, Target},
    quote::{Catalog, LineRequest, QuoteDraft},
    structs::{Actor, RateCardItem},
    utils::validate_image,
    AppState,
};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RateInput {
    pub item_name: String,
    #[serde(alias = "rate")]
    pub unit_rate: f64,
    pub description: String,
    #[serde(alias = "imageBase64")]
    pub image: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RatePatch {
    pub item_name: Option<String>,
    #[serde(alias = "rate")]
    pub unit_rate: Option<f64>,
    pub description: Option<String>,
    #[serde(alias = "imageBase64")]
    pub image: Option<String>,
}

fn validate_name(item_name: &str) -> Result<String, AppError> {
    let trimmed = item_name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("item name is required"));
    }
    Ok(trimmed.to_owned())
}

fn validate_rate(unit_rate: f64) -> Result<f64, AppError> {
    if !unit_rate.is_finite() || unit_rate <= 0.0 {
        return Err(AppError::validation("rate must be greater than zero"));
    }
    Ok(unit_rate)
}

fn validate_optional_image(image: Option<String>) -> Result<Option<String>, AppError> {
    match image {
        Some(image) if image.is_empty() => Ok(None),
        Some(image) => {
            validate_image(&image)?;
            Ok(Some(image))
        }
        None => Ok(None),
    }
}

pub async fn create(state: &AppState, actor: Option<&Actor>, input: RateInput) -> Result<RateCardItem, AppError> {
    let grant = policy::authorize(actor, Operation::CreateRate, Target::ActorScope)?;
    let rate = NewRate {
        item_name: validate_name(&input.item_name)?,
        unit_rate: validate_rate(input.unit_rate)?,
        description: input.description,
        image: validate_optional_image(input.image)?,
    };
    db::insert_rate(state, grant.tenant, rate).await
}

/// Lists the caller's own rate card: the admin's, or the linked admin's for a user.
pub async fn list(state: &AppState, actor: Option<&Actor>) -> Result<Vec<RateCardItem>, AppError> {
    let grant = policy::authorize(actor, Operation::ListRates, Target::ActorScope)?;
    db::list_rates(state, grant.tenant).await
}

/// Snapshot of the caller's rate card for pricing quotes.
pub async fn catalog(state: &AppState, actor: Option<&Actor>) -> Result<Catalog, AppError> {
    let grant = policy::authorize(actor, Operation::BuildReceipt, Target::ActorScope)?;
    let items = db::list_rates(state, grant.tenant).await?;
    Ok(Catalog::from_items(&items))
}

/// Prices `lines` against the caller's rate card and applies the discount
/// within the caller's role bound.
pub async fn price_quote(
    state: &AppState,
    actor: Option<&Actor>,
    lines: &[LineRequest],
    discount_percent: f64,
) -> Result<QuoteDraft, AppError> {
    let snapshot = catalog(state, actor).await?;
    let role = actor.map(|a| a.role).ok_or(AppError::Unauthenticated)?;
    if lines.is_empty() {
        return Err(AppError::validation("No items to price"));
    }
    let mut draft = QuoteDraft::new();
    for line in lines {
        draft.add_line(&snapshot, line)?;
    }
    if discount_percent != 0.0 {
        draft.apply_discount(discount_percent, role)?;
    }
    Ok(draft)
}

pub async fn update(
    state: &AppState,
    actor: Option<&Actor>,
    id: i64,
    patch: RatePatch,
) -> Result<RateCardItem, AppError> {
    let existing = db::get_rate(state, id).await?;
    let grant = policy::authorize_owned(actor, Operation::UpdateRate, existing.map(|i| i.tenant_id))?;

    let changes = RateChanges {
        item_name: patch.item_name.as_deref().map(validate_name).transpose()?,
        unit_rate: patch.unit_rate.map(validate_rate).transpose()?,
        description: patch.description,
        // An empty image leaves the stored one in place.
        image: validate_optional_image(patch.image)?,
    };

    db::update_rate(state, id, grant.tenant, changes)
        .await?
        .ok_or(AppError::NotFoundOrForbidden)
}

pub async fn delete(state: &AppState, actor: Option<&Actor>, id: i64) -> Result<(), AppError> {
    let existing = db::get_rate(state, id).await?;
    let grant = policy::authorize_owned(actor, Operation::DeleteRate, existing.map(|i| i.tenant_id))?;
    match db::delete_rate(state, id, grant.tenant).await? {
        0 => Err(AppError::NotFoundOrForbidden),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_historical_field_names() {
        let input: RateInput =
            serde_json::from_str(r#"{"itemName":"Tile","rate":50,"imageBase64":null}"#).unwrap();
        assert_eq!(input.item_name, "Tile");
        assert_eq!(input.unit_rate, 50.0);
        assert!(input.image.is_none());
    }

    #[test]
    fn field_validation() {
        assert!(validate_name("  ").is_err());
        assert_eq!(validate_name(" Tile ").unwrap(), "Tile");
        assert!(validate_rate(0.0).is_err());
        assert!(validate_rate(-3.0).is_err());
        assert!(validate_rate(f64::NAN).is_err());
        assert_eq!(validate_rate(12.5).unwrap(), 12.5);
    }

    #[test]
    fn empty_image_means_none() {
        assert_eq!(validate_optional_image(Some(String::new())).unwrap(), None);
        assert!(matches!(
            validate_optional_image(Some("not an image".to_owned())),
            Err(AppError::InvalidImage)
        ));
    }
}
