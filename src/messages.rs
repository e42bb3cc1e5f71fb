//! Complaints and quotation notifications.
//!
//! Users file messages into their admin's tenant; only that admin may
//! reply, mark read or delete. Status changes go through the named
//! transitions on [`Message`] so the stored status always agrees with
//! the variant and the reply.

use serde::Deserialize;

use crate::{
    db::{self, NewMessage},
    errors::AppError,
    policy::{self, Operation, Target},
    quote,
    structs::{Actor, Message, MessageKind, MessageStatus, MessageType, QuotationItem, QuotationPayload, Role},
    AppState,
};

pub const DEFAULT_CATEGORY: &str = "General";

impl Message {
    /// Reply transition: a complaint becomes `answered` with the given text.
    /// Replying again overwrites the earlier reply.
    pub fn apply_reply(&mut self, text: &str) -> Result<(), AppError> {
        if text.trim().is_empty() {
            return Err(AppError::validation("reply text is required"));
        }
        match self.kind {
            MessageKind::Complaint => {
                self.reply = Some(text.to_owned());
                self.status = MessageStatus::Answered;
                Ok(())
            }
            MessageKind::QuotationNotification { .. } => {
                Err(AppError::validation("quotation notifications cannot be replied to"))
            }
        }
    }

    /// Mark-read transition, returning whether the status changed. Only an
    /// unread quotation notification moves; complaints leave `unread` by
    /// being answered and nothing ever returns to `read` from `answered`.
    pub fn mark_read(&mut self) -> bool {
        let is_quotation = matches!(self.kind, MessageKind::QuotationNotification { .. });
        if is_quotation && self.status == MessageStatus::Unread {
            self.status = MessageStatus::Read;
            true
        } else {
            false
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ComplaintInput {
    pub category: Option<String>,
    pub title: String,
    #[serde(alias = "message")]
    pub body: String,
}

/// One quotation line as clients send it. Older clients use `itemName`,
/// `totalPrice` or `total`; [`RawQuotationItem::normalize`] folds those into
/// the canonical [`QuotationItem`].
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RawQuotationItem {
    pub name: Option<String>,
    pub item_name: Option<String>,
    pub length: Option<f64>,
    pub height: Option<f64>,
    pub rate: Option<f64>,
    pub unit_rate: Option<f64>,
    pub total: Option<f64>,
    pub total_price: Option<f64>,
    pub line_total: Option<f64>,
}

impl RawQuotationItem {
    pub fn normalize(self, index: usize) -> Result<QuotationItem, AppError> {
        let missing = |field: &str| AppError::validation(format!("item {}: {} is required", index + 1, field));
        let name = self
            .name
            .or(self.item_name)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| missing("name"))?;
        let length = self.length.filter(|v| v.is_finite()).ok_or_else(|| missing("length"))?;
        let height = self.height.filter(|v| v.is_finite()).ok_or_else(|| missing("height"))?;
        let unit_rate = self
            .rate
            .or(self.unit_rate)
            .filter(|v| v.is_finite())
            .ok_or_else(|| missing("rate"))?;
        if length <= 0.0 || height <= 0.0 {
            return Err(AppError::InvalidDimensions);
        }
        if unit_rate < 0.0 {
            return Err(AppError::validation(format!("item {}: rate cannot be negative", index + 1)));
        }
        let line_total = match self.line_total.or(self.total).or(self.total_price).filter(|v| v.is_finite()) {
            Some(total) => quote::round2(total),
            None => quote::line_total(length, height, unit_rate).ok_or(AppError::InvalidDimensions)?,
        };
        Ok(QuotationItem {
            name,
            length,
            height,
            unit_rate,
            line_total,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotationNotifyInput {
    pub items: Option<Vec<RawQuotationItem>>,
    pub grand_total: Option<f64>,
}

impl QuotationNotifyInput {
    pub fn normalize(self, generated_at: String) -> Result<QuotationPayload, AppError> {
        let items = self
            .items
            .filter(|items| !items.is_empty())
            .ok_or_else(|| AppError::validation("Incomplete or invalid quotation data"))?;
        let grand_total = self
            .grand_total
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| AppError::validation("Incomplete or invalid quotation data"))?;
        let items = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| item.normalize(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QuotationPayload {
            items,
            grand_total,
            generated_at,
        })
    }
}

pub async fn submit_complaint(state: &AppState, actor: Option<&Actor>, input: ComplaintInput) -> Result<Message, AppError> {
    let grant = policy::authorize(actor, Operation::SubmitComplaint, Target::ActorScope)?;
    let title = input.title.trim();
    let body = input.body.trim();
    if title.is_empty() || body.is_empty() {
        return Err(AppError::validation("Title and message are required"));
    }
    let category = input
        .category
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned());

    db::insert_message(
        state,
        NewMessage {
            user_id: grant.actor.id,
            tenant_id: grant.tenant,
            category,
            title: title.to_owned(),
            body: body.to_owned(),
            quotation: None,
        },
    )
    .await
}

pub async fn submit_quotation_notification(
    state: &AppState,
    actor: Option<&Actor>,
    input: QuotationNotifyInput,
) -> Result<Message, AppError> {
    let grant = policy::authorize(actor, Operation::SubmitQuotation, Target::ActorScope)?;
    let payload = input.normalize(db::now())?;

    let author = db::get_user_by_id(state, grant.actor.id)
        .await?
        .map(|u| u.display_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "User".to_owned());
    let body = format!("{} generated a quotation with {} items", author, payload.items.len());

    db::insert_message(
        state,
        NewMessage {
            user_id: grant.actor.id,
            tenant_id: grant.tenant,
            category: DEFAULT_CATEGORY.to_owned(),
            title: "New Quotation Generated".to_owned(),
            body,
            quotation: Some(payload),
        },
    )
    .await
}

/// The caller's own messages, newest first. Admins author nothing here and
/// always get an empty list.
pub async fn list_mine(state: &AppState, actor: Option<&Actor>) -> Result<Vec<Message>, AppError> {
    let grant = policy::authorize(actor, Operation::ListOwnMessages, Target::ActorScope)?;
    if grant.actor.role != Role::User {
        return Ok(Vec::new());
    }
    db::list_messages_by_author(state, grant.actor.id).await
}

/// The tenant's inbox, newest first, each message carrying its author.
pub async fn list_for_tenant(
    state: &AppState,
    actor: Option<&Actor>,
    kind: Option<MessageType>,
) -> Result<Vec<Message>, AppError> {
    let grant = policy::authorize(actor, Operation::ListTenantMessages, Target::ActorScope)?;
    db::list_inbox_for_tenant(state, grant.tenant, kind).await
}

pub async fn reply(state: &AppState, actor: Option<&Actor>, id: i64, text: &str) -> Result<Message, AppError> {
    let existing = db::get_message(state, id).await?;
    let grant = policy::authorize_owned(actor, Operation::ReplyMessage, existing.as_ref().map(|m| m.tenant_id))?;
    let mut message = existing.ok_or(AppError::NotFoundOrForbidden)?;

    message.apply_reply(text)?;
    let reply = message.reply.as_deref().unwrap_or_default();
    db::save_reply(state, id, grant.tenant, reply, message.status)
        .await?
        .ok_or(AppError::NotFoundOrForbidden)
}

/// Read transition. As with [`delete`], a `kind` the stored message does not
/// have is reported like a missing message.
pub async fn mark_read(
    state: &AppState,
    actor: Option<&Actor>,
    id: i64,
    kind: Option<MessageType>,
) -> Result<Message, AppError> {
    let existing = db::get_message(state, id).await?.filter(|m| of_kind(m, kind));
    let grant = policy::authorize_owned(actor, Operation::MarkMessageRead, existing.as_ref().map(|m| m.tenant_id))?;
    let mut message = existing.ok_or(AppError::NotFoundOrForbidden)?;

    if message.mark_read() {
        db::transition_status(state, id, grant.tenant, MessageStatus::Unread, MessageStatus::Read).await?;
    }
    db::get_message(state, id).await?.ok_or(AppError::NotFoundOrForbidden)
}

fn of_kind(message: &Message, kind: Option<MessageType>) -> bool {
    kind.map_or(true, |k| message.kind.message_type() == k)
}

/// Deletes a message. When `kind` is given the stored message must be of
/// that kind; a mismatch is reported like a missing message.
pub async fn delete(
    state: &AppState,
    actor: Option<&Actor>,
    id: i64,
    kind: Option<MessageType>,
) -> Result<(), AppError> {
    let existing = db::get_message(state, id).await?.filter(|m| of_kind(m, kind));
    let grant = policy::authorize_owned(actor, Operation::DeleteMessage, existing.as_ref().map(|m| m.tenant_id))?;
    let stored_kind = existing
        .map(|m| m.kind.message_type())
        .ok_or(AppError::NotFoundOrForbidden)?;
    match db::delete_message(state, id, grant.tenant, stored_kind).await? {
        0 => Err(AppError::NotFoundOrForbidden),
        _ => Ok(()),
    }
}
