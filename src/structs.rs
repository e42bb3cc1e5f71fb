use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::AppError;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Serialize, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub tenant_id: Option<i64>,
    pub role: Role,
    pub email: String,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
    pub display_name: String,
    pub phone_no: String,
    pub is_verified: bool,
    pub logo: Option<String>,
    /// Secret carried by the admin verification link.
    #[serde(skip)]
    pub verify_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// Hand-written so the password hash and link token never reach the logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("role", &self.role)
            .field("email", &self.email)
            .field("is_verified", &self.is_verified)
            .finish_non_exhaustive()
    }
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            tenant_id: self.tenant_id,
        }
    }
}

/// The identity performing an operation. Every service call receives it
/// explicitly; nothing in the core reads session state on its own.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub tenant_id: Option<i64>,
}

impl Actor {
    pub fn admin(id: i64) -> Self {
        Actor {
            id,
            role: Role::Admin,
            tenant_id: None,
        }
    }

    pub fn user(id: i64, tenant_id: i64) -> Self {
        Actor {
            id,
            role: Role::User,
            tenant_id: Some(tenant_id),
        }
    }

    /// The tenant this actor operates in: its own id for an admin, the
    /// linked admin for a user. `None` only for a user record that lost
    /// its tenant link.
    pub fn scope(&self) -> Option<i64> {
        match self.role {
            Role::Admin => Some(self.id),
            Role::User => self.tenant_id,
        }
    }
}

/// Pending password reset code for one email. Only the argon2 hash of the
/// code is stored.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordOtp {
    pub email: String,
    pub code_hash: String,
    pub attempts: i64,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RateCardItem {
    pub id: i64,
    pub tenant_id: i64,
    pub item_name: String,
    pub unit_rate: f64,
    pub description: String,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Complaint,
    Quotation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Complaint => "complaint",
            MessageType::Quotation => "quotation",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageStatus {
    Unread,
    Read,
    Answered,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotationItem {
    pub name: String,
    pub length: f64,
    pub height: f64,
    pub unit_rate: f64,
    pub line_total: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotationPayload {
    pub items: Vec<QuotationItem>,
    pub grand_total: f64,
    pub generated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Complaint,
    #[serde(rename = "quotation")]
    QuotationNotification { quotation: QuotationPayload },
}

impl MessageKind {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageKind::Complaint => MessageType::Complaint,
            MessageKind::QuotationNotification { .. } => MessageType::Quotation,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub tenant_id: i64,
    pub category: String,
    pub title: String,
    pub body: String,
    pub reply: Option<String>,
    pub status: MessageStatus,
    pub created_at: String,
    #[serde(flatten)]
    pub kind: MessageKind,
    /// Filled in on the admin inbox listings only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Storage shape of a message; `quotation` holds the JSON payload of the
/// quotation variant.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub user_id: i64,
    pub tenant_id: i64,
    pub kind: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub quotation: Option<String>,
    pub reply: Option<String>,
    pub status: MessageStatus,
    pub created_at: String,
    #[sqlx(default)]
    pub author_name: Option<String>,
    #[sqlx(default)]
    pub author_email: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.quotation) {
            ("complaint", _) => MessageKind::Complaint,
            ("quotation", Some(raw)) => MessageKind::QuotationNotification {
                quotation: serde_json::from_str(&raw)?,
            },
            (other, _) => {
                return Err(AppError::Corrupt(format!(
                    "message {} has unusable kind {:?}",
                    row.id, other
                )))
            }
        };
        let author = match (row.author_name, row.author_email) {
            (Some(name), Some(email)) => Some(Author { name, email }),
            _ => None,
        };
        Ok(Message {
            id: row.id,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            category: row.category,
            title: row.title,
            body: row.body,
            reply: row.reply,
            status: row.status,
            created_at: row.created_at,
            kind,
            author,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, quotation: Option<&str>) -> MessageRow {
        MessageRow {
            id: 7,
            user_id: 2,
            tenant_id: 1,
            kind: kind.to_owned(),
            category: "General".to_owned(),
            title: "t".to_owned(),
            body: "b".to_owned(),
            quotation: quotation.map(str::to_owned),
            reply: None,
            status: MessageStatus::Unread,
            created_at: "2025-06-01T00:00:00Z".to_owned(),
            author_name: None,
            author_email: None,
        }
    }

    #[test]
    fn actor_scope_follows_role() {
        assert_eq!(Actor::admin(4).scope(), Some(4));
        assert_eq!(Actor::user(9, 4).scope(), Some(4));
        let orphan = Actor {
            id: 9,
            role: Role::User,
            tenant_id: None,
        };
        assert_eq!(orphan.scope(), None);
    }

    #[test]
    fn complaint_row_becomes_complaint_variant() {
        let msg = Message::try_from(row("complaint", None)).unwrap();
        assert_eq!(msg.kind, MessageKind::Complaint);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "complaint");
        assert_eq!(json["status"], "unread");
        assert!(json.get("author").is_none());
    }

    #[test]
    fn joined_author_is_attached() {
        let mut joined = row("complaint", None);
        joined.author_name = Some("Asha".to_owned());
        joined.author_email = Some("asha@gmail.com".to_owned());
        let msg = Message::try_from(joined).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["author"]["name"], "Asha");
        assert_eq!(json["author"]["email"], "asha@gmail.com");
    }

    #[test]
    fn quotation_row_decodes_payload() {
        let raw = r#"{"items":[{"name":"Tile","length":2.0,"height":3.0,"unitRate":50.0,"lineTotal":300.0}],"grandTotal":300.0,"generatedAt":"2025-06-01T00:00:00Z"}"#;
        let msg = Message::try_from(row("quotation", Some(raw))).unwrap();
        match &msg.kind {
            MessageKind::QuotationNotification { quotation } => {
                assert_eq!(quotation.items.len(), 1);
                assert_eq!(quotation.grand_total, 300.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(msg.kind.message_type(), MessageType::Quotation);
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "quotation");
    }

    #[test]
    fn unknown_kind_is_reported_not_guessed() {
        assert!(Message::try_from(row("memo", None)).is_err());
        assert!(Message::try_from(row("quotation", None)).is_err());
    }

    #[test]
    fn user_json_hides_password_hash() {
        let user = User {
            id: 1,
            tenant_id: None,
            role: Role::Admin,
            email: "a@gmail.com".to_owned(),
            pwd_hash: "secret".to_owned(),
            display_name: "A".to_owned(),
            phone_no: String::new(),
            is_verified: true,
            logo: None,
            verify_token: Some("link-token".to_owned()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("link-token"));
        assert!(!format!("{user:?}").contains("secret"));
        assert!(!format!("{user:?}").contains("link-token"));
    }
}
