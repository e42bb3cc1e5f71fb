use crate::{
    errors::AppError,
    structs::{Message, MessageRow, MessageStatus, MessageType, PasswordOtp, QuotationPayload, RateCardItem, Role, User},
    AppState,
};

/// Fixed-width UTC timestamps, so text order is time order.
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn now() -> String {
    timestamp(chrono::Utc::now())
}

pub fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&chrono::Utc))
        .map_err(|e| AppError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

fn unique_email(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::EmailTaken,
        _ => AppError::SqlxError(e),
    }
}

// ---- users ----

pub struct NewUserRecord {
    pub tenant_id: Option<i64>,
    pub role: Role,
    pub email: String,
    pub pwd_hash: String,
    pub display_name: String,
    pub phone_no: String,
    pub is_verified: bool,
    pub logo: Option<String>,
    pub verify_token: Option<String>,
}

#[derive(Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub pwd_hash: Option<String>,
    pub display_name: Option<String>,
    pub phone_no: Option<String>,
}

pub async fn get_user_by_id(state: &AppState, id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn create_user(state: &AppState, record: NewUserRecord) -> Result<User, AppError> {
    let created_at = now();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (tenant_id, role, email, pwd_hash, display_name, phone_no, is_verified, logo, verify_token, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
    )
    .bind(record.tenant_id)
    .bind(record.role)
    .bind(record.email)
    .bind(record.pwd_hash)
    .bind(record.display_name)
    .bind(record.phone_no)
    .bind(record.is_verified)
    .bind(record.logo)
    .bind(record.verify_token)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await
    .map_err(unique_email)?;
    log::info!("User created: {:?}", user);
    Ok(user)
}

pub async fn list_users_for_tenant(state: &AppState, tenant_id: i64) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE tenant_id = $1 AND role = 'user' ORDER BY created_at DESC, id DESC",
    )
    .bind(tenant_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(users)
}

pub async fn count_users_for_tenant(state: &AppState, tenant_id: i64) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND role = 'user'")
        .bind(tenant_id)
        .fetch_one(&state.db_pool)
        .await?;
    Ok(count)
}

pub async fn set_user_verified(state: &AppState, id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = $1 WHERE id = $2 AND role = 'admin'")
        .bind(now())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    Ok(result.rows_affected())
}

/// Replaces the password of any account, admin or user.
pub async fn set_user_password(state: &AppState, id: i64, pwd_hash: &str) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE users SET pwd_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(pwd_hash)
        .bind(now())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Password reset for user {} ({} rows)", id, result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn delete_unverified_admin(state: &AppState, id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role = 'admin' AND is_verified = FALSE")
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    if result.rows_affected() > 0 {
        log::info!("Unverified admin {} deleted", id);
    }
    Ok(result.rows_affected())
}

/// Applies only the supplied fields, in one statement scoped to the tenant.
pub async fn update_user(
    state: &AppState,
    id: i64,
    tenant_id: i64,
    changes: UserChanges,
) -> Result<Option<User>, AppError> {
    // We'll build the query and bind parameters in order
    let mut param_index = 2;
    let mut query = String::from("UPDATE users SET updated_at = $1");
    let updated_at = now();

    let columns = [
        ("email", &changes.email),
        ("pwd_hash", &changes.pwd_hash),
        ("display_name", &changes.display_name),
        ("phone_no", &changes.phone_no),
    ];
    for (column, value) in columns.iter() {
        if value.is_some() {
            query.push_str(&format!(", {} = ${}", column, param_index));
            param_index += 1;
        }
    }
    query.push_str(&format!(
        " WHERE id = ${} AND tenant_id = ${} AND role = 'user' RETURNING *",
        param_index,
        param_index + 1
    ));

    let mut q = sqlx::query_as::<_, User>(&query).bind(&updated_at);
    for (_, value) in columns.iter() {
        if let Some(value) = value {
            q = q.bind(value);
        }
    }
    let user = q
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(unique_email)?;

    if let Some(user) = &user {
        log::info!("User updated: {:?}", user);
    }
    Ok(user)
}

pub async fn delete_user(state: &AppState, id: i64, tenant_id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND tenant_id = $2 AND role = 'user'")
        .bind(id)
        .bind(tenant_id)
        .execute(&state.db_pool)
        .await?;
    log::info!("User with id {} deleted ({} rows)", id, result.rows_affected());
    Ok(result.rows_affected())
}

// ---- password reset codes ----

pub async fn get_password_otp(state: &AppState, email: &str) -> Result<Option<PasswordOtp>, AppError> {
    let otp = sqlx::query_as::<_, PasswordOtp>("SELECT * FROM password_otps WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(otp)
}

/// Stores a fresh code for `email`, replacing any earlier one and its attempt count.
pub async fn replace_password_otp(
    state: &AppState,
    email: &str,
    code_hash: &str,
    created_at: &str,
    expires_at: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO password_otps (email, code_hash, attempts, created_at, expires_at) VALUES ($1, $2, 0, $3, $4) \
         ON CONFLICT(email) DO UPDATE SET code_hash = excluded.code_hash, attempts = 0, \
         created_at = excluded.created_at, expires_at = excluded.expires_at",
    )
    .bind(email)
    .bind(code_hash)
    .bind(created_at)
    .bind(expires_at)
    .execute(&state.db_pool)
    .await?;
    Ok(())
}

pub async fn record_otp_attempt(state: &AppState, email: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE password_otps SET attempts = attempts + 1 WHERE email = $1")
        .bind(email)
        .execute(&state.db_pool)
        .await?;
    Ok(())
}

pub async fn delete_password_otp(state: &AppState, email: &str) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM password_otps WHERE email = $1")
        .bind(email)
        .execute(&state.db_pool)
        .await?;
    Ok(result.rows_affected())
}

// ---- rates ----

pub struct NewRate {
    pub item_name: String,
    pub unit_rate: f64,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Default)]
pub struct RateChanges {
    pub item_name: Option<String>,
    pub unit_rate: Option<f64>,
    pub description: Option<String>,
    pub image: Option<String>,
}

pub async fn insert_rate(state: &AppState, tenant_id: i64, rate: NewRate) -> Result<RateCardItem, AppError> {
    let created_at = now();
    let item = sqlx::query_as::<_, RateCardItem>(
        "INSERT INTO rates (tenant_id, item_name, unit_rate, description, image, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(tenant_id)
    .bind(rate.item_name)
    .bind(rate.unit_rate)
    .bind(rate.description)
    .bind(rate.image)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("Rate {} created for tenant {}", item.id, tenant_id);
    Ok(item)
}

pub async fn list_rates(state: &AppState, tenant_id: i64) -> Result<Vec<RateCardItem>, AppError> {
    let items = sqlx::query_as::<_, RateCardItem>("SELECT * FROM rates WHERE tenant_id = $1 ORDER BY item_name, id")
        .bind(tenant_id)
        .fetch_all(&state.db_pool)
        .await?;
    Ok(items)
}

pub async fn get_rate(state: &AppState, id: i64) -> Result<Option<RateCardItem>, AppError> {
    let item = sqlx::query_as::<_, RateCardItem>("SELECT * FROM rates WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(item)
}

pub async fn update_rate(
    state: &AppState,
    id: i64,
    tenant_id: i64,
    changes: RateChanges,
) -> Result<Option<RateCardItem>, AppError> {
    let mut param_index = 2;
    let mut query = String::from("UPDATE rates SET updated_at = $1");
    let updated_at = now();

    let mut push = |column: &str, present: bool| {
        if present {
            query.push_str(&format!(", {} = ${}", column, param_index));
            param_index += 1;
        }
    };
    push("item_name", changes.item_name.is_some());
    push("unit_rate", changes.unit_rate.is_some());
    push("description", changes.description.is_some());
    push("image", changes.image.is_some());
    query.push_str(&format!(
        " WHERE id = ${} AND tenant_id = ${} RETURNING *",
        param_index,
        param_index + 1
    ));

    let mut q = sqlx::query_as::<_, RateCardItem>(&query).bind(&updated_at);
    if let Some(item_name) = &changes.item_name {
        q = q.bind(item_name);
    }
    if let Some(unit_rate) = changes.unit_rate {
        q = q.bind(unit_rate);
    }
    if let Some(description) = &changes.description {
        q = q.bind(description);
    }
    if let Some(image) = &changes.image {
        q = q.bind(image);
    }
    let item = q.bind(id).bind(tenant_id).fetch_optional(&state.db_pool).await?;

    if item.is_some() {
        log::info!("Rate {} updated for tenant {}", id, tenant_id);
    }
    Ok(item)
}

pub async fn delete_rate(state: &AppState, id: i64, tenant_id: i64) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM rates WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Rate with id {} deleted ({} rows)", id, result.rows_affected());
    Ok(result.rows_affected())
}

// ---- messages ----

pub struct NewMessage {
    pub user_id: i64,
    pub tenant_id: i64,
    pub category: String,
    pub title: String,
    pub body: String,
    pub quotation: Option<QuotationPayload>,
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
    rows.into_iter().map(Message::try_from).collect()
}

pub async fn insert_message(state: &AppState, message: NewMessage) -> Result<Message, AppError> {
    let kind = match message.quotation {
        Some(_) => MessageType::Quotation,
        None => MessageType::Complaint,
    };
    let quotation = message.quotation.as_ref().map(serde_json::to_string).transpose()?;
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (user_id, tenant_id, kind, category, title, body, quotation, status, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(message.user_id)
    .bind(message.tenant_id)
    .bind(kind.as_str())
    .bind(message.category)
    .bind(message.title)
    .bind(message.body)
    .bind(quotation)
    .bind(MessageStatus::Unread)
    .bind(now())
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("Message {} ({}) created for tenant {}", row.id, row.kind, row.tenant_id);
    Message::try_from(row)
}

pub async fn get_message(state: &AppState, id: i64) -> Result<Option<Message>, AppError> {
    let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    row.map(Message::try_from).transpose()
}

pub async fn list_messages_by_author(state: &AppState, user_id: i64) -> Result<Vec<Message>, AppError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT * FROM messages WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;
    into_messages(rows)
}

/// Newest first, each with the author's name and email.
pub async fn list_inbox_for_tenant(
    state: &AppState,
    tenant_id: i64,
    kind: Option<MessageType>,
) -> Result<Vec<Message>, AppError> {
    let mut query = String::from(
        "SELECT m.*, u.display_name AS author_name, u.email AS author_email \
         FROM messages m LEFT JOIN users u ON u.id = m.user_id WHERE m.tenant_id = $1",
    );
    if kind.is_some() {
        query.push_str(" AND m.kind = $2");
    }
    query.push_str(" ORDER BY m.created_at DESC, m.id DESC");

    let mut q = sqlx::query_as::<_, MessageRow>(&query).bind(tenant_id);
    if let Some(kind) = kind {
        q = q.bind(kind.as_str());
    }
    let rows = q.fetch_all(&state.db_pool).await?;
    into_messages(rows)
}

/// Persists reply text and status together.
pub async fn save_reply(
    state: &AppState,
    id: i64,
    tenant_id: i64,
    reply: &str,
    status: MessageStatus,
) -> Result<Option<Message>, AppError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "UPDATE messages SET reply = $1, status = $2 WHERE id = $3 AND tenant_id = $4 RETURNING *",
    )
    .bind(reply)
    .bind(status)
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(&state.db_pool)
    .await?;
    row.map(Message::try_from).transpose()
}

/// Moves `from` to `to`; a message no longer in `from` is left alone.
pub async fn transition_status(
    state: &AppState,
    id: i64,
    tenant_id: i64,
    from: MessageStatus,
    to: MessageStatus,
) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE messages SET status = $1 WHERE id = $2 AND tenant_id = $3 AND status = $4")
        .bind(to)
        .bind(id)
        .bind(tenant_id)
        .bind(from)
        .execute(&state.db_pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_message(state: &AppState, id: i64, tenant_id: i64, kind: MessageType) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND tenant_id = $2 AND kind = $3")
        .bind(id)
        .bind(tenant_id)
        .bind(kind.as_str())
        .execute(&state.db_pool)
        .await?;
    log::info!("Message with id {} deleted ({} rows)", id, result.rows_affected());
    Ok(result.rows_affected())
}
