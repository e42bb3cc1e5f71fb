//! Account lifecycle and tenant membership.
//!
//! Admins register themselves and confirm by mail; users are created by
//! their admin, already verified and linked to that admin's tenant.
//! Anyone with an account can reset a forgotten password with a mailed
//! one-time code.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{self, NewUserRecord, UserChanges},
    errors::AppError,
    mailer::Mail,
    policy::{self, Operation, Target},
    structs::{Actor, Role, User},
    utils::{hash_password, normalize_email, only_digits, random_otp, random_token, validate_image, verify_password},
    AppState,
};

const MIN_PASSWORD_LEN: usize = 12;
const MAX_PASSWORD_LEN: usize = 128;
const PHONE_DIGITS: usize = 10;

pub const OTP_TTL_SECS: i64 = 5 * 60;
pub const OTP_RESEND_SECS: i64 = 60;
pub const OTP_MAX_ATTEMPTS: i64 = 5;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_no: String,
    pub country_code: Option<String>,
    #[serde(alias = "logoBase64")]
    pub logo: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_no: String,
    pub country_code: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_no: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ForgotPassword {
    pub email: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct OtpCheck {
    pub email: String,
    pub otp: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPassword {
    pub email: String,
    pub otp: String,
    #[serde(alias = "newPassword")]
    pub password: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Declined,
    AlreadyVerified,
    UnknownAccount,
    InvalidChoice,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminBrand {
    pub name: String,
    pub logo: Option<String>,
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = normalize_email(email);
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace),
        None => false,
    };
    if !valid {
        return Err(AppError::validation("Invalid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn validate_phone(phone_no: &str, country_code: Option<&str>) -> Result<String, AppError> {
    let digits = only_digits(phone_no);
    if digits.len() != PHONE_DIGITS {
        return Err(AppError::validation("Phone must be 10 digits"));
    }
    Ok(format!("{}{}", country_code.unwrap_or_default().trim(), digits))
}

async fn ensure_email_free(state: &AppState, email: &str, except: Option<i64>) -> Result<(), AppError> {
    match db::get_user_by_email(state, email).await? {
        Some(existing) if Some(existing.id) != except => Err(AppError::EmailTaken),
        _ => Ok(()),
    }
}

pub async fn register_admin(state: &AppState, input: RegisterAdmin) -> Result<User, AppError> {
    let email = validate_email(&input.email)?;
    validate_password(&input.password)?;
    let phone_no = validate_phone(&input.phone_no, input.country_code.as_deref())?;
    let logo = match input.logo.filter(|l| !l.is_empty()) {
        Some(logo) => {
            validate_image(&logo)?;
            Some(logo)
        }
        None => None,
    };
    ensure_email_free(state, &email, None).await?;

    let token = random_token();
    let admin = db::create_user(
        state,
        NewUserRecord {
            tenant_id: None,
            role: Role::Admin,
            email,
            pwd_hash: hash_password(&input.password)?,
            display_name: input.name.trim().to_owned(),
            phone_no,
            is_verified: false,
            logo,
            verify_token: Some(token.clone()),
        },
    )
    .await?;

    let link = format!(
        "{}/verify-email/{}/{}",
        state.config.frontend_url.trim_end_matches('/'),
        admin.id,
        token
    );
    let mut context = tera::Context::new();
    context.insert("name", &admin.display_name);
    context.insert("yes_url", &format!("{}/yes", link));
    context.insert("no_url", &format!("{}/no", link));
    let html = crate::TEMPLATES.render("verify_mail.html", &context)?;
    state.mailer.send(Mail {
        to: admin.email.clone(),
        subject: "Verify Your Account".to_owned(),
        html,
    });
    Ok(admin)
}

/// Handles the yes/no answer from the verification mail. The link must
/// carry the token that was mailed with it; any other token reads as an
/// unknown account. Declining deletes the account, but only while it is
/// still unverified.
pub async fn verify_email(state: &AppState, id: i64, token: &str, choice: &str) -> Result<Verification, AppError> {
    let Some(user) = db::get_user_by_id(state, id)
        .await?
        .filter(|u| u.role == Role::Admin)
        .filter(|u| !token.is_empty() && u.verify_token.as_deref() == Some(token))
    else {
        log::warn!("Verification link for account {} rejected", id);
        return Ok(Verification::UnknownAccount);
    };
    match choice {
        "yes" => {
            db::set_user_verified(state, id).await?;
            log::info!("Admin {} verified", id);
            Ok(Verification::Verified)
        }
        "no" if user.is_verified => Ok(Verification::AlreadyVerified),
        "no" => match db::delete_unverified_admin(state, id).await? {
            0 => Ok(Verification::AlreadyVerified),
            _ => Ok(Verification::Declined),
        },
        _ => Ok(Verification::InvalidChoice),
    }
}

pub async fn login(state: &AppState, input: &Login) -> Result<User, AppError> {
    let email = normalize_email(&input.email);
    let user = db::get_user_by_email(state, &email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(&input.password, &user.pwd_hash)? {
        log::warn!("Failed login for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_verified {
        return Err(AppError::AccountNotVerified);
    }
    Ok(user)
}

pub async fn admin_brand(state: &AppState, admin_id: i64) -> Result<AdminBrand, AppError> {
    let admin = db::get_user_by_id(state, admin_id)
        .await?
        .filter(|u| u.role == Role::Admin)
        .ok_or(AppError::NotFoundOrForbidden)?;
    Ok(AdminBrand {
        name: admin.display_name,
        logo: admin.logo,
    })
}

pub async fn add_user(state: &AppState, actor: Option<&Actor>, input: NewUser) -> Result<User, AppError> {
    let grant = policy::authorize(actor, Operation::AddUser, Target::ActorScope)?;
    let email = validate_email(&input.email)?;
    validate_password(&input.password)?;
    let phone_no = validate_phone(&input.phone_no, input.country_code.as_deref())?;
    ensure_email_free(state, &email, None).await?;

    db::create_user(
        state,
        NewUserRecord {
            tenant_id: Some(grant.tenant),
            role: Role::User,
            email,
            pwd_hash: hash_password(&input.password)?,
            display_name: input.name.trim().to_owned(),
            phone_no,
            is_verified: true,
            logo: None,
            verify_token: None,
        },
    )
    .await
}

pub async fn list_users(state: &AppState, actor: Option<&Actor>) -> Result<Vec<User>, AppError> {
    let grant = policy::authorize(actor, Operation::ListUsers, Target::ActorScope)?;
    db::list_users_for_tenant(state, grant.tenant).await
}

pub async fn count_users(state: &AppState, actor: Option<&Actor>) -> Result<i64, AppError> {
    let grant = policy::authorize(actor, Operation::ListUsers, Target::ActorScope)?;
    db::count_users_for_tenant(state, grant.tenant).await
}

/// Loads a user record the actor manages. Admins are never managed records:
/// they have no tenant link, so they read as missing.
async fn managed_user<'a>(
    state: &AppState,
    actor: Option<&'a Actor>,
    id: i64,
) -> Result<(policy::Grant<'a>, Option<User>), AppError> {
    let user = db::get_user_by_id(state, id).await?;
    let grant = policy::authorize_owned(actor, Operation::ManageUser, user.as_ref().and_then(|u| u.tenant_id))?;
    Ok((grant, user))
}

pub async fn get_user(state: &AppState, actor: Option<&Actor>, id: i64) -> Result<User, AppError> {
    let (_, user) = managed_user(state, actor, id).await?;
    user.ok_or(AppError::NotFoundOrForbidden)
}

pub async fn edit_user(state: &AppState, actor: Option<&Actor>, id: i64, patch: UserPatch) -> Result<User, AppError> {
    let (grant, existing) = managed_user(state, actor, id).await?;
    let existing = existing.ok_or(AppError::NotFoundOrForbidden)?;

    let email = patch.email.as_deref().map(validate_email).transpose()?;
    if let Some(email) = &email {
        ensure_email_free(state, email, Some(existing.id)).await?;
    }
    let phone_no = patch
        .phone_no
        .as_deref()
        .map(|p| validate_phone(p, patch.country_code.as_deref()))
        .transpose()?;
    let pwd_hash = match patch.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        email,
        pwd_hash,
        display_name: patch.name.map(|n| n.trim().to_owned()),
        phone_no,
    };
    db::update_user(state, id, grant.tenant, changes)
        .await?
        .ok_or(AppError::NotFoundOrForbidden)
}

pub async fn delete_user(state: &AppState, actor: Option<&Actor>, id: i64) -> Result<(), AppError> {
    let (grant, _) = managed_user(state, actor, id).await?;
    match db::delete_user(state, id, grant.tenant).await? {
        0 => Err(AppError::NotFoundOrForbidden),
        _ => Ok(()),
    }
}

/// Creates the distinguished bootstrap admin when a password is configured
/// and the account does not exist yet.
pub async fn ensure_bootstrap_admin(state: &AppState) -> Result<Option<User>, AppError> {
    let Some(password) = state.config.default_admin_password.as_deref() else {
        return Ok(None);
    };
    let email = normalize_email(&state.config.default_admin_email);
    if db::get_user_by_email(state, &email).await?.is_some() {
        return Ok(None);
    }
    let admin = db::create_user(
        state,
        NewUserRecord {
            tenant_id: None,
            role: Role::Admin,
            email,
            pwd_hash: hash_password(password)?,
            display_name: "Super Admin".to_owned(),
            phone_no: String::new(),
            is_verified: true,
            logo: None,
            verify_token: None,
        },
    )
    .await?;
    log::info!("Default admin created");
    Ok(Some(admin))
}

/// Mails a fresh reset code to `email`. Unknown addresses get the same
/// answer as known ones and no mail. A new code may be requested once the
/// previous one is a minute old; it replaces the old code.
pub async fn request_password_otp(state: &AppState, input: &ForgotPassword) -> Result<(), AppError> {
    let email = normalize_email(&input.email);
    let Some(user) = db::get_user_by_email(state, &email).await? else {
        log::info!("Password reset requested for an unknown address");
        return Ok(());
    };

    let now = Utc::now();
    if let Some(previous) = db::get_password_otp(state, &user.email).await? {
        let resend_at = db::parse_timestamp(&previous.created_at)? + Duration::seconds(OTP_RESEND_SECS);
        if resend_at > now {
            return Err(AppError::OtpCooldown {
                retry_after: (resend_at - now).num_seconds().max(1),
            });
        }
    }

    let code = random_otp();
    db::replace_password_otp(
        state,
        &user.email,
        &hash_password(&code)?,
        &db::timestamp(now),
        &db::timestamp(now + Duration::seconds(OTP_TTL_SECS)),
    )
    .await?;

    let mut context = tera::Context::new();
    context.insert("name", &user.display_name);
    context.insert("code", &code);
    context.insert("minutes", &(OTP_TTL_SECS / 60));
    let html = crate::TEMPLATES.render("otp_mail.html", &context)?;
    state.mailer.send(Mail {
        to: user.email.clone(),
        subject: "Your OTP Code".to_owned(),
        html,
    });
    log::info!("Password reset code issued for user {}", user.id);
    Ok(())
}

/// Checks `code` against the stored one without consuming it. Expired codes
/// and codes with too many wrong guesses are dropped.
async fn check_otp(state: &AppState, email: &str, code: &str) -> Result<(), AppError> {
    let stored = db::get_password_otp(state, email).await?.ok_or(AppError::InvalidOtp)?;
    if db::parse_timestamp(&stored.expires_at)? <= Utc::now() || stored.attempts >= OTP_MAX_ATTEMPTS {
        db::delete_password_otp(state, email).await?;
        return Err(AppError::InvalidOtp);
    }
    if !verify_password(code.trim(), &stored.code_hash)? {
        db::record_otp_attempt(state, email).await?;
        return Err(AppError::InvalidOtp);
    }
    Ok(())
}

pub async fn verify_password_otp(state: &AppState, input: &OtpCheck) -> Result<(), AppError> {
    check_otp(state, &normalize_email(&input.email), &input.otp).await
}

/// Sets a new password for the account behind a valid code. The code is
/// used up.
pub async fn reset_password(state: &AppState, input: ResetPassword) -> Result<(), AppError> {
    let email = normalize_email(&input.email);
    validate_password(&input.password)?;
    check_otp(state, &email, &input.otp).await?;
    let user = db::get_user_by_email(state, &email)
        .await?
        .ok_or(AppError::InvalidOtp)?;
    db::set_user_password(state, user.id, &hash_password(&input.password)?).await?;
    db::delete_password_otp(state, &email).await?;
    Ok(())
}
