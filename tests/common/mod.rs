#![allow(dead_code)]

use std::sync::Arc;

use quotedesk::{
    config::Config,
    db::{self, NewUserRecord},
    mailer::{Mail, MemoryMailer},
    structs::{Actor, Role},
    utils::hash_password,
    AppState,
};

pub const SESSION_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Fresh in-memory database with migrations applied.
pub async fn setup() -> (AppState, Arc<MemoryMailer>) {
    let config = Config::with_session_key(SESSION_KEY);
    let db_pool = quotedesk::connect(&config.database_url).await.unwrap();
    quotedesk::migrate(&db_pool).await.unwrap();
    let mailer = Arc::new(MemoryMailer::default());
    let state = AppState {
        db_pool,
        config,
        mailer: mailer.clone(),
    };
    (state, mailer)
}

fn record(email: &str, role: Role, tenant_id: Option<i64>) -> NewUserRecord {
    NewUserRecord {
        tenant_id,
        role,
        email: email.to_owned(),
        // Never verified against; service tests skip the password path.
        pwd_hash: "unused".to_owned(),
        display_name: email.split('@').next().unwrap_or_default().to_owned(),
        phone_no: "9876543210".to_owned(),
        is_verified: true,
        logo: None,
        verify_token: None,
    }
}

pub async fn admin(state: &AppState, email: &str) -> Actor {
    db::create_user(state, record(email, Role::Admin, None))
        .await
        .unwrap()
        .actor()
}

pub async fn user(state: &AppState, tenant: &Actor, email: &str) -> Actor {
    db::create_user(state, record(email, Role::User, Some(tenant.id)))
        .await
        .unwrap()
        .actor()
}

/// A user whose tenant link is missing.
pub async fn orphan(state: &AppState, email: &str) -> Actor {
    db::create_user(state, record(email, Role::User, None))
        .await
        .unwrap()
        .actor()
}

/// A verified admin that can log in with `password`.
pub async fn admin_with_password(state: &AppState, email: &str, password: &str) -> Actor {
    let mut admin = record(email, Role::Admin, None);
    admin.pwd_hash = hash_password(password).unwrap();
    db::create_user(state, admin).await.unwrap().actor()
}

/// The six-digit code inside a password reset mail.
pub fn otp_in(mail: &Mail) -> String {
    let start = mail.html.find("<b>").unwrap() + 3;
    let end = mail.html[start..].find("</b>").unwrap() + start;
    mail.html[start..end].to_owned()
}
