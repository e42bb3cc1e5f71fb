use actix_identity::Identity;
use actix_web::{
    delete, get,
    http::{Method, StatusCode},
    post, put,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tera::Context;

use crate::{
    accounts::{self, ForgotPassword, Login, NewUser, OtpCheck, RegisterAdmin, ResetPassword, UserPatch, Verification},
    db,
    errors::AppError,
    messages::{self, ComplaintInput, QuotationNotifyInput},
    quote::LineRequest,
    rates::{self, RateInput, RatePatch},
    structs::{Actor, MessageType, User},
    AppState, TEMPLATES,
};

/// Resolves the session identity into an actor. A missing, unreadable or
/// stale identity (the account was deleted) yields `None`.
pub async fn current_actor(state: &AppState, identity: Option<Identity>) -> Result<Option<Actor>, AppError> {
    let Some(identity) = identity else {
        return Ok(None);
    };
    let id = match identity.id() {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Unreadable identity: {}", e);
            return Ok(None);
        }
    };
    let Ok(id) = id.parse::<i64>() else {
        return Ok(None);
    };
    Ok(db::get_user_by_id(state, id)
        .await?
        .filter(|u| u.is_verified)
        .map(|u| u.actor()))
}

fn done(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": message }))
}

fn html(rendered: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered)
}

// ---- auth ----

#[derive(Serialize)]
struct LoginResponse {
    user: User,
}

#[post("/auth/register")]
pub async fn register_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<RegisterAdmin>,
) -> Result<impl Responder, AppError> {
    accounts::register_admin(&state, form).await?;
    Ok(done("Registered. Check your email to verify your account."))
}

#[get("/auth/verify-email/{id}/{token}/{choice}")]
pub async fn verify_email_handler(
    state: Data<AppState>,
    path: web::Path<(i64, String, String)>,
) -> Result<impl Responder, AppError> {
    let (id, token, choice) = path.into_inner();
    let outcome = accounts::verify_email(&state, id, &token, &choice).await?;
    let (heading, detail) = match outcome {
        Verification::Verified => ("Your Email is Verified Successfully", ""),
        Verification::Declined => ("Verification Cancelled", "Account Deleted"),
        Verification::AlreadyVerified => ("Account Already Verified", "Nothing was changed"),
        Verification::UnknownAccount => ("Invalid Link", "This verification link is not valid"),
        Verification::InvalidChoice => ("Invalid Request", ""),
    };

    let mut context = Context::new();
    context.insert("heading", heading);
    context.insert("detail", detail);
    let rendered = TEMPLATES.render("verify_result.html", &context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;
    Ok(html(rendered))
}

#[post("/auth/forgot-password")]
pub async fn forgot_password_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<ForgotPassword>,
) -> Result<impl Responder, AppError> {
    accounts::request_password_otp(&state, &form).await?;
    Ok(done("If the account exists, an OTP has been sent to its email"))
}

#[post("/auth/verify-otp")]
pub async fn verify_otp_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<OtpCheck>,
) -> Result<impl Responder, AppError> {
    accounts::verify_password_otp(&state, &form).await?;
    Ok(done("OTP verified"))
}

#[post("/auth/reset-password")]
pub async fn reset_password_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<ResetPassword>,
) -> Result<impl Responder, AppError> {
    accounts::reset_password(&state, form).await?;
    Ok(done("Password reset successful"))
}

#[post("/auth/login")]
pub async fn login_handler(
    state: Data<AppState>,
    web::Json(form): web::Json<Login>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    let user = accounts::login(&state, &form).await?;
    // Create (remember) an identity session for the authenticated user
    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| AppError::IdentityError(e.to_string()))?;
    log::info!("User {} logged in", user.id);
    Ok(HttpResponse::Ok().json(LoginResponse { user }))
}

#[post("/auth/logout")]
pub async fn logout_handler(identity: Option<Identity>) -> impl Responder {
    if let Some(identity) = identity {
        identity.logout();
    }
    done("Logged out")
}

#[get("/auth/admin-logo/{id}")]
pub async fn admin_logo_handler(state: Data<AppState>, id: web::Path<i64>) -> Result<impl Responder, AppError> {
    let brand = accounts::admin_brand(&state, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(brand))
}

// ---- admin: user records ----

#[get("/admin/users")]
pub async fn list_users_handler(state: Data<AppState>, identity: Option<Identity>) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let users = accounts::list_users(&state, actor.as_ref()).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/admin/users/count")]
pub async fn count_users_handler(state: Data<AppState>, identity: Option<Identity>) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let count = accounts::count_users(&state, actor.as_ref()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

#[post("/admin/add-user")]
pub async fn add_user_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(form): web::Json<NewUser>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let user = accounts::add_user(&state, actor.as_ref(), form).await?;
    Ok(HttpResponse::Created().json(user))
}

#[get("/admin/single-user/{id}")]
pub async fn get_user_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let user = accounts::get_user(&state, actor.as_ref(), id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[put("/admin/edit-user/{id}")]
pub async fn edit_user_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
    web::Json(patch): web::Json<UserPatch>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let user = accounts::edit_user(&state, actor.as_ref(), id.into_inner(), patch).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/admin/delete-user/{id}")]
pub async fn delete_user_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    accounts::delete_user(&state, actor.as_ref(), id.into_inner()).await?;
    Ok(done("User deleted"))
}

// ---- rates ----

#[post("/rates")]
pub async fn create_rate_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(input): web::Json<RateInput>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let item = rates::create(&state, actor.as_ref(), input).await?;
    Ok(HttpResponse::Created().json(item))
}

#[get("/rates")]
pub async fn list_rates_handler(state: Data<AppState>, identity: Option<Identity>) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let items = rates::list(&state, actor.as_ref()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[put("/rates/{id}")]
pub async fn update_rate_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
    web::Json(patch): web::Json<RatePatch>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let item = rates::update(&state, actor.as_ref(), id.into_inner(), patch).await?;
    Ok(HttpResponse::Ok().json(item))
}

#[delete("/rates/{id}")]
pub async fn delete_rate_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    rates::delete(&state, actor.as_ref(), id.into_inner()).await?;
    Ok(done("Deleted"))
}

// ---- messages ----

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ReplyForm {
    reply: String,
}

#[post("/messages/send")]
pub async fn send_complaint_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(input): web::Json<ComplaintInput>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let message = messages::submit_complaint(&state, actor.as_ref(), input).await?;
    Ok(HttpResponse::Created().json(message))
}

#[post("/messages/quotation-notify")]
pub async fn quotation_notify_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(input): web::Json<QuotationNotifyInput>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let message = messages::submit_quotation_notification(&state, actor.as_ref(), input).await?;
    Ok(HttpResponse::Created().json(message))
}

#[get("/messages/my-messages")]
pub async fn my_messages_handler(state: Data<AppState>, identity: Option<Identity>) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let list = messages::list_mine(&state, actor.as_ref()).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/messages/admin/messages")]
pub async fn admin_complaints_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let list = messages::list_for_tenant(&state, actor.as_ref(), Some(MessageType::Complaint)).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[put("/messages/reply/{id}")]
pub async fn reply_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
    web::Json(form): web::Json<ReplyForm>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let updated = messages::reply(&state, actor.as_ref(), id.into_inner(), &form.reply).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Reply sent", "updated": updated })))
}

#[delete("/messages/delete/{id}")]
pub async fn delete_complaint_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    messages::delete(&state, actor.as_ref(), id.into_inner(), Some(MessageType::Complaint)).await?;
    Ok(done("Message deleted successfully"))
}

#[get("/messages/admin/quotations")]
pub async fn admin_quotations_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let list = messages::list_for_tenant(&state, actor.as_ref(), Some(MessageType::Quotation)).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[put("/messages/admin/quotations/read/{id}")]
pub async fn mark_quotation_read_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let updated = messages::mark_read(&state, actor.as_ref(), id.into_inner(), Some(MessageType::Quotation)).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Marked as read", "updated": updated })))
}

#[delete("/messages/admin/quotations/{id}")]
pub async fn delete_quotation_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    messages::delete(&state, actor.as_ref(), id.into_inner(), Some(MessageType::Quotation)).await?;
    Ok(done("Quotation notification deleted"))
}

// ---- quotation ----

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QuoteRequest {
    lines: Vec<LineRequest>,
    discount_percent: f64,
}

#[post("/quotation/price")]
pub async fn price_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(request): web::Json<QuoteRequest>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let draft = rates::price_quote(&state, actor.as_ref(), &request.lines, request.discount_percent).await?;
    Ok(HttpResponse::Ok().json(draft.receipt()))
}

#[post("/quotation/receipt")]
pub async fn receipt_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    web::Json(request): web::Json<QuoteRequest>,
) -> Result<impl Responder, AppError> {
    let actor = current_actor(&state, identity).await?;
    let draft = rates::price_quote(&state, actor.as_ref(), &request.lines, request.discount_percent).await?;
    let brand = match actor.as_ref().and_then(Actor::scope) {
        Some(tenant) => accounts::admin_brand(&state, tenant).await?,
        None => return Err(AppError::Unauthenticated),
    };

    let mut context = Context::new();
    context.insert("brand", &brand.name);
    context.insert("logo", &brand.logo);
    context.insert("date", &chrono::Local::now().format("%d/%m/%Y").to_string());
    context.insert("receipt", &draft.receipt());
    let rendered = TEMPLATES.render("receipt.html", &context).map_err(|e| {
        log::error!("Failed to render template: {}", e);
        AppError::TemplateError(e)
    })?;
    Ok(html(rendered))
}

pub async fn default_handler(req_method: Method) -> HttpResponse {
    match req_method {
        Method::GET => HttpResponse::build(StatusCode::NOT_FOUND)
            .json(json!({ "kind": "not_found", "message": "Not found" })),
        _ => HttpResponse::MethodNotAllowed().finish(),
    }
}

/// Registers every route plus JSON body handling on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(8 * 1024 * 1024)
            .error_handler(|err, _req| AppError::validation(err.to_string()).into()),
    )
    .service(register_handler)
    .service(verify_email_handler)
    .service(forgot_password_handler)
    .service(verify_otp_handler)
    .service(reset_password_handler)
    .service(login_handler)
    .service(logout_handler)
    .service(admin_logo_handler)
    .service(count_users_handler)
    .service(list_users_handler)
    .service(add_user_handler)
    .service(get_user_handler)
    .service(edit_user_handler)
    .service(delete_user_handler)
    .service(create_rate_handler)
    .service(list_rates_handler)
    .service(update_rate_handler)
    .service(delete_rate_handler)
    .service(send_complaint_handler)
    .service(quotation_notify_handler)
    .service(my_messages_handler)
    .service(admin_complaints_handler)
    .service(reply_handler)
    .service(delete_complaint_handler)
    .service(admin_quotations_handler)
    .service(mark_quotation_read_handler)
    .service(delete_quotation_handler)
    .service(price_handler)
    .service(receipt_handler);
}
