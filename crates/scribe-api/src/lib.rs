pub mod applications;
pub mod auth;
pub mod cleanup;
pub mod earnings;
pub mod error;
pub mod mail;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod storage;
pub mod uploads;


use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use serde_json::{Value, json};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Body for endpoints that only report success.
pub(crate) fn message(text: &str) -> Json<Value> {
    Json(json!({ "success": true, "message": text }))
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(|| async { message("ok") }))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify-email", post(auth::verify_email))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/resend-verification", post(auth::resend_verification))
        .route("/api/auth/update-password", put(auth::update_password))
        .route("/api/auth/profile", put(auth::update_profile))
        // Writer's own application
        .route("/api/applications/me", get(applications::get_mine))
        .route("/api/applications/me/steps/{step}/check", get(applications::check_step))
        .route("/api/applications/me/education", put(applications::set_education))
        .route("/api/applications/me/expertise", put(applications::set_expertise))
        .route("/api/applications/me/advance", post(applications::advance))
        .route("/api/applications/me/writing-test/start", post(applications::start_writing_test))
        .route(
            "/api/applications/me/writing-test/complete",
            post(applications::complete_writing_test),
        )
        .route("/api/applications/me/submit", post(applications::submit))
        // Earnings
        .route("/api/earnings/me", get(earnings::list_mine))
        .route("/api/earnings/me/stats", get(earnings::my_stats))
        .route("/api/earnings/me/monthly", get(earnings::my_monthly))
        .route("/api/earnings/{id}", get(earnings::get_one))
        // Messages
        .route("/api/messages", post(messages::send))
        .route("/api/messages/inbox", get(messages::inbox))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/conversation/{user_id}", get(messages::conversation))
        .route("/api/messages/{id}", get(messages::get_one).delete(messages::delete))
        .route("/api/messages/{id}/read", put(messages::mark_read))
        .route("/api/messages/{id}/replies", get(messages::replies))
        // Uploads
        .route(
            "/api/uploads/{category}",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_BODY)),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/users", get(auth::list_users))
        .route("/api/admin/users/{id}/status", put(auth::set_user_status))
        // Review
        .route("/api/admin/applications", get(applications::list))
        .route("/api/admin/applications/pending", get(applications::pending))
        .route("/api/admin/applications/stats", get(applications::stats))
        .route("/api/admin/applications/{id}", get(applications::get_one))
        .route("/api/admin/applications/{id}/start-review", post(applications::start_review))
        .route("/api/admin/applications/{id}/hold", post(applications::hold))
        .route("/api/admin/applications/{id}/resume", post(applications::resume))
        .route("/api/admin/applications/{id}/approve", post(applications::approve))
        .route("/api/admin/applications/{id}/reject", post(applications::reject))
        .route("/api/admin/applications/{id}/notes", post(applications::add_note))
        .route("/api/admin/applications/{id}/assessment", post(applications::assess))
        .route("/api/admin/applications/{id}/documents/verify", post(applications::verify_document))
        .route(
            "/api/admin/applications/{id}/writing-test/grade",
            post(applications::grade_writing_test),
        )
        // Payments
        .route("/api/admin/earnings", post(earnings::create))
        .route("/api/admin/earnings/pending", get(earnings::pending))
        .route("/api/admin/earnings/{id}/pay", post(earnings::mark_paid))
        .route("/api/admin/earnings/{id}/processing", post(earnings::mark_processing))
        .route("/api/admin/earnings/{id}/failed", post(earnings::mark_failed))
        .route("/api/admin/earnings/{id}/refund", post(earnings::refund))
        .route("/api/admin/earnings/{id}/bonus", post(earnings::add_bonus))
        .route("/api/admin/earnings/{id}/deductions", post(earnings::add_deduction))
        .route("/api/admin/earnings/{id}/invoice", post(earnings::generate_invoice))
        .route("/api/admin/earnings/{id}/quality", put(earnings::set_quality))
        .route("/api/admin/earnings/{id}/revision-request", post(earnings::request_revision))
        .route("/api/admin/writers/{id}/earnings", get(earnings::for_writer))
        .route("/api/admin/writers/{id}/earnings/stats", get(earnings::writer_stats))
        .layer(from_fn(middleware::require_admin))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
