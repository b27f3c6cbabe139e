use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Datelike, Utc};
use tracing::info;
use uuid::Uuid;

use scribe_db::{Database, earnings, users};
use scribe_types::api::{
    AdjustmentRequest, Claims, CreateEarningRequest, EarningView, EarningsRangeQuery,
    MarkPaidRequest, MonthlyQuery, PaymentNoteRequest, QualityRequest,
};
use scribe_types::earning::Earning;
use scribe_types::stats::{EarningsStats, MonthlyEarnings};
use scribe_types::user::{Role, User};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

// -- Writer --

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(range): Query<EarningsRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, move |db| {
        Ok(db.earnings_for_writer(claims.sub, range.from, range.to)?)
    })
    .await?;
    Ok(Json(views(list)))
}

pub async fn my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(range): Query<EarningsRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, move |db| {
        Ok(db.earnings_for_writer(claims.sub, range.from, range.to)?)
    })
    .await?;
    Ok(Json(EarningsStats::from_earnings(&list)))
}

pub async fn my_monthly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MonthlyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let list = blocking(&state, move |db| {
        Ok(db.earnings_for_writer(claims.sub, None, None)?)
    })
    .await?;
    Ok(Json(MonthlyEarnings::for_year(&list, year)))
}

/// Writers may only read their own earnings; admins may read any.
pub async fn get_one(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = blocking(&state, move |db| load(db, id)).await?;
    if !claims.is_admin() && earning.writer_id != claims.sub {
        return Err(ApiError::Forbidden("not your earning"));
    }
    Ok(Json(EarningView::from(earning)))
}

// -- Admin --

/// Record what a writer is owed for a completed job.
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEarningRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = blocking(&state, move |db| {
        let mut writer = db
            .get_user(req.writer_id)?
            .filter(|u| u.role == Role::Writer)
            .ok_or(ApiError::NotFound("writer"))?;
        let mut earning = Earning::new(req.writer_id, req.job_id, req.amount, req.currency)?;
        earning.notes = req.notes;
        writer.record_completed_job();

        db.with_tx(|tx| {
            earnings::insert(tx, &earning)?;
            users::update(tx, &mut writer)
        })?;
        Ok(earning)
    })
    .await?;

    info!(
        "Admin {} recorded earning {} for writer {} (job {}, {})",
        claims.sub, earning.id, earning.writer_id, earning.job_id, earning.amount
    );
    Ok((StatusCode::CREATED, Json(EarningView::from(earning))))
}

pub async fn pending(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, |db| Ok(db.pending_payments()?)).await?;
    Ok(Json(views(list)))
}

pub async fn for_writer(
    State(state): State<AppState>,
    Path(writer_id): Path<Uuid>,
    Query(range): Query<EarningsRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, move |db| {
        Ok(db.earnings_for_writer(writer_id, range.from, range.to)?)
    })
    .await?;
    Ok(Json(views(list)))
}

pub async fn writer_stats(
    State(state): State<AppState>,
    Path(writer_id): Path<Uuid>,
    Query(range): Query<EarningsRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, move |db| {
        Ok(db.earnings_for_writer(writer_id, range.from, range.to)?)
    })
    .await?;
    Ok(Json(EarningsStats::from_earnings(&list)))
}

/// Mark paid and credit the writer's lifetime total with the final amount.
/// Paying again swaps the earlier credit for the new one.
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkPaidRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.transaction_id.trim().is_empty() {
        return Err(ApiError::BadRequest("transaction id is required".into()));
    }
    let earning = with_writer(&state, id, move |earning, writer| {
        let previous = earning.credited_amount();
        earning.mark_as_paid(req.method, req.transaction_id, req.processing_fee)?;
        if let Some(previous) = previous {
            writer.debit_earnings(previous);
        }
        if let Some(credited) = earning.credited_amount() {
            writer.credit_earnings(credited);
        }
        Ok(())
    })
    .await?;

    info!(
        "Admin {} marked earning {} paid (net {:?})",
        claims.sub, earning.id, earning.payment_details.net_amount
    );
    Ok(Json(EarningView::from(earning)))
}

pub async fn mark_processing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = update(&state, id, |e| Ok(e.mark_processing()?)).await?;
    info!("Earning {} is processing", earning.id);
    Ok(Json(EarningView::from(earning)))
}

pub async fn mark_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = update(&state, id, move |e| Ok(e.mark_failed(req.reason)?)).await?;
    info!("Earning {} payment failed", earning.id);
    Ok(Json(EarningView::from(earning)))
}

/// Refund a paid earning and take back exactly what it was credited with.
pub async fn refund(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = with_writer(&state, id, move |earning, writer| {
        let credited = earning.credited_amount();
        earning.refund(req.reason)?;
        if let Some(credited) = credited {
            writer.debit_earnings(credited);
        }
        Ok(())
    })
    .await?;
    info!("Admin {} refunded earning {}", claims.sub, earning.id);
    Ok(Json(EarningView::from(earning)))
}

pub async fn add_bonus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = claims.sub;
    let earning = update(&state, id, move |e| {
        Ok(e.add_bonus(req.amount, req.reason, admin)?)
    })
    .await?;
    info!("Admin {} set bonus {} on earning {}", admin, earning.bonus_amount(), earning.id);
    Ok(Json(EarningView::from(earning)))
}

pub async fn add_deduction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = claims.sub;
    let earning = update(&state, id, move |e| {
        Ok(e.add_deduction(req.amount, req.reason, admin)?)
    })
    .await?;
    info!(
        "Admin {} added deduction on earning {} (total deductions {})",
        admin,
        earning.id,
        earning.total_deductions()
    );
    Ok(Json(EarningView::from(earning)))
}

pub async fn generate_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = update(&state, id, |e| {
        e.generate_invoice();
        Ok(())
    })
    .await?;
    if let Some(invoice) = &earning.invoice {
        info!("Generated invoice {} for earning {}", invoice.invoice_number, earning.id);
    }
    Ok(Json(EarningView::from(earning)))
}

/// Record quality metrics and refresh the writer's rating as the mean of
/// all their rated earnings.
pub async fn set_quality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<QualityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = blocking(&state, move |db| {
        let mut earning = load(db, id)?;
        earning.set_quality(req.rating, req.completed_on_time, req.revision_requests)?;
        let mut writer = load_writer(db, &earning)?;

        db.with_tx(|tx| {
            earnings::update(tx, &mut earning)?;
            let all = earnings::for_writer(tx, writer.id, None, None)?;
            if let Some(mean) = EarningsStats::from_earnings(&all).average_rating {
                writer.set_rating(mean)?;
            }
            users::update(tx, &mut writer)
        })?;
        Ok(earning)
    })
    .await?;
    Ok(Json(EarningView::from(earning)))
}

pub async fn request_revision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let earning = update(&state, id, |e| {
        e.request_revision();
        Ok(())
    })
    .await?;
    Ok(Json(EarningView::from(earning)))
}

// -- Helpers --

fn views(list: Vec<Earning>) -> Vec<EarningView> {
    list.into_iter().map(EarningView::from).collect()
}

fn load(db: &Database, id: Uuid) -> Result<Earning, ApiError> {
    db.get_earning(id)?.ok_or(ApiError::NotFound("earning"))
}

fn load_writer(db: &Database, earning: &Earning) -> Result<User, ApiError> {
    db.get_user(earning.writer_id)?
        .ok_or(ApiError::NotFound("writer"))
}

async fn update<F>(state: &AppState, id: Uuid, f: F) -> Result<Earning, ApiError>
where
    F: FnOnce(&mut Earning) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut earning = load(db, id)?;
        f(&mut earning)?;
        db.update_earning(&mut earning)?;
        Ok(earning)
    })
    .await
}

/// Update an earning together with its writer's metrics.
async fn with_writer<F>(state: &AppState, id: Uuid, f: F) -> Result<Earning, ApiError>
where
    F: FnOnce(&mut Earning, &mut User) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut earning = load(db, id)?;
        let mut writer = load_writer(db, &earning)?;
        f(&mut earning, &mut writer)?;
        db.with_tx(|tx| {
            earnings::update(tx, &mut earning)?;
            users::update(tx, &mut writer)
        })?;
        Ok(earning)
    })
    .await
}
