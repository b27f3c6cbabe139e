//! Onboarding workflow endpoints.
//!
//! Writers work on their own application under `/api/applications/me`.
//! Reviewers act on any application under `/api/admin/applications`; the
//! reviewer id recorded on every mutation is the caller's token subject.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use scribe_db::{Database, applications, users};
use scribe_types::api::{
    ApplicationListQuery, ApplicationView, ApproveRequest, AssessmentRequest, Claims,
    CompleteTestRequest, EducationRequest, ExpertiseRequest, GradeTestRequest, HoldRequest,
    NoteRequest, RejectRequest, StartTestRequest, StatusCount, StepCheckResponse,
    VerifyDocumentRequest,
};
use scribe_types::application::{Application, ApplicationStatus, Assessment, Education, Expertise};
use scribe_types::user::{AccountStatus, EducationalBackground, User};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

// -- Writer --

pub async fn get_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let app = blocking(&state, move |db| own_application(db, claims.sub)).await?;
    Ok(Json(writer_view(app)))
}

pub async fn check_step(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(step): Path<u8>,
) -> Result<impl IntoResponse, ApiError> {
    let app = blocking(&state, move |db| own_application(db, claims.sub)).await?;
    let problem = app.check_step(step).err().map(|e| e.to_string());
    Ok(Json(StepCheckResponse {
        step,
        ready: problem.is_none(),
        problem,
    }))
}

pub async fn set_education(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EducationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let education = Education::from(req);
    let app = edit_with_profile(&state, claims.sub, move |app, user| {
        app.set_education(education)?;
        let e = &app.education;
        user.educational_background = EducationalBackground {
            degree: e
                .highest_degree
                .and_then(|d| serde_json::to_value(d).ok())
                .and_then(|v| v.as_str().map(str::to_string)),
            field_of_study: e.field_of_study.clone(),
            university: e.university.clone(),
            graduation_year: e.graduation_year,
        };
        Ok(())
    })
    .await?;
    Ok(Json(writer_view(app)))
}

pub async fn set_expertise(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ExpertiseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expertise = Expertise::from(req);
    let app = edit_with_profile(&state, claims.sub, move |app, user| {
        user.subject_expertise = expertise.primary_subjects.clone();
        user.writing_experience = expertise.writing_experience.unwrap_or_default();
        app.set_expertise(expertise);
        Ok(())
    })
    .await?;
    Ok(Json(writer_view(app)))
}

/// Validate the current step, then move to the next one.
pub async fn advance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let app = edit_with_profile(&state, claims.sub, |app, user| {
        app.check_step(app.current_step)?;
        if !app.advance_step() {
            return Err(ApiError::BadRequest("already at the final step".into()));
        }
        user.registration_step = app.current_step;
        Ok(())
    })
    .await?;

    info!("Application {} advanced to step {}", app.id, app.current_step);
    Ok(Json(writer_view(app)))
}

pub async fn start_writing_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = edit_own(&state, claims.sub, move |app| {
        Ok(app.start_writing_test(req.test_id)?)
    })
    .await?;
    info!(
        "Application {} started writing test (attempt {})",
        app.id, app.writing_test.attempts
    );
    Ok(Json(writer_view(app)))
}

pub async fn complete_writing_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = edit_own(&state, claims.sub, move |app| {
        Ok(app.complete_writing_test(req.answers)?)
    })
    .await?;
    info!("Application {} completed writing test", app.id);
    Ok(Json(writer_view(app)))
}

/// Run every step check, then submit.
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let app = edit_own(&state, claims.sub, |app| {
        app.check_all_steps()?;
        Ok(app.submit()?)
    })
    .await?;
    info!("Application {} submitted", app.id);
    Ok(Json(writer_view(app)))
}

// -- Admin --

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ApplicationListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let apps = blocking(&state, move |db| Ok(db.list_applications(query.status)?)).await?;
    Ok(Json(apps.into_iter().map(ApplicationView::from).collect::<Vec<_>>()))
}

/// Submitted applications, first come first served.
pub async fn pending(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let apps = blocking(&state, |db| Ok(db.pending_reviews()?)).await?;
    Ok(Json(apps.into_iter().map(ApplicationView::from).collect::<Vec<_>>()))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let counts = blocking(&state, |db| Ok(db.count_applications_by_status()?)).await?;
    let body: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    Ok(Json(body))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let app = blocking(&state, move |db| {
        db.get_application(id)?.ok_or(ApiError::NotFound("application"))
    })
    .await?;
    Ok(Json(ApplicationView::from(app)))
}

pub async fn start_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = review(&state, id, move |app| Ok(app.start_review(reviewer)?)).await?;
    info!("Application {} under review by {}", app.id, reviewer);
    Ok(Json(ApplicationView::from(app)))
}

pub async fn hold(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<HoldRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = review(&state, id, move |app| Ok(app.put_on_hold(reviewer, req.note)?)).await?;
    info!("Application {} put on hold by {}", app.id, reviewer);
    Ok(Json(ApplicationView::from(app)))
}

pub async fn resume(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = review(&state, id, move |app| Ok(app.resume_review(reviewer)?)).await?;
    info!("Application {} back under review by {}", app.id, reviewer);
    Ok(Json(ApplicationView::from(app)))
}

/// Approve from any status and mark the writer's account approved.
pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = decide(&state, id, AccountStatus::Approved, move |app| {
        Ok(app.approve(reviewer, req.notes)?)
    })
    .await?;
    info!("Application {} approved by {}", app.id, reviewer);
    Ok(Json(ApplicationView::from(app)))
}

/// Reject from any status and mark the writer's account rejected.
pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = decide(&state, id, AccountStatus::Rejected, move |app| {
        app.reject(reviewer, req.reason, req.details)?;
        let reapply_after = req
            .reapply_after_days
            .map(|days| Utc::now() + Duration::days(i64::from(days)));
        app.set_reapplication(req.can_reapply, reapply_after);
        Ok(())
    })
    .await?;
    info!(
        "Application {} rejected by {} ({:?})",
        app.id, reviewer, app.rejection_reason
    );
    Ok(Json(ApplicationView::from(app)))
}

pub async fn add_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("note content is required".into()));
    }
    let author = claims.sub;
    let app = review(&state, id, move |app| {
        app.add_note(author, req.content, req.is_internal.unwrap_or(true));
        Ok(())
    })
    .await?;
    Ok(Json(ApplicationView::from(app)))
}

pub async fn assess(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewer = claims.sub;
    let app = review(&state, id, move |app| {
        Ok(app.record_assessment(
            reviewer,
            Assessment {
                rating: req.rating,
                strengths: req.strengths,
                weaknesses: req.weaknesses,
                recommendations: req.recommendations,
            },
        )?)
    })
    .await?;
    Ok(Json(ApplicationView::from(app)))
}

pub async fn verify_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = review(&state, id, move |app| Ok(app.verify_document(req.kind, req.index)?)).await?;
    Ok(Json(ApplicationView::from(app)))
}

pub async fn grade_writing_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GradeTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let app = review(&state, id, move |app| {
        Ok(app.grade_writing_test(req.score, req.feedback)?)
    })
    .await?;
    info!("Application {} writing test graded {:?}", app.id, app.writing_test.score);
    Ok(Json(ApplicationView::from(app)))
}

// -- Helpers --

fn own_application(db: &Database, writer: Uuid) -> Result<Application, ApiError> {
    db.get_application_by_writer(writer)?
        .ok_or(ApiError::NotFound("application"))
}

fn ensure_editable(app: &Application) -> Result<(), ApiError> {
    if app.status != ApplicationStatus::Incomplete {
        return Err(ApiError::BadRequest("application has already been submitted".into()));
    }
    Ok(())
}

/// Writers never see internal reviewer notes.
fn writer_view(mut app: Application) -> ApplicationView {
    app.notes = app.external_notes().cloned().collect();
    ApplicationView::from(app)
}

async fn edit_own<F>(state: &AppState, writer: Uuid, f: F) -> Result<Application, ApiError>
where
    F: FnOnce(&mut Application) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut app = own_application(db, writer)?;
        ensure_editable(&app)?;
        f(&mut app)?;
        db.update_application(&mut app)?;
        Ok(app)
    })
    .await
}

/// Like [`edit_own`], also saving the writer's profile in the same transaction.
async fn edit_with_profile<F>(state: &AppState, writer: Uuid, f: F) -> Result<Application, ApiError>
where
    F: FnOnce(&mut Application, &mut User) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut app = own_application(db, writer)?;
        ensure_editable(&app)?;
        let mut user = db.get_user(writer)?.ok_or(ApiError::NotFound("user"))?;
        f(&mut app, &mut user)?;
        db.with_tx(|tx| {
            applications::update(tx, &mut app)?;
            users::update(tx, &mut user)
        })?;
        Ok(app)
    })
    .await
}

async fn review<F>(state: &AppState, id: Uuid, f: F) -> Result<Application, ApiError>
where
    F: FnOnce(&mut Application) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut app = db.get_application(id)?.ok_or(ApiError::NotFound("application"))?;
        f(&mut app)?;
        db.update_application(&mut app)?;
        Ok(app)
    })
    .await
}

/// A final decision: update the application and the writer's account together.
async fn decide<F>(
    state: &AppState,
    id: Uuid,
    account: AccountStatus,
    f: F,
) -> Result<Application, ApiError>
where
    F: FnOnce(&mut Application) -> Result<(), ApiError> + Send + 'static,
{
    blocking(state, move |db| {
        let mut app = db.get_application(id)?.ok_or(ApiError::NotFound("application"))?;
        let mut writer = db
            .get_user(app.writer_id)?
            .ok_or(ApiError::NotFound("user"))?;
        f(&mut app)?;
        writer.set_status(account);
        db.with_tx(|tx| {
            applications::update(tx, &mut app)?;
            users::update(tx, &mut writer)
        })?;
        Ok(app)
    })
    .await
}
