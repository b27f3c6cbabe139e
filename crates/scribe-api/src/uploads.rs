use std::path::Path as FsPath;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use scribe_types::api::{Claims, UploadedFile};
use scribe_types::application::{ApplicationStatus, Certificate, SampleWork, StoredFile};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::storage::{SavedFile, extension};

const MB: usize = 1024 * 1024;

/// Upper bound on a whole multipart request, enforced by the router.
pub const MAX_UPLOAD_BODY: usize = 60 * MB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Cv,
    Samples,
    Certificates,
    Messages,
}

impl UploadCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cv" => Some(UploadCategory::Cv),
            "samples" => Some(UploadCategory::Samples),
            "certificates" => Some(UploadCategory::Certificates),
            "messages" => Some(UploadCategory::Messages),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCategory::Cv => "cv",
            UploadCategory::Samples => "samples",
            UploadCategory::Certificates => "certificates",
            UploadCategory::Messages => "messages",
        }
    }

    pub fn max_files(&self) -> usize {
        match self {
            UploadCategory::Cv => 1,
            UploadCategory::Samples => 5,
            UploadCategory::Certificates => 10,
            UploadCategory::Messages => 5,
        }
    }

    pub fn max_size(&self) -> usize {
        match self {
            UploadCategory::Cv | UploadCategory::Certificates => 5 * MB,
            UploadCategory::Samples | UploadCategory::Messages => 10 * MB,
        }
    }

    /// `None` accepts any file type.
    pub fn allowed_extensions(&self) -> Option<&'static [&'static str]> {
        match self {
            UploadCategory::Cv => Some(&["pdf", "doc", "docx"]),
            UploadCategory::Samples => Some(&["pdf", "doc", "docx", "txt"]),
            UploadCategory::Certificates => Some(&["pdf", "jpg", "jpeg", "png"]),
            UploadCategory::Messages => None,
        }
    }

    /// Whether files in this category are recorded on the writer's application.
    pub fn is_application_document(&self) -> bool {
        !matches!(self, UploadCategory::Messages)
    }

    pub fn check(&self, filename: &str, size: usize) -> Result<(), ApiError> {
        if size > self.max_size() {
            return Err(ApiError::PayloadTooLarge(format!(
                "{} exceeds the {} MB limit for {}",
                filename,
                self.max_size() / MB,
                self.as_str()
            )));
        }
        if let Some(allowed) = self.allowed_extensions() {
            let ok = extension(filename).is_some_and(|ext| allowed.contains(&ext.as_str()));
            if !ok {
                return Err(ApiError::BadRequest(format!(
                    "{} is not an accepted file type for {} (allowed: {})",
                    filename,
                    self.as_str(),
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Optional text fields sent alongside sample and certificate files.
#[derive(Debug, Default)]
struct Labels {
    title: Option<String>,
    subject: Option<String>,
    description: Option<String>,
}

/// POST /api/uploads/{category}
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(category): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let category = UploadCategory::parse(&category)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown upload category: {}", category)))?;
    if category.is_application_document() && claims.is_admin() {
        return Err(ApiError::Forbidden("only writers upload application documents"));
    }

    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut labels = Labels::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                if files.len() == category.max_files() {
                    return Err(ApiError::BadRequest(format!(
                        "at most {} file(s) may be uploaded as {}",
                        category.max_files(),
                        category.as_str()
                    )));
                }
                let data = field.bytes().await.map_err(multipart_error)?;
                category.check(&filename, data.len())?;
                files.push((filename, data.to_vec()));
            }
            None => {
                let name = field.name().map(str::to_string);
                let text = field.text().await.map_err(multipart_error)?;
                let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());
                match name.as_deref() {
                    Some("title") => labels.title = text,
                    Some("subject") => labels.subject = text,
                    Some("description") => labels.description = text,
                    _ => {}
                }
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("no files were uploaded".into()));
    }

    let mut saved = Vec::with_capacity(files.len());
    for (filename, data) in &files {
        match state.storage.save(category.as_str(), filename, data).await {
            Ok(file) => saved.push(file),
            Err(e) => {
                discard(&state, &saved).await;
                return Err(ApiError::Internal(e));
            }
        }
    }

    if category.is_application_document() {
        let writer = claims.sub;
        let recorded = saved.clone();
        let result = blocking(&state, move |db| {
            let mut app = db
                .get_application_by_writer(writer)?
                .ok_or(ApiError::NotFound("application"))?;
            if app.status != ApplicationStatus::Incomplete {
                return Err(ApiError::BadRequest("application has already been submitted".into()));
            }
            let replaced = record_documents(&mut app, category, &recorded, labels);
            db.update_application(&mut app)?;
            Ok(replaced)
        })
        .await;

        match result {
            Ok(Some(old_cv)) => {
                if let Err(e) = state.storage.delete_file(&old_cv.stored_path).await {
                    warn!("Could not remove replaced CV {}: {}", old_cv.stored_path, e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                discard(&state, &saved).await;
                return Err(e);
            }
        }
    }

    info!(
        "User {} uploaded {} file(s) to {}",
        claims.sub,
        saved.len(),
        category.as_str()
    );
    let body: Vec<UploadedFile> = saved
        .into_iter()
        .map(|f| UploadedFile {
            filename: f.filename,
            stored_path: f.stored_path,
            size: f.size,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(body)))
}

/// Attach saved files to the application. Returns the CV that was replaced, if any.
fn record_documents(
    app: &mut scribe_types::application::Application,
    category: UploadCategory,
    saved: &[SavedFile],
    labels: Labels,
) -> Option<StoredFile> {
    let mut replaced = None;
    for file in saved {
        let stored = StoredFile::new(file.filename.clone(), file.stored_path.clone());
        let title = labels.title.clone().unwrap_or_else(|| stem(&file.filename));
        match category {
            UploadCategory::Cv => replaced = app.attach_cv(stored),
            UploadCategory::Samples => app.add_sample_work(SampleWork {
                title,
                subject: labels.subject.clone(),
                description: labels.description.clone(),
                file: stored,
            }),
            UploadCategory::Certificates => app.add_certificate(Certificate {
                title,
                file: stored,
            }),
            UploadCategory::Messages => {}
        }
    }
    replaced
}

fn stem(filename: &str) -> String {
    FsPath::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

async fn discard(state: &AppState, saved: &[SavedFile]) {
    for file in saved {
        if let Err(e) = state.storage.delete_file(&file.stored_path).await {
            warn!("Could not remove {}: {}", file.stored_path, e);
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
