use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{
    Application, ApplicationStatus, Degree, DocumentKind, Education, Expertise, LanguageProficiency,
    RejectionReason, TestAnswer,
};
use crate::earning::{Currency, Earning, PaymentMethod};
use crate::message::{Attachment, MessageType, Priority};
use crate::stats::EarningsStats;
use crate::user::{AccountStatus, EducationalBackground, Role, User};

// -- JWT Claims --

/// JWT claims. The actor identity for every mutation comes from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub registration_step: u8,
    pub application: Option<ApplicationSummary>,
}

impl UserSummary {
    pub fn new(user: &User, application: Option<&Application>) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
            status: user.status,
            email_verified: user.email_verified,
            registration_step: user.registration_step,
            application: application.map(ApplicationSummary::from),
        }
    }
}

/// Everything about a user except credentials and pending tokens.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub role: Role,
    pub educational_background: EducationalBackground,
    pub subject_expertise: Vec<String>,
    pub writing_experience: u32,
    pub bio: Option<String>,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub rating: f64,
    pub completed_jobs: u32,
    pub total_earnings: f64,
    pub last_login: Option<DateTime<Utc>>,
    pub registration_step: u8,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            country: user.country.clone(),
            role: user.role,
            educational_background: user.educational_background.clone(),
            subject_expertise: user.subject_expertise.clone(),
            writing_experience: user.writing_experience,
            bio: user.bio.clone(),
            status: user.status,
            email_verified: user.email_verified,
            rating: user.rating,
            completed_jobs: user.completed_jobs,
            total_earnings: user.total_earnings,
            last_login: user.last_login,
            registration_step: user.registration_step,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
    pub application: Option<ApplicationSummary>,
    pub earnings: Option<EarningsStats>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAccountStatusRequest {
    pub status: AccountStatus,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

// -- Applications --

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub current_step: u8,
    pub status: ApplicationStatus,
    pub completion_percentage: u8,
}

impl From<&Application> for ApplicationSummary {
    fn from(app: &Application) -> Self {
        Self {
            current_step: app.current_step,
            status: app.status,
            completion_percentage: app.completion_percentage(),
        }
    }
}

/// Full application plus its derived fields.
#[derive(Debug, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub completion_percentage: u8,
    pub is_complete: bool,
}

impl From<Application> for ApplicationView {
    fn from(application: Application) -> Self {
        Self {
            completion_percentage: application.completion_percentage(),
            is_complete: application.is_complete(),
            application,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EducationRequest {
    pub highest_degree: Degree,
    pub field_of_study: String,
    pub university: String,
    pub graduation_year: i32,
    pub gpa: Option<f64>,
    #[serde(default)]
    pub additional_certifications: Vec<String>,
}

impl From<EducationRequest> for Education {
    fn from(req: EducationRequest) -> Self {
        Self {
            highest_degree: Some(req.highest_degree),
            field_of_study: Some(req.field_of_study),
            university: Some(req.university),
            graduation_year: Some(req.graduation_year),
            gpa: req.gpa,
            additional_certifications: req.additional_certifications,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpertiseRequest {
    pub primary_subjects: Vec<String>,
    #[serde(default)]
    pub secondary_subjects: Vec<String>,
    pub writing_experience: u32,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub language_proficiency: Vec<LanguageProficiency>,
}

impl From<ExpertiseRequest> for Expertise {
    fn from(req: ExpertiseRequest) -> Self {
        Self {
            primary_subjects: req.primary_subjects,
            secondary_subjects: req.secondary_subjects,
            writing_experience: Some(req.writing_experience),
            specializations: req.specializations,
            language_proficiency: req.language_proficiency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepCheckResponse {
    pub step: u8,
    pub ready: bool,
    pub problem: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartTestRequest {
    pub test_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteTestRequest {
    #[serde(default)]
    pub answers: Vec<TestAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeTestRequest {
    pub score: u8,
    pub feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    pub reason: RejectionReason,
    pub details: Option<String>,
    /// Days before the writer may apply again. Omitted means no waiting period.
    pub reapply_after_days: Option<u32>,
    #[serde(default = "default_true")]
    pub can_reapply: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoldRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteRequest {
    pub content: String,
    pub is_internal: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentRequest {
    pub rating: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub recommendations: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyDocumentRequest {
    pub kind: DocumentKind,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationListQuery {
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: ApplicationStatus,
    pub count: u64,
}

// -- Earnings --

/// Earning plus its live derived amounts.
#[derive(Debug, Serialize)]
pub struct EarningView {
    #[serde(flatten)]
    pub earning: Earning,
    pub final_amount: f64,
    pub net_payment: f64,
}

impl From<Earning> for EarningView {
    fn from(earning: Earning) -> Self {
        Self {
            final_amount: earning.final_amount(),
            net_payment: earning.net_payment(),
            earning,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEarningRequest {
    pub writer_id: Uuid,
    pub job_id: Uuid,
    pub amount: f64,
    #[serde(default)]
    pub currency: Currency,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkPaidRequest {
    pub method: PaymentMethod,
    pub transaction_id: String,
    #[serde(default)]
    pub processing_fee: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustmentRequest {
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentNoteRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityRequest {
    pub rating: Option<f64>,
    pub completed_on_time: bool,
    #[serde(default)]
    pub revision_requests: u32,
}

#[derive(Debug, Deserialize)]
pub struct EarningsRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    pub year: Option<i32>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub subject: String,
    pub content: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub message_type: MessageType,
    pub related_job: Option<Uuid>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

// -- Uploads --

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub stored_path: String,
    pub size: u64,
}
