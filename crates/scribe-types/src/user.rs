use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, ensure_range};

pub const MAX_BIO_LEN: usize = 500;
pub const MIN_PASSWORD_LEN: usize = 6;

const VERIFICATION_TTL_HOURS: i64 = 24;
const RESET_TTL_MINUTES: i64 = 60;
const RESET_TOKEN_LEN: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Writer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Writer => "writer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account standing, driven by admin review of the writer's application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Approved => "approved",
            AccountStatus::Rejected => "rejected",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationalBackground {
    pub degree: Option<String>,
    pub field_of_study: Option<String>,
    pub university: Option<String>,
    pub graduation_year: Option<i32>,
}

/// A one-time secret that has been handed out. Only the digest is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToken {
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingToken {
    fn matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.digest == token_digest(token)
    }
}

/// Fields supplied at registration.
#[derive(Debug, Clone)]
pub struct NewWriter {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
}

/// Profile edits. Omitted fields are left alone; a blank `bio` clears it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub country: String,
    pub role: Role,

    pub educational_background: EducationalBackground,
    #[serde(default)]
    pub subject_expertise: Vec<String>,
    #[serde(default)]
    pub writing_experience: u32,
    pub bio: Option<String>,

    pub status: AccountStatus,
    pub email_verified: bool,
    pub email_verification: Option<PendingToken>,
    pub password_reset: Option<PendingToken>,

    pub rating: f64,
    pub completed_jobs: u32,
    pub total_earnings: f64,

    pub last_login: Option<DateTime<Utc>>,
    pub registration_step: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Storage revision, maintained by the persistence layer.
    #[serde(skip)]
    pub revision: i64,
}

impl User {
    pub fn new_writer(input: NewWriter, password_hash: String) -> DomainResult<Self> {
        Self::build(input, password_hash, Role::Writer)
    }

    pub fn new_admin(input: NewWriter, password_hash: String) -> DomainResult<Self> {
        let mut user = Self::build(input, password_hash, Role::Admin)?;
        user.status = AccountStatus::Approved;
        user.email_verified = true;
        Ok(user)
    }

    fn build(input: NewWriter, password_hash: String, role: Role) -> DomainResult<Self> {
        let first_name = required("first name", &input.first_name)?;
        let last_name = required("last name", &input.last_name)?;
        let phone = required("phone number", &input.phone)?;
        let country = required("country", &input.country)?;
        let email = normalize_email(&input.email)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email,
            password_hash,
            phone,
            country,
            role,
            educational_background: EducationalBackground::default(),
            subject_expertise: Vec::new(),
            writing_experience: 0,
            bio: None,
            status: AccountStatus::Pending,
            email_verified: false,
            email_verification: None,
            password_reset: None,
            rating: 0.0,
            completed_jobs: 0,
            total_earnings: 0.0,
            last_login: None,
            registration_step: 1,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_suspended(&self) -> bool {
        self.status == AccountStatus::Suspended
    }

    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_login = Some(now);
    }

    pub fn set_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    /// Validate every change first, then apply them all.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> DomainResult<()> {
        let first_name = update.first_name.map(|v| required("first name", &v)).transpose()?;
        let last_name = update.last_name.map(|v| required("last name", &v)).transpose()?;
        let phone = update.phone.map(|v| required("phone number", &v)).transpose()?;
        let country = update.country.map(|v| required("country", &v)).transpose()?;
        if let Some(bio) = update.bio {
            let bio = Some(bio.trim().to_string()).filter(|b| !b.is_empty());
            self.set_bio(bio)?;
        }

        if let Some(v) = first_name {
            self.first_name = v;
        }
        if let Some(v) = last_name {
            self.last_name = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = country {
            self.country = v;
        }
        Ok(())
    }

    pub fn set_bio(&mut self, bio: Option<String>) -> DomainResult<()> {
        if let Some(text) = &bio {
            if text.chars().count() > MAX_BIO_LEN {
                return Err(DomainError::validation(format!(
                    "bio must be at most {} characters",
                    MAX_BIO_LEN
                )));
            }
        }
        self.bio = bio;
        Ok(())
    }

    /// Issue a fresh 6-digit email verification code, replacing any earlier one.
    /// The plain code is returned for delivery and never stored.
    pub fn issue_email_verification(&mut self, now: DateTime<Utc>) -> String {
        let code = rand::rng().random_range(100_000..1_000_000).to_string();
        self.email_verification = Some(PendingToken {
            digest: token_digest(&code),
            expires_at: now + Duration::hours(VERIFICATION_TTL_HOURS),
        });
        code
    }

    pub fn verify_email(&mut self, code: &str, now: DateTime<Utc>) -> DomainResult<()> {
        if self.email_verified {
            return Err(DomainError::validation("email already verified"));
        }
        match &self.email_verification {
            Some(pending) if pending.matches(code, now) => {
                self.email_verified = true;
                self.email_verification = None;
                Ok(())
            }
            _ => Err(DomainError::validation("invalid or expired verification code")),
        }
    }

    /// Issue a password reset token valid for one hour.
    pub fn issue_password_reset(&mut self, now: DateTime<Utc>) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();
        self.password_reset = Some(PendingToken {
            digest: token_digest(&token),
            expires_at: now + Duration::minutes(RESET_TTL_MINUTES),
        });
        token
    }

    /// Swap in a new password hash if `token` is the live reset token.
    pub fn reset_password(
        &mut self,
        token: &str,
        new_hash: String,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        match &self.password_reset {
            Some(pending) if pending.matches(token, now) => {
                self.password_hash = new_hash;
                self.password_reset = None;
                Ok(())
            }
            _ => Err(DomainError::validation("invalid or expired reset token")),
        }
    }

    /// Digest of the outstanding reset token, used as a lookup key.
    pub fn reset_digest(&self) -> Option<&str> {
        self.password_reset.as_ref().map(|p| p.digest.as_str())
    }

    /// Replace the performance rating, e.g. with the mean of earning ratings.
    pub fn set_rating(&mut self, rating: f64) -> DomainResult<()> {
        ensure_range("rating", rating, 0.0, 5.0)?;
        self.rating = rating;
        Ok(())
    }

    pub fn record_completed_job(&mut self) {
        self.completed_jobs += 1;
    }

    pub fn credit_earnings(&mut self, amount: f64) {
        self.total_earnings += amount;
    }

    pub fn debit_earnings(&mut self, amount: f64) {
        self.total_earnings = (self.total_earnings - amount).max(0.0);
    }
}

/// SHA-256 hex digest used to store one-time tokens.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Trim and lowercase an email address, rejecting malformed ones.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(DomainError::validation("please provide a valid email"))
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let word = |c: char| c.is_alphanumeric() || c == '_';
    if !local.chars().all(|c| word(c) || c == '.' || c == '-') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    if !labels.iter().all(|l| l.chars().all(|c| word(c) || c == '-')) {
        return false;
    }
    let tld = labels[labels.len() - 1];
    (2..=3).contains(&tld.len()) && tld.chars().all(word)
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(DomainError::validation(format!("{} is required", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewWriter {
        NewWriter {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            email: "  Ada@Example.COM ".into(),
            phone: "+44 20 0000 0000".into(),
            country: "UK".into(),
        }
    }

    #[test]
    fn new_writer_normalizes_fields() {
        let user = User::new_writer(input(), "hash".into()).unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.full_name(), "Ada Lovelace");
        assert_eq!(user.role, Role::Writer);
        assert_eq!(user.status, AccountStatus::Pending);
        assert_eq!(user.registration_step, 1);
        assert!(!user.email_verified);
    }

    #[test]
    fn rejects_bad_email_and_missing_fields() {
        let mut bad = input();
        bad.email = "not-an-email".into();
        assert!(User::new_writer(bad, "h".into()).is_err());

        let mut bad = input();
        bad.email = "a@b.toolong".into();
        assert!(User::new_writer(bad, "h".into()).is_err());

        let mut bad = input();
        bad.country = "   ".into();
        assert!(User::new_writer(bad, "h".into()).is_err());
    }

    #[test]
    fn email_verification_flow() {
        let mut user = User::new_writer(input(), "h".into()).unwrap();
        let now = Utc::now();
        let code = user.issue_email_verification(now);
        assert_eq!(code.len(), 6);
        assert_ne!(user.email_verification.as_ref().unwrap().digest, code);

        assert!(user.verify_email("000000x", now).is_err());
        user.verify_email(&code, now).unwrap();
        assert!(user.email_verified);
        assert!(user.email_verification.is_none());
        assert!(user.verify_email(&code, now).is_err());
    }

    #[test]
    fn expired_verification_code_is_rejected() {
        let mut user = User::new_writer(input(), "h".into()).unwrap();
        let now = Utc::now();
        let code = user.issue_email_verification(now);
        let later = now + Duration::hours(VERIFICATION_TTL_HOURS + 1);
        assert!(user.verify_email(&code, later).is_err());
        assert!(!user.email_verified);
    }

    #[test]
    fn password_reset_is_single_use() {
        let mut user = User::new_writer(input(), "old".into()).unwrap();
        let now = Utc::now();
        let token = user.issue_password_reset(now);
        assert_eq!(token.len(), RESET_TOKEN_LEN);
        assert_eq!(user.reset_digest(), Some(token_digest(&token).as_str()));

        user.reset_password(&token, "new".into(), now).unwrap();
        assert_eq!(user.password_hash, "new");
        assert!(user.reset_password(&token, "again".into(), now).is_err());
    }

    #[test]
    fn bio_length_is_capped() {
        let mut user = User::new_writer(input(), "h".into()).unwrap();
        assert!(user.set_bio(Some("x".repeat(MAX_BIO_LEN + 1))).is_err());
        user.set_bio(Some("short".into())).unwrap();
        assert_eq!(user.bio.as_deref(), Some("short"));
    }

    #[test]
    fn profile_update_is_all_or_nothing() {
        let mut user = User::new_writer(input(), "h".into()).unwrap();
        let err = user.update_profile(ProfileUpdate {
            country: Some("France".into()),
            bio: Some("x".repeat(MAX_BIO_LEN + 1)),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(user.country, "UK");

        let blank_phone = ProfileUpdate {
            phone: Some("  ".into()),
            ..Default::default()
        };
        assert!(user.update_profile(blank_phone).is_err());

        user.update_profile(ProfileUpdate {
            country: Some(" France ".into()),
            bio: Some("Historian".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(user.country, "France");
        assert_eq!(user.bio.as_deref(), Some("Historian"));
        assert_eq!(user.first_name, "Ada");

        user.update_profile(ProfileUpdate {
            bio: Some(" ".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(user.bio.is_none());
    }

    #[test]
    fn debit_never_goes_negative() {
        let mut user = User::new_writer(input(), "h".into()).unwrap();
        user.credit_earnings(50.0);
        user.debit_earnings(80.0);
        assert_eq!(user.total_earnings, 0.0);
    }
}
