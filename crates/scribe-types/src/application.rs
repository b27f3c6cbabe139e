//! Writer onboarding workflow.
//!
//! An [`Application`] walks a writer through five steps:
//!
//! ```text
//! 1 personal details -> 2 education -> 3 expertise -> 4 documents -> 5 writing test
//! ```
//!
//! and then through review:
//!
//! ```text
//! incomplete -> submitted -> under_review -> approved | rejected | on_hold
//! ```
//!
//! `advance_step` and `submit` do not look at the per-step payload beyond
//! the writing-test status. Callers that want an actionable pre-check run
//! [`Application::check_step`] first.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, ensure_range};

pub const FIRST_STEP: u8 = 1;
pub const FINAL_STEP: u8 = 5;
pub const MAX_TEST_ATTEMPTS: u8 = 3;
pub const EARLIEST_GRADUATION_YEAR: i32 = 1950;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Incomplete,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    OnHold,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 6] = [
        ApplicationStatus::Incomplete,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Incomplete => "incomplete",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::OnHold => "on_hold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Transition table.
    ///
    /// Submission, approval and rejection are open from every state, so
    /// admins may decide at any point. Callers add their own gates on
    /// top. Only the review-queue moves are restricted here.
    pub fn can_transition_to(&self, target: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match (self, target) {
            (_, Submitted) | (_, Approved) | (_, Rejected) => true,

            (Submitted, UnderReview) => true,
            (OnHold, UnderReview) => true,

            (Submitted, OnHold) => true,
            (UnderReview, OnHold) => true,

            _ => false,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    IncompleteApplication,
    InsufficientQualifications,
    PoorTestPerformance,
    InadequateSamples,
    FailedVerification,
    Other,
}

/// One entry of the append-only progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletion {
    pub step: u8,
    pub completed_at: DateTime<Utc>,
    /// The step's payload as it stood when the step was left.
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degree {
    HighSchool,
    Associate,
    Bachelor,
    Master,
    Doctorate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub highest_degree: Option<Degree>,
    pub field_of_study: Option<String>,
    pub university: Option<String>,
    pub graduation_year: Option<i32>,
    pub gpa: Option<f64>,
    #[serde(default)]
    pub additional_certifications: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    Basic,
    Intermediate,
    Advanced,
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProficiency {
    pub language: String,
    pub level: ProficiencyLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expertise {
    #[serde(default)]
    pub primary_subjects: Vec<String>,
    #[serde(default)]
    pub secondary_subjects: Vec<String>,
    /// Years of writing experience.
    pub writing_experience: Option<u32>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub language_proficiency: Vec<LanguageProficiency>,
}

/// Reference to an uploaded artifact. `verified` is only ever set by an admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub filename: String,
    pub stored_path: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub verified: bool,
}

impl StoredFile {
    pub fn new(filename: impl Into<String>, stored_path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            stored_path: stored_path.into(),
            uploaded_at: Utc::now(),
            verified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleWork {
    pub title: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub file: StoredFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub title: String,
    #[serde(flatten)]
    pub file: StoredFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Documents {
    pub cv: Option<StoredFile>,
    #[serde(default)]
    pub sample_works: Vec<SampleWork>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cv,
    SampleWork,
    Certificate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingTestStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Graded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAnswer {
    pub question_id: String,
    pub answer: String,
    /// Minutes spent on this question.
    pub time_spent: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritingTest {
    pub test_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Minutes between start and completion.
    pub time_spent: Option<u32>,
    #[serde(default)]
    pub answers: Vec<TestAnswer>,
    pub score: Option<u8>,
    pub feedback: Option<String>,
    pub status: WritingTestStatus,
    pub attempts: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub rating: Option<u8>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub recommendations: Option<String>,
}

impl Review {
    fn stamped(reviewer: Uuid, notes: Option<String>) -> Self {
        Self {
            reviewed_by: Some(reviewer),
            reviewed_at: Some(Utc::now()),
            review_notes: notes,
            ..Self::default()
        }
    }
}

/// Reviewer's scored assessment, kept alongside the review block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub rating: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub recommendations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub author: Uuid,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub writer_id: Uuid,

    pub current_step: u8,
    #[serde(default)]
    pub completed_steps: Vec<StepCompletion>,

    #[serde(default)]
    pub education: Education,
    #[serde(default)]
    pub expertise: Expertise,
    #[serde(default)]
    pub documents: Documents,
    #[serde(default)]
    pub writing_test: WritingTest,

    pub status: ApplicationStatus,
    #[serde(default)]
    pub review: Review,
    #[serde(default)]
    pub notes: Vec<Note>,

    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,

    pub rejection_reason: Option<RejectionReason>,
    pub rejection_details: Option<String>,

    pub can_reapply: bool,
    pub reapply_after: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Storage revision, maintained by the persistence layer.
    #[serde(skip)]
    pub revision: i64,
}

impl Application {
    pub fn new(writer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            writer_id,
            current_step: FIRST_STEP,
            completed_steps: Vec::new(),
            education: Education::default(),
            expertise: Expertise::default(),
            documents: Documents::default(),
            writing_test: WritingTest::default(),
            status: ApplicationStatus::Incomplete,
            review: Review::default(),
            notes: Vec::new(),
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            rejection_details: None,
            can_reapply: true,
            reapply_after: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// `round(current_step / 5 * 100)`: 20, 40, 60, 80 or 100.
    pub fn completion_percentage(&self) -> u8 {
        (f64::from(self.current_step) / f64::from(FINAL_STEP) * 100.0).round() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.current_step == FINAL_STEP && self.writing_test.status == WritingTestStatus::Completed
    }

    // -- Progress --

    /// Log the current step as completed and move to the next one.
    /// Returns `false` without touching anything when already on the final step.
    pub fn advance_step(&mut self) -> bool {
        if self.current_step >= FINAL_STEP {
            return false;
        }
        self.completed_steps.push(StepCompletion {
            step: self.current_step,
            completed_at: Utc::now(),
            data: self.step_snapshot(self.current_step),
        });
        self.current_step += 1;
        true
    }

    fn step_snapshot(&self, step: u8) -> Option<Value> {
        match step {
            2 => serde_json::to_value(&self.education).ok(),
            3 => serde_json::to_value(&self.expertise).ok(),
            4 => serde_json::to_value(&self.documents).ok(),
            5 => serde_json::to_value(&self.writing_test).ok(),
            _ => None,
        }
    }

    /// Report whether the payload for `step` is filled in.
    /// Step 1 lives on the user record and is checked at registration.
    pub fn check_step(&self, step: u8) -> DomainResult<()> {
        match step {
            1 => Ok(()),
            2 => {
                let e = &self.education;
                if e.highest_degree.is_none() {
                    return Err(DomainError::validation("highest degree is required"));
                }
                if is_blank(&e.field_of_study) {
                    return Err(DomainError::validation("field of study is required"));
                }
                if is_blank(&e.university) {
                    return Err(DomainError::validation("university is required"));
                }
                if e.graduation_year.is_none() {
                    return Err(DomainError::validation("graduation year is required"));
                }
                Ok(())
            }
            3 => {
                let x = &self.expertise;
                if !x.primary_subjects.iter().any(|s| !s.trim().is_empty()) {
                    return Err(DomainError::validation("at least one primary subject is required"));
                }
                if x.writing_experience.is_none() {
                    return Err(DomainError::validation("writing experience is required"));
                }
                Ok(())
            }
            4 => {
                if self.documents.cv.is_none() {
                    return Err(DomainError::validation("a CV must be uploaded"));
                }
                Ok(())
            }
            5 => {
                if self.writing_test.status != WritingTestStatus::Completed {
                    return Err(DomainError::validation("writing test is not completed"));
                }
                Ok(())
            }
            other => Err(DomainError::validation(format!("no such step: {}", other))),
        }
    }

    /// Run [`check_step`](Self::check_step) for every step, stopping at the first gap.
    pub fn check_all_steps(&self) -> DomainResult<()> {
        (FIRST_STEP..=FINAL_STEP).try_for_each(|step| self.check_step(step))
    }

    // -- Review --

    fn transition(&mut self, target: ApplicationStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::transition(self.status, target));
        }
        self.status = target;
        Ok(())
    }

    pub fn submit(&mut self) -> DomainResult<()> {
        if !self.is_complete() {
            return Err(DomainError::validation("application is not complete"));
        }
        self.transition(ApplicationStatus::Submitted)?;
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    pub fn start_review(&mut self, reviewer: Uuid) -> DomainResult<()> {
        self.transition(ApplicationStatus::UnderReview)?;
        self.review.reviewed_by = Some(reviewer);
        Ok(())
    }

    pub fn put_on_hold(&mut self, reviewer: Uuid, note: Option<String>) -> DomainResult<()> {
        self.transition(ApplicationStatus::OnHold)?;
        self.review.reviewed_by = Some(reviewer);
        if let Some(content) = note {
            self.add_note(reviewer, content, true);
        }
        Ok(())
    }

    pub fn resume_review(&mut self, reviewer: Uuid) -> DomainResult<()> {
        if self.status != ApplicationStatus::OnHold {
            return Err(DomainError::transition(self.status, ApplicationStatus::UnderReview));
        }
        self.start_review(reviewer)
    }

    /// Approve from any state. The review block is replaced wholesale.
    pub fn approve(&mut self, reviewer: Uuid, notes: Option<String>) -> DomainResult<()> {
        self.transition(ApplicationStatus::Approved)?;
        self.approved_at = Some(Utc::now());
        self.review = Review::stamped(reviewer, notes);
        Ok(())
    }

    /// Reject from any state. The review notes mirror `details`.
    pub fn reject(
        &mut self,
        reviewer: Uuid,
        reason: RejectionReason,
        details: Option<String>,
    ) -> DomainResult<()> {
        self.transition(ApplicationStatus::Rejected)?;
        self.rejected_at = Some(Utc::now());
        self.rejection_reason = Some(reason);
        self.rejection_details = details.clone();
        self.review = Review::stamped(reviewer, details);
        Ok(())
    }

    pub fn record_assessment(
        &mut self,
        reviewer: Uuid,
        assessment: Assessment,
    ) -> DomainResult<()> {
        ensure_range("rating", f64::from(assessment.rating), 1.0, 5.0)?;
        self.review.reviewed_by = Some(reviewer);
        self.review.reviewed_at = Some(Utc::now());
        self.review.rating = Some(assessment.rating);
        self.review.strengths = assessment.strengths;
        self.review.weaknesses = assessment.weaknesses;
        self.review.recommendations = assessment.recommendations;
        Ok(())
    }

    pub fn set_reapplication(&mut self, can_reapply: bool, reapply_after: Option<DateTime<Utc>>) {
        self.can_reapply = can_reapply;
        self.reapply_after = reapply_after;
    }

    pub fn add_note(&mut self, author: Uuid, content: String, is_internal: bool) {
        self.notes.push(Note {
            author,
            content,
            is_internal,
            created_at: Utc::now(),
        });
    }

    /// Notes visible to the writer.
    pub fn external_notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| !n.is_internal)
    }

    // -- Step payloads --

    pub fn set_education(&mut self, education: Education) -> DomainResult<()> {
        if let Some(gpa) = education.gpa {
            ensure_range("gpa", gpa, 0.0, 4.0)?;
        }
        if let Some(year) = education.graduation_year {
            let latest = Utc::now().year() + 10;
            ensure_range(
                "graduation_year",
                f64::from(year),
                f64::from(EARLIEST_GRADUATION_YEAR),
                f64::from(latest),
            )?;
        }
        self.education = education;
        Ok(())
    }

    pub fn set_expertise(&mut self, expertise: Expertise) {
        self.expertise = expertise;
    }

    pub fn attach_cv(&mut self, file: StoredFile) -> Option<StoredFile> {
        self.documents.cv.replace(file)
    }

    pub fn add_sample_work(&mut self, sample: SampleWork) {
        self.documents.sample_works.push(sample);
    }

    pub fn add_certificate(&mut self, certificate: Certificate) {
        self.documents.certificates.push(certificate);
    }

    pub fn verify_document(&mut self, kind: DocumentKind, index: usize) -> DomainResult<()> {
        let file = match kind {
            DocumentKind::Cv => self.documents.cv.as_mut(),
            DocumentKind::SampleWork => {
                self.documents.sample_works.get_mut(index).map(|s| &mut s.file)
            }
            DocumentKind::Certificate => {
                self.documents.certificates.get_mut(index).map(|c| &mut c.file)
            }
        };
        match file {
            Some(file) => {
                file.verified = true;
                Ok(())
            }
            None => Err(DomainError::validation("no such document")),
        }
    }

    // -- Writing test --

    pub fn start_writing_test(&mut self, test_id: String) -> DomainResult<()> {
        let test = &mut self.writing_test;
        if test.attempts >= MAX_TEST_ATTEMPTS {
            return Err(DomainError::validation("maximum writing test attempts reached"));
        }
        test.test_id = Some(test_id);
        test.started_at = Some(Utc::now());
        test.completed_at = None;
        test.time_spent = None;
        test.answers.clear();
        test.score = None;
        test.feedback = None;
        test.status = WritingTestStatus::InProgress;
        test.attempts += 1;
        Ok(())
    }

    pub fn complete_writing_test(&mut self, answers: Vec<TestAnswer>) -> DomainResult<()> {
        let test = &mut self.writing_test;
        if test.status != WritingTestStatus::InProgress {
            return Err(DomainError::validation("writing test is not in progress"));
        }
        let now = Utc::now();
        test.time_spent = test
            .started_at
            .map(|started| (now - started).num_minutes().max(0) as u32);
        test.completed_at = Some(now);
        test.answers = answers;
        test.status = WritingTestStatus::Completed;
        Ok(())
    }

    pub fn grade_writing_test(&mut self, score: u8, feedback: Option<String>) -> DomainResult<()> {
        ensure_range("score", f64::from(score), 0.0, 100.0)?;
        let test = &mut self.writing_test;
        if !matches!(test.status, WritingTestStatus::Completed | WritingTestStatus::Graded) {
            return Err(DomainError::validation("writing test has not been completed"));
        }
        test.score = Some(score);
        test.feedback = feedback;
        test.status = WritingTestStatus::Graded;
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application() -> Application {
        Application::new(Uuid::new_v4())
    }

    fn at_final_step() -> Application {
        let mut app = application();
        while app.advance_step() {}
        app
    }

    #[test]
    fn completion_percentage_tracks_step() {
        let mut app = application();
        let mut seen = vec![app.completion_percentage()];
        while app.advance_step() {
            seen.push(app.completion_percentage());
        }
        assert_eq!(seen, vec![20, 40, 60, 80, 100]);
    }

    #[test]
    fn advance_step_stops_at_final_step() {
        let mut app = application();
        for _ in 0..10 {
            app.advance_step();
        }
        assert_eq!(app.current_step, FINAL_STEP);
        assert_eq!(app.completed_steps.len(), 4);

        assert!(!app.advance_step());
        assert_eq!(app.completed_steps.len(), 4);
    }

    #[test]
    fn advance_step_logs_each_step_once() {
        let mut app = application();
        app.advance_step();
        app.advance_step();
        let steps: Vec<u8> = app.completed_steps.iter().map(|c| c.step).collect();
        assert_eq!(steps, vec![1, 2]);
        assert!(app.completed_steps[0].data.is_none());
        assert!(app.completed_steps[1].data.is_some());
    }

    #[test]
    fn submit_requires_final_step_and_completed_test() {
        let mut app = application();
        app.writing_test.status = WritingTestStatus::Completed;
        let err = app.submit().unwrap_err();
        assert_eq!(err, DomainError::validation("application is not complete"));
        assert_eq!(app.status, ApplicationStatus::Incomplete);
        assert!(app.submitted_at.is_none());

        let mut app = at_final_step();
        app.writing_test.status = WritingTestStatus::InProgress;
        assert!(app.submit().is_err());
        assert_eq!(app.status, ApplicationStatus::Incomplete);

        app.writing_test.status = WritingTestStatus::Graded;
        assert!(app.submit().is_err());
    }

    #[test]
    fn end_to_end_onboarding() {
        let mut app = application();
        for _ in 0..4 {
            assert!(app.advance_step());
        }
        assert_eq!(app.current_step, 5);
        assert_eq!(app.completed_steps.len(), 4);
        assert_eq!(app.completion_percentage(), 100);

        app.start_writing_test("t-1".into()).unwrap();
        app.complete_writing_test(vec![]).unwrap();
        app.submit().unwrap();
        assert_eq!(app.status, ApplicationStatus::Submitted);
        assert!(app.submitted_at.is_some());
    }

    #[test]
    fn approve_and_reject_work_from_any_status() {
        let reviewer = Uuid::new_v4();
        for status in ApplicationStatus::ALL {
            let mut app = application();
            app.status = status;
            app.review.rating = Some(4);
            app.approve(reviewer, Some("solid".into())).unwrap();
            assert_eq!(app.status, ApplicationStatus::Approved);
            assert!(app.approved_at.is_some());
            assert_eq!(app.review.reviewed_by, Some(reviewer));
            assert_eq!(app.review.review_notes.as_deref(), Some("solid"));
            assert_eq!(app.review.rating, None);

            let mut app = application();
            app.status = status;
            app.reject(reviewer, RejectionReason::InadequateSamples, Some("thin".into()))
                .unwrap();
            assert_eq!(app.status, ApplicationStatus::Rejected);
            assert!(app.rejected_at.is_some());
            assert_eq!(app.rejection_reason, Some(RejectionReason::InadequateSamples));
            assert_eq!(app.rejection_details.as_deref(), Some("thin"));
            assert_eq!(app.review.review_notes.as_deref(), Some("thin"));
        }
    }

    #[test]
    fn review_queue_moves_are_restricted() {
        let reviewer = Uuid::new_v4();
        let mut app = application();
        assert!(matches!(
            app.start_review(reviewer),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(app.put_on_hold(reviewer, None).is_err());
        assert!(app.resume_review(reviewer).is_err());

        app.status = ApplicationStatus::Submitted;
        app.start_review(reviewer).unwrap();
        assert_eq!(app.status, ApplicationStatus::UnderReview);

        app.put_on_hold(reviewer, Some("waiting on transcript".into())).unwrap();
        assert_eq!(app.status, ApplicationStatus::OnHold);
        assert_eq!(app.notes.len(), 1);
        assert!(app.notes[0].is_internal);

        app.resume_review(reviewer).unwrap();
        assert_eq!(app.status, ApplicationStatus::UnderReview);
    }

    #[test]
    fn notes_do_not_change_status() {
        let mut app = application();
        let author = Uuid::new_v4();
        app.add_note(author, "internal".into(), true);
        app.add_note(author, "for writer".into(), false);
        assert_eq!(app.status, ApplicationStatus::Incomplete);
        assert_eq!(app.notes.len(), 2);
        let visible: Vec<&str> = app.external_notes().map(|n| n.content.as_str()).collect();
        assert_eq!(visible, vec!["for writer"]);
    }

    #[test]
    fn check_step_reports_missing_payload() {
        let mut app = application();
        assert!(app.check_step(1).is_ok());
        assert!(app.check_step(2).is_err());
        assert!(app.check_step(6).is_err());

        app.set_education(Education {
            highest_degree: Some(Degree::Master),
            field_of_study: Some("History".into()),
            university: Some("Leiden".into()),
            graduation_year: Some(2015),
            gpa: Some(3.7),
            additional_certifications: vec![],
        })
        .unwrap();
        assert!(app.check_step(2).is_ok());

        assert!(app.check_step(3).is_err());
        app.set_expertise(Expertise {
            primary_subjects: vec!["History".into()],
            writing_experience: Some(4),
            ..Expertise::default()
        });
        assert!(app.check_step(3).is_ok());

        assert!(app.check_step(4).is_err());
        app.attach_cv(StoredFile::new("cv.pdf", "uploads/cv/cv-1-abc.pdf"));
        assert!(app.check_step(4).is_ok());

        assert!(app.check_all_steps().is_err());
        app.start_writing_test("t".into()).unwrap();
        app.complete_writing_test(vec![]).unwrap();
        assert!(app.check_all_steps().is_ok());
    }

    #[test]
    fn education_ranges_are_enforced() {
        let mut app = application();
        let bad_gpa = Education {
            gpa: Some(4.5),
            ..Education::default()
        };
        assert!(matches!(
            app.set_education(bad_gpa),
            Err(DomainError::OutOfRange { field: "gpa", .. })
        ));

        let bad_year = Education {
            graduation_year: Some(1900),
            ..Education::default()
        };
        assert!(app.set_education(bad_year).is_err());
        assert_eq!(app.education, Education::default());
    }

    #[test]
    fn writing_test_attempts_are_capped() {
        let mut app = application();
        for i in 0..MAX_TEST_ATTEMPTS {
            app.start_writing_test(format!("t-{}", i)).unwrap();
        }
        assert_eq!(app.writing_test.attempts, MAX_TEST_ATTEMPTS);
        assert!(app.start_writing_test("t-x".into()).is_err());
        assert_eq!(app.writing_test.attempts, MAX_TEST_ATTEMPTS);
    }

    #[test]
    fn writing_test_lifecycle() {
        let mut app = application();
        assert!(app.complete_writing_test(vec![]).is_err());
        assert!(app.grade_writing_test(80, None).is_err());

        app.start_writing_test("t-1".into()).unwrap();
        let answer = TestAnswer {
            question_id: "q1".into(),
            answer: "An essay".into(),
            time_spent: Some(12),
        };
        app.complete_writing_test(vec![answer]).unwrap();
        assert_eq!(app.writing_test.status, WritingTestStatus::Completed);
        assert_eq!(app.writing_test.time_spent, Some(0));

        assert!(app.grade_writing_test(101, None).is_err());
        app.grade_writing_test(88, Some("clear argument".into())).unwrap();
        assert_eq!(app.writing_test.status, WritingTestStatus::Graded);
        assert_eq!(app.writing_test.score, Some(88));
    }

    #[test]
    fn documents_are_verified_by_index() {
        let mut app = application();
        assert!(app.verify_document(DocumentKind::Cv, 0).is_err());

        app.add_sample_work(SampleWork {
            title: "Essay".into(),
            subject: None,
            description: None,
            file: StoredFile::new("essay.pdf", "uploads/samples/essay.pdf"),
        });
        assert!(app.verify_document(DocumentKind::SampleWork, 1).is_err());
        app.verify_document(DocumentKind::SampleWork, 0).unwrap();
        assert!(app.documents.sample_works[0].file.verified);
    }

    #[test]
    fn assessment_rating_range() {
        let mut app = application();
        let reviewer = Uuid::new_v4();
        let low = Assessment {
            rating: 0,
            ..Assessment::default()
        };
        assert!(app.record_assessment(reviewer, low).is_err());
        let ok = Assessment {
            rating: 5,
            strengths: vec!["voice".into()],
            ..Assessment::default()
        };
        app.record_assessment(reviewer, ok).unwrap();
        assert_eq!(app.review.rating, Some(5));
        assert_eq!(app.review.strengths, vec!["voice".to_string()]);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ApplicationStatus::ALL {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
        assert_eq!(ApplicationStatus::parse("pending"), None);
    }
}
