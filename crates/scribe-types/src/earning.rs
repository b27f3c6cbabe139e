//! Per-job payment ledger.
//!
//! `final_amount` and `net_payment` are always derived from the inputs on
//! read. `payment_details.net_amount` and `invoice.total_amount` are
//! snapshots frozen by `mark_as_paid` and `generate_invoice`; later changes
//! to bonus or deductions do not rewrite them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, ensure_range};

pub const INVOICE_DUE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Payment lifecycle:
    ///
    /// ```text
    /// pending -> processing -> paid -> refunded
    ///               |  ^
    ///               v  |
    ///              failed
    /// ```
    ///
    /// Paying is allowed from anything but `refunded`, so a payout recorded
    /// out of band can skip `processing`.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, target) {
            (Refunded, _) => false,
            (_, Paid) => true,
            (Pending, Processing) | (Failed, Processing) => true,
            (Processing, Failed) => true,
            (Paid, Refunded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Paypal,
    BankTransfer,
    Stripe,
    Other,
}

/// A bonus or deduction, with who applied it and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub amount: f64,
    pub reason: String,
    pub applied_by: Uuid,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub processing_fee: f64,
    /// Net payout frozen when the earning was paid.
    pub net_amount: Option<f64>,
    /// Final amount frozen when the earning was paid. This is what the
    /// writer's lifetime total was credited with.
    #[serde(default)]
    pub gross_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,
    pub generated_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub tax_amount: f64,
    /// `final_amount + tax_amount` at generation time.
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earning {
    pub id: Uuid,
    pub writer_id: Uuid,
    pub job_id: Uuid,
    pub amount: f64,
    pub currency: Currency,

    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_details: PaymentDetails,

    pub bonus: Option<Adjustment>,
    #[serde(default)]
    pub deductions: Vec<Adjustment>,

    pub quality_rating: Option<f64>,
    pub completed_on_time: bool,
    pub revision_requests: u32,

    pub earned_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice: Option<Invoice>,

    pub notes: Option<String>,
    pub admin_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Storage revision, maintained by the persistence layer.
    #[serde(skip)]
    pub revision: i64,
}

impl Earning {
    pub fn new(
        writer_id: Uuid,
        job_id: Uuid,
        amount: f64,
        currency: Currency,
    ) -> DomainResult<Self> {
        non_negative("amount", amount)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            writer_id,
            job_id,
            amount,
            currency,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            payment_details: PaymentDetails::default(),
            bonus: None,
            deductions: Vec::new(),
            quality_rating: None,
            completed_on_time: true,
            revision_requests: 0,
            earned_at: now,
            paid_at: None,
            invoice: None,
            notes: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    pub fn bonus_amount(&self) -> f64 {
        self.bonus.as_ref().map_or(0.0, |b| b.amount)
    }

    pub fn total_deductions(&self) -> f64 {
        self.deductions.iter().map(|d| d.amount).sum()
    }

    /// `max(0, amount + bonus - sum(deductions))`.
    pub fn final_amount(&self) -> f64 {
        (self.amount + self.bonus_amount() - self.total_deductions()).max(0.0)
    }

    /// `final_amount - processing_fee`. Not clamped: a fee larger than the
    /// final amount yields a negative figure.
    pub fn net_payment(&self) -> f64 {
        self.final_amount() - self.payment_details.processing_fee
    }

    /// The amount currently counted in the writer's total: the frozen
    /// final amount while paid, nothing otherwise.
    pub fn credited_amount(&self) -> Option<f64> {
        match self.payment_status {
            PaymentStatus::Paid => self.payment_details.gross_amount,
            _ => None,
        }
    }

    fn transition(&mut self, target: PaymentStatus) -> DomainResult<()> {
        if !self.payment_status.can_transition_to(target) {
            return Err(DomainError::transition(self.payment_status, target));
        }
        self.payment_status = target;
        Ok(())
    }

    /// Record the payout and freeze `net_amount` and `gross_amount` from the
    /// current inputs.
    pub fn mark_as_paid(
        &mut self,
        method: PaymentMethod,
        transaction_id: String,
        processing_fee: f64,
    ) -> DomainResult<()> {
        non_negative("processing_fee", processing_fee)?;
        self.transition(PaymentStatus::Paid)?;

        let now = Utc::now();
        self.paid_at = Some(now);
        self.payment_method = Some(method);
        self.payment_details = PaymentDetails {
            transaction_id: Some(transaction_id),
            payment_date: Some(now),
            processing_fee,
            net_amount: None,
            gross_amount: Some(self.final_amount()),
        };
        self.payment_details.net_amount = Some(self.net_payment());
        Ok(())
    }

    pub fn mark_processing(&mut self) -> DomainResult<()> {
        self.transition(PaymentStatus::Processing)
    }

    pub fn mark_failed(&mut self, reason: Option<String>) -> DomainResult<()> {
        self.transition(PaymentStatus::Failed)?;
        if reason.is_some() {
            self.admin_notes = reason;
        }
        Ok(())
    }

    pub fn refund(&mut self, reason: Option<String>) -> DomainResult<()> {
        self.transition(PaymentStatus::Refunded)?;
        if reason.is_some() {
            self.admin_notes = reason;
        }
        Ok(())
    }

    /// Set the single bonus slot. A later call replaces the earlier bonus.
    pub fn add_bonus(&mut self, amount: f64, reason: String, admin: Uuid) -> DomainResult<()> {
        non_negative("bonus", amount)?;
        self.bonus = Some(Adjustment {
            amount,
            reason,
            applied_by: admin,
            applied_at: Utc::now(),
        });
        Ok(())
    }

    /// Append a deduction. Every deduction ever applied is kept and summed.
    pub fn add_deduction(&mut self, amount: f64, reason: String, admin: Uuid) -> DomainResult<()> {
        non_negative("deduction", amount)?;
        self.deductions.push(Adjustment {
            amount,
            reason,
            applied_by: admin,
            applied_at: Utc::now(),
        });
        Ok(())
    }

    /// Generate (or regenerate) the invoice, due 30 days out, with no tax.
    pub fn generate_invoice(&mut self) -> &Invoice {
        let now = Utc::now();
        let tax_amount = 0.0;
        let invoice = Invoice {
            invoice_number: invoice_number(now, self.writer_id),
            generated_at: now,
            due_date: now + Duration::days(INVOICE_DUE_DAYS),
            tax_amount,
            total_amount: self.final_amount() + tax_amount,
        };
        self.invoice.insert(invoice)
    }

    pub fn set_quality(
        &mut self,
        rating: Option<f64>,
        completed_on_time: bool,
        revision_requests: u32,
    ) -> DomainResult<()> {
        if let Some(r) = rating {
            ensure_range("quality_rating", r, 0.0, 5.0)?;
        }
        self.quality_rating = rating;
        self.completed_on_time = completed_on_time;
        self.revision_requests = revision_requests;
        Ok(())
    }

    pub fn request_revision(&mut self) {
        self.revision_requests += 1;
    }
}

/// `INV-{unix millis}-{last six characters of the writer id}`.
pub fn invoice_number(now: DateTime<Utc>, writer_id: Uuid) -> String {
    let simple = writer_id.simple().to_string();
    let suffix = &simple[simple.len() - 6..];
    format!("INV-{}-{}", now.timestamp_millis(), suffix)
}

fn non_negative(field: &'static str, value: f64) -> DomainResult<()> {
    ensure_range(field, value, 0.0, f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earning(amount: f64) -> Earning {
        Earning::new(Uuid::new_v4(), Uuid::new_v4(), amount, Currency::Usd).unwrap()
    }

    #[test]
    fn final_amount_combines_bonus_and_deductions() {
        let admin = Uuid::new_v4();
        let mut e = earning(100.0);
        e.add_bonus(20.0, "fast".into(), admin).unwrap();
        e.add_deduction(30.0, "late".into(), admin).unwrap();
        e.add_deduction(10.0, "format".into(), admin).unwrap();
        assert_eq!(e.final_amount(), 80.0);
    }

    #[test]
    fn final_amount_is_clamped_at_zero() {
        let mut e = earning(10.0);
        e.add_deduction(25.0, "plagiarism".into(), Uuid::new_v4()).unwrap();
        assert_eq!(e.final_amount(), 0.0);
    }

    #[test]
    fn net_payment_may_go_negative() {
        let mut e = earning(50.0);
        e.mark_as_paid(PaymentMethod::Stripe, "T".into(), 60.0).unwrap();
        assert_eq!(e.net_payment(), -10.0);
        assert_eq!(e.payment_details.net_amount, Some(-10.0));
    }

    #[test]
    fn deductions_accumulate() {
        let mut e = earning(100.0);
        let admin = Uuid::new_v4();
        for _ in 0..3 {
            e.add_deduction(10.0, "late".into(), admin).unwrap();
        }
        assert_eq!(e.deductions.len(), 3);
        assert_eq!(e.total_deductions(), 30.0);
    }

    #[test]
    fn bonus_is_replaced_not_accumulated() {
        let mut e = earning(100.0);
        let admin = Uuid::new_v4();
        e.add_bonus(5.0, "first".into(), admin).unwrap();
        e.add_bonus(15.0, "second".into(), admin).unwrap();
        assert_eq!(e.bonus_amount(), 15.0);
        assert_eq!(e.bonus.as_ref().unwrap().reason, "second");
        assert_eq!(e.final_amount(), 115.0);
    }

    #[test]
    fn mark_as_paid_freezes_net_amount() {
        let mut e = earning(210.0);
        e.mark_as_paid(PaymentMethod::Paypal, "TXN1".into(), 10.0).unwrap();
        assert_eq!(e.payment_status, PaymentStatus::Paid);
        assert_eq!(e.payment_details.net_amount, Some(200.0));
        assert_eq!(e.payment_details.transaction_id.as_deref(), Some("TXN1"));
        assert_eq!(e.payment_method, Some(PaymentMethod::Paypal));
        assert!(e.paid_at.is_some());

        e.add_bonus(50.0, "late bonus".into(), Uuid::new_v4()).unwrap();
        assert_eq!(e.net_payment(), 250.0);
        assert_eq!(e.payment_details.net_amount, Some(200.0));
        assert_eq!(e.credited_amount(), Some(210.0));
    }

    #[test]
    fn credited_amount_only_while_paid() {
        let mut e = earning(100.0);
        assert_eq!(e.credited_amount(), None);
        e.mark_as_paid(PaymentMethod::Paypal, "T1".into(), 5.0).unwrap();
        e.add_deduction(30.0, "late".into(), Uuid::new_v4()).unwrap();
        assert_eq!(e.credited_amount(), Some(100.0));

        e.mark_as_paid(PaymentMethod::Paypal, "T2".into(), 5.0).unwrap();
        assert_eq!(e.credited_amount(), Some(70.0));
        assert_eq!(e.payment_details.net_amount, Some(65.0));

        e.refund(None).unwrap();
        assert_eq!(e.credited_amount(), None);
    }

    #[test]
    fn invoice_total_is_a_snapshot() {
        let mut e = earning(120.0);
        let invoice = e.generate_invoice().clone();
        assert_eq!(invoice.tax_amount, 0.0);
        assert_eq!(invoice.total_amount, 120.0);
        assert_eq!(invoice.due_date - invoice.generated_at, Duration::days(INVOICE_DUE_DAYS));

        let suffix = &e.writer_id.simple().to_string()[26..];
        assert!(invoice.invoice_number.starts_with("INV-"));
        assert!(invoice.invoice_number.ends_with(suffix));

        e.add_deduction(20.0, "late".into(), Uuid::new_v4()).unwrap();
        assert_eq!(e.invoice.as_ref().unwrap().total_amount, 120.0);
        assert_eq!(e.final_amount(), 100.0);
    }

    #[test]
    fn payment_lifecycle() {
        let mut e = earning(10.0);
        assert!(e.mark_failed(None).is_err());
        assert!(e.refund(None).is_err());

        e.mark_processing().unwrap();
        e.mark_failed(Some("card declined".into())).unwrap();
        assert_eq!(e.payment_status, PaymentStatus::Failed);
        assert_eq!(e.admin_notes.as_deref(), Some("card declined"));

        e.mark_processing().unwrap();
        e.mark_as_paid(PaymentMethod::BankTransfer, "W1".into(), 0.0).unwrap();
        e.refund(None).unwrap();
        assert_eq!(e.payment_status, PaymentStatus::Refunded);

        let err = e.mark_as_paid(PaymentMethod::BankTransfer, "W2".into(), 0.0);
        assert!(matches!(err, Err(DomainError::InvalidTransition { .. })));
        assert_eq!(e.payment_details.transaction_id.as_deref(), Some("W1"));
    }

    #[test]
    fn negative_inputs_are_rejected() {
        assert!(Earning::new(Uuid::new_v4(), Uuid::new_v4(), -1.0, Currency::Eur).is_err());
        let mut e = earning(10.0);
        assert!(e.add_bonus(-5.0, "x".into(), Uuid::new_v4()).is_err());
        assert!(e.add_deduction(f64::NAN, "x".into(), Uuid::new_v4()).is_err());
        assert!(e.mark_as_paid(PaymentMethod::Other, "x".into(), -1.0).is_err());
        assert_eq!(e.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn quality_rating_range() {
        let mut e = earning(10.0);
        assert!(e.set_quality(Some(5.5), true, 0).is_err());
        e.set_quality(Some(0.0), false, 2).unwrap();
        e.request_revision();
        assert_eq!(e.revision_requests, 3);
        assert!(!e.completed_on_time);
    }

    #[test]
    fn currency_uses_iso_codes() {
        assert_eq!(serde_json::to_value(Currency::Gbp).unwrap(), "GBP");
        let c: Currency = serde_json::from_value("EUR".into()).unwrap();
        assert_eq!(c, Currency::Eur);
        assert!(serde_json::from_value::<Currency>("JPY".into()).is_err());
    }
}
