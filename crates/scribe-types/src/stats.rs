use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::earning::{Earning, PaymentStatus};

/// Per-writer totals over a set of earnings.
///
/// `paid_amount` and `pending_amount` sum the base `amount`, not the
/// adjusted final amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsStats {
    pub total_earnings: f64,
    pub total_bonus: f64,
    pub total_deductions: f64,
    pub paid_amount: f64,
    pub pending_amount: f64,
    pub jobs_completed: u32,
    pub average_rating: Option<f64>,
    pub on_time_deliveries: u32,
    pub on_time_ratio: Option<f64>,
}

impl EarningsStats {
    pub fn from_earnings(earnings: &[Earning]) -> Self {
        let mut stats = Self::default();
        let mut rating_sum = 0.0;
        let mut rated = 0u32;

        for e in earnings {
            stats.total_earnings += e.amount;
            stats.total_bonus += e.bonus_amount();
            stats.total_deductions += e.total_deductions();
            match e.payment_status {
                PaymentStatus::Paid => stats.paid_amount += e.amount,
                PaymentStatus::Pending => stats.pending_amount += e.amount,
                _ => {}
            }
            stats.jobs_completed += 1;
            if let Some(r) = e.quality_rating {
                rating_sum += r;
                rated += 1;
            }
            if e.completed_on_time {
                stats.on_time_deliveries += 1;
            }
        }

        if rated > 0 {
            stats.average_rating = Some(rating_sum / f64::from(rated));
        }
        if stats.jobs_completed > 0 {
            stats.on_time_ratio =
                Some(f64::from(stats.on_time_deliveries) / f64::from(stats.jobs_completed));
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    /// Calendar month, 1-12.
    pub month: u32,
    pub total_amount: f64,
    pub job_count: u32,
}

impl MonthlyEarnings {
    /// Group by calendar month of `earned_at` within `year`. Months without
    /// earnings are omitted; the result is ordered by month.
    pub fn for_year(earnings: &[Earning], year: i32) -> Vec<Self> {
        let mut months: BTreeMap<u32, (f64, u32)> = BTreeMap::new();
        for e in earnings.iter().filter(|e| e.earned_at.year() == year) {
            let slot = months.entry(e.earned_at.month()).or_default();
            slot.0 += e.amount;
            slot.1 += 1;
        }
        months
            .into_iter()
            .map(|(month, (total_amount, job_count))| MonthlyEarnings {
                month,
                total_amount,
                job_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::earning::{Currency, PaymentMethod};

    fn earning(amount: f64) -> Earning {
        Earning::new(Uuid::new_v4(), Uuid::new_v4(), amount, Currency::Usd).unwrap()
    }

    #[test]
    fn empty_stats() {
        let stats = EarningsStats::from_earnings(&[]);
        assert_eq!(stats, EarningsStats::default());
        assert_eq!(stats.average_rating, None);
    }

    #[test]
    fn stats_split_paid_and_pending() {
        let admin = Uuid::new_v4();
        let mut paid = earning(100.0);
        paid.add_bonus(10.0, "quick".into(), admin).unwrap();
        paid.mark_as_paid(PaymentMethod::Paypal, "T1".into(), 0.0).unwrap();
        paid.set_quality(Some(4.0), true, 0).unwrap();

        let mut pending = earning(50.0);
        pending.add_deduction(5.0, "late".into(), admin).unwrap();
        pending.set_quality(Some(3.0), false, 1).unwrap();

        let mut processing = earning(25.0);
        processing.mark_processing().unwrap();

        let stats = EarningsStats::from_earnings(&[paid, pending, processing]);
        assert_eq!(stats.total_earnings, 175.0);
        assert_eq!(stats.total_bonus, 10.0);
        assert_eq!(stats.total_deductions, 5.0);
        assert_eq!(stats.paid_amount, 100.0);
        assert_eq!(stats.pending_amount, 50.0);
        assert_eq!(stats.jobs_completed, 3);
        assert_eq!(stats.average_rating, Some(3.5));
        assert_eq!(stats.on_time_deliveries, 2);
        assert_eq!(stats.on_time_ratio, Some(2.0 / 3.0));
    }

    #[test]
    fn monthly_totals_for_one_year() {
        let at = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        let mut a = earning(10.0);
        a.earned_at = at(2025, 3, 1);
        let mut b = earning(15.0);
        b.earned_at = at(2025, 3, 28);
        let mut c = earning(40.0);
        c.earned_at = at(2025, 1, 9);
        let mut d = earning(99.0);
        d.earned_at = at(2024, 3, 2);

        let months = MonthlyEarnings::for_year(&[a, b, c, d], 2025);
        assert_eq!(
            months,
            vec![
                MonthlyEarnings {
                    month: 1,
                    total_amount: 40.0,
                    job_count: 1,
                },
                MonthlyEarnings {
                    month: 3,
                    total_amount: 25.0,
                    job_count: 2,
                },
            ]
        );
    }
}
