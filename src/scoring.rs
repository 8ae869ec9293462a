//! Credit score calculation.
//!
//! The score is a pure function of the customer's limit, debt and loan history.
//! Each sub-score is looked up in an ordered band table; the first matching band wins.

use crate::models::{Customer, Loan};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;

/// Band keyed on a ratio, expressed as an inclusive lower bound in percent.
struct RatioFloorBand {
    min_percent: u32,
    points: u8,
}

/// Band keyed on a count, expressed as an inclusive upper bound.
struct CountBand {
    max_count: usize,
    points: u8,
}

/// Band keyed on a ratio, expressed as an inclusive upper bound in percent.
/// `None` is unbounded.
struct RatioCeilingBand {
    max_percent: Option<u32>,
    points: u8,
}

const PAYMENT_HISTORY_BANDS: [RatioFloorBand; 4] = [
    RatioFloorBand { min_percent: 95, points: 30 },
    RatioFloorBand { min_percent: 80, points: 25 },
    RatioFloorBand { min_percent: 60, points: 20 },
    RatioFloorBand { min_percent: 0, points: 14 },
];

const CREDIT_MIX_BANDS: [CountBand; 4] = [
    CountBand { max_count: 3, points: 20 },
    CountBand { max_count: 6, points: 15 },
    CountBand { max_count: 10, points: 10 },
    CountBand { max_count: usize::MAX, points: 5 },
];

const RECENT_ACTIVITY_BANDS: [CountBand; 4] = [
    CountBand { max_count: 0, points: 20 },
    CountBand { max_count: 2, points: 15 },
    CountBand { max_count: 4, points: 10 },
    CountBand { max_count: usize::MAX, points: 5 },
];

const UTILIZATION_BANDS: [RatioCeilingBand; 4] = [
    RatioCeilingBand { max_percent: Some(30), points: 20 },
    RatioCeilingBand { max_percent: Some(60), points: 15 },
    RatioCeilingBand { max_percent: Some(80), points: 10 },
    RatioCeilingBand { max_percent: None, points: 5 },
];

/// Awarded while existing debt stays within the approved limit.
const DEBT_MANAGEMENT_POINTS: u8 = 10;

/// Breakdown of a computed credit score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScore {
    /// On-time installment ratio, 0-30.
    pub payment_history: u8,
    /// Number of loans held, 0-20.
    pub credit_mix: u8,
    /// Loans started in the current calendar year, 0-20.
    pub recent_activity: u8,
    /// Sum of principals against the approved limit, 0-20.
    pub utilization: u8,
    /// Existing debt within the approved limit, 0-10.
    pub debt_management: u8,
    /// Set when existing debt exceeds the approved limit; forces the total to 0.
    pub debt_override: bool,
    /// Final score in `[0, 100]`.
    pub total: u8,
}

/// Computes the credit score for `customer` from its full loan history.
///
/// `as_of` fixes the calendar year used for the recent-activity band so the
/// result is reproducible from the same inputs.
pub fn compute_score(customer: &Customer, loans: &[Loan], as_of: NaiveDate) -> CreditScore {
    let payment_history = payment_history_points(loans);
    let credit_mix = count_points(&CREDIT_MIX_BANDS, loans.len());
    let recent_activity = count_points(
        &RECENT_ACTIVITY_BANDS,
        loans
            .iter()
            .filter(|loan| loan.start_date.year() == as_of.year())
            .count(),
    );
    let utilization = utilization_points(loans, &customer.approved_limit);

    let debt_override = customer.current_debt > customer.approved_limit;
    let debt_management = if debt_override { 0 } else { DEBT_MANAGEMENT_POINTS };
    let total = if debt_override {
        0
    } else {
        (payment_history + credit_mix + recent_activity + utilization + debt_management)
            .min(MAX_SCORE)
    };

    CreditScore {
        payment_history,
        credit_mix,
        recent_activity,
        utilization,
        debt_management,
        debt_override,
        total,
    }
}

fn payment_history_points(loans: &[Loan]) -> u8 {
    let (paid, due) = loans.iter().fold((0u64, 0u64), |(paid, due), loan| {
        let tenure = u64::from(loan.tenure_months);
        (
            paid + u64::from(loan.emis_paid_on_time).min(tenure),
            due + tenure,
        )
    });

    // No installments due counts as a clean record.
    if due == 0 {
        return PAYMENT_HISTORY_BANDS[0].points;
    }

    PAYMENT_HISTORY_BANDS
        .iter()
        .find(|band| paid * 100 >= due * u64::from(band.min_percent))
        .map(|band| band.points)
        .unwrap_or(0)
}

fn count_points(bands: &[CountBand], count: usize) -> u8 {
    bands
        .iter()
        .find(|band| count <= band.max_count)
        .map(|band| band.points)
        .unwrap_or(0)
}

fn utilization_points(loans: &[Loan], approved_limit: &BigDecimal) -> u8 {
    let total_principal = loans
        .iter()
        .fold(BigDecimal::from(0), |acc, loan| acc + &loan.principal);

    // A zero limit is treated as full utilization.
    let limit_is_zero = *approved_limit == BigDecimal::from(0);

    UTILIZATION_BANDS
        .iter()
        .find(|band| match band.max_percent {
            None => true,
            Some(_) if limit_is_zero => false,
            Some(max_percent) => {
                &total_principal * BigDecimal::from(100)
                    <= approved_limit * BigDecimal::from(max_percent)
            }
        })
        .map(|band| band.points)
        .unwrap_or(0)
}
