//! Eligibility pipeline: score, rate correction, installment, affordability and limit checks.
//!
//! Steps short-circuit on the first rejection. Nothing here mutates state; the
//! create-loan path re-runs the same pipeline under the customer's ledger lock.

use crate::installment::{installment_for, LoanTerms};
use crate::models::{Customer, Loan};
use crate::rate::{correct_rate, RateDecision};
use crate::scoring::{compute_score, CreditScore};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a loan request was declined on policy grounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    CreditScoreTooLow,
    InstallmentExceedsIncomeShare,
    InsufficientCreditLimit,
}

impl RejectionReason {
    pub fn summary(&self) -> &'static str {
        match self {
            RejectionReason::CreditScoreTooLow => "credit score too low",
            RejectionReason::InstallmentExceedsIncomeShare => "EMI exceeds 50% of monthly salary",
            RejectionReason::InsufficientCreditLimit => "insufficient credit limit",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.summary())
    }
}

/// Outcome of the pipeline.
///
/// `corrected_rate` and `installment` are only set on approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub approved: bool,
    pub credit_score: CreditScore,
    pub corrected_rate: Option<BigDecimal>,
    pub installment: Option<BigDecimal>,
    pub reason: Option<RejectionReason>,
}

impl EligibilityDecision {
    fn approve(credit_score: CreditScore, rate: BigDecimal, installment: BigDecimal) -> Self {
        Self {
            approved: true,
            credit_score,
            corrected_rate: Some(rate),
            installment: Some(installment),
            reason: None,
        }
    }

    fn reject(credit_score: CreditScore, reason: RejectionReason) -> Self {
        Self {
            approved: false,
            credit_score,
            corrected_rate: None,
            installment: None,
            reason: Some(reason),
        }
    }

    /// Human-readable outcome.
    pub fn message(&self) -> String {
        match self.reason {
            Some(reason) => reason.summary().to_string(),
            None => "Loan approved".to_string(),
        }
    }
}

/// Runs the full pipeline, scoring the customer as of `as_of`.
pub fn evaluate(
    customer: &Customer,
    loans: &[Loan],
    terms: &LoanTerms,
    as_of: NaiveDate,
) -> EligibilityDecision {
    let score = compute_score(customer, loans, as_of);
    evaluate_with_score(customer, loans, terms, score)
}

/// Runs the pipeline from step 2 with an already computed score.
pub fn evaluate_with_score(
    customer: &Customer,
    loans: &[Loan],
    terms: &LoanTerms,
    score: CreditScore,
) -> EligibilityDecision {
    tracing::debug!(
        "Customer {} scored {} (history {}, mix {}, activity {}, utilization {}, override {})",
        customer.customer_id,
        score.total,
        score.payment_history,
        score.credit_mix,
        score.recent_activity,
        score.utilization,
        score.debt_override
    );

    let corrected_rate = match correct_rate(score.total, &terms.annual_rate) {
        RateDecision::Corrected(rate) => rate,
        RateDecision::Rejected => {
            return EligibilityDecision::reject(score, RejectionReason::CreditScoreTooLow)
        }
    };

    let installment = installment_for(&terms.principal, &corrected_rate, terms.tenure_months);

    let existing_installments = loans
        .iter()
        .filter(|loan| loan.is_active())
        .fold(BigDecimal::from(0), |acc, loan| {
            acc + &loan.monthly_installment
        });
    let total_installments = existing_installments + &installment;
    if total_installments * BigDecimal::from(2) > customer.monthly_income {
        return EligibilityDecision::reject(score, RejectionReason::InstallmentExceedsIncomeShare);
    }

    if &customer.current_debt + &terms.principal > customer.approved_limit {
        return EligibilityDecision::reject(score, RejectionReason::InsufficientCreditLimit);
    }

    EligibilityDecision::approve(score, corrected_rate, installment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoanStatus;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
    }

    fn customer(income: i64, limit: i64, debt: i64) -> Customer {
        Customer {
            customer_id: 42,
            first_name: "Ravi".to_string(),
            last_name: "Kumar".to_string(),
            age: 35,
            phone_number: 9123456780,
            monthly_income: BigDecimal::from(income),
            approved_limit: BigDecimal::from(limit),
            current_debt: BigDecimal::from(debt),
        }
    }

    fn loan(principal: i64, emi: &str, paid: u32, tenure: u32, status: LoanStatus) -> Loan {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        Loan {
            loan_id: 1,
            customer_id: 42,
            principal: BigDecimal::from(principal),
            tenure_months: tenure,
            interest_rate: dec("10"),
            monthly_installment: dec(emi),
            emis_paid_on_time: paid,
            start_date: start,
            end_date: start,
            status,
        }
    }

    fn terms(principal: &str, rate: &str, tenure: i64) -> LoanTerms {
        LoanTerms::new(dec(principal), dec(rate), tenure).unwrap()
    }

    #[test]
    fn test_new_customer_is_approved_at_requested_rate() {
        let decision = evaluate(
            &customer(50_000, 1_800_000, 0),
            &[],
            &terms("200000", "10.5", 24),
            as_of(),
        );

        assert!(decision.approved);
        assert_eq!(decision.credit_score.total, 100);
        assert_eq!(decision.corrected_rate, Some(dec("10.5")));
        assert_eq!(decision.installment, Some(dec("9275.21")));
        assert_eq!(decision.reason, None);
        assert_eq!(decision.message(), "Loan approved");
    }

    #[test]
    fn test_low_score_rejects_without_installment() {
        let score = CreditScore {
            payment_history: 0,
            credit_mix: 0,
            recent_activity: 5,
            utilization: 3,
            debt_management: 0,
            debt_override: false,
            total: 8,
        };
        let decision = evaluate_with_score(
            &customer(50_000, 1_800_000, 0),
            &[],
            &terms("100000", "12", 12),
            score,
        );

        assert!(!decision.approved);
        assert_eq!(decision.reason, Some(RejectionReason::CreditScoreTooLow));
        assert_eq!(decision.message(), "credit score too low");
        assert_eq!(decision.installment, None);
        assert_eq!(decision.corrected_rate, None);
    }

    #[test]
    fn test_existing_debt_over_limit_rejects_on_score() {
        let decision = evaluate(
            &customer(50_000, 1_000_000, 1_200_000),
            &[],
            &terms("1000", "12", 12),
            as_of(),
        );
        assert_eq!(decision.credit_score.total, 0);
        assert_eq!(decision.reason, Some(RejectionReason::CreditScoreTooLow));
    }

    #[test]
    fn test_middle_band_applies_corrected_rate_to_installment() {
        let score = CreditScore {
            payment_history: 20,
            credit_mix: 10,
            recent_activity: 5,
            utilization: 5,
            debt_management: 10,
            debt_override: false,
            total: 45,
        };
        let decision = evaluate_with_score(
            &customer(50_000, 1_800_000, 0),
            &[],
            &terms("100000", "8", 12),
            score,
        );

        assert!(decision.approved);
        assert_eq!(decision.corrected_rate, Some(dec("12")));
        assert_eq!(decision.installment, Some(dec("8884.88")));
    }

    #[test]
    fn test_active_installments_count_toward_income_share() {
        let loans = vec![loan(300_000, "20000.00", 5, 24, LoanStatus::Active)];
        // 20000 + 8884.88 > 25000
        let decision = evaluate(
            &customer(50_000, 1_800_000, 300_000),
            &loans,
            &terms("100000", "12", 12),
            as_of(),
        );
        assert!(!decision.approved);
        assert_eq!(
            decision.reason,
            Some(RejectionReason::InstallmentExceedsIncomeShare)
        );
        assert_eq!(decision.message(), "EMI exceeds 50% of monthly salary");
    }

    #[test]
    fn test_closed_loans_do_not_count_toward_income_share() {
        let loans = vec![loan(300_000, "20000.00", 24, 24, LoanStatus::Closed)];
        let decision = evaluate(
            &customer(50_000, 1_800_000, 0),
            &loans,
            &terms("100000", "12", 12),
            as_of(),
        );
        assert!(decision.approved);
    }

    #[test]
    fn test_installment_exactly_half_of_income_is_allowed() {
        // 100000 at 0% over 4 months = 25000, exactly half of 50000.
        let decision = evaluate(
            &customer(50_000, 1_800_000, 0),
            &[],
            &terms("100000", "0", 4),
            as_of(),
        );
        assert!(decision.approved);
        assert_eq!(decision.installment, Some(dec("25000.00")));
    }

    #[test]
    fn test_prospective_debt_over_limit_rejects() {
        let decision = evaluate(
            &customer(500_000, 1_000_000, 900_000),
            &[],
            &terms("100001", "12", 12),
            as_of(),
        );
        assert!(!decision.approved);
        assert_eq!(decision.reason, Some(RejectionReason::InsufficientCreditLimit));

        let decision = evaluate(
            &customer(500_000, 1_000_000, 900_000),
            &[],
            &terms("100000", "12", 12),
            as_of(),
        );
        assert!(decision.approved);
    }

    #[test]
    fn test_zero_income_rejects_on_affordability() {
        let decision = evaluate(
            &customer(0, 0, 0),
            &[],
            &terms("1000", "12", 12),
            as_of(),
        );
        assert_eq!(
            decision.reason,
            Some(RejectionReason::InstallmentExceedsIncomeShare)
        );
    }
}
