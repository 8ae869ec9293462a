/// End-to-end eligibility scenarios over seeded loan histories
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use credit_decision_engine::eligibility::RejectionReason;
use credit_decision_engine::models::{Customer, Loan, LoanRequest, LoanStatus};
use credit_decision_engine::score_cache::ScoreCache;
use credit_decision_engine::services::CreditService;
use credit_decision_engine::storage::InMemoryStore;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
}

fn customer(limit: &str, debt: &str, income: &str) -> Customer {
    Customer {
        customer_id: 11,
        first_name: "Farhan".to_string(),
        last_name: "Ali".to_string(),
        age: 52,
        phone_number: 9988001122,
        monthly_income: dec(income),
        approved_limit: dec(limit),
        current_debt: dec(debt),
    }
}

fn history_loan(
    loan_id: i64,
    principal: &str,
    emi: &str,
    paid: u32,
    tenure: u32,
    start: NaiveDate,
    status: LoanStatus,
) -> Loan {
    Loan {
        loan_id,
        customer_id: 11,
        principal: dec(principal),
        tenure_months: tenure,
        interest_rate: dec("11"),
        monthly_installment: dec(emi),
        emis_paid_on_time: paid,
        start_date: start,
        end_date: start,
        status,
    }
}

fn service_with(customer: Customer, loans: Vec<Loan>) -> CreditService<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.seed_customer(customer).unwrap();
    for loan in loans {
        store.seed_loan(loan).unwrap();
    }
    CreditService::new(store, ScoreCache::disabled(), Some(Duration::from_secs(5)))
}

fn request(amount: &str, rate: &str, tenure: i64) -> LoanRequest {
    LoanRequest {
        customer_id: 11,
        loan_amount: dec(amount),
        interest_rate: dec(rate),
        tenure,
    }
}

#[tokio::test]
async fn new_customer_gets_requested_rate() {
    let service = service_with(customer("1800000", "0", "50000"), vec![]);

    let decision = service
        .check_eligibility(&request("200000", "10.5", 24), today())
        .await
        .unwrap();

    assert!(decision.approved);
    assert_eq!(decision.credit_score.total, 100);
    assert_eq!(decision.corrected_rate, Some(dec("10.5")));
    assert_eq!(decision.installment, Some(dec("9275.21")));
}

#[tokio::test]
async fn patchy_history_raises_rate_to_band_floor() {
    let old = NaiveDate::from_ymd_opt(2019, 2, 1).unwrap();
    // 8 loans, 48 of 96 installments on time (50%): history 14, mix 10.
    // 3 started this year: activity 10. Principal 2.4M of a 2.9M limit: utilization 5.
    // No debt: debt management 10.
    let mut loans: Vec<Loan> = (1..=8)
        .map(|id| history_loan(id, "300000", "1000", 0, 12, old, LoanStatus::Closed))
        .collect();
    for (idx, loan) in loans.iter_mut().enumerate() {
        loan.emis_paid_on_time = if idx < 4 { 12 } else { 0 };
        if idx >= 5 {
            loan.start_date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        }
    }

    let service = service_with(customer("2900000", "0", "200000"), loans);
    let score = service.compute_score(11, today()).await.unwrap();
    assert_eq!(score.total, 49);

    let decision = service
        .check_eligibility(&request("100000", "9", 12), today())
        .await
        .unwrap();
    assert!(decision.approved);
    assert_eq!(decision.corrected_rate, Some(dec("12")));
    assert_eq!(decision.installment, Some(dec("8884.88")));
}

#[tokio::test]
async fn debt_above_limit_is_rejected_on_score() {
    let service = service_with(customer("500000", "600000", "90000"), vec![]);

    let decision = service
        .check_eligibility(&request("1000", "14", 6), today())
        .await
        .unwrap();

    assert!(!decision.approved);
    assert!(decision.credit_score.debt_override);
    assert_eq!(decision.credit_score.total, 0);
    assert_eq!(decision.reason, Some(RejectionReason::CreditScoreTooLow));
    assert_eq!(decision.installment, None);
}

#[tokio::test]
async fn active_emis_block_affordability() {
    let started = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let loans = vec![history_loan(1, "500000", "20000", 12, 36, started, LoanStatus::Active)];
    let service = service_with(customer("1800000", "500000", "50000"), loans);

    let decision = service
        .create_loan(&request("300000", "8", 12), today())
        .await
        .unwrap();

    assert!(!decision.decision.approved);
    assert_eq!(
        decision.decision.reason,
        Some(RejectionReason::InstallmentExceedsIncomeShare)
    );
    assert!(decision.loan.is_none());
}
