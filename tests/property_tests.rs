/// Property-based tests using proptest
/// Tests invariants that should hold for all valid inputs
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::NaiveDate;
use credit_decision_engine::eligibility::evaluate;
use credit_decision_engine::installment::{compute_installment, LoanTerms};
use credit_decision_engine::models::{Customer, Loan, LoanStatus};
use credit_decision_engine::rate::{correct_rate, RateDecision};
use credit_decision_engine::scoring::compute_score;
use proptest::prelude::*;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
}

/// Rate in hundredths of a percent, e.g. 1050 -> 10.50.
fn rate(hundredths: u32) -> BigDecimal {
    BigDecimal::new(hundredths.into(), 2)
}

fn customer(income: u64, limit: u64, debt: u64) -> Customer {
    Customer {
        customer_id: 1,
        first_name: "Prop".to_string(),
        last_name: "Test".to_string(),
        age: 40,
        phone_number: 9000000000,
        monthly_income: BigDecimal::from(income),
        approved_limit: BigDecimal::from(limit),
        current_debt: BigDecimal::from(debt),
    }
}

fn arb_loan() -> impl Strategy<Value = Loan> {
    (
        1u64..5_000_000,
        1u32..=360,
        0u32..400,
        2015i32..=2026,
        any::<bool>(),
    )
        .prop_map(|(principal, tenure, paid, year, active)| {
            let start = NaiveDate::from_ymd_opt(year, 3, 15).unwrap();
            Loan {
                loan_id: 1,
                customer_id: 1,
                principal: BigDecimal::from(principal),
                tenure_months: tenure,
                interest_rate: BigDecimal::from(12),
                monthly_installment: BigDecimal::from(principal / u64::from(tenure) + 1),
                emis_paid_on_time: paid,
                start_date: start,
                end_date: start,
                status: if active {
                    LoanStatus::Active
                } else {
                    LoanStatus::Closed
                },
            }
        })
}

// Property: score stays in range and the debt override forces zero
proptest! {
    #[test]
    fn score_is_always_within_bounds(
        limit in 0u64..50_000_000,
        debt in 0u64..50_000_000,
        loans in prop::collection::vec(arb_loan(), 0..15)
    ) {
        let score = compute_score(&customer(50_000, limit, debt), &loans, as_of());
        prop_assert!(score.total <= 100);
    }

    #[test]
    fn debt_over_limit_scores_zero(
        limit in 0u64..10_000_000,
        excess in 1u64..10_000_000,
        loans in prop::collection::vec(arb_loan(), 0..15)
    ) {
        let score = compute_score(&customer(50_000, limit, limit + excess), &loans, as_of());
        prop_assert_eq!(score.total, 0);
        prop_assert!(score.debt_override);
    }
}

// Property: installment monotonicity and the zero-rate case
proptest! {
    #[test]
    fn installment_grows_with_rate(
        principal in 1_000u64..10_000_000,
        low in 1u32..9_000,
        step in 1u32..1_000,
        tenure in 1i64..=360
    ) {
        let p = BigDecimal::from(principal);
        let cheaper = compute_installment(&p, &rate(low), tenure).unwrap();
        let dearer = compute_installment(&p, &rate(low + step), tenure).unwrap();
        prop_assert!(dearer >= cheaper);
    }

    #[test]
    fn installment_grows_with_principal(
        principal in 1_000u64..10_000_000,
        extra in 1u64..1_000_000,
        r in 1u32..10_000,
        tenure in 1i64..=360
    ) {
        let smaller = compute_installment(&BigDecimal::from(principal), &rate(r), tenure).unwrap();
        let larger = compute_installment(&BigDecimal::from(principal + extra), &rate(r), tenure).unwrap();
        prop_assert!(larger >= smaller);
    }

    #[test]
    fn installment_shrinks_with_tenure(
        principal in 1_000u64..10_000_000,
        r in 1u32..10_000,
        tenure in 1i64..360
    ) {
        let p = BigDecimal::from(principal);
        let shorter = compute_installment(&p, &rate(r), tenure).unwrap();
        let longer = compute_installment(&p, &rate(r), tenure + 1).unwrap();
        prop_assert!(longer <= shorter);
    }

    #[test]
    fn zero_rate_is_plain_division(
        principal_cents in 1u64..1_000_000_000,
        tenure in 1i64..=360
    ) {
        let p = BigDecimal::new(principal_cents.into(), 2);
        let expected = (&p / BigDecimal::from(tenure)).with_scale_round(2, RoundingMode::HalfUp);
        prop_assert_eq!(compute_installment(&p, &BigDecimal::from(0), tenure).unwrap(), expected);
    }
}

// Property: rate correction never lowers the requested rate
proptest! {
    #[test]
    fn corrected_rate_never_below_requested(score in 0u8..=100, requested in 0u32..=10_000) {
        let requested = rate(requested);
        match correct_rate(score, &requested) {
            RateDecision::Corrected(corrected) => {
                prop_assert!(corrected >= requested);
                if score > 50 {
                    prop_assert_eq!(corrected, requested);
                }
            }
            RateDecision::Rejected => prop_assert!(score <= 10),
        }
    }
}

// Property: the pipeline is deterministic
proptest! {
    #[test]
    fn eligibility_is_idempotent(
        income in 0u64..500_000,
        limit in 0u64..20_000_000,
        debt in 0u64..20_000_000,
        loans in prop::collection::vec(arb_loan(), 0..8),
        principal in 1u64..5_000_000,
        r in 0u32..=10_000,
        tenure in 1i64..=360
    ) {
        let customer = customer(income, limit, debt);
        let terms = LoanTerms::new(BigDecimal::from(principal), rate(r), tenure).unwrap();

        let first = evaluate(&customer, &loans, &terms, as_of());
        let second = evaluate(&customer, &loans, &terms, as_of());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.approved, first.installment.is_some());
        prop_assert_eq!(first.approved, first.reason.is_none());
    }
}
