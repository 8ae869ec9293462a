use crate::eligibility::{evaluate_with_score, EligibilityDecision};
use crate::errors::{EngineError, ResultExt};
use crate::installment::{compute_installment, validate_amount, LoanTerms};
use crate::ledger::{DebtLedger, LoanCreation};
use crate::models::*;
use crate::score_cache::ScoreCache;
use crate::scoring::CreditScore;
use crate::storage::LoanStore;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

const MIN_AGE: i32 = 18;
const MAX_AGE: i32 = 100;
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;
const LIMIT_INCOME_MULTIPLIER: i64 = 36;
const LAKH: i64 = 100_000;

/// `36 × monthly_income`, rounded to the nearest lakh with ties to even.
pub fn approved_limit_for(monthly_income: &BigDecimal) -> BigDecimal {
    let lakh = BigDecimal::from(LAKH);
    let raw = monthly_income * BigDecimal::from(LIMIT_INCOME_MULTIPLIER);
    (raw / &lakh).with_scale_round(0, RoundingMode::HalfEven) * lakh
}

fn validate_registration(request: &RegisterRequest) -> Result<(), EngineError> {
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(EngineError::Validation(
            "first_name and last_name are required".to_string(),
        ));
    }
    if !(MIN_AGE..=MAX_AGE).contains(&request.age) {
        return Err(EngineError::Validation(format!(
            "age must be between {} and {}, got {}",
            MIN_AGE, MAX_AGE, request.age
        )));
    }
    if request.monthly_income < BigDecimal::zero() {
        return Err(EngineError::Validation(
            "monthly_income must not be negative".to_string(),
        ));
    }
    validate_amount("monthly_income", &request.monthly_income)?;
    validate_amount("approved_limit", &approved_limit_for(&request.monthly_income))?;
    if request.phone_number <= 0 {
        return Err(EngineError::Validation(
            "phone_number must be positive".to_string(),
        ));
    }
    let digits = request.phone_number.to_string().len();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(EngineError::Validation(format!(
            "phone_number must be between {} and {} digits",
            MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
        )));
    }
    Ok(())
}

/// Entry point for every credit operation.
///
/// Reads go straight to the store (scores through the cache); anything that
/// changes a customer's debt goes through the [`DebtLedger`].
pub struct CreditService<S> {
    store: Arc<S>,
    ledger: DebtLedger<S>,
    scores: ScoreCache,
}

impl<S: LoanStore> CreditService<S> {
    pub fn new(store: Arc<S>, scores: ScoreCache, lock_timeout: Option<Duration>) -> Self {
        let ledger = DebtLedger::new(store.clone(), scores.clone(), lock_timeout);
        Self {
            store,
            ledger,
            scores,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Registers a customer with a limit derived from income and no debt.
    pub async fn register(&self, request: RegisterRequest) -> Result<Customer, EngineError> {
        validate_registration(&request)?;

        let approved_limit = approved_limit_for(&request.monthly_income);
        let customer = self
            .store
            .insert_customer(NewCustomer {
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                age: request.age,
                phone_number: request.phone_number,
                monthly_income: request.monthly_income,
                approved_limit,
            })
            .await
            .context("Failed to register customer")?;

        tracing::info!(
            "Registered customer {} with approved limit {}",
            customer.customer_id,
            customer.approved_limit
        );
        Ok(customer)
    }

    /// Credit score of a customer as of `as_of`.
    pub async fn compute_score(
        &self,
        customer_id: CustomerId,
        as_of: NaiveDate,
    ) -> Result<CreditScore, EngineError> {
        let customer = self.store.fetch_customer(customer_id).await?;
        let loans = self.store.fetch_loans(customer_id).await?;
        Ok(self.scores.get_or_compute(&customer, &loans, as_of).await)
    }

    /// Advisory eligibility check; changes nothing.
    pub async fn check_eligibility(
        &self,
        request: &LoanRequest,
        as_of: NaiveDate,
    ) -> Result<EligibilityDecision, EngineError> {
        let terms = LoanTerms::new(
            request.loan_amount.clone(),
            request.interest_rate.clone(),
            request.tenure,
        )?;

        let customer = self.store.fetch_customer(request.customer_id).await?;
        let loans = self.store.fetch_loans(request.customer_id).await?;
        let score = self.scores.get_or_compute(&customer, &loans, as_of).await;
        let decision = evaluate_with_score(&customer, &loans, &terms, score);

        tracing::info!(
            "Eligibility for customer {}: approved={}, score={}",
            request.customer_id,
            decision.approved,
            decision.credit_score.total
        );
        Ok(decision)
    }

    /// Re-evaluates eligibility under the customer's ledger lock and books the loan on approval.
    pub async fn create_loan(
        &self,
        request: &LoanRequest,
        today: NaiveDate,
    ) -> Result<LoanCreation, EngineError> {
        let terms = LoanTerms::new(
            request.loan_amount.clone(),
            request.interest_rate.clone(),
            request.tenure,
        )?;
        self.ledger
            .create_loan(request.customer_id, &terms, today)
            .await
    }

    pub fn compute_installment(
        &self,
        principal: &BigDecimal,
        annual_rate: &BigDecimal,
        tenure_months: i64,
    ) -> Result<BigDecimal, EngineError> {
        compute_installment(principal, annual_rate, tenure_months)
    }

    /// A loan together with its owner.
    pub async fn view_loan(&self, loan_id: LoanId) -> Result<(Loan, Customer), EngineError> {
        let loan = self.store.fetch_loan(loan_id).await?;
        let customer = self
            .store
            .fetch_customer(loan.customer_id)
            .await
            .with_context(|| format!("Failed to load owner of loan {}", loan_id))?;
        Ok((loan, customer))
    }

    /// Active loans of a customer, oldest first.
    pub async fn view_customer_loans(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Loan>, EngineError> {
        self.store.fetch_customer(customer_id).await?;
        let mut loans: Vec<Loan> = self
            .store
            .fetch_loans(customer_id)
            .await?
            .into_iter()
            .filter(Loan::is_active)
            .collect();
        loans.sort_by_key(|loan| loan.loan_id);
        Ok(loans)
    }

    pub async fn close_loan(&self, loan_id: LoanId) -> Result<Loan, EngineError> {
        self.ledger.close_loan(loan_id).await
    }
}
