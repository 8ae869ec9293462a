use crate::models::{Customer, CustomerId, Loan, LoanId};
use crate::scoring::{compute_score, CreditScore};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use moka::future::Cache;
use std::time::Duration;

/// Everything about one loan that feeds the score.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct LoanInputs {
    loan_id: LoanId,
    principal: BigDecimal,
    tenure_months: u32,
    emis_paid_on_time: u32,
    start_year: i32,
}

/// The scoring inputs a cached entry was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScoreFingerprint {
    year: i32,
    approved_limit: BigDecimal,
    current_debt: BigDecimal,
    /// Sorted by loan id; storage order carries no meaning.
    loans: Vec<LoanInputs>,
}

impl ScoreFingerprint {
    fn of(customer: &Customer, loans: &[Loan], as_of: NaiveDate) -> Self {
        let mut inputs: Vec<LoanInputs> = loans
            .iter()
            .map(|loan| LoanInputs {
                loan_id: loan.loan_id,
                principal: loan.principal.clone(),
                tenure_months: loan.tenure_months,
                emis_paid_on_time: loan.emis_paid_on_time,
                start_year: loan.start_date.year(),
            })
            .collect();
        inputs.sort();

        Self {
            year: as_of.year(),
            approved_limit: customer.approved_limit.clone(),
            current_debt: customer.current_debt.clone(),
            loans: inputs,
        }
    }
}

/// Cache of computed credit scores.
///
/// An entry is only a copy: it is served when the caller's freshly loaded
/// customer and loans still match the inputs it was computed from, and the
/// ledger invalidates a customer whenever its loans or debt change.
#[derive(Clone)]
pub struct ScoreCache {
    inner: Option<Cache<CustomerId, (ScoreFingerprint, CreditScore)>>,
}

impl ScoreCache {
    /// A `ttl` of zero disables caching.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        if ttl.is_zero() {
            return Self::disabled();
        }

        let inner = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        Self { inner: Some(inner) }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Returns the cached score when still valid, otherwise computes and caches it.
    pub async fn get_or_compute(
        &self,
        customer: &Customer,
        loans: &[Loan],
        as_of: NaiveDate,
    ) -> CreditScore {
        let Some(cache) = &self.inner else {
            return compute_score(customer, loans, as_of);
        };

        let fingerprint = ScoreFingerprint::of(customer, loans, as_of);
        if let Some((cached_for, score)) = cache.get(&customer.customer_id).await {
            if cached_for == fingerprint {
                tracing::debug!("Score cache hit for customer {}", customer.customer_id);
                return score;
            }
        }

        let score = compute_score(customer, loans, as_of);
        cache
            .insert(customer.customer_id, (fingerprint, score))
            .await;
        score
    }

    pub async fn invalidate(&self, customer_id: CustomerId) {
        if let Some(cache) = &self.inner {
            cache.invalidate(&customer_id).await;
        }
    }

    /// Whether a valid entry exists for these inputs.
    #[cfg(test)]
    async fn contains(&self, customer: &Customer, loans: &[Loan], as_of: NaiveDate) -> bool {
        match &self.inner {
            Some(cache) => cache
                .get(&customer.customer_id)
                .await
                .map(|(cached_for, _)| cached_for == ScoreFingerprint::of(customer, loans, as_of))
                .unwrap_or(false),
            None => false,
        }
    }
}
