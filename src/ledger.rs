//! Debt ledger coordinator.
//!
//! Serializes debt-changing operations per customer: reading `current_debt`,
//! re-running the eligibility pipeline, committing the loan and incrementing the
//! debt happen while holding that customer's exclusion. Different customers
//! proceed in parallel.

use crate::eligibility::{evaluate, EligibilityDecision};
use crate::errors::EngineError;
use crate::installment::LoanTerms;
use crate::models::{CustomerId, Loan, LoanId, NewLoan};
use crate::score_cache::ScoreCache;
use crate::storage::LoanStore;
use chrono::{Months, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-customer async locks, created on demand and dropped when unused.
#[derive(Default)]
struct CustomerLocks {
    locks: Mutex<HashMap<CustomerId, Arc<AsyncMutex<()>>>>,
}

impl CustomerLocks {
    /// Waits for the customer's lock; `None` waits as long as it takes.
    async fn acquire(
        &self,
        customer_id: CustomerId,
        timeout: Option<Duration>,
    ) -> Result<CustomerGuard<'_>, EngineError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| {
                EngineError::InternalError("ledger lock table poisoned".to_string())
            })?;
            locks.entry(customer_id).or_default().clone()
        };

        // Build the guard first so an abandoned wait still prunes the entry.
        let mut guard = CustomerGuard {
            locks: self,
            customer_id,
            held: None,
        };
        let held = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    EngineError::ConcurrencyConflict(format!(
                        "timed out after {:?} waiting for customer {}",
                        timeout, customer_id
                    ))
                })?,
            None => lock.lock_owned().await,
        };
        guard.held = Some(held);
        Ok(guard)
    }

    fn prune(&self, customer_id: CustomerId) {
        if let Ok(mut locks) = self.locks.lock() {
            let unused = locks
                .get(&customer_id)
                .map(|lock| Arc::strong_count(lock) == 1)
                .unwrap_or(false);
            if unused {
                locks.remove(&customer_id);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

struct CustomerGuard<'a> {
    locks: &'a CustomerLocks,
    customer_id: CustomerId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for CustomerGuard<'_> {
    fn drop(&mut self) {
        // Release before pruning so the table only holds its own reference.
        self.held.take();
        self.locks.prune(self.customer_id);
    }
}

/// Result of a create-loan attempt.
#[derive(Debug, Clone)]
pub struct LoanCreation {
    pub decision: EligibilityDecision,
    /// Set only when the decision approved the loan.
    pub loan: Option<Loan>,
}

/// Owns every mutation of customer debt.
pub struct DebtLedger<S> {
    store: Arc<S>,
    scores: ScoreCache,
    locks: CustomerLocks,
    lock_timeout: Option<Duration>,
}

impl<S: LoanStore> DebtLedger<S> {
    /// `lock_timeout` bounds the wait for a busy customer; past it the call
    /// fails with `ConcurrencyConflict`. `None` waits for the lock.
    pub fn new(store: Arc<S>, scores: ScoreCache, lock_timeout: Option<Duration>) -> Self {
        Self {
            store,
            scores,
            locks: CustomerLocks::default(),
            lock_timeout,
        }
    }

    /// Re-runs eligibility against fresh data and, on approval, commits the loan
    /// and the debt increment as one unit.
    ///
    /// `today` becomes the loan's start date and fixes the scoring year.
    pub async fn create_loan(
        &self,
        customer_id: CustomerId,
        terms: &LoanTerms,
        today: NaiveDate,
    ) -> Result<LoanCreation, EngineError> {
        let _guard = self.locks.acquire(customer_id, self.lock_timeout).await?;

        let customer = self.store.fetch_customer(customer_id).await?;
        let loans = self.store.fetch_loans(customer_id).await?;
        let decision = evaluate(&customer, &loans, terms, today);

        let (rate, installment) = match (&decision.corrected_rate, &decision.installment) {
            (Some(rate), Some(installment)) if decision.approved => {
                (rate.clone(), installment.clone())
            }
            _ => {
                tracing::info!(
                    "Loan for customer {} declined: {}",
                    customer_id,
                    decision.message()
                );
                return Ok(LoanCreation {
                    decision,
                    loan: None,
                });
            }
        };

        let end_date = today
            .checked_add_months(Months::new(terms.tenure_months))
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "loan end date out of range for start {} and tenure {}",
                    today, terms.tenure_months
                ))
            })?;

        let new_loan = NewLoan {
            customer_id,
            principal: terms.principal.clone(),
            tenure_months: terms.tenure_months,
            interest_rate: rate,
            monthly_installment: installment,
            start_date: today,
            end_date,
        };

        let loan = self
            .store
            .commit_loan(new_loan, customer.current_debt.clone())
            .await?;
        self.scores.invalidate(customer_id).await;

        tracing::info!(
            "Loan {} created for customer {}: principal {}, rate {}, EMI {}",
            loan.loan_id,
            customer_id,
            loan.principal,
            loan.interest_rate,
            loan.monthly_installment
        );

        Ok(LoanCreation {
            decision,
            loan: Some(loan),
        })
    }

    /// Closes an active loan and releases its principal from the owner's debt.
    pub async fn close_loan(&self, loan_id: LoanId) -> Result<Loan, EngineError> {
        let owner = self.store.fetch_loan(loan_id).await?.customer_id;
        let _guard = self.locks.acquire(owner, self.lock_timeout).await?;

        let customer = self.store.fetch_customer(owner).await?;
        let closed = self
            .store
            .close_loan(loan_id, customer.current_debt.clone())
            .await?;
        self.scores.invalidate(owner).await;

        tracing::info!(
            "Loan {} closed, released {} for customer {}",
            loan_id,
            closed.principal,
            owner
        );
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::RejectionReason;
    use crate::models::{Customer, LoanStatus};
    use crate::storage::InMemoryStore;
    use bigdecimal::BigDecimal;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
    }

    fn ledger_with_customer(limit: i64) -> (Arc<InMemoryStore>, DebtLedger<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed_customer(Customer {
                customer_id: 7,
                first_name: "Neha".to_string(),
                last_name: "Gupta".to_string(),
                age: 33,
                phone_number: 9812345678,
                monthly_income: BigDecimal::from(1_000_000),
                approved_limit: BigDecimal::from(limit),
                current_debt: BigDecimal::from(0),
            })
            .unwrap();
        let ledger = DebtLedger::new(
            store.clone(),
            ScoreCache::disabled(),
            Some(Duration::from_secs(5)),
        );
        (store, ledger)
    }

    fn terms(principal: i64, tenure: i64) -> LoanTerms {
        LoanTerms::new(BigDecimal::from(principal), BigDecimal::from(10), tenure).unwrap()
    }

    #[tokio::test]
    async fn test_approved_loan_is_committed_with_dates() {
        let (store, ledger) = ledger_with_customer(1_000_000);

        let created = ledger.create_loan(7, &terms(100_000, 1), today()).await.unwrap();

        assert!(created.decision.approved);
        let loan = created.loan.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.start_date, today());
        // Clamped to the end of February.
        assert_eq!(loan.end_date, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        assert_eq!(Some(loan.monthly_installment), created.decision.installment);
        assert_eq!(
            store.fetch_customer(7).await.unwrap().current_debt,
            BigDecimal::from(100_000)
        );
    }

    #[tokio::test]
    async fn test_rejected_loan_changes_nothing() {
        let (store, ledger) = ledger_with_customer(1_000_000);

        let created = ledger
            .create_loan(7, &terms(1_000_001, 360), today())
            .await
            .unwrap();

        assert!(!created.decision.approved);
        assert_eq!(
            created.decision.reason,
            Some(RejectionReason::InsufficientCreditLimit)
        );
        assert!(created.loan.is_none());
        assert!(store.fetch_loans(7).await.unwrap().is_empty());
        assert_eq!(
            store.fetch_customer(7).await.unwrap().current_debt,
            BigDecimal::from(0)
        );
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let (_, ledger) = ledger_with_customer(1_000_000);
        let err = ledger.create_loan(8, &terms(1_000, 12), today()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_close_loan_releases_debt() {
        let (store, ledger) = ledger_with_customer(1_000_000);
        let loan = ledger
            .create_loan(7, &terms(100_000, 12), today())
            .await
            .unwrap()
            .loan
            .unwrap();

        let closed = ledger.close_loan(loan.loan_id).await.unwrap();

        assert_eq!(closed.status, LoanStatus::Closed);
        assert_eq!(
            store.fetch_customer(7).await.unwrap().current_debt,
            BigDecimal::from(0)
        );
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned_after_use() {
        let (_, ledger) = ledger_with_customer(1_000_000);
        ledger.create_loan(7, &terms(1_000, 12), today()).await.unwrap();
        assert_eq!(ledger.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_wait_times_out_as_conflict() {
        let locks = CustomerLocks::default();
        let _held = locks.acquire(7, None).await.unwrap();

        let err = locks
            .acquire(7, Some(Duration::from_millis(20)))
            .await
            .err()
            .unwrap();
        assert!(err.is_conflict());

        // Other customers are unaffected.
        assert!(locks.acquire(8, Some(Duration::from_millis(20))).await.is_ok());
    }

    #[tokio::test]
    async fn test_untimed_wait_gets_lock_once_released() {
        let locks = Arc::new(CustomerLocks::default());
        let held = locks.acquire(7, None).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(7, None).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(locks.len(), 0);
    }
}
