//! Storage collaborator contract and an in-memory implementation.

use crate::errors::EngineError;
use crate::models::{Customer, CustomerId, Loan, LoanId, LoanStatus, NewCustomer, NewLoan};
use bigdecimal::BigDecimal;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::RwLock;

/// Persistence operations the engine relies on.
///
/// Mutations that touch `current_debt` take the debt value the caller based its
/// decision on and must fail with [`EngineError::ConcurrencyConflict`] when the
/// stored value differs, leaving nothing changed.
pub trait LoanStore: Send + Sync {
    fn insert_customer(
        &self,
        customer: NewCustomer,
    ) -> impl Future<Output = Result<Customer, EngineError>> + Send;

    /// Fails with `NotFound` when the customer does not exist.
    fn fetch_customer(
        &self,
        customer_id: CustomerId,
    ) -> impl Future<Output = Result<Customer, EngineError>> + Send;

    /// All loans of the customer, any status, in no particular order.
    fn fetch_loans(
        &self,
        customer_id: CustomerId,
    ) -> impl Future<Output = Result<Vec<Loan>, EngineError>> + Send;

    /// Fails with `NotFound` when the loan does not exist.
    fn fetch_loan(&self, loan_id: LoanId)
        -> impl Future<Output = Result<Loan, EngineError>> + Send;

    /// Inserts the loan and adds its principal to the owner's debt as one unit.
    fn commit_loan(
        &self,
        loan: NewLoan,
        expected_debt: BigDecimal,
    ) -> impl Future<Output = Result<Loan, EngineError>> + Send;

    /// Marks an active loan closed and subtracts its principal from the owner's
    /// debt (floored at zero) as one unit.
    fn close_loan(
        &self,
        loan_id: LoanId,
        expected_debt: BigDecimal,
    ) -> impl Future<Output = Result<Loan, EngineError>> + Send;
}

#[derive(Default)]
struct MemoryState {
    customers: HashMap<CustomerId, Customer>,
    loans: BTreeMap<LoanId, Loan>,
    next_customer_id: CustomerId,
    next_loan_id: LoanId,
}

impl MemoryState {
    fn customer_mut(&mut self, customer_id: CustomerId) -> Result<&mut Customer, EngineError> {
        self.customers
            .get_mut(&customer_id)
            .ok_or_else(|| EngineError::NotFound(format!("Customer {} not found", customer_id)))
    }
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a customer with its own id.
    pub fn seed_customer(&self, customer: Customer) -> Result<(), EngineError> {
        let mut state = self.write()?;
        state.next_customer_id = state.next_customer_id.max(customer.customer_id);
        state.customers.insert(customer.customer_id, customer);
        Ok(())
    }

    /// Inserts or replaces a historical loan with its own id; debt is left untouched.
    pub fn seed_loan(&self, loan: Loan) -> Result<(), EngineError> {
        let mut state = self.write()?;
        if !state.customers.contains_key(&loan.customer_id) {
            return Err(EngineError::NotFound(format!(
                "Customer {} not found for loan {}",
                loan.customer_id, loan.loan_id
            )));
        }
        state.next_loan_id = state.next_loan_id.max(loan.loan_id);
        state.loans.insert(loan.loan_id, loan);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, EngineError> {
        self.state
            .read()
            .map_err(|_| EngineError::InternalError("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, EngineError> {
        self.state
            .write()
            .map_err(|_| EngineError::InternalError("in-memory store lock poisoned".to_string()))
    }
}

fn debt_conflict(customer_id: CustomerId) -> EngineError {
    EngineError::ConcurrencyConflict(format!(
        "current debt of customer {} changed concurrently",
        customer_id
    ))
}

impl LoanStore for InMemoryStore {
    async fn insert_customer(&self, customer: NewCustomer) -> Result<Customer, EngineError> {
        let mut state = self.write()?;
        state.next_customer_id += 1;
        let stored = Customer {
            customer_id: state.next_customer_id,
            first_name: customer.first_name,
            last_name: customer.last_name,
            age: customer.age,
            phone_number: customer.phone_number,
            monthly_income: customer.monthly_income,
            approved_limit: customer.approved_limit,
            current_debt: BigDecimal::from(0),
        };
        state.customers.insert(stored.customer_id, stored.clone());
        Ok(stored)
    }

    async fn fetch_customer(&self, customer_id: CustomerId) -> Result<Customer, EngineError> {
        self.read()?
            .customers
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Customer {} not found", customer_id)))
    }

    async fn fetch_loans(&self, customer_id: CustomerId) -> Result<Vec<Loan>, EngineError> {
        Ok(self
            .read()?
            .loans
            .values()
            .filter(|loan| loan.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn fetch_loan(&self, loan_id: LoanId) -> Result<Loan, EngineError> {
        self.read()?
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Loan {} not found", loan_id)))
    }

    async fn commit_loan(
        &self,
        loan: NewLoan,
        expected_debt: BigDecimal,
    ) -> Result<Loan, EngineError> {
        let mut state = self.write()?;

        let customer = state.customer_mut(loan.customer_id)?;
        if customer.current_debt != expected_debt {
            return Err(debt_conflict(loan.customer_id));
        }
        customer.current_debt = &customer.current_debt + &loan.principal;

        state.next_loan_id += 1;
        let stored = Loan {
            loan_id: state.next_loan_id,
            customer_id: loan.customer_id,
            principal: loan.principal,
            tenure_months: loan.tenure_months,
            interest_rate: loan.interest_rate,
            monthly_installment: loan.monthly_installment,
            emis_paid_on_time: 0,
            start_date: loan.start_date,
            end_date: loan.end_date,
            status: LoanStatus::Active,
        };
        state.loans.insert(stored.loan_id, stored.clone());
        Ok(stored)
    }

    async fn close_loan(
        &self,
        loan_id: LoanId,
        expected_debt: BigDecimal,
    ) -> Result<Loan, EngineError> {
        let mut state = self.write()?;

        let loan = state
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Loan {} not found", loan_id)))?;
        if !loan.is_active() {
            return Err(EngineError::Validation(format!(
                "Loan {} is already closed",
                loan_id
            )));
        }

        let customer = state.customer_mut(loan.customer_id)?;
        if customer.current_debt != expected_debt {
            return Err(debt_conflict(loan.customer_id));
        }
        let remaining = &customer.current_debt - &loan.principal;
        customer.current_debt = remaining.max(BigDecimal::from(0));

        let closed = Loan {
            status: LoanStatus::Closed,
            ..loan
        };
        state.loans.insert(loan_id, closed.clone());
        Ok(closed)
    }
}
