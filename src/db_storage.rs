use crate::errors::{EngineError, ResultExt};
use crate::models::{Customer, CustomerId, Loan, LoanId, LoanStatus, NewCustomer, NewLoan};
use crate::storage::LoanStore;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// Raw `loans` row; converted to [`Loan`] after range checks.
#[derive(Debug, FromRow)]
struct LoanRow {
    loan_id: i64,
    customer_id: i64,
    principal: BigDecimal,
    tenure_months: i32,
    interest_rate: BigDecimal,
    monthly_installment: BigDecimal,
    emis_paid_on_time: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
}

impl TryFrom<LoanRow> for Loan {
    type Error = EngineError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| {
            EngineError::InternalError(format!("loan {} has invalid {}", row.loan_id, field))
        };

        Ok(Loan {
            loan_id: row.loan_id,
            customer_id: row.customer_id,
            tenure_months: u32::try_from(row.tenure_months).map_err(|_| corrupt("tenure"))?,
            emis_paid_on_time: u32::try_from(row.emis_paid_on_time)
                .map_err(|_| corrupt("emis_paid_on_time"))?,
            status: row.status.parse().map_err(|_| corrupt("status"))?,
            principal: row.principal,
            interest_rate: row.interest_rate,
            monthly_installment: row.monthly_installment,
            start_date: row.start_date,
            end_date: row.end_date,
        })
    }
}

fn to_db_int(value: u32, field: &str) -> Result<i32, EngineError> {
    i32::try_from(value)
        .map_err(|_| EngineError::Validation(format!("{} out of range: {}", field, value)))
}

/// Postgres implementation of [`LoanStore`].
///
/// Debt mutations run in one transaction and only apply while `current_debt`
/// still equals the value the caller decided on.
#[derive(Clone)]
pub struct PgLoanStore {
    pool: PgPool,
}

impl PgLoanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or overwrites a customer under its own id.
    pub async fn upsert_customer(&self, customer: &Customer) -> Result<bool, EngineError> {
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO customers (
                customer_id, first_name, last_name, age, phone_number,
                monthly_income, approved_limit, current_debt
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (customer_id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                age = EXCLUDED.age,
                phone_number = EXCLUDED.phone_number,
                monthly_income = EXCLUDED.monthly_income,
                approved_limit = EXCLUDED.approved_limit,
                current_debt = EXCLUDED.current_debt
            RETURNING (xmax = 0)
            "#,
        )
        .bind(customer.customer_id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.age)
        .bind(customer.phone_number)
        .bind(&customer.monthly_income)
        .bind(&customer.approved_limit)
        .bind(&customer.current_debt)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert customer {}", customer.customer_id))?;

        Ok(inserted)
    }

    /// Inserts or overwrites a historical loan under its own id. Debt is left untouched.
    pub async fn upsert_loan(&self, loan: &Loan) -> Result<bool, EngineError> {
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO loans (
                loan_id, customer_id, principal, tenure_months, interest_rate,
                monthly_installment, emis_paid_on_time, start_date, end_date, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (loan_id) DO UPDATE
            SET customer_id = EXCLUDED.customer_id,
                principal = EXCLUDED.principal,
                tenure_months = EXCLUDED.tenure_months,
                interest_rate = EXCLUDED.interest_rate,
                monthly_installment = EXCLUDED.monthly_installment,
                emis_paid_on_time = EXCLUDED.emis_paid_on_time,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                status = EXCLUDED.status
            RETURNING (xmax = 0)
            "#,
        )
        .bind(loan.loan_id)
        .bind(loan.customer_id)
        .bind(&loan.principal)
        .bind(to_db_int(loan.tenure_months, "tenure")?)
        .bind(&loan.interest_rate)
        .bind(&loan.monthly_installment)
        .bind(to_db_int(loan.emis_paid_on_time, "emis_paid_on_time")?)
        .bind(loan.start_date)
        .bind(loan.end_date)
        .bind(loan.status.as_str())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert loan {}", loan.loan_id))?;

        Ok(inserted)
    }

    /// Applies `SET current_debt = <expr>` only when the stored debt still matches.
    ///
    /// `new_debt_sql` is a constant expression over `current_debt` and `$2`.
    async fn swap_debt(
        tx: &mut Transaction<'_, Postgres>,
        customer_id: CustomerId,
        amount: &BigDecimal,
        expected_debt: &BigDecimal,
        new_debt_sql: &'static str,
    ) -> Result<(), EngineError> {
        let sql = format!(
            "UPDATE customers SET current_debt = {} WHERE customer_id = $1 AND current_debt = $3",
            new_debt_sql
        );
        let updated = sqlx::query(&sql)
            .bind(customer_id)
            .bind(amount)
            .bind(expected_debt)
            .execute(&mut **tx)
            .await?;
        if updated.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT customer_id FROM customers WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&mut **tx)
                .await?;
        match exists {
            None => Err(EngineError::NotFound(format!(
                "Customer {} not found",
                customer_id
            ))),
            Some(_) => Err(EngineError::ConcurrencyConflict(format!(
                "current debt of customer {} changed concurrently",
                customer_id
            ))),
        }
    }
}

impl LoanStore for PgLoanStore {
    async fn insert_customer(&self, customer: NewCustomer) -> Result<Customer, EngineError> {
        let stored = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (
                first_name, last_name, age, phone_number, monthly_income, approved_limit, current_debt
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING *
            "#,
        )
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.age)
        .bind(customer.phone_number)
        .bind(&customer.monthly_income)
        .bind(&customer.approved_limit)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn fetch_customer(&self, customer_id: CustomerId) -> Result<Customer, EngineError> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Customer {} not found", customer_id)))
    }

    async fn fetch_loans(&self, customer_id: CustomerId) -> Result<Vec<Loan>, EngineError> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    async fn fetch_loan(&self, loan_id: LoanId) -> Result<Loan, EngineError> {
        let row = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE loan_id = $1")
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Loan {} not found", loan_id)))?;
        Loan::try_from(row)
    }

    async fn commit_loan(
        &self,
        loan: NewLoan,
        expected_debt: BigDecimal,
    ) -> Result<Loan, EngineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start loan transaction")?;

        Self::swap_debt(
            &mut tx,
            loan.customer_id,
            &loan.principal,
            &expected_debt,
            "current_debt + $2",
        )
        .await?;

        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            INSERT INTO loans (
                customer_id, principal, tenure_months, interest_rate,
                monthly_installment, emis_paid_on_time, start_date, end_date, status
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, 'ACTIVE')
            RETURNING *
            "#,
        )
        .bind(loan.customer_id)
        .bind(&loan.principal)
        .bind(to_db_int(loan.tenure_months, "tenure")?)
        .bind(&loan.interest_rate)
        .bind(&loan.monthly_installment)
        .bind(loan.start_date)
        .bind(loan.end_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.context("Failed to commit loan")?;
        Loan::try_from(row)
    }

    async fn close_loan(
        &self,
        loan_id: LoanId,
        expected_debt: BigDecimal,
    ) -> Result<Loan, EngineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start close transaction")?;

        let loan = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE loan_id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Loan {} not found", loan_id)))
            .and_then(Loan::try_from)?;
        if loan.status != LoanStatus::Active {
            return Err(EngineError::Validation(format!(
                "Loan {} is already closed",
                loan_id
            )));
        }

        Self::swap_debt(
            &mut tx,
            loan.customer_id,
            &loan.principal,
            &expected_debt,
            "GREATEST(current_debt - $2, 0)",
        )
        .await?;

        let row = sqlx::query_as::<_, LoanRow>(
            "UPDATE loans SET status = 'CLOSED' WHERE loan_id = $1 RETURNING *",
        )
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.context("Failed to commit loan closure")?;
        Loan::try_from(row)
    }
}
