use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        customer_id BIGSERIAL PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        age INTEGER NOT NULL,
        phone_number BIGINT NOT NULL,
        monthly_income NUMERIC(14, 2) NOT NULL CHECK (monthly_income >= 0),
        approved_limit NUMERIC(14, 2) NOT NULL,
        current_debt NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (current_debt >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loans (
        loan_id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL REFERENCES customers (customer_id) ON DELETE CASCADE,
        principal NUMERIC(14, 2) NOT NULL CHECK (principal > 0),
        tenure_months INTEGER NOT NULL CHECK (tenure_months BETWEEN 1 AND 360),
        interest_rate NUMERIC(5, 2) NOT NULL,
        monthly_installment NUMERIC(14, 2) NOT NULL,
        emis_paid_on_time INTEGER NOT NULL DEFAULT 0 CHECK (emis_paid_on_time >= 0),
        start_date DATE NOT NULL,
        end_date DATE NOT NULL,
        status TEXT NOT NULL DEFAULT 'ACTIVE' CHECK (status IN ('ACTIVE', 'CLOSED'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS loans_customer_id_idx ON loans (customer_id)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Moves the id sequences past rows inserted with explicit ids.
    pub async fn sync_sequences(&self) -> anyhow::Result<()> {
        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('customers', 'customer_id'), \
             COALESCE((SELECT MAX(customer_id) FROM customers), 0) + 1, false)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('loans', 'loan_id'), \
             COALESCE((SELECT MAX(loan_id) FROM loans), 0) + 1, false)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loans_follow_their_customer_on_delete() {
        let loans = SCHEMA
            .iter()
            .find(|statement| statement.contains("CREATE TABLE IF NOT EXISTS loans"))
            .unwrap();
        assert!(loans.contains("REFERENCES customers (customer_id) ON DELETE CASCADE"));
    }
}
