use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::fs;
use std::path::Path;

use credit_decision_engine::db::Database;
use credit_decision_engine::db_storage::PgLoanStore;
use credit_decision_engine::installment::validate_tenure;
use credit_decision_engine::models::{Customer, Loan, LoanStatus};
use credit_decision_engine::storage::LoanStore;

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    customer_id: i64,
    first_name: String,
    last_name: String,
    age: i32,
    phone_number: i64,
    #[serde(deserialize_with = "credit_decision_engine::models::decimal::deserialize")]
    monthly_salary: BigDecimal,
    #[serde(deserialize_with = "credit_decision_engine::models::decimal::deserialize")]
    approved_limit: BigDecimal,
    #[serde(deserialize_with = "credit_decision_engine::models::decimal::deserialize")]
    current_debt: BigDecimal,
}

#[derive(Debug, Deserialize)]
struct LoanRecord {
    customer_id: i64,
    loan_id: i64,
    #[serde(deserialize_with = "credit_decision_engine::models::decimal::deserialize")]
    loan_amount: BigDecimal,
    tenure: i64,
    #[serde(deserialize_with = "credit_decision_engine::models::decimal::deserialize")]
    interest_rate: BigDecimal,
    #[serde(
        alias = "monthly_payment",
        deserialize_with = "credit_decision_engine::models::decimal::deserialize"
    )]
    monthly_repayment: BigDecimal,
    emis_paid_on_time: u32,
    #[serde(alias = "date_of_approval")]
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl CustomerRecord {
    fn into_customer(self) -> Customer {
        Customer {
            customer_id: self.customer_id,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            age: self.age,
            phone_number: self.phone_number,
            monthly_income: self.monthly_salary,
            approved_limit: self.approved_limit,
            current_debt: self.current_debt,
        }
    }
}

impl LoanRecord {
    /// Loans ending after `today` are still active.
    fn into_loan(self, today: NaiveDate) -> Result<Loan> {
        let tenure_months = validate_tenure(self.tenure)?;
        let status = if self.end_date > today {
            LoanStatus::Active
        } else {
            LoanStatus::Closed
        };

        Ok(Loan {
            loan_id: self.loan_id,
            customer_id: self.customer_id,
            principal: self.loan_amount,
            tenure_months,
            interest_rate: self.interest_rate,
            monthly_installment: self.monthly_repayment,
            emis_paid_on_time: self.emis_paid_on_time,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
        })
    }
}

/// Reads rows from a spreadsheet or a JSON array, chosen by extension.
/// Rows stay raw so one bad row does not sink the file.
fn read_rows(path: &str) -> Result<Vec<Value>> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("xlsx" | "xlsm" | "xls" | "ods") => read_sheet_rows(path),
        _ => read_json_rows(path),
    }
}

fn read_json_rows(path: &str) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a JSON array", path))
}

/// First worksheet only; the header row names the fields of every row below it.
fn read_sheet_rows(path: &str) -> Result<Vec<Value>> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Failed to open workbook {}", path))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no worksheets", path))?
        .with_context(|| format!("Failed to read the first worksheet of {}", path))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| column_key(&cell.to_string())).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|row| {
            let fields: Map<String, Value> = headers
                .iter()
                .zip(row)
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, cell)| (key.clone(), cell_value(cell)))
                .collect();
            Value::Object(fields)
        })
        .collect())
}

/// `" EMIs paid on Time "` becomes `emis_paid_on_time`.
fn column_key(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Largest integer a float cell holds exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        // Whole floats become integers so id and count fields parse.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT => Value::from(*f as i64),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::String(s) => Value::String(s.trim().to_string()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => excel_serial_date(dt.as_f64())
            .map(|date| Value::String(date.to_string()))
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => Value::String(s.chars().take(10).collect()),
        _ => Value::Null,
    }
}

/// Day part of an Excel 1900-system serial date.
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}

#[derive(Debug, Default)]
struct Tally {
    created: usize,
    updated: usize,
    skipped: usize,
}

async fn load_customers(store: &PgLoanStore, path: &str) -> Result<Tally> {
    let mut tally = Tally::default();

    for (idx, row) in read_rows(path)?.into_iter().enumerate() {
        let record: CustomerRecord = match serde_json::from_value(row) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("{} row {}: malformed customer, skipping: {}", path, idx, e);
                tally.skipped += 1;
                continue;
            }
        };

        let customer = record.into_customer();
        match store.upsert_customer(&customer).await {
            Ok(true) => tally.created += 1,
            Ok(false) => tally.updated += 1,
            Err(e) => {
                tracing::error!("Customer {}: {}", customer.customer_id, e);
                tally.skipped += 1;
            }
        }
    }

    Ok(tally)
}

async fn load_loans(store: &PgLoanStore, path: &str, today: NaiveDate) -> Result<Tally> {
    let mut tally = Tally::default();

    for (idx, row) in read_rows(path)?.into_iter().enumerate() {
        let loan = match serde_json::from_value::<LoanRecord>(row)
            .map_err(anyhow::Error::from)
            .and_then(|record| record.into_loan(today))
        {
            Ok(loan) => loan,
            Err(e) => {
                tracing::warn!("{} row {}: malformed loan, skipping: {}", path, idx, e);
                tally.skipped += 1;
                continue;
            }
        };

        if let Err(e) = store.fetch_customer(loan.customer_id).await {
            tracing::warn!("Loan {}: {}, skipping", loan.loan_id, e);
            tally.skipped += 1;
            continue;
        }

        match store.upsert_loan(&loan).await {
            Ok(true) => tally.created += 1,
            Ok(false) => tally.updated += 1,
            Err(e) => {
                tracing::error!("Loan {}: {}", loan.loan_id, e);
                tally.skipped += 1;
            }
        }
    }

    Ok(tally)
}

/// Usage: `load_initial_data [customer_data.xlsx] [loan_data.xlsx]`
///
/// `.json` paths are read as an array of row objects instead.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let customer_path = args.next().unwrap_or_else(|| "customer_data.xlsx".to_string());
    let loan_path = args.next().unwrap_or_else(|| "loan_data.xlsx".to_string());

    let database_url = std::env::var("DB_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .context("DB_URL or DATABASE_URL must be set")?;

    let db = Database::new(&database_url).await?;
    let store = PgLoanStore::new(db.pool.clone());
    tracing::info!("Database connected");

    let customers = load_customers(&store, &customer_path).await?;
    tracing::info!("Customer data loaded from {}: {:?}", customer_path, customers);

    let loans = load_loans(&store, &loan_path, Utc::now().date_naive()).await?;
    tracing::info!("Loan data loaded from {}: {:?}", loan_path, loans);

    db.sync_sequences().await?;
    Ok(())
}
