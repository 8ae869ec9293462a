use crate::scoring::CreditScore;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Identifier of a customer row.
pub type CustomerId = i64;

/// Identifier of a loan row.
pub type LoanId = i64;

// ============ Domain Models ============

/// A borrower together with the limit and debt figures the engine checks against.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier for the customer.
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub phone_number: i64,
    /// Declared monthly income.
    pub monthly_income: BigDecimal,
    /// Maximum aggregate credit, fixed at registration time.
    pub approved_limit: BigDecimal,
    /// Outstanding principal across the customer's loans.
    pub current_debt: BigDecimal,
}

impl Customer {
    /// Full display name.
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Lifecycle state of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Active,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(LoanStatus::Active),
            "CLOSED" => Ok(LoanStatus::Closed),
            other => Err(format!("unknown loan status '{}'", other)),
        }
    }
}

/// A loan owned by a customer.
///
/// `monthly_installment` is derived once when the loan is created and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub principal: BigDecimal,
    pub tenure_months: u32,
    pub interest_rate: BigDecimal,
    pub monthly_installment: BigDecimal,
    pub emis_paid_on_time: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: LoanStatus,
}

impl Loan {
    /// Installments still outstanding on the schedule.
    pub fn repayments_left(&self) -> u32 {
        self.tenure_months.saturating_sub(self.emis_paid_on_time)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// Customer data accepted at registration, before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub phone_number: i64,
    pub monthly_income: BigDecimal,
    pub approved_limit: BigDecimal,
}

/// An approved loan waiting to be committed by the storage collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub customer_id: CustomerId,
    pub principal: BigDecimal,
    pub tenure_months: u32,
    pub interest_rate: BigDecimal,
    pub monthly_installment: BigDecimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

// ============ API Request/Response Models ============

/// Request payload for `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub monthly_income: BigDecimal,
    pub phone_number: i64,
}

/// Response payload for a registered customer.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub customer_id: CustomerId,
    pub name: String,
    pub age: i32,
    pub monthly_income: BigDecimal,
    pub approved_limit: BigDecimal,
    pub phone_number: i64,
}

impl From<&Customer> for RegisterResponse {
    fn from(customer: &Customer) -> Self {
        Self {
            customer_id: customer.customer_id,
            name: customer.name(),
            age: customer.age,
            monthly_income: customer.monthly_income.clone(),
            approved_limit: customer.approved_limit.clone(),
            phone_number: customer.phone_number,
        }
    }
}

/// Request payload shared by `POST /check-eligibility` and `POST /create-loan`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoanRequest {
    pub customer_id: CustomerId,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub loan_amount: BigDecimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub interest_rate: BigDecimal,
    pub tenure: i64,
}

/// Response payload for `POST /check-eligibility`.
#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub customer_id: CustomerId,
    pub approval: bool,
    pub credit_score: u8,
    pub interest_rate: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_interest_rate: Option<BigDecimal>,
    pub tenure: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_installment: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response payload for `POST /create-loan`.
#[derive(Debug, Serialize)]
pub struct CreateLoanResponse {
    pub loan_id: Option<LoanId>,
    pub customer_id: CustomerId,
    pub loan_approved: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_installment: Option<BigDecimal>,
}

/// Request payload for `POST /installment`.
#[derive(Debug, Deserialize)]
pub struct InstallmentRequest {
    #[serde(deserialize_with = "decimal::deserialize")]
    pub principal: BigDecimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub interest_rate: BigDecimal,
    pub tenure: i64,
}

/// Response payload for `POST /installment`.
#[derive(Debug, Serialize)]
pub struct InstallmentResponse {
    pub monthly_installment: BigDecimal,
}

/// Response payload for `GET /credit-score/:customer_id`.
#[derive(Debug, Serialize)]
pub struct CreditScoreResponse {
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub score: CreditScore,
}

/// Response payload for `POST /close-loan/:loan_id`.
#[derive(Debug, Serialize)]
pub struct CloseLoanResponse {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub status: LoanStatus,
    pub released_amount: BigDecimal,
}

impl From<&Loan> for CloseLoanResponse {
    fn from(loan: &Loan) -> Self {
        Self {
            loan_id: loan.loan_id,
            customer_id: loan.customer_id,
            status: loan.status,
            released_amount: loan.principal.clone(),
        }
    }
}

/// Customer summary embedded in loan views.
#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: i64,
    pub age: i32,
}

/// Response payload for `GET /view-loan/:loan_id`.
#[derive(Debug, Serialize)]
pub struct LoanDetailResponse {
    pub loan_id: LoanId,
    pub customer: CustomerSummary,
    pub loan_amount: BigDecimal,
    pub interest_rate: BigDecimal,
    pub monthly_installment: BigDecimal,
    pub tenure: u32,
    pub status: LoanStatus,
}

impl LoanDetailResponse {
    pub fn new(loan: &Loan, customer: &Customer) -> Self {
        Self {
            loan_id: loan.loan_id,
            customer: CustomerSummary {
                id: customer.customer_id,
                first_name: customer.first_name.clone(),
                last_name: customer.last_name.clone(),
                phone_number: customer.phone_number,
                age: customer.age,
            },
            loan_amount: loan.principal.clone(),
            interest_rate: loan.interest_rate.clone(),
            monthly_installment: loan.monthly_installment.clone(),
            tenure: loan.tenure_months,
            status: loan.status,
        }
    }
}

/// One entry of `GET /view-loans/:customer_id`.
#[derive(Debug, Serialize)]
pub struct CustomerLoanResponse {
    pub loan_id: LoanId,
    pub loan_amount: BigDecimal,
    pub interest_rate: BigDecimal,
    pub monthly_installment: BigDecimal,
    pub repayments_left: u32,
}

impl From<&Loan> for CustomerLoanResponse {
    fn from(loan: &Loan) -> Self {
        Self {
            loan_id: loan.loan_id,
            loan_amount: loan.principal.clone(),
            interest_rate: loan.interest_rate.clone(),
            monthly_installment: loan.monthly_installment.clone(),
            repayments_left: loan.repayments_left(),
        }
    }
}

/// Decimal (de)serialization helpers.
pub mod decimal {
    use bigdecimal::BigDecimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    /// Accepts JSON numbers or numeric strings, parsing the literal text so that
    /// values like `10.1` never pass through a binary float.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let text = match &value {
            Value::Number(number) => number.to_string(),
            Value::String(text) => text.trim().to_string(),
            other => {
                return Err(D::Error::custom(format!(
                    "expected a decimal number, got {}",
                    other
                )))
            }
        };

        BigDecimal::from_str(&text)
            .map_err(|e| D::Error::custom(format!("invalid decimal '{}': {}", text, e)))
    }
}
