//! Installment (EMI) calculation on fixed-point decimals.
//!
//! `EMI = P × r × (1+r)^n / ((1+r)^n − 1)` with `r = annual_rate / 12 / 100`,
//! or `P / n` when the rate is zero. Results are rounded half-up to 2 places.

use crate::errors::EngineError;
use bigdecimal::{BigDecimal, One, RoundingMode, Zero};

/// Longest accepted tenure, in months.
pub const MAX_TENURE_MONTHS: u32 = 360;

/// Currency minor-unit scale. Rates are stored at the same scale.
pub const CURRENCY_SCALE: i64 = 2;

/// Exclusive upper bound of a stored amount (`NUMERIC(14, 2)`).
pub const MAX_AMOUNT_EXCLUSIVE: i64 = 1_000_000_000_000;

/// Significant digits kept while compounding.
const WORKING_PRECISION: u64 = 50;

/// Validated principal, annual rate and tenure of a loan request.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub principal: BigDecimal,
    pub annual_rate: BigDecimal,
    pub tenure_months: u32,
}

impl LoanTerms {
    /// Validates raw request values.
    ///
    /// Principal must be positive and below [`MAX_AMOUNT_EXCLUSIVE`], the rate
    /// within `[0, 100]` and the tenure within `[1, 360]` months. Principal and
    /// rate carry at most two decimal places, so what is stored is what was priced.
    pub fn new(
        principal: BigDecimal,
        annual_rate: BigDecimal,
        tenure_months: i64,
    ) -> Result<Self, EngineError> {
        if principal <= BigDecimal::zero() {
            return Err(EngineError::Validation(format!(
                "principal must be greater than 0, got {}",
                principal
            )));
        }
        validate_amount("principal", &principal)?;
        validate_rate(&annual_rate)?;
        let tenure_months = validate_tenure(tenure_months)?;

        Ok(Self {
            principal,
            annual_rate,
            tenure_months,
        })
    }

    /// Installment for these terms at their own rate.
    pub fn installment(&self) -> BigDecimal {
        installment_for(&self.principal, &self.annual_rate, self.tenure_months)
    }
}

pub fn validate_rate(annual_rate: &BigDecimal) -> Result<(), EngineError> {
    if *annual_rate < BigDecimal::zero() || *annual_rate > BigDecimal::from(100) {
        return Err(EngineError::Validation(format!(
            "interest rate must be between 0 and 100, got {}",
            annual_rate
        )));
    }
    if !has_currency_scale(annual_rate) {
        return Err(EngineError::Validation(format!(
            "interest rate must have at most {} decimal places, got {}",
            CURRENCY_SCALE, annual_rate
        )));
    }
    Ok(())
}

/// Checks that a non-negative amount fits a stored money column.
pub fn validate_amount(field: &str, amount: &BigDecimal) -> Result<(), EngineError> {
    if !has_currency_scale(amount) {
        return Err(EngineError::Validation(format!(
            "{} must have at most {} decimal places, got {}",
            field, CURRENCY_SCALE, amount
        )));
    }
    if *amount >= BigDecimal::from(MAX_AMOUNT_EXCLUSIVE) {
        return Err(EngineError::Validation(format!(
            "{} must be less than {}, got {}",
            field, MAX_AMOUNT_EXCLUSIVE, amount
        )));
    }
    Ok(())
}

fn has_currency_scale(value: &BigDecimal) -> bool {
    value.with_scale(CURRENCY_SCALE) == *value
}

pub fn validate_tenure(tenure_months: i64) -> Result<u32, EngineError> {
    if tenure_months < 1 || tenure_months > i64::from(MAX_TENURE_MONTHS) {
        return Err(EngineError::Validation(format!(
            "tenure must be between 1 and {} months, got {}",
            MAX_TENURE_MONTHS, tenure_months
        )));
    }
    // In range, so the cast cannot truncate.
    Ok(tenure_months as u32)
}

/// Validates the inputs and returns the periodic installment.
pub fn compute_installment(
    principal: &BigDecimal,
    annual_rate: &BigDecimal,
    tenure_months: i64,
) -> Result<BigDecimal, EngineError> {
    let terms = LoanTerms::new(principal.clone(), annual_rate.clone(), tenure_months)?;
    Ok(terms.installment())
}

/// Installment for already validated inputs (`tenure_months >= 1`, rate `>= 0`).
pub(crate) fn installment_for(
    principal: &BigDecimal,
    annual_rate: &BigDecimal,
    tenure_months: u32,
) -> BigDecimal {
    let periods = BigDecimal::from(tenure_months);

    if annual_rate.is_zero() {
        return round_currency(&(principal / &periods));
    }

    let monthly_rate = annual_rate / BigDecimal::from(1200);
    let growth = pow(&(BigDecimal::one() + &monthly_rate), tenure_months);
    let numerator = principal * &monthly_rate * &growth;
    let denominator = &growth - BigDecimal::one();

    round_currency(&(numerator / denominator))
}

/// Rounds half-up to the currency minor unit.
pub fn round_currency(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(CURRENCY_SCALE, RoundingMode::HalfUp)
}

fn pow(base: &BigDecimal, mut exponent: u32) -> BigDecimal {
    let mut result = BigDecimal::one();
    let mut base = base.clone();

    while exponent > 0 {
        if exponent & 1 == 1 {
            result = (&result * &base).with_prec(WORKING_PRECISION);
        }
        exponent >>= 1;
        if exponent > 0 {
            base = (&base * &base).with_prec(WORKING_PRECISION);
        }
    }

    result
}
