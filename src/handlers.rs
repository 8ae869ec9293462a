use crate::errors::EngineError;
use crate::models::*;
use crate::services::CreditService;
use crate::storage::LoanStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
pub struct AppState<S> {
    /// Credit operations over the configured store.
    pub service: CreditService<S>,
}

/// Date used as "today" for scoring and loan start dates.
fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Health check plus the API routes, without rate limiting.
pub fn router<S: LoanStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes(state))
}

/// API routes only; the server binary wraps these in its rate limiter.
pub fn api_routes<S: LoanStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/register", post(register::<S>))
        .route("/check-eligibility", post(check_eligibility::<S>))
        .route("/create-loan", post(create_loan::<S>))
        .route("/close-loan/:loan_id", post(close_loan::<S>))
        .route("/view-loan/:loan_id", get(view_loan::<S>))
        .route("/view-loans/:customer_id", get(view_customer_loans::<S>))
        .route("/credit-score/:customer_id", get(credit_score::<S>))
        .route("/installment", post(installment::<S>))
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "credit-decision-engine",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /register
///
/// Registers a customer; the approved limit is derived from monthly income.
pub async fn register<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), EngineError> {
    tracing::info!("POST /register");
    let customer = state.service.register(request).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse::from(&customer))))
}

/// POST /check-eligibility
///
/// Advisory decision. A policy rejection is a 200 with `approval: false`.
pub async fn check_eligibility<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<LoanRequest>,
) -> Result<Json<EligibilityResponse>, EngineError> {
    tracing::info!("POST /check-eligibility - customer {}", request.customer_id);
    let decision = state.service.check_eligibility(&request, today()).await?;

    Ok(Json(EligibilityResponse {
        customer_id: request.customer_id,
        approval: decision.approved,
        credit_score: decision.credit_score.total,
        interest_rate: request.interest_rate.clone(),
        message: decision.reason.map(|reason| reason.summary().to_string()),
        corrected_interest_rate: decision.corrected_rate,
        tenure: request.tenure,
        monthly_installment: decision.installment,
    }))
}

/// POST /create-loan
///
/// 201 with the new loan id on approval, 200 with `loan_approved: false` otherwise.
pub async fn create_loan<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<LoanRequest>,
) -> Result<(StatusCode, Json<CreateLoanResponse>), EngineError> {
    tracing::info!("POST /create-loan - customer {}", request.customer_id);
    let created = state.service.create_loan(&request, today()).await?;

    let status = if created.loan.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreateLoanResponse {
            loan_id: created.loan.as_ref().map(|loan| loan.loan_id),
            customer_id: request.customer_id,
            loan_approved: created.decision.approved,
            message: created.decision.message(),
            monthly_installment: created.loan.map(|loan| loan.monthly_installment),
        }),
    ))
}

/// POST /close-loan/:loan_id
pub async fn close_loan<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<CloseLoanResponse>, EngineError> {
    tracing::info!("POST /close-loan/{}", loan_id);
    let closed = state.service.close_loan(loan_id).await?;
    Ok(Json(CloseLoanResponse::from(&closed)))
}

/// GET /view-loan/:loan_id
pub async fn view_loan<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<LoanDetailResponse>, EngineError> {
    tracing::info!("GET /view-loan/{}", loan_id);
    let (loan, customer) = state.service.view_loan(loan_id).await?;
    Ok(Json(LoanDetailResponse::new(&loan, &customer)))
}

/// GET /view-loans/:customer_id
///
/// Active loans only.
pub async fn view_customer_loans<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<CustomerId>,
) -> Result<Json<Vec<CustomerLoanResponse>>, EngineError> {
    tracing::info!("GET /view-loans/{}", customer_id);
    let loans = state.service.view_customer_loans(customer_id).await?;
    Ok(Json(loans.iter().map(CustomerLoanResponse::from).collect()))
}

/// GET /credit-score/:customer_id
pub async fn credit_score<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<CustomerId>,
) -> Result<Json<CreditScoreResponse>, EngineError> {
    tracing::info!("GET /credit-score/{}", customer_id);
    let score = state.service.compute_score(customer_id, today()).await?;
    Ok(Json(CreditScoreResponse { customer_id, score }))
}

/// POST /installment
pub async fn installment<S: LoanStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<InstallmentRequest>,
) -> Result<Json<InstallmentResponse>, EngineError> {
    let monthly_installment = state.service.compute_installment(
        &request.principal,
        &request.interest_rate,
        request.tenure,
    )?;
    Ok(Json(InstallmentResponse {
        monthly_installment,
    }))
}
