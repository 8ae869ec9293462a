//! Credit Decision Engine Library
//!
//! Scores customers, corrects requested interest rates, computes installments
//! and decides loan eligibility. Loan creation and closure go through a
//! per-customer debt ledger so concurrent requests never overshoot a
//! customer's approved limit.
//!
//! # Modules
//!
//! - `scoring`: Credit score calculation.
//! - `rate`: Interest-rate correction by score band.
//! - `installment`: Installment (EMI) calculation and loan term validation.
//! - `eligibility`: Eligibility pipeline.
//! - `ledger`: Per-customer serialization of debt mutations.
//! - `score_cache`: Cache of computed credit scores.
//! - `storage`: Storage contract and in-memory store.
//! - `db`: Database connection and schema bootstrap.
//! - `db_storage`: Postgres store.
//! - `services`: Credit operations facade.
//! - `handlers`: HTTP request handlers.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `models`: Domain and API data models.

pub mod config;
pub mod db;
pub mod db_storage;
pub mod eligibility;
pub mod errors;
pub mod handlers;
pub mod installment;
pub mod ledger;
pub mod models;
pub mod rate;
pub mod score_cache;
pub mod scoring;
pub mod services;
pub mod storage;
