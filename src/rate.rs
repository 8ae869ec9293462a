//! Interest-rate correction by credit score band.

use bigdecimal::BigDecimal;

/// What a score band does to the requested rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RatePolicy {
    AsRequested,
    /// Raise the rate to at least this many percent.
    Floor(u32),
    Reject,
}

struct RateBand {
    /// Inclusive lower score bound.
    min_score: u8,
    policy: RatePolicy,
}

/// Evaluated high to low; the first band whose lower bound is met wins.
const RATE_BANDS: [RateBand; 4] = [
    RateBand { min_score: 51, policy: RatePolicy::AsRequested },
    RateBand { min_score: 31, policy: RatePolicy::Floor(12) },
    RateBand { min_score: 11, policy: RatePolicy::Floor(16) },
    RateBand { min_score: 0, policy: RatePolicy::Reject },
];

/// Outcome of rate correction.
#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    /// Rate to lend at, never below the requested rate.
    Corrected(BigDecimal),
    /// Score too low to lend at any rate.
    Rejected,
}

/// Applies the score band policy to the requested annual rate.
pub fn correct_rate(score: u8, requested_rate: &BigDecimal) -> RateDecision {
    let policy = RATE_BANDS
        .iter()
        .find(|band| score >= band.min_score)
        .map(|band| band.policy)
        .unwrap_or(RatePolicy::Reject);

    match policy {
        RatePolicy::AsRequested => RateDecision::Corrected(requested_rate.clone()),
        RatePolicy::Floor(minimum) => {
            let minimum = BigDecimal::from(minimum);
            if *requested_rate >= minimum {
                RateDecision::Corrected(requested_rate.clone())
            } else {
                RateDecision::Corrected(minimum)
            }
        }
        RatePolicy::Reject => RateDecision::Rejected,
    }
}
