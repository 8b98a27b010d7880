//! Per-factor scoring for memory search.
//!
//! Score = w₁·Importance(m) + w₂·Access(m) + w₃·Recency(m)
//!
//! Where:
//!   Importance(m) = stored importance
//!   Access(m)     = ln(1 + access_count)
//!   Recency(m)    = exp(-λ · ΔT), ΔT in ticks since the memory formed

use crate::config::RetrievalConfig;
use crate::memory::MemoryRecord;
use crate::types::{RetrievalScore, SimTime};

/// Breakdown of a search score into its weighted factors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Weighted importance contribution.
    pub importance: f64,
    /// Weighted access-frequency contribution.
    pub access: f64,
    /// Weighted recency contribution.
    pub recency: f64,
}

impl ScoreBreakdown {
    /// Sum of all factors.
    #[must_use]
    pub fn total(&self) -> RetrievalScore {
        RetrievalScore::new(self.importance + self.access + self.recency)
    }
}

/// Compute the weighted breakdown for one record at time `now`.
#[must_use]
pub fn compute_breakdown(record: &MemoryRecord, now: &SimTime, config: &RetrievalConfig) -> ScoreBreakdown {
    let weights = &config.weights;
    ScoreBreakdown {
        importance: weights.importance * f64::from(record.importance),
        access: weights.access * access_score(record.access_count),
        recency: weights.recency * recency_score(&record.timestamp.sim, now, config.recency_decay),
    }
}

/// Logarithmic access bonus: frequently recalled memories rise, but slowly.
fn access_score(access_count: u32) -> f64 {
    f64::from(access_count).ln_1p()
}

/// Exponential recency bonus, 1.0 for a memory formed this tick.
fn recency_score(formed: &SimTime, now: &SimTime, decay: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let delta = now.ticks_since(formed) as f64;
    (-decay * delta).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_decays_over_ticks() {
        let t0 = SimTime::new(1, 0, 5);
        let t1 = SimTime::new(1, 1, 5);
        let t10 = SimTime::new(3, 0, 5);

        let fresh = recency_score(&t0, &t0, 0.1);
        let one = recency_score(&t0, &t1, 0.1);
        let ten = recency_score(&t0, &t10, 0.1);

        assert!((fresh - 1.0).abs() < 1e-9);
        assert!(one > ten, "recency should decay over time");
        assert!(ten < 0.4);
    }

    #[test]
    fn access_bonus_is_logarithmic() {
        assert!(access_score(0).abs() < 1e-9);
        let gain_low = access_score(1) - access_score(0);
        let gain_high = access_score(101) - access_score(100);
        assert!(gain_low > gain_high);
    }
}
