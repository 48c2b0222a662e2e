//! Acceptance counters for the samplers, reported once per generation.

use std::ops::AddAssign;

/// Proposal and acceptance counts of one sampler run or one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceStats {
    pub proposals: u64,
    pub accepted: u64,
    pub mutations: u64,
    pub mutations_accepted: u64,
    pub crossovers: u64,
    pub crossovers_accepted: u64,
    pub exchanges: u64,
    pub exchanges_accepted: u64,
}

impl AcceptanceStats {
    /// A single-slot Metropolis proposal (MCMC samplers).
    pub fn record_proposal(&mut self, accepted: bool) {
        self.proposals += 1;
        self.accepted += u64::from(accepted);
    }

    pub fn record_mutation(&mut self, accepted: bool) {
        self.mutations += 1;
        self.mutations_accepted += u64::from(accepted);
    }

    pub fn record_crossover(&mut self, accepted: bool) {
        self.crossovers += 1;
        self.crossovers_accepted += u64::from(accepted);
    }

    pub fn record_exchanges(&mut self, attempted: u64, accepted: u64) {
        self.exchanges += attempted;
        self.exchanges_accepted += accepted;
    }

    /// Fraction of accepted moves of every kind, `0` when nothing was proposed.
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.proposals + self.mutations + self.crossovers;
        let accepted = self.accepted + self.mutations_accepted + self.crossovers_accepted;
        ratio(accepted, total)
    }

    pub fn exchange_rate(&self) -> f64 {
        ratio(self.exchanges_accepted, self.exchanges)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl AddAssign for AcceptanceStats {
    fn add_assign(&mut self, rhs: Self) {
        self.proposals += rhs.proposals;
        self.accepted += rhs.accepted;
        self.mutations += rhs.mutations;
        self.mutations_accepted += rhs.mutations_accepted;
        self.crossovers += rhs.crossovers;
        self.crossovers_accepted += rhs.crossovers_accepted;
        self.exchanges += rhs.exchanges;
        self.exchanges_accepted += rhs.exchanges_accepted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rates() {
        let mut stats = AcceptanceStats::default();
        assert_eq!(stats.acceptance_rate(), 0.0);
        stats.record_proposal(true);
        stats.record_proposal(false);
        stats.record_mutation(true);
        stats.record_crossover(false);
        stats.record_exchanges(5, 2);
        assert_abs_diff_eq!(stats.acceptance_rate(), 0.5);
        assert_abs_diff_eq!(stats.exchange_rate(), 0.4);

        let mut total = AcceptanceStats::default();
        total += stats;
        total += stats;
        assert_eq!(total.proposals, 4);
        assert_eq!(total.exchanges_accepted, 4);
    }
}
