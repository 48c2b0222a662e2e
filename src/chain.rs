/*!
# EMC chains

An [`EmcChain`] is one member of the Evolutionary Monte Carlo population of
a single individual: a candidate parent configuration together with its
likelihood and the temperature it is currently run at.

A [`ChainPopulation`] owns the chains of one EMC call plus the temperature
hierarchy, a permutation mapping temperature rank (ascending) to the index of
the chain holding that temperature. Exchanging temperatures swaps two
entries of the hierarchy; it is never rebuilt by sorting.

Chains live for one EMC call and are dropped once the chosen configuration
is committed.
*/

use rand::Rng;

use crate::core::{draw_foreign_haplotype, owned_by, Parents};
use crate::error::{PhaseError, Result};
use crate::selection::Selectable;

#[derive(Debug, Clone, PartialEq)]
pub struct EmcChain {
    temperature: f64,
    selection_temperature: f64,
    parents: Parents,
    likelihood: f64,
    selection: f64,
    id: usize,
    individual: usize,
}

impl EmcChain {
    /// Creates a chain with all parents unset (haplotype 0) and zero
    /// likelihood. Parents must be drawn before the chain is used.
    pub fn new(temperature: f64, selection_temperature: f64, individual: usize, id: usize) -> Self {
        let mut chain = Self {
            temperature,
            selection_temperature,
            parents: [0; 4],
            likelihood: 0.0,
            selection: 0.0,
            id,
            individual,
        };
        chain.set_likelihood(0.0);
        chain
    }

    /// Draws all four parents uniformly among the `n_haps` haplotypes that
    /// do not belong to the chain's individual.
    pub fn randomize_parents<R: Rng + ?Sized>(&mut self, rng: &mut R, n_haps: usize) -> Result<()> {
        for slot in 0..4 {
            self.parents[slot] = draw_foreign_haplotype(rng, n_haps, self.individual)?;
        }
        Ok(())
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn selection_temperature(&self) -> f64 {
        self.selection_temperature
    }

    pub fn parents(&self) -> &Parents {
        &self.parents
    }

    pub fn parent(&self, slot: usize) -> usize {
        self.parents[slot]
    }

    /// # Panics
    /// If `hap` belongs to the chain's own individual.
    pub fn set_parent(&mut self, slot: usize, hap: usize) {
        assert!(
            !owned_by(hap, self.individual),
            "chain {} may not copy from its own individual {}",
            self.id,
            self.individual
        );
        self.parents[slot] = hap;
    }

    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    /// Sets the likelihood and recomputes the selection weight
    /// `exp(likelihood / selection_temperature)`.
    pub fn set_likelihood(&mut self, likelihood: f64) {
        self.likelihood = likelihood;
        self.selection = (likelihood / self.selection_temperature).exp();
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn individual(&self) -> usize {
        self.individual
    }
}

impl Selectable for EmcChain {
    fn selection_weight(&self) -> f64 {
        self.selection
    }
}

/// The chains of one EMC call with their temperature hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPopulation {
    chains: Vec<EmcChain>,
    hierarchy: Vec<usize>,
}

impl ChainPopulation {
    /**
    Builds `n_chains` chains for `individual` with temperatures
    `(i + 1) * max_temperature / n_chains`, random parents among `n_haps`
    haplotypes, and likelihoods from `likelihood`.

    The draws for chain `i` (four parents) happen before its likelihood is
    computed, chain by chain.
    */
    pub fn new<R, F>(
        individual: usize,
        n_chains: usize,
        max_temperature: f64,
        selection_temperature: f64,
        n_haps: usize,
        rng: &mut R,
        mut likelihood: F,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
        F: FnMut(&Parents) -> f64,
    {
        if n_chains < 2 {
            return Err(PhaseError::precondition(format!(
                "an EMC population needs at least 2 chains, got {n_chains}"
            )));
        }
        let mut chains = Vec::with_capacity(n_chains);
        for i in 0..n_chains {
            let temperature = (i + 1) as f64 * max_temperature / n_chains as f64;
            let mut chain = EmcChain::new(temperature, selection_temperature, individual, i);
            chain.randomize_parents(rng, n_haps)?;
            chain.set_likelihood(likelihood(chain.parents()));
            chains.push(chain);
        }
        Ok(Self {
            chains,
            hierarchy: (0..n_chains).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chains(&self) -> &[EmcChain] {
        &self.chains
    }

    pub fn chain(&self, index: usize) -> &EmcChain {
        &self.chains[index]
    }

    pub fn chain_mut(&mut self, index: usize) -> &mut EmcChain {
        &mut self.chains[index]
    }

    /// Restores chain `index` from a snapshot.
    pub fn restore(&mut self, index: usize, snapshot: EmcChain) {
        self.chains[index] = snapshot;
    }

    /// Mutable access to two distinct chains.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut EmcChain, &mut EmcChain) {
        assert_ne!(a, b);
        if a < b {
            let (left, right) = self.chains.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.chains.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Index of the chain holding temperature rank `rank`.
    pub fn at_rank(&self, rank: usize) -> usize {
        self.hierarchy[rank]
    }

    pub fn hierarchy(&self) -> &[usize] {
        &self.hierarchy
    }

    /// Exchanges the temperatures of the chains at ranks `a` and `b` and
    /// swaps their hierarchy entries, keeping rank order ascending.
    pub fn exchange_ranks(&mut self, a: usize, b: usize) {
        let (ia, ib) = (self.hierarchy[a], self.hierarchy[b]);
        let ta = self.chains[ia].temperature();
        let tb = self.chains[ib].temperature();
        self.chains[ia].set_temperature(tb);
        self.chains[ib].set_temperature(ta);
        self.hierarchy.swap(a, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn population(individual: usize, n_chains: usize, rng: &mut SmallRng) -> ChainPopulation {
        ChainPopulation::new(individual, n_chains, 5.0, 10_000.0, 8, rng, |p| {
            -(p.iter().sum::<usize>() as f64)
        })
        .unwrap()
    }

    #[test]
    fn test_parents_never_from_own_individual() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            for individual in 0..4 {
                let pop = population(individual, 5, &mut rng);
                for chain in pop.chains() {
                    assert!(chain.parents().iter().all(|&p| p / 2 != individual));
                }
            }
        }
    }

    #[test]
    fn test_temperature_ladder_and_identity_hierarchy() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pop = population(0, 5, &mut rng);
        let temps: Vec<f64> = pop.chains().iter().map(EmcChain::temperature).collect();
        for (i, t) in temps.iter().enumerate() {
            assert_abs_diff_eq!(*t, (i + 1) as f64);
        }
        assert_eq!(pop.hierarchy(), &[0, 1, 2, 3, 4]);
        for chain in pop.chains() {
            assert_abs_diff_eq!(
                chain.likelihood(),
                -(chain.parents().iter().sum::<usize>() as f64)
            );
        }
    }

    #[test]
    fn test_selection_weight_tracks_likelihood() {
        let mut chain = EmcChain::new(1.0, 10.0, 0, 0);
        chain.set_likelihood(-20.0);
        assert_abs_diff_eq!(chain.selection_weight(), (-2.0f64).exp());
    }

    #[test]
    fn test_exchange_ranks_swaps_temperatures() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut pop = population(1, 3, &mut rng);
        let before: Vec<Parents> = pop.chains().iter().map(|c| *c.parents()).collect();
        pop.exchange_ranks(0, 1);
        assert_eq!(pop.hierarchy(), &[1, 0, 2]);
        assert_abs_diff_eq!(pop.chain(0).temperature(), 10.0 / 3.0);
        assert_abs_diff_eq!(pop.chain(1).temperature(), 5.0 / 3.0);
        // rank order still ascends
        let ranked: Vec<f64> = (0..3).map(|r| pop.chain(pop.at_rank(r)).temperature()).collect();
        assert!(ranked.windows(2).all(|w| w[0] < w[1]));
        let after: Vec<Parents> = pop.chains().iter().map(|c| *c.parents()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_population_needs_two_chains() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(ChainPopulation::new(0, 1, 1.0, 1.0, 8, &mut rng, |_| 0.0).is_err());
    }

    #[test]
    #[should_panic(expected = "own individual")]
    fn test_own_parent_rejected() {
        let mut chain = EmcChain::new(1.0, 1.0, 2, 0);
        chain.set_parent(0, 5);
    }
}
