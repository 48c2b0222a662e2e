/*!
# Evolutionary Monte Carlo

Population sampler for a single individual (Liang & Wong). A
[`ChainPopulation`] of `parallel_chains` candidate configurations runs at a
ladder of temperatures. Every iteration applies either a **mutation** (one
chain changes one parent) or a **crossover** (two chains exchange a random
subset of parent slots, accepted or rejected as one unit), followed by
`parallel_chains` attempted **exchanges** of temperature between chains at
adjacent ranks of the ladder.

When the iterations are done a chain is picked by roulette over the
selection weights and its configuration is committed with the spread as
penalty.

The acceptance rules are kept as they are written below, including the sign
of the mutation rule:

```text
mutation   u < exp((current - proposed) / T)
crossover  u <= exp(dL2 / T2 + dL1 / T1)    (pairing depends on the order)
exchange   u < min(exp((La - Lb) * (1/Ta - 1/Tb)), 1)
```
*/

use rand::Rng;

use crate::chain::ChainPopulation;
use crate::core::{draw_below, draw_foreign_haplotype, draw_slot, metropolis_accept, uniform, Parents};
use crate::error::{PhaseError, Result};
use crate::haplotype::HaplotypePool;
use crate::oracle::LikelihoodOracle;
use crate::run_log::RunLog;
use crate::selection::roulette;
use crate::stats::AcceptanceStats;

/// Population settings, constant across a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmcParams {
    pub parallel_chains: usize,
    pub max_temperature: f64,
    pub selection_temperature: f64,
    pub mutation_rate: f64,
}

impl Default for EmcParams {
    fn default() -> Self {
        Self {
            parallel_chains: 5,
            max_temperature: 5.0,
            selection_temperature: 10_000.0,
            mutation_rate: 0.3,
        }
    }
}

impl EmcParams {
    pub fn validate(&self) -> Result<()> {
        if self.parallel_chains < 2 {
            return Err(PhaseError::config(format!(
                "EMC needs at least 2 parallel chains, got {}",
                self.parallel_chains
            )));
        }
        if !(self.max_temperature > 0.0 && self.max_temperature.is_finite()) {
            return Err(PhaseError::config(format!(
                "maximum temperature must be positive, got {}",
                self.max_temperature
            )));
        }
        if !(self.selection_temperature > 0.0 && self.selection_temperature.is_finite()) {
            return Err(PhaseError::config(format!(
                "selection temperature must be positive, got {}",
                self.selection_temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(PhaseError::config(format!(
                "mutation rate must lie in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        Ok(())
    }
}

/// Parameters of one per-individual EMC call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmcStep {
    pub individual: usize,
    pub cycles: usize,
    /// Commit penalty of the chosen configuration.
    pub spread: f64,
    pub generation: usize,
}

pub struct EmcState<'a, R: ?Sized> {
    pub rng: &'a mut R,
    pub run_log: &'a mut RunLog,
    pub stats: &'a mut AcceptanceStats,
}

/// Probability of exchanging the temperatures of two chains with
/// likelihoods `l1`, `l2` at temperatures `t1`, `t2`.
pub fn exchange_probability(l1: f64, t1: f64, l2: f64, t2: f64) -> f64 {
    ((l1 - l2) * (1.0 / t1 - 1.0 / t2)).exp().min(1.0)
}

/**
Log acceptance ratio of a crossover between chains with likelihoods `l1`,
`l2` at temperatures `t1`, `t2` that produced `l1_new`, `l2_new`.

When the two chains keep their likelihood order each new value is paired
with its own chain; when the order flips the new values are paired crosswise.
*/
pub fn crossover_log_ratio(l1: f64, t1: f64, l2: f64, t2: f64, l1_new: f64, l2_new: f64) -> f64 {
    if (l1 > l2) == (l1_new > l2_new) {
        (l2 - l2_new) / t2 + (l1 - l1_new) / t1
    } else {
        (l2 - l1_new) / t2 + (l1 - l2_new) / t1
    }
}

/**
Runs `step.cycles` EMC iterations for `step.individual`, commits the
configuration of the chain picked at the end into the next buffer of `pool`,
and returns that chain's likelihood.

# Errors
`Precondition` if the population is degenerate: fewer than two chains, no
haplotype outside the individual, or all selection weights zero.
*/
pub fn solve<O, R>(
    oracle: &O,
    pool: &mut HaplotypePool,
    state: EmcState<'_, R>,
    step: EmcStep,
    params: &EmcParams,
) -> Result<f64>
where
    O: LikelihoodOracle,
    R: Rng + ?Sized,
{
    let EmcState {
        rng,
        run_log,
        stats,
    } = state;
    let individual = step.individual;
    let n_haps = pool.n_haplotypes();
    let (current, next) = pool.split();
    let evaluate = |parents: &Parents| oracle.evaluate(current, individual, parents);

    let mut population = ChainPopulation::new(
        individual,
        params.parallel_chains,
        params.max_temperature,
        params.selection_temperature,
        n_haps,
        rng,
        &evaluate,
    )?;

    let mut moves = Moves {
        population: &mut population,
        n_haps,
        generation: step.generation,
        run_log,
        stats,
    };
    for _ in 0..step.cycles {
        if uniform(rng) > params.mutation_rate {
            moves.mutate(rng, &evaluate)?;
        } else {
            moves.crossover(rng, &evaluate)?;
        }
        moves.exchange(rng)?;
    }

    let chosen = population.chain(roulette(population.chains(), rng)?);
    oracle.commit(current, next, individual, chosen.parents(), step.spread, rng)?;
    Ok(chosen.likelihood())
}

/// The three EMC operators over one population.
struct Moves<'a> {
    population: &'a mut ChainPopulation,
    n_haps: usize,
    generation: usize,
    run_log: &'a mut RunLog,
    stats: &'a mut AcceptanceStats,
}

impl Moves<'_> {
    fn mutate<R, F>(&mut self, rng: &mut R, evaluate: &F) -> Result<bool>
    where
        R: Rng + ?Sized,
        F: Fn(&Parents) -> f64,
    {
        let index = draw_below(rng, self.population.len());
        let chain = self.population.chain_mut(index);
        let slot = draw_slot(rng);
        let old = chain.parent(slot);
        let replacement = draw_foreign_haplotype(rng, self.n_haps, chain.individual())?;
        chain.set_parent(slot, replacement);

        let curr = chain.likelihood();
        let prop = evaluate(chain.parents());
        let ratio = ((curr - prop) / chain.temperature()).exp();
        let accepted = metropolis_accept(rng, curr, prop, ratio);
        if accepted {
            chain.set_likelihood(prop);
            self.run_log.write_chain(self.generation, chain, true)?;
        } else {
            chain.set_parent(slot, old);
        }
        self.stats.record_mutation(accepted);
        Ok(accepted)
    }

    fn crossover<R, F>(&mut self, rng: &mut R, evaluate: &F) -> Result<bool>
    where
        R: Rng + ?Sized,
        F: Fn(&Parents) -> f64,
    {
        let n_chains = self.population.len();
        let first = roulette(self.population.chains(), rng)?;
        let second = loop {
            let candidate = draw_below(rng, n_chains);
            if candidate != first {
                break candidate;
            }
        };
        let snapshot_1 = self.population.chain(first).clone();
        let snapshot_2 = self.population.chain(second).clone();

        let mask = rng.next_u32() & 15;
        let (l1_new, l2_new) = {
            let (c1, c2) = self.population.pair_mut(first, second);
            for slot in (0..4).filter(|slot| mask >> slot & 1 == 1) {
                let (p1, p2) = (c1.parent(slot), c2.parent(slot));
                c1.set_parent(slot, p2);
                c2.set_parent(slot, p1);
            }
            c1.set_likelihood(evaluate(c1.parents()));
            c2.set_likelihood(evaluate(c2.parents()));
            (c1.likelihood(), c2.likelihood())
        };

        let (l1, t1) = (snapshot_1.likelihood(), snapshot_1.temperature());
        let (l2, t2) = (snapshot_2.likelihood(), snapshot_2.temperature());
        let accepted = uniform(rng) <= crossover_log_ratio(l1, t1, l2, t2, l1_new, l2_new).exp();

        if accepted {
            self.run_log
                .write_chain(self.generation, self.population.chain(first), false)?;
            self.run_log
                .write_chain(self.generation, self.population.chain(second), false)?;
        } else {
            let (id_1, id_2) = (snapshot_1.id(), snapshot_2.id());
            self.population.restore(first, snapshot_1);
            self.population.restore(second, snapshot_2);
            self.run_log.write_line(&format!(
                "# Unsuccessful Crossover\tChainIDs:\t{id_1}\t{id_2}"
            ))?;
        }
        self.stats.record_crossover(accepted);
        Ok(accepted)
    }

    /// Attempts one temperature exchange per chain; returns how many were
    /// accepted.
    fn exchange<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize> {
        let n_chains = self.population.len();
        let mut accepted = 0;
        for _ in 0..n_chains {
            let rank = draw_below(rng, n_chains);
            let neighbour = if rank == 0 {
                1
            } else if rank == n_chains - 1 {
                n_chains - 2
            } else if rng.next_u32() & 1 == 1 {
                rank - 1
            } else {
                rank + 1
            };
            let a = self.population.chain(self.population.at_rank(rank));
            let b = self.population.chain(self.population.at_rank(neighbour));
            let p = exchange_probability(a.likelihood(), a.temperature(), b.likelihood(), b.temperature());
            if uniform(rng) < p {
                self.population.exchange_ranks(rank, neighbour);
                accepted += 1;
            }
        }
        self.run_log.write_line(&format!(
            "# Number of Exchanges out of total:\t{accepted}\t{n_chains}"
        ))?;
        self.stats.record_exchanges(n_chains as u64, accepted as u64);
        Ok(accepted)
    }
}
