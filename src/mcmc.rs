/*!
# Annealed Metropolis sampler

Per-individual simulated annealing over the four parent slots. Each step
replaces one slot with a haplotype drawn from the [`ProposalGraph`] and
accepts the change with the Metropolis rule

```text
accept  if  proposed > current  or  u < exp((proposed - current) * penalty)
```

where `penalty` is the annealing parameter of the generation: small values
flatten the landscape early in burn-in, `penalty = 1` is the plain
Metropolis criterion. The graph is told about every outcome, so with an
adaptive graph the proposals drift towards haplotypes that were accepted
before, across all individuals and generations.

The same solver runs plain MCMC (uniform graph) and adaptive MCMC.
*/

use rand::Rng;

use crate::core::{draw_slot, metropolis_accept, Parents};
use crate::error::Result;
use crate::graph::ProposalGraph;
use crate::haplotype::HaplotypePool;
use crate::oracle::LikelihoodOracle;
use crate::run_log::RunLog;
use crate::stats::AcceptanceStats;

/// Parameters of one per-individual MCMC call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McmcStep {
    pub individual: usize,
    pub cycles: usize,
    pub penalty: f64,
    /// Draw the first replacement from the reference panel only.
    pub kickstart: bool,
    /// Generation index, only used for logging.
    pub generation: usize,
}

/// Everything an MCMC call mutates besides the haplotypes.
pub struct McmcState<'a, G, R: ?Sized> {
    pub graph: &'a mut G,
    pub rng: &'a mut R,
    pub run_log: &'a mut RunLog,
    pub stats: &'a mut AcceptanceStats,
}

/**
Runs `step.cycles` Metropolis steps for `step.individual` and commits the
final configuration into the next buffer of `pool`.

Returns the likelihood of the committed configuration.
*/
pub fn solve<O, G, R>(
    oracle: &O,
    pool: &mut HaplotypePool,
    state: McmcState<'_, G, R>,
    step: McmcStep,
) -> Result<f64>
where
    O: LikelihoodOracle,
    G: ProposalGraph,
    R: Rng + ?Sized,
{
    let McmcState {
        graph,
        rng,
        run_log,
        stats,
    } = state;
    let individual = step.individual;

    let mut parents: Parents = [0; 4];
    for slot in parents.iter_mut() {
        *slot = graph.sample_haplotype(individual, rng, false)?;
    }

    let (current, next) = pool.split();
    let mut curr = oracle.evaluate(current, individual, &parents);

    for n in 0..step.cycles {
        let rp = draw_slot(rng);
        let old = parents[rp];
        parents[rp] = graph.sample_haplotype(individual, rng, step.kickstart && n == 0)?;

        let prop = oracle.evaluate(current, individual, &parents);
        let accepted = metropolis_accept(rng, curr, prop, ((prop - curr) * step.penalty).exp());
        if accepted {
            curr = prop;
        } else {
            parents[rp] = old;
        }

        graph.update(&parents, accepted, individual, step.penalty);
        stats.record_proposal(accepted);

        if accepted && run_log.is_enabled() {
            run_log.write_line(&format!("{}\t{individual}\t{prop}", step.generation))?;
        }
    }

    oracle.commit(current, next, individual, &parents, step.penalty, rng)?;
    Ok(curr)
}
