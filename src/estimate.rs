/*!
# Estimation loop

[`Estimator`] owns everything a run needs: the double-buffered haplotype
pool, the likelihood oracle, the single random stream, the run log, the
relationship graph and the accumulator of post-burn-in draws.

Every entry point runs `burnin + sampling` generations. A generation
computes the annealing penalty, updates every individual in order with the
chosen solver (reading the current buffer, writing the next one), swaps the
buffers, and once past burn-in folds the new haplotypes into the
accumulator. One diagnostic line per generation goes to the `log` facade.

# Examples

```rust
use mini_phase::estimate::{Estimator, Strategy};
use mini_phase::haplotype::HaplotypePool;
use mini_phase::oracle::{HmmOracle, HmmParams};
use ndarray::Array3;
use rand::rngs::SmallRng;
use rand::SeedableRng;

// three individuals, four sites, flat genotype likelihoods
let gls = Array3::<f64>::from_elem((3, 4, 3), 1.0 / 3.0);
let mut rng = SmallRng::seed_from_u64(42);
let pool = HaplotypePool::from_likelihoods(&gls, &mut rng).unwrap();
let oracle = HmmOracle::new(gls, &[100, 200, 300, 400], HmmParams::default());

let mut estimator = Estimator::new(pool, oracle, rng);
let stats = estimator.run(4, 2, 6, Strategy::Mcmc).unwrap();
assert_eq!(stats.len(), 6);
let calls = estimator.finalize();
assert_eq!(calls.n_individuals(), 3);
```
*/

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::rngs::SmallRng;

use crate::emc::{self, EmcParams, EmcState, EmcStep};
use crate::error::{PhaseError, Result};
use crate::graph::{GraphKind, RelationshipGraph};
use crate::haplotype::HaplotypePool;
use crate::mcmc::{self, McmcState, McmcStep};
use crate::oracle::LikelihoodOracle;
use crate::run_log::{RunLog, EMC_HEADER, MCMC_HEADER};
use crate::sampling::{PhasedCalls, SampleAccumulator};
use crate::stats::AcceptanceStats;

/// Annealing penalty of generation `generation`:
/// `min(2 (generation + 1) / burnin, 1)^2`. Without burn-in it is always 1.
pub fn penalty(generation: usize, burnin: usize) -> f64 {
    if burnin == 0 {
        return 1.0;
    }
    let ramp = (2.0 * (generation + 1) as f64 / burnin as f64).min(1.0);
    ramp * ramp
}

/// Sampler selected once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Mcmc,
    Emc(EmcParams),
    Adaptive(GraphKind),
}

/// Diagnostics of one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationStats {
    pub generation: usize,
    pub penalty: f64,
    /// Summed likelihood over individuals, divided by individuals and sites.
    pub likelihood: f64,
    /// Total solver cycles, divided by the square of the individual count.
    pub cycles: f64,
    pub acceptance: AcceptanceStats,
}

pub struct Estimator<O> {
    pool: HaplotypePool,
    oracle: O,
    rng: SmallRng,
    run_log: RunLog,
    graph: RelationshipGraph,
    accumulator: SampleAccumulator,
    kickstart: bool,
    cancelled: Arc<AtomicBool>,
    progress: ProgressBar,
}

impl<O: LikelihoodOracle> Estimator<O> {
    /**
    Creates an estimator over `pool`. `rng` is the one random stream of the
    run; the same seed reproduces the same run.
    */
    pub fn new(pool: HaplotypePool, oracle: O, rng: SmallRng) -> Self {
        let accumulator = SampleAccumulator::new(pool.n_individuals(), pool.n_sites());
        let graph = Self::build_graph(&pool, GraphKind::Uniform);
        Self {
            pool,
            oracle,
            rng,
            run_log: RunLog::disabled(),
            graph,
            accumulator,
            kickstart: false,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn with_kickstart(mut self, kickstart: bool) -> Self {
        self.kickstart = kickstart;
        self
    }

    /// Shows a progress bar over generations on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        if show {
            let style = ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            self.progress = ProgressBar::new(0).with_style(style);
        }
        self
    }

    /// Flag checked at every generation boundary; setting it stops the run
    /// after the generation in progress.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn pool(&self) -> &HaplotypePool {
        &self.pool
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn accumulator(&self) -> &SampleAccumulator {
        &self.accumulator
    }

    pub fn run_log_mut(&mut self) -> &mut RunLog {
        &mut self.run_log
    }

    fn build_graph(pool: &HaplotypePool, kind: GraphKind) -> RelationshipGraph {
        RelationshipGraph::new(
            kind,
            pool.n_individuals(),
            pool.n_haplotypes(),
            pool.n_sample_haplotypes(),
        )
    }

    pub fn run(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
        strategy: Strategy,
    ) -> Result<Vec<GenerationStats>> {
        match strategy {
            Strategy::Mcmc => self.run_mcmc(burnin, sampling, cycles),
            Strategy::Emc(params) => self.run_emc(burnin, sampling, cycles, &params),
            Strategy::Adaptive(kind) => self.run_adaptive_mcmc(burnin, sampling, cycles, kind),
        }
    }

    /// Annealed MCMC with uniform proposals.
    pub fn run_mcmc(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
    ) -> Result<Vec<GenerationStats>> {
        self.graph = Self::build_graph(&self.pool, GraphKind::Uniform);
        self.run_graph_mcmc(burnin, sampling, cycles)
    }

    /// Annealed MCMC with proposals from a relationship graph of `kind`,
    /// built once here and shared by every individual and generation.
    pub fn run_adaptive_mcmc(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
        kind: GraphKind,
    ) -> Result<Vec<GenerationStats>> {
        if kind == GraphKind::Uniform {
            return Err(PhaseError::config(
                "adaptive MCMC needs a sample x sample or sample x haplotype graph",
            ));
        }
        self.graph = Self::build_graph(&self.pool, kind);
        self.run_graph_mcmc(burnin, sampling, cycles)
    }

    fn run_graph_mcmc(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
    ) -> Result<Vec<GenerationStats>> {
        self.run_log.write_line(MCMC_HEADER)?;
        self.generations(burnin, sampling, cycles, |est, step, stats| {
            let Self {
                pool,
                oracle,
                rng,
                run_log,
                graph,
                kickstart,
                ..
            } = est;
            mcmc::solve(
                &*oracle,
                pool,
                McmcState {
                    graph,
                    rng,
                    run_log,
                    stats,
                },
                McmcStep {
                    individual: step.individual,
                    cycles: step.cycles,
                    penalty: step.penalty,
                    kickstart: *kickstart,
                    generation: step.generation,
                },
            )
        })
    }

    /// Evolutionary Monte Carlo; the generation penalty is the commit spread.
    pub fn run_emc(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
        params: &EmcParams,
    ) -> Result<Vec<GenerationStats>> {
        params.validate()?;
        self.run_log.write_line(EMC_HEADER)?;
        self.generations(burnin, sampling, cycles, |est, step, stats| {
            let Self {
                pool,
                oracle,
                rng,
                run_log,
                ..
            } = est;
            emc::solve(
                &*oracle,
                pool,
                EmcState {
                    rng,
                    run_log,
                    stats,
                },
                EmcStep {
                    individual: step.individual,
                    cycles: step.cycles,
                    spread: step.penalty,
                    generation: step.generation,
                },
                params,
            )
        })
    }

    fn generations<F>(
        &mut self,
        burnin: usize,
        sampling: usize,
        cycles: usize,
        mut solve_one: F,
    ) -> Result<Vec<GenerationStats>>
    where
        F: FnMut(&mut Self, Call, &mut AcceptanceStats) -> Result<f64>,
    {
        let n_individuals = self.pool.n_individuals();
        if n_individuals == 0 {
            return Err(PhaseError::precondition("no individuals to estimate"));
        }
        let n_sites = self.pool.n_sites().max(1);
        let total = burnin + sampling;
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let mut history = Vec::with_capacity(total);
        for generation in 0..total {
            if self.cancelled.load(Ordering::Relaxed) {
                warn!("run cancelled before generation {generation} of {total}");
                break;
            }
            let pen = penalty(generation, burnin);
            let mut acceptance = AcceptanceStats::default();
            let mut sum = 0.0;
            for individual in 0..n_individuals {
                let call = Call {
                    individual,
                    cycles,
                    penalty: pen,
                    generation,
                };
                let like = solve_one(self, call, &mut acceptance)?;
                debug!("generation {generation} individual {individual} likelihood {like}");
                sum += like;
            }
            self.pool.swap();
            if generation >= burnin {
                for individual in 0..n_individuals {
                    self.accumulator.replace(individual, self.pool.current());
                }
            }

            let stats = GenerationStats {
                generation,
                penalty: pen,
                likelihood: sum / n_individuals as f64 / n_sites as f64,
                cycles: (cycles * n_individuals) as f64 / n_individuals as f64 / n_individuals as f64,
                acceptance,
            };
            info!(
                "{}\t{:.3}\t{:.3}\t{:.3}\taccept {:.3}",
                stats.generation,
                stats.penalty,
                stats.likelihood,
                stats.cycles,
                acceptance.acceptance_rate()
            );
            self.progress.inc(1);
            history.push(stats);
        }
        self.run_log.flush()?;
        self.progress.finish_with_message("Done!");
        Ok(history)
    }

    /// Phased calls from the accumulated draws (the current haplotypes for
    /// individuals that were never sampled).
    pub fn finalize(&self) -> PhasedCalls {
        self.accumulator.finalize(self.pool.current())
    }

    /// Writes the relationship graph of the last adaptive run.
    pub fn save_relationship_graph(&self, path: impl AsRef<Path>, names: &[String]) -> Result<()> {
        self.graph.persist(path, names)
    }
}

/// One per-individual solver invocation.
#[derive(Debug, Clone, Copy)]
struct Call {
    individual: usize,
    cycles: usize,
    penalty: f64,
    generation: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haplotype::HaplotypeBuffer;
    use crate::io::panel::ReferencePanel;
    use crate::oracle::{HmmOracle, HmmParams};
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;
    use rand::SeedableRng;

    fn estimator(seed: u64) -> Estimator<HmmOracle> {
        let n_individuals = 4;
        let n_sites = 6;
        let mut gls = Array3::<f64>::zeros((n_individuals, n_sites, 3));
        for i in 0..n_individuals {
            for s in 0..n_sites {
                gls[[i, s, (i + s) % 3]] = 0.8;
                gls[[i, s, (i + s + 1) % 3]] = 0.2;
            }
        }
        let positions: Vec<u64> = (1..=n_sites as u64).map(|s| s * 500).collect();
        let mut rng = SmallRng::seed_from_u64(seed);
        let pool = HaplotypePool::from_likelihoods(&gls, &mut rng).unwrap();
        let oracle = HmmOracle::new(gls, &positions, HmmParams::default());
        Estimator::new(pool, oracle, rng)
    }

    #[test]
    fn test_penalty_schedule() {
        assert_abs_diff_eq!(penalty(0, 56), (2.0f64 / 56.0).powi(2));
        let schedule: Vec<f64> = (0..100).map(|n| penalty(n, 56)).collect();
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        for n in 27..100 {
            assert_eq!(penalty(n, 56), 1.0);
        }
        assert!(penalty(26, 56) < 1.0);
        assert_eq!(penalty(0, 0), 1.0);
    }

    #[test]
    fn test_run_reports_every_generation() {
        let mut est = estimator(1);
        let stats = est.run_mcmc(3, 2, 5).unwrap();
        assert_eq!(stats.len(), 5);
        for (n, s) in stats.iter().enumerate() {
            assert_eq!(s.generation, n);
            assert_eq!(s.acceptance.proposals, 4 * 5);
            assert_abs_diff_eq!(s.cycles, 5.0 / 4.0);
            assert!(s.likelihood <= 0.0);
        }
        assert_eq!(est.accumulator().draws(0), 2);
    }

    #[test]
    fn test_emc_and_adaptive_runs() {
        let mut est = estimator(2);
        let params = EmcParams {
            parallel_chains: 3,
            max_temperature: 3.0,
            ..EmcParams::default()
        };
        let stats = est.run(2, 1, 4, Strategy::Emc(params)).unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].acceptance.exchanges, 4 * 4 * 3);

        let stats = est
            .run(2, 1, 4, Strategy::Adaptive(GraphKind::SampleHaplotype))
            .unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(est.graph().kind(), GraphKind::SampleHaplotype);
        assert_eq!(est.accumulator().draws(3), 2);
    }

    #[test]
    fn test_adaptive_rejects_uniform_graph() {
        let mut est = estimator(3);
        assert!(est.run_adaptive_mcmc(1, 0, 1, GraphKind::Uniform).is_err());
    }

    #[test]
    fn test_cancelled_run_stops_early() {
        let mut est = estimator(4);
        est.cancel_handle().store(true, Ordering::Relaxed);
        let stats = est.run_mcmc(5, 5, 2).unwrap();
        assert!(stats.is_empty());
        assert_eq!(est.accumulator().draws(0), 0);
    }

    #[test]
    fn test_reference_haplotypes_untouched() {
        let gls = Array3::<f64>::from_elem((2, 6, 3), 1.0 / 3.0);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut pool = HaplotypePool::from_likelihoods(&gls, &mut rng).unwrap();
        let mut reference = HaplotypeBuffer::new(1, 6);
        reference.set(0, 2, true);
        let panel = ReferencePanel::new(vec![reference.haplotype(0).to_bitvec(); 2], 6);
        pool.add_reference_panel(&panel).unwrap();
        let oracle = HmmOracle::new(gls, &[1, 2, 3, 4, 5, 6], HmmParams::default());

        let mut est = Estimator::new(pool, oracle, rng).with_kickstart(true);
        est.run_mcmc(2, 0, 8).unwrap();
        for hap in 4..6 {
            assert_eq!(est.pool().current().haplotype(hap), reference.haplotype(0));
            assert_eq!(est.pool().next().haplotype(hap), reference.haplotype(0));
        }
    }

    #[test]
    fn test_header_written_once_per_run() {
        let mut est = estimator(6).with_run_log(RunLog::in_memory());
        est.run_mcmc(2, 1, 3).unwrap();
        let headers = est
            .run_log_mut()
            .lines()
            .iter()
            .filter(|line| line.starts_with("##"))
            .count();
        assert_eq!(headers, 1);
    }
}
