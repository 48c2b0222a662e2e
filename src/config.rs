//! Run configuration: iteration schedule, estimator choice and model settings.

use std::path::PathBuf;

use crate::emc::EmcParams;
use crate::error::{PhaseError, Result};
use crate::estimate::Strategy;
use crate::graph::GraphKind;
use crate::oracle::HmmParams;

/// Which sampler drives the estimation, selected by a numeric code on the
/// command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorKind {
    /// `0`: annealed MCMC with uniform proposals
    #[default]
    Mcmc,
    /// `1`: evolutionary Monte Carlo
    Emc,
    /// `2`: adaptive MCMC, sample × sample relationship graph
    AdaptiveSampleSample,
    /// `3`: adaptive MCMC, sample × haplotype relationship graph
    AdaptiveSampleHaplotype,
}

impl TryFrom<u8> for EstimatorKind {
    type Error = PhaseError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Mcmc),
            1 => Ok(Self::Emc),
            2 => Ok(Self::AdaptiveSampleSample),
            3 => Ok(Self::AdaptiveSampleHaplotype),
            _ => Err(PhaseError::config(format!(
                "estimator must be one of 0 (MCMC), 1 (EMC), 2 or 3 (adaptive MCMC), got {code}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationConfig {
    pub burnin: usize,
    pub sampling: usize,
    /// Cycles per individual are `fold * individuals` unless `cycles` is set.
    pub fold: usize,
    pub cycles: Option<usize>,
    pub estimator: EstimatorKind,
    pub parallel_chains: usize,
    /// Defaults to the number of parallel chains.
    pub max_temperature: Option<f64>,
    pub selection_temperature: f64,
    pub mutation_rate: f64,
    /// Draw the first MCMC replacement of every call from the reference panel.
    pub kickstart: bool,
    /// Drawn at random when unset.
    pub seed: Option<u64>,
    pub hmm: HmmParams,
    pub run_log: Option<PathBuf>,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            burnin: 56,
            sampling: 200,
            fold: 2,
            cycles: None,
            estimator: EstimatorKind::Mcmc,
            parallel_chains: 5,
            max_temperature: None,
            selection_temperature: 10_000.0,
            mutation_rate: 0.3,
            kickstart: false,
            seed: None,
            hmm: HmmParams::default(),
            run_log: None,
        }
    }
}

impl EstimationConfig {
    pub fn cycles_for(&self, n_individuals: usize) -> usize {
        self.cycles.unwrap_or(self.fold * n_individuals)
    }

    pub fn emc_params(&self) -> EmcParams {
        EmcParams {
            parallel_chains: self.parallel_chains,
            max_temperature: self
                .max_temperature
                .unwrap_or(self.parallel_chains as f64),
            selection_temperature: self.selection_temperature,
            mutation_rate: self.mutation_rate,
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self.estimator {
            EstimatorKind::Mcmc => Strategy::Mcmc,
            EstimatorKind::Emc => Strategy::Emc(self.emc_params()),
            EstimatorKind::AdaptiveSampleSample => Strategy::Adaptive(GraphKind::SampleSample),
            EstimatorKind::AdaptiveSampleHaplotype => {
                Strategy::Adaptive(GraphKind::SampleHaplotype)
            }
        }
    }

    /// Checks the settings against each other and against the loaded data.
    pub fn validate(&self, has_reference_panel: bool) -> Result<()> {
        if self.estimator == EstimatorKind::Emc {
            self.emc_params().validate()?;
        }
        if self.kickstart && !has_reference_panel {
            return Err(PhaseError::config(
                "kickstart needs a reference panel (legend and haplotype files)",
            ));
        }
        if self.kickstart && self.estimator == EstimatorKind::Emc {
            log::warn!("kickstart has no effect on the EMC estimator");
        }
        let hmm = &self.hmm;
        if !(0.0..1.0).contains(&hmm.emission_error) || !(0.0..1.0).contains(&hmm.copy_error) {
            return Err(PhaseError::config(format!(
                "HMM error rates must lie in [0, 1), got emission {} and copy {}",
                hmm.emission_error, hmm.copy_error
            )));
        }
        if !(hmm.recombination_rate >= 0.0 && hmm.recombination_rate.is_finite()) {
            return Err(PhaseError::config(format!(
                "recombination rate must be non-negative, got {}",
                hmm.recombination_rate
            )));
        }
        Ok(())
    }
}
