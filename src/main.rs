use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mini_phase::config::{EstimationConfig, EstimatorKind};
use mini_phase::estimate::Estimator;
use mini_phase::haplotype::HaplotypePool;
use mini_phase::io::gl::GenotypeLikelihoods;
use mini_phase::io::output::write_phased;
use mini_phase::io::panel::ReferencePanel;
use mini_phase::oracle::{HmmOracle, HmmParams};
use mini_phase::run_log::RunLog;

#[derive(Parser, Debug)]
#[clap(name = "mini-phase")]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Genotype likelihood file (tab-separated, optionally gzipped).
    input: PathBuf,
    /// Number of burn-in generations.
    #[clap(short, long, default_value_t = 56)]
    burnin: usize,
    /// Number of sampling generations.
    #[clap(short = 'm', long, default_value_t = 200)]
    sampling: usize,
    /// Cycles per individual are fold times the number of individuals.
    #[clap(short = 'n', long, default_value_t = 2)]
    fold: usize,
    /// Cycles per individual, overriding the fold.
    #[clap(short = 'C', long)]
    cycles: Option<usize>,
    /// Estimator: 0 MCMC, 1 EMC, 2 adaptive MCMC (sample x sample),
    /// 3 adaptive MCMC (sample x haplotype).
    #[clap(short = 'E', long, default_value_t = 0)]
    estimator: u8,
    /// Number of parallel EMC chains.
    #[clap(short = 'p', long, default_value_t = 5)]
    parallel_chains: usize,
    /// Highest EMC temperature; defaults to the number of chains.
    #[clap(long)]
    max_temperature: Option<f64>,
    #[clap(long, default_value_t = 10_000.0)]
    selection_temperature: f64,
    #[clap(long, default_value_t = 0.3)]
    mutation_rate: f64,
    /// Write a trace of every accepted proposal to this file.
    #[clap(short = 'e', long)]
    run_log: Option<PathBuf>,
    /// Reference haplotypes file.
    #[clap(short = 'H', long)]
    haps: Option<PathBuf>,
    /// Reference legend file.
    #[clap(short = 'L', long)]
    legend: Option<PathBuf>,
    /// Draw the first MCMC proposal of every call from the reference panel.
    #[clap(short = 'k', long)]
    kickstart: bool,
    #[clap(long)]
    seed: Option<u64>,
    #[clap(long, default_value_t = 1e-6)]
    recombination_rate: f64,
    #[clap(long, default_value_t = 0.01)]
    emission_error: f64,
    #[clap(long, default_value_t = 0.01)]
    copy_error: f64,
    /// Output file for the phased calls; gzipped when it ends in `.gz`.
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Write the relationship graph of an adaptive run to this file.
    #[clap(long)]
    graph_out: Option<PathBuf>,
    /// Show a progress bar.
    #[clap(long)]
    progress: bool,
    /// Log verbosity. One diagnostic line per generation is printed by
    /// default; `-v` adds debug output and `-vv` traces.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

impl Args {
    fn config(&self) -> anyhow::Result<EstimationConfig> {
        Ok(EstimationConfig {
            burnin: self.burnin,
            sampling: self.sampling,
            fold: self.fold,
            cycles: self.cycles,
            estimator: EstimatorKind::try_from(self.estimator)?,
            parallel_chains: self.parallel_chains,
            max_temperature: self.max_temperature,
            selection_temperature: self.selection_temperature,
            mutation_rate: self.mutation_rate,
            kickstart: self.kickstart,
            seed: self.seed,
            hmm: HmmParams {
                recombination_rate: self.recombination_rate,
                emission_error: self.emission_error,
                copy_error: self.copy_error,
            },
            run_log: self.run_log.clone(),
        })
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let mut name = self.input.clone().into_os_string();
            name.push(".phased.gz");
            PathBuf::from(name)
        })
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(args.verbose)))
        .init();

    let config = args.config()?;
    let gls = GenotypeLikelihoods::from_path(&args.input)
        .with_context(|| format!("reading genotype likelihoods from {}", args.input.display()))?;
    info!(
        "Read {} individuals over {} sites",
        gls.n_individuals(),
        gls.n_sites()
    );
    let panel = ReferencePanel::load_optional(args.legend.as_deref(), args.haps.as_deref(), &gls.sites)?;
    config.validate(panel.is_some())?;

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!("Seed\t{seed}");
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pool = HaplotypePool::from_likelihoods(&gls.gls, &mut rng)?;
    if let Some(panel) = &panel {
        pool.add_reference_panel(panel)?;
    }

    let cycles = config.cycles_for(gls.n_individuals());
    let positions: Vec<u64> = gls.sites.iter().map(|site| site.pos).collect();
    let oracle = HmmOracle::new(gls.gls, &positions, config.hmm);
    let run_log = match &config.run_log {
        Some(path) => RunLog::open(path)?,
        None => RunLog::disabled(),
    };

    let mut estimator = Estimator::new(pool, oracle, rng)
        .with_run_log(run_log)
        .with_kickstart(config.kickstart)
        .with_progress(args.progress);
    let strategy = config.strategy();
    info!("Estimator {strategy:?}, {cycles} cycles per individual");
    let history = estimator.run(config.burnin, config.sampling, cycles, strategy)?;
    if let Some(last) = history.last() {
        info!(
            "Final generation likelihood {:.3}, acceptance {:.3}",
            last.likelihood,
            last.acceptance.acceptance_rate()
        );
    }

    let output = args.output_path();
    write_phased(&output, &gls.sites, &gls.names, &estimator.finalize())
        .with_context(|| format!("writing {}", output.display()))?;
    info!("Wrote phased calls to {}", output.display());

    if let Some(path) = &args.graph_out {
        estimator
            .save_relationship_graph(path, &gls.names)
            .with_context(|| format!("writing relationship graph to {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_diagnostics_shown_by_default() {
        let args = Args::parse_from(["mini-phase", "input.gl"]);
        assert_eq!(log_level(args.verbose), "info");
        assert_eq!(log_level(1), "debug");
        assert_eq!(log_level(4), "trace");
    }

    #[test]
    fn test_default_output_path() {
        let args = Args::parse_from(["mini-phase", "data/input.gl.gz"]);
        assert_eq!(args.output_path(), PathBuf::from("data/input.gl.gz.phased.gz"));
        let config = args.config().unwrap();
        assert_eq!(config.burnin, 56);
        assert_eq!(config.sampling, 200);
    }
}
