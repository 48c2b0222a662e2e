pub mod chain;
pub mod config;
pub mod core;
pub mod emc;
pub mod error;
pub mod estimate;
pub mod graph;
pub mod haplotype;
pub mod io;
pub mod mcmc;
pub mod oracle;
pub mod run_log;
pub mod sampling;
pub mod selection;
pub mod stats;
