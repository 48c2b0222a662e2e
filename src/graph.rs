/*!
# Relationship graph

The MCMC samplers draw candidate parent haplotypes through a
[`ProposalGraph`]. [`RelationshipGraph`] comes in three kinds:

- [`GraphKind::Uniform`]: every haplotype outside the individual is equally
  likely; updates are ignored. Used by plain annealed MCMC.
- [`GraphKind::SampleSample`]: one weight per (individual, individual) pair;
  reference haplotypes are grouped into pseudo-individuals of two.
- [`GraphKind::SampleHaplotype`]: one weight per (individual, haplotype) pair.

The adaptive kinds keep a numerator and a denominator per cell, both
starting at 1. Every proposal adds the current penalty to the denominator of
the four proposing columns, and to the numerator as well when the proposal
was accepted, so columns that keep providing accepted parents get drawn more
often. The graph is built once per run and shared by every individual.
*/

use std::path::Path;

use csv::WriterBuilder;
use ndarray::Array2;
use rand::Rng;

use crate::core::{draw_below, draw_foreign_haplotype, Parents};
use crate::error::{PhaseError, Result};
use crate::selection::roulette_weights;

/// Source of candidate parent haplotypes that adapts to proposal outcomes.
pub trait ProposalGraph {
    /// Draws a haplotype index not belonging to `individual`, restricted to
    /// the reference panel when `reference_only` is set and a panel exists.
    fn sample_haplotype<R: Rng + ?Sized>(
        &self,
        individual: usize,
        rng: &mut R,
        reference_only: bool,
    ) -> Result<usize>;

    /// Records the outcome of one proposal for `individual`.
    fn update(&mut self, parents: &Parents, accepted: bool, individual: usize, penalty: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    SampleSample,
    SampleHaplotype,
    Uniform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipGraph {
    kind: GraphKind,
    n_individuals: usize,
    n_haps: usize,
    n_sample_haps: usize,
    /// `[individual, column]`, empty for the uniform kind
    numerator: Array2<f64>,
    denominator: Array2<f64>,
}

impl RelationshipGraph {
    /**
    Initializes a graph over `n_individuals` sample individuals and `n_haps`
    haplotypes, the first `n_sample_haps` of which belong to the samples.
    */
    pub fn new(kind: GraphKind, n_individuals: usize, n_haps: usize, n_sample_haps: usize) -> Self {
        let n_columns = match kind {
            GraphKind::Uniform => 0,
            GraphKind::SampleSample => n_haps.div_ceil(2),
            GraphKind::SampleHaplotype => n_haps,
        };
        let n_rows = if n_columns == 0 { 0 } else { n_individuals };
        let mut numerator = Array2::<f64>::ones((n_rows, n_columns));
        let denominator = Array2::<f64>::ones((n_rows, n_columns));
        // an individual never copies from itself
        for individual in 0..n_rows {
            for hap in [2 * individual, 2 * individual + 1] {
                if hap < n_haps {
                    let col = Self::column_of(kind, hap);
                    numerator[[individual, col]] = 0.0;
                }
            }
        }
        Self {
            kind,
            n_individuals,
            n_haps,
            n_sample_haps,
            numerator,
            denominator,
        }
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    pub fn n_columns(&self) -> usize {
        self.numerator.ncols()
    }

    fn column_of(kind: GraphKind, hap: usize) -> usize {
        match kind {
            GraphKind::SampleSample => hap / 2,
            _ => hap,
        }
    }

    fn first_reference_column(&self) -> usize {
        Self::column_of(self.kind, self.n_sample_haps)
    }

    fn has_reference(&self) -> bool {
        self.n_haps > self.n_sample_haps
    }

    /// Current sampling weight of `column` for `individual`.
    pub fn weight(&self, individual: usize, column: usize) -> f64 {
        self.numerator[[individual, column]] / self.denominator[[individual, column]]
    }

    /**
    Writes the weight matrix as a tab-separated table: a header of column
    names followed by one row per individual.

    `names` are the sample names; reference columns are named `refSamp{i}`
    (sample × sample) or `refSamp{i}.{0|1}` (sample × haplotype).
    */
    pub fn persist(&self, path: impl AsRef<Path>, names: &[String]) -> Result<()> {
        if self.kind == GraphKind::Uniform {
            return Err(PhaseError::config(
                "a uniform proposal graph has no relationship matrix to save",
            ));
        }
        if names.len() != self.n_individuals {
            return Err(PhaseError::precondition(format!(
                "{} sample names given for {} individuals",
                names.len(),
                self.n_individuals
            )));
        }
        let n_ref_samples = (self.n_haps - self.n_sample_haps).div_ceil(2);
        let mut column_names: Vec<String> = names
            .iter()
            .cloned()
            .chain((0..n_ref_samples).map(|i| format!("refSamp{i}")))
            .collect();
        if self.kind == GraphKind::SampleHaplotype {
            column_names = column_names
                .iter()
                .flat_map(|name| [format!("{name}.0"), format!("{name}.1")])
                .take(self.n_haps)
                .collect();
        }

        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_ref())?;
        let mut header = vec!["individual".to_string()];
        header.extend(column_names);
        wtr.write_record(&header)?;
        for (individual, name) in names.iter().enumerate() {
            let mut row = vec![name.clone()];
            row.extend((0..self.n_columns()).map(|col| self.weight(individual, col).to_string()));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ProposalGraph for RelationshipGraph {
    fn sample_haplotype<R: Rng + ?Sized>(
        &self,
        individual: usize,
        rng: &mut R,
        reference_only: bool,
    ) -> Result<usize> {
        let reference_only = reference_only && self.has_reference();
        if self.kind == GraphKind::Uniform {
            if reference_only {
                let n_ref = self.n_haps - self.n_sample_haps;
                return Ok(self.n_sample_haps + draw_below(rng, n_ref));
            }
            return draw_foreign_haplotype(rng, self.n_haps, individual);
        }

        let offset = if reference_only {
            self.first_reference_column()
        } else {
            0
        };
        let weights: Vec<f64> = (offset..self.n_columns())
            .map(|col| self.weight(individual, col))
            .collect();
        let column = offset + roulette_weights(&weights, rng)?;
        let hap = match self.kind {
            GraphKind::SampleSample => {
                let hap = 2 * column + (rng.next_u32() & 1) as usize;
                // odd-sized reference panels leave a half-filled last column
                if hap < self.n_haps {
                    hap
                } else {
                    2 * column
                }
            }
            _ => column,
        };
        Ok(hap)
    }

    fn update(&mut self, parents: &Parents, accepted: bool, individual: usize, penalty: f64) {
        if self.kind == GraphKind::Uniform {
            return;
        }
        for &hap in parents {
            let col = Self::column_of(self.kind, hap);
            self.denominator[[individual, col]] += penalty;
            if accepted {
                self.numerator[[individual, col]] += penalty;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_never_samples_own_pair() {
        let mut rng = SmallRng::seed_from_u64(42);
        for kind in [GraphKind::Uniform, GraphKind::SampleSample, GraphKind::SampleHaplotype] {
            let graph = RelationshipGraph::new(kind, 3, 9, 6);
            for individual in 0..3 {
                for _ in 0..2_000 {
                    let hap = graph.sample_haplotype(individual, &mut rng, false).unwrap();
                    assert!(hap < 9, "{kind:?} drew {hap}");
                    assert_ne!(hap / 2, individual, "{kind:?}");
                }
            }
        }
    }

    #[test]
    fn test_reference_only_draws() {
        let mut rng = SmallRng::seed_from_u64(1);
        for kind in [GraphKind::Uniform, GraphKind::SampleSample, GraphKind::SampleHaplotype] {
            let graph = RelationshipGraph::new(kind, 2, 7, 4);
            for _ in 0..1_000 {
                let hap = graph.sample_haplotype(0, &mut rng, true).unwrap();
                assert!((4..7).contains(&hap), "{kind:?} drew {hap}");
            }
        }
    }

    #[test]
    fn test_reference_only_without_panel_falls_back() {
        let mut rng = SmallRng::seed_from_u64(2);
        let graph = RelationshipGraph::new(GraphKind::SampleSample, 3, 6, 6);
        let hap = graph.sample_haplotype(0, &mut rng, true).unwrap();
        assert!((2..6).contains(&hap));
    }

    #[test]
    fn test_update_moves_weights() {
        let mut graph = RelationshipGraph::new(GraphKind::SampleHaplotype, 2, 4, 4);
        graph.update(&[2, 2, 3, 3], true, 0, 0.5);
        graph.update(&[2, 2, 3, 3], false, 0, 1.0);
        // numerator 1 + 2 * 0.5, denominator 1 + 2 * 0.5 + 2 * 1.0
        assert_abs_diff_eq!(graph.weight(0, 2), 2.0 / 4.0);
        assert_abs_diff_eq!(graph.weight(0, 0), 0.0);
        assert_abs_diff_eq!(graph.weight(1, 0), 1.0);
    }

    #[test]
    fn test_accepted_columns_drawn_more_often() {
        const TRIALS: usize = 20_000;
        let mut rng = SmallRng::seed_from_u64(7);
        let mut graph = RelationshipGraph::new(GraphKind::SampleSample, 3, 6, 6);
        for _ in 0..50 {
            graph.update(&[2, 3, 2, 3], true, 0, 1.0);
            graph.update(&[4, 5, 4, 5], false, 0, 1.0);
        }
        let from_one = (0..TRIALS)
            .filter(|_| graph.sample_haplotype(0, &mut rng, false).unwrap() / 2 == 1)
            .count();
        assert!(from_one as f64 / TRIALS as f64 > 0.9);
    }

    #[test]
    fn test_uniform_update_is_noop() {
        let mut graph = RelationshipGraph::new(GraphKind::Uniform, 2, 4, 4);
        let before = graph.clone();
        graph.update(&[2, 3, 2, 3], true, 0, 1.0);
        assert_eq!(graph, before);
    }

    #[test]
    fn test_persist_writes_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.tsv");
        let mut graph = RelationshipGraph::new(GraphKind::SampleSample, 2, 6, 4);
        graph.update(&[2, 2, 2, 2], false, 0, 1.0);
        graph
            .persist(&path, &["a".to_string(), "b".to_string()])
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "individual\ta\tb\trefSamp0");
        assert_eq!(lines[1], "a\t0\t0.2\t1");
        assert_eq!(lines[2], "b\t1\t0\t1");
    }

    #[test]
    fn test_persist_uniform_is_error() {
        let graph = RelationshipGraph::new(GraphKind::Uniform, 1, 4, 2);
        let dir = tempfile::tempdir().unwrap();
        assert!(graph
            .persist(dir.path().join("g.tsv"), &["a".to_string()])
            .is_err());
    }
}
