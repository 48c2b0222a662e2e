//! Accumulation of the haplotypes sampled after burn-in and the final
//! phased calls derived from them.

use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::haplotype::HaplotypeBuffer;

/// Per-haplotype alternative-allele counts over the sampling generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleAccumulator {
    /// `[sample haplotype, site]`
    alt_counts: Array2<u32>,
    /// Number of generations folded in, per individual.
    draws: Vec<u32>,
}

impl SampleAccumulator {
    pub fn new(n_individuals: usize, n_sites: usize) -> Self {
        Self {
            alt_counts: Array2::zeros((2 * n_individuals, n_sites)),
            draws: vec![0; n_individuals],
        }
    }

    pub fn n_individuals(&self) -> usize {
        self.draws.len()
    }

    pub fn draws(&self, individual: usize) -> u32 {
        self.draws[individual]
    }

    pub fn alt_count(&self, hap: usize, site: usize) -> u32 {
        self.alt_counts[[hap, site]]
    }

    /// Folds the haplotypes of `individual` in `haps` into the counts.
    pub fn replace(&mut self, individual: usize, haps: &HaplotypeBuffer) {
        for hap in [2 * individual, 2 * individual + 1] {
            let mut row = self.alt_counts.row_mut(hap);
            for site in haps.haplotype(hap).iter_ones() {
                row[site] += 1;
            }
        }
        self.draws[individual] += 1;
    }

    /// Phased calls by majority over the sampled haplotypes, with dosages.
    ///
    /// Individuals that were never sampled fall back to their haplotypes in
    /// `current`.
    pub fn finalize(&self, current: &HaplotypeBuffer) -> PhasedCalls {
        let n_sites = self.alt_counts.ncols();
        let n_individuals = self.n_individuals();
        let per_individual: Vec<Vec<(u8, u8, f64)>> = (0..n_individuals)
            .into_par_iter()
            .map(|individual| {
                let draws = self.draws[individual];
                (0..n_sites)
                    .map(|site| {
                        if draws == 0 {
                            let a = current.allele(2 * individual, site) as u8;
                            let b = current.allele(2 * individual + 1, site) as u8;
                            return (a, b, f64::from(a + b));
                        }
                        let c0 = self.alt_counts[[2 * individual, site]];
                        let c1 = self.alt_counts[[2 * individual + 1, site]];
                        // ties go to the reference allele
                        let a = u8::from(2 * c0 > draws);
                        let b = u8::from(2 * c1 > draws);
                        (a, b, f64::from(c0 + c1) / f64::from(draws))
                    })
                    .collect()
            })
            .collect();

        let mut alleles = Array3::<u8>::zeros((n_individuals, n_sites, 2));
        let mut dosages = Array2::<f64>::zeros((n_individuals, n_sites));
        for (individual, calls) in per_individual.into_iter().enumerate() {
            for (site, (a, b, dosage)) in calls.into_iter().enumerate() {
                alleles[[individual, site, 0]] = a;
                alleles[[individual, site, 1]] = b;
                dosages[[individual, site]] = dosage;
            }
        }
        PhasedCalls::new(alleles, dosages)
    }
}

/// Final phased genotypes and alternative-allele dosages.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasedCalls {
    /// `[individual, site, haplotype]`
    alleles: Array3<u8>,
    /// `[individual, site]`, in `[0, 2]`
    dosages: Array2<f64>,
}

impl PhasedCalls {
    pub fn new(alleles: Array3<u8>, dosages: Array2<f64>) -> Self {
        Self { alleles, dosages }
    }

    pub fn n_individuals(&self) -> usize {
        self.dosages.nrows()
    }

    pub fn n_sites(&self) -> usize {
        self.dosages.ncols()
    }

    pub fn alleles(&self, individual: usize, site: usize) -> (u8, u8) {
        (
            self.alleles[[individual, site, 0]],
            self.alleles[[individual, site, 1]],
        )
    }

    pub fn dosage(&self, individual: usize, site: usize) -> f64 {
        self.dosages[[individual, site]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_replace_counts_alt_alleles() {
        let mut haps = HaplotypeBuffer::new(4, 3);
        haps.set(2, 0, true);
        haps.set(3, 2, true);
        let mut acc = SampleAccumulator::new(2, 3);
        acc.replace(1, &haps);
        acc.replace(1, &haps);
        assert_eq!(acc.draws(1), 2);
        assert_eq!(acc.draws(0), 0);
        assert_eq!(acc.alt_count(2, 0), 2);
        assert_eq!(acc.alt_count(3, 2), 2);
        assert_eq!(acc.alt_count(0, 0), 0);
    }

    #[test]
    fn test_finalize_majority_and_dosage() {
        let mut acc = SampleAccumulator::new(1, 2);
        let mut haps = HaplotypeBuffer::new(2, 2);
        haps.set(0, 0, true);
        acc.replace(0, &haps);
        acc.replace(0, &haps);
        haps.set(0, 0, false);
        haps.set(1, 1, true);
        acc.replace(0, &haps);

        let calls = acc.finalize(&haps);
        assert_eq!(calls.alleles(0, 0), (1, 0));
        assert_eq!(calls.alleles(0, 1), (0, 0));
        assert_abs_diff_eq!(calls.dosage(0, 0), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(calls.dosage(0, 1), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_finalize_without_draws_uses_current() {
        let acc = SampleAccumulator::new(1, 1);
        let mut haps = HaplotypeBuffer::new(2, 1);
        haps.set(1, 0, true);
        let calls = acc.finalize(&haps);
        assert_eq!(calls.alleles(0, 0), (0, 1));
        assert_abs_diff_eq!(calls.dosage(0, 0), 1.0);
    }
}
