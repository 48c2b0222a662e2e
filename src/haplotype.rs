//! # Bit-packed haplotype storage
//!
//! A [`HaplotypeBuffer`] stores every haplotype of a run as one bit per site
//! (set = alternative allele). Haplotypes `2k` and `2k + 1` belong to sample
//! individual `k`; reference-panel haplotypes follow the sample haplotypes
//! and are never written after they are loaded.
//!
//! A [`HaplotypePool`] owns two buffers. During a generation the samplers
//! read from the *current* buffer and commit into the *next* buffer; the two
//! are exchanged by [`HaplotypePool::swap`] once the generation is finished.

use bitvec::prelude::*;
use ndarray::Array3;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};

use crate::error::{PhaseError, Result};
use crate::io::panel::ReferencePanel;

/// Fixed-width haplotype bit sets laid out back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaplotypeBuffer {
    bits: BitVec<u64, Lsb0>,
    n_sites: usize,
    n_haps: usize,
    /// Haplotypes `0..writable` may be modified; the rest are reference haplotypes.
    writable: usize,
}

impl HaplotypeBuffer {
    /// Creates `n_haps` all-reference-allele haplotypes over `n_sites` sites.
    pub fn new(n_haps: usize, n_sites: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; n_haps * n_sites],
            n_sites,
            n_haps,
            writable: n_haps,
        }
    }

    pub fn n_haps(&self) -> usize {
        self.n_haps
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    /// Number of haplotypes that may be written.
    pub fn n_writable(&self) -> usize {
        self.writable
    }

    #[inline]
    pub fn get(&self, hap: usize, site: usize) -> bool {
        debug_assert!(hap < self.n_haps && site < self.n_sites);
        self.bits[hap * self.n_sites + site]
    }

    /// Allele at `site` as `0` or `1`.
    #[inline]
    pub fn allele(&self, hap: usize, site: usize) -> usize {
        self.get(hap, site) as usize
    }

    /// Sets the allele of a sample haplotype.
    ///
    /// # Panics
    /// If `hap` is a reference-panel haplotype.
    #[inline]
    pub fn set(&mut self, hap: usize, site: usize, alt: bool) {
        assert!(
            hap < self.writable,
            "haplotype {hap} is read-only (first reference haplotype is {})",
            self.writable
        );
        self.bits.set(hap * self.n_sites + site, alt);
    }

    /// The bits of one haplotype.
    pub fn haplotype(&self, hap: usize) -> &BitSlice<u64, Lsb0> {
        &self.bits[hap * self.n_sites..(hap + 1) * self.n_sites]
    }

    fn append_read_only(&mut self, hap: &BitSlice<u64, Lsb0>) {
        debug_assert_eq!(hap.len(), self.n_sites);
        self.bits.extend_from_bitslice(hap);
        self.n_haps += 1;
    }
}

/// Two haplotype buffers with a generation index selecting the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaplotypePool {
    buffers: [HaplotypeBuffer; 2],
    current: usize,
    n_individuals: usize,
}

impl HaplotypePool {
    /// Pool of `n_individuals` individuals whose haplotypes start as copies of
    /// `initial`. Both buffers hold the same haplotypes.
    pub fn from_buffer(initial: HaplotypeBuffer) -> Self {
        let n_individuals = initial.n_haps() / 2;
        Self {
            buffers: [initial.clone(), initial],
            current: 0,
            n_individuals,
        }
    }

    /// Draws starting haplotypes from genotype likelihoods laid out as
    /// `[individual, site, genotype]` with genotypes (hom-ref, het, hom-alt).
    ///
    /// At each site a genotype is drawn proportionally to its likelihood;
    /// heterozygous genotypes get a random phase.
    pub fn from_likelihoods<R: Rng + ?Sized>(gls: &Array3<f64>, rng: &mut R) -> Result<Self> {
        let (n_individuals, n_sites, n_genotypes) = gls.dim();
        if n_genotypes != 3 {
            return Err(PhaseError::precondition(format!(
                "expected 3 genotype likelihoods per site, got {n_genotypes}"
            )));
        }
        let mut buffer = HaplotypeBuffer::new(2 * n_individuals, n_sites);
        for individual in 0..n_individuals {
            for site in 0..n_sites {
                let weights = [
                    gls[[individual, site, 0]],
                    gls[[individual, site, 1]],
                    gls[[individual, site, 2]],
                ];
                let genotype = WeightedIndex::new(weights)
                    .map_err(|e| {
                        PhaseError::precondition(format!(
                            "genotype likelihoods of individual {individual} at site {site}: {e}"
                        ))
                    })?
                    .sample(rng);
                let (first, second) = match genotype {
                    0 => (false, false),
                    2 => (true, true),
                    _ => {
                        let flip = rng.gen::<bool>();
                        (flip, !flip)
                    }
                };
                buffer.set(2 * individual, site, first);
                buffer.set(2 * individual + 1, site, second);
            }
        }
        Ok(Self::from_buffer(buffer))
    }

    /// Appends reference haplotypes to both buffers. They are never written.
    pub fn add_reference_panel(&mut self, panel: &ReferencePanel) -> Result<()> {
        if panel.n_sites() != self.n_sites() {
            return Err(PhaseError::precondition(format!(
                "reference panel covers {} sites but the samples cover {}",
                panel.n_sites(),
                self.n_sites()
            )));
        }
        for buffer in self.buffers.iter_mut() {
            for hap in panel.haplotypes() {
                buffer.append_read_only(hap);
            }
        }
        Ok(())
    }

    pub fn current(&self) -> &HaplotypeBuffer {
        &self.buffers[self.current]
    }

    pub fn next(&self) -> &HaplotypeBuffer {
        &self.buffers[self.current ^ 1]
    }

    /// Read access to the current buffer together with write access to the
    /// next one.
    pub fn split(&mut self) -> (&HaplotypeBuffer, &mut HaplotypeBuffer) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Exchanges current and next. Called once per generation.
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    pub fn n_individuals(&self) -> usize {
        self.n_individuals
    }

    pub fn n_sites(&self) -> usize {
        self.current().n_sites()
    }

    /// All haplotypes, reference panel included.
    pub fn n_haplotypes(&self) -> usize {
        self.current().n_haps()
    }

    pub fn n_sample_haplotypes(&self) -> usize {
        2 * self.n_individuals
    }

    pub fn n_reference_haplotypes(&self) -> usize {
        self.n_haplotypes() - self.n_sample_haplotypes()
    }

    pub fn is_reference(&self, hap: usize) -> bool {
        hap >= self.n_sample_haplotypes()
    }
}
