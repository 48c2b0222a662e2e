/*!
# Likelihood oracle

The samplers score a candidate [`Parents`] configuration for an individual
through a [`LikelihoodOracle`], and hand the configuration they settle on
back to it for committing into the next haplotype buffer.

[`HmmOracle`] is a copying hidden Markov model over four hidden states: the
individual's first haplotype copies parent slot 0 or 1, its second copies
slot 2 or 3, and each side may switch source between adjacent sites.
Emissions come from the individual's genotype likelihoods.

```rust
use mini_phase::haplotype::HaplotypeBuffer;
use mini_phase::oracle::{HmmOracle, HmmParams, LikelihoodOracle};
use ndarray::Array3;

// one individual, two sites, certain hom-alt genotypes
let mut gls = Array3::<f64>::zeros((1, 2, 3));
gls[[0, 0, 2]] = 1.0;
gls[[0, 1, 2]] = 1.0;
let oracle = HmmOracle::new(gls, &[100, 200], HmmParams::default());

// two alt-only haplotypes to copy from
let mut haps = HaplotypeBuffer::new(4, 2);
for hap in 2..4 {
    haps.set(hap, 0, true);
    haps.set(hap, 1, true);
}
let good = oracle.evaluate(&haps, 0, &[2, 3, 2, 3]);
let bad = oracle.evaluate(&haps, 0, &[0, 1, 0, 1]);
assert!(good > bad);
```
*/

use ndarray::{Array2, Array3};
use rand::Rng;

use crate::core::Parents;
use crate::error::Result;
use crate::haplotype::HaplotypeBuffer;
use crate::selection::roulette_weights;

/// Scores parent configurations and commits the chosen one.
pub trait LikelihoodOracle {
    /// Log-likelihood of `individual`'s data given `parents`, read from `haps`.
    fn evaluate(&self, haps: &HaplotypeBuffer, individual: usize, parents: &Parents) -> f64;

    /// Writes new haplotypes for `individual` into `next`, derived from
    /// `parents` in `current`. `penalty` controls how strictly the new
    /// haplotypes follow the copied ones.
    fn commit<R: Rng + ?Sized>(
        &self,
        current: &HaplotypeBuffer,
        next: &mut HaplotypeBuffer,
        individual: usize,
        parents: &Parents,
        penalty: f64,
        rng: &mut R,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmmParams {
    /// Per-base-pair switch rate of each copying side.
    pub recombination_rate: f64,
    /// Weight of the uniform floor mixed into every emission.
    pub emission_error: f64,
    /// Probability that a committed allele differs from the copied one.
    pub copy_error: f64,
}

impl Default for HmmParams {
    fn default() -> Self {
        Self {
            recombination_rate: 1e-6,
            emission_error: 0.01,
            copy_error: 0.01,
        }
    }
}

const MIN_SWITCH: f64 = 1e-6;
const MAX_SWITCH: f64 = 0.5;

/// CPU copying HMM.
#[derive(Debug, Clone)]
pub struct HmmOracle {
    /// `[individual, site, genotype]`
    emissions: Array3<f64>,
    /// `[site, n_switched_sides]`; row 0 is unused.
    transitions: Array2<f64>,
    params: HmmParams,
}

impl HmmOracle {
    /// Builds the model from genotype likelihoods `[individual, site,
    /// genotype]` and the site positions.
    pub fn new(gls: Array3<f64>, positions: &[u64], params: HmmParams) -> Self {
        let (_, n_sites, _) = gls.dim();
        assert_eq!(n_sites, positions.len(), "one position per site");
        let eps = params.emission_error;
        let emissions = gls.mapv(|gl| (1.0 - eps) * gl + eps / 3.0);
        let mut transitions = Array2::<f64>::zeros((n_sites, 3));
        for site in 1..n_sites {
            let gap = positions[site].saturating_sub(positions[site - 1]) as f64;
            let r = (1.0 - (-params.recombination_rate * gap).exp()).clamp(MIN_SWITCH, MAX_SWITCH);
            transitions[[site, 0]] = (1.0 - r) * (1.0 - r);
            transitions[[site, 1]] = r * (1.0 - r);
            transitions[[site, 2]] = r * r;
        }
        Self {
            emissions,
            transitions,
            params,
        }
    }

    pub fn n_sites(&self) -> usize {
        self.transitions.nrows()
    }

    pub fn params(&self) -> &HmmParams {
        &self.params
    }

    #[inline]
    fn copied(haps: &HaplotypeBuffer, parents: &Parents, state: usize, site: usize) -> (usize, usize) {
        (
            haps.allele(parents[state >> 1], site),
            haps.allele(parents[2 + (state & 1)], site),
        )
    }

    #[inline]
    fn emission(&self, haps: &HaplotypeBuffer, individual: usize, parents: &Parents, state: usize, site: usize) -> f64 {
        let (a, b) = Self::copied(haps, parents, state, site);
        self.emissions[[individual, site, a + b]]
    }

    /// Transition weight between two states at `site`: the number of sides
    /// that switch source selects the coefficient.
    #[inline]
    fn transition(&self, site: usize, from: usize, to: usize) -> f64 {
        self.transitions[[site, (from ^ to).count_ones() as usize]]
    }

    /// Scaled forward pass. Returns the log-likelihood; when `alphas` is
    /// given the normalized forward vector of every site is stored in it.
    fn forward(
        &self,
        haps: &HaplotypeBuffer,
        individual: usize,
        parents: &Parents,
        mut alphas: Option<&mut Vec<[f64; 4]>>,
    ) -> f64 {
        let n_sites = self.n_sites();
        if n_sites == 0 {
            return 0.0;
        }
        let mut alpha = [0.0; 4];
        for (state, a) in alpha.iter_mut().enumerate() {
            *a = 0.25 * self.emission(haps, individual, parents, state, 0);
        }
        let mut score = normalize(&mut alpha);
        if let Some(store) = alphas.as_deref_mut() {
            store.clear();
            store.push(alpha);
        }
        for site in 1..n_sites {
            let mut next = [0.0; 4];
            for (to, n) in next.iter_mut().enumerate() {
                let mass: f64 = (0..4)
                    .map(|from| alpha[from] * self.transition(site, from, to))
                    .sum();
                *n = mass * self.emission(haps, individual, parents, to, site);
            }
            score += normalize(&mut next);
            alpha = next;
            if let Some(store) = alphas.as_deref_mut() {
                store.push(alpha);
            }
        }
        score
    }
}

/// Scales `v` to sum to one, returning the log of the original sum.
fn normalize(v: &mut [f64; 4]) -> f64 {
    let sum: f64 = v.iter().sum();
    v.iter_mut().for_each(|x| *x /= sum);
    sum.ln()
}

impl LikelihoodOracle for HmmOracle {
    fn evaluate(&self, haps: &HaplotypeBuffer, individual: usize, parents: &Parents) -> f64 {
        self.forward(haps, individual, parents, None)
    }

    /// Samples a copying path backwards from the forward vectors, then at
    /// each site samples the individual's allele pair `(h0, h1)` with weight
    /// `emission(h0 + h1) * (c(h0 | a) * c(h1 | b))^penalty`, where `(a, b)`
    /// are the copied alleles.
    fn commit<R: Rng + ?Sized>(
        &self,
        current: &HaplotypeBuffer,
        next: &mut HaplotypeBuffer,
        individual: usize,
        parents: &Parents,
        penalty: f64,
        rng: &mut R,
    ) -> Result<()> {
        let n_sites = self.n_sites();
        if n_sites == 0 {
            return Ok(());
        }
        let mut alphas = Vec::with_capacity(n_sites);
        self.forward(current, individual, parents, Some(&mut alphas));

        let mut path = vec![0usize; n_sites];
        path[n_sites - 1] = roulette_weights(&alphas[n_sites - 1], rng)?;
        for site in (0..n_sites - 1).rev() {
            let to = path[site + 1];
            let weights: Vec<f64> = (0..4)
                .map(|from| alphas[site][from] * self.transition(site + 1, from, to))
                .collect();
            path[site] = roulette_weights(&weights, rng)?;
        }

        let keep = 1.0 - self.params.copy_error;
        let flip = self.params.copy_error;
        let copy = |h: usize, x: usize| if h == x { keep } else { flip };
        for (site, &state) in path.iter().enumerate() {
            let (a, b) = Self::copied(current, parents, state, site);
            let weights: Vec<f64> = (0..4)
                .map(|pair| {
                    let (h0, h1) = (pair >> 1, pair & 1);
                    self.emissions[[individual, site, h0 + h1]]
                        * (copy(h0, a) * copy(h1, b)).powf(penalty)
                })
                .collect();
            let pair = roulette_weights(&weights, rng)?;
            next.set(2 * individual, site, pair >> 1 == 1);
            next.set(2 * individual + 1, site, pair & 1 == 1);
        }
        Ok(())
    }
}
