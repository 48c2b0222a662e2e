//! Primitives shared by the samplers: the parent configuration type and the
//! random draws every solver takes from the one process-wide generator.
//!
//! All draws go through these helpers so that a run consumes the stream in
//! the same order for a given seed. Integer deviates are taken as
//! `next_u32() % n`, uniform deviates as `gen::<f64>()` in `[0, 1)`.

use rand::Rng;

use crate::error::{PhaseError, Result};

/// Four haplotype indices forming a candidate diploid configuration.
///
/// Slots 0 and 1 are the two copying sources of the individual's first
/// haplotype, slots 2 and 3 those of its second haplotype.
pub type Parents = [usize; 4];

/// Returns `true` if haplotype `hap` is one of the two haplotypes of
/// `individual`.
#[inline]
pub fn owned_by(hap: usize, individual: usize) -> bool {
    hap / 2 == individual
}

/// Integer deviate in `0..n`.
#[inline]
pub fn draw_below<R: Rng + ?Sized>(rng: &mut R, n: usize) -> usize {
    rng.next_u32() as usize % n
}

/// Uniform deviate in `[0, 1)`.
#[inline]
pub fn uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>()
}

/// One of the four parent slots.
#[inline]
pub fn draw_slot<R: Rng + ?Sized>(rng: &mut R) -> usize {
    (rng.next_u32() & 3) as usize
}

/// Draws a haplotype uniformly from `0..n_haps`, redrawing while it belongs
/// to `individual`.
pub fn draw_foreign_haplotype<R: Rng + ?Sized>(
    rng: &mut R,
    n_haps: usize,
    individual: usize,
) -> Result<usize> {
    let own = (2 * individual..2 * individual + 2)
        .filter(|&h| h < n_haps)
        .count();
    if n_haps <= own {
        return Err(PhaseError::precondition(format!(
            "no haplotype outside individual {individual} among {n_haps} haplotypes"
        )));
    }
    loop {
        let hap = draw_below(rng, n_haps);
        if !owned_by(hap, individual) {
            return Ok(hap);
        }
    }
}

/// Metropolis rule used by the annealed samplers: improvements are always
/// accepted, otherwise a uniform deviate is compared against `ratio`.
///
/// The uniform is only drawn when `proposed <= current`.
#[inline]
pub fn metropolis_accept<R: Rng + ?Sized>(
    rng: &mut R,
    current: f64,
    proposed: f64,
    ratio: f64,
) -> bool {
    proposed > current || uniform(rng) < ratio
}
