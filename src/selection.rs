//! Roulette-wheel selection.
//!
//! An item is picked with probability proportional to its weight. The scan
//! runs in population order, so the first item whose cumulative weight
//! passes the drawn point wins. Items with weight zero are never picked.

use rand::Rng;

use crate::core::uniform;
use crate::error::{PhaseError, Result};

/// Anything that can take part in a roulette-wheel draw.
pub trait Selectable {
    /// Non-negative selection weight.
    fn selection_weight(&self) -> f64;
}

impl Selectable for f64 {
    fn selection_weight(&self) -> f64 {
        *self
    }
}

/// Picks the index of one of `items` with probability proportional to its
/// selection weight.
///
/// # Errors
/// [`PhaseError::Precondition`] if the total weight is not strictly
/// positive and finite.
pub fn roulette<T: Selectable, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Result<usize> {
    let total: f64 = items.iter().map(Selectable::selection_weight).sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(PhaseError::precondition(format!(
            "roulette-wheel selection over {} items with total weight {total}",
            items.len()
        )));
    }

    let mut remaining = uniform(rng) * total;
    let mut last_positive = None;
    for (i, item) in items.iter().enumerate() {
        let weight = item.selection_weight();
        if weight <= 0.0 {
            continue;
        }
        if remaining < weight {
            return Ok(i);
        }
        remaining -= weight;
        last_positive = Some(i);
    }
    // rounding can leave a sliver past the last item
    last_positive.ok_or_else(|| PhaseError::precondition("selection index out of range"))
}

/// Same as [`roulette`] over raw weights.
pub fn roulette_weights<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<usize> {
    roulette(weights, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_equal_weights_are_uniform() {
        const TRIALS: usize = 100_000;
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts = [0usize; 4];
        for _ in 0..TRIALS {
            counts[roulette_weights(&[1.0, 1.0, 1.0, 1.0], &mut rng).unwrap()] += 1;
        }
        for count in counts {
            assert_abs_diff_eq!(count as f64 / TRIALS as f64, 0.25, epsilon = 0.01);
        }
    }

    #[test]
    fn test_single_positive_weight_always_chosen() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..10_000 {
            assert_eq!(roulette_weights(&[0.0, 0.0, 0.0, 1.0], &mut rng).unwrap(), 3);
        }
    }

    #[test]
    fn test_proportional_weights() {
        const TRIALS: usize = 100_000;
        let mut rng = SmallRng::seed_from_u64(7);
        let mut hits = 0usize;
        for _ in 0..TRIALS {
            if roulette_weights(&[3.0, 1.0], &mut rng).unwrap() == 0 {
                hits += 1;
            }
        }
        assert_abs_diff_eq!(hits as f64 / TRIALS as f64, 0.75, epsilon = 0.01);
    }

    #[test]
    fn test_degenerate_totals_rejected() {
        let mut rng = SmallRng::seed_from_u64(3);
        for weights in [
            vec![0.0, 0.0],
            vec![-1.0, 0.5],
            vec![],
            vec![f64::INFINITY, 1.0],
            vec![f64::NAN],
        ] {
            let err = roulette_weights(&weights, &mut rng).unwrap_err();
            assert!(matches!(err, PhaseError::Precondition { .. }));
        }
    }
}
