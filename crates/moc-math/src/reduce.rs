//! Cascade (pairwise) summation.
//!
//! All large floating-point reductions in the solver — fission sources,
//! reaction rates, residuals, leakage — go through `pairwise_sum` so the
//! accumulated rounding error grows as O(log n) rather than O(n).

/// Below this length a straight serial sum is cheaper than recursion.
const PAIRWISE_BASE: usize = 32;

/// Sum of a slice with pairwise error growth.
pub fn pairwise_sum(values: &[f64]) -> f64 {
    if values.len() <= PAIRWISE_BASE {
        return values.iter().sum();
    }
    let mid = values.len() / 2;
    pairwise_sum(&values[..mid]) + pairwise_sum(&values[mid..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_singleton() {
        assert_eq!(pairwise_sum(&[]), 0.0);
        assert_eq!(pairwise_sum(&[3.25]), 3.25);
    }

    #[test]
    fn test_matches_exact_integer_sum() {
        let values: Vec<f64> = (1..=1000).map(|i| i as f64).collect();
        assert_eq!(pairwise_sum(&values), 500500.0);
    }

    #[test]
    fn test_large_alternating_sum() {
        // Pairs cancel exactly; a correct reduction returns 0.
        let values: Vec<f64> = (0..4096)
            .map(|i| if i % 2 == 0 { 1.0e8 } else { -1.0e8 })
            .collect();
        assert_eq!(pairwise_sum(&values), 0.0);
    }

    #[test]
    fn test_accuracy_against_kahan() {
        let values: Vec<f64> = (0..100_000)
            .map(|i| ((i as f64) * 0.731).sin() * 1.0e-3 + 1.0)
            .collect();

        // Kahan compensated sum as the accuracy reference.
        let mut sum = 0.0_f64;
        let mut c = 0.0_f64;
        for &v in &values {
            let y = v - c;
            let t = sum + y;
            c = (t - sum) - y;
            sum = t;
        }

        let pairwise = pairwise_sum(&values);
        assert!(
            (pairwise - sum).abs() / sum.abs() < 1e-13,
            "pairwise {pairwise} deviates from compensated {sum}"
        );
    }
}
