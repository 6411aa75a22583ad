//! Upper-confidence-bound candidate selection.
//!
//! Selection never filters already-tested indices; detecting a repeat is
//! the adaptation loop's job. Ties go to the lowest index.

/// First index of the maximum value, or `None` for an empty slice.
///
/// NaN entries never win.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Bootstrap rule: the entry with the best simulated fitness.
pub fn bootstrap(simulated_fitness: &[f64]) -> Option<usize> {
    argmax(simulated_fitness)
}

/// UCB rule: `corrected_i + kappa * uncertainty_i`.
///
/// With no uncertainty estimate the score is the corrected fitness alone.
pub fn select_ucb(corrected: &[f64], uncertainty: Option<&[f64]>, kappa: f64) -> Option<usize> {
    match uncertainty {
        None => argmax(corrected),
        Some(uncertainty) => {
            debug_assert_eq!(corrected.len(), uncertainty.len());
            let scores: Vec<f64> = corrected
                .iter()
                .zip(uncertainty)
                .map(|(mu, sigma)| mu + kappa * sigma)
                .collect();
            argmax(&scores)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_of_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 2.0, 3.0]), Some(1));
        assert_eq!(argmax(&[-2.0, -2.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f64::NAN, 1.0, f64::NAN]), Some(1));
        assert_eq!(argmax(&[f64::NAN]), None);
    }

    #[test]
    fn bootstrap_is_plain_argmax() {
        assert_eq!(bootstrap(&[1.0, 5.0, 3.0, 4.0, 2.0]), Some(1));
    }

    #[test]
    fn uncertainty_bonus_can_flip_the_choice() {
        let corrected = [1.0, 0.9];
        let uncertainty = [0.0, 1.0];
        assert_eq!(select_ucb(&corrected, Some(&uncertainty), 0.05), Some(1));
        assert_eq!(select_ucb(&corrected, Some(&uncertainty), 0.0), Some(0));
        assert_eq!(select_ucb(&corrected, None, 10.0), Some(0));
    }

    #[test]
    fn selection_is_deterministic() {
        let corrected: Vec<f64> = (0..64).map(|i| ((i * 37) % 11) as f64).collect();
        let uncertainty: Vec<f64> = (0..64).map(|i| ((i * 13) % 7) as f64 * 0.1).collect();
        let first = select_ucb(&corrected, Some(&uncertainty), 0.05);
        for _ in 0..10 {
            assert_eq!(select_ucb(&corrected, Some(&uncertainty), 0.05), first);
        }
    }
}
