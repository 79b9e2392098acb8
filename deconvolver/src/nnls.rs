//! Non-negative least squares fit of the observed methylation fractions
//! against the atlas columns. The atlas is augmented with a row of ones
//! matched to a target of one, pulling the solution toward the simplex,
//! and the result is renormalized.

use crate::error::DeconvError;
use crate::misc;
use definitions::{ReferenceAtlas, Sample};
use nalgebra::{DMatrix, DVector};

const TOL: f64 = 1e-10;

fn solve_passive(a: &DMatrix<f64>, b: &DVector<f64>, passive: &[bool]) -> DVector<f64> {
    let cols: Vec<usize> = passive
        .iter()
        .enumerate()
        .filter_map(|(j, &p)| p.then_some(j))
        .collect();
    let mut z = DVector::zeros(a.ncols());
    if cols.is_empty() {
        return z;
    }
    let sub = a.select_columns(cols.iter());
    let svd = sub.svd(true, true);
    if let Ok(sol) = svd.solve(b, 1e-12) {
        for (idx, &j) in cols.iter().enumerate() {
            z[j] = sol[idx];
        }
    }
    z
}

/// Lawson-Hanson active set method. Returns the non-negative `x`
/// minimizing `||a x - b||`.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = a.ncols();
    let mut x = DVector::zeros(n);
    let mut passive = vec![false; n];
    let max_outer = 3 * n.max(1);
    for _ in 0..max_outer {
        let resid = b - a * &x;
        let w = a.transpose() * resid;
        // Most violated KKT condition among the zeroed coordinates.
        let candidate = (0..n)
            .filter(|&j| !passive[j] && w[j] > TOL)
            .max_by(|&i, &j| w[i].partial_cmp(&w[j]).unwrap());
        let Some(j) = candidate else {
            break;
        };
        passive[j] = true;
        loop {
            let z = solve_passive(a, b, &passive);
            let feasible = passive
                .iter()
                .enumerate()
                .all(|(k, &p)| !p || z[k] > TOL);
            if feasible {
                x = z;
                break;
            }
            // Step from x toward z until the first passive coordinate
            // hits zero, then release it.
            let mut alpha = f64::INFINITY;
            for k in 0..n {
                if passive[k] && z[k] <= TOL {
                    let step = x[k] / (x[k] - z[k]);
                    if step < alpha {
                        alpha = step;
                    }
                }
            }
            if !alpha.is_finite() {
                x = z;
                break;
            }
            for k in 0..n {
                x[k] += alpha * (z[k] - x[k]);
            }
            for k in 0..n {
                if passive[k] && x[k] <= TOL {
                    passive[k] = false;
                    x[k] = 0.0;
                }
            }
        }
    }
    x
}

/// Deconvolve by least squares on the observed fractions, constrained to
/// non-negative weights and nudged toward unit sum.
pub fn fit_nnls(atlas: &ReferenceAtlas, sample: &Sample) -> Result<Vec<f64>, DeconvError> {
    let n = atlas.get_num_cpgs();
    let k = atlas.get_num_cell_types();
    let a = DMatrix::from_fn(n + 1, k, |i, j| if i < n { atlas.rate(i, j) } else { 1.0 });
    let b = DVector::from_fn(n + 1, |i, _| if i < n { sample.x_hat()[i] } else { 1.0 });
    let sol = nnls(&a, &b);
    let mut sigma: Vec<f64> = sol.iter().copied().collect();
    if sigma.iter().sum::<f64>() <= 0.0 {
        return Err(DeconvError::OptimizationFailed {
            sample: sample.name().to_string(),
            model: "nnls".to_string(),
        });
    }
    misc::renormalize(&mut sigma);
    Ok(sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use definitions::CpgCoord;

    fn coords(n: usize) -> Vec<CpgCoord> {
        (0..n)
            .map(|i| CpgCoord::new("chr1", i as u64 * 100, i as u64 * 100 + 2))
            .collect()
    }

    fn scenario() -> ReferenceAtlas {
        ReferenceAtlas::new(
            vec!["tumor".to_string(), "normal".to_string()],
            coords(3),
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
        )
        .unwrap()
    }

    #[test]
    fn recovers_single_component() {
        let atlas = scenario();
        let sample = Sample::new("pure", vec![100, 0, 50], vec![100, 100, 100]).unwrap();
        let sigma = fit_nnls(&atlas, &sample).unwrap();
        assert!(sigma[0] > 0.95, "{:?}", sigma);
        assert!((sigma.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recovers_known_mixture() {
        let atlas = scenario();
        // x_hat = [0.9, 0.1, 0.5] under sigma = [0.9, 0.1]
        let sample = Sample::new("mix", vec![90, 10, 50], vec![100, 100, 100]).unwrap();
        let sigma = fit_nnls(&atlas, &sample).unwrap();
        assert!((sigma[0] - 0.9).abs() < 0.02, "{:?}", sigma);
        assert!((sigma[1] - 0.1).abs() < 0.02, "{:?}", sigma);
    }

    #[test]
    fn coverage_rescale_leaves_fractions_unchanged() {
        let atlas = scenario();
        let s1 = Sample::new("a", vec![90, 10, 50], vec![100, 100, 100]).unwrap();
        let s2 = Sample::new("b", vec![270, 30, 150], vec![300, 300, 300]).unwrap();
        let g1 = fit_nnls(&atlas, &s1).unwrap();
        let g2 = fit_nnls(&atlas, &s2).unwrap();
        for (a, b) in g1.iter().zip(g2.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn nnls_clamps_negative_solution() {
        // Unconstrained least squares would give a negative weight here.
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_row_slice(&[1.0, -0.5]);
        let x = nnls(&a, &b);
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert_eq!(x[1], 0.0);
    }
}
