//! Numeric helpers shared by the fitting procedures.

/// Log of the sum of exponentials, stable for large negative inputs.
pub fn logsumexp(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max = xs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

/// Euclidean projection of `v` onto the probability simplex
/// (non-negative entries summing to one).
pub fn project_to_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (i, &u) in sorted.iter().enumerate() {
        cumsum += u;
        let t = (cumsum - 1.0) / (i + 1) as f64;
        if u - t > 0.0 {
            theta = t;
        }
    }
    v.iter().map(|&x| (x - theta).max(0.0)).collect()
}

/// Clip negatives to zero and rescale so the entries sum to exactly one.
/// The minimizers only satisfy the simplex constraint approximately, so
/// every driver applies this before returning.
pub fn renormalize(sigma: &mut [f64]) {
    for s in sigma.iter_mut() {
        if *s < 0.0 {
            *s = 0.0;
        }
    }
    let sum: f64 = sigma.iter().sum();
    if sum > 0.0 {
        for s in sigma.iter_mut() {
            *s /= sum;
        }
    } else {
        let uniform = 1.0 / sigma.len() as f64;
        sigma.iter_mut().for_each(|s| *s = uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logsumexp_matches_naive() {
        let xs: [f64; 3] = [-1.0, -2.0, -3.0];
        let naive: f64 = xs.iter().map(|x| x.exp()).sum::<f64>().ln();
        assert!((logsumexp(&xs) - naive).abs() < 1e-12);
    }

    #[test]
    fn logsumexp_handles_large_negatives() {
        let xs = [-1000.0, -1001.0];
        let got = logsumexp(&xs);
        assert!((got - (-1000.0 + (1.0 + (-1.0f64).exp()).ln())).abs() < 1e-9);
    }

    #[test]
    fn logsumexp_all_neg_inf() {
        assert_eq!(logsumexp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn projection_lands_on_simplex() {
        for v in [
            vec![0.5, 0.5, 0.5],
            vec![-1.0, 2.0, 0.3],
            vec![10.0, -10.0],
            vec![0.2, 0.3, 0.5],
        ] {
            let p = project_to_simplex(&v);
            assert!(p.iter().all(|&x| x >= 0.0));
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9, "{:?}", p);
        }
    }

    #[test]
    fn projection_is_identity_on_simplex_points() {
        let v = vec![0.2, 0.3, 0.5];
        let p = project_to_simplex(&v);
        for (a, b) in v.iter().zip(p.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn renormalize_clips_and_rescales() {
        let mut sigma = vec![-0.01, 0.5, 0.51];
        renormalize(&mut sigma);
        assert_eq!(sigma[0], 0.0);
        assert!((sigma.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn renormalize_falls_back_to_uniform() {
        let mut sigma = vec![0.0, 0.0];
        renormalize(&mut sigma);
        assert_eq!(sigma, vec![0.5, 0.5]);
    }
}
