//! Binomial log-likelihoods of a methylome under a mixture of reference
//! methylomes. Two observation models are provided. The perfect-call model
//! treats every modification call as exact. The error-aware model folds the
//! caller's false positive rate `p01` and true positive rate `p11` into the
//! per-site success probability.

use definitions::{ReferenceAtlas, Sample};
use statrs::function::gamma::ln_gamma;

/// Probabilities are clamped into [PROB_FLOOR, 1 - PROB_FLOOR] before
/// taking logs.
pub const PROB_FLOOR: f64 = 1e-10;

/// Natural log of the binomial coefficient C(t, m).
pub fn ln_binom_coef(t: u32, m: u32) -> f64 {
    ln_gamma(t as f64 + 1.0) - ln_gamma(m as f64 + 1.0) - ln_gamma((t - m) as f64 + 1.0)
}

/// Log-pmf of Binomial(t, p) at m, coefficient included.
pub fn binom_logpmf(m: u32, t: u32, p: f64) -> f64 {
    let p = p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
    ln_binom_coef(t, m) + m as f64 * p.ln() + (t - m) as f64 * (1.0 - p).ln()
}

/// Log-likelihood of the sample under `sigma`, assuming perfect calls.
/// The mixed methylation rate at each site is the success probability
/// directly.
pub fn log_likelihood_perfect(atlas: &ReferenceAtlas, sigma: &[f64], sample: &Sample) -> f64 {
    let x = atlas.get_x(sigma);
    x.iter()
        .zip(sample.m().iter().zip(sample.t().iter()))
        .map(|(&xi, (&m, &t))| binom_logpmf(m, t, xi.clamp(0.0, 1.0)))
        .sum()
}

/// Log-likelihood under `sigma` with call errors folded in. A truly
/// modified base is called modified with rate `p11`, an unmodified one
/// with rate `p01`. When `p11` is zero the caller reported only a false
/// positive rate, and the miss rate is taken to equal it.
///
/// The binomial coefficients do not depend on `sigma`; they are
/// subtracted so that likelihoods from this model are comparable across
/// parameter settings of the same sample.
pub fn log_likelihood_with_errors(
    atlas: &ReferenceAtlas,
    sigma: &[f64],
    sample: &Sample,
    p01: f64,
    p11: f64,
) -> f64 {
    let x = atlas.get_x(sigma);
    x.iter()
        .zip(sample.m().iter().zip(sample.t().iter()))
        .map(|(&xi, (&m, &t))| {
            let xi = xi.clamp(0.0, 1.0);
            let p = if p11 > 0.0 {
                xi * p11 + (1.0 - xi) * p01
            } else {
                xi * (1.0 - p01) + (1.0 - xi) * p01
            };
            binom_logpmf(m, t, p) - ln_binom_coef(t, m)
        })
        .sum()
}
