//! Expectation-maximization deconvolution. Each covered site is treated
//! as drawn from one cell type; the E-step computes log responsibilities
//! and the M-step averages them into new proportions. The solver sits
//! behind a trait so an alternative implementation can be swapped in by
//! the caller.

use crate::likelihood::PROB_FLOOR;
use crate::misc::logsumexp;
use definitions::{ReferenceAtlas, Sample};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("log-likelihood became non-finite at row {row}")]
    NonFinite { row: usize },
    #[error("truth vector has wrong length (expected {expected}, got {got})")]
    TruthLength { expected: usize, got: usize },
}

/// Interface the deconvolution drivers require from a mixture solver.
pub trait MixtureSolver {
    /// Run the solver to convergence, updating its internal proportions.
    fn optimize(
        &mut self,
        stop_thresh: f64,
        max_iter: u32,
        min_proportion: f64,
    ) -> Result<(), SolverError>;

    /// Optimize and score against a known mixture, logging the loss and
    /// per-site assignment accuracy. Used on simulated data.
    fn evaluate(
        &mut self,
        stop_thresh: f64,
        max_iter: u32,
        min_proportion: f64,
        true_sigma: &[f64],
        true_assignments: &[usize],
    ) -> Result<(), SolverError>;

    /// Current proportion estimate, in linear space.
    fn cell_type_proportions(&self) -> Vec<f64>;
}

/// Optimize `solver` and return its proportions.
pub fn run_solver(
    solver: &mut dyn MixtureSolver,
    stop_thresh: f64,
    max_iter: u32,
    min_proportion: f64,
) -> Result<Vec<f64>, SolverError> {
    solver.optimize(stop_thresh, max_iter, min_proportion)?;
    Ok(solver.cell_type_proportions())
}

/// EM solver over the per-site binomial emission model.
pub struct EmSolver<'a> {
    atlas: &'a ReferenceAtlas,
    sample: &'a Sample,
    log_sigma: Vec<f64>,
    k: usize,
    n: usize,
    p01: f64,
    p11: f64,
}

impl<'a> EmSolver<'a> {
    pub fn new(
        atlas: &'a ReferenceAtlas,
        sample: &'a Sample,
        init_sigma: &[f64],
        p01: f64,
        p11: f64,
    ) -> Self {
        let k = atlas.get_num_cell_types();
        assert_eq!(init_sigma.len(), k);
        Self {
            atlas,
            sample,
            log_sigma: init_sigma.iter().map(|s| s.max(PROB_FLOOR).ln()).collect(),
            k,
            n: sample.len(),
            p01,
            p11,
        }
    }

    /// Unnormalized log responsibility of cell type `cell` for site `row`.
    fn gamma_tilde(&self, row: usize, cell: usize) -> f64 {
        let a = self.atlas.rate(row, cell);
        let p = (a * self.p11 + (1.0 - a) * self.p01).clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
        let m = self.sample.m()[row] as f64;
        let t = self.sample.t()[row] as f64;
        self.log_sigma[cell] + m * p.ln() + (t - m) * (1.0 - p).ln()
    }

    /// Fill `gamma` with normalized log responsibilities and return the
    /// log-likelihood of the data under the current proportions.
    fn e_step(&self, gamma: &mut [Vec<f64>]) -> Result<f64, SolverError> {
        let mut ll = 0.0;
        for (row, g) in gamma.iter_mut().enumerate() {
            for cell in 0..self.k {
                g[cell] = self.gamma_tilde(row, cell);
            }
            let norm = logsumexp(g);
            if !norm.is_finite() {
                return Err(SolverError::NonFinite { row });
            }
            for v in g.iter_mut() {
                *v -= norm;
            }
            ll += norm;
        }
        Ok(ll)
    }

    fn m_step(&mut self, gamma: &[Vec<f64>]) {
        let n = self.n as f64;
        for cell in 0..self.k {
            let total: f64 = gamma.iter().map(|g| g[cell].exp()).sum();
            self.log_sigma[cell] = (total / n).max(PROB_FLOOR).ln();
        }
    }

    /// Zero out proportions below `min_proportion` and rescale. Falls
    /// back to the uniform vector when everything is trimmed away.
    fn noise_trim(&mut self, min_proportion: f64) {
        let mut sigma = self.cell_type_proportions();
        for s in sigma.iter_mut() {
            if *s < min_proportion {
                *s = 0.0;
            }
        }
        let sum: f64 = sigma.iter().sum();
        if sum > 0.0 {
            for s in sigma.iter_mut() {
                *s /= sum;
            }
        } else {
            warn!(
                "EM\tall proportions below {}, falling back to uniform",
                min_proportion
            );
            sigma.iter_mut().for_each(|s| *s = 1.0 / self.k as f64);
        }
        self.log_sigma = sigma.iter().map(|s| s.max(PROB_FLOOR).ln()).collect();
    }

    fn deconvolution_loss(&self, true_sigma: &[f64]) -> f64 {
        self.cell_type_proportions()
            .iter()
            .zip(true_sigma.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl<'a> MixtureSolver for EmSolver<'a> {
    fn optimize(
        &mut self,
        stop_thresh: f64,
        max_iter: u32,
        min_proportion: f64,
    ) -> Result<(), SolverError> {
        let mut gamma = vec![vec![0.0; self.k]; self.n];
        let mut ll_prev = self.e_step(&mut gamma)?;
        for iter in 0..max_iter {
            self.m_step(&gamma);
            let ll = self.e_step(&mut gamma)?;
            let change = (100.0 * ((ll - ll_prev) / ll_prev.abs())).abs();
            debug!("EM\t{}\t{:.4}\t{:.6}%", iter, ll, change);
            if change < stop_thresh && iter > 10 {
                break;
            }
            ll_prev = ll;
        }
        self.noise_trim(min_proportion);
        Ok(())
    }

    fn evaluate(
        &mut self,
        stop_thresh: f64,
        max_iter: u32,
        min_proportion: f64,
        true_sigma: &[f64],
        true_assignments: &[usize],
    ) -> Result<(), SolverError> {
        if true_sigma.len() != self.k {
            return Err(SolverError::TruthLength {
                expected: self.k,
                got: true_sigma.len(),
            });
        }
        if true_assignments.len() != self.n {
            return Err(SolverError::TruthLength {
                expected: self.n,
                got: true_assignments.len(),
            });
        }
        self.optimize(stop_thresh, max_iter, min_proportion)?;
        let mut gamma = vec![vec![0.0; self.k]; self.n];
        self.e_step(&mut gamma)?;
        let correct = gamma
            .iter()
            .zip(true_assignments.iter())
            .filter(|(g, &truth)| {
                let argmax = g
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                argmax == truth
            })
            .count();
        info!(
            "EM\tloss={:.4}\taccuracy={:.4}",
            self.deconvolution_loss(true_sigma),
            correct as f64 / self.n as f64
        );
        Ok(())
    }

    fn cell_type_proportions(&self) -> Vec<f64> {
        self.log_sigma.iter().map(|l| l.exp()).collect()
    }
}
