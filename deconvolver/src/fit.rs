//! Drivers for estimating the mixture vector of a sample against a
//! reference atlas. The likelihood-based models run projected gradient
//! descent from several random starting points in parallel and keep the
//! best trial.

use crate::error::DeconvError;
use crate::likelihood;
use crate::misc;
use crate::mmse::{self, EmSolver};
use crate::nnls;
use definitions::{ReferenceAtlas, Sample};
use rand::SeedableRng;
use rand_distr::{Dirichlet, Distribution};
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Deconvolution model. `Llse` is the default in the command line tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// Uniform proportions, no fitting. Baseline for benchmarks.
    Null,
    /// Non-negative least squares on the observed fractions.
    Nnls,
    /// Binomial likelihood assuming perfect modification calls.
    Llsp,
    /// Binomial likelihood with sequencing errors folded in.
    Llse,
    /// Expectation-maximization over per-read assignments.
    Mmse,
}

impl FromStr for Model {
    type Err = DeconvError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Model::Null),
            "nnls" => Ok(Model::Nnls),
            "llsp" => Ok(Model::Llsp),
            "llse" => Ok(Model::Llse),
            "mmse" => Ok(Model::Mmse),
            _ => Err(DeconvError::UnknownModel(s.to_string())),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Model::Null => "null",
            Model::Nnls => "nnls",
            Model::Llsp => "llsp",
            Model::Llse => "llse",
            Model::Mmse => "mmse",
        };
        write!(f, "{}", name)
    }
}

/// Tuning knobs shared by the drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Probability an unmodified base is called modified.
    pub p01: f64,
    /// Probability a modified base is called modified.
    pub p11: f64,
    /// Draw the starting points from a Dirichlet instead of starting
    /// from the uniform vector.
    pub random_inits: bool,
    /// Number of random restarts when `random_inits` is set.
    pub n_trials: usize,
    /// Iteration cap for each gradient descent run.
    pub max_iter: usize,
    pub seed: u64,
    /// Relative log-likelihood change (percent) below which the EM
    /// solver stops.
    pub stop_thresh: f64,
    /// Iteration cap for the EM solver.
    pub solver_max_iter: u32,
    /// Proportions below this are zeroed by the EM solver.
    pub min_proportion: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            p01: 0.05,
            p11: 0.95,
            random_inits: false,
            n_trials: 10,
            max_iter: 100,
            seed: 3490,
            stop_thresh: 0.001,
            solver_max_iter: 300,
            min_proportion: 0.01,
        }
    }
}

/// Estimate the mixture proportions of `sample` over the atlas cell
/// types. The returned vector is non-negative and sums to one.
pub fn fit(
    atlas: &ReferenceAtlas,
    sample: &Sample,
    model: Model,
    config: &FitConfig,
) -> Result<Vec<f64>, DeconvError> {
    let k = atlas.get_num_cell_types();
    debug!("FIT\t{}\t{}\t{}sites", sample.name(), model, sample.len());
    let mut sigma = match model {
        Model::Null => vec![1.0 / k as f64; k],
        Model::Nnls => nnls::fit_nnls(atlas, sample)?,
        Model::Llsp | Model::Llse => fit_likelihood(atlas, sample, model, config)?,
        Model::Mmse => {
            let init = vec![1.0 / k as f64; k];
            let mut solver = EmSolver::new(atlas, sample, &init, config.p01, config.p11);
            mmse::run_solver(
                &mut solver,
                config.stop_thresh,
                config.solver_max_iter,
                config.min_proportion,
            )
            .map_err(|e| DeconvError::ExternalSolver {
                sample: sample.name().to_string(),
                reason: e.to_string(),
            })?
        }
    };
    misc::renormalize(&mut sigma);
    Ok(sigma)
}

struct BinomialObjective<'a> {
    atlas: &'a ReferenceAtlas,
    sample: &'a Sample,
    model: Model,
    p0: f64,
    p1: f64,
}

impl<'a> BinomialObjective<'a> {
    fn new(atlas: &'a ReferenceAtlas, sample: &'a Sample, model: Model, config: &FitConfig) -> Self {
        // Per-site success probability is p = x * p1 + (1 - x) * p0.
        let (p0, p1) = match model {
            Model::Llsp => (0.0, 1.0),
            _ => {
                if config.p11 > 0.0 {
                    (config.p01, config.p11)
                } else {
                    (config.p01, 1.0 - config.p01)
                }
            }
        };
        Self {
            atlas,
            sample,
            model,
            p0,
            p1,
        }
    }

    fn cost(&self, sigma: &[f64]) -> f64 {
        match self.model {
            Model::Llsp => -likelihood::log_likelihood_perfect(self.atlas, sigma, self.sample),
            _ => -likelihood::log_likelihood_with_errors(
                self.atlas,
                sigma,
                self.sample,
                self.p0,
                self.p1,
            ),
        }
    }

    fn gradient(&self, sigma: &[f64]) -> Vec<f64> {
        let k = self.atlas.get_num_cell_types();
        let x = self.atlas.get_x(sigma);
        let mut grad = vec![0.0; k];
        let floor = likelihood::PROB_FLOOR;
        for (i, &xi) in x.iter().enumerate() {
            let xi = xi.clamp(0.0, 1.0);
            let p = (xi * self.p1 + (1.0 - xi) * self.p0).clamp(floor, 1.0 - floor);
            let m = self.sample.m()[i] as f64;
            let t = self.sample.t()[i] as f64;
            // d(logpmf)/dp times dp/dsigma_k; negated for the cost.
            let dldp = m / p - (t - m) / (1.0 - p);
            let scale = (self.p1 - self.p0) * dldp;
            for (g, &a) in grad.iter_mut().zip(self.atlas.row(i)) {
                *g -= scale * a;
            }
        }
        grad
    }
}

struct Trial {
    sigma: Vec<f64>,
    objective: f64,
}

fn run_descent(obj: &BinomialObjective, init: Vec<f64>, max_iter: usize) -> Option<Trial> {
    let mut sigma = misc::project_to_simplex(&init);
    let mut cost = obj.cost(&sigma);
    let mut step = 1.0;
    for _ in 0..max_iter {
        let grad = obj.gradient(&sigma);
        let mut moved = false;
        while step > 1e-12 {
            let trial: Vec<f64> = sigma
                .iter()
                .zip(grad.iter())
                .map(|(s, g)| s - step * g)
                .collect();
            let cand = misc::project_to_simplex(&trial);
            let c = obj.cost(&cand);
            if c.is_finite() && c < cost {
                sigma = cand;
                cost = c;
                step *= 2.0;
                moved = true;
                break;
            }
            step *= 0.5;
        }
        if !moved {
            break;
        }
    }
    cost.is_finite().then_some(Trial {
        sigma,
        objective: cost,
    })
}

fn initial_points(k: usize, config: &FitConfig) -> Vec<Vec<f64>> {
    if !config.random_inits || k < 2 {
        return vec![vec![1.0 / k as f64; k]];
    }
    let dirichlet = Dirichlet::new_with_size(1.0 / k as f64, k).unwrap();
    (0..config.n_trials)
        .map(|trial| {
            let mut rng =
                Xoshiro256StarStar::seed_from_u64(config.seed.wrapping_add(trial as u64));
            dirichlet.sample(&mut rng)
        })
        .collect()
}

fn fit_likelihood(
    atlas: &ReferenceAtlas,
    sample: &Sample,
    model: Model,
    config: &FitConfig,
) -> Result<Vec<f64>, DeconvError> {
    let obj = BinomialObjective::new(atlas, sample, model, config);
    let inits = initial_points(atlas.get_num_cell_types(), config);
    let best = inits
        .into_par_iter()
        .filter_map(|init| run_descent(&obj, init, config.max_iter))
        .min_by(|a, b| a.objective.partial_cmp(&b.objective).unwrap());
    match best {
        Some(trial) => {
            debug!(
                "FIT\t{}\t{}\tnll={:.4}",
                sample.name(),
                model,
                trial.objective
            );
            Ok(trial.sigma)
        }
        None => Err(DeconvError::OptimizationFailed {
            sample: sample.name().to_string(),
            model: model.to_string(),
        }),
    }
}
