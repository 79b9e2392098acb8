//! Simulation of a mixed methylome from an atlas and a known mixture.
//! Each simulated read picks a cell type by the mixture weights, a site
//! from the atlas, and draws modification calls binomially from that
//! cell type's rate, then corrupts them with the caller error rates.

use crate::error::DeconvError;
use crate::io::AtlasTable;
use rand::distributions::WeightedIndex;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution, Poisson};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateConfig {
    /// Mean number of reads per atlas site.
    pub coverage: f64,
    /// Number of modification calls per read.
    pub region_size: u64,
    pub p01: f64,
    pub p11: f64,
    pub seed: u64,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            coverage: 30.0,
            region_size: 10,
            p01: 0.0,
            p11: 1.0,
            seed: 3490,
        }
    }
}

/// Write a simulated methylome as a tab-separated table.
pub fn generate_methylome<W: Write>(
    atlas: &AtlasTable,
    sigma: &[f64],
    config: &SimulateConfig,
    mut wtr: W,
) -> Result<(), DeconvError> {
    if sigma.len() != atlas.cell_types.len() {
        return Err(DeconvError::Simulation(format!(
            "mixture has {} entries but the atlas has {} cell types",
            sigma.len(),
            atlas.cell_types.len()
        )));
    }
    let weights = WeightedIndex::new(sigma)
        .map_err(|e| DeconvError::Simulation(format!("invalid mixture weights: {}", e)))?;
    let depth = Poisson::new(config.coverage)
        .map_err(|e| DeconvError::Simulation(format!("invalid coverage: {}", e)))?;
    let mut rng = Xoshiro256StarStar::seed_from_u64(config.seed);
    writeln!(
        wtr,
        "read_name\tchromosome\tstart\tend\ttotal_calls\tmodified_calls\tcell_type"
    )?;
    for (coord, rates) in atlas.coords.iter().zip(atlas.rates.iter()) {
        let n_reads = depth.sample(&mut rng) as u64;
        for read in 0..n_reads {
            let cell = weights.sample(&mut rng);
            let rate = rates[cell].clamp(0.0, 1.0);
            let t = config.region_size;
            let m = Binomial::new(t, rate)
                .map_err(|e| DeconvError::Simulation(e.to_string()))?
                .sample(&mut rng);
            // False positives among the unmodified calls, misses among
            // the modified ones.
            let e01 = Binomial::new(t - m, config.p01)
                .map_err(|e| DeconvError::Simulation(e.to_string()))?
                .sample(&mut rng);
            let e10 = Binomial::new(m, 1.0 - config.p11)
                .map_err(|e| DeconvError::Simulation(e.to_string()))?
                .sample(&mut rng);
            let called = m + e01 - e10;
            writeln!(
                wtr,
                "{}_{}_{}_{}\t{}\t{}\t{}\t{}\t{}\t{}",
                coord.chrom,
                coord.start,
                coord.end,
                read,
                coord.chrom,
                coord.start,
                coord.end,
                t,
                called,
                atlas.cell_types[cell]
            )?;
        }
    }
    Ok(())
}
