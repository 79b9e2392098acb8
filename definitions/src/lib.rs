//! Definitions -- the typed data model for methylome deconvolution.
//! A [ReferenceAtlas] holds per-CpG, per-cell-type methylation rates and a
//! [Sample] holds the observed call counts at the same sites, in the same
//! row order. Both are validated at construction and read-only afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A genomic interval at which methylation is measured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CpgCoord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl CpgCoord {
    pub fn new(chrom: &str, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.to_string(),
            start,
            end,
        }
    }
}

impl std::fmt::Display for CpgCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AtlasError {
    #[error("atlas has no cell-type columns")]
    NoCellTypes,
    #[error("atlas row {row} has {got} rates, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("atlas rate at row {row}, column {column} is {value}, outside [0,1]")]
    RateOutOfRange {
        row: usize,
        column: usize,
        value: f64,
    },
    #[error("atlas has {coords} coordinates for {rows} rate rows")]
    CoordMismatch { coords: usize, rows: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("sample {name}: {m_len} modified-call entries for {t_len} total-call entries")]
    LengthMismatch {
        name: String,
        m_len: usize,
        t_len: usize,
    },
    #[error("sample {name}: site {site} has zero total calls")]
    ZeroCoverage { name: String, site: usize },
    #[error("sample {name}: site {site} has {m} modified calls out of {t} total")]
    CountOverflow {
        name: String,
        site: usize,
        m: u32,
        t: u32,
    },
}

/// Reference methylation rates, one row per CpG interval and one column per
/// cell type. Row order is significant: any [Sample] fitted against this
/// atlas must carry its counts in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceAtlas {
    cell_types: Vec<String>,
    cpg_ids: Vec<CpgCoord>,
    a: Vec<Vec<f64>>,
}

impl ReferenceAtlas {
    /// Build an atlas from column names, row coordinates and an N x K rate
    /// matrix. Every rate must be a finite number in [0,1] and every row
    /// must have exactly one rate per cell type.
    pub fn new(
        cell_types: Vec<String>,
        cpg_ids: Vec<CpgCoord>,
        a: Vec<Vec<f64>>,
    ) -> Result<Self, AtlasError> {
        if cell_types.is_empty() {
            return Err(AtlasError::NoCellTypes);
        }
        if cpg_ids.len() != a.len() {
            return Err(AtlasError::CoordMismatch {
                coords: cpg_ids.len(),
                rows: a.len(),
            });
        }
        let k = cell_types.len();
        for (row, rates) in a.iter().enumerate() {
            if rates.len() != k {
                return Err(AtlasError::RaggedRow {
                    row,
                    expected: k,
                    got: rates.len(),
                });
            }
            for (column, &value) in rates.iter().enumerate() {
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(AtlasError::RateOutOfRange { row, column, value });
                }
            }
        }
        Ok(Self {
            cell_types,
            cpg_ids,
            a,
        })
    }

    /// Expected methylation fraction at each site under mixture `sigma`,
    /// i.e. the matrix-vector product `A * sigma`. The caller is responsible
    /// for clipping if `sigma` is not exactly on the simplex.
    pub fn get_x(&self, sigma: &[f64]) -> Vec<f64> {
        assert_eq!(sigma.len(), self.cell_types.len());
        self.a
            .iter()
            .map(|row| row.iter().zip(sigma.iter()).map(|(a, s)| a * s).sum())
            .collect()
    }

    pub fn get_num_cpgs(&self) -> usize {
        self.cpg_ids.len()
    }

    pub fn get_cell_types(&self) -> &[String] {
        &self.cell_types
    }

    pub fn get_num_cell_types(&self) -> usize {
        self.cell_types.len()
    }

    pub fn cpg_ids(&self) -> &[CpgCoord] {
        &self.cpg_ids
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.a[i]
    }

    pub fn rate(&self, i: usize, k: usize) -> f64 {
        self.a[i][k]
    }
}

/// One methylome's observed counts at the sites joined against an atlas.
/// `x_hat[i] = m[i] / t[i]` is the naive empirical methylation fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    name: String,
    m: Vec<u32>,
    t: Vec<u32>,
    x_hat: Vec<f64>,
}

impl Sample {
    /// Build a sample from aligned modified/total call counts. Every site
    /// must have at least one total call (callers filter zero-coverage rows
    /// before construction) and `m[i] <= t[i]`.
    pub fn new(name: &str, m: Vec<u32>, t: Vec<u32>) -> Result<Self, SampleError> {
        if m.len() != t.len() {
            return Err(SampleError::LengthMismatch {
                name: name.to_string(),
                m_len: m.len(),
                t_len: t.len(),
            });
        }
        let mut x_hat = Vec::with_capacity(m.len());
        for (site, (&mi, &ti)) in m.iter().zip(t.iter()).enumerate() {
            if ti == 0 {
                return Err(SampleError::ZeroCoverage {
                    name: name.to_string(),
                    site,
                });
            }
            if mi > ti {
                return Err(SampleError::CountOverflow {
                    name: name.to_string(),
                    site,
                    m: mi,
                    t: ti,
                });
            }
            x_hat.push(f64::from(mi) / f64::from(ti));
        }
        Ok(Self {
            name: name.to_string(),
            m,
            t,
            x_hat,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn m(&self) -> &[u32] {
        &self.m
    }

    pub fn t(&self) -> &[u32] {
        &self.t
    }

    pub fn x_hat(&self) -> &[f64] {
        &self.x_hat
    }

    /// Number of sites, equal to the paired atlas's number of CpGs.
    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_atlas() -> ReferenceAtlas {
        let cell_types = vec!["adipocytes".to_string(), "monocytes".to_string()];
        let coords = vec![
            CpgCoord::new("chr1", 10, 200),
            CpgCoord::new("chr1", 205, 500),
            CpgCoord::new("chr2", 5, 510),
        ];
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        ReferenceAtlas::new(cell_types, coords, a).unwrap()
    }

    #[test]
    fn atlas_accessors() {
        let atlas = small_atlas();
        assert_eq!(atlas.get_num_cpgs(), 3);
        assert_eq!(atlas.get_num_cell_types(), 2);
        assert_eq!(atlas.get_cell_types()[1], "monocytes");
        assert_eq!(atlas.rate(2, 0), 0.5);
    }

    #[test]
    fn atlas_get_x_is_matrix_product() {
        let atlas = small_atlas();
        let x = atlas.get_x(&[0.9, 0.1]);
        assert!((x[0] - 0.9).abs() < 1e-12);
        assert!((x[1] - 0.1).abs() < 1e-12);
        assert!((x[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn atlas_rejects_zero_cell_types() {
        let err = ReferenceAtlas::new(vec![], vec![], vec![]).unwrap_err();
        assert_eq!(err, AtlasError::NoCellTypes);
    }

    #[test]
    fn atlas_rejects_ragged_rows() {
        let err = ReferenceAtlas::new(
            vec!["a".to_string(), "b".to_string()],
            vec![CpgCoord::new("chr1", 0, 1)],
            vec![vec![0.5]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            AtlasError::RaggedRow {
                row: 0,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn atlas_rejects_out_of_range_rates() {
        let err = ReferenceAtlas::new(
            vec!["a".to_string()],
            vec![CpgCoord::new("chr1", 0, 1)],
            vec![vec![1.5]],
        )
        .unwrap_err();
        assert!(matches!(err, AtlasError::RateOutOfRange { .. }));
    }

    #[test]
    fn sample_computes_x_hat() {
        let s = Sample::new("s1", vec![9, 1, 5], vec![10, 10, 10]).unwrap();
        assert_eq!(s.len(), 3);
        assert!((s.x_hat()[0] - 0.9).abs() < 1e-12);
        assert!((s.x_hat()[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn sample_rejects_zero_coverage() {
        let err = Sample::new("s1", vec![1, 0], vec![10, 0]).unwrap_err();
        assert_eq!(
            err,
            SampleError::ZeroCoverage {
                name: "s1".to_string(),
                site: 1
            }
        );
    }

    #[test]
    fn sample_rejects_count_overflow() {
        let err = Sample::new("s1", vec![11], vec![10]).unwrap_err();
        assert!(matches!(err, SampleError::CountOverflow { site: 0, .. }));
    }

    #[test]
    fn sample_rejects_length_mismatch() {
        let err = Sample::new("s1", vec![1], vec![10, 10]).unwrap_err();
        assert!(matches!(err, SampleError::LengthMismatch { .. }));
    }
}
