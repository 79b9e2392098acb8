//! Tab-separated input parsing. The atlas table carries one column per
//! cell type plus genomic coordinates; methylome tables carry per-site
//! call counts. Joining the two on exact coordinates yields the matched
//! `ReferenceAtlas` and `Sample` the drivers consume.

use crate::error::DeconvError;
use definitions::{CpgCoord, ReferenceAtlas, Sample};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Column names that are neither coordinates nor cell types.
const RESERVED_COLUMNS: &[&str] = &["label", "type", "read_name", "cell_type"];

/// Raw atlas rows, before joining against a methylome.
#[derive(Debug, Clone)]
pub struct AtlasTable {
    pub cell_types: Vec<String>,
    pub coords: Vec<CpgCoord>,
    pub rates: Vec<Vec<f64>>,
}

/// One parsed methylome record.
#[derive(Debug, Clone)]
pub struct MethylRow {
    pub coord: CpgCoord,
    pub total_calls: u32,
    pub modified_calls: u32,
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, DeconvError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?)
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.to_lowercase().as_str()))
}

fn require_column(
    headers: &[String],
    names: &[&str],
    file: &Path,
) -> Result<usize, DeconvError> {
    find_column(headers, names).ok_or_else(|| DeconvError::MissingColumn {
        file: file.display().to_string(),
        column: names[0].to_string(),
    })
}

/// Parse a reference atlas table. Cell type columns are every column
/// that is not a coordinate or a reserved annotation. Rows that fail to
/// parse are dropped; exact duplicate rows are kept once.
pub fn load_atlas(path: &Path) -> Result<AtlasTable, DeconvError> {
    let mut rdr = open_reader(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let chrom_idx = require_column(&headers, &["chromosome", "chr"], path)?;
    let start_idx = require_column(&headers, &["start"], path)?;
    let end_idx = require_column(&headers, &["end"], path)?;
    let skip: HashSet<usize> = [chrom_idx, start_idx, end_idx]
        .into_iter()
        .chain(
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| RESERVED_COLUMNS.contains(&h.to_lowercase().as_str()))
                .map(|(i, _)| i),
        )
        .collect();
    let cell_columns: Vec<usize> = (0..headers.len()).filter(|i| !skip.contains(i)).collect();
    let cell_types: Vec<String> = cell_columns.iter().map(|&i| headers[i].clone()).collect();
    if cell_types.is_empty() {
        return Err(definitions::AtlasError::NoCellTypes.into());
    }
    let mut coords = Vec::new();
    let mut rates = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut dropped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if !seen.insert(fields.clone()) {
            continue;
        }
        let parsed = (|| -> Option<(CpgCoord, Vec<f64>)> {
            let coord = CpgCoord::new(
                &fields[chrom_idx],
                fields[start_idx].parse().ok()?,
                fields[end_idx].parse().ok()?,
            );
            let row: Option<Vec<f64>> = cell_columns
                .iter()
                .map(|&i| fields[i].parse::<f64>().ok())
                .collect();
            Some((coord, row?))
        })();
        match parsed {
            Some((coord, row)) => {
                coords.push(coord);
                rates.push(row);
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("IO\tatlas\t{}\tdropped {} rows", path.display(), dropped);
    }
    Ok(AtlasTable {
        cell_types,
        coords,
        rates,
    })
}

/// Parse a methylome table into per-site call counts. Rows with zero
/// coverage or more modified than total calls are dropped with a warning.
pub fn load_methylome(path: &Path, sample: &str) -> Result<Vec<MethylRow>, DeconvError> {
    let mut rdr = open_reader(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let chrom_idx = require_column(&headers, &["chromosome", "chr"], path)?;
    let start_idx = require_column(&headers, &["start"], path)?;
    let end_idx = require_column(&headers, &["end"], path)?;
    let total_idx = require_column(&headers, &["total_calls"], path)?;
    let mod_idx = require_column(&headers, &["modified_calls"], path)?;
    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let parsed = (|| -> Option<MethylRow> {
            let coord = CpgCoord::new(
                record.get(chrom_idx)?,
                record.get(start_idx)?.parse().ok()?,
                record.get(end_idx)?.parse().ok()?,
            );
            let total_calls: u32 = record.get(total_idx)?.parse().ok()?;
            let modified_calls: u32 = record.get(mod_idx)?.parse().ok()?;
            (total_calls > 0 && modified_calls <= total_calls).then_some(MethylRow {
                coord,
                total_calls,
                modified_calls,
            })
        })();
        match parsed {
            Some(row) => rows.push(row),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(
            "IO\t{}\tdropped {} uncovered or malformed rows",
            sample, dropped
        );
    }
    if rows.is_empty() {
        return Err(DeconvError::EmptyInput {
            sample: sample.to_string(),
        });
    }
    Ok(rows)
}

/// Match methylome rows against atlas coordinates. Sites covered by the
/// sample but absent from the atlas are ignored; the result keeps atlas
/// row order of the intersection as it appears in the methylome.
pub fn join(
    atlas: &AtlasTable,
    rows: &[MethylRow],
    sample: &str,
) -> Result<(ReferenceAtlas, Sample), DeconvError> {
    let index: HashMap<&CpgCoord, usize> = atlas
        .coords
        .iter()
        .enumerate()
        .map(|(i, c)| (c, i))
        .collect();
    let mut coords = Vec::new();
    let mut rates = Vec::new();
    let mut m = Vec::new();
    let mut t = Vec::new();
    for row in rows {
        if let Some(&i) = index.get(&row.coord) {
            coords.push(atlas.coords[i].clone());
            rates.push(atlas.rates[i].clone());
            m.push(row.modified_calls);
            t.push(row.total_calls);
        }
    }
    if coords.is_empty() {
        return Err(DeconvError::EmptyJoin {
            sample: sample.to_string(),
        });
    }
    debug!("IO\t{}\tjoined {} of {} sites", sample, coords.len(), rows.len());
    let atlas = ReferenceAtlas::new(atlas.cell_types.clone(), coords, rates)?;
    let sample = Sample::new(sample, m, t)?;
    Ok((atlas, sample))
}

/// Load a methylome and join it against an already parsed atlas.
pub fn load_joined(
    atlas: &AtlasTable,
    path: &Path,
    sample: &str,
) -> Result<(ReferenceAtlas, Sample), DeconvError> {
    let rows = load_methylome(path, sample)?;
    join(atlas, &rows, sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("methmix_io_{}", name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    const ATLAS: &str = "chromosome\tstart\tend\ttumor\tnormal\n\
chr1\t100\t102\t1.0\t0.0\n\
chr1\t200\t202\t0.0\t1.0\n\
chr1\t200\t202\t0.0\t1.0\n\
chr1\t300\t302\t0.5\t0.5\n";

    #[test]
    fn atlas_parses_and_dedupes() {
        let path = write_tmp("atlas.tsv", ATLAS);
        let atlas = load_atlas(&path).unwrap();
        assert_eq!(atlas.cell_types, vec!["tumor", "normal"]);
        assert_eq!(atlas.coords.len(), 3);
        assert_eq!(atlas.rates[2], vec![0.5, 0.5]);
    }

    #[test]
    fn atlas_ignores_reserved_columns() {
        let text = "chr\tstart\tend\tlabel\ttumor\n\
chr1\t100\t102\tsite_a\t0.7\n";
        let path = write_tmp("atlas_label.tsv", text);
        let atlas = load_atlas(&path).unwrap();
        assert_eq!(atlas.cell_types, vec!["tumor"]);
        assert_eq!(atlas.rates[0], vec![0.7]);
    }

    #[test]
    fn atlas_without_cell_types_fails() {
        let text = "chromosome\tstart\tend\nchr1\t100\t102\n";
        let path = write_tmp("atlas_empty.tsv", text);
        let err = load_atlas(&path).unwrap_err();
        assert!(matches!(
            err,
            DeconvError::MalformedAtlas(definitions::AtlasError::NoCellTypes)
        ));
    }

    #[test]
    fn methylome_drops_zero_coverage() {
        let text = "chromosome\tstart\tend\ttotal_calls\tmodified_calls\n\
chr1\t100\t102\t10\t9\n\
chr1\t200\t202\t0\t0\n";
        let path = write_tmp("methylome.tsv", text);
        let rows = load_methylome(&path, "s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].modified_calls, 9);
    }

    #[test]
    fn empty_methylome_is_an_error() {
        let text = "chromosome\tstart\tend\ttotal_calls\tmodified_calls\n\
chr1\t100\t102\t0\t0\n";
        let path = write_tmp("methylome_empty.tsv", text);
        let err = load_methylome(&path, "s1").unwrap_err();
        assert!(matches!(err, DeconvError::EmptyInput { .. }));
    }

    #[test]
    fn missing_count_column_is_reported() {
        let text = "chromosome\tstart\tend\ttotal_calls\nchr1\t100\t102\t10\n";
        let path = write_tmp("methylome_nocol.tsv", text);
        let err = load_methylome(&path, "s1").unwrap_err();
        assert!(matches!(err, DeconvError::MissingColumn { .. }));
    }

    #[test]
    fn join_keeps_only_shared_sites() {
        let atlas_path = write_tmp("atlas_join.tsv", ATLAS);
        let atlas = load_atlas(&atlas_path).unwrap();
        let text = "chromosome\tstart\tend\ttotal_calls\tmodified_calls\n\
chr1\t100\t102\t20\t18\n\
chr2\t999\t1001\t30\t1\n";
        let path = write_tmp("methylome_join.tsv", text);
        let (joined, sample) = load_joined(&atlas, &path, "s1").unwrap();
        assert_eq!(joined.get_num_cpgs(), 1);
        assert_eq!(sample.t(), &[20]);
        assert_eq!(sample.m(), &[18]);
    }

    #[test]
    fn disjoint_coordinates_are_an_error() {
        let atlas_path = write_tmp("atlas_disjoint.tsv", ATLAS);
        let atlas = load_atlas(&atlas_path).unwrap();
        let text = "chromosome\tstart\tend\ttotal_calls\tmodified_calls\n\
chrX\t5\t7\t10\t1\n";
        let path = write_tmp("methylome_disjoint.tsv", text);
        let err = load_joined(&atlas, &path, "s1").unwrap_err();
        assert!(matches!(err, DeconvError::EmptyJoin { .. }));
    }
}
