//! Error taxonomy for a deconvolution run. Every variant carries enough
//! context (sample name, model name, file/column) to attribute a failure;
//! batch callers may skip a failed sample, single-sample callers treat any
//! of these as fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeconvError {
    #[error("sample {sample}: input file has no usable data rows")]
    EmptyInput { sample: String },
    #[error("sample {sample}: no coordinates shared with the atlas")]
    EmptyJoin { sample: String },
    #[error(transparent)]
    MalformedAtlas(#[from] definitions::AtlasError),
    #[error(transparent)]
    MalformedSample(#[from] definitions::SampleError),
    #[error("{file}: missing required column {column}")]
    MissingColumn { file: String, column: String },
    #[error("unknown model: {0} (choose from null, nnls, llsp, llse, mmse)")]
    UnknownModel(String),
    #[error("sample {sample}: {model} search produced no finite solution")]
    OptimizationFailed { sample: String, model: String },
    #[error("sample {sample}: mixture solver failed: {reason}")]
    ExternalSolver { sample: String, reason: String },
    #[error("simulation: {0}")]
    Simulation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TSV parse error: {0}")]
    Csv(#[from] csv::Error),
}
