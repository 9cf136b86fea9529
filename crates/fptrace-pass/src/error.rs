use std::path::PathBuf;

use fptrace_ir::IrError;
use thiserror::Error;

/// Pass errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IR error: {0}")]
    Ir(#[from] IrError),
    #[error("function `{0}` has blocks but no entry insertion point")]
    MissingEntry(String),
    #[error("symbol `{name}` already exists and is not {expected}")]
    SymbolConflict { name: String, expected: &'static str },
    #[error("report log {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
