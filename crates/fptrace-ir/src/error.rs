use thiserror::Error;

/// Errors raised by a host while editing its IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("instruction {0} is not part of the module")]
    UnknownInstr(String),
    #[error("IR builder failed: {0}")]
    Builder(String),
}

pub type Result<T> = std::result::Result<T, IrError>;
