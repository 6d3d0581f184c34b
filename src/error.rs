use thiserror::Error;

/// Failures surfaced by the simulation core.
///
/// Configuration and world errors are raised while objects are constructed,
/// before any tick runs. Clamped outflows are not errors; they are counted on
/// the run and logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("factor '{name}' is not registered in this world")]
    UndefinedFactor { name: String },
    #[error("invalid world: {0}")]
    InvalidWorld(String),
}

pub type SimResult<T> = Result<T, SimError>;
