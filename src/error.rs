//! Common errors across the stationnc crate
use std::path::PathBuf;

/// Errors in the configuration describing a station and its variables.
///
/// These are always detected before the output file is created.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read configuration file {}", .0.display())]
    ReadError(PathBuf),
    #[error("Could not parse configuration: {0}")]
    ParseError(String),
    #[error("Could not write configuration template to {}", .0.display())]
    TemplateError(PathBuf),
    #[error("Configuration option '{key}' is invalid: {reason}")]
    InvalidOption { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid_option<K: ToString, R: ToString>(key: K, reason: R) -> Self {
        Self::InvalidOption { key: key.to_string(), reason: reason.to_string() }
    }
}

/// Violations of the station/schema contracts.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Variable '{name}' has fill value {fill} inside its valid range [{min}, {max}]")]
    FillInsideValidRange { name: String, fill: f64, min: f64, max: f64 },
    #[error("Variable '{name}' has fill value {fill} inside its stored (packed) valid range [{min}, {max}]")]
    FillInsidePackedRange { name: String, fill: f64, min: f64, max: f64 },
    #[error("Variable '{name}' has valid_min ({min}) greater than valid_max ({max})")]
    InvertedValidRange { name: String, min: f64, max: f64 },
    #[error("Variable '{name}' has a scale factor of zero")]
    ZeroScaleFactor { name: String },
    #[error("Variable '{name}' is stored as an integer, but its fill value {fill} is not a 32-bit integer")]
    NonIntegerFill { name: String, fill: f64 },
    #[error("Variable name '{0}' is used more than once or collides with a reserved variable")]
    DuplicateName(String),
    #[error("Variable '{variable}' references instrument '{instrument}', which is not defined")]
    UnknownInstrument { variable: String, instrument: String },
    #[error("Variable '{variable}' reads from column '{column}', which is not in the input header")]
    UnknownColumn { variable: String, column: String },
    #[error("Variable '{variable}' reads from column {index}, which holds the date or time")]
    ReservedColumn { variable: String, index: usize },
    #[error("Station identifier (urn) must not be empty")]
    MissingStationId,
    #[error("Station position is invalid: {0}")]
    InvalidPosition(String),
    #[error("The schema table defines no variables")]
    EmptySchema,
    #[error("Declared row count is {declared}, but the input provides only {available} rows")]
    RowCountMismatch { declared: usize, available: usize },
}

/// Errors decoding a single input record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },
    #[error("Could not read row {row} from the input")]
    ReadError { row: usize },
    #[error("Could not map the schema variables onto the input columns")]
    ColumnMapping,
}

impl DecodeError {
    pub fn malformed<S: ToString>(row: usize, reason: S) -> Self {
        Self::MalformedRow { row, reason: reason.to_string() }
    }

    /// The 1-based data row the error refers to.
    pub fn row(&self) -> usize {
        match self {
            Self::MalformedRow { row, .. } => *row,
            Self::ReadError { row } => *row,
            Self::ColumnMapping => 0,
        }
    }
}

/// Errors raised by a container backend.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Could not create container at {}", .0.display())]
    CreateError(PathBuf),
    #[error("Could not define dimension '{0}'")]
    DimensionError(String),
    #[error("Could not define variable '{0}'")]
    VariableError(String),
    #[error("Could not set attribute '{attribute}' on {target}")]
    AttributeError { target: String, attribute: String },
    #[error("Could not write to variable '{variable}' at index {index:?}")]
    WriteError { variable: String, index: Vec<usize> },
    #[error("Could not close container")]
    CloseError,
    #[error("Output format '{0}' is not available in this build")]
    UnsupportedFormat(String),
}

impl ContainerError {
    pub fn attribute_error<T: ToString, A: ToString>(target: T, attribute: A) -> Self {
        Self::AttributeError { target: target.to_string(), attribute: attribute.to_string() }
    }

    pub fn write_error<V: ToString>(variable: V, index: &[usize]) -> Self {
        Self::WriteError { variable: variable.to_string(), index: index.to_vec() }
    }
}

/// The single error surfaced by the generation driver.
///
/// Each variant corresponds to one of the fatal error kinds of a run; the
/// full chain of causes is kept in the surrounding [`error_stack::Report`].
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Malformed input at row {row}")]
    MalformedRow { row: usize },
    #[error("Schema violation: {0}")]
    SchemaViolation(String),
    #[error("Failed to build the output container during step '{0}'")]
    ContainerBuildFailure(String),
    #[error("Failed to write the output container at row {row}")]
    ContainerWriteFailure { row: usize },
    #[error("Failed to finalize the output container")]
    FinalizeFailure,
    #[error("Could not read input {}", .0.display())]
    InputError(PathBuf),
    #[error("A generation run cannot start from the {0} state")]
    InvalidState(String),
}

impl GenerationError {
    pub fn schema_violation<S: ToString>(msg: S) -> Self {
        Self::SchemaViolation(msg.to_string())
    }

    pub fn build_failure<S: ToString>(step: S) -> Self {
        Self::ContainerBuildFailure(step.to_string())
    }
}
