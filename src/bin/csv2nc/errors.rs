use std::fmt::Display;

use stationnc::error::GenerationError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// The program was called incorrectly
    UsageError(String),

    /// A problem with the configuration or the CSV input: a missing file,
    /// a malformed row, or a schema violation.
    InputError(String),

    /// A problem creating or writing the output that is likely due to the
    /// system, e.g. permissions or a full disk.
    RuntimeError(String),

    /// A problem in csv2nc itself.
    InternalError(String),
}

impl CliError {
    pub(crate) fn usage_error<S: ToString>(msg: S) -> Self {
        Self::UsageError(msg.to_string())
    }

    pub(crate) fn input_error<S: ToString>(msg: S) -> Self {
        Self::InputError(msg.to_string())
    }

    pub(crate) fn runtime_error<S: ToString>(msg: S) -> Self {
        Self::RuntimeError(msg.to_string())
    }

    pub(crate) fn internal_error<S: ToString>(msg: S) -> Self {
        Self::InternalError(msg.to_string())
    }
}

impl From<&GenerationError> for CliError {
    fn from(value: &GenerationError) -> Self {
        match value {
            GenerationError::MalformedRow { .. }
            | GenerationError::SchemaViolation(_)
            | GenerationError::InputError(_) => Self::input_error(value),
            GenerationError::ContainerBuildFailure(_)
            | GenerationError::ContainerWriteFailure { .. }
            | GenerationError::FinalizeFailure => Self::runtime_error(value),
            GenerationError::InvalidState(_) => Self::internal_error(value),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (type_str, err_msg, fix_msg) = match self {
            CliError::UsageError(msg) => {
                let typestr = "Usage error";
                let fix = "Please double check the command line arguments (see csv2nc --help).";
                (typestr, msg, fix)
            },
            CliError::InputError(msg) => {
                let typestr = "Input error";
                let fix = "Please check the configuration and CSV row named above. `csv2nc check <config>` validates a configuration without reading any data.";
                (typestr, msg, fix)
            },
            CliError::RuntimeError(msg) => {
                let typestr = "Runtime error";
                let fix = "Check that the output directory exists, is writable, and has free space, then try again. No partial output file was kept.";
                (typestr, msg, fix)
            },
            CliError::InternalError(msg) => {
                let typestr = "Internal error";
                let fix = "This likely indicates a bug in csv2nc. Please report it along with the configuration and input that triggered it.";
                (typestr, msg, fix)
            },
        };

        writeln!(f, "{type_str}: {err_msg}\n\n{fix_msg}")
    }
}
