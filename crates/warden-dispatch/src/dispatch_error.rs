use thiserror::Error;

/// Failure raised at the dispatch boundary, tagged by kind so the classifier
/// never has to parse rendered text.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{parameter} is a required argument that is missing.")]
    MissingArgument { parameter: String },
    #[error("Command \"{name}\" is not found")]
    CommandNotFound { name: String },
    #[error("The check functions for command {command} failed.")]
    CheckFailure { command: String },
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument { .. } => "missing_argument",
            Self::CommandNotFound { .. } => "command_not_found",
            Self::CheckFailure { .. } => "check_failure",
            Self::Unhandled(_) => "unhandled",
        }
    }

    /// True for the platform's generic unknown-command default: a name that is
    /// empty or made only of `.` characters, e.g. a bare prefix or an ellipsis.
    pub fn is_suppressed_default(&self) -> bool {
        match self {
            Self::CommandNotFound { name } => name.chars().all(|ch| ch == '.'),
            _ => false,
        }
    }
}
