use derive_more::Error;
use std::fmt;

/// Result alias used through the crate.
pub type Result<T> = std::result::Result<T, DmftError>;

/// Structural failures of a run.
///
/// Numerical edge cases inside the sampler (negative ratios, near singular
/// update denominators) are not errors, they are counted in the solver
/// diagnostics instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DmftError {
    /// Imaginary time grid with $\beta\leq 0$ or $L=0$.
    InvalidGrid { beta: f64, n_slices: usize },
    /// Access to a field entry outside $\[0, L)$.
    IndexOutOfRange { index: usize, len: usize },
    /// Invalid parameter or invalid parameter combination.
    Configuration { details: String },
    /// LAPACK reported an exactly singular matrix.
    Singular { details: String },
    /// Failure reading or writing the archive.
    Archive { details: String },
    /// A resumed run needs an iteration that was never persisted.
    MissingIteration { iteration: usize },
}

impl DmftError {
    pub fn configuration<S: Into<String>>(details: S) -> Self {
        DmftError::Configuration { details: details.into() }
    }

    pub fn archive<S: Into<String>>(details: S) -> Self {
        DmftError::Archive { details: details.into() }
    }
}

impl fmt::Display for DmftError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DmftError::InvalidGrid { beta, n_slices } => write!(
                f,
                "Invalid imaginary time grid, got beta = {} and L = {}.",
                beta, n_slices
            ),
            DmftError::IndexOutOfRange { index, len } => {
                write!(f, "Index {} is out of range for a field of length {}.", index, len)
            }
            DmftError::Configuration { details } => write!(f, "Configuration error: {}", details),
            DmftError::Singular { details } => write!(f, "Singular matrix: {}", details),
            DmftError::Archive { details } => write!(f, "Archive error: {}", details),
            DmftError::MissingIteration { iteration } => {
                write!(f, "Iteration {} was not found in the archive.", iteration)
            }
        }
    }
}

impl From<std::io::Error> for DmftError {
    fn from(err: std::io::Error) -> Self {
        DmftError::archive(err.to_string())
    }
}

impl From<csv::Error> for DmftError {
    fn from(err: csv::Error) -> Self {
        DmftError::archive(err.to_string())
    }
}

impl From<std::num::ParseIntError> for DmftError {
    fn from(err: std::num::ParseIntError) -> Self {
        DmftError::configuration(format!("Expected to parse an integer, {}.", err))
    }
}

impl From<std::num::ParseFloatError> for DmftError {
    fn from(err: std::num::ParseFloatError) -> Self {
        DmftError::configuration(format!("Expected to parse a float, {}.", err))
    }
}
