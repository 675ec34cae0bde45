//! Unified error type for the gridsim crates
//!
//! Recoverable failures (bad configuration, unknown parameters, ill-posed
//! initial conditions, linear solves that do not converge) surface as
//! [`GridError`]. Structural contract violations inside the evaluation path
//! (stale offsets, Jacobian entries outside a registered sparsity pattern)
//! are programming errors and panic instead.
//!
//! # Example
//!
//! ```
//! use gridsim_core::{GridError, GridResult};
//!
//! fn check_inertia(h: f64) -> GridResult<f64> {
//!     if h <= 0.0 {
//!         return Err(GridError::Parameter(format!("inertia must be positive, got {h}")));
//!     }
//!     Ok(h)
//! }
//!
//! assert!(check_inertia(5.0).is_ok());
//! assert!(check_inertia(0.0).is_err());
//! ```

use thiserror::Error;

/// Unified error type for all gridsim operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors (reading configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors (unknown model type, unknown solve mode name)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid or unknown model parameter
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Initial-condition solve failed or is ill-posed
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Model tree, offset or matrix-structure errors
    #[error("Structure error: {0}")]
    Structure(String),

    /// Linear solver / integrator errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridError::Solver("newton iteration did not converge".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("did not converge"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GridError = io_err.into();
        assert!(matches!(err, GridError::Io(_)));
    }

    #[test]
    fn test_anyhow_conversion_keeps_message() {
        let err: GridError = anyhow::anyhow!("singular matrix").into();
        assert!(matches!(err, GridError::Other(ref m) if m == "singular matrix"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GridResult<()> {
            Err(GridError::Structure("stale offsets".into()))
        }

        fn outer() -> GridResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
