//! Error types for the planner.

use photoscribe_gcode::GcodeError;
use thiserror::Error;

/// Errors that can occur while planning trench fabrication.
#[derive(Error, Debug)]
pub enum TrenchError {
    /// A trench with no boundary vertices cannot be fabricated.
    #[error("trench {0} has an empty boundary")]
    EmptyBoundary(usize),

    /// Failure in the underlying G-code compiler.
    #[error(transparent)]
    Gcode(#[from] GcodeError),
}

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, TrenchError>;
