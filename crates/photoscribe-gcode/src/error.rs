//! Error types for the compiler.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while compiling a G-code program.
#[derive(Error, Debug)]
pub enum GcodeError {
    /// No output name was configured or supplied at close.
    #[error("no output filename: set `filename` in the config or pass one to close()")]
    MissingOutputName,

    /// No positioning speed available for a move.
    #[error("no positioning speed: set `speed_pos` in the config or pass an explicit value")]
    MissingPositioningSpeed,

    /// Device identifier outside the supported set.
    #[error("unknown device `{0}`: expected ant, carbide, pharos or uwe")]
    UnknownDevice(String),

    /// Shutter token other than ON/OFF.
    #[error("invalid shutter state `{0}`: expected ON or OFF")]
    InvalidShutterToken(String),

    /// Movement-mode token other than ABS/INC.
    #[error("invalid movement mode `{0}`: expected ABS or INC")]
    InvalidModeToken(String),

    /// Target position with every coordinate unset.
    #[error("target position is (None, None, None)")]
    NullPosition,

    /// Loop iteration count of zero.
    #[error("loop iteration count must be >= 1")]
    InvalidLoopCount,

    /// FOR-loop variable used without a prior declaration.
    #[error("loop variable `${0}` has not been declared")]
    UndeclaredVariable(String),

    /// Feed rate at or below the minimum resolvable threshold.
    #[error("feed rate {0} mm/s is at or below the minimum resolvable value")]
    FeedRateTooLow(f64),

    /// Auxiliary program invoked or removed while not loaded.
    #[error("program `{0}` is not loaded: call load_program() first")]
    ProgramNotLoaded(String),

    /// Auxiliary program path with the wrong extension.
    #[error("wrong extension for `{}`: expected `.{expected}`", path.display())]
    WrongExtension {
        /// The offending path.
        path: PathBuf,
        /// The required extension, without the dot.
        expected: &'static str,
    },

    /// Refractive-index ratio outside `(0, +inf)`.
    #[error("effective refractive index must be > 0, got {0}")]
    InvalidRefractiveIndex(f64),

    /// Sample footprint not strictly positive while warp compensation is on.
    #[error("sample size must be positive with warp compensation enabled, got ({0}, {1})")]
    InvalidSampleSize(f64, f64),

    /// Malformed configuration file.
    #[error("invalid config: {0}")]
    Config(String),

    /// I/O failure while writing the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, GcodeError>;
