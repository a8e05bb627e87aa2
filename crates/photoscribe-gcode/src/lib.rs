#![warn(missing_docs)]

//! Aerotech-dialect G-code compilation for femtosecond-laser direct
//! writing.
//!
//! This crate turns ordered tool-path waypoints (position, feed rate,
//! shutter request) into a deterministic, replayable `.pgm` instruction
//! stream for the motion controller of a focused-laser fabrication stage.
//! It owns no hardware connection; generation is a single linear pass
//! ending in one artifact write.
//!
//! # Example
//!
//! ```ignore
//! use photoscribe_gcode::{CompilerConfig, GcodeCompiler, Waypoint};
//!
//! let mut config = CompilerConfig::new("chip01");
//! config.rotation_angle = 2.0;
//! config.flip_x = true;
//!
//! GcodeCompiler::session(config, |g| {
//!     g.set_home([Some(0.0), Some(0.0), Some(0.0)])?;
//!     g.repeat(6, |g| {
//!         g.comment("scan pass");
//!         g.write(&path)
//!     })?;
//!     g.move_to([None, Some(0.0), Some(0.1)], None)
//! })?;
//! ```

pub mod compiler;
pub mod config;
pub mod device;
mod error;
pub mod program;

pub use compiler::{GcodeCompiler, MoveMode, ShutterState, Waypoint, DEFAULT_TASK_ID};
pub use config::CompilerConfig;
pub use device::Device;
pub use error::{GcodeError, Result};
pub use program::{ProgramRegistry, PGM_EXTENSION};
