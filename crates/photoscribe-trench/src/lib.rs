#![warn(missing_docs)]

//! Trench fabrication planning for the photoscribe compiler.
//!
//! A trench is a cavity machined by sweeping its boundary ("wall") at
//! many closely spaced depths and then clearing the interior ("floor")
//! once per level. This crate compiles the per-trench auxiliary programs
//! and the master program that sequences them through the controller's
//! task slots.
//!
//! # Example
//!
//! ```ignore
//! use photoscribe_gcode::{CompilerConfig, GcodeCompiler};
//! use photoscribe_trench::{write_column, ColumnParams, TrenchColumn};
//!
//! let mut master = GcodeCompiler::new(CompilerConfig::new("column01"))?;
//! write_column(&mut master, &column, Some(0), &ColumnParams::default())?;
//! master.close(None)?;
//! ```

mod error;
pub mod planner;
pub mod trench;

pub use error::{Result, TrenchError};
pub use planner::{export_trench_paths, write_column, ColumnParams};
pub use trench::{Trench, TrenchColumn};
