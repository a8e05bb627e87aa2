//! Controller task-slot program registry.
//!
//! The motion controller can hold auxiliary programs in numbered task
//! slots; the master program loads them, invokes them with `FARCALL` or
//! `BUFFEREDRUN`, and removes them when done. The registry mirrors that
//! controller-side memory so invalid invoke/remove sequences are caught
//! at compile time instead of on the machine.

use std::path::{Path, PathBuf};

use crate::error::{GcodeError, Result};

/// Required extension for program files, without the dot.
pub const PGM_EXTENSION: &str = "pgm";

/// A validated reference to an auxiliary program file.
#[derive(Debug, Clone)]
pub struct ProgramRef {
    /// Full path as it appears in the emitted instruction.
    pub path: PathBuf,
    /// Filename stem; the registry key.
    pub stem: String,
    /// Filename with extension, used by `REMOVEPROGRAM`.
    pub file_name: String,
}

/// Validate the extension of `path` and split out its stem and file name.
pub fn resolve(path: &Path) -> Result<ProgramRef> {
    let has_ext = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(PGM_EXTENSION));
    if !has_ext {
        return Err(GcodeError::WrongExtension {
            path: path.to_path_buf(),
            expected: PGM_EXTENSION,
        });
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ProgramRef {
        path: path.to_path_buf(),
        stem,
        file_name,
    })
}

/// Tracks which auxiliary programs are currently loaded into task slots.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    loaded: Vec<String>,
}

impl ProgramRegistry {
    /// Record a program stem as loaded. Duplicate loads are permitted.
    pub fn register(&mut self, stem: &str) {
        self.loaded.push(stem.to_string());
    }

    /// Is the stem currently loaded?
    pub fn is_loaded(&self, stem: &str) -> bool {
        self.loaded.iter().any(|s| s == stem)
    }

    /// Error unless the stem is currently loaded.
    pub fn require(&self, stem: &str) -> Result<()> {
        if self.is_loaded(stem) {
            Ok(())
        } else {
            Err(GcodeError::ProgramNotLoaded(stem.to_string()))
        }
    }

    /// Drop one registration of the stem.
    pub fn deregister(&mut self, stem: &str) -> Result<()> {
        match self.loaded.iter().position(|s| s == stem) {
            Some(idx) => {
                self.loaded.remove(idx);
                Ok(())
            }
            None => Err(GcodeError::ProgramNotLoaded(stem.to_string())),
        }
    }

    /// Currently loaded stems, in load order.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }
}
