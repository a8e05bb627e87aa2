//! Column fabrication planning.
//!
//! For each trench in a column, two standalone auxiliary programs are
//! compiled (a wall traversal and a floor fill), and the master program
//! is extended to load, repeatedly invoke and remove them while stepping
//! the depth variable across Z levels.

use std::path::{Path, PathBuf};

use photoscribe_gcode::{CompilerConfig, GcodeCompiler, ShutterState};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrenchError};
use crate::trench::{Trench, TrenchColumn};

/// Parameters controlling column fabrication.
///
/// Lengths are in mm, speeds in mm/s, pauses in seconds. The Z-level and
/// pass-count arithmetic below maps directly onto fabricated depth; the
/// formulas are part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnParams {
    /// Number of stacked Z levels the trench is divided into.
    pub n_levels: u32,
    /// Height of a single Z level.
    pub level_height: f64,
    /// Offset below the nominal level start where wall inscription begins.
    pub z_offset: f64,
    /// Vertical spacing between consecutive wall passes.
    pub pass_spacing: f64,
    /// Translation speed while fabricating walls and floors.
    pub fab_speed: f64,
    /// Positioning speed for moves between trenches.
    pub speed_pos: f64,
    /// Pause between the wall loop and the floor pass.
    pub pause: f64,
    /// Local root the auxiliary programs are written under.
    pub work_dir: PathBuf,
    /// Controller-side path prefix under which the auxiliary programs
    /// will be found at run time.
    pub base_dir: PathBuf,
    /// Name of the output directory for auxiliary programs.
    pub dir_name: String,
    /// Optional U-axis coordinates for wall and floor fabrication.
    pub u: Option<(f64, f64)>,
}

impl Default for ColumnParams {
    fn default() -> Self {
        Self {
            n_levels: 4,
            level_height: 0.075,
            z_offset: 0.020,
            pass_spacing: 0.0015,
            fab_speed: 4.0,
            speed_pos: 5.0,
            pause: 0.5,
            work_dir: PathBuf::from("."),
            base_dir: PathBuf::new(),
            dir_name: "s-trench".to_string(),
            u: None,
        }
    }
}

impl ColumnParams {
    /// Wall passes per level: `ceil((level_height + z_offset) / pass_spacing)`.
    pub fn wall_passes(&self) -> u32 {
        ((self.level_height + self.z_offset) / self.pass_spacing).ceil() as u32
    }

    /// Starting depth of a level: `(level * level_height - z_offset) / neff`.
    pub fn level_z(&self, level: u32, neff: f64) -> f64 {
        (f64::from(level) * self.level_height - self.z_offset) / neff
    }
}

/// Directory name holding one column's auxiliary programs.
fn column_dir(col_index: Option<usize>) -> String {
    match col_index {
        Some(i) => format!("trenchCol{:03}", i + 1),
        None => "trenchCol".to_string(),
    }
}

fn aux_config(reference: &CompilerConfig, out_dir: &Path, filename: String) -> CompilerConfig {
    let mut config = CompilerConfig::new(filename);
    config.export_dir = Some(out_dir.to_path_buf());
    config.n_glass = reference.n_glass;
    config.n_environment = reference.n_environment;
    config.rotation_angle = reference.rotation_angle;
    config.output_digits = reference.output_digits;
    config
}

/// Compile the standalone wall and floor programs for one trench into
/// `out_dir`, as `<stem>_wall.pgm` and `<stem>_floor.pgm`.
///
/// The auxiliary compilers share the reference config's rotation and
/// refractive indices but apply no warp and no shuttering; depth is
/// controlled by the master program, so the paths are planar.
pub fn export_trench_paths(
    trench: &Trench,
    out_dir: &Path,
    stem: &str,
    reference: &CompilerConfig,
    fab_speed: f64,
) -> Result<()> {
    let ring = trench.closed_boundary();
    let (bx, by): (Vec<f64>, Vec<f64>) = ring.iter().map(|p| (p.x, p.y)).unzip();
    let mut wall = GcodeCompiler::new(aux_config(
        reference,
        out_dir,
        format!("{stem}_wall.pgm"),
    ))?;
    wall.write_path_xy(&bx, &by, fab_speed)?;
    wall.close(None)?;

    let mut floor = GcodeCompiler::new(aux_config(
        reference,
        out_dir,
        format!("{stem}_floor.pgm"),
    ))?;
    for path in &trench.floor {
        let (fx, fy): (Vec<f64>, Vec<f64>) = path.iter().map(|p| (p.x, p.y)).unzip();
        floor.write_path_xy(&fx, &fy, fab_speed)?;
    }
    floor.close(None)?;
    Ok(())
}

/// Plan the fabrication of a trench column.
///
/// Writes the per-trench auxiliary programs, then extends `master` with
/// the load/invoke/remove sequence across all Z levels. The master is not
/// closed here; callers close it once the whole chip is planned. Auxiliary
/// artifacts are on storage before this returns, so the master's
/// references never dangle.
pub fn write_column(
    master: &mut GcodeCompiler,
    column: &TrenchColumn,
    col_index: Option<usize>,
    params: &ColumnParams,
) -> Result<()> {
    let rel_dir = Path::new(&params.dir_name).join(column_dir(col_index));
    let local_dir = params.work_dir.join(&rel_dir);
    for (i, trench) in column.trenches.iter().enumerate() {
        if trench.boundary.is_empty() {
            return Err(TrenchError::EmptyBoundary(i));
        }
        let stem = format!("trench{:03}", i + 1);
        export_trench_paths(trench, &local_dir, &stem, master.config(), params.fab_speed)?;
        debug!(trench = i + 1, "auxiliary wall/floor programs written");
    }

    master.declare_vars(&["ZCURR"]);
    let neff = master.config().neff();
    let passes = params.wall_passes();
    let remote_dir = params.base_dir.join(&rel_dir);

    for level in 0..params.n_levels {
        for (i, trench) in column.trenches.iter().enumerate() {
            let wall_name = format!("trench{:03}_wall.pgm", i + 1);
            let floor_name = format!("trench{:03}_floor.pgm", i + 1);
            let wall_path = remote_dir.join(&wall_name);
            let floor_path = remote_dir.join(&floor_name);
            // boundary checked non-empty above
            let anchor = trench.boundary[0];
            let z0 = params.level_z(level, neff);

            master.comment(&format!("+--- TRENCH #{}, LEVEL {} ---+", i + 1, level + 1));
            master.load_program(&wall_path, None)?;
            master.load_program(&floor_path, None)?;
            master.shutter(ShutterState::Off);
            master.move_to(
                [Some(anchor.x), Some(anchor.y), Some(z0)],
                Some(params.speed_pos),
            )?;
            master.raw(&format!("$ZCURR = {z0:.6}"));
            master.shutter(ShutterState::On);
            master.repeat(passes, |g| {
                g.farcall(&wall_name)?;
                g.raw(&format!("$ZCURR = $ZCURR + {:.6}", params.pass_spacing / neff));
                g.raw("LINEAR Z$ZCURR");
                Ok(())
            })?;
            if let Some((_, u_floor)) = params.u {
                master.raw(&format!("LINEAR U{u_floor:.6}"));
            }
            master.dwell(params.pause);
            master.farcall(&floor_name)?;
            master.shutter(ShutterState::Off);
            if let Some((u_wall, _)) = params.u {
                master.raw(&format!("LINEAR U{u_wall:.6}"));
            }
            master.remove_program(&wall_path, None)?;
            master.remove_program(&floor_path, None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoscribe_math::Point2;
    use tempfile::tempdir;

    fn square_trench() -> Trench {
        Trench::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(0.1, 0.0),
                Point2::new(0.1, 0.1),
                Point2::new(0.0, 0.1),
            ],
            vec![vec![Point2::new(0.02, 0.05), Point2::new(0.08, 0.05)]],
        )
    }

    fn quick_params(dir: &Path) -> ColumnParams {
        ColumnParams {
            n_levels: 1,
            level_height: 0.002,
            z_offset: 0.001,
            pass_spacing: 0.001,
            work_dir: dir.to_path_buf(),
            base_dir: PathBuf::from("/lab/scripts"),
            ..ColumnParams::default()
        }
    }

    fn master(dir: &Path) -> GcodeCompiler {
        let mut config = CompilerConfig::new("column.pgm");
        config.export_dir = Some(dir.to_path_buf());
        config.n_glass = 1.5;
        config.n_environment = 1.0;
        GcodeCompiler::new(config).unwrap()
    }

    #[test]
    fn test_wall_passes_arithmetic() {
        let params = ColumnParams::default();
        // ceil((0.075 + 0.020) / 0.0015) = ceil(63.33..) = 64
        assert_eq!(params.wall_passes(), 64);

        let mut small = ColumnParams::default();
        small.level_height = 0.002;
        small.z_offset = 0.001;
        small.pass_spacing = 0.001;
        assert_eq!(small.wall_passes(), 3);
    }

    #[test]
    fn test_level_z() {
        let params = ColumnParams::default();
        let neff = 1.5;
        let z0 = params.level_z(0, neff);
        assert!((z0 - (-0.020 / 1.5)).abs() < 1e-12);
        let z2 = params.level_z(2, neff);
        assert!((z2 - ((2.0 * 0.075 - 0.020) / 1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_write_column_emits_aux_files() {
        let dir = tempdir().unwrap();
        let mut m = master(dir.path());
        let column = TrenchColumn::new(vec![square_trench()]);
        let params = quick_params(dir.path());
        write_column(&mut m, &column, None, &params).unwrap();

        let col_dir = dir.path().join("s-trench").join("trenchCol");
        let wall = std::fs::read_to_string(col_dir.join("trench001_wall.pgm")).unwrap();
        let floor = std::fs::read_to_string(col_dir.join("trench001_floor.pgm")).unwrap();
        // closed square: 4 vertices plus the repeated first one
        assert_eq!(wall.lines().count(), 5);
        assert!(wall.starts_with("LINEAR X0.000000 Y0.000000 F4.000000"));
        // feed is modal: only the first line carries it
        assert_eq!(wall.matches('F').count(), 1);
        assert!(floor.contains("LINEAR X0.020000 Y0.050000 F4.000000"));
    }

    #[test]
    fn test_column_dir_indexing() {
        let dir = tempdir().unwrap();
        let mut m = master(dir.path());
        let column = TrenchColumn::new(vec![square_trench()]);
        let params = quick_params(dir.path());
        write_column(&mut m, &column, Some(1), &params).unwrap();
        assert!(dir
            .path()
            .join("s-trench")
            .join("trenchCol002")
            .join("trench001_wall.pgm")
            .is_file());
    }

    #[test]
    fn test_master_sequence() {
        let dir = tempdir().unwrap();
        let mut m = master(dir.path());
        let column = TrenchColumn::new(vec![square_trench()]);
        let params = quick_params(dir.path());
        write_column(&mut m, &column, None, &params).unwrap();
        let path = m.close(None).unwrap();
        let text = std::fs::read_to_string(path).unwrap();

        // declarations precede everything
        assert!(text.starts_with("DVAR $ZCURR"));
        assert!(text.contains("REPEAT 3"));
        assert!(text.contains("LINEAR Z$ZCURR"));
        // neff = 1.5: pass increment is 0.001 / 1.5
        assert!(text.contains("$ZCURR = $ZCURR + 0.000667"));

        let load = text.find("LOAD \"/lab/scripts").unwrap();
        let on = text.find("PSOCONTROL X ON").unwrap();
        let wall_call = text.find("FARCALL \"trench001_wall.pgm\"").unwrap();
        let floor_call = text.find("FARCALL \"trench001_floor.pgm\"").unwrap();
        let remove = text.find("REMOVEPROGRAM").unwrap();
        assert!(load < on && on < wall_call && wall_call < floor_call && floor_call < remove);
        // both programs removed at the end of the level
        assert_eq!(text.matches("REMOVEPROGRAM").count(), 2);
        assert!(m.loaded_programs().is_empty());
    }

    #[test]
    fn test_empty_boundary_is_an_error() {
        let dir = tempdir().unwrap();
        let mut m = master(dir.path());
        let column = TrenchColumn::new(vec![Trench::new(vec![], vec![])]);
        let params = quick_params(dir.path());
        let err = write_column(&mut m, &column, None, &params).unwrap_err();
        assert!(matches!(err, TrenchError::EmptyBoundary(0)));
    }
}
