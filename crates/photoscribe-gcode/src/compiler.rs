//! The instruction compiler.
//!
//! [`GcodeCompiler`] accumulates dialect instructions in memory, as a
//! preamble holding variable declarations plus a body holding everything
//! else, and serializes them to a `.pgm` artifact on [`close`]. All
//! machine state the dialect cares about (shutter, movement mode, loaded
//! auxiliary programs, accumulated dwell time) is tracked explicitly here,
//! never inferred from the emitted text.
//!
//! [`close`]: GcodeCompiler::close

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use photoscribe_math::{PathTransform, WarpFn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CompilerConfig;
use crate::error::{GcodeError, Result};
use crate::program::{self, ProgramRegistry};

/// Task slot used when the caller does not pick one.
pub const DEFAULT_TASK_ID: u8 = 2;

/// Requested beam-gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutterState {
    /// Beam exposes the workpiece.
    On,
    /// Beam is blocked.
    Off,
}

impl fmt::Display for ShutterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutterState::On => write!(f, "ON"),
            ShutterState::Off => write!(f, "OFF"),
        }
    }
}

impl FromStr for ShutterState {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(ShutterState::On),
            "off" => Ok(ShutterState::Off),
            _ => Err(GcodeError::InvalidShutterToken(s.to_string())),
        }
    }
}

/// Coordinate interpretation for movement commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveMode {
    /// Coordinates are absolute stage positions.
    #[default]
    Absolute,
    /// Coordinates are increments from the current position.
    Incremental,
}

impl FromStr for MoveMode {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abs" | "absolute" => Ok(MoveMode::Absolute),
            "inc" | "incremental" => Ok(MoveMode::Incremental),
            _ => Err(GcodeError::InvalidModeToken(s.to_string())),
        }
    }
}

/// One tool-path sample: position in mm, feed rate in mm/s and the
/// requested shutter state while traveling to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// x coordinate \[mm\].
    pub x: f64,
    /// y coordinate \[mm\].
    pub y: f64,
    /// z coordinate \[mm\].
    pub z: f64,
    /// Feed rate \[mm/s\]; must exceed the minimum resolvable value.
    pub feed: f64,
    /// Shutter state requested for this segment.
    pub shutter: ShutterState,
}

impl Waypoint {
    /// Convenience constructor; `exposed` maps to the shutter flag.
    pub fn new(x: f64, y: f64, z: f64, feed: f64, exposed: bool) -> Self {
        Self {
            x,
            y,
            z,
            feed,
            shutter: if exposed {
                ShutterState::On
            } else {
                ShutterState::Off
            },
        }
    }
}

/// Compiles tool-path operations into an Aerotech-dialect program.
pub struct GcodeCompiler {
    config: CompilerConfig,
    transform: PathTransform,
    preamble: Vec<String>,
    body: Vec<String>,
    shutter_on: bool,
    mode: MoveMode,
    total_dwell_time: f64,
    dvars: Vec<String>,
    registry: ProgramRegistry,
}

impl GcodeCompiler {
    /// Create a compiler from a validated config, without warp
    /// compensation.
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        let transform = config.transform();
        Ok(Self::from_parts(config, transform))
    }

    /// Create a compiler with an injected warp function. Enables warp
    /// compensation, so the configured sample footprint must be positive.
    pub fn with_warp(mut config: CompilerConfig, warp: WarpFn) -> Result<Self> {
        config.warp_enabled = true;
        config.validate()?;
        let transform = config.transform().with_warp(warp);
        Ok(Self::from_parts(config, transform))
    }

    fn from_parts(config: CompilerConfig, transform: PathTransform) -> Self {
        Self {
            config,
            transform,
            preamble: Vec::new(),
            body: Vec::new(),
            shutter_on: false,
            mode: MoveMode::Absolute,
            total_dwell_time: 0.0,
            dvars: Vec::new(),
            registry: ProgramRegistry::default(),
        }
    }

    /// Run a complete compilation session: header on entry, then `body`,
    /// then teardown (axis-rotation disable, optional homing, close).
    /// The teardown runs even when `body` fails.
    pub fn session<F>(config: CompilerConfig, body: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut GcodeCompiler) -> Result<()>,
    {
        let mut compiler = GcodeCompiler::new(config)?;
        compiler.run_session(body)
    }

    /// [`session`](Self::session) with an injected warp function.
    pub fn session_with_warp<F>(config: CompilerConfig, warp: WarpFn, body: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut GcodeCompiler) -> Result<()>,
    {
        let mut compiler = GcodeCompiler::with_warp(config, warp)?;
        compiler.run_session(body)
    }

    fn run_session<F>(&mut self, body: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut GcodeCompiler) -> Result<()>,
    {
        self.open()?;
        let result = body(self);
        let closed = self.finish();
        match result {
            Ok(()) => closed,
            Err(e) => Err(e),
        }
    }

    /// Emit the device header block, a settle dwell and, when configured,
    /// the hardware axis-rotation preamble.
    pub fn open(&mut self) -> Result<()> {
        for line in self.config.device.header().lines() {
            self.push(line);
        }
        self.blank();
        self.dwell(1.0);
        self.blank();
        debug!(device = %self.config.device, "header block emitted");

        if self.config.rotation_angle != 0.0 {
            warn!(
                angle_deg = self.config.rotation_angle,
                "sample rotation active; the angle is interpreted in degrees"
            );
        }
        if self.config.axis_rotation_degrees() != 0.0 {
            warn!(
                angle_deg = self.config.axis_rotation_degrees(),
                "hardware axis rotation (G84) will be enabled"
            );
            self.enter_axis_rotation(None)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf> {
        if self.config.axis_rotation_degrees() != 0.0 {
            self.exit_axis_rotation()?;
            self.blank();
        }
        if self.config.home {
            self.go_init()?;
        }
        self.close(None)
    }

    /// Prepend a variable declaration to the program preamble and record
    /// the names for loop-variable validation.
    pub fn declare_vars(&mut self, names: &[&str]) {
        let args = names
            .iter()
            .map(|n| format!("${n}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.preamble.insert(0, String::new());
        self.preamble.insert(0, format!("DVAR {args}"));
        self.dvars.extend(names.iter().map(|n| n.to_lowercase()));
    }

    /// Emit a comment line; empty text emits a single blank line.
    pub fn comment(&mut self, text: &str) {
        self.blank();
        if !text.is_empty() {
            self.push(format!("; {text}"));
        }
    }

    /// Switch the movement-command coordinate interpretation.
    pub fn mode(&mut self, mode: MoveMode) {
        match mode {
            MoveMode::Absolute => self.push("ABSOLUTE"),
            MoveMode::Incremental => self.push("INCREMENTAL"),
        }
        self.mode = mode;
    }

    /// Request a shutter state; emits a PSO control instruction only when
    /// the state actually changes.
    pub fn shutter(&mut self, state: ShutterState) {
        let changed = match (state, self.shutter_on) {
            (ShutterState::On, false) => {
                self.shutter_on = true;
                true
            }
            (ShutterState::Off, true) => {
                self.shutter_on = false;
                true
            }
            _ => false,
        };
        if changed {
            let axis = self.config.device.pso_axis();
            self.push(format!("PSOCONTROL {axis} {state}"));
        }
    }

    /// Emit a timed pause and account for it; zero is a no-op.
    pub fn dwell(&mut self, pause: f64) {
        if pause == 0.0 {
            return;
        }
        self.push(format!("DWELL {}", pause.abs()));
        self.total_dwell_time += pause.abs();
    }

    /// Redefine the current stage position. At least one coordinate must
    /// be given; `None` leaves an axis untouched.
    pub fn set_home(&mut self, position: [Option<f64>; 3]) -> Result<()> {
        if position.iter().all(Option::is_none) {
            return Err(GcodeError::NullPosition);
        }
        let [x, y, z] = position;
        let args = self.motion_args(x, y, z, None)?;
        self.push(format!("G92 {args}"));
        Ok(())
    }

    /// Travel to a position with the shutter closed. `None` coordinates
    /// are left unchanged; the speed falls back to the configured
    /// positioning speed.
    pub fn move_to(&mut self, position: [Option<f64>; 3], speed: Option<f64>) -> Result<()> {
        if position.iter().all(Option::is_none) {
            return Err(GcodeError::NullPosition);
        }
        let speed = self.resolve_speed(speed)?;
        if self.shutter_on {
            self.shutter(ShutterState::Off);
        }
        let [x, y, z] = position;
        let args = self.motion_args(x, y, z, Some(speed))?;
        self.push(format!("G1 {args}"));
        self.dwell(self.config.long_pause);
        self.blank();
        Ok(())
    }

    /// Return to the origin `(0, 0, 0)` with the shutter closed.
    pub fn go_origin(&mut self) -> Result<()> {
        self.comment("HOMING");
        self.move_to([Some(0.0), Some(0.0), Some(0.0)], None)
    }

    /// Return to the configured initial point with the shutter closed.
    pub fn go_init(&mut self) -> Result<()> {
        let (x, y, z) = self.config.init_point;
        self.move_to([Some(x), Some(y), Some(z)], None)
    }

    /// Counted loop: emits `REPEAT n` .. `ENDREPEAT` around `body`.
    ///
    /// The closing instruction and the dwell-time accounting run even when
    /// the body fails; the body error is then propagated.
    pub fn repeat<F>(&mut self, count: u32, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if count == 0 {
            return Err(GcodeError::InvalidLoopCount);
        }
        self.push(format!("REPEAT {count}"));
        let snapshot = self.total_dwell_time;
        let result = body(self);
        self.push("ENDREPEAT");
        self.blank();
        // the body was timed once but the controller runs it `count` times
        self.total_dwell_time += f64::from(count - 1) * (self.total_dwell_time - snapshot);
        result
    }

    /// Variable-indexed loop: emits `FOR $var = 0 TO n-1` .. `NEXT $var`.
    /// The variable must have been declared with
    /// [`declare_vars`](Self::declare_vars) (case-insensitive).
    pub fn for_loop<F>(&mut self, var: &str, count: u32, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if count == 0 {
            return Err(GcodeError::InvalidLoopCount);
        }
        if !self.dvars.iter().any(|v| v.eq_ignore_ascii_case(var)) {
            return Err(GcodeError::UndeclaredVariable(var.to_string()));
        }
        self.push(format!("FOR ${var} = 0 TO {}", count - 1));
        let snapshot = self.total_dwell_time;
        let result = body(self);
        self.push(format!("NEXT ${var}"));
        self.blank();
        self.total_dwell_time += f64::from(count - 1) * (self.total_dwell_time - snapshot);
        result
    }

    /// Scoped hardware axis rotation: enables G84 around `body` and always
    /// disables it afterwards.
    pub fn axis_rotation<F>(&mut self, angle: Option<f64>, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.enter_axis_rotation(angle)?;
        let result = body(self);
        let exited = self.exit_axis_rotation();
        result.and(exited)
    }

    fn enter_axis_rotation(&mut self, angle: Option<f64>) -> Result<()> {
        let speed = self.resolve_speed(None)?;
        self.comment("ACTIVATE AXIS ROTATION");
        let args = self.motion_args(Some(0.0), Some(0.0), Some(0.0), Some(speed))?;
        self.push(format!("G1 {args}"));
        self.push("G84 X Y");
        self.dwell(self.config.short_pause);

        let angle = match angle {
            Some(a) => a.rem_euclid(360.0),
            None => self.config.axis_rotation_degrees(),
        };
        if angle == 0.0 {
            return Ok(());
        }
        self.push(format!("G84 X Y F{angle}"));
        self.blank();
        self.dwell(self.config.short_pause);
        Ok(())
    }

    fn exit_axis_rotation(&mut self) -> Result<()> {
        let speed = self.resolve_speed(None)?;
        self.comment("DEACTIVATE AXIS ROTATION");
        let args = self.motion_args(Some(0.0), Some(0.0), Some(0.0), Some(speed))?;
        self.push(format!("G1 {args}"));
        self.push("G84 X Y");
        self.dwell(self.config.short_pause);
        Ok(())
    }

    /// Display a start-of-block timestamp in the controller message panel.
    pub fn tic(&mut self) {
        self.push(r#"MSGDISPLAY 1, "START #TS""#);
        self.blank();
    }

    /// Display an end-of-block timestamp in the controller message panel.
    pub fn toc(&mut self) {
        self.push(r#"MSGDISPLAY 1, "END   #TS""#);
        self.push(r#"MSGDISPLAY 1, "---------------------""#);
        self.push(r#"MSGDISPLAY 1, " ""#);
        self.blank();
    }

    /// Append raw dialect text; multi-line input is split into lines.
    pub fn raw(&mut self, instr: &str) {
        if instr.is_empty() {
            self.blank();
            return;
        }
        for line in instr.lines() {
            self.push(line);
        }
    }

    /// Load an auxiliary program into a controller task slot and register
    /// its stem. Loading an already-loaded program simply re-emits.
    pub fn load_program(&mut self, filename: impl AsRef<Path>, task_id: Option<u8>) -> Result<()> {
        let task = task_id.unwrap_or(DEFAULT_TASK_ID);
        let file = program::resolve(filename.as_ref())?;
        self.push(format!("PROGRAM {task} LOAD \"{}\"", file.path.display()));
        self.registry.register(&file.stem);
        Ok(())
    }

    /// Stop a task slot and wait until it reports idle.
    pub fn program_stop(&mut self, task_id: Option<u8>) {
        let task = task_id.unwrap_or(DEFAULT_TASK_ID);
        self.push(format!("PROGRAM {task} STOP"));
        self.push(format!(
            "WAIT (TASKSTATUS({task}, DATAITEM_TaskState) == TASKSTATE_Idle) -1"
        ));
    }

    /// Remove a previously loaded auxiliary program from controller
    /// memory, stopping its task slot first.
    pub fn remove_program(
        &mut self,
        filename: impl AsRef<Path>,
        task_id: Option<u8>,
    ) -> Result<()> {
        let file = program::resolve(filename.as_ref())?;
        self.registry.require(&file.stem)?;
        self.program_stop(task_id);
        self.push(format!("REMOVEPROGRAM \"{}\"", file.file_name));
        self.registry.deregister(&file.stem)
    }

    /// Synchronously invoke a loaded auxiliary program.
    pub fn farcall(&mut self, filename: impl AsRef<Path>) -> Result<()> {
        let file = program::resolve(filename.as_ref())?;
        self.registry.require(&file.stem)?;
        self.dwell(self.config.short_pause);
        self.push(format!("FARCALL \"{}\"", file.path.display()));
        Ok(())
    }

    /// Queue a loaded auxiliary program for asynchronous execution on a
    /// task slot.
    pub fn bufferedcall(&mut self, filename: impl AsRef<Path>, task_id: Option<u8>) -> Result<()> {
        let task = task_id.unwrap_or(DEFAULT_TASK_ID);
        let file = program::resolve(filename.as_ref())?;
        self.registry.require(&file.stem)?;
        self.dwell(self.config.short_pause);
        self.blank();
        self.push(format!("PROGRAM {task} BUFFEREDRUN \"{}\"", file.path.display()));
        Ok(())
    }

    /// Load, invoke and remove a list of auxiliary programs in sequence.
    ///
    /// Task ids pair positionally with the filenames: `None` entries are
    /// dropped, a longer list is truncated, a shorter one is padded with
    /// the default task id.
    pub fn farcall_list<P: AsRef<Path>>(
        &mut self,
        filenames: &[P],
        task_ids: &[Option<u8>],
    ) -> Result<()> {
        let mut ids: Vec<u8> = task_ids.iter().copied().flatten().collect();
        ids.truncate(filenames.len());
        while ids.len() < filenames.len() {
            ids.push(DEFAULT_TASK_ID);
        }
        for (filename, task) in filenames.iter().zip(ids) {
            let file = program::resolve(filename.as_ref())?;
            self.load_program(&file.path, Some(task))?;
            self.farcall(Path::new(&file.file_name))?;
            self.dwell(self.config.short_pause);
            self.remove_program(Path::new(&file.file_name), Some(task))?;
            self.dwell(self.config.short_pause);
            self.blank();
            self.blank();
        }
        Ok(())
    }

    /// Encode an ordered tool path into movement instructions.
    ///
    /// Coordinates run through the transform pipeline; the pass is strictly
    /// linear and in input order. Whenever a waypoint requests a shutter
    /// state different from the tracked one, the transition (bracketed by
    /// settle dwells) is emitted before the move that carries the new
    /// state.
    pub fn write(&mut self, points: &[Waypoint]) -> Result<()> {
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        let zs: Vec<f64> = points.iter().map(|p| p.z).collect();
        let (xt, yt, zt) = self.transform.apply(&xs, &ys, &zs);

        for (i, point) in points.iter().enumerate() {
            let current = if self.shutter_on {
                ShutterState::On
            } else {
                ShutterState::Off
            };
            if point.shutter != current {
                self.blank();
                self.dwell(self.config.short_pause);
                self.shutter(point.shutter);
                self.dwell(self.config.long_pause);
                self.blank();
            }
            let args = self.motion_args(
                Some(f64::from(xt[i])),
                Some(f64::from(yt[i])),
                Some(f64::from(zt[i])),
                Some(point.feed),
            )?;
            self.push(format!("G1 {args}"));
        }
        self.dwell(self.config.long_pause);
        self.blank();
        Ok(())
    }

    /// Encode a 3D path as plain `LINEAR` moves, without shutter handling.
    /// The feed rate is emitted on the first move only and persists
    /// modally.
    pub fn write_path(&mut self, x: &[f64], y: &[f64], z: &[f64], feed: f64) -> Result<()> {
        let (xt, yt, zt) = self.transform.apply(x, y, z);
        for i in 0..xt.len() {
            let f = if i == 0 { Some(feed) } else { None };
            let args = self.motion_args(
                Some(f64::from(xt[i])),
                Some(f64::from(yt[i])),
                Some(f64::from(zt[i])),
                f,
            )?;
            self.push(format!("LINEAR {args}"));
        }
        Ok(())
    }

    /// Planar variant of [`write_path`](Self::write_path) for paths whose
    /// depth is controlled elsewhere (e.g. by the caller's Z variable).
    pub fn write_path_xy(&mut self, x: &[f64], y: &[f64], feed: f64) -> Result<()> {
        let (xt, yt) = self.transform.apply_xy(x, y);
        for i in 0..xt.len() {
            let f = if i == 0 { Some(feed) } else { None };
            let args =
                self.motion_args(Some(f64::from(xt[i])), Some(f64::from(yt[i])), None, f)?;
            self.push(format!("LINEAR {args}"));
        }
        Ok(())
    }

    /// Serialize the accumulated instructions to the output artifact and
    /// clear the in-memory buffers. Dwell time and shutter state persist.
    ///
    /// The artifact name is the explicit `filename`, else the configured
    /// one; the `.pgm` extension is enforced either way.
    pub fn close(&mut self, filename: Option<&Path>) -> Result<PathBuf> {
        let named = match filename {
            Some(f) => f.to_path_buf(),
            None => self
                .config
                .filename
                .as_ref()
                .map(PathBuf::from)
                .ok_or(GcodeError::MissingOutputName)?,
        };
        let mut path = named;
        if !path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(program::PGM_EXTENSION))
        {
            path.set_extension(program::PGM_EXTENSION);
        }
        if let Some(dir) = &self.config.export_dir {
            std::fs::create_dir_all(dir)?;
            path = dir.join(path);
        }

        let mut contents = String::new();
        for line in self.preamble.iter().chain(self.body.iter()) {
            contents.push_str(line);
            contents.push('\n');
        }
        std::fs::write(&path, contents)?;
        self.preamble.clear();
        self.body.clear();
        info!(path = %path.display(), "g-code compilation completed");
        Ok(path)
    }

    /// Total pause time accumulated so far, loop multipliers included.
    pub fn dwell_time(&self) -> f64 {
        self.total_dwell_time
    }

    /// Is the shutter currently tracked as open?
    pub fn shutter_is_open(&self) -> bool {
        self.shutter_on
    }

    /// Current movement-command coordinate interpretation.
    pub fn move_mode(&self) -> MoveMode {
        self.mode
    }

    /// Stems of the auxiliary programs currently loaded.
    pub fn loaded_programs(&self) -> &[String] {
        self.registry.loaded()
    }

    /// The configuration this compiler was built from.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    fn resolve_speed(&self, speed: Option<f64>) -> Result<f64> {
        speed
            .or(self.config.speed_pos)
            .ok_or(GcodeError::MissingPositioningSpeed)
    }

    /// Format `X.. Y.. Z.. F..` arguments at the configured precision,
    /// skipping absent coordinates and validating the feed rate.
    fn motion_args(
        &self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        f: Option<f64>,
    ) -> Result<String> {
        let digits = self.config.output_digits;
        let mut args = Vec::new();
        if let Some(x) = x {
            args.push(format!("X{x:.digits$}"));
        }
        if let Some(y) = y {
            args.push(format!("Y{y:.digits$}"));
        }
        if let Some(z) = z {
            args.push(format!("Z{z:.digits$}"));
        }
        if let Some(f) = f {
            if f <= self.config.min_feed() {
                return Err(GcodeError::FeedRateTooLow(f));
            }
            args.push(format!("F{f:.digits$}"));
        }
        Ok(args.join(" "))
    }

    fn push(&mut self, line: impl Into<String>) {
        self.body.push(line.into());
    }

    fn blank(&mut self) {
        self.body.push(String::new());
    }
}
