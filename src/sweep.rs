use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{software_name, SETTINGS_FILE_NAME};
use crate::fov::{corner_steps, FieldOfView};
use crate::geometry::Fp;
use crate::metadata::{embed_metadata, MetadataError};
use crate::movement::{enumerate_steps, FixedPlacement, MovementError};
use crate::output_path::OutputLayout;
use crate::simulation::{CameraState, Simulation, SimulationError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Produces the image for the current state of a simulation. The image must
/// be a JPEG written at `path`; metadata is embedded afterwards.
pub trait Renderer {
    fn render(&mut self, simulation: &Simulation, path: &Path) -> Result<(), RenderError>;
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Movement(#[from] MovementError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("cannot create directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    /// Index of the next step to run.
    Running(usize),
    Cancelled,
    Completed,
    Failed,
}

impl SweepState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SweepState::Cancelled | SweepState::Completed | SweepState::Failed
        )
    }
}

/// A camera placement together with the file it renders to.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedStep {
    pub x: Fp,
    pub y: Fp,
    pub beacon_distance: Fp,
    pub rotation_x_angle: Fp,
    pub rotation_z_angle: Fp,
    pub path: PathBuf,
}

/// Binary outcome of a sweep with a message for the user.
#[derive(Clone, Debug, PartialEq)]
pub enum SweepOutcome {
    Succeeded(String),
    Cancelled(String),
    Failed(String),
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepOutcome::Succeeded(message)
            | SweepOutcome::Cancelled(message)
            | SweepOutcome::Failed(message) => f.write_str(message),
        }
    }
}

/// Step-at-a-time render loop. Each call to [`Sweep::next_step`] places the
/// camera, renders and embeds metadata for exactly one planned step. The
/// camera is saved when the sweep is planned and put back when it ends.
#[derive(Debug)]
pub struct Sweep {
    steps: Vec<PlannedStep>,
    state: SweepState,
    saved: CameraState,
    software: String,
}

fn create_dir(path: &Path) -> Result<(), SweepError> {
    fs::create_dir_all(path).map_err(|source| SweepError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn output_base(simulation: &Simulation) -> Result<PathBuf, MovementError> {
    let output_path = &simulation.settings().camera_movement.output_path;
    if output_path.trim().is_empty() {
        return Err(MovementError::EmptyOutputPath);
    }
    Ok(PathBuf::from(output_path))
}

/// Every step of a sweep with its output file, computed without touching the
/// disk or the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepPlan {
    pub base: PathBuf,
    pub steps: Vec<PlannedStep>,
}

impl SweepPlan {
    /// The configured distance, rotation and FOV grid sweep.
    pub fn camera_movement(simulation: &Simulation) -> Result<SweepPlan, SweepError> {
        log::info!("Plan camera movement");
        let movement = &simulation.settings().camera_movement;
        let request = movement.request();
        request.validate()?;
        let base = output_base(simulation)?;

        let camera = simulation.camera()?;
        let beacon = simulation.beacon()?;
        let scene = simulation.scene();
        let fixed = FixedPlacement {
            x: camera.location.x,
            y: camera.location.y,
            beacon_distance: simulation.beacon_distance(),
            rotation_x_angle: camera.rotation_x_angle,
            rotation_z_angle: camera.rotation_z_angle,
        };
        let steps = enumerate_steps(&request, &fixed, scene.tile_side, |distance| {
            FieldOfView::compute(camera, beacon, scene, distance)
        })?;

        let layout = OutputLayout::new(&base, &movement.file_prefix, request.axes, steps.len());
        let steps = steps
            .iter()
            .enumerate()
            .map(|(index, step)| PlannedStep {
                x: step.location.x,
                y: step.location.y,
                beacon_distance: step.beacon_distance,
                rotation_x_angle: step.rotation_x_angle,
                rotation_z_angle: step.rotation_z_angle,
                path: layout.movement_path(index, step),
            })
            .collect();
        Ok(SweepPlan { base, steps })
    }

    /// The four corners of every FOV rectangle at the current camera height.
    pub fn fov_corners(simulation: &Simulation) -> Result<SweepPlan, SweepError> {
        log::info!("Plan FOV corners scan");
        let base = output_base(simulation)?;
        let camera = simulation.camera()?;
        let corners = corner_steps(simulation.fov()?, camera.location.z);

        let layout = OutputLayout::new(
            &base,
            &simulation.settings().camera_movement.file_prefix,
            Default::default(),
            corners.len(),
        );
        let steps = corners
            .iter()
            .enumerate()
            .map(|(index, corner)| PlannedStep {
                x: corner.location.x,
                y: corner.location.y,
                beacon_distance: simulation.beacon_distance(),
                rotation_x_angle: camera.rotation_x_angle,
                rotation_z_angle: camera.rotation_z_angle,
                path: layout.corner_path(index, corner),
            })
            .collect();
        Ok(SweepPlan { base, steps })
    }
}

impl Sweep {
    /// Plans and starts the camera movement. Nothing is touched when the
    /// configuration is rejected.
    pub fn camera_movement(simulation: &Simulation) -> Result<Sweep, SweepError> {
        Sweep::start(simulation, SweepPlan::camera_movement(simulation)?)
    }

    pub fn fov_corners(simulation: &Simulation) -> Result<Sweep, SweepError> {
        Sweep::start(simulation, SweepPlan::fov_corners(simulation)?)
    }

    /// Saves the camera state, creates the output directory and writes the
    /// settings into it.
    pub fn start(simulation: &Simulation, plan: SweepPlan) -> Result<Sweep, SweepError> {
        let saved = simulation.camera_state()?;
        create_dir(&plan.base)?;
        simulation.save_settings(&plan.base.join(SETTINGS_FILE_NAME))?;
        log::info!("{} steps planned into {}", plan.steps.len(), plan.base.display());
        Ok(Sweep {
            steps: plan.steps,
            state: SweepState::Idle,
            saved,
            software: software_name(),
        })
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Runs one step. A failure restores the camera and leaves the sweep in
    /// the `Failed` state; calling again after the end is a no-op.
    pub fn next_step(
        &mut self,
        simulation: &mut Simulation,
        renderer: &mut dyn Renderer,
    ) -> Result<SweepState, SweepError> {
        let index = match self.state {
            SweepState::Idle => 0,
            SweepState::Running(index) => index,
            finished => return Ok(finished),
        };
        let Some(step) = self.steps.get(index) else {
            self.finish(simulation, SweepState::Completed)?;
            return Ok(self.state);
        };

        if let Err(error) = self.render_step(simulation, renderer, step.clone()) {
            log::error!("step {} failed: {error}", index + 1);
            if let Err(restore) = self.finish(simulation, SweepState::Failed) {
                log::error!("cannot restore the camera: {restore}");
            }
            return Err(error);
        }

        let next = index + 1;
        if next == self.steps.len() {
            self.finish(simulation, SweepState::Completed)?;
        } else {
            self.state = SweepState::Running(next);
        }
        Ok(self.state)
    }

    fn render_step(
        &self,
        simulation: &mut Simulation,
        renderer: &mut dyn Renderer,
        step: PlannedStep,
    ) -> Result<(), SweepError> {
        log::debug!("step: {step:?}");
        simulation.place_camera(
            step.x,
            step.y,
            step.beacon_distance,
            step.rotation_x_angle,
            step.rotation_z_angle,
        )?;
        if let Some(parent) = step.path.parent() {
            create_dir(parent)?;
        }
        render_scene(simulation, renderer, &step.path, &self.software)
    }

    /// Stops before the next step. Files already rendered stay in place.
    pub fn cancel(&mut self, simulation: &mut Simulation) -> Result<SweepState, SweepError> {
        if !self.state.is_finished() {
            log::warn!("Render cancelled");
            self.finish(simulation, SweepState::Cancelled)?;
        }
        Ok(self.state)
    }

    fn finish(&mut self, simulation: &mut Simulation, state: SweepState) -> Result<(), SweepError> {
        self.state = state;
        simulation.restore_camera_state(self.saved.clone())?;
        Ok(())
    }
}

/// Renders the current state to `path` and embeds its metadata.
pub fn render_scene(
    simulation: &Simulation,
    renderer: &mut dyn Renderer,
    path: &Path,
    software: &str,
) -> Result<(), SweepError> {
    log::info!("Render scene to {}", path.display());
    renderer.render(simulation, path)?;
    let metadata = simulation.render_metadata(software)?;
    embed_metadata(path, &metadata)?;
    Ok(())
}

/// One-off render of the current placement. The settings are saved next to
/// the image so the render can be reproduced.
pub fn render_single(
    simulation: &Simulation,
    renderer: &mut dyn Renderer,
    path: &Path,
) -> Result<(), SweepError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    create_dir(directory)?;
    simulation.save_settings(&directory.join(SETTINGS_FILE_NAME))?;
    render_scene(simulation, renderer, path, &software_name())
}

/// Drives `sweep` to the end in a plain loop. `should_cancel` is polled
/// between steps and `progress` called after every rendered step.
pub fn run_sweep<P, C>(
    sweep: &mut Sweep,
    simulation: &mut Simulation,
    renderer: &mut dyn Renderer,
    mut progress: P,
    mut should_cancel: C,
) -> SweepOutcome
where
    P: FnMut(usize, usize, &Path),
    C: FnMut() -> bool,
{
    let total = sweep.len();
    loop {
        if should_cancel() {
            return match sweep.cancel(simulation) {
                Ok(_) => SweepOutcome::Cancelled("Render cancelled".to_string()),
                Err(error) => SweepOutcome::Failed(error.to_string()),
            };
        }
        let index = match sweep.state() {
            SweepState::Running(index) => index,
            _ => 0,
        };
        match sweep.next_step(simulation, renderer) {
            Ok(state) => {
                if let Some(step) = sweep.steps().get(index) {
                    progress(index + 1, total, &step.path);
                }
                if state == SweepState::Completed {
                    log::info!("Render finished");
                    return SweepOutcome::Succeeded(format!("{total} renders finished"));
                }
            }
            Err(error) => return SweepOutcome::Failed(error.to_string()),
        }
    }
}
