use std::path::{Path, PathBuf};

use crate::constants::RENDER_FILE_EXTENSION;
use crate::fov::CornerStep;
use crate::geometry::Fp;
use crate::movement::{CameraMovementStep, EnabledAxes};

/// Digit width of the largest index of a run with `step_count` steps.
pub fn index_digits(step_count: usize) -> usize {
    step_count.saturating_sub(1).max(1).to_string().len()
}

fn signed_segment(name: &str, value: Fp) -> String {
    format!("{}_{:+}", name, value.trunc() as i64)
}

fn file_stem(prefix: &str, index: usize, digits: usize) -> String {
    if prefix.is_empty() {
        format!("{index:0digits$}")
    } else {
        format!("{prefix}_{index:0digits$}")
    }
}

/// Deterministic file naming for one run. Built once the step count is known,
/// so padding never overflows.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputLayout {
    pub base: PathBuf,
    pub file_prefix: String,
    pub axes: EnabledAxes,
    pub digits: usize,
}

impl OutputLayout {
    pub fn new(base: &Path, file_prefix: &str, axes: EnabledAxes, step_count: usize) -> Self {
        OutputLayout {
            base: base.to_path_buf(),
            file_prefix: file_prefix.to_string(),
            axes,
            digits: index_digits(step_count),
        }
    }

    pub fn movement_path(&self, index: usize, step: &CameraMovementStep) -> PathBuf {
        let mut path = self.base.clone();
        if self.axes.beacon_distance {
            path.push(signed_segment("distance", step.beacon_distance));
        }
        if self.axes.rotation_x_angle {
            path.push(signed_segment("rotation_x", step.rotation_x_angle));
        }
        if self.axes.rotation_z_angle {
            path.push(signed_segment("rotation_z", step.rotation_z_angle));
        }

        let mut name = file_stem(&self.file_prefix, index, self.digits);
        if self.axes.fov_scan {
            let (grid_x, grid_y) = step.grid_coordinates;
            name.push_str(&format!("_{grid_x:+}_{grid_y:+}"));
        }
        path.push(format!("{name}.{RENDER_FILE_EXTENSION}"));
        path
    }

    pub fn corner_path(&self, index: usize, step: &CornerStep) -> PathBuf {
        let name = file_stem(&self.file_prefix, index, self.digits);
        self.base.join(format!(
            "{}_{}_{}.{}",
            name,
            step.fov.label(),
            step.corner.label(),
            RENDER_FILE_EXTENSION
        ))
    }

    pub fn movement_paths(&self, steps: &[CameraMovementStep]) -> Vec<PathBuf> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.movement_path(index, step))
            .collect()
    }

    pub fn corner_paths(&self, steps: &[CornerStep]) -> Vec<PathBuf> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.corner_path(index, step))
            .collect()
    }
}
