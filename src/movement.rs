use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{MAX_AXIS_VALUES, MAX_SWEEP_STEPS};
use crate::fov::FieldOfView;
use crate::geometry::{round_to_precision, Fp, Vec3f, EPS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SweepAxis {
    FovScan,
    BeaconDistance,
    RotationXAngle,
    RotationZAngle,
}

impl SweepAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepAxis::FovScan => "fov_scan",
            SweepAxis::BeaconDistance => "beacon_distance",
            SweepAxis::RotationXAngle => "rotation_x_angle",
            SweepAxis::RotationZAngle => "rotation_z_angle",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MovementError {
    #[error("no camera movement selected")]
    NoAxisEnabled,
    #[error("output path is empty")]
    EmptyOutputPath,
    #[error("{} step must be different from 0", .0.as_str())]
    ZeroStep(SweepAxis),
    #[error("{} range from {start} to {end} with step {step} is empty", .axis.as_str())]
    EmptyRange {
        axis: SweepAxis,
        start: Fp,
        end: Fp,
        step: Fp,
    },
    #[error("{} expands to more than {limit} values", .axis.as_str())]
    TooManyValues { axis: SweepAxis, limit: usize },
    #[error("camera movement has more than {limit} steps")]
    TooManySteps { limit: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub start: Fp,
    pub end: Fp,
    pub step: Fp,
}

impl AxisRange {
    pub fn new(start: Fp, end: Fp, step: Fp) -> Self {
        AxisRange { start, end, step }
    }

    /// Number of values in `start, start + step, ...` below `end + step`. The
    /// slack keeps an exact multiple from adding a value past `end`. `None`
    /// when the count exceeds `MAX_AXIS_VALUES`.
    pub fn count(&self) -> Option<usize> {
        if self.step == 0.0 {
            return Some(0);
        }
        let slots = ((self.end - self.start) / self.step + 1.0 - EPS).ceil();
        if slots.is_nan() || slots <= 0.0 {
            Some(0)
        } else if slots > MAX_AXIS_VALUES as Fp {
            None
        } else {
            Some(slots as usize)
        }
    }

    /// The values themselves, each rounded to `DECIMAL_PRECISION`. Empty when
    /// `step` is zero or points away from `end`, `None` past the cap.
    pub fn values(&self) -> Option<Vec<Fp>> {
        let count = self.count()?;
        Some(
            (0..count)
                .map(|i| round_to_precision(self.start + i as Fp * self.step))
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnabledAxes {
    pub fov_scan: bool,
    pub beacon_distance: bool,
    pub rotation_x_angle: bool,
    pub rotation_z_angle: bool,
}

impl EnabledAxes {
    pub fn any(&self) -> bool {
        self.fov_scan || self.beacon_distance || self.rotation_x_angle || self.rotation_z_angle
    }

    pub fn is_enabled(&self, axis: SweepAxis) -> bool {
        match axis {
            SweepAxis::FovScan => self.fov_scan,
            SweepAxis::BeaconDistance => self.beacon_distance,
            SweepAxis::RotationXAngle => self.rotation_x_angle,
            SweepAxis::RotationZAngle => self.rotation_z_angle,
        }
    }
}

/// Which axes sweep and over which ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct MovementRequest {
    pub axes: EnabledAxes,
    pub beacon_distance: AxisRange,
    pub rotation_x_angle: AxisRange,
    pub rotation_z_angle: AxisRange,
}

/// Values used for every axis that does not sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedPlacement {
    pub x: Fp,
    pub y: Fp,
    pub beacon_distance: Fp,
    pub rotation_x_angle: Fp,
    pub rotation_z_angle: Fp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraMovementStep {
    /// x, y on the floor plane and the beacon distance as third component.
    pub location: Vec3f,
    pub grid_coordinates: (i64, i64),
    pub beacon_distance: Fp,
    pub rotation_x_angle: Fp,
    pub rotation_z_angle: Fp,
}

impl MovementRequest {
    /// Rejects configurations before anything is touched.
    pub fn validate(&self) -> Result<(), MovementError> {
        if !self.axes.any() {
            return Err(MovementError::NoAxisEnabled);
        }
        for (axis, range) in self.swept_ranges() {
            if range.step == 0.0 {
                return Err(MovementError::ZeroStep(axis));
            }
            match range.count() {
                None => {
                    return Err(MovementError::TooManyValues {
                        axis,
                        limit: MAX_AXIS_VALUES,
                    })
                }
                Some(0) => {
                    return Err(MovementError::EmptyRange {
                        axis,
                        start: range.start,
                        end: range.end,
                        step: range.step,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn swept_ranges(&self) -> impl Iterator<Item = (SweepAxis, &AxisRange)> {
        [
            (SweepAxis::BeaconDistance, &self.beacon_distance),
            (SweepAxis::RotationXAngle, &self.rotation_x_angle),
            (SweepAxis::RotationZAngle, &self.rotation_z_angle),
        ]
        .into_iter()
        .filter(|(axis, _)| self.axes.is_enabled(*axis))
    }

    fn axis_values(
        &self,
        axis: SweepAxis,
        range: &AxisRange,
        fixed: Fp,
    ) -> Result<Vec<Fp>, MovementError> {
        if !self.axes.is_enabled(axis) {
            return Ok(vec![fixed]);
        }
        range.values().ok_or(MovementError::TooManyValues {
            axis,
            limit: MAX_AXIS_VALUES,
        })
    }
}

/// Grid positions covering the even tile rectangle, top row first and left to
/// right inside a row.
pub fn grid_positions(fov: &FieldOfView, tile_side: Fp) -> Result<Vec<(Fp, Fp)>, MovementError> {
    let rectangle = &fov.even_tiles;
    let too_many = MovementError::TooManyValues {
        axis: SweepAxis::FovScan,
        limit: MAX_AXIS_VALUES,
    };
    let xs = AxisRange::new(-rectangle.width / 2.0, rectangle.width / 2.0, tile_side)
        .values()
        .ok_or_else(|| too_many.clone())?;
    let ys = AxisRange::new(rectangle.height / 2.0, -rectangle.height / 2.0, -tile_side)
        .values()
        .ok_or(too_many)?;
    if xs.len().saturating_mul(ys.len()) > MAX_SWEEP_STEPS {
        return Err(MovementError::TooManySteps {
            limit: MAX_SWEEP_STEPS,
        });
    }
    Ok(ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect())
}

/// Full ordered Cartesian product: distance, rotation X, rotation Z, then the
/// FOV grid. `fov_at` supplies the field of view for a beacon distance.
pub fn enumerate_steps<F>(
    request: &MovementRequest,
    fixed: &FixedPlacement,
    tile_side: Fp,
    fov_at: F,
) -> Result<Vec<CameraMovementStep>, MovementError>
where
    F: Fn(Fp) -> FieldOfView,
{
    request.validate()?;

    let distances = request.axis_values(
        SweepAxis::BeaconDistance,
        &request.beacon_distance,
        fixed.beacon_distance,
    )?;
    let rotations_x = request.axis_values(
        SweepAxis::RotationXAngle,
        &request.rotation_x_angle,
        fixed.rotation_x_angle,
    )?;
    let rotations_z = request.axis_values(
        SweepAxis::RotationZAngle,
        &request.rotation_z_angle,
        fixed.rotation_z_angle,
    )?;

    let mut steps = Vec::new();
    for &beacon_distance in &distances {
        let grid = if request.axes.fov_scan {
            grid_positions(&fov_at(beacon_distance), tile_side)?
        } else {
            vec![(fixed.x, fixed.y)]
        };
        for &rotation_x_angle in &rotations_x {
            for &rotation_z_angle in &rotations_z {
                if steps.len() + grid.len() > MAX_SWEEP_STEPS {
                    return Err(MovementError::TooManySteps {
                        limit: MAX_SWEEP_STEPS,
                    });
                }
                for &(x, y) in &grid {
                    steps.push(CameraMovementStep {
                        location: Vec3f::new(x, y, beacon_distance),
                        grid_coordinates: (
                            (x / tile_side).round() as i64,
                            (y / tile_side).round() as i64,
                        ),
                        beacon_distance,
                        rotation_x_angle,
                        rotation_z_angle,
                    });
                }
            }
        }
    }
    log::info!("Enumerated {} camera movement steps", steps.len());
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fixed() -> FixedPlacement {
        FixedPlacement {
            x: 0.0,
            y: 0.0,
            beacon_distance: 1000.0,
            rotation_x_angle: 0.0,
            rotation_z_angle: 0.0,
        }
    }

    fn request(axes: EnabledAxes) -> MovementRequest {
        MovementRequest {
            axes,
            beacon_distance: AxisRange::new(1000.0, 3000.0, 500.0),
            rotation_x_angle: AxisRange::new(0.0, 20.0, 10.0),
            rotation_z_angle: AxisRange::new(0.0, 90.0, 45.0),
        }
    }

    fn example_fov(beacon_distance: Fp) -> FieldOfView {
        FieldOfView::from_sensor(36.0, 24.0, 24.0, 100.0, 60.0, 50.0, beacon_distance)
    }

    fn values(start: Fp, end: Fp, step: Fp) -> Vec<Fp> {
        AxisRange::new(start, end, step).values().unwrap()
    }

    #[test]
    fn test_axis_range_inclusive() {
        assert_eq!(values(0.0, 30.0, 10.0), vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(values(5.0, 5.0, 1.0), vec![5.0]);
        assert_eq!(values(10.0, -10.0, -10.0), vec![10.0, 0.0, -10.0]);
    }

    #[test]
    fn test_axis_range_covers_end_past_partial_step() {
        assert_eq!(values(0.0, 25.0, 10.0), vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(values(1000.0, 2200.0, 500.0), vec![1000.0, 1500.0, 2000.0, 2500.0]);
        assert_eq!(values(30.0, 5.0, -10.0), vec![30.0, 20.0, 10.0, 0.0]);
    }

    #[test]
    fn test_axis_range_float_boundary() {
        let values = values(0.0, 0.3, 0.1);
        assert_eq!(values.len(), 4);
        assert_relative_eq!(values[3], 0.3);
    }

    #[test]
    fn test_axis_range_degenerate() {
        assert!(values(0.0, 10.0, 0.0).is_empty());
        assert!(values(0.0, 10.0, -1.0).is_empty());
    }

    #[test]
    fn test_axis_range_too_many_values() {
        let range = AxisRange::new(0.0, 1.0e10, 1.0e-290);
        assert_eq!(range.count(), None);
        assert_eq!(range.values(), None);

        let mut req = request(EnabledAxes {
            beacon_distance: true,
            ..Default::default()
        });
        req.beacon_distance = range;
        assert_eq!(
            enumerate_steps(&req, &fixed(), 50.0, example_fov),
            Err(MovementError::TooManyValues {
                axis: SweepAxis::BeaconDistance,
                limit: MAX_AXIS_VALUES,
            })
        );
    }

    #[test]
    fn test_grid_too_dense() {
        let req = request(EnabledAxes {
            fov_scan: true,
            ..Default::default()
        });
        // 0.01 mm tiles across a 1.4 m wide rectangle
        let dense = |distance| {
            FieldOfView::from_sensor(36.0, 24.0, 24.0, 100.0, 60.0, 0.01, distance)
        };
        assert_eq!(
            enumerate_steps(&req, &fixed(), 0.01, dense),
            Err(MovementError::TooManyValues {
                axis: SweepAxis::FovScan,
                limit: MAX_AXIS_VALUES,
            })
        );
    }

    #[test]
    fn test_no_axis_enabled() {
        let result = enumerate_steps(&request(EnabledAxes::default()), &fixed(), 50.0, example_fov);
        assert_eq!(result, Err(MovementError::NoAxisEnabled));
    }

    #[test]
    fn test_zero_step_only_matters_when_enabled() {
        let mut req = request(EnabledAxes {
            rotation_x_angle: true,
            ..Default::default()
        });
        req.beacon_distance.step = 0.0;
        assert!(enumerate_steps(&req, &fixed(), 50.0, example_fov).is_ok());

        req.axes.beacon_distance = true;
        assert_eq!(
            enumerate_steps(&req, &fixed(), 50.0, example_fov),
            Err(MovementError::ZeroStep(SweepAxis::BeaconDistance))
        );
    }

    #[test]
    fn test_empty_range_on_enabled_axis() {
        let mut req = request(EnabledAxes {
            rotation_z_angle: true,
            ..Default::default()
        });
        req.rotation_z_angle = AxisRange::new(90.0, 0.0, 15.0);
        assert!(matches!(
            enumerate_steps(&req, &fixed(), 50.0, example_fov),
            Err(MovementError::EmptyRange {
                axis: SweepAxis::RotationZAngle,
                ..
            })
        ));
    }

    #[test]
    fn test_distance_by_rotation_x() {
        let mut req = request(EnabledAxes {
            beacon_distance: true,
            rotation_x_angle: true,
            ..Default::default()
        });
        req.beacon_distance = AxisRange::new(1000.0, 3000.0, 500.0);
        req.rotation_x_angle = AxisRange::new(0.0, 20.0, 10.0);
        let steps = enumerate_steps(&req, &fixed(), 50.0, example_fov).unwrap();
        assert_eq!(steps.len(), 15);
        assert_eq!(steps[0].beacon_distance, 1000.0);
        assert_eq!(steps[0].rotation_x_angle, 0.0);
        assert_eq!(steps[1].rotation_x_angle, 10.0);
        assert_eq!(steps[3].beacon_distance, 1500.0);
        assert_eq!(steps[14].beacon_distance, 3000.0);
        assert_eq!(steps[14].rotation_x_angle, 20.0);
        assert!(steps.iter().all(|step| step.rotation_z_angle == 0.0));
        assert!(steps.iter().all(|step| step.grid_coordinates == (0, 0)));
    }

    #[test]
    fn test_step_count_is_product() {
        let req = request(EnabledAxes {
            beacon_distance: true,
            rotation_x_angle: true,
            rotation_z_angle: true,
            fov_scan: false,
        });
        let steps = enumerate_steps(&req, &fixed(), 50.0, example_fov).unwrap();
        assert_eq!(steps.len(), 5 * 3 * 3);
    }

    #[test]
    fn test_fov_grid_order() {
        let req = request(EnabledAxes {
            fov_scan: true,
            ..Default::default()
        });
        let steps = enumerate_steps(&req, &fixed(), 50.0, example_fov).unwrap();
        // 28 x 18 even tiles -> 29 x 19 grid nodes
        assert_eq!(steps.len(), 29 * 19);
        assert_eq!(steps[0].grid_coordinates, (-14, 9));
        assert_eq!(steps[0].location, Vec3f::new(-700.0, 450.0, 1000.0));
        assert_eq!(steps[1].grid_coordinates, (-13, 9));
        assert_eq!(steps[28].grid_coordinates, (14, 9));
        assert_eq!(steps[29].grid_coordinates, (-14, 8));
        assert_eq!(steps.last().unwrap().grid_coordinates, (14, -9));
    }

    #[test]
    fn test_fov_recomputed_per_distance() {
        let mut req = request(EnabledAxes {
            fov_scan: true,
            beacon_distance: true,
            ..Default::default()
        });
        req.beacon_distance = AxisRange::new(1000.0, 2000.0, 1000.0);
        let steps = enumerate_steps(&req, &fixed(), 50.0, example_fov).unwrap();
        let near = steps.iter().filter(|step| step.beacon_distance == 1000.0).count();
        let far = steps.iter().filter(|step| step.beacon_distance == 2000.0).count();
        assert_eq!(near, 29 * 19);
        assert!(far > near);
        assert_eq!(near + far, steps.len());
    }

    #[test]
    fn test_collapsed_fov_yields_centre_only() {
        let req = request(EnabledAxes {
            fov_scan: true,
            ..Default::default()
        });
        let steps = enumerate_steps(&req, &fixed(), 50.0, |_| example_fov(10.0)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].grid_coordinates, (0, 0));
    }
}
