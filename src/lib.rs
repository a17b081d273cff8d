extern crate nalgebra as na;

pub mod constants;
pub mod exif;
pub mod fov;
pub mod geometry;
pub mod metadata;
pub mod movement;
pub mod output_path;
pub mod settings;
pub mod simulation;
pub mod sweep;
