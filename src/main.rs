use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use image::{ImageFormat, Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};

use vlips_simulation::metadata::{read_metadata, replace_in_user_comment};
use vlips_simulation::settings::Settings;
use vlips_simulation::simulation::Simulation;
use vlips_simulation::sweep::{run_sweep, RenderError, Renderer, Sweep, SweepOutcome, SweepPlan};

/// Camera rig simulation for visible light indoor positioning
#[derive(Parser, Debug)]
#[command(name = "vlips")]
#[command(about = "Plan camera sweeps and inspect render metadata")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the output files of the camera movement
    Plan {
        /// Settings file
        settings: PathBuf,
    },

    /// List the output files of the FOV corners scan
    Corners {
        /// Settings file
        settings: PathBuf,
    },

    /// Show the field of view of the configured camera
    Fov {
        /// Settings file
        settings: PathBuf,
    },

    /// Print the simulation metadata of a render
    Read {
        /// Rendered JPEG
        image: PathBuf,
    },

    /// Patch the metadata text of a render
    Replace {
        /// Rendered JPEG
        image: PathBuf,

        /// Text to look for
        old: String,

        /// Replacement text
        new: String,
    },

    /// Run the camera movement with flat frames
    Stamp {
        /// Settings file
        settings: PathBuf,
    },
}

/// Uniform grey frames at the camera resolution. Lets the sweep and the
/// metadata pipeline run without a 3D renderer.
struct FlatFrameRenderer;

impl Renderer for FlatFrameRenderer {
    fn render(&mut self, simulation: &Simulation, path: &Path) -> Result<(), RenderError> {
        let camera = simulation
            .camera()
            .map_err(|error| RenderError::Failed(error.to_string()))?;
        let (width, height) = camera.oriented_resolution();
        let img = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
        img.save_with_format(path, ImageFormat::Jpeg)?;
        Ok(())
    }
}

fn load_simulation(path: &Path) -> Result<Simulation, String> {
    let settings = Settings::load(path).map_err(|error| error.to_string())?;
    let mut simulation = Simulation::new(settings).map_err(|error| error.to_string())?;
    simulation.create_scene().map_err(|error| error.to_string())?;
    Ok(simulation)
}

fn plan(path: &Path) -> Result<(), String> {
    let simulation = load_simulation(path)?;
    let plan = SweepPlan::camera_movement(&simulation).map_err(|error| error.to_string())?;
    for step in &plan.steps {
        println!("{}", step.path.display());
    }
    Ok(())
}

fn corners(path: &Path) -> Result<(), String> {
    let simulation = load_simulation(path)?;
    let plan = SweepPlan::fov_corners(&simulation).map_err(|error| error.to_string())?;
    for step in &plan.steps {
        println!("{:>10.1} {:>10.1}  {}", step.x, step.y, step.path.display());
    }
    Ok(())
}

fn fov(path: &Path) -> Result<(), String> {
    let simulation = load_simulation(path)?;
    let fov = simulation.fov().map_err(|error| error.to_string())?;
    println!("beacon distance: {} mm", fov.beacon_distance);
    for (kind, rectangle) in fov.iter() {
        match rectangle.tiles {
            Some((x, y)) => println!(
                "{:<16} {:>10.1} x {:<10.1} mm ({x} x {y} tiles)",
                kind.display_name(),
                rectangle.width,
                rectangle.height
            ),
            None => println!(
                "{:<16} {:>10.1} x {:<10.1} mm",
                kind.display_name(),
                rectangle.width,
                rectangle.height
            ),
        }
    }
    for (_, text) in simulation.labels() {
        println!("{text}");
    }
    Ok(())
}

fn read(path: &Path) -> Result<(), String> {
    let metadata = read_metadata(path).map_err(|error| error.to_string())?;
    let text = serde_json::to_string_pretty(&metadata).map_err(|error| error.to_string())?;
    println!("{text}");
    Ok(())
}

fn stamp(path: &Path) -> Result<(), String> {
    let mut simulation = load_simulation(path)?;
    let mut sweep = Sweep::camera_movement(&simulation).map_err(|error| error.to_string())?;

    let progress = ProgressBar::new(sweep.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map_err(|error| error.to_string())?
            .progress_chars("=>-"),
    );
    let outcome = run_sweep(
        &mut sweep,
        &mut simulation,
        &mut FlatFrameRenderer,
        |done, _, path| {
            progress.set_position(done as u64);
            progress.set_message(path.display().to_string());
        },
        || false,
    );
    progress.finish_and_clear();
    match outcome {
        SweepOutcome::Succeeded(message) => {
            log::info!("{message}");
            eprintln!("{message}");
            Ok(())
        }
        SweepOutcome::Cancelled(message) | SweepOutcome::Failed(message) => Err(message),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let result = match &args.command {
        Command::Plan { settings } => plan(settings),
        Command::Corners { settings } => corners(settings),
        Command::Fov { settings } => fov(settings),
        Command::Read { image } => read(image),
        Command::Replace { image, old, new } => {
            replace_in_user_comment(image, old, new).map_err(|error| error.to_string())
        }
        Command::Stamp { settings } => stamp(settings),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("{message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
