//! subdiv-curtain CLI - scripted subdivision and curtain edits.
//!
//! Usage: subdiv-curtain <COMMAND> [OPTIONS]
//!
//! Run `subdiv-curtain --help` for available commands. Set `RUST_LOG=debug`
//! for solver and level details.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};

use subdiv_curtain::algo::subdivide::{catmull_clark_subdivide_with_progress, SubdivideOptions};
use subdiv_curtain::algo::Progress;
use subdiv_curtain::mesh::{primitives, HalfEdgeMesh};
use subdiv_curtain::nalgebra::{Point3, Vector3};
use subdiv_curtain::session::{Intent, Outcome, RenderStyle, Session, SessionConfig};
use subdiv_curtain::view::RecordingSink;

#[derive(Parser)]
#[command(name = "subdiv-curtain")]
#[command(author, version, about = "Subdivision surface curtain editing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subdivide a built-in shape and report each level
    Subdivide {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Number of subdivision iterations
        #[arg(short, long, default_value = "2")]
        iterations: usize,

        /// Let open boundaries shrink instead of following the boundary rules
        #[arg(long)]
        move_boundary: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Paint a curtain across the top of a shape and lift the surface to a
    /// stroke drawn on it
    Sculpt {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Subdivision level to edit
        #[arg(short, long, default_value = "2")]
        level: usize,

        /// Height of the stroke above the surface
        #[arg(long, default_value = "0.15")]
        lift: f64,

        /// Curtain height
        #[arg(long, default_value = "1.0")]
        curtain_height: f64,

        /// Arc-length resampling step
        #[arg(long, default_value = "0.1")]
        delta_s: f64,

        /// Rings around the moved vertices used for smoothing
        #[arg(long, default_value = "2")]
        laplacian_distance: usize,

        /// Smoothing weight (0.0 to 1.0)
        #[arg(long, default_value = "0.9")]
        laplacian_weight: f64,

        /// Number of coarser levels the edit moves
        #[arg(long, default_value = "1")]
        effect_levels: usize,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Args)]
struct ShapeArgs {
    /// Base shape
    #[arg(long, value_enum, default_value = "cube-grid")]
    shape: Shape,

    /// Edge length of the cube, or grid spacing
    #[arg(long, default_value = "2.0")]
    size: f64,

    /// Segments per side
    #[arg(long, default_value = "8")]
    segments: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Shape {
    /// Eight-vertex cube
    Cube,
    /// Cube with a quad lattice on each side
    CubeGrid,
    /// Open flat quad grid in the z = 0 plane
    Grid,
}

impl ShapeArgs {
    fn build(&self) -> subdiv_curtain::error::Result<HalfEdgeMesh> {
        match self.shape {
            Shape::Cube => primitives::cube(self.size),
            Shape::CubeGrid => primitives::cube_grid(self.size, self.segments),
            Shape::Grid => primitives::quad_grid(self.segments, self.segments, self.size / self.segments.max(1) as f64),
        }
    }

    /// Height of the surface the scripted strokes are painted on.
    fn top(&self) -> f64 {
        match self.shape {
            Shape::Cube | Shape::CubeGrid => self.size / 2.0,
            Shape::Grid => 0.0,
        }
    }

    /// Centre of the top surface in x and y.
    fn centre(&self) -> (f64, f64) {
        match self.shape {
            Shape::Cube | Shape::CubeGrid => (0.0, 0.0),
            Shape::Grid => (self.size / 2.0, self.size / 2.0),
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Subdivide {
            shape,
            iterations,
            move_boundary,
            sequential,
        } => {
            cmd_subdivide(&shape, iterations, move_boundary, sequential)?;
        }

        Commands::Sculpt {
            shape,
            level,
            lift,
            curtain_height,
            delta_s,
            laplacian_distance,
            laplacian_weight,
            effect_levels,
            sequential,
        } => {
            let config = SessionConfig::default()
                .with_curtain_height(curtain_height)
                .with_delta_s(delta_s)
                .with_laplacian_distance(laplacian_distance)
                .with_laplacian_weight(laplacian_weight)
                .with_effect_levels(effect_levels)
                .with_parallel(!sequential);
            cmd_sculpt(&shape, level, lift, config)?;
        }
    }

    Ok(())
}

/// Create a progress reporter that draws a bar on stderr.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let percent = if current >= total { 100 } else { (current * 100) / total };

        // Never move backwards
        let previous = max_percent.fetch_max(percent, Ordering::Relaxed);
        if percent <= previous && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        eprint!(
            "\r[{}{}] {:3}% {}",
            "=".repeat(filled),
            " ".repeat(bar_width - filled),
            percent,
            message
        );
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_subdivide(
    shape: &ShapeArgs,
    iterations: usize,
    move_boundary: bool,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = shape.build()?;
    println!("Base: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());

    let options = SubdivideOptions::default()
        .with_preserve_boundary(!move_boundary)
        .with_parallel(!sequential);
    let mode = if sequential { "sequential" } else { "parallel" };
    println!("Applying Catmull-Clark subdivision ({} iterations, {})...", iterations, mode);

    let start = Instant::now();
    let steps = catmull_clark_subdivide_with_progress(&mesh, iterations, &options, &create_progress())?;
    let elapsed = start.elapsed();

    for (i, step) in steps.iter().enumerate() {
        let worst = (0..step.mesh.num_vertices())
            .map(|v| (step.contributions.weight_sum(v) - 1.0).abs())
            .fold(0.0, f64::max);
        println!(
            "Level {}: {} vertices, {} faces, {} contributions, max weight error {:.2e}",
            i + 1,
            step.mesh.num_vertices(),
            step.mesh.num_faces(),
            step.contributions.len(),
            worst
        );
    }
    println!("Time: {:.3}s", elapsed.as_secs_f64());

    Ok(())
}

fn cmd_sculpt(
    shape: &ShapeArgs,
    level: usize,
    lift: f64,
    config: SessionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = shape.build()?;
    let top = shape.top();
    let (cx, cy) = shape.centre();
    let span = shape.size * 0.15;

    let mut session = Session::new(mesh, config).with_progress(create_progress());
    report(session.dispatch(Intent::SubdivisionLevelChanged(level))?);

    // Straight down onto the top surface
    let down = |x: f64| Intent::RaycastRequested {
        origin: Point3::new(x, cy + 0.02 * shape.size, top + 5.0),
        direction: -Vector3::z(),
    };
    report(session.dispatch(Intent::StrokeBegan)?);
    report(session.dispatch(down(cx - span))?);
    report(session.dispatch(down(cx + span))?);
    report(session.dispatch(Intent::StrokeEnded)?);

    // Across the curtain, `lift` above the surface
    let across = |x: f64| Intent::RaycastRequested {
        origin: Point3::new(x, cy + 5.0, top + lift),
        direction: -Vector3::y(),
    };
    let start = Instant::now();
    report(session.dispatch(Intent::StrokeBegan)?);
    report(session.dispatch(across(cx - 0.8 * span))?);
    report(session.dispatch(across(cx + 0.8 * span))?);
    report(session.dispatch(Intent::StrokeEnded)?);
    println!("Time: {:.3}s", start.elapsed().as_secs_f64());

    let mut sink = RecordingSink::default();
    session.render(&mut sink, &RenderStyle::default())?;
    println!(
        "Frame: {} uploads ({} bytes), {} draws",
        sink.uploads.len(),
        sink.bytes,
        sink.draws.len()
    );

    Ok(())
}

fn report(outcome: Outcome) {
    match outcome {
        Outcome::LevelReady { level, vertices, faces } => {
            println!("Level {}: {} vertices, {} faces", level, vertices, faces);
        }
        Outcome::CurtainBuilt { points } => println!("Curtain built from {} points", points),
        Outcome::Deformed(report) => println!(
            "Deformed level {} through level {}: {} vertices moved, max offset {:.4}",
            report.level,
            report.coarse_level,
            report.displacement.len(),
            report.displacement.max_offset()
        ),
        Outcome::Ignored(reason) => println!("Ignored: {}", reason),
        _ => {}
    }
}
