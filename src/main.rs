use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use forcelayout::clock::{ManualClock, SystemClock};
use forcelayout::config::Parameters;
use forcelayout::graph::Branch;
use forcelayout::io::{self, Positions};
use forcelayout::renderer::LogRenderer;
use forcelayout::scheduler::{FrameLoop, TokioScheduler};
use forcelayout::system::ParticleSystem;

/// Frame cap when none is given
const DEFAULT_MAX_FRAMES: u64 = 5000;

/// Force-directed layout for graphs.
#[derive(Parser)]
#[command(name = "forcelayout")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a graph and write node positions
    Layout {
        /// Graph description (.json, .yaml, .yml)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write positions; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Simulation parameters (.json, .yaml, .yml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many frames even if the layout is still moving
        #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
        max_frames: u64,

        /// Run the engine on its own task in real time
        #[arg(long)]
        threaded: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forcelayout=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_inputs(input: &Path, config: Option<&Path>) -> anyhow::Result<(Branch, Parameters)> {
    let branch = io::load_branch(input)
        .with_context(|| format!("failed to load graph from {}", input.display()))?;
    let params = match config {
        Some(path) => io::load_parameters(path)
            .with_context(|| format!("failed to load parameters from {}", path.display()))?,
        None => Parameters::default(),
    };
    Ok((branch, params))
}

/// Step the engine in-process against a manual clock, one frame interval at
/// a time, until nothing moves
fn layout_inline(branch: &Branch, params: Parameters, max_frames: u64) -> Positions {
    let clock = Arc::new(ManualClock::new());
    let interval = params.frame_interval();

    let mut system = ParticleSystem::inline(params, clock.clone());
    system.set_renderer(Box::new(LogRenderer::new()));
    let diff = system.graft(branch);
    tracing::debug!(
        nodes = diff.added_nodes.len(),
        edges = diff.added_edges.len(),
        "grafted graph"
    );
    system.flush();

    let mut frames = 0;
    while frames < max_frames {
        frames += 1;
        if !system.frame() && !system.has_pending_changes() {
            break;
        }
        clock.advance(interval);
    }

    tracing::info!(
        frames,
        energy = system.energy().settle_measure(),
        "layout finished"
    );
    io::collect_positions(&system)
}

/// Run the engine on a worker task and draw frames on a tokio timer until no
/// frame has been drawn for a while
async fn layout_threaded(
    branch: &Branch,
    params: Parameters,
    max_frames: u64,
) -> anyhow::Result<Positions> {
    // auto-stop needs the settle timeout; allow a few frames on top of it
    let quiet = params.settle_timeout() + params.frame_interval() * 10;

    let mut system = ParticleSystem::threaded(params, Arc::new(SystemClock));
    system.set_renderer(Box::new(LogRenderer::new()));
    system.graft(branch);
    system.flush();

    let system = Arc::new(Mutex::new(system));
    let mut frame_loop = FrameLoop::start(Arc::clone(&system), &TokioScheduler::current());

    let mut drawn = 0;
    let mut last_progress = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    loop {
        ticker.tick().await;
        let now_drawn = system
            .lock()
            .map_err(|_| anyhow::anyhow!("particle system lock poisoned"))?
            .frames_drawn();

        if now_drawn != drawn {
            drawn = now_drawn;
            last_progress = Instant::now();
        }
        if drawn >= max_frames || last_progress.elapsed() > quiet {
            break;
        }
    }
    frame_loop.stop();

    let system = system
        .lock()
        .map_err(|_| anyhow::anyhow!("particle system lock poisoned"))?;
    tracing::info!(
        frames = drawn,
        fps = system.fps(),
        energy = system.energy().settle_measure(),
        "layout finished"
    );
    Ok(io::collect_positions(&system))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Layout {
            input,
            output,
            config,
            max_frames,
            threaded,
        } => {
            let (branch, params) = load_inputs(&input, config.as_deref())?;
            let positions = if threaded {
                layout_threaded(&branch, params, max_frames).await?
            } else {
                layout_inline(&branch, params, max_frames)
            };
            io::write_positions(&positions, output.as_deref())?;
        }
    }

    Ok(())
}
