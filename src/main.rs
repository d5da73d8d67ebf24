use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

use comet_sim::state::SceneArgs;

/// Comet demo with GPU-style particle physics and halo postprocessing
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Number of comet particle sources
  #[arg(short, long, default_value_t = 3)]
  comets: u32,
  /// Particles emitted per comet
  #[arg(short, long, default_value_t = 1000)]
  particles: u32,
  /// Number of planet attractors orbiting the sun
  #[arg(long, default_value_t = 2)]
  planets: u32,
  /// Seed for scene layout and particle spawn jitter
  #[arg(long, default_value_t = 42)]
  seed: u64,
  /// Run in headless mode (no window)
  #[arg(long, default_value_t = false)]
  headless: bool,
  /// Tick count for headless mode; 0 runs until interrupted
  #[arg(long, default_value_t = 0)]
  ticks: u64,
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Generate shell completion scripts
  Completions {
    /// The shell to generate the script for
    #[arg(value_enum)]
    shell: Shell,
  },
}

fn main() {
  let args = Args::parse();

  if let Some(Commands::Completions { shell }) = args.command {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    return;
  }

  let scene_args = SceneArgs {
    comets: args.comets,
    particles_per_comet: args.particles,
    planets: args.planets,
    seed: args.seed,
    headless: args.headless,
    ticks: args.ticks,
  };

  if let Err(err) = comet_sim::state::run(scene_args) {
    eprintln!("error: {err}");
    std::process::exit(1);
  }
}
