//! Headless grid tactics runner.
//!
//! Plays scenarios without a presentation layer. Designed for balance
//! testing, CI determinism checks and quick terminal review.
//!
//! # Usage
//!
//! ```bash
//! # Play the built-in skirmish, printing the board each round
//! cargo run -p tactics_headless -- run --ascii
//!
//! # Run batch balance test
//! cargo run -p tactics_headless -- batch --scenario scenarios/skirmish.ron --count 500 --output results/
//!
//! # Check a scenario file
//! cargo run -p tactics_headless -- validate --file scenarios/skirmish.ron
//!
//! # Verify determinism
//! cargo run -p tactics_headless -- verify --seed 12345 --runs 5
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the level picked by `--verbose`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tactics_headless::{
    ascii_visualizer::AsciiConfig,
    batch::{run_batch, verify_determinism, BatchConfig},
    game_runner::{run_game, GameConfig},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "tactics_headless")]
#[command(about = "Headless grid tactics runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single game with the auto player
    Run {
        /// Scenario file to load (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Round limit (0 = scenario default)
        #[arg(short, long, default_value = "0")]
        rounds: u32,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Print the board at every player phase
        #[arg(long)]
        ascii: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Run batch of games for balance testing
    Batch {
        /// Scenario file to load (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of games to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed_start: u64,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Run games one after another
        #[arg(long)]
        sequential: bool,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Check a scenario file without running it
    Validate {
        /// Scenario file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Verify determinism by running same seed multiple times
    Verify {
        /// Scenario file to load (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for frames and reports.
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            rounds,
            seed,
            ascii,
            no_color,
        }) => cmd_run(scenario.as_deref(), rounds, seed, ascii, no_color),
        Some(Commands::Batch {
            scenario,
            count,
            seed_start,
            parallel,
            sequential,
            output,
        }) => cmd_batch(scenario.as_deref(), count, seed_start, parallel, sequential, output),
        Some(Commands::Validate { file }) => cmd_validate(&file),
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => cmd_verify(scenario.as_deref(), seed, runs),
        None => cmd_run(None, 0, 0, true, false),
    }
}

/// Load a scenario file, or the built-in skirmish. Exits on failure.
fn load_scenario(path: Option<&Path>) -> Scenario {
    let Some(path) = path else {
        return Scenario::skirmish();
    };
    match Scenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to load scenario");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

/// Play one game and report the outcome
fn cmd_run(scenario: Option<&Path>, rounds: u32, seed: u64, ascii: bool, no_color: bool) {
    let scenario = load_scenario(scenario);
    let config = GameConfig {
        max_rounds: rounds,
        render_ascii: ascii,
        ascii: AsciiConfig {
            show_legend: true,
            use_color: !no_color,
        },
        ..GameConfig::with_seed(seed)
    };

    let result = match run_game(&scenario, &config) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Game failed");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    for frame in &result.frames {
        println!("{frame}");
    }
    println!("{}", "=".repeat(50));
    println!("Scenario: {}", scenario.name);
    println!("Outcome: {} after {} round(s)", result.outcome, result.rounds);
    println!(
        "Damage dealt: {}  taken: {}  hostiles killed: {}",
        result.metrics.damage_dealt, result.metrics.damage_taken, result.metrics.hostiles_killed
    );
    println!("State hash: {:016x}", result.final_state_hash);
}

/// Run batch of games for balance testing
fn cmd_batch(
    scenario: Option<&Path>,
    count: u32,
    seed_start: u64,
    parallel: u32,
    sequential: bool,
    output: PathBuf,
) {
    let scenario = load_scenario(scenario);

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!("FATAL: Cannot create output directory '{}': {e}", output.display());
        std::process::exit(1);
    }

    let config = BatchConfig {
        parallel_games: parallel,
        ..BatchConfig::new(&scenario.name, count)
            .with_seed(seed_start)
            .with_parallel(!sequential)
            .with_output(output.clone())
    };
    let results = run_batch(&scenario, config);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {e}");
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Games played: {}", results.games.len());
    if !results.errors.is_empty() {
        eprintln!("Games failed: {}", results.errors.len());
    }
    eprintln!(
        "Victories: {}  Defeats: {}  Unfinished: {}",
        summary.victories, summary.defeats, summary.unfinished
    );
    eprintln!("Victory rate: {:.1}%", summary.victory_rate * 100.0);
    eprintln!(
        "Rounds: avg {:.1}, min {}, max {}",
        summary.avg_rounds, summary.min_rounds, summary.max_rounds
    );
    eprintln!("Results saved to: {}", results_path.display());
}

/// Check a scenario file
fn cmd_validate(file: &Path) {
    let scenario = load_scenario(Some(file));
    if let Err(e) = scenario.validate() {
        eprintln!("INVALID: {e}");
        std::process::exit(1);
    }
    println!(
        "OK: '{}' with {} template(s) and {} placement(s)",
        scenario.name,
        scenario.templates.len(),
        scenario.placements.len()
    );
}

/// Verify determinism
fn cmd_verify(scenario: Option<&Path>, seed: u64, runs: u32) {
    let scenario = load_scenario(scenario);
    tracing::info!(seed, runs, scenario = %scenario.name, "Verifying determinism");

    if verify_determinism(&scenario, seed, runs) {
        println!("PASS: {runs} runs of seed {seed} produced identical battles");
    } else {
        eprintln!("FAIL: seed {seed} diverged");
        std::process::exit(1);
    }
}
