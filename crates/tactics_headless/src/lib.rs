//! Headless battle runner for AI testing and CI verification.
//!
//! This crate plays grid tactics battles without a presentation layer:
//!
//! - **Balance testing**: run hundreds of seeds of a scenario in parallel
//!   and aggregate the outcomes
//! - **CI verification**: check that a seed always produces the same battle
//! - **Terminal review**: render the board as ASCII frames
//!
//! Scenarios are RON files naming a map, unit templates and starting
//! placements. Hostile templates pick one of the behaviors in
//! [`strategies`]; the player is driven by [`strategies::AutoPlayer`].
//!
//! # Example
//!
//! ```bash
//! # Play one game and print the board every round
//! cargo run -p tactics_headless -- run --scenario scenarios/skirmish.ron --ascii
//!
//! # Run a batch of seeds
//! cargo run -p tactics_headless -- batch --count 200 --output results/
//!
//! # Verify determinism
//! cargo run -p tactics_headless -- verify --seed 12345 --runs 5
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ascii_visualizer;
pub mod batch;
pub mod factory;
pub mod game_runner;
pub mod metrics;
pub mod scenario;
pub mod strategies;

pub use ascii_visualizer::{render_ascii, AsciiConfig};
pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults};
pub use factory::TemplateFactory;
pub use game_runner::{run_game, GameConfig, GameResult};
pub use metrics::{BatchSummary, GameMetrics, MetricsCollector};
pub use scenario::{Scenario, ScenarioError, UnitPlacement};
pub use strategies::{behavior_for, AutoPlayer, BEHAVIORS};
