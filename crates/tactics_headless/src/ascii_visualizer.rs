//! ASCII battle visualizer for terminal review.
//!
//! Renders the board top row first: terrain, hazards and units, with an
//! optional roster legend.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use tactics_core::cell::Cell;
use tactics_core::hazards::HazardKind;
use tactics_core::units::{Faction, Unit};
use tactics_core::world::World;

/// ASCII visualization configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsciiConfig {
    /// Show the unit roster under the board.
    pub show_legend: bool,
    /// Use colored output (ANSI).
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_legend: true,
            use_color: true,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";

    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Character representation for a unit.
fn unit_char(unit: &Unit) -> char {
    match unit.faction {
        Faction::Player => '@',
        Faction::Neutral => 'O',
        Faction::Hostile => unit
            .template
            .chars()
            .next()
            .map_or('H', |c| c.to_ascii_uppercase()),
    }
}

fn unit_color(unit: &Unit) -> &'static str {
    match unit.faction {
        Faction::Player => colors::CYAN,
        Faction::Hostile => colors::RED,
        Faction::Neutral => colors::GRAY,
    }
}

fn hazard_char(kind: HazardKind) -> char {
    match kind {
        HazardKind::Fire => '^',
        HazardKind::Poison => '~',
        HazardKind::Laser => '=',
    }
}

fn hazard_color(kind: HazardKind) -> &'static str {
    match kind {
        HazardKind::Fire => colors::YELLOW,
        HazardKind::Poison => colors::GREEN,
        HazardKind::Laser => colors::MAGENTA,
    }
}

fn paint(output: &mut String, ch: char, color: &str, config: &AsciiConfig) {
    if config.use_color && !color.is_empty() {
        output.push_str(color);
        output.push(ch);
        output.push_str(colors::RESET);
    } else {
        output.push(ch);
    }
}

/// Render the battle board as ASCII art.
#[must_use]
pub fn render_ascii(world: &World, round: u32, config: &AsciiConfig) -> String {
    let grid = world.grid();
    let mut output = String::new();

    let (bold, reset) = if config.use_color {
        (colors::BOLD, colors::RESET)
    } else {
        ("", "")
    };
    let hostiles = world
        .units()
        .filter(|u| u.faction == Faction::Hostile)
        .count();
    let _ = writeln!(output, "{bold}Round {round} | hostiles: {hostiles}{reset}");

    for y in (0..grid.height()).rev() {
        for x in 0..grid.width() {
            let cell = Cell::new(x, y);
            if let Some(unit) = world.unit_at(cell) {
                paint(&mut output, unit_char(unit), unit_color(unit), config);
            } else if let Some(hazard) = grid.hazard_at(cell).and_then(|id| world.hazard(id)) {
                paint(&mut output, hazard_char(hazard.kind), hazard_color(hazard.kind), config);
            } else if grid.is_terrain_blocked(cell) {
                paint(&mut output, '#', colors::GRAY, config);
            } else {
                output.push('.');
            }
        }
        output.push('\n');
    }

    if config.show_legend {
        output.push_str("@=player O=neutral ^=fire ~=poison ==laser #=blocked\n");
        for unit in world.units() {
            let health = unit
                .health
                .map_or_else(|| String::from("-"), |h| format!("{}/{}", h.current, h.max));
            let _ = writeln!(
                output,
                "  {} {:<10} {:<8} hp {:<6} at {}",
                unit_char(unit),
                unit.template,
                unit.faction,
                health,
                unit.cell
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::hazards::HazardSpec;
    use tactics_core::units::UnitSpawnParams;
    use tactics_test_utils::fixtures::{player_params, world_from_rows};

    const PLAIN: AsciiConfig = AsciiConfig {
        show_legend: false,
        use_color: false,
    };

    #[test]
    fn test_unit_char() {
        let mut world = world_from_rows(&["...."]);
        let player = world.spawn_unit(&player_params(5), Cell::new(0, 0)).unwrap();
        let sniper = world
            .spawn_unit(&UnitSpawnParams::hostile("sniper", 2, 0), Cell::new(1, 0))
            .unwrap();
        let wall = world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(2, 0)).unwrap();

        assert_eq!(unit_char(world.unit(player).unwrap()), '@');
        assert_eq!(unit_char(world.unit(sniper).unwrap()), 'S');
        assert_eq!(unit_char(world.unit(wall).unwrap()), 'O');
    }

    #[test]
    fn test_render_top_row_first() {
        let mut world = world_from_rows(&["..#", "..."]);
        world.spawn_unit(&player_params(5), Cell::new(0, 0)).unwrap();
        world
            .spawn_unit(&UnitSpawnParams::hostile("grunt", 2, 0), Cell::new(1, 1))
            .unwrap();

        let frame = render_ascii(&world, 3, &PLAIN);
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines, vec!["Round 3 | hostiles: 1", ".G#", "@.."]);
    }

    #[test]
    fn test_render_hazards_under_units() {
        let mut world = world_from_rows(&["..."]);
        world.spawn_unit(&player_params(5), Cell::new(0, 0)).unwrap();
        let fire = HazardSpec {
            kind: HazardKind::Fire,
            duration: None,
        };
        world.create_hazard(fire, Cell::new(0, 0)).unwrap();
        world.create_hazard(fire, Cell::new(2, 0)).unwrap();

        let frame = render_ascii(&world, 1, &PLAIN);
        assert_eq!(frame.lines().nth(1), Some("@.^"));
    }

    #[test]
    fn test_legend_lists_roster() {
        let mut world = world_from_rows(&[".."]);
        world.spawn_unit(&player_params(5), Cell::new(0, 0)).unwrap();
        let config = AsciiConfig {
            show_legend: true,
            use_color: true,
        };

        let frame = render_ascii(&world, 1, &config);
        assert!(frame.contains("5/5"));
        assert!(frame.contains(colors::CYAN));
    }
}
