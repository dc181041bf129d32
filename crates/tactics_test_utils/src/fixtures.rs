//! Test fixtures and helpers.
//!
//! Pre-built maps, units and battles for consistent testing.

use fixed::types::I32F32;
use tactics_core::prelude::*;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Rectangular world with no obstacles and default tuning.
#[must_use]
pub fn open_world(width: i32, height: i32) -> World {
    World::new(&GroundSource::rectangle(width, height), BattleConfig::default())
}

/// World from map rows (top row first): `.` ground, `#` obstacle, space void.
///
/// # Panics
///
/// Panics if the rows are not a valid map.
#[must_use]
pub fn world_from_rows(rows: &[&str]) -> World {
    World::from_map(&MapData::from_rows(rows), BattleConfig::default())
        .unwrap_or_else(|err| panic!("invalid fixture map: {err}"))
}

/// Player with default budget and the given health.
#[must_use]
pub fn player_params(health: u32) -> UnitSpawnParams {
    UnitSpawnParams::player(health, BattleConfig::default().player_budget())
}

/// Minimal melee behavior: hit the player when adjacent, otherwise take
/// one step toward it.
#[derive(Debug, Clone, Copy)]
pub struct Chaser {
    /// Damage per hit.
    pub damage: u32,
}

impl HostileBehavior for Chaser {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        let (Some(me), Some(player)) = (ctx.me(), ctx.player()) else {
            return;
        };
        if me.cell.is_adjacent(player.cell) {
            let cell = player.cell;
            ctx.submit(Action::SingleDamage {
                cell,
                amount: self.damage,
            });
        }
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        let (Some(me), Some(player)) = (ctx.me(), ctx.player()) else {
            return;
        };
        if me.cell.is_adjacent(player.cell) {
            return;
        }
        let (unit, from) = (me.id, me.cell);
        let next = from.step(Direction::toward(from, player.cell));
        if ctx.grid().is_free(next) {
            let speed = ctx.world().config().move_speed;
            ctx.submit(Action::Move {
                unit,
                waypoints: vec![next],
                speed,
            });
        }
    }
}

/// Builder for small battles.
pub struct BattleBuilder {
    world: World,
    player: Option<(UnitSpawnParams, Cell)>,
    units: Vec<(UnitSpawnParams, Cell, Option<Box<dyn HostileBehavior>>)>,
    seed: u64,
}

impl BattleBuilder {
    /// Start from a world.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self {
            world,
            player: None,
            units: Vec::new(),
            seed: 0,
        }
    }

    /// Place the player.
    #[must_use]
    pub fn player(mut self, cell: Cell, health: u32) -> Self {
        self.player = Some((player_params(health), cell));
        self
    }

    /// Add a [`Chaser`] hostile.
    #[must_use]
    pub fn chaser(mut self, cell: Cell, health: u32, priority: i32) -> Self {
        let params = UnitSpawnParams::hostile("chaser", health, priority);
        self.units
            .push((params, cell, Some(Box::new(Chaser { damage: 1 }))));
        self
    }

    /// Add any unit.
    #[must_use]
    pub fn unit(
        mut self,
        params: UnitSpawnParams,
        cell: Cell,
        behavior: Option<Box<dyn HostileBehavior>>,
    ) -> Self {
        self.units.push((params, cell, behavior));
        self
    }

    /// Battle randomness seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Spawn everything. The battle is not started.
    ///
    /// # Panics
    ///
    /// Panics if a unit cannot be placed.
    #[must_use]
    pub fn build(self) -> Battle {
        let mut battle = Battle::new(self.world, Box::new(NullFactory)).with_seed(self.seed);
        if let Some((params, cell)) = self.player {
            battle
                .spawn_unit(&params, cell, None)
                .unwrap_or_else(|err| panic!("cannot place player: {err}"));
        }
        for (params, cell, behavior) in self.units {
            battle
                .spawn_unit(&params, cell, behavior)
                .unwrap_or_else(|err| panic!("cannot place {}: {err}", params.template));
        }
        battle
    }
}
