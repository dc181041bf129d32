//! Scripted decision logic for headless playtesting.
//!
//! Reference hostile behaviors, selected by name from unit templates, and
//! an automatic player policy so whole battles can run without input.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tactics_core::action::Action;
use tactics_core::battle::{Battle, Outcome};
use tactics_core::behavior::{DecisionContext, HostileBehavior};
use tactics_core::cell::{Cell, Direction};
use tactics_core::data::{AttackData, UnitData, WeightedTemplate};
use tactics_core::error::Result;
use tactics_core::grid::SpatialIndex;
use tactics_core::hazards::{HazardKind, HazardSpec};
use tactics_core::scheduler::ActionId;
use tactics_core::status::StatusEffect;
use tactics_core::units::{Faction, UnitId};

/// Behavior names accepted in unit templates.
pub const BEHAVIORS: &[&str] = &[
    "melee",
    "grenadier",
    "sniper",
    "destroyer",
    "guardian",
    "spawner",
];

/// Build the behavior a template asks for.
///
/// Templates without a behavior, or with an unknown one, get `None` and idle.
#[must_use]
pub fn behavior_for(data: &UnitData) -> Option<Box<dyn HostileBehavior>> {
    let name = data.behavior.as_deref()?;
    let attack = data.attack.clone();
    let behavior: Box<dyn HostileBehavior> = match name {
        "melee" => Box::new(Melee { attack }),
        "grenadier" => Box::new(Grenadier { attack }),
        "sniper" => Box::new(Sniper::new(attack)),
        "destroyer" => Box::new(Destroyer::new(attack)),
        "guardian" => Box::new(Guardian { attack }),
        "spawner" => Box::new(Spawner::new(data.spawns.clone(), attack.cooldown)),
        other => {
            warn!(template = %data.id, behavior = other, "unknown behavior, unit will idle");
            return None;
        }
    };
    Some(behavior)
}

// =============================================================================
// Shared helpers
// =============================================================================

/// What a hostile needs to know about itself and its target.
#[derive(Debug, Clone, Copy)]
struct Sight {
    me: UnitId,
    at: Cell,
    movement: u32,
    player: UnitId,
    target: Cell,
}

fn observe(ctx: &DecisionContext<'_>) -> Option<Sight> {
    let me = ctx.me()?;
    let player = ctx.player()?;
    Some(Sight {
        me: me.id,
        at: me.cell,
        movement: me.effective_movement(),
        player: player.id,
        target: player.cell,
    })
}

/// True if `from` can shoot straight at `to` within `range`.
fn has_firing_line(grid: &SpatialIndex, from: Cell, to: Cell, range: u32) -> bool {
    grid.in_straight_line(from, to)
        && from.manhattan(to) <= range
        && grid.line_of_sight(from, to).unwrap_or(false)
}

/// Shortest hazard-avoiding route to any of `goals`. Earlier goals win ties.
fn best_route(ctx: &mut DecisionContext<'_>, from: Cell, goals: &[Cell]) -> Option<Vec<Cell>> {
    let mut best: Option<Vec<Cell>> = None;
    for &goal in goals {
        if let Some(path) = ctx.path_avoiding_hazards(from, goal) {
            if best.as_ref().map_or(true, |b| path.len() < b.len()) {
                best = Some(path);
            }
        }
    }
    best
}

/// Submit a move along the first `movement` cells of `path`.
fn walk(ctx: &mut DecisionContext<'_>, sight: Sight, path: Vec<Cell>) -> Option<ActionId> {
    let waypoints: Vec<Cell> = path.into_iter().take(sight.movement as usize).collect();
    if waypoints.is_empty() {
        return None;
    }
    let speed = ctx.world().config().move_speed;
    Some(ctx.submit(Action::Move {
        unit: sight.me,
        waypoints,
        speed,
    }))
}

/// Head for a free cell next to the player.
fn approach_player(ctx: &mut DecisionContext<'_>) -> Option<ActionId> {
    let sight = observe(ctx)?;
    if sight.at.is_adjacent(sight.target) {
        return None;
    }
    let goals = ctx.grid().free_adjacent_tiles(sight.target);
    let path = best_route(ctx, sight.at, &goals)?;
    walk(ctx, sight, path)
}

// =============================================================================
// Hostile behaviors
// =============================================================================

/// Walks up to the player and hits it.
#[derive(Debug, Clone)]
pub struct Melee {
    /// Damage per hit.
    pub attack: AttackData,
}

impl HostileBehavior for Melee {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if sight.at.is_adjacent(sight.target) {
            ctx.submit(Action::SingleDamage {
                cell: sight.target,
                amount: self.attack.damage,
            });
        }
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        approach_player(ctx);
    }
}

/// Lobs a hazard blast on the player's cell from range.
#[derive(Debug, Clone)]
pub struct Grenadier {
    /// Range, blast radius, hazard type and duration.
    pub attack: AttackData,
}

impl HostileBehavior for Grenadier {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if sight.at.manhattan(sight.target) > self.attack.range {
            return;
        }

        let grid = ctx.grid();
        let mut cells = vec![sight.target];
        cells.extend(
            grid.surrounding_tiles(sight.target, self.attack.radius)
                .into_iter()
                .filter(|&c| c != sight.at && !grid.is_terrain_blocked(c)),
        );
        let spec = HazardSpec {
            kind: self.attack.hazard.unwrap_or(HazardKind::Poison),
            duration: Some(self.attack.duration),
        };
        ctx.submit(Action::CreateHazard { cells, spec });
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if sight.at.manhattan(sight.target) > self.attack.range {
            approach_player(ctx);
        }
    }
}

/// Shoots along a clear row or column, repositioning to find one.
#[derive(Debug, Clone)]
pub struct Sniper {
    attack: AttackData,
    pending: Option<ActionId>,
}

impl Sniper {
    /// Sniper with the given shot.
    #[must_use]
    pub fn new(attack: AttackData) -> Self {
        Self {
            attack,
            pending: None,
        }
    }

    /// Free cells with a firing line on `target`, nearest to it first.
    fn firing_positions(&self, grid: &SpatialIndex, target: Cell, me: Cell) -> Vec<Cell> {
        let mut positions = Vec::new();
        for direction in Direction::ALL {
            for n in 1..=i32::try_from(self.attack.range).unwrap_or(i32::MAX) {
                let cell = target.offset(direction, n);
                if cell == me {
                    positions.push(cell);
                    break;
                }
                if !grid.is_free(cell) {
                    break;
                }
                positions.push(cell);
            }
        }
        positions
    }
}

impl HostileBehavior for Sniper {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        self.pending = None;
        let Some(sight) = observe(ctx) else { return };
        if has_firing_line(ctx.grid(), sight.at, sight.target, self.attack.range) {
            self.pending = Some(ctx.submit(Action::TargetedLineShot {
                sender: sight.me,
                target: sight.player,
                damage: self.attack.damage,
            }));
        }
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if has_firing_line(ctx.grid(), sight.at, sight.target, self.attack.range) {
            return;
        }
        let goals = self.firing_positions(ctx.grid(), sight.target, sight.at);
        if let Some(path) = best_route(ctx, sight.at, &goals) {
            walk(ctx, sight, path);
        }
    }

    fn on_displaced(&mut self, ctx: &mut DecisionContext<'_>) {
        if let Some(id) = self.pending.take() {
            debug!(unit = ctx.unit_id(), action = id, "sniper re-aiming");
            ctx.cancel(id);
            self.decide_action(ctx);
        }
    }
}

/// Charges down open lines and smashes whatever stops it.
#[derive(Debug, Clone)]
pub struct Destroyer {
    attack: AttackData,
    pending: Option<ActionId>,
}

impl Destroyer {
    /// Destroyer with the given charge.
    #[must_use]
    pub fn new(attack: AttackData) -> Self {
        Self {
            attack,
            pending: None,
        }
    }
}

impl HostileBehavior for Destroyer {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        self.pending = None;
        let Some(sight) = observe(ctx) else { return };

        let action = if sight.at.is_adjacent(sight.target) {
            Action::SingleDamage {
                cell: sight.target,
                amount: self.attack.damage,
            }
        } else if has_firing_line(ctx.grid(), sight.at, sight.target, self.attack.range) {
            Action::ChargeMove {
                unit: sight.me,
                direction: ctx.grid().direction_to(sight.at, sight.target),
                range: sight.at.manhattan(sight.target),
                damage: self.attack.damage,
                knockback: self.attack.knockback,
                speed: ctx.world().config().move_speed,
            }
        } else {
            return;
        };
        self.pending = Some(ctx.submit(action));
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if !has_firing_line(ctx.grid(), sight.at, sight.target, self.attack.range) {
            approach_player(ctx);
        }
    }

    fn on_displaced(&mut self, ctx: &mut DecisionContext<'_>) {
        if let Some(id) = self.pending.take() {
            ctx.cancel(id);
            self.decide_action(ctx);
        }
    }
}

/// Shields neighbouring allies; fights only when nobody needs cover.
#[derive(Debug, Clone)]
pub struct Guardian {
    /// Melee damage and protection duration.
    pub attack: AttackData,
}

impl Guardian {
    fn allies_in_reach(ctx: &DecisionContext<'_>, at: Cell) -> Vec<Cell> {
        let world = ctx.world();
        at.cardinal_neighbors()
            .into_iter()
            .filter(|&c| {
                world
                    .unit_at(c)
                    .is_some_and(|u| u.faction == Faction::Hostile && u.accepts_status)
            })
            .collect()
    }
}

impl HostileBehavior for Guardian {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        let allies = Self::allies_in_reach(ctx, sight.at);

        if allies.is_empty() {
            if sight.at.is_adjacent(sight.target) {
                ctx.submit(Action::SingleDamage {
                    cell: sight.target,
                    amount: self.attack.damage,
                });
            }
            return;
        }
        for cell in allies {
            ctx.submit(Action::ApplyStatus {
                cell,
                effect: StatusEffect::Protected {
                    protector: sight.me,
                    remaining: self.attack.duration.max(1),
                },
            });
        }
    }

    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
        let Some(sight) = observe(ctx) else { return };
        if Self::allies_in_reach(ctx, sight.at).is_empty() {
            approach_player(ctx);
        }
    }
}

/// Stationary nest that spawns a weighted template every few rounds.
#[derive(Debug, Clone)]
pub struct Spawner {
    spawns: Vec<WeightedTemplate>,
    cooldown: u32,
    wait: u32,
}

impl Spawner {
    /// Spawns on its first round, then every `cooldown + 1` rounds.
    #[must_use]
    pub fn new(spawns: Vec<WeightedTemplate>, cooldown: u32) -> Self {
        Self {
            spawns,
            cooldown,
            wait: 0,
        }
    }
}

impl HostileBehavior for Spawner {
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
        if self.wait > 0 {
            self.wait -= 1;
            return;
        }
        let Some(at) = ctx.me().map(|u| u.cell) else { return };
        let free = ctx.grid().free_adjacent_tiles(at);
        let Some(&cell) = ctx.rng().choose(&free) else {
            debug!(unit = ctx.unit_id(), "spawner boxed in");
            return;
        };
        let Some(template) = ctx
            .rng()
            .weighted_choice(&self.spawns, |t| t.weight)
            .map(|t| t.template.clone())
        else {
            return;
        };
        self.wait = self.cooldown;
        ctx.submit(Action::SpawnUnit { template, cell });
    }

    fn decide_move(&mut self, _ctx: &mut DecisionContext<'_>) {}
}

// =============================================================================
// Player policy
// =============================================================================

/// Upper bound on actions the auto player takes in one turn.
pub const MAX_ACTIONS_PER_TURN: u32 = 16;

/// Greedy player: hit an adjacent hostile, otherwise walk toward the
/// nearest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPlayer {
    /// Damage per melee hit.
    pub damage: u32,
    /// Action points per melee hit.
    pub attack_cost: u32,
}

impl Default for AutoPlayer {
    fn default() -> Self {
        Self {
            damage: 2,
            attack_cost: 2,
        }
    }
}

impl AutoPlayer {
    /// Spend the player's turn. Returns how many actions were taken.
    ///
    /// Does not end the turn.
    pub fn play_turn(&self, battle: &mut Battle) -> Result<u32> {
        let mut taken = 0;
        while taken < MAX_ACTIONS_PER_TURN {
            let Some((action, cost)) = self.choose(battle) else {
                break;
            };
            battle.perform_player_action(action, cost)?;
            taken += 1;
            if battle.outcome() != Outcome::Ongoing {
                break;
            }
        }
        debug!(round = battle.round(), actions = taken, "auto player turn");
        Ok(taken)
    }

    /// Next action and its cost, if one is affordable.
    #[must_use]
    pub fn choose(&self, battle: &Battle) -> Option<(Action, u32)> {
        let world = battle.world();
        let player = world.player_id().and_then(|id| world.unit(id))?;
        let available = player.action_points.map_or(0, |ap| ap.total());

        let adjacent = world
            .units()
            .filter(|u| u.faction == Faction::Hostile && u.cell.is_adjacent(player.cell))
            .min_by_key(|u| (u.health.map_or(u32::MAX, |h| h.current), u.id));
        if let Some(target) = adjacent {
            return (self.attack_cost <= available).then_some((
                Action::SingleDamage {
                    cell: target.cell,
                    amount: self.damage,
                },
                self.attack_cost,
            ));
        }

        let per_tile = battle.move_cost(1);
        if per_tile == 0 || per_tile > available {
            return None;
        }
        let grid = world.grid();
        let mut best: Option<Vec<Cell>> = None;
        for hostile in world.units().filter(|u| u.faction == Faction::Hostile) {
            for goal in grid.free_adjacent_tiles(hostile.cell) {
                if let Some(path) = grid.path_between(player.cell, goal) {
                    if best.as_ref().map_or(true, |b| path.len() < b.len()) {
                        best = Some(path);
                    }
                }
            }
        }

        let max_tiles = (available / per_tile) as usize;
        let waypoints: Vec<Cell> = best?.into_iter().take(max_tiles).collect();
        if waypoints.is_empty() {
            return None;
        }
        let cost = battle.move_cost(u32::try_from(waypoints.len()).ok()?);
        Some((
            Action::Move {
                unit: player.id,
                waypoints,
                speed: world.config().move_speed,
            },
            cost,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::TemplateFactory;
    use tactics_core::behavior::NullFactory;
    use tactics_core::data::BattleConfig;
    use tactics_core::status::StatusKind;
    use tactics_core::units::UnitSpawnParams;
    use tactics_test_utils::determinism::MAX_STEPS_PER_PHASE;
    use tactics_test_utils::fixtures::{player_params, world_from_rows};

    fn attack(damage: u32, range: u32) -> AttackData {
        AttackData {
            damage,
            range,
            ..AttackData::default()
        }
    }

    fn battle_with(
        rows: &[&str],
        player: Cell,
        hostile: Cell,
        behavior: Box<dyn HostileBehavior>,
    ) -> (Battle, UnitId) {
        let mut battle = Battle::new(world_from_rows(rows), Box::new(NullFactory));
        battle.spawn_unit(&player_params(10), player, None).unwrap();
        let id = battle
            .spawn_unit(&UnitSpawnParams::hostile("h", 5, 0), hostile, Some(behavior))
            .unwrap();
        (battle, id)
    }

    fn to_player_phase(battle: &mut Battle) {
        battle.run_until_player_phase(MAX_STEPS_PER_PHASE).unwrap();
    }

    fn player_health(battle: &Battle) -> u32 {
        let world = battle.world();
        world
            .player_id()
            .and_then(|id| world.unit(id))
            .and_then(|u| u.health)
            .map_or(0, |h| h.current)
    }

    #[test]
    fn test_behavior_lookup() {
        for name in BEHAVIORS {
            let data = UnitData {
                behavior: Some((*name).to_owned()),
                ..UnitData::from_ron_str(r#"(id: "x")"#).unwrap()
            };
            assert!(behavior_for(&data).is_some(), "{name} not built");
        }
        let idle = UnitData::from_ron_str(r#"(id: "x", behavior: Some("dance"))"#).unwrap();
        assert!(behavior_for(&idle).is_none());
    }

    #[test]
    fn test_melee_walks_up_and_hits() {
        let (mut battle, id) = battle_with(
            &["......"],
            Cell::new(0, 0),
            Cell::new(5, 0),
            Box::new(Melee { attack: attack(3, 1) }),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);
        // Movement 3 from (5,0) toward (1,0).
        assert_eq!(battle.world().unit(id).map(|u| u.cell), Some(Cell::new(2, 0)));

        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);
        assert_eq!(battle.world().unit(id).map(|u| u.cell), Some(Cell::new(1, 0)));
        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);
        assert_eq!(player_health(&battle), 7);
    }

    #[test]
    fn test_sniper_moves_into_line_and_fires() {
        let (mut battle, id) = battle_with(
            &["....", "....", "...."],
            Cell::new(0, 0),
            Cell::new(3, 2),
            Box::new(Sniper::new(attack(2, 5))),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);
        let at = battle.world().unit(id).map(|u| u.cell).unwrap();
        assert!(at.is_colinear(Cell::new(0, 0)), "sniper at {at} has no line");

        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);
        assert_eq!(player_health(&battle), 8);
    }

    #[test]
    fn test_grenadier_poisons_player() {
        let (mut battle, _) = battle_with(
            &["....."],
            Cell::new(0, 0),
            Cell::new(3, 0),
            Box::new(Grenadier {
                attack: AttackData {
                    radius: 0,
                    hazard: Some(HazardKind::Poison),
                    ..attack(1, 4)
                },
            }),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);
        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);

        let world = battle.world();
        assert_eq!(world.grid().hazards_at(Cell::new(0, 0)).len(), 1);
        let player = world.player_id().and_then(|id| world.unit(id)).unwrap();
        assert!(player.has_status(StatusKind::Poisoned));
    }

    #[test]
    fn test_destroyer_charges_down_open_line() {
        let (mut battle, id) = battle_with(
            &["......."],
            Cell::new(0, 0),
            Cell::new(6, 0),
            Box::new(Destroyer::new(AttackData {
                knockback: 0,
                ..attack(2, 10)
            })),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);
        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);

        assert_eq!(battle.world().unit(id).map(|u| u.cell), Some(Cell::new(1, 0)));
        assert!(player_health(&battle) <= 8);
    }

    #[test]
    fn test_spawner_fills_adjacent_cell() {
        let templates = UnitData::list_from_ron_str(r#"[(id: "grunt", health: Some(1))]"#).unwrap();
        let factory = TemplateFactory::new(&templates, BattleConfig::default());
        let mut battle = Battle::new(world_from_rows(&["....."]), Box::new(factory));
        battle.spawn_unit(&player_params(10), Cell::new(0, 0), None).unwrap();
        let spawns = vec![WeightedTemplate {
            template: String::from("grunt"),
            weight: 1,
        }];
        battle
            .spawn_unit(
                &UnitSpawnParams::hostile("hive", 5, 0),
                Cell::new(4, 0),
                Some(Box::new(Spawner::new(spawns, 3))),
            )
            .unwrap();
        battle.start().unwrap();
        to_player_phase(&mut battle);
        battle.end_player_turn().unwrap();
        to_player_phase(&mut battle);

        let grunt = battle.world().unit_at(Cell::new(3, 0)).map(|u| u.template.clone());
        assert_eq!(grunt.as_deref(), Some("grunt"));
    }

    #[test]
    fn test_auto_player_attacks_adjacent() {
        let (mut battle, id) = battle_with(
            &["...."],
            Cell::new(0, 0),
            Cell::new(1, 0),
            Box::new(Melee { attack: attack(0, 1) }),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);

        let taken = AutoPlayer::default().play_turn(&mut battle).unwrap();
        // Five points: two hits of two, one point left over.
        assert_eq!(taken, 2);
        assert_eq!(
            battle.world().unit(id).and_then(|u| u.health).map(|h| h.current),
            Some(1)
        );
    }

    #[test]
    fn test_auto_player_walks_toward_hostile() {
        let (mut battle, _) = battle_with(
            &["........"],
            Cell::new(0, 0),
            Cell::new(7, 0),
            Box::new(Spawner::new(Vec::new(), 0)),
        );
        battle.start().unwrap();
        to_player_phase(&mut battle);

        let (action, cost) = AutoPlayer::default().choose(&battle).unwrap();
        assert_eq!(cost, 5);
        match action {
            Action::Move { waypoints, .. } => {
                assert_eq!(waypoints.last().copied(), Some(Cell::new(5, 0)));
            }
            other => panic!("expected a move, got {other:?}"),
        }
    }
}
