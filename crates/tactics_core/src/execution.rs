//! Resumable execution of [`Action`]s.
//!
//! An [`ActionTask`] advances its action by one simulation step per call to
//! [`ActionTask::step`] and reports [`StepState::Done`] when the effect is
//! complete. Moves interpolate the world position over several steps; hits
//! resolve one target per step. Composite effects (a charge that ends in a
//! push, a push that moves its victim) drive inner tasks to completion
//! before continuing.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::action::{Action, DamageHit};
use crate::behavior::{HostileBehavior, UnitFactory};
use crate::cell::{Cell, Direction};
use crate::error::Result;
use crate::hazards::HazardSpec;
use crate::math::Fixed;
use crate::units::UnitId;
use crate::world::World;

/// Progress reported by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Call `step` again.
    Running,
    /// The action is complete.
    Done,
}

/// Everything an action may touch while it runs.
pub struct ExecContext<'a> {
    /// The battle world.
    pub world: &'a mut World,
    factory: &'a mut dyn UnitFactory,
    spawned: Vec<(UnitId, Option<Box<dyn HostileBehavior>>)>,
}

impl<'a> ExecContext<'a> {
    /// Context over `world`, spawning through `factory`.
    pub fn new(world: &'a mut World, factory: &'a mut dyn UnitFactory) -> Self {
        Self {
            world,
            factory,
            spawned: Vec::new(),
        }
    }

    /// Units spawned by actions, with their behaviors.
    pub fn take_spawned(&mut self) -> Vec<(UnitId, Option<Box<dyn HostileBehavior>>)> {
        std::mem::take(&mut self.spawned)
    }
}

/// An action in flight.
#[derive(Debug, Clone)]
pub struct ActionTask {
    state: TaskState,
}

#[derive(Debug, Clone)]
enum TaskState {
    Single(Action),
    Move(MoveTask),
    Charge(ChargeTask),
    Push(PushTask),
    Area(VecDeque<DamageHit>),
    Hazards { cells: VecDeque<Cell>, spec: HazardSpec },
    Finished,
}

impl ActionTask {
    /// Prepare `action` for execution.
    #[must_use]
    pub fn new(action: Action) -> Self {
        let state = match action {
            Action::Move {
                unit,
                waypoints,
                speed,
            } => TaskState::Move(MoveTask::new(unit, waypoints, speed)),
            Action::ChargeMove {
                unit,
                direction,
                range,
                damage,
                knockback,
                speed,
            } => TaskState::Charge(ChargeTask {
                unit,
                direction,
                remaining: range,
                damage,
                knockback,
                speed,
                moving: None,
                push: None,
            }),
            Action::Push {
                cell,
                direction,
                distance,
                speed,
            } => TaskState::Push(PushTask::new(cell, direction, distance, speed)),
            Action::AreaDamage { hits } => TaskState::Area(hits.into()),
            Action::CreateHazard { cells, spec } => TaskState::Hazards {
                cells: cells.into(),
                spec,
            },
            single => TaskState::Single(single),
        };
        Self { state }
    }

    /// True once the task reported [`StepState::Done`].
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.state, TaskState::Finished)
    }

    /// Advance by one simulation step.
    pub fn step(&mut self, ctx: &mut ExecContext<'_>) -> Result<StepState> {
        let state = match &mut self.state {
            TaskState::Single(action) => {
                run_single(action, ctx)?;
                StepState::Done
            }
            TaskState::Move(task) => task.step(ctx.world)?,
            TaskState::Charge(task) => task.step(ctx.world)?,
            TaskState::Push(task) => task.step(ctx.world)?,
            TaskState::Area(hits) => {
                if let Some(hit) = hits.pop_front() {
                    if ctx.world.damage_at(hit.cell, hit.amount).is_none() {
                        debug!(cell = %hit.cell, "area damage: no target");
                    }
                }
                if hits.is_empty() {
                    StepState::Done
                } else {
                    StepState::Running
                }
            }
            TaskState::Hazards { cells, spec } => {
                if let Some(cell) = cells.pop_front() {
                    let world = &mut *ctx.world;
                    if world.grid().unit_at(cell).is_some() || world.grid().is_free(cell) {
                        world.create_hazard(*spec, cell)?;
                    } else {
                        debug!(%cell, "hazard site blocked");
                    }
                }
                if cells.is_empty() {
                    StepState::Done
                } else {
                    StepState::Running
                }
            }
            TaskState::Finished => StepState::Done,
        };
        if state == StepState::Done {
            self.state = TaskState::Finished;
        }
        Ok(state)
    }
}

/// Actions that complete in a single step.
fn run_single(action: &Action, ctx: &mut ExecContext<'_>) -> Result<()> {
    let world = &mut *ctx.world;
    match action {
        Action::SingleDamage { cell, amount } => {
            if world.damage_at(*cell, *amount).is_none() {
                debug!(%cell, "single damage: no target");
            }
        }
        Action::ApplyStatus { cell, effect } => match world.grid().unit_at(*cell) {
            Some(target) => {
                world.add_status(target, *effect);
            }
            None => debug!(%cell, "apply status: no target"),
        },
        Action::InstantMove { unit, cell } => {
            if !world.is_alive(*unit) {
                debug!(unit, "instant move: unit gone");
            } else if world.grid().is_free(*cell) {
                world.relocate_unit(*unit, *cell)?;
                world.apply_hazards_at(*unit, *cell);
            } else {
                debug!(unit, %cell, "instant move: destination blocked");
            }
        }
        Action::SpawnUnit { template, cell } => {
            if !world.grid().is_free(*cell) {
                debug!(%template, %cell, "spawn skipped: cell not free");
                return Ok(());
            }
            let Some(spawned) = ctx.factory.spawn(template, *cell) else {
                warn!(%template, "unknown template");
                return Ok(());
            };
            let id = world.spawn_unit(&spawned.params, *cell)?;
            ctx.spawned.push((id, spawned.behavior));
        }
        Action::TargetedLineShot {
            sender,
            target,
            damage,
        } => {
            let (Some(from), Some(to)) = (
                world.unit(*sender).map(|u| u.cell),
                world.unit(*target).map(|u| u.cell),
            ) else {
                debug!(sender, target, "shot: shooter or target gone");
                return Ok(());
            };
            let line = world.grid().rasterize_line(from, to);
            for cell in line.into_iter().skip(1) {
                if let Some(hit) = world.grid().unit_at(cell) {
                    world.damage_unit(hit, *damage);
                    break;
                }
                if !world.grid().is_free(cell) {
                    debug!(%cell, "shot blocked by terrain");
                    break;
                }
            }
        }
        // Multi-step variants never reach here.
        Action::Move { .. }
        | Action::ChargeMove { .. }
        | Action::Push { .. }
        | Action::AreaDamage { .. }
        | Action::CreateHazard { .. } => {}
    }
    Ok(())
}

/// Walks a unit through its waypoints.
#[derive(Debug, Clone)]
struct MoveTask {
    unit: UnitId,
    waypoints: VecDeque<Cell>,
    speed: Fixed,
    reached: Option<Cell>,
}

impl MoveTask {
    fn new(unit: UnitId, waypoints: Vec<Cell>, speed: Fixed) -> Self {
        Self {
            unit,
            waypoints: waypoints.into(),
            speed,
            reached: None,
        }
    }

    fn step(&mut self, world: &mut World) -> Result<StepState> {
        let Some(unit) = world.unit(self.unit) else {
            debug!(unit = self.unit, "move: unit gone");
            return Ok(StepState::Done);
        };
        let position = unit.world_position;

        let Some(&next) = self.waypoints.front() else {
            return self.finish(world);
        };
        let occupant = world.grid().unit_at(next);
        if world.grid().is_terrain_blocked(next) || occupant.is_some_and(|id| id != self.unit) {
            warn!(unit = self.unit, cell = %next, "move stopped: waypoint blocked");
            self.waypoints.clear();
            return self.finish(world);
        }

        let target = world.grid().world_position(next);
        let max_step = if self.speed > Fixed::ZERO {
            self.speed * world.config().tile_size
        } else {
            Fixed::MAX
        };
        let position = position.move_towards(target, max_step);
        world.set_world_position(self.unit, position);
        if position != target {
            return Ok(StepState::Running);
        }

        self.waypoints.pop_front();
        self.reached = Some(next);
        world.apply_hazards_at(self.unit, next);
        if !world.is_alive(self.unit) {
            return Ok(StepState::Done);
        }
        if self.waypoints.is_empty() {
            return self.finish(world);
        }
        Ok(StepState::Running)
    }

    /// Commit the last reached cell to the registry, or snap back home.
    fn finish(&mut self, world: &mut World) -> Result<StepState> {
        match self.reached {
            Some(cell) => world.relocate_unit(self.unit, cell)?,
            None => {
                if let Some(home) = world.unit(self.unit).map(|u| u.cell) {
                    let position = world.grid().world_position(home);
                    world.set_world_position(self.unit, position);
                }
            }
        }
        Ok(StepState::Done)
    }
}

#[derive(Debug, Clone)]
struct ChargeTask {
    unit: UnitId,
    direction: Direction,
    remaining: u32,
    damage: u32,
    knockback: u32,
    speed: Fixed,
    moving: Option<MoveTask>,
    push: Option<PushTask>,
}

impl ChargeTask {
    fn step(&mut self, world: &mut World) -> Result<StepState> {
        if let Some(push) = &mut self.push {
            return push.step(world);
        }
        if let Some(moving) = &mut self.moving {
            if moving.step(world)? == StepState::Done {
                self.moving = None;
            }
            return Ok(StepState::Running);
        }

        let Some(cell) = world.unit(self.unit).map(|u| u.cell) else {
            return Ok(StepState::Done);
        };
        if self.remaining == 0 {
            return Ok(StepState::Done);
        }

        let next = cell.step(self.direction);
        if world.grid().is_free(next) {
            self.remaining -= 1;
            let mut moving = MoveTask::new(self.unit, vec![next], self.speed);
            if moving.step(world)? == StepState::Running {
                self.moving = Some(moving);
            }
            return Ok(StepState::Running);
        }

        self.remaining = 0;
        let Some(victim) = world.grid().unit_at(next) else {
            debug!(unit = self.unit, cell = %next, "charge stopped by terrain");
            return Ok(StepState::Done);
        };
        debug!(unit = self.unit, victim, "charge hit");
        world.damage_unit(victim, self.damage);

        let pushable = world.unit(victim).is_some_and(|u| u.pushable);
        if !pushable || self.knockback == 0 {
            return Ok(StepState::Done);
        }
        let push_speed = world.config().push_speed;
        let mut push = PushTask::new(next, self.direction, self.knockback, push_speed);
        let state = push.step(world)?;
        self.push = Some(push);
        Ok(state)
    }
}

#[derive(Debug, Clone)]
struct PushTask {
    cell: Cell,
    direction: Direction,
    distance: u32,
    speed: Fixed,
    moving: Option<PushedUnit>,
}

#[derive(Debug, Clone)]
struct PushedUnit {
    task: MoveTask,
    unit: UnitId,
    shortfall: u32,
}

impl PushTask {
    fn new(cell: Cell, direction: Direction, distance: u32, speed: Fixed) -> Self {
        Self {
            cell,
            direction,
            distance,
            speed,
            moving: None,
        }
    }

    fn step(&mut self, world: &mut World) -> Result<StepState> {
        if let Some(pushed) = &mut self.moving {
            if pushed.task.step(world)? == StepState::Running {
                return Ok(StepState::Running);
            }
            let (unit, shortfall) = (pushed.unit, pushed.shortfall);
            self.moving = None;
            if world.is_alive(unit) {
                world.mark_displaced(unit);
                world.damage_unit(unit, shortfall);
            }
            return Ok(StepState::Done);
        }

        let Some(victim) = world.grid().unit_at(self.cell) else {
            debug!(cell = %self.cell, "push: no target");
            return Ok(StepState::Done);
        };
        if !world.unit(victim).is_some_and(|u| u.pushable) {
            debug!(unit = victim, "push: target is not pushable");
            return Ok(StepState::Done);
        }

        let mut furthest = self.cell;
        let mut possible = 0;
        let mut straight = Vec::new();
        for _ in 0..self.distance {
            let candidate = furthest.step(self.direction);
            if !world.grid().is_free(candidate) {
                break;
            }
            furthest = candidate;
            possible += 1;
            straight.push(candidate);
        }
        let shortfall = self.distance - possible;
        debug!(unit = victim, possible, shortfall, "push resolved");

        if possible == 0 {
            world.damage_unit(victim, shortfall);
            return Ok(StepState::Done);
        }

        let route = world
            .grid()
            .path_between(self.cell, furthest)
            .unwrap_or(straight);
        self.moving = Some(PushedUnit {
            task: MoveTask::new(victim, route, self.speed),
            unit: victim,
            shortfall,
        });
        Ok(StepState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{NullFactory, SpawnedUnit};
    use crate::data::BattleConfig;
    use crate::hazards::HazardKind;
    use crate::navmesh::GroundSource;
    use crate::status::StatusEffect;
    use crate::units::{Health, UnitSpawnParams};

    fn world(width: i32, height: i32) -> World {
        World::new(&GroundSource::rectangle(width, height), BattleConfig::default())
    }

    fn grunt(health: u32) -> UnitSpawnParams {
        UnitSpawnParams::hostile("grunt", health, 0)
    }

    fn run(world: &mut World, action: Action) -> u32 {
        let mut factory = NullFactory;
        let mut ctx = ExecContext::new(world, &mut factory);
        let mut task = ActionTask::new(action);
        let mut steps = 0;
        loop {
            steps += 1;
            assert!(steps < 1000, "action did not finish");
            if task.step(&mut ctx).unwrap() == StepState::Done {
                return steps;
            }
        }
    }

    fn health(world: &World, id: UnitId) -> Option<u32> {
        world.unit(id).and_then(|u| u.health).map(|h| h.current)
    }

    #[test]
    fn test_move_interpolates_then_relocates() {
        let mut world = world(5, 1);
        let id = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let steps = run(
            &mut world,
            Action::Move {
                unit: id,
                waypoints: vec![Cell::new(1, 0), Cell::new(2, 0)],
                speed: Fixed::from_num(0.5),
            },
        );
        assert_eq!(steps, 4);
        assert_eq!(world.unit(id).map(|u| u.cell), Some(Cell::new(2, 0)));
        assert!(world.grid().is_free(Cell::new(0, 0)));
    }

    #[test]
    fn test_move_at_default_speed_takes_fixed_steps_per_tile() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let speed = world.config().move_speed;
        let steps = run(
            &mut world,
            Action::Move {
                unit: id,
                waypoints: vec![
                    Cell::new(1, 0),
                    Cell::new(2, 0),
                    Cell::new(2, 1),
                    Cell::new(2, 2),
                ],
                speed,
            },
        );
        assert_eq!(steps, 16);
        assert_eq!(world.unit(id).map(|u| u.cell), Some(Cell::new(2, 2)));
    }

    #[test]
    fn test_move_stops_before_occupied_waypoint() {
        let mut world = world(5, 1);
        let id = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        world.spawn_unit(&grunt(3), Cell::new(2, 0)).unwrap();
        run(
            &mut world,
            Action::Move {
                unit: id,
                waypoints: vec![Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0)],
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(id).map(|u| u.cell), Some(Cell::new(1, 0)));
    }

    #[test]
    fn test_move_applies_hazard_per_waypoint() {
        let mut world = world(5, 1);
        let id = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let laser = HazardSpec {
            kind: HazardKind::Laser,
            duration: None,
        };
        world.create_hazard(laser, Cell::new(1, 0)).unwrap();
        world.create_hazard(laser, Cell::new(2, 0)).unwrap();
        run(
            &mut world,
            Action::Move {
                unit: id,
                waypoints: vec![Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0)],
                speed: Fixed::ONE,
            },
        );
        assert_eq!(health(&world, id), Some(1));
    }

    #[test]
    fn test_move_of_dead_unit_is_inert() {
        let mut world = world(3, 1);
        let steps = run(
            &mut world,
            Action::Move {
                unit: 42,
                waypoints: vec![Cell::new(1, 0)],
                speed: Fixed::ONE,
            },
        );
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_charge_stopped_by_wall() {
        let mut world = world(6, 1);
        let runner = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let wall = world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(3, 0)).unwrap();
        run(
            &mut world,
            Action::ChargeMove {
                unit: runner,
                direction: Direction::Right,
                range: 5,
                damage: 2,
                knockback: 1,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(runner).map(|u| u.cell), Some(Cell::new(2, 0)));
        assert_eq!(world.unit(wall).map(|u| u.cell), Some(Cell::new(3, 0)));
    }

    #[test]
    fn test_charge_hits_and_pushes_unit() {
        let mut world = world(6, 1);
        let runner = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let victim = world.spawn_unit(&grunt(5), Cell::new(3, 0)).unwrap();
        run(
            &mut world,
            Action::ChargeMove {
                unit: runner,
                direction: Direction::Right,
                range: 5,
                damage: 2,
                knockback: 1,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(runner).map(|u| u.cell), Some(Cell::new(2, 0)));
        assert_eq!(world.unit(victim).map(|u| u.cell), Some(Cell::new(4, 0)));
        assert_eq!(health(&world, victim), Some(3));
        assert_eq!(world.take_displaced(), vec![victim]);
    }

    #[test]
    fn test_charge_range_exhausted_hits_nothing() {
        let mut world = world(6, 1);
        let runner = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let victim = world.spawn_unit(&grunt(5), Cell::new(3, 0)).unwrap();
        run(
            &mut world,
            Action::ChargeMove {
                unit: runner,
                direction: Direction::Right,
                range: 1,
                damage: 2,
                knockback: 1,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(runner).map(|u| u.cell), Some(Cell::new(1, 0)));
        assert_eq!(health(&world, victim), Some(5));
    }

    #[test]
    fn test_push_with_insufficient_room() {
        let mut world = world(6, 1);
        let victim = world.spawn_unit(&grunt(10), Cell::new(0, 0)).unwrap();
        world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(2, 0)).unwrap();
        run(
            &mut world,
            Action::Push {
                cell: Cell::new(0, 0),
                direction: Direction::Right,
                distance: 5,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(victim).map(|u| u.cell), Some(Cell::new(1, 0)));
        assert_eq!(health(&world, victim), Some(6));
    }

    #[test]
    fn test_push_against_wall_without_room() {
        let mut world = world(3, 1);
        let victim = world.spawn_unit(&grunt(10), Cell::new(0, 0)).unwrap();
        world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(1, 0)).unwrap();
        run(
            &mut world,
            Action::Push {
                cell: Cell::new(0, 0),
                direction: Direction::Right,
                distance: 2,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(victim).map(|u| u.cell), Some(Cell::new(0, 0)));
        assert_eq!(health(&world, victim), Some(8));
        assert!(world.take_displaced().is_empty());
    }

    #[test]
    fn test_push_ignores_unpushable() {
        let mut world = world(3, 1);
        let params = UnitSpawnParams {
            pushable: false,
            ..grunt(4)
        };
        let rock = world.spawn_unit(&params, Cell::new(0, 0)).unwrap();
        run(
            &mut world,
            Action::Push {
                cell: Cell::new(0, 0),
                direction: Direction::Right,
                distance: 2,
                speed: Fixed::ONE,
            },
        );
        assert_eq!(world.unit(rock).map(|u| u.cell), Some(Cell::new(0, 0)));
        assert_eq!(health(&world, rock), Some(4));
    }

    #[test]
    fn test_area_damage_skips_empty_cells() {
        let mut world = world(4, 1);
        let a = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let b = world.spawn_unit(&grunt(3), Cell::new(2, 0)).unwrap();
        let before = world.clone();

        let steps = run(
            &mut world,
            Action::area_damage([Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0)], 1),
        );
        assert_eq!(steps, 3);
        assert_eq!(health(&world, a), Some(2));
        assert_eq!(health(&world, b), Some(2));
        assert_eq!(world.unit_at(Cell::new(1, 0)), before.unit_at(Cell::new(1, 0)));
    }

    #[test]
    fn test_apply_status_to_occupant() {
        let mut world = world(3, 1);
        let id = world.spawn_unit(&grunt(3), Cell::new(1, 0)).unwrap();
        run(
            &mut world,
            Action::ApplyStatus {
                cell: Cell::new(1, 0),
                effect: StatusEffect::Shield { amount: 2 },
            },
        );
        run(
            &mut world,
            Action::ApplyStatus {
                cell: Cell::new(2, 0),
                effect: StatusEffect::Shield { amount: 2 },
            },
        );
        assert_eq!(
            world.unit(id).and_then(|u| u.health),
            Some(Health {
                current: 3,
                max: 3,
                shield: 2
            })
        );
    }

    #[test]
    fn test_create_hazard_sites() {
        let source = GroundSource::rectangle(4, 1).with_obstacle(Cell::new(3, 0));
        let mut world = World::new(&source, BattleConfig::default());
        world.spawn_unit(&grunt(3), Cell::new(1, 0)).unwrap();
        run(
            &mut world,
            Action::CreateHazard {
                cells: vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(3, 0), Cell::new(9, 9)],
                spec: HazardSpec {
                    kind: HazardKind::Fire,
                    duration: Some(2),
                },
            },
        );
        let cells: Vec<Cell> = world.hazards().map(|h| h.cell).collect();
        assert_eq!(cells, vec![Cell::new(0, 0), Cell::new(1, 0)]);
    }

    #[test]
    fn test_instant_move() {
        let mut world = world(4, 1);
        let id = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let steps = run(
            &mut world,
            Action::InstantMove {
                unit: id,
                cell: Cell::new(3, 0),
            },
        );
        assert_eq!(steps, 1);
        assert_eq!(world.unit(id).map(|u| u.cell), Some(Cell::new(3, 0)));
    }

    #[test]
    fn test_targeted_shot_hits_first_unit_on_line() {
        let mut world = world(6, 1);
        let shooter = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let blocker = world.spawn_unit(&grunt(3), Cell::new(2, 0)).unwrap();
        let target = world.spawn_unit(&grunt(3), Cell::new(5, 0)).unwrap();
        run(
            &mut world,
            Action::TargetedLineShot {
                sender: shooter,
                target,
                damage: 2,
            },
        );
        assert_eq!(health(&world, blocker), Some(1));
        assert_eq!(health(&world, target), Some(3));
        assert_eq!(health(&world, shooter), Some(3));
    }

    #[test]
    fn test_targeted_shot_stopped_by_terrain() {
        let source = GroundSource::rectangle(5, 1).with_obstacle(Cell::new(2, 0));
        let mut world = World::new(&source, BattleConfig::default());
        let shooter = world.spawn_unit(&grunt(3), Cell::new(0, 0)).unwrap();
        let target = world.spawn_unit(&grunt(3), Cell::new(4, 0)).unwrap();
        run(
            &mut world,
            Action::TargetedLineShot {
                sender: shooter,
                target,
                damage: 2,
            },
        );
        assert_eq!(health(&world, target), Some(3));
    }

    struct DummyFactory;

    impl UnitFactory for DummyFactory {
        fn spawn(&mut self, template: &str, _cell: Cell) -> Option<SpawnedUnit> {
            (template == "pup").then(|| SpawnedUnit {
                params: UnitSpawnParams::hostile("pup", 1, 0),
                behavior: None,
            })
        }
    }

    #[test]
    fn test_spawn_through_factory() {
        let mut world = world(3, 1);
        let mut factory = DummyFactory;
        let mut ctx = ExecContext::new(&mut world, &mut factory);

        let mut task = ActionTask::new(Action::SpawnUnit {
            template: "pup".into(),
            cell: Cell::new(1, 0),
        });
        assert_eq!(task.step(&mut ctx).unwrap(), StepState::Done);
        assert!(task.is_done());

        let mut unknown = ActionTask::new(Action::SpawnUnit {
            template: "nope".into(),
            cell: Cell::new(2, 0),
        });
        unknown.step(&mut ctx).unwrap();

        let spawned = ctx.take_spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(world.unit_at(Cell::new(1, 0)).map(|u| u.template.as_str()), Some("pup"));
        assert!(world.grid().is_free(Cell::new(2, 0)));
    }
}
