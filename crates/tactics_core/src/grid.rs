//! Spatial index: occupancy registries, geometry queries, and bake control.
//!
//! [`SpatialIndex`] is the single source of truth for "can something stand
//! here". Every registry mutation rebakes the navmesh before returning, so a
//! path or distance computed after a mutation always sees the new occupancy.
//! Paths and distances computed *before* a mutation are stale the moment it
//! happens and must not be reused.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cell::{Cell, Direction};
use crate::error::{GameError, Result};
use crate::hazards::HazardId;
use crate::math::{Fixed, Vec2Fixed};
use crate::navmesh::{GroundSource, NavMesh};
use crate::pathfinding::find_path;
use crate::units::UnitId;

/// Path length between two cells.
///
/// `Unreachable` orders after every `Steps` value, so "closest" comparisons
/// never pick an unreachable target by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Distance {
    /// Reachable in this many cardinal steps.
    Steps(u32),
    /// No path under the current bake.
    Unreachable,
}

impl Distance {
    /// Step count, if reachable.
    #[must_use]
    pub const fn steps(self) -> Option<u32> {
        match self {
            Self::Steps(n) => Some(n),
            Self::Unreachable => None,
        }
    }

    /// True for any `Steps` value.
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Steps(_))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps(n) => write!(f, "{n}"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Facade over the navmesh and the unit/hazard registries.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    mesh: NavMesh,
    units: BTreeMap<UnitId, Cell>,
    occupancy: BTreeMap<Cell, UnitId>,
    hazards: BTreeMap<HazardId, Cell>,
}

impl SpatialIndex {
    /// Create an index over the given terrain with no units or hazards.
    #[must_use]
    pub fn new(source: &GroundSource, tile_size: Fixed) -> Self {
        Self {
            mesh: NavMesh::new(source, tile_size),
            units: BTreeMap::new(),
            occupancy: BTreeMap::new(),
            hazards: BTreeMap::new(),
        }
    }

    /// The navmesh as of the latest bake.
    #[must_use]
    pub fn navmesh(&self) -> &NavMesh {
        &self.mesh
    }

    /// Footprint width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.mesh.width()
    }

    /// Footprint height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.mesh.height()
    }

    /// True if `cell` lies inside the footprint.
    #[must_use]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.mesh.in_bounds(cell)
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    /// World-space centre of a cell.
    #[must_use]
    pub fn world_position(&self, cell: Cell) -> Vec2Fixed {
        self.mesh.world_position(cell)
    }

    /// Cell under a world position, or [`Cell::SENTINEL`] outside the footprint.
    #[must_use]
    pub fn cell_position(&self, position: Vec2Fixed) -> Cell {
        let cell = self.mesh.cell_at_world(position);
        if self.in_bounds(cell) {
            cell
        } else {
            Cell::SENTINEL
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Path under the current bake. See [`find_path`].
    #[must_use]
    pub fn path_between(&self, a: Cell, b: Cell) -> Option<Vec<Cell>> {
        find_path(&self.mesh, a, b)
    }

    /// Path length under the current bake.
    #[must_use]
    pub fn distance(&self, a: Cell, b: Cell) -> Distance {
        match self.path_between(a, b) {
            Some(path) => Distance::Steps(path.len() as u32),
            None => Distance::Unreachable,
        }
    }

    /// Manhattan distance, ignoring everything on the map.
    #[must_use]
    pub fn manhattan(&self, a: Cell, b: Cell) -> u32 {
        a.manhattan(b)
    }

    /// True iff in bounds, not blocked by terrain, and not holding a unit.
    ///
    /// Computed from the registry rather than the bake, so it stays correct
    /// inside a temporary excluding-bake.
    #[must_use]
    pub fn is_free(&self, cell: Cell) -> bool {
        !self.mesh.is_terrain_blocked(cell) && !self.occupancy.contains_key(&cell)
    }

    /// True if static terrain alone blocks `cell`.
    #[must_use]
    pub fn is_terrain_blocked(&self, cell: Cell) -> bool {
        self.mesh.is_terrain_blocked(cell)
    }

    /// True iff `b` is one cardinal step from `a`.
    #[must_use]
    pub fn adjacent(&self, a: Cell, b: Cell) -> bool {
        a.is_adjacent(b) || b.is_adjacent(a)
    }

    /// True if the cells share a row or column.
    #[must_use]
    pub fn in_straight_line(&self, a: Cell, b: Cell) -> bool {
        a.is_colinear(b)
    }

    /// Dominant direction from `a` to `b`.
    #[must_use]
    pub fn direction_to(&self, a: Cell, b: Cell) -> Direction {
        Direction::toward(a, b)
    }

    /// Cells strictly between two colinear cells, ordered from `a` toward `b`.
    pub fn tiles_between(&self, a: Cell, b: Cell) -> Result<Vec<Cell>> {
        if !a.is_colinear(b) {
            return Err(GameError::NotColinear { a, b });
        }
        if a == b {
            return Ok(Vec::new());
        }

        let direction = Direction::toward(a, b);
        let count = a.manhattan(b) as i32;
        Ok((1..count).map(|n| a.offset(direction, n)).collect())
    }

    /// True iff every cell strictly between two colinear cells is free.
    pub fn line_of_sight(&self, a: Cell, b: Cell) -> Result<bool> {
        Ok(self
            .tiles_between(a, b)?
            .into_iter()
            .all(|cell| self.is_free(cell)))
    }

    /// Bresenham rasterization from `a` to `b`, both endpoints included.
    #[must_use]
    pub fn rasterize_line(&self, a: Cell, b: Cell) -> Vec<Cell> {
        rasterize_line(a, b)
    }

    /// In-bounds cells within Chebyshev `radius` of `center`, excluding it.
    #[must_use]
    pub fn surrounding_tiles(&self, center: Cell, radius: u32) -> Vec<Cell> {
        let r = radius as i32;
        let mut tiles = Vec::new();
        for y in (center.y - r)..=(center.y + r) {
            for x in (center.x - r)..=(center.x + r) {
                let cell = Cell::new(x, y);
                if cell != center && self.in_bounds(cell) {
                    tiles.push(cell);
                }
            }
        }
        tiles
    }

    /// Free cardinal neighbours of `cell`.
    #[must_use]
    pub fn free_adjacent_tiles(&self, cell: Cell) -> Vec<Cell> {
        cell.cardinal_neighbors()
            .into_iter()
            .filter(|c| self.is_free(*c))
            .collect()
    }

    // ------------------------------------------------------------------
    // Unit registry
    // ------------------------------------------------------------------

    /// Unit standing on `cell`.
    #[must_use]
    pub fn unit_at(&self, cell: Cell) -> Option<UnitId> {
        self.occupancy.get(&cell).copied()
    }

    /// Registered cell of a unit.
    #[must_use]
    pub fn unit_cell(&self, unit: UnitId) -> Option<Cell> {
        self.units.get(&unit).copied()
    }

    /// All registered units in id order.
    pub fn units(&self) -> impl Iterator<Item = (UnitId, Cell)> + '_ {
        self.units.iter().map(|(&id, &cell)| (id, cell))
    }

    /// Place a unit on a free cell and rebake.
    pub fn register_unit(&mut self, unit: UnitId, cell: Cell) -> Result<()> {
        if self.units.contains_key(&unit) {
            return Err(GameError::DuplicateUnit(unit));
        }
        self.check_placeable(cell)?;

        self.units.insert(unit, cell);
        self.occupancy.insert(cell, unit);
        self.rebake();
        debug!(unit, %cell, "unit registered");
        Ok(())
    }

    /// Remove a unit and rebake. Returns the cell it stood on.
    pub fn unregister_unit(&mut self, unit: UnitId) -> Option<Cell> {
        let cell = self.units.remove(&unit)?;
        self.occupancy.remove(&cell);
        self.rebake();
        debug!(unit, %cell, "unit unregistered");
        Some(cell)
    }

    /// Move a registered unit to `cell` and rebake.
    pub fn update_unit_position(&mut self, unit: UnitId, cell: Cell) -> Result<()> {
        let previous = self
            .units
            .get(&unit)
            .copied()
            .ok_or(GameError::UnitNotFound(unit))?;
        if previous == cell {
            return Ok(());
        }
        self.check_placeable(cell)?;

        self.occupancy.remove(&previous);
        self.occupancy.insert(cell, unit);
        self.units.insert(unit, cell);
        self.rebake();
        trace!(unit, from = %previous, to = %cell, "unit position updated");
        Ok(())
    }

    fn check_placeable(&self, cell: Cell) -> Result<()> {
        if !self.in_bounds(cell) {
            return Err(GameError::OutOfBounds(cell));
        }
        if !self.is_free(cell) {
            return Err(GameError::CellOccupied(cell));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hazard registry
    // ------------------------------------------------------------------

    /// Attach a hazard to a cell. Hazards never block movement.
    pub fn register_hazard(&mut self, hazard: HazardId, cell: Cell) -> Result<()> {
        if !self.in_bounds(cell) {
            return Err(GameError::OutOfBounds(cell));
        }
        self.hazards.insert(hazard, cell);
        Ok(())
    }

    /// Detach a hazard. Returns its cell.
    pub fn unregister_hazard(&mut self, hazard: HazardId) -> Option<Cell> {
        self.hazards.remove(&hazard)
    }

    /// First hazard (lowest id) on a cell.
    #[must_use]
    pub fn hazard_at(&self, cell: Cell) -> Option<HazardId> {
        self.hazards_at(cell).into_iter().next()
    }

    /// All hazards on a cell, in id order.
    #[must_use]
    pub fn hazards_at(&self, cell: Cell) -> Vec<HazardId> {
        self.hazards
            .iter()
            .filter(|(_, c)| **c == cell)
            .map(|(&id, _)| id)
            .collect()
    }

    /// All hazards in id order.
    pub fn all_hazards(&self) -> impl Iterator<Item = (HazardId, Cell)> + '_ {
        self.hazards.iter().map(|(&id, &cell)| (id, cell))
    }

    // ------------------------------------------------------------------
    // Bake control
    // ------------------------------------------------------------------

    /// Standard bake: registered units block their cells.
    pub fn rebake(&mut self) {
        let occupied = self.occupied_cells();
        self.mesh.bake(&occupied, &BTreeSet::new(), &BTreeSet::new());
    }

    /// Bake with `cells` passable even if a unit stands there.
    ///
    /// Leaves the index in a non-standard bake; pair with [`Self::rebake`]
    /// or use [`Self::with_ignored`].
    pub fn rebake_excluding(&mut self, cells: &BTreeSet<Cell>) {
        let occupied = self.occupied_cells();
        self.mesh.bake(&occupied, &BTreeSet::new(), cells);
    }

    /// Bake with hazard cells blocked as well as units.
    pub fn rebake_including_hazards(&mut self) {
        let occupied = self.occupied_cells();
        let hazardous: BTreeSet<Cell> = self.hazards.values().copied().collect();
        self.mesh.bake(&occupied, &hazardous, &BTreeSet::new());
    }

    /// Run `f` under an excluding-bake, then restore the standard bake.
    pub fn with_ignored<R>(&mut self, cells: &BTreeSet<Cell>, f: impl FnOnce(&Self) -> R) -> R {
        self.rebake_excluding(cells);
        let result = f(self);
        self.rebake();
        result
    }

    /// Path length between two units with neither one blocking the other.
    #[must_use]
    pub fn distance_between_units(&mut self, a: UnitId, b: UnitId) -> Distance {
        let (Some(cell_a), Some(cell_b)) = (self.unit_cell(a), self.unit_cell(b)) else {
            return Distance::Unreachable;
        };
        let ignored: BTreeSet<Cell> = [cell_a, cell_b].into_iter().collect();
        self.with_ignored(&ignored, |index| index.distance(cell_a, cell_b))
    }

    /// Path that avoids hazard cells when one exists, otherwise any path.
    ///
    /// Always restores the standard bake before returning.
    #[must_use]
    pub fn path_avoiding_hazards(&mut self, a: Cell, b: Cell) -> Option<Vec<Cell>> {
        self.rebake_including_hazards();
        let safe = self.path_between(a, b);
        self.rebake();
        safe.or_else(|| self.path_between(a, b))
    }

    fn occupied_cells(&self) -> BTreeSet<Cell> {
        self.occupancy.keys().copied().collect()
    }
}

/// Bresenham rasterization from `a` to `b`, both endpoints included.
#[must_use]
pub fn rasterize_line(a: Cell, b: Cell) -> Vec<Cell> {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx - dy;

    let (mut x, mut y) = (a.x, a.y);
    let mut cells = Vec::with_capacity((dx.max(dy) + 1) as usize);

    loop {
        cells.push(Cell::new(x, y));
        if x == b.x && y == b.y {
            break;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }

    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(width: i32, height: i32) -> SpatialIndex {
        SpatialIndex::new(&GroundSource::rectangle(width, height), Fixed::ONE)
    }

    #[test]
    fn test_register_blocks_and_rebakes() {
        let mut grid = index(5, 5);
        let cell = Cell::new(2, 2);
        grid.register_unit(1, cell).unwrap();

        assert!(!grid.is_free(cell));
        assert!(!grid.navmesh().is_walkable(cell));
        assert_eq!(grid.unit_at(cell), Some(1));
        assert_eq!(
            grid.register_unit(2, cell),
            Err(GameError::CellOccupied(cell))
        );
        assert_eq!(
            grid.register_unit(1, Cell::new(0, 0)),
            Err(GameError::DuplicateUnit(1))
        );
    }

    #[test]
    fn test_update_position_frees_old_cell() {
        let mut grid = index(5, 5);
        let a = Cell::new(0, 0);
        let b = Cell::new(3, 1);
        grid.register_unit(7, a).unwrap();
        grid.update_unit_position(7, b).unwrap();

        assert!(grid.is_free(a));
        assert!(grid.navmesh().is_walkable(a));
        assert!(!grid.is_free(b));
        assert!(!grid.navmesh().is_walkable(b));
        assert_eq!(grid.unit_cell(7), Some(b));
    }

    #[test]
    fn test_unregister_frees_cell() {
        let mut grid = index(3, 3);
        grid.register_unit(1, Cell::new(1, 1)).unwrap();
        assert_eq!(grid.unregister_unit(1), Some(Cell::new(1, 1)));
        assert!(grid.is_free(Cell::new(1, 1)));
        assert_eq!(grid.unregister_unit(1), None);
    }

    #[test]
    fn test_distance_unreachable_is_not_zero() {
        let mut grid = index(3, 1);
        grid.register_unit(1, Cell::new(1, 0)).unwrap();

        assert_eq!(grid.distance(Cell::new(0, 0), Cell::new(2, 0)), Distance::Unreachable);
        assert_eq!(grid.distance(Cell::new(0, 0), Cell::new(0, 0)), Distance::Steps(0));
        assert!(Distance::Steps(u32::MAX) < Distance::Unreachable);
    }

    #[test]
    fn test_distance_between_units_ignores_both() {
        let mut grid = index(5, 1);
        grid.register_unit(1, Cell::new(0, 0)).unwrap();
        grid.register_unit(2, Cell::new(4, 0)).unwrap();

        assert_eq!(grid.distance_between_units(1, 2), Distance::Steps(4));
        // Standard bake restored.
        assert!(!grid.navmesh().is_walkable(Cell::new(0, 0)));
        assert!(!grid.navmesh().is_walkable(Cell::new(4, 0)));
    }

    #[test]
    fn test_tiles_between_and_line_of_sight() {
        let mut grid = index(6, 6);
        let tiles = grid.tiles_between(Cell::new(0, 2), Cell::new(4, 2)).unwrap();
        assert_eq!(tiles, vec![Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]);

        let reversed = grid.tiles_between(Cell::new(1, 5), Cell::new(1, 3)).unwrap();
        assert_eq!(reversed, vec![Cell::new(1, 4)]);

        assert_eq!(
            grid.tiles_between(Cell::new(0, 0), Cell::new(1, 1)),
            Err(GameError::NotColinear {
                a: Cell::new(0, 0),
                b: Cell::new(1, 1)
            })
        );

        assert_eq!(grid.line_of_sight(Cell::new(0, 2), Cell::new(4, 2)), Ok(true));
        grid.register_unit(9, Cell::new(2, 2)).unwrap();
        assert_eq!(grid.line_of_sight(Cell::new(0, 2), Cell::new(4, 2)), Ok(false));
        assert!(grid.line_of_sight(Cell::new(0, 0), Cell::new(3, 3)).is_err());
    }

    #[test]
    fn test_rasterize_line_includes_endpoints() {
        let line = rasterize_line(Cell::new(0, 0), Cell::new(4, 2));
        assert_eq!(line.first(), Some(&Cell::new(0, 0)));
        assert_eq!(line.last(), Some(&Cell::new(4, 2)));
        assert_eq!(line.len(), 5);

        let back = rasterize_line(Cell::new(3, 3), Cell::new(3, 0));
        assert_eq!(
            back,
            vec![Cell::new(3, 3), Cell::new(3, 2), Cell::new(3, 1), Cell::new(3, 0)]
        );
        assert_eq!(rasterize_line(Cell::new(1, 1), Cell::new(1, 1)), vec![Cell::new(1, 1)]);
    }

    #[test]
    fn test_cell_position_sentinel() {
        let grid = index(4, 4);
        assert_eq!(grid.cell_position(Vec2Fixed::from_ints(2, 3)), Cell::new(2, 3));
        assert_eq!(grid.cell_position(Vec2Fixed::from_ints(9, 0)), Cell::SENTINEL);
        assert_eq!(grid.cell_position(Vec2Fixed::from_ints(-1, 0)), Cell::SENTINEL);
    }

    #[test]
    fn test_adjacent_is_cardinal_only() {
        let grid = index(3, 3);
        assert!(grid.adjacent(Cell::new(1, 1), Cell::new(1, 0)));
        assert!(!grid.adjacent(Cell::new(1, 1), Cell::new(0, 0)));
        assert!(!grid.adjacent(Cell::new(1, 1), Cell::new(1, 1)));
    }

    #[test]
    fn test_surrounding_tiles_clipped_to_bounds() {
        let grid = index(4, 4);
        assert_eq!(grid.surrounding_tiles(Cell::new(1, 1), 1).len(), 8);
        assert_eq!(grid.surrounding_tiles(Cell::new(0, 0), 1).len(), 3);
        assert_eq!(grid.surrounding_tiles(Cell::new(0, 0), 2).len(), 8);
    }

    #[test]
    fn test_path_avoiding_hazards_prefers_safe_route() {
        let mut grid = index(3, 2);
        grid.register_hazard(1, Cell::new(1, 0)).unwrap();

        let path = grid.path_avoiding_hazards(Cell::new(0, 0), Cell::new(2, 0)).unwrap();
        assert!(!path.contains(&Cell::new(1, 0)));

        grid.register_hazard(2, Cell::new(1, 1)).unwrap();
        let fallback = grid.path_avoiding_hazards(Cell::new(0, 0), Cell::new(2, 0)).unwrap();
        assert_eq!(fallback.len(), 2);
        assert!(grid.navmesh().is_walkable(Cell::new(1, 0)));
    }

    #[test]
    fn test_hazards_do_not_block() {
        let mut grid = index(3, 1);
        grid.register_hazard(4, Cell::new(1, 0)).unwrap();
        grid.register_hazard(3, Cell::new(1, 0)).unwrap();
        assert!(grid.is_free(Cell::new(1, 0)));
        assert_eq!(grid.hazards_at(Cell::new(1, 0)), vec![3, 4]);
        assert_eq!(grid.hazard_at(Cell::new(1, 0)), Some(3));
        assert_eq!(grid.unregister_hazard(3), Some(Cell::new(1, 0)));
        assert_eq!(grid.all_hazards().count(), 1);
    }

    #[test]
    fn test_free_adjacent_tiles() {
        let mut grid = index(3, 3);
        grid.register_unit(1, Cell::new(1, 2)).unwrap();
        let free = grid.free_adjacent_tiles(Cell::new(1, 1));
        assert_eq!(free, vec![Cell::new(0, 1), Cell::new(2, 1), Cell::new(1, 0)]);
    }
}
