//! Obstruction map over the walkable footprint of a map.
//!
//! The navmesh is rebuilt ("baked") from a snapshot of blocked cells every
//! time occupancy changes. Between bakes it is read-only, so any number of
//! path searches can borrow it at once.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cell::Cell;
use crate::math::{Fixed, Vec2Fixed};

/// Static terrain a navmesh is baked from.
///
/// Coordinates are world tiles, i.e. before the footprint offset is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundSource {
    /// Tiles with walkable ground.
    pub ground: BTreeSet<Cell>,
    /// Ground tiles permanently blocked by walls, rocks and the like.
    pub obstacles: BTreeSet<Cell>,
}

impl GroundSource {
    /// A fully open `width` x `height` rectangle starting at tile `(0, 0)`.
    #[must_use]
    pub fn rectangle(width: i32, height: i32) -> Self {
        let ground = (0..height)
            .flat_map(|y| (0..width).map(move |x| Cell::new(x, y)))
            .collect();
        Self {
            ground,
            obstacles: BTreeSet::new(),
        }
    }

    /// Add a static obstacle.
    #[must_use]
    pub fn with_obstacle(mut self, tile: Cell) -> Self {
        self.obstacles.insert(tile);
        self
    }
}

/// A single grid cell as seen by the pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// Index of the node inside the footprint.
    pub grid_position: Cell,
    /// Centre of the cell in world units.
    pub world_position: Vec2Fixed,
    /// Whether the latest bake marked this cell as impassable.
    pub obstructed: bool,
}

/// Rectangular array of [`Node`]s covering the ground footprint.
#[derive(Debug, Clone)]
pub struct NavMesh {
    width: i32,
    height: i32,
    /// World tile of grid cell `(0, 0)`.
    offset: Cell,
    tile_size: Fixed,
    /// Row-major nodes.
    nodes: Vec<Node>,
    /// Cells that are obstructed regardless of occupancy: void and obstacles.
    terrain_blocked: BTreeSet<Cell>,
}

impl NavMesh {
    /// Build a navmesh from static terrain with nothing else obstructed.
    #[must_use]
    pub fn new(source: &GroundSource, tile_size: Fixed) -> Self {
        let (offset, width, height) = footprint(&source.ground);

        let mut terrain_blocked = BTreeSet::new();
        for y in 0..height {
            for x in 0..width {
                let tile = Cell::new(x + offset.x, y + offset.y);
                if !source.ground.contains(&tile) || source.obstacles.contains(&tile) {
                    terrain_blocked.insert(Cell::new(x, y));
                }
            }
        }

        let mut mesh = Self {
            width,
            height,
            offset,
            tile_size,
            nodes: Vec::with_capacity((width * height).max(0) as usize),
            terrain_blocked,
        };
        mesh.bake(&BTreeSet::new(), &BTreeSet::new(), &BTreeSet::new());
        mesh
    }

    /// Recompute every node's obstruction flag.
    ///
    /// A cell is obstructed iff it is in `occupied ∪ additional_blocked ∪
    /// terrain` and not in `ignored`.
    pub fn bake(
        &mut self,
        occupied: &BTreeSet<Cell>,
        additional_blocked: &BTreeSet<Cell>,
        ignored: &BTreeSet<Cell>,
    ) {
        self.nodes.clear();
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = Cell::new(x, y);
                let blocked = self.terrain_blocked.contains(&cell)
                    || occupied.contains(&cell)
                    || additional_blocked.contains(&cell);
                self.nodes.push(Node {
                    grid_position: cell,
                    world_position: self.world_position(cell),
                    obstructed: blocked && !ignored.contains(&cell),
                });
            }
        }
        trace!(
            occupied = occupied.len(),
            additional = additional_blocked.len(),
            ignored = ignored.len(),
            "navmesh baked"
        );
    }

    /// Footprint width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Footprint height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the footprint is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// World tile of cell `(0, 0)`.
    #[must_use]
    pub fn offset(&self) -> Cell {
        self.offset
    }

    /// Size of one tile in world units.
    #[must_use]
    pub fn tile_size(&self) -> Fixed {
        self.tile_size
    }

    /// Check if a cell lies inside the footprint.
    #[must_use]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Row-major index of an in-bounds cell.
    #[must_use]
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y * self.width + cell.x) as usize)
        } else {
            None
        }
    }

    /// Bounds-checked node lookup.
    #[must_use]
    pub fn node_at(&self, cell: Cell) -> Option<&Node> {
        self.index_of(cell).map(|i| &self.nodes[i])
    }

    /// Node under a world position, if any.
    #[must_use]
    pub fn node_at_world(&self, position: Vec2Fixed) -> Option<&Node> {
        self.node_at(self.cell_at_world(position))
    }

    /// True if the latest bake left `cell` passable. Out of bounds is never passable.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.node_at(cell).is_some_and(|n| !n.obstructed)
    }

    /// True if static terrain alone blocks `cell` (void, obstacle, or out of bounds).
    #[must_use]
    pub fn is_terrain_blocked(&self, cell: Cell) -> bool {
        !self.in_bounds(cell) || self.terrain_blocked.contains(&cell)
    }

    /// In-bounds cardinal neighbours, in search order.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = &Node> + '_ {
        cell.cardinal_neighbors()
            .into_iter()
            .filter_map(move |c| self.node_at(c))
    }

    /// World-space centre of a cell. Defined for any cell, in bounds or not.
    #[must_use]
    pub fn world_position(&self, cell: Cell) -> Vec2Fixed {
        Vec2Fixed::new(
            Fixed::from_num(cell.x + self.offset.x) * self.tile_size,
            Fixed::from_num(cell.y + self.offset.y) * self.tile_size,
        )
    }

    /// Grid cell nearest to a world position. May be out of bounds.
    #[must_use]
    pub fn cell_at_world(&self, position: Vec2Fixed) -> Cell {
        let tile_x = (position.x / self.tile_size).round().to_num::<i32>();
        let tile_y = (position.y / self.tile_size).round().to_num::<i32>();
        Cell::new(tile_x - self.offset.x, tile_y - self.offset.y)
    }

    /// All nodes in row-major order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Bounding rectangle of the ground tiles: offset, width, height.
fn footprint(ground: &BTreeSet<Cell>) -> (Cell, i32, i32) {
    let Some(first) = ground.iter().next() else {
        return (Cell::new(0, 0), 0, 0);
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for tile in ground {
        min_x = min_x.min(tile.x);
        max_x = max_x.max(tile.x);
        min_y = min_y.min(tile.y);
        max_y = max_y.max(tile.y);
    }
    (Cell::new(min_x, min_y), max_x - min_x + 1, max_y - min_y + 1)
}
