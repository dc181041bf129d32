//! Grid-based pathfinding using A*.
//!
//! Searches are cardinal-only with unit step cost and a Manhattan heuristic.
//! The open list is scanned linearly and ties on `f` are broken by the lower
//! `h`, then by insertion order, so a given bake always yields the same path.

use tracing::trace;

use crate::cell::Cell;
use crate::navmesh::NavMesh;

/// Per-node search state. Lives for exactly one search.
#[derive(Debug, Clone, Copy, Default)]
struct Scratch {
    g_cost: u32,
    h_cost: u32,
    parent: Option<usize>,
    open: bool,
    closed: bool,
}

impl Scratch {
    const fn f_cost(self) -> u32 {
        self.g_cost + self.h_cost
    }
}

/// Find a path from `start` to `target`.
///
/// The returned cells run from the first step after `start` up to and
/// including `target`; `start == target` yields an empty path. Returns
/// `None` when either end is out of bounds or the target cannot be reached,
/// which includes the target itself being obstructed. The start cell is
/// never checked, so units can search from the cell they occupy.
#[must_use]
pub fn find_path(mesh: &NavMesh, start: Cell, target: Cell) -> Option<Vec<Cell>> {
    let start_idx = mesh.index_of(start)?;
    let target_idx = mesh.index_of(target)?;

    let mut scratch = vec![Scratch::default(); mesh.len()];
    let mut open: Vec<usize> = vec![start_idx];
    scratch[start_idx].open = true;

    while !open.is_empty() {
        // Lowest f wins; equal f falls back to lowest h; full ties keep the earliest entry.
        let mut best = 0;
        for (pos, &idx) in open.iter().enumerate().skip(1) {
            let candidate = scratch[idx];
            let current = scratch[open[best]];
            if candidate.f_cost() < current.f_cost()
                || (candidate.f_cost() == current.f_cost() && candidate.h_cost < current.h_cost)
            {
                best = pos;
            }
        }

        let current_idx = open.remove(best);
        scratch[current_idx].open = false;
        scratch[current_idx].closed = true;

        if current_idx == target_idx {
            let path = reconstruct_path(mesh, &scratch, start_idx, target_idx);
            trace!(%start, %target, len = path.len(), "path found");
            return Some(path);
        }

        let current_cell = mesh.nodes()[current_idx].grid_position;
        let current_g = scratch[current_idx].g_cost;

        for neighbor in mesh.neighbors(current_cell) {
            let Some(n_idx) = mesh.index_of(neighbor.grid_position) else {
                continue;
            };
            if neighbor.obstructed || scratch[n_idx].closed {
                continue;
            }

            let move_cost = current_g + current_cell.manhattan(neighbor.grid_position);
            let entry = &mut scratch[n_idx];
            if move_cost < entry.g_cost || !entry.open {
                entry.g_cost = move_cost;
                entry.h_cost = neighbor.grid_position.manhattan(target);
                entry.parent = Some(current_idx);

                if !entry.open {
                    entry.open = true;
                    open.push(n_idx);
                }
            }
        }
    }

    trace!(%start, %target, "no path");
    None
}

/// Walk parent links back from the target, then reverse.
fn reconstruct_path(
    mesh: &NavMesh,
    scratch: &[Scratch],
    start_idx: usize,
    target_idx: usize,
) -> Vec<Cell> {
    let mut path = Vec::new();
    let mut current = target_idx;

    while current != start_idx {
        path.push(mesh.nodes()[current].grid_position);
        match scratch[current].parent {
            Some(parent) => current = parent,
            None => break,
        }
    }

    path.reverse();
    path
}
