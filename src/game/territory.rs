//! Territory ownership grid
//!
//! The map is tiled with square cells of `CELL_SIZE` world units. A cell has at
//! most one owner; painting overwrites unconditionally (last paint wins).
//! Per-player cell counts are maintained incrementally so victory checks never
//! scan the grid.

use bitvec::prelude::*;
use hashbrown::HashMap;

use crate::game::constants::paint_radius_cells;
use crate::game::constants::territory::{CELL_SIZE, DARKNESS_SAMPLE_STRIDE};
use crate::game::error::{CoreError, CoreResult};
use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// Ownership record of one painted cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerritoryCell {
    pub owner_id: PlayerId,
    pub painted_at: u64,
}

#[derive(Debug, Clone)]
pub struct TerritoryGrid {
    width: usize,
    height: usize,
    /// Row-major, created lazily on first paint
    cells: Vec<Option<TerritoryCell>>,
    /// Lit (painted by anyone) mask, mirrors `cells[i].is_some()`
    lit: BitVec,
    counts: HashMap<PlayerId, u32>,
}

impl TerritoryGrid {
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![None; width * height],
            lit: bitvec![0; width * height],
            counts: HashMap::new(),
        }
    }

    /// Grid covering a square map of edge `map_size`
    pub fn for_map(map_size: f32) -> Self {
        let dim = (map_size / CELL_SIZE).ceil() as usize;
        Self::new(dim, dim)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn total_cells(&self) -> usize {
        self.width * self.height
    }

    /// Grid coordinates of a world position (integer division by cell size)
    #[inline]
    pub fn world_to_cell(position: Vec2) -> (i64, i64) {
        (
            (position.x / CELL_SIZE).floor() as i64,
            (position.y / CELL_SIZE).floor() as i64,
        )
    }

    /// World position of a cell's centre
    #[inline]
    pub fn cell_center(grid_x: usize, grid_y: usize) -> Vec2 {
        Vec2::new(
            (grid_x as f32 + 0.5) * CELL_SIZE,
            (grid_y as f32 + 0.5) * CELL_SIZE,
        )
    }

    #[inline]
    fn index_of(&self, grid_x: i64, grid_y: i64) -> Option<usize> {
        if grid_x < 0 || grid_y < 0 || grid_x >= self.width as i64 || grid_y >= self.height as i64 {
            None
        } else {
            Some(grid_y as usize * self.width + grid_x as usize)
        }
    }

    pub fn cell(&self, grid_x: i64, grid_y: i64) -> Option<&TerritoryCell> {
        self.index_of(grid_x, grid_y).and_then(|i| self.cells[i].as_ref())
    }

    /// Claim one cell for `owner`. Returns false when the cell is off-grid.
    pub fn claim(&mut self, grid_x: i64, grid_y: i64, owner: PlayerId, now: u64) -> bool {
        let Some(index) = self.index_of(grid_x, grid_y) else {
            return false;
        };

        if let Some(previous) = self.cells[index] {
            if previous.owner_id != owner {
                if let Some(count) = self.counts.get_mut(&previous.owner_id) {
                    *count = count.saturating_sub(1);
                }
                *self.counts.entry(owner).or_insert(0) += 1;
            }
        } else {
            *self.counts.entry(owner).or_insert(0) += 1;
            self.lit.set(index, true);
        }

        self.cells[index] = Some(TerritoryCell {
            owner_id: owner,
            painted_at: now,
        });
        true
    }

    /// Paint the circular brush for a painter of `painter_size` centred on the
    /// cell under `position`. Returns the number of cells painted.
    ///
    /// Fails with `GridOutOfBounds` when the centre cell is off-grid; brush
    /// cells falling off-grid are skipped.
    pub fn paint(&mut self, owner: PlayerId, painter_size: f32, position: Vec2, now: u64) -> CoreResult<u32> {
        let (center_x, center_y) = Self::world_to_cell(position);
        if self.index_of(center_x, center_y).is_none() {
            return Err(CoreError::GridOutOfBounds {
                grid_x: center_x,
                grid_y: center_y,
            });
        }

        let radius = paint_radius_cells(painter_size) as i64;
        let radius_sq = radius * radius;
        let mut painted = 0;

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                if self.claim(center_x + dx, center_y + dy, owner, now) {
                    painted += 1;
                }
            }
        }

        Ok(painted)
    }

    /// Whether the cell under `position` lies on the grid
    pub fn contains(&self, position: Vec2) -> bool {
        let (gx, gy) = Self::world_to_cell(position);
        self.index_of(gx, gy).is_some()
    }

    pub fn owner_at(&self, position: Vec2) -> Option<PlayerId> {
        let (gx, gy) = Self::world_to_cell(position);
        self.cell(gx, gy).map(|c| c.owner_id)
    }

    /// Whether the cell under `position` has been painted by anyone
    pub fn is_lit(&self, position: Vec2) -> bool {
        let (gx, gy) = Self::world_to_cell(position);
        self.index_of(gx, gy).map_or(false, |i| self.lit[i])
    }

    pub fn cell_count(&self, player: PlayerId) -> u32 {
        self.counts.get(&player).copied().unwrap_or(0)
    }

    /// Fraction of the full grid owned by `player`
    pub fn share(&self, player: PlayerId) -> f64 {
        self.cell_count(player) as f64 / self.total_cells() as f64
    }

    pub fn lit_cells(&self) -> usize {
        self.lit.count_ones()
    }

    /// Nearest unpainted point on a fixed-stride sampling lattice.
    ///
    /// Samples cell centres every `DARKNESS_SAMPLE_STRIDE` cells on both axes,
    /// starting at cell 0, so coverage is uniform and deterministic. Ties go to
    /// the first sample in row-major order. `None` when every sample is lit.
    pub fn nearest_dark_sample(&self, from: Vec2) -> Option<Vec2> {
        let mut best: Option<(f32, Vec2)> = None;

        for gy in (0..self.height).step_by(DARKNESS_SAMPLE_STRIDE) {
            for gx in (0..self.width).step_by(DARKNESS_SAMPLE_STRIDE) {
                if self.lit[gy * self.width + gx] {
                    continue;
                }
                let sample = Self::cell_center(gx, gy);
                let dist_sq = sample.distance_sq_to(from);
                if best.map_or(true, |(d, _)| dist_sq < d) {
                    best = Some((dist_sq, sample));
                }
            }
        }

        best.map(|(_, sample)| sample)
    }
}
