//! Layered tile-occupancy grid.
//!
//! Four independent layers track which entities occupy which tile. The static
//! layer is authoritative for blocking: anything present there makes the tile
//! impassable for path smoothing and the pathfinder.
//!
//! Out-of-bounds reads answer empty/false and log; out-of-bounds writes are
//! rejected and logged. The grid never panics on bad coordinates.

use bevy_ecs::prelude::*;
use std::collections::HashSet;

use crate::components::{Feet, Tile};

/// Interval in feet at which obstacle segment tests sample the static layer.
pub const OBSTACLE_SAMPLE_INTERVAL: f32 = 0.25;

/// Occupancy layers, from the ground up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridLayer {
    /// Terrain decals (farms, paths). Never blocks.
    Ground,
    /// Ground decoration (rubble, stumps). Never blocks.
    Decor,
    /// Permanently blocking occupants: buildings, standing resources.
    Static,
    /// Mobile units. Consulted by separation and avoidance steering.
    Units,
}

impl GridLayer {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            GridLayer::Ground => 0,
            GridLayer::Decor => 1,
            GridLayer::Static => 2,
            GridLayer::Units => 3,
        }
    }
}

/// Grid of width x height tiles, each holding one entity set per layer.
#[derive(Resource, Debug)]
pub struct LayeredGrid {
    width: i32,
    height: i32,
    /// Row-major cell sets, one Vec per layer.
    layers: [Vec<HashSet<Entity>>; GridLayer::COUNT],
}

impl LayeredGrid {
    pub fn new(width: i32, height: i32) -> Self {
        debug_assert!(width > 0 && height > 0, "grid dimensions must be positive");
        let cells = (width * height) as usize;
        Self {
            width,
            height,
            layers: std::array::from_fn(|_| vec![HashSet::new(); cells]),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.x < self.width && tile.y >= 0 && tile.y < self.height
    }

    fn cell_index(&self, tile: Tile) -> usize {
        (tile.y * self.width + tile.x) as usize
    }

    /// Is any entity present at (layer, tile)? Out of bounds reads false.
    pub fn is_occupied(&self, layer: GridLayer, tile: Tile) -> bool {
        if !self.in_bounds(tile) {
            log::warn!("occupancy query out of bounds at {:?}", tile);
            return false;
        }
        !self.layers[layer.index()][self.cell_index(tile)].is_empty()
    }

    /// Register `entity` at (layer, tile). Out-of-bounds writes are rejected.
    ///
    /// Callers must remove the entity from its previous tile first; a set per
    /// cell keeps duplicates out but stale memberships are the caller's bug.
    pub fn add_entity(&mut self, layer: GridLayer, tile: Tile, entity: Entity) {
        if !self.in_bounds(tile) {
            log::warn!("rejected add of {:?} out of bounds at {:?}", entity, tile);
            return;
        }
        let index = self.cell_index(tile);
        self.layers[layer.index()][index].insert(entity);
    }

    /// Remove `entity` from (layer, tile). Out-of-bounds writes are rejected.
    pub fn remove_entity(&mut self, layer: GridLayer, tile: Tile, entity: Entity) {
        if !self.in_bounds(tile) {
            log::warn!("rejected remove of {:?} out of bounds at {:?}", entity, tile);
            return;
        }
        let index = self.cell_index(tile);
        self.layers[layer.index()][index].remove(&entity);
    }

    /// The set of entities at (layer, tile). Out of bounds reads empty.
    pub fn entities_at(&self, layer: GridLayer, tile: Tile) -> &HashSet<Entity> {
        static EMPTY: std::sync::OnceLock<HashSet<Entity>> = std::sync::OnceLock::new();
        if !self.in_bounds(tile) {
            log::warn!("entity query out of bounds at {:?}", tile);
            return EMPTY.get_or_init(HashSet::new);
        }
        &self.layers[layer.index()][self.cell_index(tile)]
    }

    /// Remove `entity` from every layer of the tile containing `pos`.
    /// Used when an entity is destroyed.
    pub fn remove_everywhere(&mut self, tile: Tile, entity: Entity) {
        if !self.in_bounds(tile) {
            return;
        }
        let index = self.cell_index(tile);
        for layer in self.layers.iter_mut() {
            layer[index].remove(&entity);
        }
    }

    /// Does the straight segment from `from` to `to` cross a statically
    /// blocked tile?
    ///
    /// Samples the segment every quarter tile and tests the static layer at
    /// each sample's containing tile. Any hit blocks.
    pub fn segment_blocked(&self, from: Feet, to: Feet) -> bool {
        let length = from.distance_to(to);
        if length < f32::EPSILON {
            return self.is_occupied(GridLayer::Static, from.tile());
        }
        let dx = (to.x - from.x) / length;
        let dy = (to.y - from.y) / length;

        let mut traveled = 0.0;
        while traveled < length {
            let sample = from.offset(dx * traveled, dy * traveled);
            if self.is_occupied(GridLayer::Static, sample.tile()) {
                return true;
            }
            traveled += OBSTACLE_SAMPLE_INTERVAL;
        }
        self.is_occupied(GridLayer::Static, to.tile())
    }
}
