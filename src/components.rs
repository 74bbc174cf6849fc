//! ECS components for the Skirmish command and movement core.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in the command scheduler and the commands themselves.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::TileRect;

// ============================================================================
// COORDINATE TYPES
// ============================================================================

/// Continuous sub-tile position ("feet" coordinates).
///
/// One tile spans 1.0 feet units. `Feet` and [`Tile`] never convert
/// implicitly; use [`Feet::tile`] and [`Tile::center`].
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Feet {
    pub x: f32,
    pub y: f32,
}

impl Feet {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The tile containing this position (truncation toward the cell).
    pub fn tile(&self) -> Tile {
        Tile::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    pub fn distance_to(&self, other: Feet) -> f32 {
        self.distance_sq_to(other).sqrt()
    }

    pub fn distance_sq_to(&self, other: Feet) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Feet {
        Feet::new(self.x + dx, self.y + dy)
    }
}

/// Integer grid-cell position used for spatial-grid indexing and pathfinding.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Deterministic center of this tile in feet coordinates.
    pub fn center(&self) -> Feet {
        Feet::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }
}

// ============================================================================
// UNIT COMPONENTS
// ============================================================================

/// Movement and proximity parameters for a mobile unit.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Mobile {
    /// Movement speed in feet per second.
    pub speed: f32,
    /// Radius used for separation and avoidance steering.
    pub collision_radius: f32,
    /// Line-of-sight distance; avoidance rays extend half of this.
    pub los_range: f32,
    /// Distance at which the unit counts as arrived at / adjacent to a target.
    pub goal_radius: f32,
    /// Facing direction, normalized (fx, fy). Updated from movement deltas.
    pub facing: (f32, f32),
}

impl Default for Mobile {
    fn default() -> Self {
        Self {
            speed: 1.0,
            collision_radius: 0.25,
            los_range: 4.0,
            goal_radius: 0.5,
            facing: (1.0, 0.0),
        }
    }
}

/// Health of a unit or building.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Weapon parameters for units that can attack.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weapon {
    /// Damage applied per volley.
    pub damage: f32,
    /// Maximum attack range in feet.
    pub range: f32,
    /// Ticks between volleys.
    pub reload_ticks: u64,
}

impl Default for Weapon {
    fn default() -> Self {
        Self {
            damage: 5.0,
            range: 1.5,
            reload_ticks: 30,
        }
    }
}

/// Animation frame state, advanced on a fixed tick cadence so playback speed
/// is deterministic across variable frame rates.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnimState {
    pub frame: u32,
    pub ticks_per_frame: u64,
}

impl Default for AnimState {
    fn default() -> Self {
        Self {
            frame: 0,
            ticks_per_frame: 6,
        }
    }
}

impl AnimState {
    /// Advance one frame when the tick lands on the cadence boundary.
    pub fn advance(&mut self, tick: u64) {
        if self.ticks_per_frame > 0 && tick % self.ticks_per_frame == 0 {
            self.frame = self.frame.wrapping_add(1);
        }
    }

    pub fn reset(&mut self) {
        self.frame = 0;
    }
}

// ============================================================================
// ECONOMY COMPONENTS
// ============================================================================

/// Kind of gatherable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Food,
    Wood,
    Stone,
    Gold,
}

/// A gatherable resource node (tree, mine, berry bush).
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub remaining: f32,
}

impl ResourceNode {
    pub fn new(kind: ResourceKind, remaining: f32) -> Self {
        Self { kind, remaining }
    }

    pub fn is_depleted(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Take up to `amount` from the node, returning what was actually taken.
    pub fn take(&mut self, amount: f32) -> f32 {
        let taken = amount.min(self.remaining);
        self.remaining -= taken;
        taken
    }
}

/// Carrying state for gatherer units.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Carrier {
    /// Kind currently carried, if any.
    pub kind: Option<ResourceKind>,
    pub carried: f32,
    pub capacity: f32,
}

impl Default for Carrier {
    fn default() -> Self {
        Self {
            kind: None,
            carried: 0.0,
            capacity: 10.0,
        }
    }
}

impl Carrier {
    pub fn is_full(&self) -> bool {
        self.carried >= self.capacity
    }

    /// Room left before the capacity cap.
    pub fn room(&self) -> f32 {
        (self.capacity - self.carried).max(0.0)
    }

    pub fn empty(&mut self) -> f32 {
        let out = self.carried;
        self.carried = 0.0;
        self.kind = None;
        out
    }
}

/// Player stockpile of gathered resources.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stockpile {
    pub amounts: HashMap<ResourceKind, f32>,
}

impl Stockpile {
    pub fn grant(&mut self, kind: ResourceKind, amount: f32) {
        *self.amounts.entry(kind).or_insert(0.0) += amount;
    }

    pub fn amount(&self, kind: ResourceKind) -> f32 {
        self.amounts.get(&kind).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// BUILDING COMPONENTS
// ============================================================================

/// Tile footprint of a building or large obstacle.
///
/// Proximity tests clamp against this rectangle so units stop at the target's
/// edge rather than its center.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Footprint {
    pub min: Tile,
    pub max: Tile,
}

impl Footprint {
    pub fn new(min: Tile, max: Tile) -> Self {
        Self { min, max }
    }

    /// Single-tile footprint.
    pub fn single(tile: Tile) -> Self {
        Self { min: tile, max: tile }
    }

    pub fn rect(&self) -> TileRect {
        TileRect::new(self.min, self.max)
    }
}

/// Construction progress on a building under construction.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BuildSite {
    /// Progress from 0 to 100.
    pub progress: f32,
}

impl BuildSite {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100.0
    }

    /// Add progress, clamped to 100.
    pub fn advance(&mut self, amount: f32) {
        self.progress = (self.progress + amount).min(100.0);
    }
}

/// Marker for buildings that accept resource drop-offs.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct DropSite;

/// Garrison capacity and occupants of a building.
#[derive(Component, Debug, Clone, Default)]
pub struct Garrison {
    pub occupants: Vec<Entity>,
    pub capacity: u32,
}

impl Garrison {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            occupants: Vec::new(),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.occupants.len() as u32 >= self.capacity
    }
}

/// Attached to a unit while it is garrisoned inside a host building.
#[derive(Component, Debug, Clone, Copy)]
pub struct Garrisoned {
    pub host: Entity,
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a mobile unit.
#[derive(Bundle, Default)]
pub struct UnitBundle {
    pub position: Feet,
    pub mobile: Mobile,
    pub health: Health,
    pub carrier: Carrier,
    pub anim: AnimState,
}

impl UnitBundle {
    pub fn at(position: Feet) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// Bundle for spawning a building.
#[derive(Bundle)]
pub struct BuildingBundle {
    pub position: Feet,
    pub footprint: Footprint,
    pub health: Health,
    pub site: BuildSite,
}

impl BuildingBundle {
    /// A finished building occupying `footprint`.
    pub fn finished(footprint: Footprint) -> Self {
        Self {
            position: footprint.rect().center(),
            footprint,
            health: Health::new(200.0),
            site: BuildSite { progress: 100.0 },
        }
    }

    /// A construction site with zero progress.
    pub fn under_construction(footprint: Footprint) -> Self {
        Self {
            position: footprint.rect().center(),
            footprint,
            health: Health::new(200.0),
            site: BuildSite::default(),
        }
    }
}

/// Bundle for spawning a resource node.
#[derive(Bundle)]
pub struct ResourceBundle {
    pub position: Feet,
    pub footprint: Footprint,
    pub node: ResourceNode,
}

impl ResourceBundle {
    pub fn new(tile: Tile, kind: ResourceKind, remaining: f32) -> Self {
        Self {
            position: tile.center(),
            footprint: Footprint::single(tile),
            node: ResourceNode::new(kind, remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feet_to_tile_truncates() {
        assert_eq!(Feet::new(3.9, 4.1).tile(), Tile::new(3, 4));
        assert_eq!(Feet::new(0.0, 0.0).tile(), Tile::new(0, 0));
        assert_eq!(Feet::new(-0.5, -1.2).tile(), Tile::new(-1, -2));
    }

    #[test]
    fn test_tile_center_round_trip() {
        let tile = Tile::new(7, 2);
        let center = tile.center();
        assert_eq!(center, Feet::new(7.5, 2.5));
        assert_eq!(center.tile(), tile);
    }

    #[test]
    fn test_resource_node_take_caps_at_remaining() {
        let mut node = ResourceNode::new(ResourceKind::Wood, 3.0);
        assert_eq!(node.take(2.0), 2.0);
        assert_eq!(node.take(5.0), 1.0);
        assert!(node.is_depleted());
        assert_eq!(node.take(1.0), 0.0);
    }

    #[test]
    fn test_carrier_room_and_empty() {
        let mut carrier = Carrier {
            kind: Some(ResourceKind::Gold),
            carried: 7.5,
            capacity: 10.0,
        };
        assert_eq!(carrier.room(), 2.5);
        assert!(!carrier.is_full());
        assert_eq!(carrier.empty(), 7.5);
        assert_eq!(carrier.kind, None);
    }

    #[test]
    fn test_build_site_clamps_at_complete() {
        let mut site = BuildSite::default();
        site.advance(60.0);
        assert!(!site.is_complete());
        site.advance(60.0);
        assert!(site.is_complete());
        assert_eq!(site.progress, 100.0);
    }

    #[test]
    fn test_anim_cadence() {
        let mut anim = AnimState {
            frame: 0,
            ticks_per_frame: 4,
        };
        anim.advance(1);
        anim.advance(2);
        anim.advance(3);
        assert_eq!(anim.frame, 0);
        anim.advance(4);
        assert_eq!(anim.frame, 1);
    }
}
