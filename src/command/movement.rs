//! Movement command: pathfinding consumption, smoothing, and steering.
//!
//! A move resolves its destination (clamping into a target's footprint when
//! ordered at an entity), requests a waypoint path from the configured
//! pathfinder, and then steers along it each tick. The waypoint list is kept
//! minimal by string pulling: any waypoint in unobstructed straight-line view
//! of the current position is dropped, both at enqueue time and whenever the
//! unit crosses into a new tile.

use bevy_ecs::prelude::*;

use crate::components::{AnimState, Feet, Footprint, Mobile, Tile};
use crate::events::UnitMoved;
use crate::geometry::{self, TileRect};
use crate::grid::{GridLayer, LayeredGrid, OBSTACLE_SAMPLE_INTERVAL};
use crate::pathfind::PathfinderService;

use super::CommandKind;

/// Distance within which the current waypoint counts as reached (compared
/// against the squared distance).
pub const WAYPOINT_ARRIVAL_RADIUS: f32 = 0.25;

/// Scale applied to the summed separation vector.
const SEPARATION_SCALE: f32 = 2.0;

/// Scale applied to the other unit's collision radius for the lateral
/// avoidance vector.
const AVOIDANCE_SCALE: f32 = 10.0;

/// Where a move is headed: a raw position or another entity.
#[derive(Debug, Clone, Copy)]
pub enum MoveTarget {
    Point(Feet),
    Entity(Entity),
}

/// Concrete movement command.
#[derive(Debug, Clone)]
pub struct MoveCommand {
    target: MoveTarget,
    /// Resolved destination in feet coordinates.
    destination: Option<Feet>,
    /// Footprint rectangle when the target is an entity with one; arrival
    /// then tests overlap with the rectangle instead of the point.
    dest_rect: Option<TileRect>,
    /// Remaining smoothed waypoints, front first. The final entry is the
    /// exact destination.
    path: Vec<Feet>,
    /// Set when the pathfinder found nothing; reported as completion (give
    /// up) on the next execute.
    unreachable: bool,
}

impl MoveCommand {
    pub fn to_point(destination: Feet) -> CommandKind {
        CommandKind::Move(Self {
            target: MoveTarget::Point(destination),
            destination: None,
            dest_rect: None,
            path: Vec::new(),
            unreachable: false,
        })
    }

    pub fn to_entity(target: Entity) -> CommandKind {
        CommandKind::Move(Self {
            target: MoveTarget::Entity(target),
            destination: None,
            dest_rect: None,
            path: Vec::new(),
            unreachable: false,
        })
    }

    /// Remaining waypoints, for diagnostics and tests.
    pub fn path(&self) -> &[Feet] {
        &self.path
    }

    pub(crate) fn on_queue(&mut self, owner: Entity, world: &mut World) {
        self.path.clear();
        self.unreachable = false;

        let Some(pos) = world.get::<Feet>(owner).copied() else {
            debug_assert!(false, "move command on entity without a position");
            log::warn!("move command on {:?} which has no position", owner);
            self.unreachable = true;
            return;
        };

        // Resolve the destination. An entity target with a footprint resolves
        // to the closest point of its rectangle pushed out by the goal
        // radius: the mover stops at the edge, on a walkable tile, rather
        // than pathing into the footprint itself.
        match self.target {
            MoveTarget::Point(dest) => {
                self.destination = Some(dest);
                self.dest_rect = None;
            }
            MoveTarget::Entity(target) => {
                if let Some(footprint) = world.get::<Footprint>(target) {
                    let rect = footprint.rect();
                    let closest = rect.closest_point(pos);
                    let standoff = world
                        .get::<Mobile>(owner)
                        .map(|m| m.goal_radius)
                        .unwrap_or(Mobile::default().goal_radius);
                    let (out_x, out_y) =
                        geometry::normalize(pos.x - closest.x, pos.y - closest.y);
                    self.destination =
                        Some(closest.offset(out_x * standoff, out_y * standoff));
                    self.dest_rect = Some(rect);
                } else if let Some(target_pos) = world.get::<Feet>(target) {
                    self.destination = Some(*target_pos);
                    self.dest_rect = None;
                } else {
                    debug_assert!(false, "move target entity has no position");
                    log::warn!("move target {:?} has no position; giving up", target);
                    self.unreachable = true;
                    return;
                }
            }
        }

        let destination = self.destination.unwrap_or(pos);
        world.resource_scope(|world, pathfinder: Mut<PathfinderService>| {
            let grid = world.resource::<LayeredGrid>();
            self.path = pathfinder.0.find_path(grid, pos, destination);
        });

        if self.path.is_empty() {
            log::warn!(
                "no path for {:?} from {:?} to {:?}",
                owner,
                pos,
                destination
            );
            self.unreachable = true;
            return;
        }

        let grid = world.resource::<LayeredGrid>();
        smooth_path(&mut self.path, pos, grid);
    }

    pub(crate) fn execute(&mut self, owner: Entity, dt: f32, tick: u64, world: &mut World) -> bool {
        if self.unreachable {
            return true;
        }
        let Some(destination) = self.destination else {
            debug_assert!(false, "move executed without a resolved destination");
            return true;
        };
        let Some(pos) = world.get::<Feet>(owner).copied() else {
            return true;
        };
        let Some(mobile) = world.get::<Mobile>(owner).copied() else {
            debug_assert!(false, "move command on entity without Mobile");
            return true;
        };

        if self.arrived(pos, mobile.goal_radius) {
            return true;
        }

        // Pop the waypoint once inside its arrival radius, then re-run
        // smoothing: visibility of later waypoints changes as we advance.
        {
            let grid = world.resource::<LayeredGrid>();
            if let Some(&waypoint) = self.path.first() {
                if pos.distance_sq_to(waypoint) < WAYPOINT_ARRIVAL_RADIUS * WAYPOINT_ARRIVAL_RADIUS
                {
                    self.path.remove(0);
                    smooth_path(&mut self.path, pos, grid);
                }
            }
        }
        let next = self.path.first().copied().unwrap_or(destination);

        let (desired_x, desired_y) = geometry::normalize(next.x - pos.x, next.y - pos.y);
        let (sep_x, sep_y) = separation_force(world, owner, pos, &mobile, destination);
        let (avoid_x, avoid_y) = avoidance_force(world, owner, pos, &mobile);
        let (dir_x, dir_y) =
            geometry::normalize(desired_x + sep_x + avoid_x, desired_y + sep_y + avoid_y);

        let step = mobile.speed * dt;
        let new_pos = pos.offset(dir_x * step, dir_y * step);

        // Commit grid membership on tile crossings before storing the new
        // position: remove from the old cell, add to the new one, notify
        // visibility consumers, and re-smooth from the new vantage point.
        let old_tile = pos.tile();
        let new_tile = new_pos.tile();
        if old_tile != new_tile {
            world.resource_scope(|_, mut grid: Mut<LayeredGrid>| {
                grid.remove_entity(GridLayer::Units, old_tile, owner);
                grid.add_entity(GridLayer::Units, new_tile, owner);
            });
            world.send_event(UnitMoved {
                entity: owner,
                tile: new_tile,
                position: new_pos,
            });
            let grid = world.resource::<LayeredGrid>();
            smooth_path(&mut self.path, new_pos, grid);
        }

        if let Some(mut stored) = world.get_mut::<Feet>(owner) {
            *stored = new_pos;
        }
        let (face_x, face_y) = geometry::normalize(new_pos.x - pos.x, new_pos.y - pos.y);
        if (face_x, face_y) != (0.0, 0.0) {
            if let Some(mut stored) = world.get_mut::<Mobile>(owner) {
                stored.facing = (face_x, face_y);
            }
        }
        if let Some(mut anim) = world.get_mut::<AnimState>(owner) {
            anim.advance(tick);
        }

        self.arrived(new_pos, mobile.goal_radius)
    }

    /// Rectangle-or-point arrival test.
    fn arrived(&self, pos: Feet, goal_radius: f32) -> bool {
        match self.dest_rect {
            Some(rect) => geometry::circle_overlaps_rect(pos, goal_radius, rect),
            None => self
                .destination
                .map(|d| geometry::circle_contains_point(pos, goal_radius, d))
                .unwrap_or(true),
        }
    }
}

/// String pulling: drop the front waypoint while the one after it is in
/// unobstructed straight-line view of `pos`. Idempotent for a fixed `pos`.
pub(crate) fn smooth_path(path: &mut Vec<Feet>, pos: Feet, grid: &LayeredGrid) {
    while path.len() >= 2 && !grid.segment_blocked(pos, path[1]) {
        path.remove(0);
    }
}

/// Boids-style local repulsion from units in the 3x3 tile neighborhood.
///
/// When the destination tile itself is statically blocked there is nothing
/// separation can resolve, so it contributes zero.
fn separation_force(
    world: &World,
    owner: Entity,
    pos: Feet,
    mobile: &Mobile,
    destination: Feet,
) -> (f32, f32) {
    let grid = world.resource::<LayeredGrid>();
    if grid.is_occupied(GridLayer::Static, destination.tile()) {
        return (0.0, 0.0);
    }

    let center = pos.tile();
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let tile = Tile::new(center.x + dx, center.y + dy);
            if !grid.in_bounds(tile) {
                continue;
            }
            for &other in grid.entities_at(GridLayer::Units, tile) {
                if other == owner {
                    continue;
                }
                let Some(other_pos) = world.get::<Feet>(other) else {
                    continue;
                };
                let other_radius = world
                    .get::<Mobile>(other)
                    .map(|m| m.collision_radius)
                    .unwrap_or(mobile.collision_radius);
                if pos.distance_to(*other_pos) < mobile.collision_radius + other_radius {
                    let (away_x, away_y) =
                        geometry::normalize(pos.x - other_pos.x, pos.y - other_pos.y);
                    sum_x += away_x;
                    sum_y += away_y;
                }
            }
        }
    }
    (sum_x * SEPARATION_SCALE, sum_y * SEPARATION_SCALE)
}

/// Look-ahead avoidance: cast a short ray along the current facing and steer
/// laterally around the first unit whose body intersects it.
fn avoidance_force(world: &World, owner: Entity, pos: Feet, mobile: &Mobile) -> (f32, f32) {
    let (dir_x, dir_y) = mobile.facing;
    if (dir_x, dir_y) == (0.0, 0.0) {
        return (0.0, 0.0);
    }
    let grid = world.resource::<LayeredGrid>();
    let ray_length = mobile.los_range * 0.5;
    let ray_end = pos.offset(dir_x * ray_length, dir_y * ray_length);

    let mut last_tile: Option<Tile> = None;
    let mut traveled = 0.0;
    while traveled <= ray_length {
        let tile = pos.offset(dir_x * traveled, dir_y * traveled).tile();
        traveled += OBSTACLE_SAMPLE_INTERVAL;
        if last_tile == Some(tile) {
            continue;
        }
        last_tile = Some(tile);
        if !grid.in_bounds(tile) {
            continue;
        }
        for &other in grid.entities_at(GridLayer::Units, tile) {
            if other == owner {
                continue;
            }
            let Some(other_pos) = world.get::<Feet>(other) else {
                continue;
            };
            let other_radius = world
                .get::<Mobile>(other)
                .map(|m| m.collision_radius)
                .unwrap_or(mobile.collision_radius);
            let clearance = mobile.collision_radius + other_radius;
            if geometry::point_segment_distance(*other_pos, pos, ray_end) < clearance {
                let (toward_x, toward_y) =
                    geometry::normalize(other_pos.x - pos.x, other_pos.y - pos.y);
                let (lat_x, lat_y) = geometry::perpendicular_left(toward_x, toward_y);
                let scale = other_radius * AVOIDANCE_SCALE;
                return (lat_x * scale, lat_y * scale);
            }
        }
    }
    (0.0, 0.0)
}
