//! Pathfinder interface.
//!
//! Pathfinding proper is an external collaborator: the movement command only
//! ever consumes an ordered waypoint list, or an empty list meaning
//! unreachable. Hosts plug in a real planner via [`PathfinderService`].

use bevy_ecs::prelude::*;

use crate::components::Feet;
use crate::grid::{GridLayer, LayeredGrid};

/// Black-box path planner.
///
/// Returns an ordered waypoint sequence from `from` to `to` in feet
/// coordinates, or an empty Vec when no path exists.
pub trait Pathfinder {
    fn find_path(&self, grid: &LayeredGrid, from: Feet, to: Feet) -> Vec<Feet>;
}

/// Resource wrapper so commands can reach the configured planner.
#[derive(Resource)]
pub struct PathfinderService(pub Box<dyn Pathfinder + Send + Sync>);

impl PathfinderService {
    pub fn new<P: Pathfinder + Send + Sync + 'static>(pathfinder: P) -> Self {
        Self(Box::new(pathfinder))
    }
}

/// Naive straight-segment planner.
///
/// Emits the center of every tile the straight line crosses, then the exact
/// goal. Does not route around obstacles; it reports unreachable only when
/// the goal tile itself is statically blocked. Stand-in for a real planner
/// and the default used in tests.
#[derive(Debug, Default)]
pub struct DirectPathfinder;

impl Pathfinder for DirectPathfinder {
    fn find_path(&self, grid: &LayeredGrid, from: Feet, to: Feet) -> Vec<Feet> {
        if grid.is_occupied(GridLayer::Static, to.tile()) {
            return Vec::new();
        }

        let mut waypoints = Vec::new();
        let length = from.distance_to(to);
        if length > f32::EPSILON {
            let dx = (to.x - from.x) / length;
            let dy = (to.y - from.y) / length;
            let mut last_tile = from.tile();
            let mut traveled = 0.5;
            while traveled < length {
                let sample = from.offset(dx * traveled, dy * traveled);
                let tile = sample.tile();
                if tile != last_tile && tile != to.tile() {
                    waypoints.push(tile.center());
                    last_tile = tile;
                }
                traveled += 0.5;
            }
        }
        waypoints.push(to);
        waypoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Tile;

    #[test]
    fn test_direct_path_ends_at_goal() {
        let grid = LayeredGrid::new(32, 32);
        let from = Tile::new(20, 20).center();
        let to = Tile::new(20, 25).center();
        let path = DirectPathfinder.find_path(&grid, from, to);
        assert!(!path.is_empty());
        assert_eq!(*path.last().expect("non-empty"), to);
        // Intermediate waypoints are crossed tile centers
        assert!(path.len() >= 4);
    }

    #[test]
    fn test_blocked_goal_is_unreachable() {
        let mut grid = LayeredGrid::new(32, 32);
        grid.add_entity(GridLayer::Static, Tile::new(5, 5), Entity::from_raw(1));
        let path = DirectPathfinder.find_path(&grid, Tile::new(1, 1).center(), Tile::new(5, 5).center());
        assert!(path.is_empty());
    }

    #[test]
    fn test_zero_length_path() {
        let grid = LayeredGrid::new(8, 8);
        let here = Tile::new(2, 2).center();
        let path = DirectPathfinder.find_path(&grid, here, here);
        assert_eq!(path, vec![here]);
    }
}
