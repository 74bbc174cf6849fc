//! Skirmish - RTS command scheduling and movement core.
//!
//! A headless, fixed-timestep simulation built on `bevy_ecs`. Entities act
//! through priority-queued, pooled, resumable commands; mobile units follow
//! smoothed waypoint paths with local separation and avoidance steering over
//! a layered tile-occupancy grid.
//!
//! Hosts embed the simulation through [`SimWorld`]: spawn entities, issue
//! orders, advance time, and read [`Snapshot`]s or tile-crossing events back.
//!
//! ```no_run
//! use skirmish_sim::{Feet, SimWorld};
//!
//! let mut sim = SimWorld::new(64, 64);
//! let unit = sim.spawn_unit(Feet::new(5.5, 5.5));
//! sim.order_move(unit, Feet::new(20.5, 12.5)).unwrap();
//! sim.step(1.0 / 60.0);
//! println!("{}", sim.snapshot_json().unwrap());
//! ```

pub mod api;
pub mod command;
pub mod components;
pub mod events;
pub mod geometry;
pub mod grid;
pub mod pathfind;
pub mod world;

pub use api::{CommandError, SimWorld};
pub use command::{
    CommandKind, CommandPool, CommandQueue, SimConfig, CHILD_PRIORITY_OFFSET, DEFAULT_PRIORITY,
};
pub use components::{
    Carrier, Feet, Footprint, Health, Mobile, ResourceKind, ResourceNode, Stockpile, Tile, Weapon,
};
pub use events::{RemoveEntity, UnitMoved};
pub use grid::{GridLayer, LayeredGrid};
pub use pathfind::{DirectPathfinder, Pathfinder, PathfinderService};
pub use world::Snapshot;
