//! Simulation output events consumed by external systems.
//!
//! Events are double-buffered by `bevy_ecs::event::Events` and exchanged only
//! at tick boundaries; nothing in the command core blocks on a consumer.

use bevy_ecs::prelude::*;

use crate::components::{Feet, Tile};

/// A unit finished crossing into a new tile.
///
/// Consumed externally for fog-of-war / visibility updates.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct UnitMoved {
    pub entity: Entity,
    pub tile: Tile,
    pub position: Feet,
}

/// An entity finished its death/decay sequence and should be removed from the
/// world by the entity-lifecycle collaborator.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveEntity {
    pub entity: Entity,
}
