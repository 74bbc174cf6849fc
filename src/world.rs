//! Serializable snapshots of simulation state.
//!
//! A [`Snapshot`] is a render-ready copy of everything an external consumer
//! needs per frame: unit transforms and animation frames, building progress,
//! the stockpile, and the name of each unit's active command. Snapshots are
//! plain data and serialize to JSON for out-of-process consumers.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::command::{CommandPool, CommandQueue};
use crate::components::{
    AnimState, BuildSite, Carrier, Feet, Footprint, Health, Mobile, ResourceKind, ResourceNode,
    Stockpile,
};

/// Render state of one mobile unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub facing: (f32, f32),
    pub frame: u32,
    pub health: f32,
    pub health_max: f32,
    pub carried: f32,
    /// Name of the command currently at the top of the unit's queue.
    pub command: String,
}

/// Render state of one building or construction site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub progress: f32,
    pub health: f32,
    pub health_max: f32,
}

/// Render state of one resource node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub kind: ResourceKind,
    pub remaining: f32,
}

/// Full per-tick state handed to external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f32,
    pub units: Vec<UnitSnapshot>,
    pub buildings: Vec<BuildingSnapshot>,
    pub resources: Vec<ResourceSnapshot>,
    pub stockpile: HashMap<ResourceKind, f32>,
}

impl Snapshot {
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Snapshot {
        let mut unit_query = world.query::<(
            Entity,
            &Feet,
            &Mobile,
            &Health,
            &Carrier,
            &AnimState,
            &CommandQueue,
        )>();
        let mut building_query =
            world.query_filtered::<(Entity, &Feet, &Health, &BuildSite), With<Footprint>>();
        let mut resource_query = world.query::<(Entity, &Feet, &ResourceNode)>();

        let world = &*world;
        let pool = world.resource::<CommandPool>();

        let units = unit_query
            .iter(world)
            .map(|(entity, pos, mobile, health, carrier, anim, queue)| UnitSnapshot {
                id: entity.index(),
                x: pos.x,
                y: pos.y,
                facing: mobile.facing,
                frame: anim.frame,
                health: health.current,
                health_max: health.max,
                carried: carrier.carried,
                command: queue
                    .peek()
                    .and_then(|entry| pool.get(entry.id))
                    .map(|inst| inst.kind.name())
                    .unwrap_or("None")
                    .to_string(),
            })
            .collect();

        let buildings = building_query
            .iter(world)
            .map(|(entity, pos, health, site)| BuildingSnapshot {
                id: entity.index(),
                x: pos.x,
                y: pos.y,
                progress: site.progress,
                health: health.current,
                health_max: health.max,
            })
            .collect();

        let resources = resource_query
            .iter(world)
            .map(|(entity, pos, node)| ResourceSnapshot {
                id: entity.index(),
                x: pos.x,
                y: pos.y,
                kind: node.kind,
                remaining: node.remaining,
            })
            .collect();

        Snapshot {
            tick,
            time,
            units,
            buildings,
            resources,
            stockpile: world.resource::<Stockpile>().amounts.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
