//! Per-tick command scheduler.
//!
//! Runs as a single exclusive system. Each tick it:
//! 1. despawns entities queued for removal, returning their commands to the pool
//! 2. converts newly dead entities into decaying corpses
//! 3. drains externally submitted command requests into per-entity queues,
//!    displacing whatever was above the fallback
//! 4. executes the top command of every queue once, enqueueing any spawned
//!    sub-commands above their parent
//!
//! Command instances live in the [`CommandPool`] resource; the pool is taken
//! out of the world for the duration of the tick so command code can hold
//! `&mut World` while its own state lives outside it.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{Feet, Footprint, Health, Tile};
use crate::grid::LayeredGrid;

use super::pool::{CommandInst, CommandPool};
use super::queue::CommandQueue;
use super::tasks::DecayCommand;
use super::{CommandKind, CHILD_PRIORITY_OFFSET, DEFAULT_PRIORITY};

/// Fixed timestep of the current tick, in seconds.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct DeltaTime(pub f32);

/// Monotonic tick counter. Never reset, never rewound.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Tunable simulation parameters.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Seconds of simulated time per tick.
    pub fixed_timestep: f32,
    /// Construction progress (out of 100) per builder per second.
    pub build_rate: f32,
    /// Resources harvested per gatherer per second.
    pub gather_rate: f32,
    /// Ticks a corpse decays before removal.
    pub decay_ticks: u64,
    /// Tile radius searched for a replacement resource node.
    pub retarget_radius: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            build_rate: 20.0,
            gather_rate: 2.0,
            decay_ticks: 90,
            retarget_radius: 6,
        }
    }
}

/// An externally submitted order for one entity.
///
/// `kind: None` is a pure cancellation: pending commands above the fallback
/// are displaced and nothing new is queued.
#[derive(Debug)]
pub struct CommandRequest {
    pub entity: Entity,
    pub kind: Option<CommandKind>,
    /// Queue priority; defaults to one child offset above the fallback.
    pub priority: Option<i32>,
}

/// Inbox of requests applied at the start of the next tick.
#[derive(Resource, Debug, Default)]
pub struct CommandRequests(pub Vec<CommandRequest>);

/// Entities to remove at the start of the next tick.
#[derive(Resource, Debug, Default)]
pub struct PendingDespawns(pub Vec<Entity>);

/// Marker for entities whose death has already been converted into a decay
/// command, so they are not re-processed every tick.
#[derive(Component, Debug, Default)]
pub struct Dying;

/// The exclusive per-tick system driving all command execution.
pub fn command_tick(world: &mut World) {
    let dt = world.resource::<DeltaTime>().0;
    let tick = world.resource::<SimTick>().0;
    world.resource_scope(|world, mut pool: Mut<CommandPool>| {
        flush_despawns(world, &mut pool);
        flush_dead(world, &mut pool);
        drain_requests(world, &mut pool);
        run_entities(world, &mut pool, dt, tick);
    });
}

/// Despawn everything queued for removal: release its commands, clear its
/// grid membership, then remove the entity.
fn flush_despawns(world: &mut World, pool: &mut CommandPool) {
    let pending = std::mem::take(&mut world.resource_mut::<PendingDespawns>().0);
    for entity in pending {
        if !world.entities().contains(entity) {
            continue;
        }
        if let Some(mut queue) = world.get_mut::<CommandQueue>(entity) {
            for id in queue.drain_all() {
                pool.release(id);
            }
        }
        let unit_tile = world.get::<Feet>(entity).map(|p| p.tile());
        let footprint = world.get::<Footprint>(entity).copied();
        world.resource_scope(|_, mut grid: Mut<LayeredGrid>| {
            if let Some(tile) = unit_tile {
                grid.remove_everywhere(tile, entity);
            }
            if let Some(fp) = footprint {
                for y in fp.min.y..=fp.max.y {
                    for x in fp.min.x..=fp.max.x {
                        grid.remove_everywhere(Tile::new(x, y), entity);
                    }
                }
            }
        });
        world.despawn(entity);
    }
}

/// Turn newly dead commandable entities into decaying corpses: displace
/// whatever they were doing and queue a decay command directly. The queue is
/// bypassed for the request inbox on purpose: once marked [`Dying`], an
/// entity's inbox requests are dropped, and the decay must not be.
fn flush_dead(world: &mut World, pool: &mut CommandPool) {
    let mut dead = Vec::new();
    let mut query =
        world.query_filtered::<(Entity, &Health), (With<CommandQueue>, Without<Dying>)>();
    for (entity, health) in query.iter(world) {
        if !health.is_alive() {
            dead.push(entity);
        }
    }
    for entity in dead {
        log::debug!("{:?} died; starting decay", entity);
        world.entity_mut(entity).insert(Dying);
        let displaced = world
            .get_mut::<CommandQueue>(entity)
            .map(|mut queue| queue.displace_above(DEFAULT_PRIORITY))
            .unwrap_or_default();
        for id in displaced {
            pool.release(id);
        }
        let priority = DEFAULT_PRIORITY + CHILD_PRIORITY_OFFSET;
        let id = pool.acquire(CommandInst::new(entity, priority, DecayCommand::new()));
        if let Some(mut queue) = world.get_mut::<CommandQueue>(entity) {
            queue.push(priority, id);
        }
    }
}

/// Apply the request inbox. Every request first displaces all queued commands
/// above the fallback; a request with a kind then queues it.
fn drain_requests(world: &mut World, pool: &mut CommandPool) {
    let requests = std::mem::take(&mut world.resource_mut::<CommandRequests>().0);
    for request in requests {
        let entity = request.entity;
        if world.get::<CommandQueue>(entity).is_none() {
            log::warn!("dropped command request for {:?}: no command queue", entity);
            continue;
        }
        // A corpse takes no orders: displacing its decay would leave it in
        // the world forever.
        if world.get::<Dying>(entity).is_some() {
            log::debug!("dropped command request for dying {:?}", entity);
            continue;
        }
        let displaced = world
            .get_mut::<CommandQueue>(entity)
            .map(|mut queue| queue.displace_above(DEFAULT_PRIORITY))
            .unwrap_or_default();
        for id in displaced {
            pool.release(id);
        }

        let Some(mut kind) = request.kind else {
            continue;
        };
        let priority = request
            .priority
            .unwrap_or(DEFAULT_PRIORITY + CHILD_PRIORITY_OFFSET);
        kind.on_queue(entity, world);
        let id = pool.acquire(CommandInst::new(entity, priority, kind));
        if let Some(mut queue) = world.get_mut::<CommandQueue>(entity) {
            queue.push(priority, id);
        }
    }
}

/// Execute the top command of every queue exactly once.
fn run_entities(world: &mut World, pool: &mut CommandPool, dt: f32, tick: u64) {
    let mut entities = Vec::new();
    {
        let mut query = world.query_filtered::<Entity, With<CommandQueue>>();
        entities.extend(query.iter(world));
    }

    for entity in entities {
        let Some(entry) = world.get::<CommandQueue>(entity).and_then(|q| q.peek()) else {
            debug_assert!(false, "command queue must never be empty");
            log::error!("empty command queue on {:?}", entity);
            continue;
        };
        if pool.get(entry.id).is_none() {
            log::error!("stale command at the top of {:?}'s queue", entity);
            if let Some(mut queue) = world.get_mut::<CommandQueue>(entity) {
                queue.pop();
            }
            continue;
        }

        let mut subs = Vec::new();
        let done = {
            let inst = pool.get_mut(entry.id).expect("checked above");
            if !inst.started {
                inst.started = true;
                inst.kind.on_start(entity, world);
            }
            inst.kind.execute(entity, dt, tick, world, &mut subs)
        };
        // Commands spawn subs *instead of* completing, never both; a sub
        // pushed by a completing command would be popped in its place.
        debug_assert!(!done || subs.is_empty());

        for mut kind in subs {
            let priority = entry.priority + CHILD_PRIORITY_OFFSET;
            kind.on_queue(entity, world);
            let id = pool.acquire(CommandInst::new(entity, priority, kind));
            if let Some(mut queue) = world.get_mut::<CommandQueue>(entity) {
                queue.push(priority, id);
            }
        }

        if done {
            let popped = world
                .get_mut::<CommandQueue>(entity)
                .and_then(|mut queue| queue.pop());
            if let Some(popped) = popped {
                pool.release(popped.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::movement::MoveCommand;
    use crate::command::tasks::{BuildCommand, IdleCommand};
    use crate::components::{BuildingBundle, Stockpile, UnitBundle};
    use crate::events::{RemoveEntity, UnitMoved};
    use crate::grid::GridLayer;
    use crate::pathfind::{DirectPathfinder, PathfinderService};

    fn test_world() -> World {
        let mut world = World::new();
        world.insert_resource(LayeredGrid::new(32, 32));
        world.insert_resource(PathfinderService::new(DirectPathfinder));
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimTick(0));
        world.insert_resource(DeltaTime(1.0 / 30.0));
        world.insert_resource(CommandPool::default());
        world.insert_resource(CommandRequests::default());
        world.insert_resource(PendingDespawns::default());
        world.insert_resource(Stockpile::default());
        world.init_resource::<Events<UnitMoved>>();
        world.init_resource::<Events<RemoveEntity>>();
        world
    }

    fn spawn_unit(world: &mut World, pos: Feet) -> Entity {
        let entity = world
            .spawn((UnitBundle::at(pos), CommandQueue::default()))
            .id();
        world.resource_scope(|world, mut pool: Mut<CommandPool>| {
            let id = pool.acquire(CommandInst::new(
                entity,
                DEFAULT_PRIORITY,
                CommandKind::Idle(IdleCommand::default()),
            ));
            world
                .get_mut::<CommandQueue>(entity)
                .expect("just spawned")
                .push(DEFAULT_PRIORITY, id);
        });
        world.resource_scope(|_, mut grid: Mut<LayeredGrid>| {
            grid.add_entity(GridLayer::Units, pos.tile(), entity);
        });
        entity
    }

    fn submit(world: &mut World, entity: Entity, kind: Option<CommandKind>) {
        world.resource_mut::<CommandRequests>().0.push(CommandRequest {
            entity,
            kind,
            priority: None,
        });
    }

    fn tick(world: &mut World) {
        command_tick(world);
        world.resource_mut::<SimTick>().increment();
    }

    #[test]
    fn test_queue_never_empty_and_settles_on_fallback() {
        let mut world = test_world();
        let unit = spawn_unit(&mut world, Feet::new(5.5, 5.5));
        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(7.5, 5.5))),
        );

        for _ in 0..200 {
            tick(&mut world);
            let len = world.get::<CommandQueue>(unit).expect("queue").len();
            assert!(len >= 1, "queue must never be empty");
        }
        // Move finished; only the fallback remains and exactly one command
        // is still live in the pool.
        assert_eq!(world.get::<CommandQueue>(unit).expect("queue").len(), 1);
        assert_eq!(world.resource::<CommandPool>().live_count(), 1);
    }

    #[test]
    fn test_sub_command_outranks_parent() {
        let mut world = test_world();
        let builder = spawn_unit(&mut world, Feet::new(2.5, 2.5));
        let site = world
            .spawn(BuildingBundle::under_construction(Footprint::single(
                Tile::new(20, 20),
            )))
            .id();
        submit(&mut world, builder, Some(BuildCommand::new(site)));

        tick(&mut world);

        // Fallback + build + spawned approach move
        let queue = world.get::<CommandQueue>(builder).expect("queue");
        assert_eq!(queue.len(), 3);
        let top = queue.peek().expect("non-empty");
        assert_eq!(
            top.priority,
            DEFAULT_PRIORITY + 2 * CHILD_PRIORITY_OFFSET,
            "sub-command must sit one offset above its parent"
        );
        let pool = world.resource::<CommandPool>();
        assert_eq!(pool.get(top.id).expect("live").kind.name(), "Move");
    }

    #[test]
    fn test_cancellation_round_trip_returns_commands_to_pool() {
        let mut world = test_world();
        let unit = spawn_unit(&mut world, Feet::new(5.5, 5.5));
        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(20.5, 20.5))),
        );
        tick(&mut world);
        assert_eq!(world.resource::<CommandPool>().live_count(), 2);

        // Pure cancellation: no new command
        submit(&mut world, unit, None);
        tick(&mut world);

        let queue = world.get::<CommandQueue>(unit).expect("queue");
        assert_eq!(queue.len(), 1, "only the fallback survives cancellation");
        assert_eq!(world.resource::<CommandPool>().live_count(), 1);
    }

    #[test]
    fn test_new_order_displaces_previous_order() {
        let mut world = test_world();
        let unit = spawn_unit(&mut world, Feet::new(5.5, 5.5));
        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(20.5, 5.5))),
        );
        tick(&mut world);

        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(5.5, 20.5))),
        );
        tick(&mut world);

        // Displaced command was released; fallback + replacement remain
        assert_eq!(world.resource::<CommandPool>().live_count(), 2);
        assert_eq!(world.get::<CommandQueue>(unit).expect("queue").len(), 2);
    }

    #[test]
    fn test_dead_unit_decays_then_requests_removal() {
        let mut world = test_world();
        let unit = spawn_unit(&mut world, Feet::new(5.5, 5.5));
        world
            .get_mut::<Health>(unit)
            .expect("health")
            .damage(1000.0);

        let decay_ticks = world.resource::<SimConfig>().decay_ticks;
        for _ in 0..(decay_ticks + 2) {
            tick(&mut world);
        }
        assert!(world.get::<Dying>(unit).is_some());

        let events = world.resource::<Events<RemoveEntity>>();
        let mut cursor = events.get_cursor();
        assert!(cursor.read(events).any(|e| e.entity == unit));
    }

    #[test]
    fn test_orders_for_dying_unit_are_dropped() {
        let mut world = test_world();
        let unit = spawn_unit(&mut world, Feet::new(5.5, 5.5));
        world
            .get_mut::<Health>(unit)
            .expect("health")
            .damage(1000.0);
        tick(&mut world); // death converts into a queued decay

        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(20.5, 5.5))),
        );
        tick(&mut world);

        // The order was dropped: fallback + decay, with decay still on top
        let queue = world.get::<CommandQueue>(unit).expect("queue");
        assert_eq!(queue.len(), 2);
        let top = queue.peek().expect("non-empty");
        let pool = world.resource::<CommandPool>();
        assert_eq!(pool.get(top.id).expect("live").kind.name(), "Decay");
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn test_despawn_releases_commands_and_grid_cells() {
        let mut world = test_world();
        let pos = Feet::new(5.5, 5.5);
        let unit = spawn_unit(&mut world, pos);
        submit(
            &mut world,
            unit,
            Some(MoveCommand::to_point(Feet::new(20.5, 20.5))),
        );
        tick(&mut world);
        assert_eq!(world.resource::<CommandPool>().live_count(), 2);

        let tile_now = world.get::<Feet>(unit).expect("pos").tile();
        world.resource_mut::<PendingDespawns>().0.push(unit);
        tick(&mut world);

        assert!(!world.entities().contains(unit));
        assert_eq!(world.resource::<CommandPool>().live_count(), 0);
        let grid = world.resource::<LayeredGrid>();
        assert!(!grid.entities_at(GridLayer::Units, tile_now).contains(&unit));
    }

    #[test]
    fn test_request_for_unqueued_entity_is_dropped() {
        let mut world = test_world();
        // A building: commandable orders at it are invalid
        let site = world
            .spawn(BuildingBundle::finished(Footprint::single(Tile::new(3, 3))))
            .id();
        submit(
            &mut world,
            site,
            Some(MoveCommand::to_point(Feet::new(9.5, 9.5))),
        );
        tick(&mut world);
        assert_eq!(world.resource::<CommandPool>().live_count(), 0);
    }
}
