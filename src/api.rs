//! Public simulation API.
//!
//! [`SimWorld`] owns the ECS world and its tick schedule behind a plain-Rust
//! facade: spawn things, issue orders, advance time, read snapshots. Callers
//! never touch systems or queries directly, so the host (a game loop, a
//! headless test, a scripting bridge) stays decoupled from the ECS.
//!
//! Time is fixed-step: [`SimWorld::step`] accumulates wall-clock time and
//! runs whole ticks, so simulation outcomes are independent of the caller's
//! frame rate.

use bevy_ecs::prelude::*;
use thiserror::Error;

use crate::command::{
    command_tick, AttackCommand, BuildCommand, CommandInst, CommandKind, CommandPool,
    CommandQueue, CommandRequest, CommandRequests, DeltaTime, DropOffCommand, GarrisonCommand,
    GatherCommand, IdleCommand, MoveCommand, PendingDespawns, SimConfig, SimTick,
    DEFAULT_PRIORITY,
};
use crate::components::{
    BuildingBundle, DropSite, Feet, Footprint, Garrison, ResourceBundle, ResourceKind, Stockpile,
    Tile, UnitBundle, Weapon,
};
use crate::events::{RemoveEntity, UnitMoved};
use crate::grid::{GridLayer, LayeredGrid};
use crate::pathfind::{DirectPathfinder, PathfinderService};
use crate::world::Snapshot;

/// Errors surfaced to callers issuing orders.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("entity {0:?} cannot take commands")]
    NotCommandable(Entity),
    #[error("entity {0:?} no longer exists")]
    Missing(Entity),
}

/// The simulation: world, schedule, and fixed-timestep clock.
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    accumulator: f32,
    moved: Vec<UnitMoved>,
    removals: Vec<RemoveEntity>,
}

impl SimWorld {
    /// Create a simulation over a `width` x `height` tile map with default
    /// configuration.
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_config(width, height, SimConfig::default())
    }

    pub fn with_config(width: i32, height: i32, config: SimConfig) -> Self {
        let mut world = World::new();
        world.insert_resource(LayeredGrid::new(width, height));
        world.insert_resource(PathfinderService::new(DirectPathfinder));
        world.insert_resource(config);
        world.insert_resource(SimTick(0));
        world.insert_resource(DeltaTime(0.0));
        world.insert_resource(CommandPool::default());
        world.insert_resource(CommandRequests::default());
        world.insert_resource(PendingDespawns::default());
        world.insert_resource(Stockpile::default());
        world.init_resource::<Events<UnitMoved>>();
        world.init_resource::<Events<RemoveEntity>>();

        let mut schedule = Schedule::default();
        schedule.add_systems(command_tick);

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            accumulator: 0.0,
            moved: Vec::new(),
            removals: Vec::new(),
        }
    }

    // ========================================================================
    // SPAWNING
    // ========================================================================

    /// Spawn a mobile, commandable unit at `pos`. The unit's queue starts
    /// with its permanent Idle fallback.
    pub fn spawn_unit(&mut self, pos: Feet) -> Entity {
        let entity = self
            .world
            .spawn((UnitBundle::at(pos), Weapon::default(), CommandQueue::default()))
            .id();
        self.world
            .resource_scope(|world, mut pool: Mut<CommandPool>| {
                let id = pool.acquire(CommandInst::new(
                    entity,
                    DEFAULT_PRIORITY,
                    CommandKind::Idle(IdleCommand::default()),
                ));
                world
                    .get_mut::<CommandQueue>(entity)
                    .expect("just spawned with a queue")
                    .push(DEFAULT_PRIORITY, id);
            });
        self.world
            .resource_scope(|_, mut grid: Mut<LayeredGrid>| {
                grid.add_entity(GridLayer::Units, pos.tile(), entity);
            });
        entity
    }

    /// Spawn a finished building occupying `footprint` on the static layer.
    pub fn spawn_building(&mut self, footprint: Footprint) -> Entity {
        let entity = self.world.spawn(BuildingBundle::finished(footprint)).id();
        self.occupy_static(footprint, entity);
        entity
    }

    /// Spawn a zero-progress construction site occupying `footprint`.
    pub fn spawn_construction_site(&mut self, footprint: Footprint) -> Entity {
        let entity = self
            .world
            .spawn(BuildingBundle::under_construction(footprint))
            .id();
        self.occupy_static(footprint, entity);
        entity
    }

    /// Spawn a resource node on a single tile of the static layer.
    pub fn spawn_resource(&mut self, tile: Tile, kind: ResourceKind, amount: f32) -> Entity {
        let entity = self
            .world
            .spawn(ResourceBundle::new(tile, kind, amount))
            .id();
        self.occupy_static(Footprint::single(tile), entity);
        entity
    }

    /// Mark a building as accepting resource drop-offs.
    pub fn make_drop_site(&mut self, building: Entity) {
        self.world.entity_mut(building).insert(DropSite);
    }

    /// Give a building garrison space for `capacity` units.
    pub fn make_garrisonable(&mut self, building: Entity, capacity: u32) {
        self.world
            .entity_mut(building)
            .insert(Garrison::with_capacity(capacity));
    }

    fn occupy_static(&mut self, footprint: Footprint, entity: Entity) {
        self.world
            .resource_scope(|_, mut grid: Mut<LayeredGrid>| {
                for y in footprint.min.y..=footprint.max.y {
                    for x in footprint.min.x..=footprint.max.x {
                        grid.add_entity(GridLayer::Static, Tile::new(x, y), entity);
                    }
                }
            });
    }

    // ========================================================================
    // ORDERS
    // ========================================================================

    /// Order `unit` to walk to a position.
    pub fn order_move(&mut self, unit: Entity, dest: Feet) -> Result<(), CommandError> {
        self.submit(unit, Some(MoveCommand::to_point(dest)))
    }

    /// Order `unit` to walk to another entity (stopping at its footprint edge).
    pub fn order_move_to(&mut self, unit: Entity, target: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(MoveCommand::to_entity(target)))
    }

    /// Order `unit` to construct `site` (walking there first if needed).
    pub fn order_build(&mut self, unit: Entity, site: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(BuildCommand::new(site)))
    }

    /// Order `unit` to gather from `node` until its carrier is full.
    pub fn order_gather(&mut self, unit: Entity, node: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(GatherCommand::new(node)))
    }

    /// Order `unit` to deliver what it carries to `depot`.
    pub fn order_drop_off(&mut self, unit: Entity, depot: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(DropOffCommand::new(depot)))
    }

    /// Order `unit` to attack `target` until it is destroyed.
    pub fn order_attack(&mut self, unit: Entity, target: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(AttackCommand::new(target)))
    }

    /// Order `unit` to enter `host`.
    pub fn order_garrison(&mut self, unit: Entity, host: Entity) -> Result<(), CommandError> {
        self.submit(unit, Some(GarrisonCommand::new(host)))
    }

    /// Cancel everything `unit` is doing, leaving only its Idle fallback.
    pub fn cancel_orders(&mut self, unit: Entity) -> Result<(), CommandError> {
        self.submit(unit, None)
    }

    /// Queue `entity` for removal at the start of the next tick.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.world.resource_mut::<PendingDespawns>().0.push(entity);
    }

    fn submit(&mut self, entity: Entity, kind: Option<CommandKind>) -> Result<(), CommandError> {
        if !self.world.entities().contains(entity) {
            return Err(CommandError::Missing(entity));
        }
        if self.world.get::<CommandQueue>(entity).is_none() {
            return Err(CommandError::NotCommandable(entity));
        }
        self.world
            .resource_mut::<CommandRequests>()
            .0
            .push(CommandRequest {
                entity,
                kind,
                priority: None,
            });
        Ok(())
    }

    // ========================================================================
    // TIME
    // ========================================================================

    /// Advance by wall-clock `dt` seconds, running as many whole fixed ticks
    /// as have accumulated.
    pub fn step(&mut self, dt: f32) {
        self.accumulator += dt;
        let timestep = self.world.resource::<SimConfig>().fixed_timestep;
        while self.accumulator >= timestep {
            self.accumulator -= timestep;
            self.fixed_update();
        }
    }

    /// Run exactly one fixed tick. Mostly for tests and lockstep hosts.
    pub fn tick(&mut self) {
        self.fixed_update();
    }

    fn fixed_update(&mut self) {
        let timestep = self.world.resource::<SimConfig>().fixed_timestep;
        self.world.resource_mut::<DeltaTime>().0 = timestep;

        self.schedule.run(&mut self.world);

        // Hand tick outputs to the caller-facing buffers, and feed removal
        // requests back into next tick's despawn pass.
        let moved: Vec<UnitMoved> = self
            .world
            .resource_mut::<Events<UnitMoved>>()
            .drain()
            .collect();
        self.moved.extend(moved);
        let removed: Vec<RemoveEntity> = self
            .world
            .resource_mut::<Events<RemoveEntity>>()
            .drain()
            .collect();
        for removal in &removed {
            self.world
                .resource_mut::<PendingDespawns>()
                .0
                .push(removal.entity);
        }
        self.removals.extend(removed);

        self.world.resource_mut::<SimTick>().increment();
        self.tick += 1;
        self.time += timestep;
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Tile-crossing notifications since the last call.
    pub fn take_unit_moves(&mut self) -> Vec<UnitMoved> {
        std::mem::take(&mut self.moved)
    }

    /// Entity-removal notifications since the last call.
    pub fn take_removals(&mut self) -> Vec<RemoveEntity> {
        std::mem::take(&mut self.removals)
    }

    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    pub fn snapshot_json(&mut self) -> Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }

    pub fn stockpile(&self, kind: ResourceKind) -> f32 {
        self.world.resource::<Stockpile>().amount(kind)
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f32 {
        self.time
    }

    /// Escape hatch for hosts that need direct world access.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Carrier, Health};

    fn sim(width: i32, height: i32) -> SimWorld {
        let _ = env_logger::builder().is_test(true).try_init();
        SimWorld::new(width, height)
    }

    fn run_ticks(sim: &mut SimWorld, ticks: u32) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_ordered_unit_walks_to_destination() {
        let mut sim = sim(32, 32);
        let unit = sim.spawn_unit(Feet::new(5.5, 5.5));
        sim.order_move(unit, Feet::new(10.5, 5.5)).expect("valid order");

        run_ticks(&mut sim, 300);

        let pos = *sim.world().get::<Feet>(unit).expect("position");
        assert!(pos.distance_to(Feet::new(10.5, 5.5)) <= 0.5 + 1e-3);
        assert!(
            !sim.take_unit_moves().is_empty(),
            "tile crossings must be reported"
        );
        // Settled back onto the fallback
        assert_eq!(sim.snapshot().units[0].command, "Idle");
    }

    #[test]
    fn test_step_accumulates_fixed_ticks() {
        let mut sim = sim(16, 16);
        sim.step(0.02); // less than one 1/30s tick
        assert_eq!(sim.current_tick(), 0);
        sim.step(0.02);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.1); // three more whole ticks
        assert_eq!(sim.current_tick(), 4);
    }

    #[test]
    fn test_gather_then_drop_off_fills_stockpile() {
        let mut sim = sim(32, 32);
        let node = sim.spawn_resource(Tile::new(4, 4), ResourceKind::Wood, 100.0);
        let depot = sim.spawn_building(Footprint::single(Tile::new(2, 4)));
        sim.make_drop_site(depot);
        let worker = sim.spawn_unit(Feet::new(3.5, 4.5));

        sim.order_gather(worker, node).expect("valid order");
        run_ticks(&mut sim, 400);
        let carrier = *sim.world().get::<Carrier>(worker).expect("carrier");
        assert!(carrier.is_full(), "carrier fills from the node");

        sim.order_drop_off(worker, depot).expect("valid order");
        run_ticks(&mut sim, 200);
        assert_eq!(sim.stockpile(ResourceKind::Wood), carrier.capacity);
        let carrier = sim.world().get::<Carrier>(worker).expect("carrier");
        assert_eq!(carrier.carried, 0.0);
    }

    #[test]
    fn test_build_site_completes_under_orders() {
        let mut sim = sim(32, 32);
        let site = sim.spawn_construction_site(Footprint::new(Tile::new(6, 6), Tile::new(7, 7)));
        let builder = sim.spawn_unit(Feet::new(4.5, 6.5));
        sim.order_build(builder, site).expect("valid order");

        run_ticks(&mut sim, 400);

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.buildings.len(), 1);
        assert_eq!(snapshot.buildings[0].progress, 100.0);
    }

    #[test]
    fn test_orders_at_non_commandable_entities_fail() {
        let mut sim = sim(16, 16);
        let building = sim.spawn_building(Footprint::single(Tile::new(3, 3)));
        let err = sim.order_move(building, Feet::new(8.5, 8.5)).unwrap_err();
        assert_eq!(err, CommandError::NotCommandable(building));

        let unit = sim.spawn_unit(Feet::new(2.5, 2.5));
        sim.destroy_entity(unit);
        sim.tick();
        let err = sim.order_move(unit, Feet::new(8.5, 8.5)).unwrap_err();
        assert_eq!(err, CommandError::Missing(unit));
    }

    #[test]
    fn test_killed_unit_decays_and_is_removed() {
        let mut sim = sim(32, 32);
        let attacker = sim.spawn_unit(Feet::new(5.5, 5.5));
        let victim = sim.spawn_unit(Feet::new(6.5, 5.5));
        {
            let mut weapon = sim
                .world_mut()
                .get_mut::<Weapon>(attacker)
                .expect("weapon");
            weapon.damage = 1000.0;
        }
        sim.order_attack(attacker, victim).expect("valid order");

        let decay_ticks = sim.world().resource::<SimConfig>().decay_ticks as u32;
        run_ticks(&mut sim, decay_ticks + 10);

        assert!(!sim.world().entities().contains(victim));
        assert!(sim.take_removals().iter().any(|r| r.entity == victim));
    }

    #[test]
    fn test_orders_for_dead_unit_do_not_stall_removal() {
        let mut sim = sim(32, 32);
        let unit = sim.spawn_unit(Feet::new(5.5, 5.5));
        sim.world_mut()
            .get_mut::<Health>(unit)
            .expect("health")
            .damage(1000.0);
        sim.tick();

        // An order issued at the corpse must not displace its decay
        sim.order_move(unit, Feet::new(20.5, 5.5))
            .expect("queue still exists while decaying");

        let decay_ticks = sim.world().resource::<SimConfig>().decay_ticks as u32;
        run_ticks(&mut sim, decay_ticks + 10);
        assert!(!sim.world().entities().contains(unit));
        assert!(sim.take_removals().iter().any(|r| r.entity == unit));
    }

    #[test]
    fn test_cancel_orders_leaves_fallback_only() {
        let mut sim = sim(32, 32);
        let unit = sim.spawn_unit(Feet::new(5.5, 5.5));
        sim.order_move(unit, Feet::new(25.5, 25.5)).expect("valid order");
        sim.tick();

        sim.cancel_orders(unit).expect("valid order");
        sim.tick();

        let queue = sim.world().get::<CommandQueue>(unit).expect("queue");
        assert_eq!(queue.len(), 1);
        assert_eq!(sim.snapshot().units[0].command, "Idle");
    }
}
