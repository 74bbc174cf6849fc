//! Task commands: idle, build, gather, drop-off, attack, garrison, decay.
//!
//! Every interaction command follows the same approach-then-act shape: when
//! the owner is not yet within range of its target it spawns a movement
//! sub-command (which preempts it via queue priority) and reports incomplete;
//! once in range it performs its per-tick work. The range test is
//! footprint-aware so large buildings are "reached" at their edge.

use bevy_ecs::prelude::*;
use std::collections::{HashSet, VecDeque};

use crate::components::{
    AnimState, BuildSite, Carrier, DropSite, Feet, Footprint, Garrison, Garrisoned, Health,
    Mobile, ResourceKind, ResourceNode, Stockpile, Tile, Weapon,
};
use crate::events::RemoveEntity;
use crate::geometry;
use crate::grid::{GridLayer, LayeredGrid};

use super::movement::MoveCommand;
use super::scheduler::{SimConfig, SimTick};
use super::CommandKind;

/// Is `owner` within `radius` of `target`? Clamps against the target's
/// footprint when it has one. `None` means either entity lacks a position.
fn within_range(world: &World, owner: Entity, target: Entity, radius: f32) -> Option<bool> {
    let pos = *world.get::<Feet>(owner)?;
    if let Some(footprint) = world.get::<Footprint>(target) {
        return Some(geometry::circle_overlaps_rect(pos, radius, footprint.rect()));
    }
    let target_pos = *world.get::<Feet>(target)?;
    Some(geometry::circle_contains_point(pos, radius, target_pos))
}

fn goal_radius(world: &World, owner: Entity) -> f32 {
    world
        .get::<Mobile>(owner)
        .map(|m| m.goal_radius)
        .unwrap_or(Mobile::default().goal_radius)
}

fn advance_anim(world: &mut World, owner: Entity, tick: u64) {
    if let Some(mut anim) = world.get_mut::<AnimState>(owner) {
        anim.advance(tick);
    }
}

// ============================================================================
// IDLE
// ============================================================================

/// The fallback command. Never completes, so a queue holding one is never
/// empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleCommand;

impl IdleCommand {
    pub(crate) fn execute(&mut self, owner: Entity, tick: u64, world: &mut World) -> bool {
        advance_anim(world, owner, tick);
        false
    }
}

// ============================================================================
// BUILD
// ============================================================================

/// Advance construction on a build site until it reaches full progress.
#[derive(Debug, Clone, Copy)]
pub struct BuildCommand {
    target: Entity,
}

impl BuildCommand {
    pub fn new(target: Entity) -> CommandKind {
        CommandKind::Build(Self { target })
    }

    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        dt: f32,
        tick: u64,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        let Some(site) = world.get::<BuildSite>(self.target) else {
            log::warn!("build target {:?} has no construction site", self.target);
            return true;
        };
        if site.is_complete() {
            return true;
        }

        match within_range(world, owner, self.target, goal_radius(world, owner)) {
            None => return true,
            Some(false) => {
                subs.push(MoveCommand::to_entity(self.target));
                return false;
            }
            Some(true) => {}
        }

        let rate = world.resource::<SimConfig>().build_rate;
        let done = {
            let mut site = world
                .get_mut::<BuildSite>(self.target)
                .expect("checked above");
            site.advance(rate * dt);
            site.is_complete()
        };
        advance_anim(world, owner, tick);
        done
    }
}

// ============================================================================
// GATHER
// ============================================================================

/// Harvest from a resource node until the carrier is full.
///
/// When the node depletes (or disappears) mid-gather, the command retargets to
/// the nearest non-depleted node of the same kind within the configured
/// retarget radius, in the same tick. With no replacement it completes.
#[derive(Debug, Clone, Copy)]
pub struct GatherCommand {
    target: Entity,
    /// Kind being gathered, captured at enqueue so retargeting survives the
    /// original node despawning.
    kind: Option<ResourceKind>,
}

impl GatherCommand {
    pub fn new(target: Entity) -> CommandKind {
        CommandKind::Gather(Self { target, kind: None })
    }

    pub(crate) fn on_queue(&mut self, _owner: Entity, world: &mut World) {
        self.kind = world.get::<ResourceNode>(self.target).map(|n| n.kind);
    }

    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        dt: f32,
        tick: u64,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        let Some(carrier) = world.get::<Carrier>(owner).copied() else {
            debug_assert!(false, "gather command on entity without Carrier");
            return true;
        };
        if carrier.is_full() {
            return true;
        }

        // Retarget past a depleted or despawned node before doing anything
        // else, so the replacement can be harvested this very tick.
        let exhausted = world
            .get::<ResourceNode>(self.target)
            .map_or(true, |n| n.is_depleted());
        if exhausted {
            let Some(kind) = self.kind else {
                log::warn!("gather target {:?} was never a resource node", self.target);
                return true;
            };
            let origin = world
                .get::<Feet>(self.target)
                .or_else(|| world.get::<Feet>(owner))
                .map(|p| p.tile())
                .unwrap_or_default();
            let radius = world.resource::<SimConfig>().retarget_radius;
            match find_replacement_node(world, kind, origin, radius) {
                Some(replacement) => {
                    log::debug!(
                        "gatherer {:?} retargeting from {:?} to {:?}",
                        owner,
                        self.target,
                        replacement
                    );
                    self.target = replacement;
                }
                None => {
                    log::debug!("no {:?} left near {:?}; gather done", kind, origin);
                    return true;
                }
            }
        }

        match within_range(world, owner, self.target, goal_radius(world, owner)) {
            None => return true,
            Some(false) => {
                subs.push(MoveCommand::to_entity(self.target));
                return false;
            }
            Some(true) => {}
        }

        let rate = world.resource::<SimConfig>().gather_rate;
        let want = (rate * dt).min(carrier.room());
        let (taken, node_kind) = {
            let mut node = world
                .get_mut::<ResourceNode>(self.target)
                .expect("checked above");
            (node.take(want), node.kind)
        };
        if let Some(mut carrier) = world.get_mut::<Carrier>(owner) {
            // Switching resource kinds drops the old cargo; carried amounts
            // are never credited across kinds.
            if carrier.kind != Some(node_kind) {
                if carrier.carried > 0.0 {
                    log::debug!(
                        "{:?} dropped {} of {:?} to gather {:?}",
                        owner,
                        carrier.carried,
                        carrier.kind,
                        node_kind
                    );
                }
                carrier.carried = 0.0;
                carrier.kind = Some(node_kind);
            }
            carrier.carried += taken;
        }
        advance_anim(world, owner, tick);
        false
    }
}

/// Breadth-first search over tiles (4-connected) out to `radius` steps for a
/// static-layer entity holding a non-depleted node of `kind`.
fn find_replacement_node(
    world: &World,
    kind: ResourceKind,
    origin: Tile,
    radius: i32,
) -> Option<Entity> {
    let grid = world.resource::<LayeredGrid>();
    let mut visited = HashSet::new();
    let mut frontier = VecDeque::new();
    visited.insert(origin);
    frontier.push_back((origin, 0));

    while let Some((tile, depth)) = frontier.pop_front() {
        if grid.in_bounds(tile) {
            for &entity in grid.entities_at(GridLayer::Static, tile) {
                if let Some(node) = world.get::<ResourceNode>(entity) {
                    if node.kind == kind && !node.is_depleted() {
                        return Some(entity);
                    }
                }
            }
        }
        if depth >= radius {
            continue;
        }
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let next = Tile::new(tile.x + dx, tile.y + dy);
            if visited.insert(next) {
                frontier.push_back((next, depth + 1));
            }
        }
    }
    None
}

// ============================================================================
// DROP-OFF
// ============================================================================

/// Deliver carried resources to a drop-site building.
#[derive(Debug, Clone, Copy)]
pub struct DropOffCommand {
    target: Entity,
}

impl DropOffCommand {
    pub fn new(target: Entity) -> CommandKind {
        CommandKind::DropOff(Self { target })
    }

    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        tick: u64,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        let Some(carrier) = world.get::<Carrier>(owner).copied() else {
            debug_assert!(false, "drop-off command on entity without Carrier");
            return true;
        };
        if carrier.carried <= 0.0 {
            return true;
        }
        if world.get::<DropSite>(self.target).is_none() {
            log::warn!("drop-off target {:?} is not a drop site", self.target);
            return true;
        }

        match within_range(world, owner, self.target, goal_radius(world, owner)) {
            None => return true,
            Some(false) => {
                subs.push(MoveCommand::to_entity(self.target));
                return false;
            }
            Some(true) => {}
        }

        let (kind, amount) = {
            let mut carrier = world.get_mut::<Carrier>(owner).expect("checked above");
            let kind = carrier.kind;
            (kind, carrier.empty())
        };
        if let Some(kind) = kind {
            world.resource_mut::<Stockpile>().grant(kind, amount);
        }
        advance_anim(world, owner, tick);
        true
    }
}

// ============================================================================
// ATTACK
// ============================================================================

/// Close to weapon range and apply volleys on the reload cadence until the
/// target dies or disappears.
#[derive(Debug, Clone, Copy)]
pub struct AttackCommand {
    target: Entity,
    last_volley_tick: Option<u64>,
}

impl AttackCommand {
    pub fn new(target: Entity) -> CommandKind {
        CommandKind::Attack(Self {
            target,
            last_volley_tick: None,
        })
    }

    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        tick: u64,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        let Some(weapon) = world.get::<Weapon>(owner).copied() else {
            debug_assert!(false, "attack command on entity without Weapon");
            return true;
        };
        match world.get::<Health>(self.target) {
            None => return true,
            Some(health) if !health.is_alive() => return true,
            Some(_) => {}
        }

        match within_range(world, owner, self.target, weapon.range) {
            None => return true,
            Some(false) => {
                subs.push(MoveCommand::to_entity(self.target));
                return false;
            }
            Some(true) => {}
        }

        let ready = self
            .last_volley_tick
            .map_or(true, |last| tick >= last + weapon.reload_ticks);
        if ready {
            self.last_volley_tick = Some(tick);
            let dead = {
                let mut health = world
                    .get_mut::<Health>(self.target)
                    .expect("checked above");
                health.damage(weapon.damage);
                !health.is_alive()
            };
            advance_anim(world, owner, tick);
            if dead {
                return true;
            }
        }
        false
    }
}

// ============================================================================
// GARRISON
// ============================================================================

/// Walk to a host building and enter it. The unit leaves the units layer of
/// the occupancy grid while inside.
#[derive(Debug, Clone, Copy)]
pub struct GarrisonCommand {
    target: Entity,
}

impl GarrisonCommand {
    pub fn new(target: Entity) -> CommandKind {
        CommandKind::Garrison(Self { target })
    }

    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        match world.get::<Garrison>(self.target) {
            None => {
                log::warn!("garrison target {:?} cannot host units", self.target);
                return true;
            }
            Some(garrison) if garrison.is_full() => {
                log::debug!("garrison {:?} is full", self.target);
                return true;
            }
            Some(_) => {}
        }

        match within_range(world, owner, self.target, goal_radius(world, owner)) {
            None => return true,
            Some(false) => {
                subs.push(MoveCommand::to_entity(self.target));
                return false;
            }
            Some(true) => {}
        }

        if let Some(pos) = world.get::<Feet>(owner).copied() {
            world.resource_scope(|_, mut grid: Mut<LayeredGrid>| {
                grid.remove_entity(GridLayer::Units, pos.tile(), owner);
            });
        }
        world.entity_mut(owner).insert(Garrisoned { host: self.target });
        if let Some(mut garrison) = world.get_mut::<Garrison>(self.target) {
            garrison.occupants.push(owner);
        }
        true
    }
}

// ============================================================================
// DECAY
// ============================================================================

/// Death sequence: play the decay animation for the configured tick count,
/// then ask the entity-lifecycle layer to remove the corpse.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayCommand {
    started_tick: Option<u64>,
}

impl DecayCommand {
    pub fn new() -> CommandKind {
        CommandKind::Decay(Self::default())
    }

    pub(crate) fn on_start(&mut self, owner: Entity, world: &mut World) {
        self.started_tick = Some(world.resource::<SimTick>().0);
        if let Some(mut anim) = world.get_mut::<AnimState>(owner) {
            anim.reset();
        }
    }

    pub(crate) fn execute(&mut self, owner: Entity, tick: u64, world: &mut World) -> bool {
        let started = *self.started_tick.get_or_insert(tick);
        let decay_ticks = world.resource::<SimConfig>().decay_ticks;
        if tick >= started + decay_ticks {
            world.send_event(RemoveEntity { entity: owner });
            return true;
        }
        advance_anim(world, owner, tick);
        false
    }
}
