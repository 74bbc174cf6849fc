//! Command scheduling framework.
//!
//! A command is a resumable, pooled unit of entity behavior with a
//! queue/start/execute/complete lifecycle. Each entity that can act owns a
//! priority queue of commands; the scheduler runs the top command of every
//! queue once per tick. A command may spawn sub-commands, which are pushed
//! above it so they preempt the spawner until they complete - "move closer,
//! then act" compositions fall out of the queue ordering with no explicit
//! call stack.

pub mod movement;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod tasks;

pub use movement::MoveCommand;
pub use pool::{CommandId, CommandInst, CommandPool};
pub use queue::CommandQueue;
pub use scheduler::{
    command_tick, CommandRequest, CommandRequests, DeltaTime, PendingDespawns, SimConfig, SimTick,
};
pub use tasks::{
    AttackCommand, BuildCommand, DecayCommand, DropOffCommand, GarrisonCommand, GatherCommand,
    IdleCommand,
};

use bevy_ecs::prelude::*;

/// Priority of the always-present Idle fallback. Higher priorities run first.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Offset added to a parent's priority for its spawned sub-commands, and to
/// `DEFAULT_PRIORITY` for external requests with no explicit priority.
pub const CHILD_PRIORITY_OFFSET: i32 = 1000;

/// Tagged-union dispatch over the closed set of command kinds.
///
/// Enum dispatch keeps the hot per-tick loop free of virtual calls and lets
/// the pool store commands by value.
#[derive(Debug, Clone)]
pub enum CommandKind {
    Idle(IdleCommand),
    Move(MoveCommand),
    Build(BuildCommand),
    Gather(GatherCommand),
    DropOff(DropOffCommand),
    Attack(AttackCommand),
    Garrison(GarrisonCommand),
    Decay(DecayCommand),
}

impl CommandKind {
    /// Display name of the command, for snapshots and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Idle(_) => "Idle",
            CommandKind::Move(_) => "Move",
            CommandKind::Build(_) => "Build",
            CommandKind::Gather(_) => "Gather",
            CommandKind::DropOff(_) => "DropOff",
            CommandKind::Attack(_) => "Attack",
            CommandKind::Garrison(_) => "Garrison",
            CommandKind::Decay(_) => "Decay",
        }
    }

    /// Called exactly once when the command is pushed into a queue.
    /// Resets command-local accumulators and requests any needed paths.
    pub(crate) fn on_queue(&mut self, owner: Entity, world: &mut World) {
        match self {
            CommandKind::Move(cmd) => cmd.on_queue(owner, world),
            CommandKind::Gather(cmd) => cmd.on_queue(owner, world),
            _ => {}
        }
    }

    /// Called exactly once on the first tick the command is at the top of
    /// its queue. Side-effecting initialization only.
    pub(crate) fn on_start(&mut self, owner: Entity, world: &mut World) {
        match self {
            CommandKind::Decay(cmd) => cmd.on_start(owner, world),
            _ => {
                // Most commands restart their animation when they take over.
                if let Some(mut anim) = world.get_mut::<crate::components::AnimState>(owner) {
                    anim.reset();
                }
            }
        }
    }

    /// Called every tick while at the top of the queue. May append spawned
    /// sub-commands to `subs`. Returns true iff the command finished.
    pub(crate) fn execute(
        &mut self,
        owner: Entity,
        dt: f32,
        tick: u64,
        world: &mut World,
        subs: &mut Vec<CommandKind>,
    ) -> bool {
        match self {
            CommandKind::Idle(cmd) => cmd.execute(owner, tick, world),
            CommandKind::Move(cmd) => cmd.execute(owner, dt, tick, world),
            CommandKind::Build(cmd) => cmd.execute(owner, dt, tick, world, subs),
            CommandKind::Gather(cmd) => cmd.execute(owner, dt, tick, world, subs),
            CommandKind::DropOff(cmd) => cmd.execute(owner, tick, world, subs),
            CommandKind::Attack(cmd) => cmd.execute(owner, tick, world, subs),
            CommandKind::Garrison(cmd) => cmd.execute(owner, world, subs),
            CommandKind::Decay(cmd) => cmd.execute(owner, tick, world),
        }
    }
}
