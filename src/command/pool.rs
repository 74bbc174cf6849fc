//! Generational command pool.
//!
//! Commands are acquired from and released to a reuse pool instead of being
//! heap-allocated per tick. Queues refer to pool slots by [`CommandId`]
//! (index + generation), never by pointer: a released slot bumps its
//! generation, so a stale id can never touch a re-acquired command.

use bevy_ecs::prelude::*;

use super::CommandKind;

/// Generational handle to a pooled command instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    index: u32,
    generation: u32,
}

/// A live command: scheduling metadata plus the kind-specific payload.
#[derive(Debug)]
pub struct CommandInst {
    /// Entity whose queue owns this command.
    pub owner: Entity,
    /// Queue priority; higher runs first.
    pub priority: i32,
    /// Whether `on_start` has run.
    pub started: bool,
    pub kind: CommandKind,
}

impl CommandInst {
    pub fn new(owner: Entity, priority: i32, kind: CommandKind) -> Self {
        Self {
            owner,
            priority,
            started: false,
            kind,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    inst: Option<CommandInst>,
}

/// Arena of command instances with a free list.
#[derive(Resource, Debug, Default)]
pub struct CommandPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl CommandPool {
    /// Store a command, reusing a free slot when one exists.
    pub fn acquire(&mut self, inst: CommandInst) -> CommandId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.inst = Some(inst);
            CommandId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                inst: Some(inst),
            });
            CommandId {
                index,
                generation: 0,
            }
        }
    }

    /// Return a command to the pool. The id is dead afterward; releasing a
    /// stale id is a no-op (logged), never a corruption.
    pub fn release(&mut self, id: CommandId) -> Option<CommandInst> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.inst.is_none() {
            log::warn!("ignored release of stale command id {:?}", id);
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.inst.take()
    }

    pub fn get(&self, id: CommandId) -> Option<&CommandInst> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.inst.as_ref()
    }

    pub fn get_mut(&mut self, id: CommandId) -> Option<&mut CommandInst> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.inst.as_mut()
    }

    /// Number of live (acquired, not yet released) commands.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.inst.is_some()).count()
    }
}
