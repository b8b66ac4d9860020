//! Typed event vocabulary
//!
//! Every occurrence a server or client can report is an [`Event`] with a
//! typed payload, dispatched under a closed set of [`EventKind`]s. Waits are
//! keyed by kind and convert payloads through [`FromEvent`], so a wait's
//! result type is checked against the vocabulary instead of a string name.

mod source;
pub mod wait;

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::position::{BlockPos, Vec3};
use crate::protocol::{BlockAction, ChatMessage, PacketKind, ServerMessage};
use crate::world_data::{Block, Experience, Item};

pub use source::{EventSource, Flow, Subscription};
pub use wait::{
    once, spawn_zone_chunks, wait_count, wait_for, wait_message, wait_messages, wait_state, Wait,
};

/// Event dispatch keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Server bound its listening socket
    Listening,
    /// Client finished the login exchange
    Login,
    /// Client received its first position after joining the world
    Spawn,
    /// Client position changed
    Move,
    /// Server repositioned the client
    ForcedMove,
    ChunkColumnLoad,
    BlockUpdate,
    /// Block update at one specific position
    BlockUpdateAt(BlockPos),
    WindowUpdate,
    EntitySpawn,
    EntityDead,
    Message,
    SoundEffectHeard,
    Experience,
    /// Raw wire message, before any interpretation
    Packet(PacketKind),
    /// Source shut down or connection ended
    End,
}

/// A non-player entity known to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i32,
    pub name: String,
    pub position: Vec3,
}

/// An occurrence with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Listening {
        addr: SocketAddr,
    },
    Login {
        entity_id: i32,
    },
    Spawn {
        position: Vec3,
    },
    Move {
        position: Vec3,
        on_ground: bool,
    },
    ForcedMove {
        position: Vec3,
    },
    ChunkColumnLoad {
        x: i32,
        z: i32,
    },
    BlockUpdate {
        old: Option<Block>,
        new: Block,
    },
    WindowUpdate {
        slot: u16,
        old: Option<Item>,
        new: Option<Item>,
    },
    EntitySpawn(Entity),
    EntityDead(Entity),
    Message(ChatMessage),
    SoundEffectHeard {
        name: String,
        position: Vec3,
    },
    Experience(Experience),
    Packet(ServerMessage),
    End {
        reason: String,
    },
}

impl Event {
    /// Primary dispatch kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Listening { .. } => EventKind::Listening,
            Event::Login { .. } => EventKind::Login,
            Event::Spawn { .. } => EventKind::Spawn,
            Event::Move { .. } => EventKind::Move,
            Event::ForcedMove { .. } => EventKind::ForcedMove,
            Event::ChunkColumnLoad { .. } => EventKind::ChunkColumnLoad,
            Event::BlockUpdate { .. } => EventKind::BlockUpdate,
            Event::WindowUpdate { .. } => EventKind::WindowUpdate,
            Event::EntitySpawn(_) => EventKind::EntitySpawn,
            Event::EntityDead(_) => EventKind::EntityDead,
            Event::Message(_) => EventKind::Message,
            Event::SoundEffectHeard { .. } => EventKind::SoundEffectHeard,
            Event::Experience(_) => EventKind::Experience,
            Event::Packet(packet) => EventKind::Packet(packet.kind()),
            Event::End { .. } => EventKind::End,
        }
    }
}

/// Conversion from an event payload into the value a wait resolves with
pub trait FromEvent: Sized {
    fn from_event(event: &Event) -> Option<Self>;
}

impl FromEvent for Event {
    fn from_event(event: &Event) -> Option<Self> {
        Some(event.clone())
    }
}

impl FromEvent for () {
    fn from_event(_: &Event) -> Option<Self> {
        Some(())
    }
}

impl FromEvent for SocketAddr {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Listening { addr } => Some(*addr),
            _ => None,
        }
    }
}

impl FromEvent for Vec3 {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Spawn { position }
            | Event::Move { position, .. }
            | Event::ForcedMove { position }
            | Event::SoundEffectHeard { position, .. } => Some(*position),
            _ => None,
        }
    }
}

impl FromEvent for (Option<Block>, Block) {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::BlockUpdate { old, new } => Some((*old, *new)),
            _ => None,
        }
    }
}

impl FromEvent for Block {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::BlockUpdate { new, .. } => Some(*new),
            _ => None,
        }
    }
}

impl FromEvent for (u16, Option<Item>, Option<Item>) {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::WindowUpdate { slot, old, new } => Some((*slot, *old, *new)),
            _ => None,
        }
    }
}

impl FromEvent for Entity {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::EntitySpawn(entity) | Event::EntityDead(entity) => Some(entity.clone()),
            _ => None,
        }
    }
}

impl FromEvent for ChatMessage {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Message(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl FromEvent for (String, Vec3) {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::SoundEffectHeard { name, position } => Some((name.clone(), *position)),
            _ => None,
        }
    }
}

impl FromEvent for Experience {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Experience(xp) => Some(*xp),
            _ => None,
        }
    }
}

impl FromEvent for ServerMessage {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Packet(packet) => Some(packet.clone()),
            _ => None,
        }
    }
}

impl FromEvent for BlockAction {
    fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Packet(ServerMessage::BlockAction(action)) => Some(*action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_events_carry_packet_kind() {
        let event = Event::Packet(ServerMessage::Chat {
            message: ChatMessage::new("hi"),
        });
        assert_eq!(event.kind(), EventKind::Packet(PacketKind::Chat));
        assert!(BlockAction::from_event(&event).is_none());
        assert!(ServerMessage::from_event(&event).is_some());
    }

    #[test]
    fn test_block_update_converts_to_tuple() {
        let new = Block {
            position: BlockPos::new(0, 64, 0),
            type_id: 0,
            metadata: 0,
        };
        let event = Event::BlockUpdate { old: None, new };
        let (old, converted) = <(Option<Block>, Block)>::from_event(&event).unwrap();
        assert!(old.is_none());
        assert_eq!(converted, new);
        assert!(Vec3::from_event(&event).is_none());
    }
}
