//! Wire protocol between the reference server and client
//!
//! JSON text frames over a WebSocket, one message per frame, tagged by
//! `type` like the packet names they stand in for.

use serde::{Deserialize, Serialize};

use crate::position::{BlockPos, Vec3};
use crate::world_data::{Block, Item};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame of every connection
    Login { username: String, version: String },
    /// Ask the server to stream terrain and spawn the player
    JoinWorld,
    /// Chat line or slash command
    Chat { message: String },
    /// Break the block at `location`
    Dig { location: BlockPos },
    /// Place the held item against `location` on the given face
    PlaceBlock { location: BlockPos, face: BlockPos },
    /// Creative-mode inventory edit
    CreativeSlot { slot: u16, item: Option<Item> },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Login {
        entity_id: i32,
        username: String,
        uuid: String,
    },
    Disconnect {
        reason: String,
    },
    MapChunk {
        x: i32,
        z: i32,
        heights: Vec<u8>,
        blocks: Vec<Block>,
    },
    /// Authoritative player position; `teleport` marks server-forced moves
    Position {
        position: Vec3,
        on_ground: bool,
        teleport: bool,
    },
    BlockChange {
        location: BlockPos,
        #[serde(rename = "block_type")]
        type_id: u16,
        metadata: u8,
    },
    BlockAction(BlockAction),
    SetSlot {
        window_id: u8,
        slot: u16,
        item: Option<Item>,
    },
    SpawnEntity {
        entity_id: i32,
        name: String,
        position: Vec3,
    },
    EntityStatus {
        entity_id: i32,
        status: u8,
    },
    EntityDestroy {
        entity_ids: Vec<i32>,
    },
    Chat {
        message: ChatMessage,
    },
    WorldParticles {
        particle_id: u32,
        long_distance: bool,
        position: Vec3,
        offset: Vec3,
        particle_data: f32,
        particles: u32,
    },
    NamedSoundEffect {
        sound_name: String,
        position: Vec3,
        volume: f32,
        pitch: f32,
    },
    Experience {
        experience_bar: f32,
        level: u32,
        total_experience: u32,
    },
}

/// Entity status code for death
pub const ENTITY_STATUS_DEAD: u8 = 3;

/// Low-level block animation/state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAction {
    pub location: BlockPos,
    pub byte1: u8,
    pub byte2: u8,
    pub block_id: u16,
}

/// A chat component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<ChatMessage>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: Vec::new(),
        }
    }

    /// Flatten the component tree into plain text
    pub fn to_plain(&self) -> String {
        let mut out = self.text.clone();
        for part in &self.extra {
            out.push_str(&part.to_plain());
        }
        out
    }
}

/// Raw packet names, used as event kinds for the low-level escape hatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Login,
    Disconnect,
    MapChunk,
    Position,
    BlockChange,
    BlockAction,
    SetSlot,
    SpawnEntity,
    EntityStatus,
    EntityDestroy,
    Chat,
    WorldParticles,
    NamedSoundEffect,
    Experience,
}

impl ServerMessage {
    pub fn kind(&self) -> PacketKind {
        match self {
            ServerMessage::Login { .. } => PacketKind::Login,
            ServerMessage::Disconnect { .. } => PacketKind::Disconnect,
            ServerMessage::MapChunk { .. } => PacketKind::MapChunk,
            ServerMessage::Position { .. } => PacketKind::Position,
            ServerMessage::BlockChange { .. } => PacketKind::BlockChange,
            ServerMessage::BlockAction(_) => PacketKind::BlockAction,
            ServerMessage::SetSlot { .. } => PacketKind::SetSlot,
            ServerMessage::SpawnEntity { .. } => PacketKind::SpawnEntity,
            ServerMessage::EntityStatus { .. } => PacketKind::EntityStatus,
            ServerMessage::EntityDestroy { .. } => PacketKind::EntityDestroy,
            ServerMessage::Chat { .. } => PacketKind::Chat,
            ServerMessage::WorldParticles { .. } => PacketKind::WorldParticles,
            ServerMessage::NamedSoundEffect { .. } => PacketKind::NamedSoundEffect,
            ServerMessage::Experience { .. } => PacketKind::Experience,
        }
    }
}
