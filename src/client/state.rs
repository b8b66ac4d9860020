//! Client-side world view
//!
//! [`ClientState::apply`] folds one server message into the view and returns
//! the domain events it produces. The caller emits them after releasing the
//! state lock, since listeners may read the state back.

use std::collections::HashMap;

use tracing::warn;

use crate::chunk::ChunkColumn;
use crate::events::{Entity, Event, EventKind};
use crate::position::{BlockPos, Vec3};
use crate::protocol::{ServerMessage, ENTITY_STATUS_DEAD};
use crate::world_data::{Block, Experience, Item};

#[derive(Debug, Default)]
pub struct ClientState {
    pub entity_id: Option<i32>,
    pub logged_in: bool,
    pub spawned: bool,
    pub position: Vec3,
    pub on_ground: bool,
    pub columns: HashMap<(i32, i32), ChunkColumn>,
    pub mobs: HashMap<i32, Entity>,
    pub inventory: HashMap<u16, Item>,
    pub experience: Experience,
}

impl ClientState {
    pub fn block_at(&self, pos: BlockPos) -> Option<Block> {
        self.columns.get(&pos.chunk())?.block_at(pos)
    }

    /// Update the view from `msg`; returns `(kind, event)` pairs in emission order
    pub fn apply(&mut self, msg: &ServerMessage) -> Vec<(EventKind, Event)> {
        fn push(out: &mut Vec<(EventKind, Event)>, event: Event) {
            out.push((event.kind(), event));
        }
        let mut out = Vec::new();

        match msg {
            ServerMessage::Login { entity_id, .. } => {
                self.entity_id = Some(*entity_id);
                self.logged_in = true;
                push(&mut out, Event::Login {
                    entity_id: *entity_id,
                });
            }
            ServerMessage::Disconnect { .. } => {}
            ServerMessage::MapChunk {
                x,
                z,
                heights,
                blocks,
            } => {
                match ChunkColumn::from_parts(*x, *z, heights.clone(), blocks.clone()) {
                    Some(column) => {
                        self.columns.insert((*x, *z), column);
                        push(&mut out, Event::ChunkColumnLoad { x: *x, z: *z });
                    }
                    None => warn!(x, z, heights = heights.len(), "dropping chunk with a short heightmap"),
                }
            }
            ServerMessage::Position {
                position,
                on_ground,
                teleport,
            } => {
                self.position = *position;
                self.on_ground = *on_ground;
                push(&mut out, Event::Move {
                    position: *position,
                    on_ground: *on_ground,
                });
                if *teleport {
                    push(&mut out, Event::ForcedMove {
                        position: *position,
                    });
                }
                if !self.spawned {
                    self.spawned = true;
                    push(&mut out, Event::Spawn {
                        position: *position,
                    });
                }
            }
            ServerMessage::BlockChange {
                location,
                type_id,
                metadata,
            } => {
                let new = Block {
                    position: *location,
                    type_id: *type_id,
                    metadata: *metadata,
                };
                let old = self
                    .columns
                    .get_mut(&location.chunk())
                    .and_then(|column| column.set_block(new));
                let event = Event::BlockUpdate { old, new };
                out.push((EventKind::BlockUpdate, event.clone()));
                out.push((EventKind::BlockUpdateAt(*location), event));
            }
            ServerMessage::SetSlot { slot, item, .. } => {
                let old = match item {
                    Some(item) => self.inventory.insert(*slot, *item),
                    None => self.inventory.remove(slot),
                };
                push(&mut out, Event::WindowUpdate {
                    slot: *slot,
                    old,
                    new: *item,
                });
            }
            ServerMessage::SpawnEntity {
                entity_id,
                name,
                position,
            } => {
                let entity = Entity {
                    id: *entity_id,
                    name: name.clone(),
                    position: *position,
                };
                self.mobs.insert(*entity_id, entity.clone());
                push(&mut out, Event::EntitySpawn(entity));
            }
            ServerMessage::EntityStatus { entity_id, status } => {
                if *status == ENTITY_STATUS_DEAD {
                    if let Some(entity) = self.mobs.get(entity_id) {
                        push(&mut out, Event::EntityDead(entity.clone()));
                    }
                }
            }
            ServerMessage::EntityDestroy { entity_ids } => {
                for id in entity_ids {
                    self.mobs.remove(id);
                }
            }
            ServerMessage::Chat { message } => push(&mut out, Event::Message(message.clone())),
            ServerMessage::NamedSoundEffect {
                sound_name,
                position,
                ..
            } => push(&mut out, Event::SoundEffectHeard {
                name: sound_name.clone(),
                position: *position,
            }),
            ServerMessage::Experience {
                experience_bar,
                level,
                total_experience,
            } => {
                self.experience = Experience {
                    points: *total_experience,
                    level: *level,
                    progress: *experience_bar,
                };
                push(&mut out, Event::Experience(self.experience));
            }
            // Only visible through the raw packet event
            ServerMessage::BlockAction(_) | ServerMessage::WorldParticles { .. } => {}
        }
        out
    }
}
