//! Chat command interpreter
//!
//! Lines starting with `/` are parsed into a [`Command`] and executed on
//! behalf of the sending player. Coordinates accept the `~` relative form.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::AppState;
use crate::events::Entity;
use crate::position::{BlockPos, Vec3};
use crate::protocol::{BlockAction, ServerMessage, ENTITY_STATUS_DEAD};
use crate::world_data::{Block, Experience};

pub const NO_PERMISSION: &str = "You do not have permission to use this command";

const HELP: &str = "Commands: /help, /particle, /playsound, /summon, /kill, /tp, /op, /deop, \
                    /setblock, /setblockaction, /xp";

static ENTITY_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@e(?:\[type=([A-Za-z_]+)\])?$").expect("valid selector regex"));

/// A coordinate as typed, absolute or relative to a base position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coord {
    Absolute(f64),
    Relative(f64),
}

impl Coord {
    pub fn parse(token: &str) -> Option<Coord> {
        match token.strip_prefix('~') {
            Some("") => Some(Coord::Relative(0.0)),
            Some(offset) => offset.parse().ok().map(Coord::Relative),
            None => token.parse().ok().map(Coord::Absolute),
        }
    }

    pub fn resolve(self, base: f64) -> f64 {
        match self {
            Coord::Absolute(v) => v,
            Coord::Relative(offset) => base + offset,
        }
    }
}

fn resolve(coords: [Coord; 3], base: Vec3) -> Vec3 {
    Vec3::new(
        coords[0].resolve(base.x),
        coords[1].resolve(base.y),
        coords[2].resolve(base.z),
    )
}

/// Where `/tp` sends its target
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Coords([Coord; 3]),
    Player(String),
}

/// What `/kill` hits
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Every mob, or only mobs of one type
    Entities(Option<String>),
    Player(String),
}

impl Selector {
    pub fn parse(token: &str) -> Selector {
        match ENTITY_SELECTOR.captures(token) {
            Some(caps) => Selector::Entities(caps.get(1).map(|m| m.as_str().to_string())),
            None => Selector::Player(token.to_string()),
        }
    }
}

/// A block given by numeric id or by name
#[derive(Debug, Clone, PartialEq)]
pub enum BlockRef {
    Id(u16),
    Name(String),
}

/// A parsed chat command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Particle {
        id: u32,
        count: u32,
        position: [Coord; 3],
    },
    PlaySound {
        name: String,
    },
    Summon {
        name: String,
        position: Option<[Coord; 3]>,
    },
    Kill {
        selector: Selector,
    },
    Tp {
        /// `None` teleports the sender
        target: Option<String>,
        destination: Destination,
    },
    Op {
        player: String,
        op: bool,
    },
    SetBlock {
        position: [Coord; 3],
        block: BlockRef,
        metadata: u8,
    },
    SetBlockAction {
        position: [Coord; 3],
        byte1: u8,
        byte2: u8,
    },
    Xp {
        points: u32,
    },
}

fn coords(args: &[&str]) -> Option<[Coord; 3]> {
    match args {
        [x, y, z] => Some([Coord::parse(x)?, Coord::parse(y)?, Coord::parse(z)?]),
        _ => None,
    }
}

impl Command {
    /// Parse a command line without its leading `/`; errors are usage text
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let usage = |text: &str| format!("Usage: {}", text);
        match name {
            "help" => Ok(Command::Help),
            "particle" => match args.as_slice() {
                [id, count, rest @ ..] => Ok(Command::Particle {
                    id: id.parse().map_err(|_| usage("/particle <id> <count> <x> <y> <z>"))?,
                    count: count
                        .parse()
                        .map_err(|_| usage("/particle <id> <count> <x> <y> <z>"))?,
                    position: coords(rest).ok_or_else(|| usage("/particle <id> <count> <x> <y> <z>"))?,
                }),
                _ => Err(usage("/particle <id> <count> <x> <y> <z>")),
            },
            "playsound" => match args.as_slice() {
                [sound] => Ok(Command::PlaySound {
                    name: sound.to_string(),
                }),
                _ => Err(usage("/playsound <sound>")),
            },
            "summon" => match args.as_slice() {
                [entity] => Ok(Command::Summon {
                    name: entity.to_string(),
                    position: None,
                }),
                [entity, rest @ ..] => Ok(Command::Summon {
                    name: entity.to_string(),
                    position: Some(coords(rest).ok_or_else(|| usage("/summon <entity> [x y z]"))?),
                }),
                _ => Err(usage("/summon <entity> [x y z]")),
            },
            "kill" => match args.as_slice() {
                [selector] => Ok(Command::Kill {
                    selector: Selector::parse(selector),
                }),
                _ => Err(usage("/kill <selector>")),
            },
            "tp" => {
                let tp = "/tp [player] <x y z|player>";
                match args.as_slice() {
                    [dest] => Ok(Command::Tp {
                        target: None,
                        destination: Destination::Player(dest.to_string()),
                    }),
                    [target, dest] => Ok(Command::Tp {
                        target: Some(target.to_string()),
                        destination: Destination::Player(dest.to_string()),
                    }),
                    [_, _, _] => Ok(Command::Tp {
                        target: None,
                        destination: Destination::Coords(coords(&args).ok_or_else(|| usage(tp))?),
                    }),
                    [target, rest @ ..] => Ok(Command::Tp {
                        target: Some(target.to_string()),
                        destination: Destination::Coords(coords(rest).ok_or_else(|| usage(tp))?),
                    }),
                    [] => Err(usage(tp)),
                }
            }
            "op" | "deop" => match args.as_slice() {
                [player] => Ok(Command::Op {
                    player: player.to_string(),
                    op: name == "op",
                }),
                _ => Err(usage(&format!("/{} <player>", name))),
            },
            "setblock" => {
                let setblock = "/setblock <x> <y> <z> <block> [data]";
                let (position, block, metadata) = match args.as_slice() {
                    [x, y, z, block] => ([*x, *y, *z], *block, "0"),
                    [x, y, z, block, data] => ([*x, *y, *z], *block, *data),
                    _ => return Err(usage(setblock)),
                };
                Ok(Command::SetBlock {
                    position: coords(&position).ok_or_else(|| usage(setblock))?,
                    block: match block.parse() {
                        Ok(id) => BlockRef::Id(id),
                        Err(_) => BlockRef::Name(block.trim_start_matches("minecraft:").to_string()),
                    },
                    metadata: metadata.parse().map_err(|_| usage(setblock))?,
                })
            }
            "setblockaction" => {
                let text = "/setblockaction <x> <y> <z> <byte1> <byte2>";
                match args.as_slice() {
                    [x, y, z, b1, b2] => Ok(Command::SetBlockAction {
                        position: coords(&[*x, *y, *z]).ok_or_else(|| usage(text))?,
                        byte1: b1.parse().map_err(|_| usage(text))?,
                        byte2: b2.parse().map_err(|_| usage(text))?,
                    }),
                    _ => Err(usage(text)),
                }
            }
            "xp" => match args.as_slice() {
                [points] => Ok(Command::Xp {
                    points: points.parse().map_err(|_| usage("/xp <points>"))?,
                }),
                _ => Err(usage("/xp <points>")),
            },
            _ => Err("Unknown command. Type /help for help".to_string()),
        }
    }

    /// Whether only operators may run this command
    pub fn requires_op(&self) -> bool {
        !matches!(self, Command::Help)
    }
}

/// Parse and run a command line for `sender`
pub fn execute(state: &AppState, sender: i32, line: &str) {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(usage) => {
            state.connections.tell(sender, usage);
            return;
        }
    };

    let Some((name, is_op, position)) = state
        .connections
        .with(sender, |s| (s.username.clone(), s.op, s.position))
    else {
        return;
    };
    if command.requires_op() && !is_op {
        state.connections.tell(sender, NO_PERMISSION);
        return;
    }
    if state.config.logging {
        info!("{} issued server command: /{}", name, line);
    }

    match command {
        Command::Help => state.connections.tell(sender, HELP),
        Command::Particle {
            id,
            count,
            position: at,
        } => {
            state
                .connections
                .broadcast_in_world(ServerMessage::WorldParticles {
                    particle_id: id,
                    long_distance: false,
                    position: resolve(at, position),
                    offset: Vec3::default(),
                    particle_data: 0.0,
                    particles: count,
                });
        }
        Command::PlaySound { name: sound } => {
            state.connections.send_to(
                sender,
                ServerMessage::NamedSoundEffect {
                    sound_name: sound,
                    position,
                    volume: 1.0,
                    pitch: 1.0,
                },
            );
        }
        Command::Summon {
            name: entity,
            position: at,
        } => summon(state, sender, &entity, at.map_or(position, |at| resolve(at, position))),
        Command::Kill { selector } => kill(state, sender, selector),
        Command::Tp {
            target,
            destination,
        } => teleport(state, sender, &name, target, destination),
        Command::Op { player, op } => {
            let Some(id) = state.connections.find(&player) else {
                state
                    .connections
                    .tell(sender, format!("{} is not online", player));
                return;
            };
            state.connections.with_mut(id, |s| s.op = op);
            let verb = if op { "opped" } else { "deopped" };
            state
                .connections
                .tell(sender, format!("{} is {}", player, verb));
        }
        Command::SetBlock {
            position: at,
            block,
            metadata,
        } => {
            let type_id = match block {
                BlockRef::Id(id) => id,
                BlockRef::Name(block_name) => match state.data.block_id(&block_name) {
                    Some(id) => id,
                    None => {
                        state
                            .connections
                            .tell(sender, format!("Unknown block {}", block_name));
                        return;
                    }
                },
            };
            let location = target_block(at, position);
            let placed = state.set_block(Block {
                position: location,
                type_id,
                metadata,
            });
            if placed.is_none() {
                state
                    .connections
                    .tell(sender, "Cannot place block outside of the world");
            }
        }
        Command::SetBlockAction {
            position: at,
            byte1,
            byte2,
        } => {
            let location = target_block(at, position);
            let block_id = state.world.lock().block_at(location).type_id;
            state
                .connections
                .broadcast_in_world(ServerMessage::BlockAction(BlockAction {
                    location,
                    byte1,
                    byte2,
                    block_id,
                }));
        }
        Command::Xp { points } => {
            state.connections.with_mut(sender, |s| {
                s.experience = s.experience.saturating_add(points);
                let xp = Experience::from_points(s.experience);
                s.send(ServerMessage::Experience {
                    experience_bar: xp.progress,
                    level: xp.level,
                    total_experience: xp.points,
                });
            });
        }
    }
}

fn summon(state: &AppState, sender: i32, name: &str, position: Vec3) {
    if !state.data.is_entity_name(name) {
        state
            .connections
            .tell(sender, format!("Unknown entity name {}", name));
        return;
    }
    let entity = Entity {
        id: state.next_entity_id(),
        name: name.to_string(),
        position,
    };
    state.mobs.lock().insert(entity.id, entity.clone());
    state
        .connections
        .broadcast_in_world(ServerMessage::SpawnEntity {
            entity_id: entity.id,
            name: entity.name,
            position,
        });
    state.connections.tell(sender, "Object successfully summoned");
}

fn kill(state: &AppState, sender: i32, selector: Selector) {
    match selector {
        Selector::Entities(kind) => {
            let killed: Vec<i32> = {
                let mut mobs = state.mobs.lock();
                let ids: Vec<i32> = mobs
                    .values()
                    .filter(|m| kind.as_deref().map_or(true, |k| m.name == k))
                    .map(|m| m.id)
                    .collect();
                for id in &ids {
                    mobs.remove(id);
                }
                ids
            };
            for &entity_id in &killed {
                state
                    .connections
                    .broadcast_in_world(ServerMessage::EntityStatus {
                        entity_id,
                        status: ENTITY_STATUS_DEAD,
                    });
            }
            if !killed.is_empty() {
                state
                    .connections
                    .broadcast_in_world(ServerMessage::EntityDestroy {
                        entity_ids: killed.clone(),
                    });
            }
            state
                .connections
                .tell(sender, format!("Killed {} entities", killed.len()));
        }
        Selector::Player(player) => {
            let Some(id) = state.connections.find(&player) else {
                state
                    .connections
                    .tell(sender, format!("{} is not online", player));
                return;
            };
            state
                .connections
                .broadcast_in_world(ServerMessage::EntityStatus {
                    entity_id: id,
                    status: ENTITY_STATUS_DEAD,
                });
            // Respawn by dropping the player back at the spawn point
            let spawn = state.spawn_point();
            state.connections.with_mut(id, |s| {
                s.position = spawn;
                s.on_ground = false;
                s.falling = true;
                s.send(ServerMessage::Position {
                    position: spawn,
                    on_ground: false,
                    teleport: true,
                });
            });
            state.connections.tell(sender, "Killed 1 entities");
        }
    }
}

fn teleport(
    state: &AppState,
    sender: i32,
    sender_name: &str,
    target: Option<String>,
    destination: Destination,
) {
    let target_name = target.as_deref().unwrap_or(sender_name);
    let Some(target_id) = state.connections.find(target_name) else {
        state
            .connections
            .tell(sender, format!("{} is not online", target_name));
        return;
    };
    let Some(origin) = state.connections.with(target_id, |s| s.position) else {
        return;
    };

    let position = match destination {
        Destination::Coords(at) => resolve(at, origin),
        Destination::Player(dest) => {
            let found = state
                .connections
                .find(&dest)
                .and_then(|id| state.connections.with(id, |s| s.position));
            match found {
                Some(position) => position,
                None => {
                    state
                        .connections
                        .tell(sender, format!("{} is not online", dest));
                    return;
                }
            }
        }
    };

    state.connections.with_mut(target_id, |s| {
        s.position = position;
        s.falling = false;
        s.on_ground = false;
        s.send(ServerMessage::Position {
            position,
            on_ground: false,
            teleport: true,
        });
    });
    debug!("Teleported {} to {}", target_name, position);
}

/// Block position a command line targets, relative to `base`
pub fn target_block(position: [Coord; 3], base: Vec3) -> BlockPos {
    resolve(position, base).floored()
}
