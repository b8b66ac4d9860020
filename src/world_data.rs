//! World-data provider
//!
//! Read-only lookup tables keyed by protocol version:
//! - Supported versions and their capability flags
//! - Block name <-> numeric id
//! - Entity naming (legacy CamelCase vs namespaced snake_case)
//! - Experience level arithmetic

use serde::{Deserialize, Serialize};

use crate::position::BlockPos;

/// Protocol versions the reference server speaks, oldest first
pub const SUPPORTED_VERSIONS: &[&str] = &["1.8.8", "1.12.2"];

/// Hotbar slot 0 in the player inventory window
pub const QUICK_BAR_START: u16 = 36;

/// Server capabilities the harness branches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Entity type names are CamelCase (`EnderDragon`) instead of snake_case
    EntityCamelCase,
    /// Block actions carry the block id of the target block
    BlockActionBlockId,
}

/// A block in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub position: BlockPos,
    #[serde(rename = "type")]
    pub type_id: u16,
    pub metadata: u8,
}

impl Block {
    pub fn is_air(&self) -> bool {
        self.type_id == AIR
    }
}

/// An inventory item stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub type_id: u16,
    pub count: u8,
    #[serde(default)]
    pub metadata: u16,
}

impl Item {
    pub fn new(type_id: u16, count: u8) -> Self {
        Self {
            type_id,
            count,
            metadata: 0,
        }
    }
}

pub const AIR: u16 = 0;
pub const STONE: u16 = 1;
pub const GRASS: u16 = 2;
pub const DIRT: u16 = 3;
pub const BEDROCK: u16 = 7;

const BLOCKS: &[(&str, u16)] = &[
    ("air", AIR),
    ("stone", STONE),
    ("grass", GRASS),
    ("dirt", DIRT),
    ("cobblestone", 4),
    ("planks", 5),
    ("bedrock", BEDROCK),
    ("sand", 12),
    ("gravel", 13),
    ("glass", 20),
    ("chest", 54),
    ("stained_glass", 95),
];

/// Canonical (snake_case) entity names with their legacy CamelCase form
const ENTITIES: &[(&str, &str)] = &[
    ("ender_dragon", "EnderDragon"),
    ("zombie", "Zombie"),
    ("skeleton", "Skeleton"),
    ("creeper", "Creeper"),
    ("pig", "Pig"),
    ("cow", "Cow"),
    ("sheep", "Sheep"),
];

/// Lookup tables for one protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionData {
    version: &'static str,
    entity_camel_case: bool,
}

impl VersionData {
    /// Tables for a supported version, `None` otherwise
    pub fn for_version(version: &str) -> Option<Self> {
        let version = SUPPORTED_VERSIONS.iter().copied().find(|v| *v == version)?;
        Some(Self {
            version,
            // Namespaced entity names arrived with 1.11
            entity_camel_case: version == "1.8.8",
        })
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::EntityCamelCase => self.entity_camel_case,
            Feature::BlockActionBlockId => true,
        }
    }

    /// Numeric id for a block name
    pub fn block_id(&self, name: &str) -> Option<u16> {
        BLOCKS.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
    }

    /// Block name for a numeric id
    pub fn block_name(&self, id: u16) -> Option<&'static str> {
        BLOCKS.iter().find(|(_, i)| *i == id).map(|(n, _)| *n)
    }

    /// Entity type name as this version spells it
    pub fn entity_name(&self, canonical: &str) -> Option<&'static str> {
        ENTITIES.iter().find(|(c, _)| *c == canonical).map(|(c, camel)| {
            if self.entity_camel_case {
                *camel
            } else {
                *c
            }
        })
    }

    /// Whether `name` is a valid entity type for this version
    pub fn is_entity_name(&self, name: &str) -> bool {
        ENTITIES.iter().any(|(c, camel)| {
            if self.entity_camel_case {
                *camel == name
            } else {
                *c == name
            }
        })
    }
}

/// Experience state as shown to a player
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Experience {
    pub points: u32,
    pub level: u32,
    pub progress: f32,
}

impl Experience {
    /// Derive level and progress from a point total
    pub fn from_points(points: u32) -> Self {
        let mut level = 0;
        while level_threshold(level + 1) <= u64::from(points) {
            level += 1;
        }
        let into_level = u64::from(points) - level_threshold(level);
        Self {
            points,
            level,
            progress: into_level as f32 / xp_to_next_level(level) as f32,
        }
    }
}

/// Total points required to reach `level`
///
/// Saturates at `u32::MAX` for levels no point total can reach.
pub fn total_xp_for_level(level: u32) -> u32 {
    u32::try_from(level_threshold(level)).unwrap_or(u32::MAX)
}

// Exact for every level a u32 point total can reach; never saturates there
fn level_threshold(level: u32) -> u64 {
    let l = level as f64;
    let total = if level <= 16 {
        l * l + 6.0 * l
    } else if level <= 31 {
        2.5 * l * l - 40.5 * l + 360.0
    } else {
        4.5 * l * l - 162.5 * l + 2220.0
    };
    total as u64
}

/// Points between `level` and `level + 1`
pub fn xp_to_next_level(level: u32) -> u32 {
    if level <= 15 {
        2 * level + 7
    } else if level <= 30 {
        5 * level - 38
    } else {
        9 * level - 158
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_versions_resolve() {
        for version in SUPPORTED_VERSIONS {
            let data = VersionData::for_version(version).unwrap();
            assert_eq!(data.version(), *version);
            assert_eq!(data.block_id("chest"), Some(54));
        }
        assert!(VersionData::for_version("1.99").is_none());
    }

    #[test]
    fn test_entity_naming_follows_feature() {
        let old = VersionData::for_version("1.8.8").unwrap();
        assert!(old.supports(Feature::EntityCamelCase));
        assert_eq!(old.entity_name("ender_dragon"), Some("EnderDragon"));
        assert!(old.is_entity_name("EnderDragon"));
        assert!(!old.is_entity_name("ender_dragon"));

        let new = VersionData::for_version("1.12.2").unwrap();
        assert!(!new.supports(Feature::EntityCamelCase));
        assert_eq!(new.entity_name("ender_dragon"), Some("ender_dragon"));
    }

    #[test]
    fn test_block_lookup_round_trips_names() {
        let data = VersionData::for_version("1.12.2").unwrap();
        assert_eq!(data.block_name(95), Some("stained_glass"));
        assert_eq!(data.block_id("nope"), None);
    }

    #[test]
    fn test_experience_levels() {
        assert_eq!(total_xp_for_level(7), 91);
        assert_eq!(total_xp_for_level(17), 394);
        assert_eq!(total_xp_for_level(32), 1628);

        let xp = Experience::from_points(100);
        assert_eq!(xp.points, 100);
        assert_eq!(xp.level, 7);
        assert!((xp.progress - 9.0 / 21.0).abs() < 1e-6);

        assert_eq!(Experience::from_points(0).level, 0);
    }

    #[test]
    fn test_experience_at_point_ceiling() {
        let xp = Experience::from_points(u32::MAX);
        assert_eq!(xp.points, u32::MAX);
        assert_eq!(total_xp_for_level(xp.level + 1), u32::MAX);
        assert!((0.0..1.0).contains(&xp.progress));
    }
}
