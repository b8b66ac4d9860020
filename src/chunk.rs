//! Chunk columns
//!
//! A column is a 16x16 heightmap plus explicit block overrides. Terrain
//! below the surface follows fixed layering, so both ends of the wire can
//! derive any block from the heightmap alone.

use std::collections::HashMap;

use crate::position::BlockPos;
use crate::world_data::{Block, AIR, BEDROCK, DIRT, GRASS, STONE};

/// Width of a chunk column in blocks
pub const CHUNK_WIDTH: i32 = 16;

/// Highest buildable y coordinate
pub const WORLD_TOP: i32 = 255;

/// Block type produced by terrain layering for a column of `height`
pub fn terrain_block(height: u8, y: i32) -> u16 {
    let h = height as i32;
    if y < 0 || y > h {
        AIR
    } else if y == 0 {
        BEDROCK
    } else if y == h {
        GRASS
    } else if y >= h - 3 {
        DIRT
    } else {
        STONE
    }
}

/// One 16x16 column of the world
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    pub x: i32,
    pub z: i32,
    heights: Vec<u8>,
    overrides: HashMap<BlockPos, Block>,
}

impl ChunkColumn {
    /// Build a column from a heightmap (`lz * 16 + lx` ordering)
    pub fn new(x: i32, z: i32, heights: Vec<u8>) -> Self {
        debug_assert_eq!(heights.len(), (CHUNK_WIDTH * CHUNK_WIDTH) as usize);
        Self {
            x,
            z,
            heights,
            overrides: HashMap::new(),
        }
    }

    /// Rebuild a column received over the wire; `None` unless the heightmap
    /// covers every column in the chunk
    pub fn from_parts(x: i32, z: i32, heights: Vec<u8>, blocks: Vec<Block>) -> Option<Self> {
        if heights.len() != (CHUNK_WIDTH * CHUNK_WIDTH) as usize {
            return None;
        }
        let mut column = Self::new(x, z, heights);
        for block in blocks {
            column.overrides.insert(block.position, block);
        }
        Some(column)
    }

    pub fn heights(&self) -> &[u8] {
        &self.heights
    }

    /// Overridden blocks, in no particular order
    pub fn overrides(&self) -> Vec<Block> {
        self.overrides.values().copied().collect()
    }

    /// Whether `pos` lies inside this column
    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.chunk() == (self.x, self.z)
    }

    fn height_at(&self, pos: BlockPos) -> u8 {
        let lx = pos.x.rem_euclid(CHUNK_WIDTH);
        let lz = pos.z.rem_euclid(CHUNK_WIDTH);
        self.heights[(lz * CHUNK_WIDTH + lx) as usize]
    }

    /// Block at `pos`, `None` when `pos` is outside this column
    pub fn block_at(&self, pos: BlockPos) -> Option<Block> {
        if !self.contains(pos) {
            return None;
        }
        if let Some(block) = self.overrides.get(&pos) {
            return Some(*block);
        }
        Some(Block {
            position: pos,
            type_id: terrain_block(self.height_at(pos), pos.y),
            metadata: 0,
        })
    }

    /// Replace the block at `block.position`, returning the previous block
    pub fn set_block(&mut self, block: Block) -> Option<Block> {
        let old = self.block_at(block.position)?;
        self.overrides.insert(block.position, block);
        Some(old)
    }

    /// Y coordinate of the highest non-air block in the (x, z) column
    pub fn surface_y(&self, x: i32, z: i32) -> Option<i32> {
        let probe = BlockPos::new(x, 0, z);
        if !self.contains(probe) {
            return None;
        }
        let terrain = self.height_at(probe) as i32;
        let overridden_top = self
            .overrides
            .values()
            .filter(|b| b.position.x == x && b.position.z == z && !b.is_air())
            .map(|b| b.position.y)
            .max();

        let mut y = overridden_top.map_or(terrain, |top| top.max(terrain));
        while y >= 0 {
            match self.block_at(BlockPos::new(x, y, z)) {
                Some(block) if !block.is_air() => return Some(y),
                _ => y -= 1,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(height: u8) -> ChunkColumn {
        ChunkColumn::new(0, 0, vec![height; 256])
    }

    #[test]
    fn test_terrain_layering() {
        assert_eq!(terrain_block(10, 0), BEDROCK);
        assert_eq!(terrain_block(10, 5), STONE);
        assert_eq!(terrain_block(10, 7), DIRT);
        assert_eq!(terrain_block(10, 9), DIRT);
        assert_eq!(terrain_block(10, 10), GRASS);
        assert_eq!(terrain_block(10, 11), AIR);
        assert_eq!(terrain_block(10, -1), AIR);
    }

    #[test]
    fn test_block_at_outside_column() {
        let column = flat(10);
        assert!(column.block_at(BlockPos::new(16, 5, 0)).is_none());
        assert!(column.block_at(BlockPos::new(15, 5, 15)).is_some());
    }

    #[test]
    fn test_set_block_returns_previous() {
        let mut column = flat(10);
        let pos = BlockPos::new(3, 10, 4);
        let old = column
            .set_block(Block {
                position: pos,
                type_id: AIR,
                metadata: 0,
            })
            .unwrap();
        assert_eq!(old.type_id, GRASS);
        assert_eq!(column.block_at(pos).unwrap().type_id, AIR);
        assert_eq!(column.overrides().len(), 1);
    }

    #[test]
    fn test_surface_follows_overrides() {
        let mut column = flat(10);
        assert_eq!(column.surface_y(1, 1), Some(10));

        column.set_block(Block {
            position: BlockPos::new(1, 10, 1),
            type_id: AIR,
            metadata: 0,
        });
        assert_eq!(column.surface_y(1, 1), Some(9));

        column.set_block(Block {
            position: BlockPos::new(1, 20, 1),
            type_id: 54,
            metadata: 2,
        });
        assert_eq!(column.surface_y(1, 1), Some(20));
    }
}
