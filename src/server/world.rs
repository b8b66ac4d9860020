//! Server-side world: terrain generation, block edits and persistence

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::chunk::{ChunkColumn, CHUNK_WIDTH, WORLD_TOP};
use crate::config::{GenerationAlgorithm, WorldGeneration};
use crate::error::Result;
use crate::position::BlockPos;
use crate::world_data::Block;

/// File holding persisted block edits inside the world folder
pub const BLOCKS_FILE: &str = "blocks.json";

/// Grid size of one diamond-square pass (one chunk plus its far edge)
const GRID: usize = CHUNK_WIDTH as usize + 1;

/// Lazily generated block world
pub struct World {
    seed: u64,
    algorithm: GenerationAlgorithm,
    base_height: u8,
    columns: HashMap<(i32, i32), ChunkColumn>,
    edits: HashMap<BlockPos, Block>,
}

impl World {
    pub fn new(generation: &WorldGeneration) -> Self {
        let seed = generation.options.seed.unwrap_or_else(rand::random);
        debug!(seed, algorithm = ?generation.algorithm, "world created");
        Self {
            seed,
            algorithm: generation.algorithm,
            base_height: generation.options.world_height,
            columns: HashMap::new(),
            edits: HashMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Chunk column at chunk coordinates, generated on first access
    pub fn column(&mut self, cx: i32, cz: i32) -> &ChunkColumn {
        self.column_mut(cx, cz)
    }

    fn column_mut(&mut self, cx: i32, cz: i32) -> &mut ChunkColumn {
        let (seed, algorithm, base) = (self.seed, self.algorithm, self.base_height);
        self.columns
            .entry((cx, cz))
            .or_insert_with(|| generate_column(seed, algorithm, base, cx, cz))
    }

    pub fn block_at(&mut self, pos: BlockPos) -> Block {
        let (cx, cz) = pos.chunk();
        self.column(cx, cz).block_at(pos).unwrap_or(Block {
            position: pos,
            type_id: 0,
            metadata: 0,
        })
    }

    /// Replace a block, returning what was there; `None` outside build height
    pub fn set_block(&mut self, block: Block) -> Option<Block> {
        if !(0..=WORLD_TOP).contains(&block.position.y) {
            return None;
        }
        let (cx, cz) = block.position.chunk();
        let old = self.column_mut(cx, cz).set_block(block)?;
        self.edits.insert(block.position, block);
        Some(old)
    }

    /// Y of the highest solid block in the (x, z) column
    pub fn surface_y(&mut self, x: i32, z: i32) -> i32 {
        let (cx, cz) = BlockPos::new(x, 0, z).chunk();
        self.column(cx, cz).surface_y(x, z).unwrap_or(0)
    }

    /// Apply edits persisted in `folder`, if any
    pub fn load(&mut self, folder: &Path) -> Result<()> {
        let path = folder.join(BLOCKS_FILE);
        if !path.exists() {
            return Ok(());
        }
        let blocks: Vec<Block> = serde_json::from_slice(&std::fs::read(&path)?)?;
        info!("Loaded {} block edits from {}", blocks.len(), path.display());
        for block in blocks {
            self.set_block(block);
        }
        Ok(())
    }

    /// Persist every edit made since the world was created or loaded
    pub fn save(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)?;
        let mut blocks: Vec<&Block> = self.edits.values().collect();
        blocks.sort_by_key(|b| (b.position.x, b.position.y, b.position.z));
        let path = folder.join(BLOCKS_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&blocks)?)?;
        info!("Saved {} block edits to {}", blocks.len(), path.display());
        Ok(())
    }
}

fn mix(seed: u64, x: i32, z: i32) -> u64 {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    h ^= (x as u32 as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = h.rotate_left(31);
    h ^= (z as u32 as u64).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 29)
}

/// Height at a chunk corner; shared by the four chunks touching it
fn corner_height(seed: u64, base: u8, x: i32, z: i32) -> f64 {
    let mut rng = StdRng::seed_from_u64(mix(seed, x, z));
    base as f64 + rng.random_range(-4.0..=4.0)
}

fn generate_column(
    seed: u64,
    algorithm: GenerationAlgorithm,
    base: u8,
    cx: i32,
    cz: i32,
) -> ChunkColumn {
    let heights = match algorithm {
        GenerationAlgorithm::Superflat => vec![base; (CHUNK_WIDTH * CHUNK_WIDTH) as usize],
        GenerationAlgorithm::DiamondSquare => diamond_square(seed, base, cx, cz),
    };
    ChunkColumn::new(cx, cz, heights)
}

/// One diamond-square pass over a chunk, seeded from its corners
fn diamond_square(seed: u64, base: u8, cx: i32, cz: i32) -> Vec<u8> {
    let x0 = cx * CHUNK_WIDTH;
    let z0 = cz * CHUNK_WIDTH;
    let mut grid = [[0.0f64; GRID]; GRID];
    let last = GRID - 1;
    grid[0][0] = corner_height(seed, base, x0, z0);
    grid[last][0] = corner_height(seed, base, x0 + CHUNK_WIDTH, z0);
    grid[0][last] = corner_height(seed, base, x0, z0 + CHUNK_WIDTH);
    grid[last][last] = corner_height(seed, base, x0 + CHUNK_WIDTH, z0 + CHUNK_WIDTH);

    let mut rng = StdRng::seed_from_u64(mix(seed.rotate_left(17), cx, cz));
    let mut step = last;
    let mut roughness = 3.0;
    while step > 1 {
        let half = step / 2;

        // Diamond step: square centres
        for x in (half..last).step_by(step) {
            for z in (half..last).step_by(step) {
                let avg = (grid[x - half][z - half]
                    + grid[x + half][z - half]
                    + grid[x - half][z + half]
                    + grid[x + half][z + half])
                    / 4.0;
                grid[x][z] = avg + rng.random_range(-roughness..=roughness);
            }
        }

        // Square step: edge midpoints
        for x in (0..=last).step_by(half) {
            let start = if (x / half) % 2 == 0 { half } else { 0 };
            for z in (start..=last).step_by(step) {
                let mut sum = 0.0;
                let mut n = 0.0;
                if x >= half {
                    sum += grid[x - half][z];
                    n += 1.0;
                }
                if x + half <= last {
                    sum += grid[x + half][z];
                    n += 1.0;
                }
                if z >= half {
                    sum += grid[x][z - half];
                    n += 1.0;
                }
                if z + half <= last {
                    sum += grid[x][z + half];
                    n += 1.0;
                }
                grid[x][z] = sum / n + rng.random_range(-roughness..=roughness);
            }
        }

        step = half;
        roughness /= 2.0;
    }

    let mut heights = Vec::with_capacity((CHUNK_WIDTH * CHUNK_WIDTH) as usize);
    for lz in 0..CHUNK_WIDTH as usize {
        for lx in 0..CHUNK_WIDTH as usize {
            heights.push(grid[lx][lz].round().clamp(1.0, 250.0) as u8);
        }
    }
    heights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationOptions;
    use crate::world_data::{AIR, GRASS};

    fn generation(seed: u64) -> WorldGeneration {
        WorldGeneration {
            algorithm: GenerationAlgorithm::DiamondSquare,
            options: GenerationOptions {
                seed: Some(seed),
                world_height: 64,
            },
        }
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let mut a = World::new(&generation(2116746182));
        let mut b = World::new(&generation(2116746182));
        for (cx, cz) in [(0, 0), (-1, 1), (-2, -2)] {
            assert_eq!(a.column(cx, cz).heights(), b.column(cx, cz).heights());
        }
    }

    #[test]
    fn test_heights_stay_near_base() {
        let mut world = World::new(&generation(7));
        for &h in world.column(0, 0).heights() {
            assert!((50..=78).contains(&h), "height {} out of range", h);
        }
    }

    #[test]
    fn test_surface_and_edits() {
        let mut world = World::new(&generation(1));
        let y = world.surface_y(0, 0);
        let top = BlockPos::new(0, y, 0);
        assert_eq!(world.block_at(top).type_id, GRASS);

        let old = world
            .set_block(Block {
                position: top,
                type_id: AIR,
                metadata: 0,
            })
            .unwrap();
        assert_eq!(old.type_id, GRASS);
        assert_eq!(world.surface_y(0, 0), y - 1);
        assert!(world
            .set_block(Block {
                position: BlockPos::new(0, 300, 0),
                type_id: 1,
                metadata: 0,
            })
            .is_none());
    }

    #[test]
    fn test_edits_persist_across_worlds() {
        let dir = tempfile::tempdir().unwrap();
        let chest = Block {
            position: BlockPos::new(1, 2, 3),
            type_id: 54,
            metadata: 2,
        };

        let mut world = World::new(&generation(5));
        world.set_block(chest);
        world.save(dir.path()).unwrap();

        let mut reloaded = World::new(&generation(5));
        reloaded.load(dir.path()).unwrap();
        assert_eq!(reloaded.block_at(chest.position), chest);
    }

    #[test]
    fn test_superflat_is_flat() {
        let mut world = World::new(&WorldGeneration {
            algorithm: GenerationAlgorithm::Superflat,
            options: GenerationOptions {
                seed: Some(3),
                world_height: 4,
            },
        });
        assert!(world.column(3, -3).heights().iter().all(|&h| h == 4));
    }
}
