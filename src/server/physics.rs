//! Server-side gravity tick

use std::time::Duration;

use tracing::trace;

use super::AppState;
use crate::position::Vec3;
use crate::protocol::ServerMessage;

/// Interval between gravity updates
pub const TICK: Duration = Duration::from_millis(50);

/// Distance a falling player drops per tick
pub const FALL_PER_TICK: f64 = 0.5;

/// Lower every falling player until they stand on the surface
pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        tick(&state);
    }
}

/// One gravity step
pub fn tick(state: &AppState) {
    let mut falling: Vec<(i32, Vec3)> = Vec::new();
    state.connections.for_each_mut(|s| {
        if s.in_world && s.falling {
            falling.push((s.entity_id, s.position));
        }
    });
    if falling.is_empty() {
        return;
    }

    // Resolve landing heights without holding the session lock
    let landings: Vec<(i32, Vec3, f64)> = {
        let mut world = state.world.lock();
        falling
            .into_iter()
            .map(|(id, pos)| {
                let floor = pos.floored();
                let ground = (world.surface_y(floor.x, floor.z) + 1) as f64;
                (id, pos, ground)
            })
            .collect()
    };

    for (id, pos, ground) in landings {
        let y = (pos.y - FALL_PER_TICK).max(ground);
        let on_ground = y <= ground;
        let position = Vec3::new(pos.x, y, pos.z);
        state.connections.with_mut(id, |s| {
            // A teleport during this tick wins
            if !s.falling {
                return;
            }
            s.position = position;
            s.on_ground = on_ground;
            s.falling = !on_ground;
            s.send(ServerMessage::Position {
                position,
                on_ground,
                teleport: false,
            });
        });
        trace!(entity = id, y, on_ground, "gravity");
    }
}
