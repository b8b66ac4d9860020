//! Scenario catalog
//!
//! Every entry is a setup (actors, preconditions, timeout) plus an async
//! body. Bodies register each wait before issuing the action it observes;
//! when two actors must see the same broadcast, both waits are registered
//! first and joined afterwards.

use std::fmt;
use std::time::Duration;

use futures_util::future::try_join;
use tracing::info;

use crate::config::HarnessSettings;
use crate::error::{expect_eq, HarnessError, Result};
use crate::events::{once, wait_for, wait_message, Entity, EventKind};
use crate::harness::{
    ClientConnection, ClientFactory, Preconditions, ScenarioContext, ScenarioRunner, ServerFactory,
    ServerInstance, Setup,
};
use crate::position::{assert_pos_eq, BlockPos, Vec3};
use crate::protocol::{BlockAction, ChatMessage, PacketKind, ServerMessage};
use crate::server::commands::NO_PERMISSION;
use crate::world_data::{Block, Experience, Feature, Item, QUICK_BAR_START, STONE};

/// Usernames of the two actors every scenario connects
pub const ACTORS: [&str; 2] = ["bot", "bot2"];

const BOT: usize = 0;
const BOT2: usize = 1;

/// Spawn zone loaded and standing on the ground, for both actors
const SETTLED_BOTH: Preconditions = Preconditions {
    spawn_zone: &[BOT, BOT2],
    on_ground: &[BOT, BOT2],
    join_messages: &[],
};

const JOINED: Preconditions = Preconditions {
    spawn_zone: &[],
    on_ground: &[],
    join_messages: &[BOT],
};

/// Scenario families, which share a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Actions,
    Commands,
}

impl Group {
    pub fn timeout(self, settings: &HarnessSettings) -> Duration {
        match self {
            Group::Actions => settings.action_timeout(),
            Group::Commands => settings.command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogEntry {
    CanDig,
    CanPlaceBlock,
    CanOpenAndCloseChest,
    HasHelpCommand,
    CanUseParticle,
    CanUsePlaysound,
    CanUseSummon,
    CanUseKill,
    CanTpMyself,
    CanTpSomebodyElse,
    CanTpToSomebodyElse,
    CanTpWithRelativePositions,
    CanTpSomebodyElseWithRelativePositions,
    CanUseDeop,
    CanUseSetblock,
    CanUseXp,
}

impl CatalogEntry {
    pub const ALL: [CatalogEntry; 16] = [
        CatalogEntry::CanDig,
        CatalogEntry::CanPlaceBlock,
        CatalogEntry::CanOpenAndCloseChest,
        CatalogEntry::HasHelpCommand,
        CatalogEntry::CanUseParticle,
        CatalogEntry::CanUsePlaysound,
        CatalogEntry::CanUseSummon,
        CatalogEntry::CanUseKill,
        CatalogEntry::CanTpMyself,
        CatalogEntry::CanTpSomebodyElse,
        CatalogEntry::CanTpToSomebodyElse,
        CatalogEntry::CanTpWithRelativePositions,
        CatalogEntry::CanTpSomebodyElseWithRelativePositions,
        CatalogEntry::CanUseDeop,
        CatalogEntry::CanUseSetblock,
        CatalogEntry::CanUseXp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CatalogEntry::CanDig => "can-dig",
            CatalogEntry::CanPlaceBlock => "can-place-block",
            CatalogEntry::CanOpenAndCloseChest => "can-open-and-close-chest",
            CatalogEntry::HasHelpCommand => "has-help-command",
            CatalogEntry::CanUseParticle => "can-use-particle",
            CatalogEntry::CanUsePlaysound => "can-use-playsound",
            CatalogEntry::CanUseSummon => "can-use-summon",
            CatalogEntry::CanUseKill => "can-use-kill",
            CatalogEntry::CanTpMyself => "can-tp-myself",
            CatalogEntry::CanTpSomebodyElse => "can-tp-somebody-else",
            CatalogEntry::CanTpToSomebodyElse => "can-tp-to-somebody-else",
            CatalogEntry::CanTpWithRelativePositions => "can-tp-with-relative-positions",
            CatalogEntry::CanTpSomebodyElseWithRelativePositions => {
                "can-tp-somebody-else-with-relative-positions"
            }
            CatalogEntry::CanUseDeop => "can-use-deop",
            CatalogEntry::CanUseSetblock => "can-use-setblock",
            CatalogEntry::CanUseXp => "can-use-xp",
        }
    }

    pub fn from_name(name: &str) -> Option<CatalogEntry> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }

    pub fn group(self) -> Group {
        match self {
            CatalogEntry::CanDig | CatalogEntry::CanPlaceBlock | CatalogEntry::CanOpenAndCloseChest => {
                Group::Actions
            }
            _ => Group::Commands,
        }
    }

    pub fn preconditions(self) -> Preconditions {
        match self {
            CatalogEntry::CanDig | CatalogEntry::CanPlaceBlock | CatalogEntry::CanOpenAndCloseChest => {
                SETTLED_BOTH
            }
            CatalogEntry::HasHelpCommand | CatalogEntry::CanUseDeop => JOINED,
            CatalogEntry::CanTpToSomebodyElse | CatalogEntry::CanTpWithRelativePositions => {
                Preconditions {
                    on_ground: &[BOT],
                    ..Preconditions::NONE
                }
            }
            CatalogEntry::CanTpSomebodyElseWithRelativePositions => Preconditions {
                on_ground: &[BOT, BOT2],
                ..Preconditions::NONE
            },
            CatalogEntry::CanUseSetblock => Preconditions {
                spawn_zone: &[BOT],
                on_ground: &[BOT],
                join_messages: &[],
            },
            _ => Preconditions::NONE,
        }
    }

    pub fn setup(self, settings: &HarnessSettings) -> Setup {
        Setup::new(ACTORS, self.group().timeout(settings)).with_preconditions(self.preconditions())
    }

    /// Run the scenario body
    pub async fn run<S, C>(self, ctx: ScenarioContext<S, C>) -> Result<()>
    where
        S: ServerInstance,
        C: ClientConnection,
    {
        info!(scenario = self.name(), version = %ctx.config().version, "running");
        match self {
            CatalogEntry::CanDig => can_dig(&ctx).await,
            CatalogEntry::CanPlaceBlock => can_place_block(&ctx).await,
            CatalogEntry::CanOpenAndCloseChest => can_open_and_close_chest(&ctx).await,
            CatalogEntry::HasHelpCommand => has_help_command(&ctx).await,
            CatalogEntry::CanUseParticle => can_use_particle(&ctx).await,
            CatalogEntry::CanUsePlaysound => can_use_playsound(&ctx).await,
            CatalogEntry::CanUseSummon => can_use_summon(&ctx).await,
            CatalogEntry::CanUseKill => can_use_kill(&ctx).await,
            CatalogEntry::CanTpMyself => can_tp_myself(&ctx).await,
            CatalogEntry::CanTpSomebodyElse => can_tp_somebody_else(&ctx).await,
            CatalogEntry::CanTpToSomebodyElse => can_tp_to_somebody_else(&ctx).await,
            CatalogEntry::CanTpWithRelativePositions => can_tp_with_relative_positions(&ctx).await,
            CatalogEntry::CanTpSomebodyElseWithRelativePositions => {
                can_tp_somebody_else_with_relative_positions(&ctx).await
            }
            CatalogEntry::CanUseDeop => can_use_deop(&ctx).await,
            CatalogEntry::CanUseSetblock => can_use_setblock(&ctx).await,
            CatalogEntry::CanUseXp => can_use_xp(&ctx).await,
        }
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one entry against a fresh server for `version`
pub async fn run_entry<SF, CF>(
    runner: &ScenarioRunner<SF, CF>,
    entry: CatalogEntry,
    version: &str,
) -> Result<()>
where
    SF: ServerFactory,
    CF: ClientFactory,
{
    let setup = entry.setup(runner.settings());
    runner.run(&setup, version, |ctx| entry.run(ctx)).await
}

/// Entity type name of the ender dragon as the server spells it
fn dragon_name<S: ServerInstance, C: ClientConnection>(ctx: &ScenarioContext<S, C>) -> &'static str {
    if ctx.supports_feature(Feature::EntityCamelCase) {
        "EnderDragon"
    } else {
        "ender_dragon"
    }
}

fn block_under<C: ClientConnection>(client: &C, depth: i32) -> Result<Block> {
    let pos = client.position().floored().offset(0, -depth, 0);
    client.block_at(pos).ok_or_else(|| {
        HarnessError::mismatch(
            format!("{} chunk at {}", client.username(), pos),
            "loaded",
            "missing",
        )
    })
}

async fn can_dig<S: ServerInstance, C: ClientConnection>(ctx: &ScenarioContext<S, C>) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;

    let target = block_under(bot, 1)?;
    let update = once::<Block>(bot2.events(), EventKind::BlockUpdate);
    bot.dig(&target)?;

    let new = update.await?;
    assert_pos_eq(new.position, target.position)?;
    expect_eq("dug block type", &new.type_id, &0)
}

async fn can_place_block<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;

    let target = block_under(bot, 2)?;
    let dug = once::<Block>(bot2.events(), EventKind::BlockUpdate);
    bot.dig(&target)?;
    let new = dug.await?;
    assert_pos_eq(new.position, target.position)?;
    expect_eq("dug block type", &new.type_id, &0)?;

    let stocked = wait_for::<(u16, Option<Item>, Option<Item>), _>(
        bot.events(),
        EventKind::WindowUpdate,
        |(slot, _, new)| *slot == QUICK_BAR_START && new.is_some_and(|item| item.type_id == STONE),
    );
    bot.set_inventory_slot(QUICK_BAR_START, Some(Item::new(STONE, 1)))?;
    stocked.await?;

    let below = bot
        .block_at(target.position.offset(0, -1, 0))
        .ok_or_else(|| HarnessError::mismatch("block below target", "loaded", "missing"))?;
    let placed = once::<Block>(bot2.events(), EventKind::BlockUpdate);
    bot.place_block(&below, BlockPos::new(0, 1, 0))?;

    let new = placed.await?;
    assert_pos_eq(new.position, target.position)?;
    expect_eq("placed block type", &new.type_id, &STONE)
}

async fn can_open_and_close_chest<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;
    let chest = ctx
        .data()
        .block_id("chest")
        .ok_or_else(|| HarnessError::SetupFailure("no chest block id".to_string()))?;
    let location = BlockPos::new(1, 2, 3);

    let placed = once::<Block>(bot.events(), EventKind::BlockUpdate);
    bot.chat(&format!("/setblock {} {} {} {} 2", location.x, location.y, location.z, chest))?;
    placed.await?;

    for (byte2, state) in [(1u8, "open"), (0u8, "closed")] {
        let expected = BlockAction {
            location,
            byte1: 1,
            byte2,
            block_id: chest,
        };
        let kind = EventKind::Packet(PacketKind::BlockAction);
        let seen = try_join(
            once::<BlockAction>(bot.events(), kind),
            once::<BlockAction>(bot2.events(), kind),
        );
        bot.chat(&format!(
            "/setblockaction {} {} {} 1 {}",
            location.x, location.y, location.z, byte2
        ))?;
        let (first, second) = seen.await?;
        expect_eq(&format!("{} chest seen by bot", state), &first, &expected)?;
        expect_eq(&format!("{} chest seen by bot2", state), &second, &expected)?;
    }
    Ok(())
}

async fn has_help_command<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let reply = once::<ChatMessage>(bot.events(), EventKind::Message);
    bot.chat("/help")?;
    reply.await?;
    Ok(())
}

async fn can_use_particle<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let particles = once::<ServerMessage>(bot.events(), EventKind::Packet(PacketKind::WorldParticles));
    bot.chat("/particle 5 10 100 100 100")?;
    particles.await?;
    Ok(())
}

async fn can_use_playsound<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let heard = once::<(String, Vec3)>(bot.events(), EventKind::SoundEffectHeard);
    bot.chat("/playsound ambient.weather.rain")?;
    let (name, _) = heard.await?;
    expect_eq("sound", &name.as_str(), &"ambient.weather.rain")
}

fn wait_dragon<C: ClientConnection>(client: &C, dragon: &'static str) -> crate::events::Wait<Entity> {
    wait_for::<Entity, _>(client.events(), EventKind::EntitySpawn, move |entity| {
        entity.name == dragon
    })
}

async fn can_use_summon<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let dragon = dragon_name(ctx);
    let spawned = wait_dragon(bot, dragon);
    bot.chat(&format!("/summon {}", dragon))?;
    spawned.await?;
    Ok(())
}

async fn can_use_kill<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let dragon = dragon_name(ctx);

    let spawned = wait_dragon(bot, dragon);
    bot.chat(&format!("/summon {}", dragon))?;
    spawned.await?;

    let dead = once::<Entity>(bot.events(), EventKind::EntityDead);
    bot.chat(&format!("/kill @e[type={}]", dragon))?;
    let entity = dead.await?;
    expect_eq("dead entity", &entity.name.as_str(), &dragon)
}

async fn can_tp_myself<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let moved = once::<Vec3>(bot.events(), EventKind::ForcedMove);
    bot.chat("/tp 2 3 4")?;
    assert_pos_eq(moved.await?, Vec3::new(2.0, 3.0, 4.0))
}

async fn can_tp_somebody_else<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;
    let moved = once::<Vec3>(bot2.events(), EventKind::ForcedMove);
    bot.chat("/tp bot2 2 3 4")?;
    assert_pos_eq(moved.await?, Vec3::new(2.0, 3.0, 4.0))
}

async fn can_tp_to_somebody_else<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;
    let moved = once::<Vec3>(bot2.events(), EventKind::ForcedMove);
    bot.chat("/tp bot2 bot")?;
    assert_pos_eq(moved.await?, bot.position())
}

async fn can_tp_with_relative_positions<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let initial = bot.position();
    let moved = once::<Vec3>(bot.events(), EventKind::ForcedMove);
    bot.chat("/tp ~1 ~-2 ~3")?;
    assert_pos_eq(moved.await?, initial.offset(1.0, -2.0, 3.0))
}

async fn can_tp_somebody_else_with_relative_positions<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let bot2 = ctx.actor(BOT2)?;
    let initial = bot2.position();
    let moved = once::<Vec3>(bot2.events(), EventKind::ForcedMove);
    bot.chat("/tp bot2 ~1 ~-2 ~3")?;
    assert_pos_eq(moved.await?, initial.offset(1.0, -2.0, 3.0))
}

async fn can_use_deop<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;

    let deop = async {
        let deopped = wait_message(bot.events(), "bot is deopped");
        bot.chat("/deop bot")?;
        deopped.await?;

        let refused = wait_message(bot.events(), NO_PERMISSION);
        bot.chat("/op bot")?;
        refused.await
    };
    let result = deop.await;

    // Leave the player as every other scenario expects it
    ctx.server().set_operator(bot.username(), true);
    result
}

async fn can_use_setblock<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let location = BlockPos::new(1, 2, 3);
    let update = once::<Block>(bot.events(), EventKind::BlockUpdateAt(location));
    bot.chat("/setblock 1 2 3 95 0")?;
    let new = update.await?;
    expect_eq("set block type", &new.type_id, &95)
}

async fn can_use_xp<S: ServerInstance, C: ClientConnection>(
    ctx: &ScenarioContext<S, C>,
) -> Result<()> {
    let bot = ctx.actor(BOT)?;
    let gained = once::<Experience>(bot.events(), EventKind::Experience);
    bot.chat("/xp 100")?;
    gained.await?;
    expect_eq("experience points", &bot.experience().points, &100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for entry in CatalogEntry::ALL {
            assert_eq!(CatalogEntry::from_name(entry.name()), Some(entry));
        }
        assert_eq!(CatalogEntry::from_name("can-fly"), None);
    }

    #[test]
    fn test_group_timeouts() {
        let settings = HarnessSettings::default();
        assert_eq!(
            CatalogEntry::CanDig.setup(&settings).timeout,
            Duration::from_secs(100)
        );
        assert_eq!(
            CatalogEntry::CanUseXp.setup(&settings).timeout,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_preconditions_reference_known_actors() {
        for entry in CatalogEntry::ALL {
            let pre = entry.preconditions();
            for index in pre
                .spawn_zone
                .iter()
                .chain(pre.on_ground)
                .chain(pre.join_messages)
            {
                assert!(*index < ACTORS.len(), "{} names actor {}", entry, index);
            }
        }
        assert_eq!(CatalogEntry::CanUseDeop.preconditions().join_messages, &[BOT]);
        assert_eq!(
            CatalogEntry::CanDig.preconditions().spawn_zone,
            &[BOT, BOT2]
        );
    }
}
