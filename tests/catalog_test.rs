//! Every catalog entry against the reference server, once per version

mod common;

use worldsync::world_data::SUPPORTED_VERSIONS;
use worldsync::{run_entry, world_runner, CatalogEntry};

async fn run_all_versions(entry: CatalogEntry) {
    common::init_tracing();
    let runner = world_runner(common::test_settings());
    for version in SUPPORTED_VERSIONS {
        if let Err(e) = run_entry(&runner, entry, version).await {
            panic!("{} on {} failed: {}", entry, version, e);
        }
    }
}

#[tokio::test]
async fn test_can_dig() {
    run_all_versions(CatalogEntry::CanDig).await;
}

#[tokio::test]
async fn test_can_place_block() {
    run_all_versions(CatalogEntry::CanPlaceBlock).await;
}

#[tokio::test]
async fn test_can_open_and_close_chest() {
    run_all_versions(CatalogEntry::CanOpenAndCloseChest).await;
}

#[tokio::test]
async fn test_has_help_command() {
    run_all_versions(CatalogEntry::HasHelpCommand).await;
}

#[tokio::test]
async fn test_can_use_particle() {
    run_all_versions(CatalogEntry::CanUseParticle).await;
}

#[tokio::test]
async fn test_can_use_playsound() {
    run_all_versions(CatalogEntry::CanUsePlaysound).await;
}

#[tokio::test]
async fn test_can_use_summon() {
    run_all_versions(CatalogEntry::CanUseSummon).await;
}

#[tokio::test]
async fn test_can_use_kill() {
    run_all_versions(CatalogEntry::CanUseKill).await;
}

#[tokio::test]
async fn test_can_tp_myself() {
    run_all_versions(CatalogEntry::CanTpMyself).await;
}

#[tokio::test]
async fn test_can_tp_somebody_else() {
    run_all_versions(CatalogEntry::CanTpSomebodyElse).await;
}

#[tokio::test]
async fn test_can_tp_to_somebody_else() {
    run_all_versions(CatalogEntry::CanTpToSomebodyElse).await;
}

#[tokio::test]
async fn test_can_tp_with_relative_positions() {
    run_all_versions(CatalogEntry::CanTpWithRelativePositions).await;
}

#[tokio::test]
async fn test_can_tp_somebody_else_with_relative_positions() {
    run_all_versions(CatalogEntry::CanTpSomebodyElseWithRelativePositions).await;
}

#[tokio::test]
async fn test_can_use_deop() {
    run_all_versions(CatalogEntry::CanUseDeop).await;
}

#[tokio::test]
async fn test_can_use_setblock() {
    run_all_versions(CatalogEntry::CanUseSetblock).await;
}

#[tokio::test]
async fn test_can_use_xp() {
    run_all_versions(CatalogEntry::CanUseXp).await;
}

#[tokio::test]
async fn test_whole_catalog_on_one_loop() {
    common::init_tracing();
    let runner = world_runner(common::test_settings());
    for entry in CatalogEntry::ALL {
        run_entry(&runner, entry, "1.12.2")
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", entry, e));
    }
}
