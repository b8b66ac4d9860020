//! Scenario runner lifecycle against the reference server

mod common;

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use common::{CountingFactory, SHORT};
use futures_util::future::try_join;
use futures_util::FutureExt;
use worldsync::events::{once, wait_message, wait_messages, EventKind};
use worldsync::harness::{ClientConnection, Preconditions, ScenarioRunner, Setup};
use worldsync::position::Vec3;
use worldsync::{HarnessError, WorldClientFactory};

fn runner(factory: &CountingFactory) -> ScenarioRunner<CountingFactory, WorldClientFactory> {
    common::init_tracing();
    ScenarioRunner::new(factory.clone(), WorldClientFactory, common::test_settings())
}

fn two_actors() -> Setup {
    Setup::new(["bot", "bot2"], SHORT)
}

#[tokio::test]
async fn test_teardown_once_on_success() {
    let factory = CountingFactory::default();
    let result = runner(&factory)
        .run(&two_actors(), "1.12.2", |ctx| async move {
            assert_eq!(ctx.actors().len(), 2);
            assert!(ctx.actor(0)?.is_spawned());
            assert!(ctx.actor(1)?.is_logged_in());
            Ok(())
        })
        .await;

    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_teardown_once_on_error() {
    let factory = CountingFactory::default();
    let result = runner(&factory)
        .run(&two_actors(), "1.12.2", |_ctx| async move {
            Err(HarnessError::mismatch("answer", 42, 41))
        })
        .await;

    assert!(matches!(result, Err(HarnessError::AssertionMismatch { .. })));
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
#[allow(unreachable_code)]
async fn test_teardown_once_on_panic() {
    let factory = CountingFactory::default();
    let runner = runner(&factory);
    let outcome = AssertUnwindSafe(runner.run(&two_actors(), "1.12.2", |_ctx| async move {
        panic!("scenario body exploded");
        Ok(())
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_timeout_still_tears_down() {
    let factory = CountingFactory::default();
    let setup = Setup::new(["bot"], Duration::from_secs(3));
    let result = runner(&factory)
        .run(&setup, "1.12.2", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(HarnessError::Timeout(d)) if d == Duration::from_secs(3)));
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_unsupported_version_is_setup_failure() {
    let factory = CountingFactory::default();
    let result = runner(&factory)
        .run(&two_actors(), "0.30", |_ctx| async move { Ok(()) })
        .await;

    assert!(matches!(result, Err(HarnessError::SetupFailure(_))));
    assert_eq!(factory.created(), 0);
    assert_eq!(factory.quits(), 0);
}

#[tokio::test]
async fn test_duplicate_username_is_setup_failure() {
    let factory = CountingFactory::default();
    let setup = Setup::new(["bot", "bot"], SHORT);
    let result = runner(&factory)
        .run(&setup, "1.12.2", |_ctx| async move { Ok(()) })
        .await;

    assert!(matches!(result, Err(HarnessError::SetupFailure(_))), "{:?}", result);
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_server_that_never_listens_is_setup_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let factory = CountingFactory::with_port(taken.local_addr().unwrap().port());
    let result = runner(&factory)
        .run(&two_actors(), "1.12.2", |_ctx| async move { Ok(()) })
        .await;

    match result {
        Err(HarnessError::SetupFailure(reason)) => assert!(reason.contains("Listening"), "{}", reason),
        other => panic!("expected SetupFailure, got {:?}", other),
    }
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_chat_broadcast_seen_by_both() {
    let factory = CountingFactory::default();
    let setup = two_actors().with_preconditions(Preconditions {
        join_messages: &[0, 1],
        ..Preconditions::NONE
    });
    let result = runner(&factory)
        .run(&setup, "1.8.8", |ctx| async move {
            let bot = ctx.actor(0)?;
            let bot2 = ctx.actor(1)?;
            let seen = try_join(
                wait_message(bot.events(), "<bot> hello"),
                wait_message(bot2.events(), "<bot> hello"),
            );
            bot.chat("hello")?;
            seen.await?;
            Ok(())
        })
        .await;

    assert!(result.is_ok(), "{:?}", result);
}

#[tokio::test]
async fn test_exact_set_rejects_stray_message() {
    let factory = CountingFactory::default();
    let setup = two_actors().with_preconditions(Preconditions {
        join_messages: &[0],
        ..Preconditions::NONE
    });
    let result = runner(&factory)
        .run(&setup, "1.12.2", |ctx| async move {
            let bot = ctx.actor(0)?;
            let bot2 = ctx.actor(1)?;
            let expected = wait_messages(bot.events(), ["<bot> one", "<bot> two"]);
            bot2.chat("interloper")?;
            expected.await
        })
        .await;

    match result {
        Err(HarnessError::UnexpectedEvent { message, expected }) => {
            assert_eq!(message, "<bot2> interloper");
            assert_eq!(expected, vec!["<bot> one", "<bot> two"]);
        }
        other => panic!("expected UnexpectedEvent, got {:?}", other),
    }
    assert_eq!(factory.quits(), 1);
}

#[tokio::test]
async fn test_spawn_lands_on_surface() {
    let factory = CountingFactory::default();
    let setup = Setup::new(["bot"], SHORT).with_preconditions(Preconditions {
        spawn_zone: &[0],
        on_ground: &[0],
        join_messages: &[],
    });
    let result = runner(&factory)
        .run(&setup, "1.12.2", |ctx| async move {
            let bot = ctx.actor(0)?;
            assert!(bot.on_ground());
            let below = bot.position().floored().offset(0, -1, 0);
            let block = bot.block_at(below).expect("spawn chunk loaded");
            assert!(!block.is_air(), "standing on air at {}", below);

            let moved = once::<Vec3>(bot.events(), EventKind::ForcedMove);
            bot.chat("/tp ~ ~10 ~")?;
            let to = moved.await?;
            assert!(to.approx_eq(&bot.position(), 1.0));
            Ok(())
        })
        .await;

    assert!(result.is_ok(), "{:?}", result);
}
