//! Wait primitives
//!
//! Each primitive is a plain function that registers its listener before
//! returning and hands back a [`Wait`] future. Because registration does not
//! depend on the future being polled, an event emitted any time after the
//! call is observed, even if the caller does other work before awaiting.
//!
//! Four patterns:
//! - [`once`]: first occurrence of a kind
//! - [`wait_for`] / [`wait_state`]: first occurrence matching a predicate
//! - [`wait_count`]: exactly the n-th occurrence
//! - [`wait_messages`]: an unordered set of distinct messages, each once

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::source::{EventSource, Flow, Subscription};
use super::{Event, EventKind, FromEvent};
use crate::error::{HarnessError, Result};
use crate::protocol::ChatMessage;

/// A registered, not yet resolved wait
///
/// Resolves at most once. Dropping it before resolution unregisters the
/// listener.
#[must_use = "a Wait does nothing unless awaited"]
pub struct Wait<T> {
    state: WaitState<T>,
}

enum WaitState<T> {
    Ready(Result<T>),
    Pending {
        rx: oneshot::Receiver<Result<T>>,
        subscription: Subscription,
        source_name: String,
    },
    Done,
}

impl<T> Unpin for Wait<T> {}

impl<T: Send + 'static> Wait<T> {
    /// An already resolved wait that never subscribed
    pub fn ready(value: Result<T>) -> Self {
        Self {
            state: WaitState::Ready(value),
        }
    }

    /// Subscribe `handler` to `kind`; the first `Some` it returns resolves
    /// the wait and detaches the listener
    fn register<F>(source: &EventSource, kind: EventKind, mut handler: F) -> Self
    where
        F: FnMut(&Event) -> Option<Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let subscription = source.subscribe(kind, move |event| {
            if tx.as_ref().map_or(true, |tx| tx.is_closed()) {
                return Flow::Done;
            }
            match handler(event) {
                Some(result) => {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(result);
                    }
                    Flow::Done
                }
                None => Flow::Continue,
            }
        });
        Self {
            state: WaitState::Pending {
                rx,
                subscription,
                source_name: source.name().to_string(),
            },
        }
    }
}

impl<T> Wait<T> {
    /// Whether the listener is still attached
    pub fn is_registered(&self) -> bool {
        match &self.state {
            WaitState::Pending { subscription, .. } => subscription.is_active(),
            _ => false,
        }
    }
}

impl<T> Future for Wait<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let WaitState::Pending {
            rx,
            subscription,
            source_name,
        } = &mut this.state
        {
            let output = match Pin::new(rx).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(value)) => value,
                Poll::Ready(Err(_)) => Err(HarnessError::SourceClosed {
                    source_name: source_name.clone(),
                    kind: subscription.kind(),
                }),
            };
            this.state = WaitState::Done;
            return Poll::Ready(output);
        }
        match std::mem::replace(&mut this.state, WaitState::Done) {
            WaitState::Ready(value) => Poll::Ready(value),
            _ => panic!("Wait polled after completion"),
        }
    }
}

/// Resolve with the payload of the first `kind` event
pub fn once<T>(source: &EventSource, kind: EventKind) -> Wait<T>
where
    T: FromEvent + Send + 'static,
{
    Wait::register(source, kind, move |event| {
        Some(T::from_event(event).ok_or_else(|| {
            HarnessError::mismatch(
                format!("payload of {:?}", kind),
                std::any::type_name::<T>(),
                event,
            )
        }))
    })
}

/// Resolve with the first `kind` payload for which `predicate` holds
pub fn wait_for<T, P>(source: &EventSource, kind: EventKind, mut predicate: P) -> Wait<T>
where
    T: FromEvent + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    Wait::register(source, kind, move |event| {
        T::from_event(event)
            .filter(|value| predicate(value))
            .map(Ok)
    })
}

/// Resolve once `state()` holds
///
/// Subscribes first and then checks `state()` right away, so a condition
/// that already holds resolves immediately and a transition racing the call
/// is still caught by the listener. `state()` is re-checked on every `kind`
/// event.
pub fn wait_state<S>(source: &EventSource, kind: EventKind, state: S) -> Wait<()>
where
    S: Fn() -> bool + Send + Sync + 'static,
{
    let state = Arc::new(state);
    let check = state.clone();
    let wait = Wait::register(source, kind, move |_| check().then_some(Ok(())));
    if state() {
        return Wait::ready(Ok(()));
    }
    wait
}

/// Resolve on exactly the `n`-th `kind` event
///
/// `n == 0` resolves immediately without subscribing.
pub fn wait_count(source: &EventSource, kind: EventKind, n: usize) -> Wait<()> {
    if n == 0 {
        return Wait::ready(Ok(()));
    }
    let mut seen = 0;
    Wait::register(source, kind, move |_| {
        seen += 1;
        (seen == n).then_some(Ok(()))
    })
}

/// Number of chunk columns streamed for a square view of `view_distance`
pub fn spawn_zone_chunks(view_distance: u32) -> usize {
    let side = 2 * view_distance as usize;
    side * side
}

/// Resolve once every message in `expected` has been received exactly once
///
/// A message outside the set fails with `UnexpectedEvent` and a repeat fails
/// with `DuplicateEvent`, both immediately. Arrival order is irrelevant. An
/// empty set resolves immediately; messages arriving after resolution are
/// not observed.
pub fn wait_messages<I, S>(source: &EventSource, expected: I) -> Wait<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let expected: HashSet<String> = expected.into_iter().map(Into::into).collect();
    if expected.is_empty() {
        return Wait::ready(Ok(()));
    }
    let mut received: HashSet<String> = HashSet::with_capacity(expected.len());

    Wait::register(source, EventKind::Message, move |event| {
        let message = ChatMessage::from_event(event)?.to_plain();
        if !expected.contains(&message) {
            let mut expected: Vec<String> = expected.iter().cloned().collect();
            expected.sort();
            return Some(Err(HarnessError::UnexpectedEvent { message, expected }));
        }
        if !received.insert(message.clone()) {
            return Some(Err(HarnessError::DuplicateEvent { message }));
        }
        (received.len() == expected.len()).then_some(Ok(()))
    })
}

/// Resolve when the next message arrives, failing unless it equals `text`
pub fn wait_message(source: &EventSource, text: impl Into<String>) -> Wait<()> {
    let text = text.into();
    Wait::register(source, EventKind::Message, move |event| {
        let message = ChatMessage::from_event(event)?.to_plain();
        if message == text {
            Some(Ok(()))
        } else {
            Some(Err(HarnessError::mismatch("message", &text, message)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{BlockPos, Vec3};
    use crate::world_data::Block;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn message(text: &str) -> Event {
        Event::Message(ChatMessage::new(text))
    }

    fn chunk() -> Event {
        Event::ChunkColumnLoad { x: 0, z: 0 }
    }

    #[tokio::test]
    async fn test_once_sees_event_emitted_before_await() {
        let source = EventSource::new("bot");
        let wait = once::<Vec3>(&source, EventKind::ForcedMove);

        source.emit_event(&Event::ForcedMove {
            position: Vec3::new(2.0, 3.0, 4.0),
        });
        source.emit_event(&Event::ForcedMove {
            position: Vec3::new(9.0, 9.0, 9.0),
        });

        assert_eq!(wait.await.unwrap(), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(source.listener_count(EventKind::ForcedMove), 0);
    }

    #[tokio::test]
    async fn test_once_returns_tuple_payload() {
        let source = EventSource::new("bot2");
        let wait = once::<(Option<Block>, Block)>(&source, EventKind::BlockUpdate);
        let new = Block {
            position: BlockPos::new(0, 60, 0),
            type_id: 0,
            metadata: 0,
        };
        source.emit_event(&Event::BlockUpdate { old: None, new });

        let (old, block) = wait.await.unwrap();
        assert!(old.is_none());
        assert_eq!(block.type_id, 0);
    }

    #[tokio::test]
    async fn test_once_reports_payload_mismatch() {
        let source = EventSource::new("bot");
        let wait = once::<Vec3>(&source, EventKind::Message);
        source.emit_event(&message("hello"));

        assert!(matches!(
            wait.await,
            Err(HarnessError::AssertionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_skips_non_matching() {
        let source = EventSource::new("bot");
        let wait = wait_for::<crate::events::Entity, _>(&source, EventKind::EntitySpawn, |e| {
            e.name == "ender_dragon"
        });

        for (id, name) in [(1, "pig"), (2, "ender_dragon"), (3, "ender_dragon")] {
            source.emit_event(&Event::EntitySpawn(crate::events::Entity {
                id,
                name: name.into(),
                position: Vec3::default(),
            }));
        }

        assert_eq!(wait.await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_wait_state_already_true() {
        let source = EventSource::new("bot");
        let wait = wait_state(&source, EventKind::Move, || true);
        assert!(!wait.is_registered());
        assert_eq!(source.listener_count(EventKind::Move), 0);
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_state_resolves_on_transition() {
        let source = EventSource::new("bot");
        let on_ground = Arc::new(AtomicBool::new(false));
        let flag = on_ground.clone();
        let wait = wait_state(&source, EventKind::Move, move || flag.load(Ordering::SeqCst));

        source.emit_event(&Event::Move {
            position: Vec3::default(),
            on_ground: false,
        });
        assert!(wait.is_registered());

        on_ground.store(true, Ordering::SeqCst);
        source.emit_event(&Event::Move {
            position: Vec3::default(),
            on_ground: true,
        });
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_count_exact_threshold() {
        let source = EventSource::new("bot");
        let n = spawn_zone_chunks(2);
        assert_eq!(n, 16);

        let wait = wait_count(&source, EventKind::ChunkColumnLoad, n);
        for _ in 0..n - 1 {
            source.emit_event(&chunk());
        }
        assert!(wait.is_registered());

        source.emit_event(&chunk());
        assert!(!wait.is_registered());

        // Extra events after resolution go nowhere
        source.emit_event(&chunk());
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_count_zero_never_subscribes() {
        let source = EventSource::new("bot");
        let wait = wait_count(&source, EventKind::ChunkColumnLoad, 0);
        assert_eq!(source.listener_count(EventKind::ChunkColumnLoad), 0);
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_messages_any_order() {
        let expected = ["bot joined the game.", "bot2 joined the game.", "hello"];
        let orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0]];
        for order in orders {
            let source = EventSource::new("bot");
            let wait = wait_messages(&source, expected);
            for i in order {
                source.emit_event(&message(expected[i]));
            }
            wait.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_wait_messages_duplicate_fails_fast() {
        let source = EventSource::new("bot");
        let wait = wait_messages(&source, ["bot joined the game.", "bot2 joined the game."]);
        source.emit_event(&message("bot joined the game."));
        source.emit_event(&message("bot joined the game."));

        match wait.await {
            Err(HarnessError::DuplicateEvent { message }) => {
                assert_eq!(message, "bot joined the game.")
            }
            other => panic!("Expected DuplicateEvent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_messages_unexpected_fails_fast() {
        let source = EventSource::new("bot");
        let wait = wait_messages(&source, ["bot joined the game."]);
        source.emit_event(&message("bot left the game."));

        match wait.await {
            Err(HarnessError::UnexpectedEvent { message, expected }) => {
                assert_eq!(message, "bot left the game.");
                assert_eq!(expected, vec!["bot joined the game.".to_string()]);
            }
            other => panic!("Expected UnexpectedEvent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_messages_ignores_late_arrivals() {
        let source = EventSource::new("bot");
        let wait = wait_messages(&source, ["a"]);
        source.emit_event(&message("a"));
        source.emit_event(&message("a"));
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_message_checks_text() {
        let source = EventSource::new("bot");
        let ok = wait_message(&source, "bot is deopped");
        source.emit_event(&message("bot is deopped"));
        ok.await.unwrap();

        let bad = wait_message(&source, "bot is deopped");
        source.emit_event(&message("Unknown command"));
        assert!(matches!(
            bad.await,
            Err(HarnessError::AssertionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_wait_unregisters() {
        let source = EventSource::new("bot");
        let wait = once::<Event>(&source, EventKind::Login);
        assert_eq!(source.listener_count(EventKind::Login), 1);
        drop(wait);
        assert_eq!(source.listener_count(EventKind::Login), 0);
    }

    #[tokio::test]
    async fn test_closed_source_fails_wait() {
        let source = EventSource::new("bot");
        let wait = once::<Event>(&source, EventKind::Login);
        source.close();

        match wait.await {
            Err(HarnessError::SourceClosed { source_name, kind }) => {
                assert_eq!(source_name, "bot");
                assert_eq!(kind, EventKind::Login);
            }
            other => panic!("Expected SourceClosed, got {:?}", other),
        }
    }
}
